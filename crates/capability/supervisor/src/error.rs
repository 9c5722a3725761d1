use dnp3_config::ConfigError;
use dnp3_protocol::EngineError;
use serde::Serialize;

/// 通道无法构建。整个启动过程随之失败。
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("outstation {link_id}: invalid TLS credential: {reason}")]
    Credentials { link_id: u16, reason: String },
    #[error("outstation {link_id}: cannot open channel: {source}")]
    Engine {
        link_id: u16,
        #[source]
        source: EngineError,
    },
}

/// 会话无法绑定。仅影响该端点。
#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error("outstation {link_id}: master refused: {source}")]
    Refused {
        link_id: u16,
        #[source]
        source: EngineError,
    },
    #[error("outstation {link_id}: cannot enable master: {source}")]
    Enable {
        link_id: u16,
        #[source]
        source: EngineError,
    },
    #[error("outstation {link_id}: cannot schedule integrity scan: {source}")]
    Scan {
        link_id: u16,
        #[source]
        source: EngineError,
    },
}

impl AttachError {
    pub fn link_id(&self) -> u16 {
        match self {
            Self::Refused { link_id, .. }
            | Self::Enable { link_id, .. }
            | Self::Scan { link_id, .. } => *link_id,
        }
    }
}

/// 会话绑定失败的端点
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEndpoint {
    pub link_id: u16,
    pub reason: String,
}

/// 服务门面错误
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Connect(#[from] ConnectError),
    /// 部分端点会话绑定失败；`started` 中的端点保持运行。
    #[error("{} outstation(s) failed to attach", failed.len())]
    Attach {
        started: Vec<u16>,
        failed: Vec<FailedEndpoint>,
    },
    #[error("no ingest sink registered")]
    SinkNotRegistered,
    #[error("service already started")]
    AlreadyRunning,
}
