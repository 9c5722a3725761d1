//! 主站会话管理
//!
//! 会话启动时不做引擎自带的完整性轮询，由本层在主站启用成功后按配置调度周期扫描。

use crate::error::AttachError;
use dnp3_config::{Endpoint, SessionParams};
use dnp3_ingest::IngestSink;
use dnp3_normalize::EventNormalizer;
use dnp3_protocol::{
    ChannelHandle, ClassField, LinkConfig, MasterConfig, MasterHandle, ScanHandle,
};
use std::sync::Arc;
use tracing::{debug, info};

/// 绑定在通道上的主站会话
pub struct Session {
    pub link_id: u16,
    pub master: Arc<dyn MasterHandle>,
    pub scan: Option<ScanHandle>,
}

impl Session {
    pub async fn shutdown(self) {
        if let Err(err) = self.master.disable().await {
            debug!(target: "dnp3.session", link_id = self.link_id, "disable before shutdown: {}", err);
        }
        self.master.shutdown().await;
    }
}

pub struct SessionManager {
    sink: Arc<dyn IngestSink>,
}

impl SessionManager {
    pub fn new(sink: Arc<dyn IngestSink>) -> Self {
        Self { sink }
    }

    pub fn master_config(endpoint: &Endpoint, params: &SessionParams) -> MasterConfig {
        let link = LinkConfig {
            local_addr: params.local_link_id,
            remote_addr: endpoint.link_id,
        };
        let mut config = MasterConfig::new(format!("master_{}", params.local_link_id), link);
        config.response_timeout = params.response_timeout;
        config.startup_integrity = ClassField::empty();
        config
    }

    /// 在通道上绑定主站，注册事件规范化器为唯一消费者，启用后按需调度完整性扫描。
    pub async fn attach(
        &self,
        channel: &Arc<dyn ChannelHandle>,
        endpoint: &Endpoint,
        params: &SessionParams,
    ) -> Result<Session, AttachError> {
        let link_id = endpoint.link_id;
        let consumer = Arc::new(EventNormalizer::new(
            params.asset_prefix.clone(),
            endpoint.label(),
            self.sink.clone(),
        ));
        let master = channel
            .add_master(Self::master_config(endpoint, params), consumer)
            .await
            .map_err(|source| AttachError::Refused { link_id, source })?;

        if let Err(source) = master.enable().await {
            master.shutdown().await;
            return Err(AttachError::Enable { link_id, source });
        }

        let scan = if params.scan_enabled {
            match master
                .add_class_scan(ClassField::all(), params.scan_interval)
                .await
            {
                Ok(scan) => Some(scan),
                Err(source) => {
                    master.shutdown().await;
                    return Err(AttachError::Scan { link_id, source });
                }
            }
        } else {
            None
        };

        dnp3_telemetry::record_session_attached();
        info!(
            target: "dnp3.session",
            link_id,
            master = %master.alias(),
            local_link_id = params.local_link_id,
            response_timeout_secs = params.response_timeout.as_secs(),
            scan_interval_secs = scan.map(|scan| scan.period.as_secs()),
            "session_attached"
        );
        Ok(Session {
            link_id,
            master,
            scan,
        })
    }
}
