//! 南向服务门面：配置、启动、停止、重新配置。
//!
//! 配置快照以 `Arc<ConfigSnapshot>` 整体替换，锁只在读取/替换指针时持有；
//! 运行期对象按外站链路地址存放在 [`Runtime`] 中，停止时整体拆除。

use crate::channel::{ChannelSupervisor, SupervisedChannel};
use crate::error::{AttachError, FailedEndpoint, ServiceError};
use crate::lock;
use crate::session::{Session, SessionManager};
use crate::transport;
use dnp3_config::{ConfigSnapshot, Endpoint};
use dnp3_ingest::IngestSink;
use dnp3_protocol::{ChannelState, ProtocolEngine};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// 通道状态（管理接口）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub link_id: u16,
    pub channel: String,
    pub address: String,
    pub port: u16,
    pub secure: bool,
    pub state: ChannelState,
    pub scan_enabled: bool,
}

/// 启动结果：全部端点均已绑定会话。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StartSummary {
    pub started: Vec<u16>,
}

struct EndpointRuntime {
    endpoint: Endpoint,
    channel: SupervisedChannel,
    session: Session,
}

#[derive(Default)]
struct Runtime {
    endpoints: BTreeMap<u16, EndpointRuntime>,
    running: bool,
}

pub struct SouthService {
    name: String,
    supervisor: ChannelSupervisor,
    snapshot: Mutex<Arc<ConfigSnapshot>>,
    sink: Mutex<Option<Arc<dyn IngestSink>>>,
    runtime: tokio::sync::Mutex<Runtime>,
}

impl SouthService {
    pub fn new(
        name: impl Into<String>,
        engine: Arc<dyn ProtocolEngine>,
        cert_store: impl Into<PathBuf>,
    ) -> Self {
        let name = name.into();
        Self {
            supervisor: ChannelSupervisor::new(engine, name.clone(), cert_store),
            name,
            snapshot: Mutex::new(Arc::new(ConfigSnapshot::default())),
            sink: Mutex::new(None),
            runtime: tokio::sync::Mutex::new(Runtime::default()),
        }
    }

    pub fn with_supervisor(mut self, supervisor: ChannelSupervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 当前发布的配置快照。
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        lock(&self.snapshot).clone()
    }

    pub fn register_ingest(&self, sink: Arc<dyn IngestSink>) {
        *lock(&self.sink) = Some(sink);
    }

    /// 解析并发布配置。失败时原快照保持不变。
    pub fn configure(&self, document: &Value) -> Result<(), ServiceError> {
        let snapshot = ConfigSnapshot::from_value(document)?;
        self.publish(snapshot);
        Ok(())
    }

    fn publish(&self, snapshot: ConfigSnapshot) {
        info!(
            target: "dnp3.config",
            service = %self.name,
            endpoints = snapshot.endpoints.len(),
            tls = snapshot.session.tls.enabled,
            scan_enabled = snapshot.session.scan_enabled,
            "config_published"
        );
        *lock(&self.snapshot) = Arc::new(snapshot);
    }

    pub async fn is_running(&self) -> bool {
        self.runtime.lock().await.running
    }

    /// 为每个端点打开通道并绑定会话。
    ///
    /// 任一通道无法构建时回滚已创建的通道并返回错误。
    /// 会话绑定失败只关闭该端点的通道，其余端点继续运行，
    /// 随后以 [`ServiceError::Attach`] 返回；`Ok` 表示每个端点都有通道和会话。
    pub async fn start(&self) -> Result<StartSummary, ServiceError> {
        let mut runtime = self.runtime.lock().await;
        if runtime.running {
            return Err(ServiceError::AlreadyRunning);
        }
        self.start_locked(&mut runtime).await
    }

    /// 拆除全部通道与会话。未启动时为空操作。
    pub async fn stop(&self) {
        let mut runtime = self.runtime.lock().await;
        self.stop_locked(&mut runtime).await;
    }

    /// 先校验新配置；通过后停止、发布、再启动。校验失败时运行中的通道不受影响。
    pub async fn reconfigure(&self, document: &Value) -> Result<StartSummary, ServiceError> {
        let snapshot = ConfigSnapshot::from_value(document)?;
        let mut runtime = self.runtime.lock().await;
        let was_running = runtime.running;
        self.stop_locked(&mut runtime).await;
        self.publish(snapshot);
        if !was_running {
            return Ok(StartSummary::default());
        }
        self.start_locked(&mut runtime).await
    }

    pub async fn channel_statuses(&self) -> Vec<ChannelStatus> {
        let runtime = self.runtime.lock().await;
        runtime
            .endpoints
            .values()
            .map(|entry| ChannelStatus {
                link_id: entry.endpoint.link_id,
                channel: entry.channel.handle.alias().to_string(),
                address: entry.endpoint.address.clone(),
                port: entry.endpoint.port,
                secure: entry.channel.secure,
                state: entry.channel.state(),
                scan_enabled: entry.session.scan.is_some(),
            })
            .collect()
    }

    async fn start_locked(&self, runtime: &mut Runtime) -> Result<StartSummary, ServiceError> {
        let sink = lock(&self.sink).clone().ok_or(ServiceError::SinkNotRegistered)?;
        let snapshot = self.snapshot();
        let sessions = SessionManager::new(sink);
        let mut summary = StartSummary::default();
        let mut failed = Vec::new();

        for endpoint in &snapshot.endpoints {
            let choice = transport::resolve(endpoint, &snapshot.session);
            let channel = match self
                .supervisor
                .open(endpoint, &choice, snapshot.session.diagnostics)
                .await
            {
                Ok(channel) => channel,
                Err(err) => {
                    error!(target: "dnp3.channel", service = %self.name, "start aborted: {}", err);
                    self.stop_locked(runtime).await;
                    return Err(err.into());
                }
            };

            match sessions
                .attach(&channel.handle, endpoint, &snapshot.session)
                .await
            {
                Ok(session) => {
                    summary.started.push(endpoint.link_id);
                    runtime.endpoints.insert(
                        endpoint.link_id,
                        EndpointRuntime {
                            endpoint: endpoint.clone(),
                            channel,
                            session,
                        },
                    );
                }
                Err(err) => {
                    self.reject_endpoint(channel, &err).await;
                    failed.push(FailedEndpoint {
                        link_id: err.link_id(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        runtime.running = true;
        info!(
            target: "dnp3.channel",
            service = %self.name,
            started = summary.started.len(),
            failed = failed.len(),
            "service_started"
        );
        if !failed.is_empty() {
            return Err(ServiceError::Attach {
                started: summary.started,
                failed,
            });
        }
        Ok(summary)
    }

    async fn reject_endpoint(&self, channel: SupervisedChannel, err: &AttachError) {
        warn!(target: "dnp3.session", link_id = err.link_id(), "endpoint skipped: {}", err);
        self.supervisor.close(channel).await;
    }

    async fn stop_locked(&self, runtime: &mut Runtime) {
        let endpoints = std::mem::take(&mut runtime.endpoints);
        let count = endpoints.len();
        for (_, entry) in endpoints {
            entry.session.shutdown().await;
            self.supervisor.close(entry.channel).await;
        }
        if runtime.running || count > 0 {
            info!(target: "dnp3.channel", service = %self.name, channels = count, "service_stopped");
        }
        runtime.running = false;
    }
}
