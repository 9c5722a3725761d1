//! 通道监管
//!
//! 每个端点恰好一个通道。重连退避由引擎通道自身负责；监管层只在收到保活失败
//! 通知时对同一通道执行一次 disable/enable，保留通道上已绑定的会话配置。

use crate::error::ConnectError;
use crate::transport::TransportChoice;
use dnp3_config::{DiagnosticLevel, Endpoint};
use dnp3_protocol::{
    ChannelConfig, ChannelHandle, ChannelListener, ChannelRetry, ChannelState, LogFilters,
    ProtocolEngine,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 诊断级别 -> 引擎日志过滤位。
pub fn log_filters(level: DiagnosticLevel) -> LogFilters {
    match level {
        DiagnosticLevel::None => LogFilters::empty(),
        DiagnosticLevel::Normal => LogFilters::NORMAL,
        DiagnosticLevel::Data => LogFilters::NORMAL | LogFilters::ALL_APP_COMMS,
        DiagnosticLevel::DataAndLink => LogFilters::NORMAL | LogFilters::ALL_COMMS,
        DiagnosticLevel::All => LogFilters::all(),
    }
}

/// 把引擎回调转成日志与保活失败信号。
struct SupervisorListener {
    link_id: u16,
    alias: String,
    liveness_tx: mpsc::UnboundedSender<()>,
}

impl ChannelListener for SupervisorListener {
    fn on_state_change(&self, state: ChannelState) {
        info!(
            target: "dnp3.channel",
            link_id = self.link_id,
            channel = %self.alias,
            state = %state,
            "channel_state_changed"
        );
    }

    fn on_keep_alive_failure(&self) {
        dnp3_telemetry::record_liveness_failure();
        warn!(
            target: "dnp3.channel",
            link_id = self.link_id,
            channel = %self.alias,
            "keep-alive failure, forcing channel restart"
        );
        if self.liveness_tx.send(()).is_err() {
            debug!(target: "dnp3.channel", link_id = self.link_id, "recovery task already stopped");
        }
    }
}

/// 已打开的通道及其保活恢复任务。
pub struct SupervisedChannel {
    pub link_id: u16,
    pub handle: Arc<dyn ChannelHandle>,
    pub secure: bool,
    recovery: JoinHandle<()>,
}

impl SupervisedChannel {
    pub fn state(&self) -> ChannelState {
        self.handle.state()
    }
}

pub struct ChannelSupervisor {
    engine: Arc<dyn ProtocolEngine>,
    service_name: String,
    cert_store: PathBuf,
    retry: ChannelRetry,
}

impl ChannelSupervisor {
    pub fn new(
        engine: Arc<dyn ProtocolEngine>,
        service_name: impl Into<String>,
        cert_store: impl Into<PathBuf>,
    ) -> Self {
        Self {
            engine,
            service_name: service_name.into(),
            cert_store: cert_store.into(),
            retry: ChannelRetry::default(),
        }
    }

    pub fn with_retry(mut self, retry: ChannelRetry) -> Self {
        self.retry = retry;
        self
    }

    /// 通道别名：`<service>_remote_<linkid>`
    pub fn channel_alias(&self, endpoint: &Endpoint) -> String {
        format!("{}_{}", self.service_name, endpoint.label())
    }

    /// 打开端点通道。返回时连接尝试已在后台调度，不等待连接建立。
    pub async fn open(
        &self,
        endpoint: &Endpoint,
        transport: &TransportChoice,
        diagnostics: DiagnosticLevel,
    ) -> Result<SupervisedChannel, ConnectError> {
        let link_id = endpoint.link_id;
        let tls = match transport {
            TransportChoice::Insecure => None,
            TransportChoice::Secure(credentials) => {
                Some(credentials.tls_config(&self.cert_store, link_id)?)
            }
        };
        let alias = self.channel_alias(endpoint);
        let config = ChannelConfig {
            alias: alias.clone(),
            host: endpoint.address.clone(),
            port: endpoint.port,
            adapter: "0.0.0.0".to_string(),
            retry: self.retry,
            log_filters: log_filters(diagnostics),
            tls,
        };

        let (liveness_tx, liveness_rx) = mpsc::unbounded_channel();
        let listener = Arc::new(SupervisorListener {
            link_id,
            alias: alias.clone(),
            liveness_tx,
        });
        let handle = self
            .engine
            .open_channel(config, listener)
            .await
            .map_err(|source| ConnectError::Engine { link_id, source })?;
        let recovery = tokio::spawn(run_recovery(link_id, handle.clone(), liveness_rx));

        dnp3_telemetry::record_channel_opened();
        info!(
            target: "dnp3.channel",
            link_id,
            channel = %alias,
            address = %endpoint.address,
            port = endpoint.port,
            secure = transport.is_secure(),
            "channel_opened"
        );
        Ok(SupervisedChannel {
            link_id,
            handle,
            secure: transport.is_secure(),
            recovery,
        })
    }

    /// 停止恢复任务并释放通道。
    pub async fn close(&self, channel: SupervisedChannel) {
        channel.recovery.abort();
        if let Err(err) = channel.handle.disable().await {
            debug!(target: "dnp3.channel", link_id = channel.link_id, "disable before close: {}", err);
        }
        channel.handle.shutdown().await;
        info!(
            target: "dnp3.channel",
            link_id = channel.link_id,
            channel = %channel.handle.alias(),
            "channel_closed"
        );
    }
}

/// 每收到一次保活失败信号，对同一通道执行一次 disable/enable。
async fn run_recovery(
    link_id: u16,
    channel: Arc<dyn ChannelHandle>,
    mut liveness_rx: mpsc::UnboundedReceiver<()>,
) {
    while liveness_rx.recv().await.is_some() {
        if let Err(err) = channel.disable().await {
            warn!(target: "dnp3.channel", link_id, "channel disable failed: {}", err);
            continue;
        }
        if let Err(err) = channel.enable().await {
            warn!(target: "dnp3.channel", link_id, "channel enable failed: {}", err);
            continue;
        }
        dnp3_telemetry::record_channel_recovery();
        info!(target: "dnp3.channel", link_id, channel = %channel.alias(), "channel_restarted");
    }
}
