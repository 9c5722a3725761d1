//! DNP3 主站协议栈引擎（基于 `dnp3` crate）
//!
//! 连接管理、按 [`ChannelRetry`] 退避重连、链路保活与应用层报文解析都由协议栈完成，
//! 本模块只负责配置映射和回调转发：
//! - `ClientState` → [`ChannelState`]，经 [`ChannelListener::on_state_change`] 上报
//! - `ReadHandler` 各类测量值 → [`IndexedValue`]，交给会话的 [`EventConsumer`]
//!
//! 协议栈的主站链路地址属于通道级配置，底层通道在绑定第一个主站时才创建；
//! 此前的 `enable`/`disable` 只记录期望状态。
//!
//! 链路断开后由协议栈按退避自行重连，引擎不再上报保活失败。

use crate::engine::{
    ChannelHandle, ChannelListener, EventConsumer, MasterHandle, ProtocolEngine, ScanHandle,
};
use crate::error::EngineError;
use crate::lock;
use crate::measurement::{
    Flags as PointFlags, HeaderInfo as PointHeader, IndexedValue, Measurement,
};
use crate::types::{
    ChannelConfig, ChannelRetry, ChannelState, ClassField, LogFilters, MasterConfig, TlsConfig,
};
use async_trait::async_trait;
use dnp3::app::measurement::*;
use dnp3::app::*;
use dnp3::decode::*;
use dnp3::link::*;
use dnp3::master::*;
use dnp3::tcp::tls::*;
use dnp3::tcp::*;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// `dnp3` 协议栈引擎（生产环境使用）
pub struct Dnp3Engine {
    channels: Mutex<Vec<Arc<Dnp3Channel>>>,
}

impl Dnp3Engine {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(Vec::new()),
        }
    }
}

impl Default for Dnp3Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolEngine for Dnp3Engine {
    async fn open_channel(
        &self,
        config: ChannelConfig,
        listener: Arc<dyn ChannelListener>,
    ) -> Result<Arc<dyn ChannelHandle>, EngineError> {
        if config.host.is_empty() || config.port == 0 {
            return Err(EngineError::Transport(format!(
                "invalid remote endpoint {}:{}",
                config.host, config.port
            )));
        }
        let tls = match &config.tls {
            Some(tls) => Some(tls_client_config(tls)?),
            None => None,
        };
        if config.log_filters.contains(LogFilters::INFO) {
            info!(
                target: "dnp3.channel",
                channel = %config.alias,
                adapter = %config.adapter,
                secure = tls.is_some(),
                "channel {} -> {}:{}",
                config.alias,
                config.host,
                config.port
            );
        }

        let channel = Arc::new(Dnp3Channel {
            config,
            listener,
            state: Arc::new(Mutex::new(ChannelState::Closed)),
            tls: Mutex::new(tls),
            link: tokio::sync::Mutex::new(None),
            enabled: AtomicBool::new(true),
            masters: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        });
        let mut channels = lock(&self.channels);
        channels.retain(|existing| !existing.is_shut_down());
        channels.push(channel.clone());
        Ok(channel)
    }

    async fn shutdown(&self) {
        let channels = std::mem::take(&mut *lock(&self.channels));
        for channel in channels {
            channel.shutdown().await;
        }
    }
}

/// 证书文件必须存在，否则返回传输错误。
fn tls_client_config(tls: &TlsConfig) -> Result<TlsClientConfig, EngineError> {
    for path in [&tls.ca_cert_path, &tls.cert_path, &tls.key_path] {
        std::fs::metadata(path)
            .map_err(|err| EngineError::Transport(format!("{}: {}", path.display(), err)))?;
    }
    TlsClientConfig::full_pki(
        None,
        &tls.ca_cert_path,
        &tls.cert_path,
        &tls.key_path,
        None,
        MinTlsVersion::V12,
    )
    .map_err(|err| EngineError::Transport(format!("tls config: {err:?}")))
}

/// 退避上下限映射到协议栈的连接策略；断线后的重连等待取最小间隔。
fn connect_strategy(retry: ChannelRetry) -> ConnectStrategy {
    ConnectStrategy::new(retry.min_delay, retry.max_delay, retry.min_delay)
}

fn decode_level(filters: LogFilters) -> DecodeLevel {
    let application = if filters.intersects(LogFilters::APP_OBJECT_RX | LogFilters::APP_OBJECT_TX) {
        AppDecodeLevel::ObjectValues
    } else if filters.intersects(LogFilters::APP_HEADER_RX | LogFilters::APP_HEADER_TX) {
        AppDecodeLevel::Header
    } else {
        AppDecodeLevel::Nothing
    };
    let transport = if filters.intersects(LogFilters::TRANSPORT_RX | LogFilters::TRANSPORT_TX) {
        TransportDecodeLevel::Header
    } else {
        TransportDecodeLevel::Nothing
    };
    let link = if filters.intersects(LogFilters::LINK_RX_HEX | LogFilters::LINK_TX_HEX) {
        LinkDecodeLevel::Payload
    } else if filters.intersects(LogFilters::LINK_RX | LogFilters::LINK_TX) {
        LinkDecodeLevel::Header
    } else {
        LinkDecodeLevel::Nothing
    };
    let physical = if filters.contains(LogFilters::DBG) {
        PhysDecodeLevel::Data
    } else {
        PhysDecodeLevel::Nothing
    };
    DecodeLevel::new(application, transport, link, physical)
}

fn channel_state(state: &ClientState) -> ChannelState {
    match state {
        ClientState::Connected => ChannelState::Open,
        ClientState::Disabled | ClientState::Shutdown => ChannelState::Closed,
        _ => ChannelState::Connecting,
    }
}

fn to_classes(field: ClassField) -> Classes {
    Classes::new(
        field.contains(ClassField::CLASS0),
        EventClasses::new(
            field.contains(ClassField::CLASS1),
            field.contains(ClassField::CLASS2),
            field.contains(ClassField::CLASS3),
        ),
    )
}

fn association_config(config: &MasterConfig) -> AssociationConfig {
    let mut association = AssociationConfig::new(
        EventClasses::all(),
        EventClasses::all(),
        to_classes(config.startup_integrity),
        EventClasses::none(),
    );
    match Timeout::from_duration(config.response_timeout) {
        Ok(timeout) => association.response_timeout = timeout,
        Err(err) => warn!(
            target: "dnp3.session",
            master = %config.alias,
            "response timeout {:?} rejected, keeping stack default: {:?}",
            config.response_timeout,
            err
        ),
    }
    association
}

/// 通道状态转发
struct StateForwarder {
    alias: String,
    state: Arc<Mutex<ChannelState>>,
    listener: Arc<dyn ChannelListener>,
}

impl Listener<ClientState> for StateForwarder {
    fn update(&mut self, value: ClientState) -> MaybeAsync<()> {
        let state = channel_state(&value);
        let previous = std::mem::replace(&mut *lock(&self.state), state);
        if previous != state {
            debug!(
                target: "dnp3.channel",
                channel = %self.alias,
                from = %previous,
                to = %state,
                "channel_state"
            );
            self.listener.on_state_change(state);
        }
        MaybeAsync::ready(())
    }
}

/// 测量值转发：会话未启用时丢弃。
struct EventForwarder {
    consumer: Arc<dyn EventConsumer>,
    enabled: Arc<AtomicBool>,
}

type Converted = (Measurement, u8, Option<Time>);

impl EventForwarder {
    fn forward<T>(
        &self,
        info: &HeaderInfo,
        iter: &mut dyn Iterator<Item = (T, u16)>,
        convert: fn(T) -> Converted,
    ) {
        if !self.enabled.load(Ordering::SeqCst) {
            return;
        }
        let header = PointHeader {
            is_event_variation: info.is_event,
            flags_valid: info.has_flags,
        };
        self.consumer.begin_fragment();
        for (point, index) in iter {
            let (value, flags, time) = convert(point);
            let mut event = IndexedValue::new(index, value, PointFlags::from_bits_retain(flags));
            event.time_ms = timestamp_ms(time);
            self.consumer.on_event(&header, event);
        }
        self.consumer.end_fragment();
    }
}

fn timestamp_ms(time: Option<Time>) -> u64 {
    match time {
        Some(Time::Synchronized(ts)) | Some(Time::Unsynchronized(ts)) => ts.raw_value(),
        None => 0,
    }
}

fn double_bit_code(value: DoubleBit) -> u8 {
    match value {
        DoubleBit::Intermediate => 0,
        DoubleBit::DeterminedOff => 1,
        DoubleBit::DeterminedOn => 2,
        DoubleBit::Indeterminate => 3,
    }
}

impl ReadHandler for EventForwarder {
    fn handle_binary_input(
        &mut self,
        info: HeaderInfo,
        iter: &mut dyn Iterator<Item = (BinaryInput, u16)>,
    ) {
        self.forward(&info, iter, |point| {
            (Measurement::Binary(point.value), point.flags.value, point.time)
        });
    }

    fn handle_double_bit_binary_input(
        &mut self,
        info: HeaderInfo,
        iter: &mut dyn Iterator<Item = (DoubleBitBinaryInput, u16)>,
    ) {
        self.forward(&info, iter, |point| {
            (
                Measurement::DoubleBitBinary(double_bit_code(point.value)),
                point.flags.value,
                point.time,
            )
        });
    }

    fn handle_binary_output_status(
        &mut self,
        info: HeaderInfo,
        iter: &mut dyn Iterator<Item = (BinaryOutputStatus, u16)>,
    ) {
        self.forward(&info, iter, |point| {
            (
                Measurement::BinaryOutputStatus(point.value),
                point.flags.value,
                point.time,
            )
        });
    }

    fn handle_counter(&mut self, info: HeaderInfo, iter: &mut dyn Iterator<Item = (Counter, u16)>) {
        self.forward(&info, iter, |point| {
            (Measurement::Counter(point.value), point.flags.value, point.time)
        });
    }

    fn handle_analog_input(
        &mut self,
        info: HeaderInfo,
        iter: &mut dyn Iterator<Item = (AnalogInput, u16)>,
    ) {
        self.forward(&info, iter, |point| {
            (Measurement::Analog(point.value), point.flags.value, point.time)
        });
    }

    fn handle_analog_output_status(
        &mut self,
        info: HeaderInfo,
        iter: &mut dyn Iterator<Item = (AnalogOutputStatus, u16)>,
    ) {
        self.forward(&info, iter, |point| {
            (
                Measurement::AnalogOutputStatus(point.value),
                point.flags.value,
                point.time,
            )
        });
    }
}

struct SessionHooks;

impl AssociationHandler for SessionHooks {}

impl AssociationInformation for SessionHooks {}

struct StackLink {
    channel: MasterChannel,
    local_addr: u16,
}

/// 协议栈通道
pub struct Dnp3Channel {
    config: ChannelConfig,
    listener: Arc<dyn ChannelListener>,
    state: Arc<Mutex<ChannelState>>,
    tls: Mutex<Option<TlsClientConfig>>,
    link: tokio::sync::Mutex<Option<StackLink>>,
    enabled: AtomicBool,
    masters: Mutex<Vec<Arc<Dnp3Master>>>,
    shut_down: AtomicBool,
}

impl Dnp3Channel {
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.is_shut_down() {
            return Err(EngineError::Shutdown(self.config.alias.clone()));
        }
        Ok(())
    }

    fn closed(&self) -> EngineError {
        EngineError::Shutdown(self.config.alias.clone())
    }

    fn spawn(&self, local_addr: u16) -> Result<StackLink, EngineError> {
        let address = EndpointAddress::try_new(local_addr).map_err(|err| {
            EngineError::Refused(format!("master address {local_addr}: {err:?}"))
        })?;
        let mut config = MasterChannelConfig::new(address);
        config.decode_level = decode_level(self.config.log_filters);
        let endpoints = EndpointList::new(format!("{}:{}", self.config.host, self.config.port), &[]);
        let strategy = connect_strategy(self.config.retry);
        let listener = Box::new(StateForwarder {
            alias: self.config.alias.clone(),
            state: self.state.clone(),
            listener: self.listener.clone(),
        });
        let channel = match lock(&self.tls).take() {
            Some(tls) => spawn_master_tls_client(
                LinkErrorMode::Close,
                config,
                endpoints,
                strategy,
                listener,
                tls,
            ),
            None => spawn_master_tcp_client(
                LinkErrorMode::Close,
                config,
                endpoints,
                strategy,
                listener,
            ),
        };
        Ok(StackLink {
            channel,
            local_addr,
        })
    }
}

#[async_trait]
impl ChannelHandle for Dnp3Channel {
    fn alias(&self) -> &str {
        &self.config.alias
    }

    fn state(&self) -> ChannelState {
        *lock(&self.state)
    }

    async fn add_master(
        &self,
        config: MasterConfig,
        consumer: Arc<dyn EventConsumer>,
    ) -> Result<Arc<dyn MasterHandle>, EngineError> {
        self.ensure_running()?;
        let remote = config.link.remote_addr;
        if lock(&self.masters)
            .iter()
            .any(|master| master.config.link.remote_addr == remote)
        {
            return Err(EngineError::DuplicateLink {
                channel: self.config.alias.clone(),
                remote,
            });
        }

        let mut slot = self.link.lock().await;
        let spawned = slot.is_none();
        if spawned {
            *slot = Some(self.spawn(config.link.local_addr)?);
        }
        let link = slot.as_mut().ok_or_else(|| self.closed())?;
        if link.local_addr != config.link.local_addr {
            return Err(EngineError::Refused(format!(
                "channel {} is bound to master address {}",
                self.config.alias, link.local_addr
            )));
        }

        let address = EndpointAddress::try_new(remote)
            .map_err(|err| EngineError::Refused(format!("outstation address {remote}: {err:?}")))?;
        let enabled = Arc::new(AtomicBool::new(false));
        let handler = Box::new(EventForwarder {
            consumer,
            enabled: enabled.clone(),
        });
        let association = link
            .channel
            .add_association(
                address,
                association_config(&config),
                handler,
                Box::new(SessionHooks),
                Box::new(SessionHooks),
            )
            .await
            .map_err(|err| EngineError::Refused(format!("{err:?}")))?;
        // 协议栈通道以禁用状态创建，关联添加后再按期望状态启用
        if spawned && self.enabled.load(Ordering::SeqCst) {
            link.channel.enable().await.map_err(|_| self.closed())?;
        }

        let master = Arc::new(Dnp3Master {
            config,
            enabled,
            association: tokio::sync::Mutex::new(Some(association)),
            polls: Mutex::new(Vec::new()),
            next_scan_id: AtomicU64::new(1),
        });
        lock(&self.masters).push(master.clone());
        Ok(master)
    }

    async fn enable(&self) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.enabled.store(true, Ordering::SeqCst);
        if let Some(link) = self.link.lock().await.as_mut() {
            link.channel.enable().await.map_err(|_| self.closed())?;
        }
        Ok(())
    }

    async fn disable(&self) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.enabled.store(false, Ordering::SeqCst);
        if let Some(link) = self.link.lock().await.as_mut() {
            link.channel.disable().await.map_err(|_| self.closed())?;
        }
        Ok(())
    }

    async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let masters = std::mem::take(&mut *lock(&self.masters));
        for master in masters {
            master.shutdown().await;
        }
        let link = self.link.lock().await.take();
        if let Some(mut link) = link
            && link.channel.disable().await.is_err()
        {
            debug!(target: "dnp3.channel", channel = %self.config.alias, "stack already stopped");
        }
        *lock(&self.state) = ChannelState::Closed;
        debug!(target: "dnp3.channel", channel = %self.config.alias, "channel_shutdown");
    }
}

/// 协议栈主站会话（一个外站关联）
pub struct Dnp3Master {
    config: MasterConfig,
    enabled: Arc<AtomicBool>,
    association: tokio::sync::Mutex<Option<AssociationHandle>>,
    polls: Mutex<Vec<PollHandle>>,
    next_scan_id: AtomicU64,
}

impl Dnp3Master {
    pub fn config(&self) -> &MasterConfig {
        &self.config
    }
}

#[async_trait]
impl MasterHandle for Dnp3Master {
    fn alias(&self) -> &str {
        &self.config.alias
    }

    async fn enable(&self) -> Result<(), EngineError> {
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disable(&self) -> Result<(), EngineError> {
        self.enabled.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn add_class_scan(
        &self,
        classes: ClassField,
        period: Duration,
    ) -> Result<ScanHandle, EngineError> {
        if period.is_zero() {
            return Err(EngineError::Refused("scan period must be positive".to_string()));
        }
        let mut association = self.association.lock().await;
        let association = association
            .as_mut()
            .ok_or_else(|| EngineError::Shutdown(self.config.alias.clone()))?;
        let poll = association
            .add_poll(ReadRequest::ClassScan(to_classes(classes)), period)
            .await
            .map_err(|err| EngineError::Refused(format!("{err:?}")))?;
        lock(&self.polls).push(poll);
        Ok(ScanHandle {
            id: self.next_scan_id.fetch_add(1, Ordering::SeqCst),
            classes,
            period,
        })
    }

    async fn shutdown(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        lock(&self.polls).clear();
        self.association.lock().await.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LinkConfig;
    use tokio::net::TcpListener;

    struct QuietListener;

    impl ChannelListener for QuietListener {
        fn on_state_change(&self, _state: ChannelState) {}

        fn on_keep_alive_failure(&self) {}
    }

    struct NullConsumer;

    impl EventConsumer for NullConsumer {
        fn on_event(&self, _info: &PointHeader, _event: IndexedValue) {}
    }

    fn config(port: u16) -> ChannelConfig {
        ChannelConfig {
            alias: "test_remote_10".to_string(),
            host: "127.0.0.1".to_string(),
            port,
            adapter: "0.0.0.0".to_string(),
            retry: ChannelRetry::new(Duration::from_millis(50), Duration::from_millis(200)),
            log_filters: LogFilters::NORMAL,
            tls: None,
        }
    }

    fn master(local_addr: u16, remote_addr: u16) -> MasterConfig {
        MasterConfig::new(
            format!("master_{local_addr}"),
            LinkConfig {
                local_addr,
                remote_addr,
            },
        )
    }

    async fn wait_for_state(channel: &Arc<dyn ChannelHandle>, expected: ChannelState) -> bool {
        for _ in 0..300 {
            if channel.state() == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[test]
    fn client_states_map_to_channel_states() {
        assert_eq!(channel_state(&ClientState::Connected), ChannelState::Open);
        assert_eq!(channel_state(&ClientState::Connecting), ChannelState::Connecting);
        assert_eq!(channel_state(&ClientState::Disabled), ChannelState::Closed);
        assert_eq!(channel_state(&ClientState::Shutdown), ChannelState::Closed);
    }

    #[test]
    fn log_filters_select_decode_levels() {
        let quiet = decode_level(LogFilters::NORMAL);
        assert!(matches!(quiet.application, AppDecodeLevel::Nothing));
        assert!(matches!(quiet.link, LinkDecodeLevel::Nothing));

        let data = decode_level(LogFilters::NORMAL | LogFilters::ALL_APP_COMMS);
        assert!(matches!(data.application, AppDecodeLevel::ObjectValues));
        assert!(matches!(data.transport, TransportDecodeLevel::Nothing));

        let all = decode_level(LogFilters::all());
        assert!(matches!(all.link, LinkDecodeLevel::Payload));
        assert!(matches!(all.physical, PhysDecodeLevel::Data));
    }

    #[test]
    fn double_bit_states_keep_wire_codes() {
        assert_eq!(double_bit_code(DoubleBit::Intermediate), 0);
        assert_eq!(double_bit_code(DoubleBit::DeterminedOn), 2);
        assert_eq!(double_bit_code(DoubleBit::Indeterminate), 3);
    }

    #[tokio::test]
    async fn channel_opens_once_master_is_bound() {
        let server = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = server.local_addr().expect("addr").port();
        let engine = Dnp3Engine::new();
        let channel = engine
            .open_channel(config(port), Arc::new(QuietListener))
            .await
            .expect("open");
        assert_eq!(channel.state(), ChannelState::Closed);

        channel
            .add_master(master(1, 10), Arc::new(NullConsumer))
            .await
            .expect("master");
        let (_socket, _) = server.accept().await.expect("accept");
        assert!(wait_for_state(&channel, ChannelState::Open).await);

        channel.disable().await.expect("disable");
        assert!(wait_for_state(&channel, ChannelState::Closed).await);

        engine.shutdown().await;
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn tls_channel_with_missing_files_fails() {
        let engine = Dnp3Engine::new();
        let mut cfg = config(20000);
        cfg.tls = Some(TlsConfig {
            ca_cert_path: "/nonexistent/dnp3ca.cert".into(),
            cert_path: "/nonexistent/master1.cert".into(),
            key_path: "/nonexistent/master1.key".into(),
        });
        let err = engine
            .open_channel(cfg, Arc::new(QuietListener))
            .await
            .err()
            .expect("missing files");
        assert!(matches!(err, EngineError::Transport(_)));
    }

    #[tokio::test]
    async fn second_master_for_same_outstation_is_rejected() {
        let engine = Dnp3Engine::new();
        let channel = engine
            .open_channel(config(1), Arc::new(QuietListener))
            .await
            .expect("open");
        channel.disable().await.expect("disable");
        channel
            .add_master(master(1, 10), Arc::new(NullConsumer))
            .await
            .expect("first");
        let duplicate = channel
            .add_master(master(1, 10), Arc::new(NullConsumer))
            .await
            .err()
            .expect("duplicate");
        assert!(matches!(duplicate, EngineError::DuplicateLink { remote: 10, .. }));

        let other_local = channel
            .add_master(master(2, 11), Arc::new(NullConsumer))
            .await
            .err()
            .expect("different master address");
        assert!(matches!(other_local, EngineError::Refused(_)));
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn scans_require_a_positive_period() {
        let engine = Dnp3Engine::new();
        let channel = engine
            .open_channel(config(1), Arc::new(QuietListener))
            .await
            .expect("open");
        channel.disable().await.expect("disable");
        let session = channel
            .add_master(master(1, 10), Arc::new(NullConsumer))
            .await
            .expect("master");
        assert!(matches!(
            session.add_class_scan(ClassField::all(), Duration::ZERO).await,
            Err(EngineError::Refused(_))
        ));
        let scan = session
            .add_class_scan(ClassField::all(), Duration::from_secs(30))
            .await
            .expect("scan");
        assert_eq!(scan.classes, ClassField::all());

        session.shutdown().await;
        assert!(matches!(
            session.add_class_scan(ClassField::all(), Duration::from_secs(30)).await,
            Err(EngineError::Shutdown(_))
        ));
        channel.shutdown().await;
    }
}
