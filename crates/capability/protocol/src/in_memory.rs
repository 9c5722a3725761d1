//! 内存协议引擎（用于接线与测试）。
//!
//! 不做任何网络 I/O：连接是否成功由 [`InMemoryEngine::set_accepting`] 决定，
//! 事件通过 [`InMemoryMaster::deliver`] 注入，保活失败通过
//! [`InMemoryChannel::simulate_keep_alive_failure`] 触发。

use crate::engine::{
    ChannelHandle, ChannelListener, EventConsumer, MasterHandle, ProtocolEngine, ScanHandle,
};
use crate::error::EngineError;
use crate::lock;
use crate::measurement::{HeaderInfo, IndexedValue};
use crate::types::{ChannelConfig, ChannelState, ClassField, MasterConfig};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 内存引擎
///
/// 保留打开过的全部通道（含已关闭的），列表只增不减，便于测试检查回滚与重配置后的旧通道；
/// 只用于测试和短时接线，不适合长期运行。
pub struct InMemoryEngine {
    accepting: Arc<AtomicBool>,
    /// 打开历史，关闭后不移除
    channels: Mutex<Vec<Arc<InMemoryChannel>>>,
    rejected_hosts: Mutex<HashSet<String>>,
    refused_links: Arc<Mutex<HashSet<u16>>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self {
            accepting: Arc::new(AtomicBool::new(true)),
            channels: Mutex::new(Vec::new()),
            rejected_hosts: Mutex::new(HashSet::new()),
            refused_links: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// 模拟远端是否接受连接；切换为 `true` 时所有等待中的通道立即连上。
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
        if accepting {
            for channel in self.active_channels() {
                channel.accept_pending();
            }
        }
    }

    /// 对该主机打开通道时返回传输错误。
    pub fn reject_host(&self, host: impl Into<String>) {
        lock(&self.rejected_hosts).insert(host.into());
    }

    /// 对该外站链路地址绑定主站时返回拒绝错误。
    pub fn refuse_link(&self, remote_addr: u16) {
        lock(&self.refused_links).insert(remote_addr);
    }

    /// 曾经打开过的全部通道（含已关闭）。
    pub fn channels(&self) -> Vec<Arc<InMemoryChannel>> {
        lock(&self.channels).clone()
    }

    pub fn active_channels(&self) -> Vec<Arc<InMemoryChannel>> {
        lock(&self.channels)
            .iter()
            .filter(|channel| !channel.is_shut_down())
            .cloned()
            .collect()
    }

    pub fn channel(&self, alias: &str) -> Option<Arc<InMemoryChannel>> {
        self.active_channels()
            .into_iter()
            .find(|channel| channel.config.alias == alias)
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolEngine for InMemoryEngine {
    async fn open_channel(
        &self,
        config: ChannelConfig,
        listener: Arc<dyn ChannelListener>,
    ) -> Result<Arc<dyn ChannelHandle>, EngineError> {
        if lock(&self.rejected_hosts).contains(&config.host) {
            return Err(EngineError::Transport(format!(
                "cannot reach {}:{}",
                config.host, config.port
            )));
        }
        let channel = Arc::new(InMemoryChannel {
            config,
            listener,
            accepting: self.accepting.clone(),
            refused_links: self.refused_links.clone(),
            state: Mutex::new(ChannelState::Closed),
            shut_down: AtomicBool::new(false),
            enable_calls: AtomicUsize::new(0),
            disable_calls: AtomicUsize::new(0),
            masters: Mutex::new(Vec::new()),
        });
        lock(&self.channels).push(channel.clone());
        channel.connect();
        Ok(channel)
    }

    async fn shutdown(&self) {
        for channel in self.active_channels() {
            channel.shutdown().await;
        }
    }
}

pub struct InMemoryChannel {
    config: ChannelConfig,
    listener: Arc<dyn ChannelListener>,
    accepting: Arc<AtomicBool>,
    refused_links: Arc<Mutex<HashSet<u16>>>,
    state: Mutex<ChannelState>,
    shut_down: AtomicBool,
    enable_calls: AtomicUsize,
    disable_calls: AtomicUsize,
    masters: Mutex<Vec<Arc<InMemoryMaster>>>,
}

impl InMemoryChannel {
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn enable_calls(&self) -> usize {
        self.enable_calls.load(Ordering::SeqCst)
    }

    pub fn disable_calls(&self) -> usize {
        self.disable_calls.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn masters(&self) -> Vec<Arc<InMemoryMaster>> {
        lock(&self.masters).clone()
    }

    /// 按外站链路地址查找主站。
    pub fn master(&self, remote_addr: u16) -> Option<Arc<InMemoryMaster>> {
        lock(&self.masters)
            .iter()
            .find(|master| master.config.link.remote_addr == remote_addr)
            .cloned()
    }

    /// 模拟保活失败：进入 `Degraded` 并通知监听器。
    pub fn simulate_keep_alive_failure(&self) {
        if self.is_shut_down() {
            return;
        }
        self.set_state(ChannelState::Degraded);
        self.listener.on_keep_alive_failure();
    }

    fn accept_pending(&self) {
        if self.state() == ChannelState::Connecting && self.accepting.load(Ordering::SeqCst) {
            self.set_state(ChannelState::Open);
        }
    }

    fn connect(&self) {
        self.set_state(ChannelState::Connecting);
        self.accept_pending();
    }

    fn set_state(&self, state: ChannelState) {
        {
            let mut current = lock(&self.state);
            if *current == state {
                return;
            }
            *current = state;
        }
        self.listener.on_state_change(state);
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.is_shut_down() {
            return Err(EngineError::Shutdown(self.config.alias.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelHandle for InMemoryChannel {
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
        if lock(&self.refused_links).contains(&remote) {
            return Err(EngineError::Refused(format!(
                "link address {} refused on {}",
                remote, self.config.alias
            )));
        }
        let mut masters = lock(&self.masters);
        if masters
            .iter()
            .any(|master| !master.is_shut_down() && master.config.link.remote_addr == remote)
        {
            return Err(EngineError::DuplicateLink {
                channel: self.config.alias.clone(),
                remote,
            });
        }
        let master = Arc::new(InMemoryMaster {
            config,
            consumer,
            enabled: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            scans: Mutex::new(Vec::new()),
            next_scan_id: AtomicU64::new(1),
        });
        masters.push(master.clone());
        Ok(master)
    }

    async fn enable(&self) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.enable_calls.fetch_add(1, Ordering::SeqCst);
        self.connect();
        Ok(())
    }

    async fn disable(&self) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.disable_calls.fetch_add(1, Ordering::SeqCst);
        self.set_state(ChannelState::Closed);
        Ok(())
    }

    async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        for master in self.masters() {
            master.shutdown().await;
        }
        self.set_state(ChannelState::Closed);
    }
}

pub struct InMemoryMaster {
    config: MasterConfig,
    consumer: Arc<dyn EventConsumer>,
    enabled: AtomicBool,
    shut_down: AtomicBool,
    scans: Mutex<Vec<ScanHandle>>,
    next_scan_id: AtomicU64,
}

impl InMemoryMaster {
    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn scans(&self) -> Vec<ScanHandle> {
        lock(&self.scans).clone()
    }

    /// 向事件消费者投递一个对象头下的一批测量值，返回投递条数。
    ///
    /// 会话未启用或已关闭时不投递。
    pub fn deliver(&self, info: HeaderInfo, events: Vec<IndexedValue>) -> usize {
        if !self.is_enabled() || self.is_shut_down() {
            return 0;
        }
        let count = events.len();
        self.consumer.begin_fragment();
        for event in events {
            self.consumer.on_event(&info, event);
        }
        self.consumer.end_fragment();
        count
    }
}

#[async_trait]
impl MasterHandle for InMemoryMaster {
    fn alias(&self) -> &str {
        &self.config.alias
    }

    async fn enable(&self) -> Result<(), EngineError> {
        if self.is_shut_down() {
            return Err(EngineError::Shutdown(self.config.alias.clone()));
        }
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
        if self.is_shut_down() {
            return Err(EngineError::Shutdown(self.config.alias.clone()));
        }
        let scan = ScanHandle {
            id: self.next_scan_id.fetch_add(1, Ordering::SeqCst),
            classes,
            period,
        };
        lock(&self.scans).push(scan);
        Ok(scan)
    }

    async fn shutdown(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.shut_down.store(true, Ordering::SeqCst);
        lock(&self.scans).clear();
    }
}
