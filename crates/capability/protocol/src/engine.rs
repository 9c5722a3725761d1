//! 协议引擎边界
//!
//! 监管层只向引擎下发高层生命周期命令（打开通道、绑定主站、启停、周期扫描），
//! 并通过 [`EventConsumer`] / [`ChannelListener`] 接收引擎回调。
//! 回调在引擎的工作线程中触发，不同通道之间可能并发执行。

use crate::error::EngineError;
use crate::measurement::{HeaderInfo, IndexedValue};
use crate::types::{ChannelConfig, ChannelState, ClassField, MasterConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// 主站事件消费者（SOE 回调）
///
/// 每个轮询/非请求上报周期按对象头分批回调，同一通道内按接收顺序投递。
pub trait EventConsumer: Send + Sync {
    fn begin_fragment(&self) {}

    fn on_event(&self, info: &HeaderInfo, event: IndexedValue);

    fn end_fragment(&self) {}
}

/// 通道状态监听器
pub trait ChannelListener: Send + Sync {
    fn on_state_change(&self, state: ChannelState);

    /// 保活检测失败（网络中断等引擎自身无法恢复的情况）
    fn on_keep_alive_failure(&self);
}

/// 周期扫描句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanHandle {
    pub id: u64,
    pub classes: ClassField,
    pub period: Duration,
}

/// 协议引擎
#[async_trait]
pub trait ProtocolEngine: Send + Sync {
    /// 创建 TCP 客户端通道。
    ///
    /// 通道创建后即处于启用状态，连接尝试在后台调度，本调用不等待连接建立。
    async fn open_channel(
        &self,
        config: ChannelConfig,
        listener: Arc<dyn ChannelListener>,
    ) -> Result<Arc<dyn ChannelHandle>, EngineError>;

    /// 关闭引擎创建的全部通道。
    async fn shutdown(&self);
}

/// 通道句柄
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    fn alias(&self) -> &str;

    fn state(&self) -> ChannelState;

    /// 在通道上绑定主站会话，`consumer` 为该会话唯一的事件消费者。
    async fn add_master(
        &self,
        config: MasterConfig,
        consumer: Arc<dyn EventConsumer>,
    ) -> Result<Arc<dyn MasterHandle>, EngineError>;

    async fn enable(&self) -> Result<(), EngineError>;

    async fn disable(&self) -> Result<(), EngineError>;

    /// 释放通道及其后台任务。
    async fn shutdown(&self);
}

/// 主站会话句柄
#[async_trait]
pub trait MasterHandle: Send + Sync {
    fn alias(&self) -> &str;

    async fn enable(&self) -> Result<(), EngineError>;

    async fn disable(&self) -> Result<(), EngineError>;

    /// 按固定周期请求指定类别的数据。
    async fn add_class_scan(
        &self,
        classes: ClassField,
        period: Duration,
    ) -> Result<ScanHandle, EngineError>;

    async fn shutdown(&self);
}
