//! # 协议引擎边界
//!
//! 监管层与点表型遥测协议引擎之间的接口层：
//! - **引擎抽象**：`ProtocolEngine` → `ChannelHandle` → `MasterHandle`
//! - **回调**：`EventConsumer`（测量值事件）、`ChannelListener`（状态与保活失败）
//! - **测量值模型**：`Measurement` / `IndexedValue` / `Flags`
//! - **重连策略**：`ChannelRetry`（最小/最大退避间隔）
//!
//! ## 架构设计
//!
//! ```text
//! SouthService (supervisor)
//!       │  open_channel / add_master / enable / disable / add_class_scan
//!       ▼
//! ProtocolEngine
//!       ├── InMemoryEngine（接线与测试）
//!       └── Dnp3Engine（`dnp3` 主站协议栈）
//!       │
//!       │  on_event / on_keep_alive_failure
//!       ▼
//! EventNormalizer → IngestSink
//! ```

mod engine;
mod error;
mod in_memory;
mod measurement;
mod stack;
mod types;

pub use engine::{
    ChannelHandle, ChannelListener, EventConsumer, MasterHandle, ProtocolEngine, ScanHandle,
};
pub use error::EngineError;
pub use in_memory::{InMemoryChannel, InMemoryEngine, InMemoryMaster};
pub use measurement::{DoubleBit, Flags, HeaderInfo, IndexedValue, Measurement, PointKind};
pub use stack::{Dnp3Channel, Dnp3Engine, Dnp3Master};
pub use types::*;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// 获取互斥锁；锁中毒时沿用内部数据（被保护的状态总是整体替换）。
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
