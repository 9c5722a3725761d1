//! # 通道监管
//!
//! 配置变更 → 端点注册表重建 → 对每个端点：传输选择 → 打开通道 → 绑定主站会话
//! （事件规范化器为唯一事件消费者）→ 按需调度完整性扫描。
//!
//! - [`transport`]：明文/TLS 选择与证书路径
//! - [`channel`]：通道打开/关闭与保活失败恢复
//! - [`session`]：主站会话绑定
//! - [`SouthService`]：宿主侧门面，持有配置快照与按链路地址索引的运行期对象

pub mod channel;
mod error;
mod service;
pub mod session;
pub mod transport;

pub use channel::{ChannelSupervisor, SupervisedChannel, log_filters};
pub use dnp3_config::{PluginInfo, plugin_info};
pub use error::{AttachError, ConnectError, FailedEndpoint, ServiceError};
pub use service::{ChannelStatus, SouthService, StartSummary};
pub use session::{Session, SessionManager};
pub use transport::{Credentials, TransportChoice, resolve};

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
