//! 通道与主站会话配置类型定义

use bitflags::bitflags;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// 通道连接状态
///
/// `Closed` 既是初始态也是终态；`Degraded` 表示保活检测失败，
/// 随后通道会被强制关闭并重新进入 `Connecting`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Closed,
    Connecting,
    Open,
    Degraded,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 通道重连策略：最小/最大退避间隔
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRetry {
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl ChannelRetry {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
        }
    }
}

impl Default for ChannelRetry {
    /// 首次 20 秒，最长 5 分钟。
    fn default() -> Self {
        Self::new(Duration::from_secs(20), Duration::from_secs(5 * 60))
    }
}

bitflags! {
    /// 引擎日志过滤位
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LogFilters: u32 {
        const ERR = 1 << 0;
        const WARN = 1 << 1;
        const INFO = 1 << 2;
        const EVENT = 1 << 3;
        const DBG = 1 << 4;
        const LINK_RX = 1 << 5;
        const LINK_RX_HEX = 1 << 6;
        const LINK_TX = 1 << 7;
        const LINK_TX_HEX = 1 << 8;
        const TRANSPORT_RX = 1 << 9;
        const TRANSPORT_TX = 1 << 10;
        const APP_HEADER_RX = 1 << 11;
        const APP_HEADER_TX = 1 << 12;
        const APP_OBJECT_RX = 1 << 13;
        const APP_OBJECT_TX = 1 << 14;

        /// 常规级别：错误、告警、信息与事件
        const NORMAL = Self::ERR.bits() | Self::WARN.bits() | Self::INFO.bits() | Self::EVENT.bits();
        /// 应用层收发
        const ALL_APP_COMMS = Self::APP_HEADER_RX.bits()
            | Self::APP_HEADER_TX.bits()
            | Self::APP_OBJECT_RX.bits()
            | Self::APP_OBJECT_TX.bits();
        /// 链路层 + 传输层 + 应用层收发
        const ALL_COMMS = Self::LINK_RX.bits()
            | Self::LINK_RX_HEX.bits()
            | Self::LINK_TX.bits()
            | Self::LINK_TX_HEX.bits()
            | Self::TRANSPORT_RX.bits()
            | Self::TRANSPORT_TX.bits()
            | Self::ALL_APP_COMMS.bits();
    }
}

bitflags! {
    /// 轮询类别掩码（Class 0/1/2/3）
    ///
    /// `all()` 即完整性轮询的全部类别。
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClassField: u8 {
        const CLASS0 = 0x01;
        const CLASS1 = 0x02;
        const CLASS2 = 0x04;
        const CLASS3 = 0x08;
    }
}

/// 传输层 TLS 证书文件路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub ca_cert_path: PathBuf,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// 通道配置
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// 日志中使用的通道别名
    pub alias: String,
    /// 远端主机名或 IP
    pub host: String,
    /// 远端端口
    pub port: u16,
    /// 本地适配器地址
    pub adapter: String,
    pub retry: ChannelRetry,
    pub log_filters: LogFilters,
    /// `Some` 表示使用 TLS 传输
    pub tls: Option<TlsConfig>,
}

impl ChannelConfig {
    pub fn is_secure(&self) -> bool {
        self.tls.is_some()
    }
}

/// 链路层地址
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// 主站本地链路地址
    pub local_addr: u16,
    /// 外站链路地址
    pub remote_addr: u16,
}

/// 主站会话配置
#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub alias: String,
    pub link: LinkConfig,
    /// 应用层响应超时
    pub response_timeout: Duration,
    /// 启用后立即执行的完整性轮询类别
    pub startup_integrity: ClassField,
}

impl MasterConfig {
    /// 引擎默认值：5 秒超时，启动时执行全类别完整性轮询。
    pub fn new(alias: impl Into<String>, link: LinkConfig) -> Self {
        Self {
            alias: alias.into(),
            link,
            response_timeout: Duration::from_secs(5),
            startup_integrity: ClassField::all(),
        }
    }
}
