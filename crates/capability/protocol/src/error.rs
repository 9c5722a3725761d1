//! 协议引擎错误类型定义

/// 协议引擎错误
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 传输层无法构建（地址非法、证书文件不可读等）
    #[error("transport error: {0}")]
    Transport(String),

    /// 同一通道上已存在相同远端链路地址的主站
    #[error("duplicate link address {remote} on channel {channel}")]
    DuplicateLink { channel: String, remote: u16 },

    /// 引擎拒绝绑定
    #[error("binding refused: {0}")]
    Refused(String),

    /// 引擎不支持的能力
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// 对象已关闭
    #[error("{0} is shut down")]
    Shutdown(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
