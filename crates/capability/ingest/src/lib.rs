//! 读数接收端（宿主侧回调）。
//!
//! [`IngestSink::ingest`] 在引擎回调线程中同步调用，不同端点可能并发调用，
//! 实现需自行保证线程安全且不能长时间阻塞。

mod mqtt;

pub use mqtt::{MqttSink, MqttSinkConfig};

use domain::Reading;
use tokio::sync::mpsc;

/// 接收端错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("sink closed")]
    Closed,
    #[error("encode error: {0}")]
    Encode(String),
    #[error("publish error: {0}")]
    Publish(String),
}

/// 读数接收端。
pub trait IngestSink: Send + Sync {
    fn ingest(&self, reading: Reading) -> Result<(), IngestError>;
}

impl<F> IngestSink for F
where
    F: Fn(Reading) -> Result<(), IngestError> + Send + Sync,
{
    fn ingest(&self, reading: Reading) -> Result<(), IngestError> {
        self(reading)
    }
}

/// 丢弃全部读数（用于接线）。
#[derive(Debug, Default)]
pub struct NoopSink;

impl IngestSink for NoopSink {
    fn ingest(&self, _reading: Reading) -> Result<(), IngestError> {
        Ok(())
    }
}

/// 通过无界通道转发读数，由异步任务消费。
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Reading>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Reading>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl IngestSink for ChannelSink {
    fn ingest(&self, reading: Reading) -> Result<(), IngestError> {
        self.tx.send(reading).map_err(|_| IngestError::Closed)
    }
}
