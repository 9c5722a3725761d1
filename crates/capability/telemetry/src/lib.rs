//! 追踪初始化、请求 ID 与进程级计数器。

use serde::Serialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_received: u64,
    pub dropped_quality: u64,
    pub ignored_kind: u64,
    pub decode_failures: u64,
    pub readings_ingested: u64,
    pub ingest_failures: u64,
    pub liveness_failures: u64,
    pub channel_recoveries: u64,
    pub channels_opened: u64,
    pub sessions_attached: u64,
}

pub struct TelemetryMetrics {
    events_received: AtomicU64,
    dropped_quality: AtomicU64,
    ignored_kind: AtomicU64,
    decode_failures: AtomicU64,
    readings_ingested: AtomicU64,
    ingest_failures: AtomicU64,
    liveness_failures: AtomicU64,
    channel_recoveries: AtomicU64,
    channels_opened: AtomicU64,
    sessions_attached: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            dropped_quality: AtomicU64::new(0),
            ignored_kind: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            readings_ingested: AtomicU64::new(0),
            ingest_failures: AtomicU64::new(0),
            liveness_failures: AtomicU64::new(0),
            channel_recoveries: AtomicU64::new(0),
            channels_opened: AtomicU64::new(0),
            sessions_attached: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            dropped_quality: self.dropped_quality.load(Ordering::Relaxed),
            ignored_kind: self.ignored_kind.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            readings_ingested: self.readings_ingested.load(Ordering::Relaxed),
            ingest_failures: self.ingest_failures.load(Ordering::Relaxed),
            liveness_failures: self.liveness_failures.load(Ordering::Relaxed),
            channel_recoveries: self.channel_recoveries.load(Ordering::Relaxed),
            channels_opened: self.channels_opened.load(Ordering::Relaxed),
            sessions_attached: self.sessions_attached.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录引擎上报的事件数。
pub fn record_event_received() {
    metrics().events_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录品质检查未通过而丢弃的事件数。
pub fn record_dropped_quality() {
    metrics().dropped_quality.fetch_add(1, Ordering::Relaxed);
}

/// 记录不采集的点类型事件数。
pub fn record_ignored_kind() {
    metrics().ignored_kind.fetch_add(1, Ordering::Relaxed);
}

pub fn record_decode_failure() {
    metrics().decode_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录交给接收端的读数条数。
pub fn record_reading_ingested() {
    metrics().readings_ingested.fetch_add(1, Ordering::Relaxed);
}

/// 记录接收端拒收次数。
pub fn record_ingest_failure() {
    metrics().ingest_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录保活失败通知次数。
pub fn record_liveness_failure() {
    metrics().liveness_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录通道 disable/enable 恢复次数。
pub fn record_channel_recovery() {
    metrics().channel_recoveries.fetch_add(1, Ordering::Relaxed);
}

pub fn record_channel_opened() {
    metrics().channels_opened.fetch_add(1, Ordering::Relaxed);
}

pub fn record_session_attached() {
    metrics().sessions_attached.fetch_add(1, Ordering::Relaxed);
}
