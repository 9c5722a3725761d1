//! 事件规范化：引擎上报的类型化测量值 -> 读数（资产名 + 数据点）。
//!
//! [`normalize`] 是无状态纯函数，可在多个通道的回调线程中并发调用；
//! [`EventNormalizer`] 把它接到接收端上，作为会话唯一的事件消费者。

use dnp3_ingest::IngestSink;
use dnp3_protocol::{DoubleBit, EventConsumer, Flags, HeaderInfo, IndexedValue, Measurement};
use domain::{Datapoint, DatapointValue, Reading};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// 规范化错误。
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("decode error for {point}[{index}]: {reason}")]
    Decode {
        point: &'static str,
        index: u16,
        reason: String,
    },
}

/// 单个事件的处理结果。
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Reading(Reading),
    /// 品质标志未通过
    BelowQuality,
    /// 不采集的点类型
    Ignored,
}

impl Outcome {
    pub fn into_reading(self) -> Option<Reading> {
        match self {
            Self::Reading(reading) => Some(reading),
            _ => None,
        }
    }
}

/// 品质门限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QualityGate {
    /// 标志字节恰好为 ONLINE
    Online,
    /// 标志字节恰好为 ONLINE，或 STATE 位置位
    OnlineOrState,
    /// ONLINE 位置位
    OnlineBit,
}

impl QualityGate {
    fn passes(self, flags: Flags) -> bool {
        match self {
            Self::Online => flags == Flags::ONLINE,
            Self::OnlineOrState => flags == Flags::ONLINE || flags.intersects(Flags::STATE),
            Self::OnlineBit => flags.contains(Flags::ONLINE),
        }
    }
}

/// 采集的六类点：(名称, 品质门限)。其余类型返回 `None`。
fn classify(value: &Measurement) -> Option<(&'static str, QualityGate)> {
    match value {
        Measurement::Analog(_) => Some(("Analog", QualityGate::Online)),
        Measurement::AnalogOutputStatus(_) => Some(("AnalogOutput", QualityGate::Online)),
        Measurement::Binary(_) => Some(("Binary", QualityGate::OnlineOrState)),
        Measurement::BinaryOutputStatus(_) => {
            Some(("BinaryOutputStatus", QualityGate::OnlineOrState))
        }
        Measurement::Counter(_) => Some(("Counter", QualityGate::Online)),
        Measurement::DoubleBitBinary(_) => Some(("DoubleBitBinary", QualityGate::OnlineBit)),
        Measurement::FrozenCounter(_)
        | Measurement::OctetString(_)
        | Measurement::TimeAndInterval { .. }
        | Measurement::BinaryCommandEvent { .. }
        | Measurement::AnalogCommandEvent { .. }
        | Measurement::SecurityStat { .. }
        | Measurement::AbsoluteTime(_) => None,
    }
}

fn decode(point: &'static str, event: &IndexedValue) -> Result<DatapointValue, NormalizeError> {
    let fail = |reason: String| NormalizeError::Decode {
        point,
        index: event.index,
        reason,
    };
    match &event.value {
        Measurement::Analog(value) | Measurement::AnalogOutputStatus(value) => {
            if value.is_finite() {
                Ok(DatapointValue::Float(*value))
            } else {
                Err(fail(format!("non-finite value {}", value)))
            }
        }
        Measurement::Binary(state) | Measurement::BinaryOutputStatus(state) => {
            Ok(DatapointValue::Integer(i64::from(*state)))
        }
        Measurement::Counter(count) => Ok(DatapointValue::Integer(i64::from(*count))),
        Measurement::DoubleBitBinary(code) => DoubleBit::from_code(*code)
            .map(|state| DatapointValue::String(state.as_str().to_string()))
            .ok_or_else(|| fail(format!("unknown double-bit state {}", code))),
        other => Err(fail(format!("unsupported measurement {}", other.kind().as_str()))),
    }
}

/// 资产名：`{prefix}{label}_{point}_{index}`
pub fn asset_name(prefix: &str, label: &str, point: &str, index: u16) -> String {
    format!("{}{}_{}_{}", prefix, label, point, index)
}

/// 规范化单个事件。
///
/// 先按点类型分类，再检查品质标志，最后解码数据点值；
/// 返回 [`Outcome::Reading`] 时恰好对应一次接收端调用。
pub fn normalize(
    prefix: &str,
    label: &str,
    _info: &HeaderInfo,
    event: &IndexedValue,
) -> Result<Outcome, NormalizeError> {
    let Some((point, gate)) = classify(&event.value) else {
        return Ok(Outcome::Ignored);
    };
    if !gate.passes(event.flags) {
        return Ok(Outcome::BelowQuality);
    }
    let value = decode(point, event)?;
    let datapoint = Datapoint::new(format!("{}{}", point, event.index), value);
    Ok(Outcome::Reading(Reading::new(
        asset_name(prefix, label, point, event.index),
        vec![datapoint],
    )))
}

/// 绑定到单个端点的事件消费者。
pub struct EventNormalizer {
    asset_prefix: String,
    label: String,
    sink: Arc<dyn IngestSink>,
}

impl EventNormalizer {
    pub fn new(
        asset_prefix: impl Into<String>,
        label: impl Into<String>,
        sink: Arc<dyn IngestSink>,
    ) -> Self {
        Self {
            asset_prefix: asset_prefix.into(),
            label: label.into(),
            sink,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl EventConsumer for EventNormalizer {
    fn begin_fragment(&self) {
        trace!(target: "dnp3.normalize", label = %self.label, "fragment_begin");
    }

    fn on_event(&self, info: &HeaderInfo, event: IndexedValue) {
        dnp3_telemetry::record_event_received();
        trace!(
            target: "dnp3.normalize",
            label = %self.label,
            kind = event.value.kind().as_str(),
            index = event.index,
            is_event = info.is_event_variation,
            flags_valid = info.flags_valid,
            flags = event.flags.bits(),
            time_ms = event.time_ms,
            "event_received"
        );

        match normalize(&self.asset_prefix, &self.label, info, &event) {
            Ok(Outcome::Reading(reading)) => {
                let asset = reading.asset_name.clone();
                match self.sink.ingest(reading) {
                    Ok(()) => dnp3_telemetry::record_reading_ingested(),
                    Err(err) => {
                        dnp3_telemetry::record_ingest_failure();
                        warn!(target: "dnp3.normalize", asset = %asset, "ingest failed: {}", err);
                    }
                }
            }
            Ok(Outcome::BelowQuality) => {
                dnp3_telemetry::record_dropped_quality();
                debug!(
                    target: "dnp3.normalize",
                    label = %self.label,
                    kind = event.value.kind().as_str(),
                    index = event.index,
                    flags = event.flags.bits(),
                    "event_dropped_quality"
                );
            }
            Ok(Outcome::Ignored) => dnp3_telemetry::record_ignored_kind(),
            Err(err) => {
                dnp3_telemetry::record_decode_failure();
                warn!(target: "dnp3.normalize", label = %self.label, "event dropped: {}", err);
            }
        }
    }

    fn end_fragment(&self) {
        trace!(target: "dnp3.normalize", label = %self.label, "fragment_end");
    }
}
