//! 引擎上报的类型化测量值

use bitflags::bitflags;

bitflags! {
    /// 品质标志位
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u8 {
        /// 所有对象通用：在线
        const ONLINE = 0x01;
        const RESTART = 0x02;
        const COMM_LOST = 0x04;
        const REMOTE_FORCED = 0x08;
        const LOCAL_FORCED = 0x10;
        /// 模拟量：越限；计数器：翻转
        const OVER_RANGE = 0x20;
        const REFERENCE_ERR = 0x40;
        /// 二值对象：状态位
        const STATE = 0x80;
    }
}

/// 双点遥信状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoubleBit {
    Intermediate,
    DeterminedOff,
    DeterminedOn,
    Indeterminate,
}

impl DoubleBit {
    /// 由 2 位编码解析；超出 0..=3 返回 `None`。
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Intermediate),
            1 => Some(Self::DeterminedOff),
            2 => Some(Self::DeterminedOn),
            3 => Some(Self::Indeterminate),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Intermediate => 0,
            Self::DeterminedOff => 1,
            Self::DeterminedOn => 2,
            Self::Indeterminate => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intermediate => "INTERMEDIATE",
            Self::DeterminedOff => "DETERMINED_OFF",
            Self::DeterminedOn => "DETERMINED_ON",
            Self::Indeterminate => "INDETERMINATE",
        }
    }
}

/// 测量点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointKind {
    Binary,
    DoubleBitBinary,
    BinaryOutputStatus,
    Analog,
    AnalogOutputStatus,
    Counter,
    FrozenCounter,
    OctetString,
    TimeAndInterval,
    BinaryCommandEvent,
    AnalogCommandEvent,
    SecurityStat,
    AbsoluteTime,
}

impl PointKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Binary => "Binary",
            Self::DoubleBitBinary => "DoubleBitBinary",
            Self::BinaryOutputStatus => "BinaryOutputStatus",
            Self::Analog => "Analog",
            Self::AnalogOutputStatus => "AnalogOutputStatus",
            Self::Counter => "Counter",
            Self::FrozenCounter => "FrozenCounter",
            Self::OctetString => "OctetString",
            Self::TimeAndInterval => "TimeAndInterval",
            Self::BinaryCommandEvent => "BinaryCommandEvent",
            Self::AnalogCommandEvent => "AnalogCommandEvent",
            Self::SecurityStat => "SecurityStat",
            Self::AbsoluteTime => "AbsoluteTime",
        }
    }
}

/// 测量值（按点类型区分的载荷）
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    Binary(bool),
    /// 原始 2 位编码，见 [`DoubleBit::from_code`]
    DoubleBitBinary(u8),
    BinaryOutputStatus(bool),
    Analog(f64),
    AnalogOutputStatus(f64),
    Counter(u32),
    FrozenCounter(u32),
    OctetString(Vec<u8>),
    TimeAndInterval { time_ms: u64, interval: u32, units: u8 },
    BinaryCommandEvent { value: bool, status: u8 },
    AnalogCommandEvent { value: f64, status: u8 },
    SecurityStat { value: u32, association: u16 },
    AbsoluteTime(u64),
}

impl Measurement {
    pub fn kind(&self) -> PointKind {
        match self {
            Self::Binary(_) => PointKind::Binary,
            Self::DoubleBitBinary(_) => PointKind::DoubleBitBinary,
            Self::BinaryOutputStatus(_) => PointKind::BinaryOutputStatus,
            Self::Analog(_) => PointKind::Analog,
            Self::AnalogOutputStatus(_) => PointKind::AnalogOutputStatus,
            Self::Counter(_) => PointKind::Counter,
            Self::FrozenCounter(_) => PointKind::FrozenCounter,
            Self::OctetString(_) => PointKind::OctetString,
            Self::TimeAndInterval { .. } => PointKind::TimeAndInterval,
            Self::BinaryCommandEvent { .. } => PointKind::BinaryCommandEvent,
            Self::AnalogCommandEvent { .. } => PointKind::AnalogCommandEvent,
            Self::SecurityStat { .. } => PointKind::SecurityStat,
            Self::AbsoluteTime(_) => PointKind::AbsoluteTime,
        }
    }
}

/// 报文对象头信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderInfo {
    /// 是否为事件变体（相对静态值）
    pub is_event_variation: bool,
    /// 对象是否携带品质标志
    pub flags_valid: bool,
}

/// 带索引的测量值
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedValue {
    pub index: u16,
    pub value: Measurement,
    pub flags: Flags,
    /// 外站时间戳（毫秒），无时标时为 0
    pub time_ms: u64,
}

impl IndexedValue {
    pub fn new(index: u16, value: Measurement, flags: Flags) -> Self {
        Self {
            index,
            value,
            flags,
            time_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_bit_codes() {
        for code in 0..=3u8 {
            let state = DoubleBit::from_code(code).expect("valid code");
            assert_eq!(state.code(), code);
        }
        assert_eq!(DoubleBit::from_code(4), None);
        assert_eq!(DoubleBit::DeterminedOff.as_str(), "DETERMINED_OFF");
    }

    #[test]
    fn flags_contains_mask() {
        let flags = Flags::ONLINE | Flags::STATE;
        assert!(flags.contains(Flags::ONLINE));
        assert!(flags.contains(Flags::STATE));
        assert!(!flags.contains(Flags::COMM_LOST));
        assert_eq!(Flags::from_bits_retain(0x81), flags);
    }

    #[test]
    fn measurement_kind() {
        assert_eq!(Measurement::Counter(1).kind(), PointKind::Counter);
        assert_eq!(
            Measurement::TimeAndInterval {
                time_ms: 0,
                interval: 1,
                units: 0
            }
            .kind(),
            PointKind::TimeAndInterval
        );
    }
}
