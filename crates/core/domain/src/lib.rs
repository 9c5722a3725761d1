//! 南向采集共享的输出模型。
//!
//! 协议事件经标准化后统一表示为 [`Reading`]：资产名 + 有序的 (名称, 值) 列表，
//! 值只可能是整数、浮点数或短字符串三者之一。

pub mod data;

pub use data::{Datapoint, DatapointValue, Reading};
