use serde::Serialize;

/// 数据点值的数据类型。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DatapointValue {
    Integer(i64),
    Float(f64),
    String(String),
}

impl DatapointValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for DatapointValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(v) => f.write_str(v),
        }
    }
}

/// 具名数据点。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Datapoint {
    pub name: String,
    pub value: DatapointValue,
}

impl Datapoint {
    pub fn new(name: impl Into<String>, value: DatapointValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// 标准化后的读数：一个资产名 + 有序数据点列表。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub asset_name: String,
    pub datapoints: Vec<Datapoint>,
}

impl Reading {
    pub fn new(asset_name: impl Into<String>, datapoints: Vec<Datapoint>) -> Self {
        Self {
            asset_name: asset_name.into(),
            datapoints,
        }
    }

    /// 按名称查找数据点。
    pub fn datapoint(&self, name: &str) -> Option<&DatapointValue> {
        self.datapoints
            .iter()
            .find(|point| point.name == name)
            .map(|point| &point.value)
    }
}
