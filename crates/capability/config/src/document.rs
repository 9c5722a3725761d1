//! 配置文档条目读取。
//!
//! 条目值既可以是裸 JSON 值，也可以是带 `value`（或仅 `default`）字段的配置类目对象。
//! 字符串形式的数值/布尔值会按条目类型转换。

use crate::ConfigError;
use serde_json::{Map, Value};

pub(crate) struct Items<'a> {
    map: &'a Map<String, Value>,
    scope: Option<String>,
}

impl<'a> Items<'a> {
    pub(crate) fn new(map: &'a Map<String, Value>) -> Self {
        Self { map, scope: None }
    }

    /// 列表元素：错误信息中的键名带上 `scope.` 前缀。
    pub(crate) fn scoped(map: &'a Map<String, Value>, scope: String) -> Self {
        Self {
            map,
            scope: Some(scope),
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<&'a Value> {
        let value = self.map.get(key)?;
        match value {
            Value::Object(item) if item.contains_key("value") || item.contains_key("default") => {
                item.get("value").or_else(|| item.get("default"))
            }
            other => Some(other),
        }
    }

    pub(crate) fn string(&self, key: &str) -> Option<String> {
        self.get(key).map(scalar_to_string)
    }

    pub(crate) fn integer(&self, key: &str, min: i64, max: i64) -> Result<Option<i64>, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => text.trim().parse::<i64>().ok(),
            _ => None,
        };
        let parsed = parsed.ok_or_else(|| ConfigError::Invalid(self.key(key), scalar_to_string(value)))?;
        if parsed < min || parsed > max {
            return Err(ConfigError::OutOfRange {
                key: self.key(key),
                value: parsed,
                min,
                max,
            });
        }
        Ok(Some(parsed))
    }

    pub(crate) fn boolean(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        match value {
            Value::Bool(flag) => Ok(Some(*flag)),
            Value::String(text) => match text.trim() {
                "true" | "True" => Ok(Some(true)),
                "false" | "False" | "" => Ok(Some(false)),
                other => Err(ConfigError::Invalid(self.key(key), other.to_string())),
            },
            other => Err(ConfigError::Invalid(self.key(key), other.to_string())),
        }
    }

    pub(crate) fn key(&self, key: &str) -> String {
        match &self.scope {
            Some(scope) => format!("{}.{}", scope, key),
            None => key.to_string(),
        }
    }
}

pub(crate) fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
