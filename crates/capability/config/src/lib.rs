//! 配置加载：进程级环境变量配置与站点配置文档（端点注册表）。

mod document;
mod plugin;
mod registry;

pub use plugin::{INTERFACE_VERSION, PLUGIN_NAME, PluginInfo, default_config, plugin_info};
pub use registry::{
    ConfigSnapshot, DEFAULT_ASSET_PREFIX, DEFAULT_MASTER_LINK_ID, DEFAULT_OUTSTATION_LINK_ID,
    DEFAULT_RESPONSE_TIMEOUT_SECS, DEFAULT_SCAN_INTERVAL_SECS, DEFAULT_TCP_ADDRESS,
    DEFAULT_TCP_PORT, DEFAULT_TLS_CA_NAME, DEFAULT_TLS_CERT_NAME, DiagnosticLevel, Endpoint,
    MAX_LINK_ID, SessionParams, TlsDefaults, TransportMode, load_document, load_document_file,
};

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("{key} out of range {min}..={max}: {value}")]
    OutOfRange {
        key: String,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("config document parse error: {0}")]
    Parse(String),
    #[error("'{0}' is not a list")]
    NotAList(String),
    #[error("outstations[{index}] is not an object")]
    NotAnObject { index: usize },
    #[error("duplicate outstation link id: {0}")]
    DuplicateLinkId(u16),
    #[error("missing TLS credential name: {0}")]
    MissingCredential(String),
}

/// 进程运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 服务实例名，用作通道别名前缀
    pub service_name: String,
    /// 站点配置文档路径；未设置时使用内置默认文档
    pub config_path: Option<String>,
    /// 证书仓库目录
    pub cert_store: String,
    pub http_addr: String,
    pub mqtt_enabled: bool,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_topic_prefix: String,
    pub mqtt_qos: u8,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let service_name = env::var("DNP3_SERVICE_NAME").unwrap_or_else(|_| "dnp3".to_string());
        if service_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "DNP3_SERVICE_NAME".to_string(),
                service_name,
            ));
        }
        let config_path = read_optional("DNP3_CONFIG_PATH");
        let cert_store =
            env::var("DNP3_CERT_STORE").unwrap_or_else(|_| "data/etc/certs".to_string());
        let http_addr = env::var("DNP3_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8090".to_string());
        let mqtt_enabled = read_bool_with_default("DNP3_MQTT", false);
        let mqtt_host = env::var("DNP3_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = read_u16_with_default("DNP3_MQTT_PORT", 1883)?;
        let mqtt_username = read_optional("DNP3_MQTT_USERNAME");
        let mqtt_password = read_optional("DNP3_MQTT_PASSWORD");
        let mqtt_topic_prefix = env::var("DNP3_MQTT_TOPIC_PREFIX")
            .unwrap_or_else(|_| format!("{}/readings", service_name));
        let mqtt_qos = read_u8_with_default("DNP3_MQTT_QOS", 1)?;
        if mqtt_qos > 2 {
            return Err(ConfigError::Invalid(
                "DNP3_MQTT_QOS".to_string(),
                mqtt_qos.to_string(),
            ));
        }

        Ok(Self {
            service_name,
            config_path,
            cert_store,
            http_addr,
            mqtt_enabled,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_topic_prefix,
            mqtt_qos,
        })
    }
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u8_with_default(key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
