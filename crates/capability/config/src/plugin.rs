//! 插件信息描述与默认配置文档。

use crate::registry::{
    DEFAULT_ASSET_PREFIX, DEFAULT_MASTER_LINK_ID, DEFAULT_OUTSTATION_LINK_ID,
    DEFAULT_RESPONSE_TIMEOUT_SECS, DEFAULT_SCAN_INTERVAL_SECS, DEFAULT_TCP_ADDRESS,
    DEFAULT_TCP_PORT, DEFAULT_TLS_CA_NAME, DEFAULT_TLS_CERT_NAME,
};
use serde::Serialize;
use serde_json::{Value, json};

pub const PLUGIN_NAME: &str = "dnp3";
pub const INTERFACE_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub flags: Vec<&'static str>,
    #[serde(rename = "type")]
    pub plugin_type: &'static str,
    pub interface: &'static str,
    pub config: Value,
}

pub fn plugin_info() -> PluginInfo {
    PluginInfo {
        name: PLUGIN_NAME,
        version: env!("CARGO_PKG_VERSION"),
        flags: vec!["async"],
        plugin_type: "south",
        interface: INTERFACE_VERSION,
        config: default_config(),
    }
}

/// 默认配置类目。条目只带 `default`，加载时等价于全部取默认值。
pub fn default_config() -> Value {
    json!({
        "plugin": {
            "description": "DNP3 master south plugin",
            "type": "string",
            "default": PLUGIN_NAME,
            "readonly": "true"
        },
        "asset": {
            "description": "Asset name prefix for ingested readings",
            "type": "string",
            "default": DEFAULT_ASSET_PREFIX,
            "order": "1"
        },
        "master_id": {
            "description": "Link address of the master",
            "type": "integer",
            "default": DEFAULT_MASTER_LINK_ID.to_string(),
            "minimum": "1",
            "maximum": "65519",
            "order": "2"
        },
        "outstation_tcp_address": {
            "description": "Outstation TCP/IP address",
            "type": "string",
            "default": DEFAULT_TCP_ADDRESS,
            "order": "3"
        },
        "outstation_tcp_port": {
            "description": "Outstation TCP/IP port",
            "type": "integer",
            "default": DEFAULT_TCP_PORT.to_string(),
            "minimum": "1",
            "maximum": "65535",
            "order": "4"
        },
        "outstation_id": {
            "description": "Link address of the outstation",
            "type": "integer",
            "default": DEFAULT_OUTSTATION_LINK_ID.to_string(),
            "minimum": "1",
            "maximum": "65519",
            "order": "5"
        },
        "outstations": {
            "description": "List of outstations, overrides the single outstation items",
            "type": "list",
            "items": "object",
            "default": "[]",
            "order": "6"
        },
        "outstation_scan_enable": {
            "description": "Enable periodic integrity scan",
            "type": "boolean",
            "default": "false",
            "order": "7"
        },
        "outstation_scan_interval": {
            "description": "Integrity scan interval in seconds",
            "type": "integer",
            "default": DEFAULT_SCAN_INTERVAL_SECS.to_string(),
            "minimum": "1",
            "order": "8"
        },
        "data_fetch_timeout": {
            "description": "Application response timeout in seconds",
            "type": "integer",
            "default": DEFAULT_RESPONSE_TIMEOUT_SECS.to_string(),
            "minimum": "1",
            "order": "9"
        },
        "appLogLevel": {
            "description": "Protocol engine diagnostic level",
            "type": "enumeration",
            "options": ["Normal", "Data", "DataAndLink", "All"],
            "default": "Normal",
            "order": "10"
        },
        "enableTLS": {
            "description": "Use TLS for outstations that inherit the global setting",
            "type": "boolean",
            "default": "false",
            "order": "11"
        },
        "TLSCAcertificate": {
            "description": "CA certificate name in the certificate store",
            "type": "string",
            "default": DEFAULT_TLS_CA_NAME,
            "order": "12"
        },
        "TLScertificate": {
            "description": "Master certificate name in the certificate store",
            "type": "string",
            "default": DEFAULT_TLS_CERT_NAME,
            "order": "13"
        }
    })
}
