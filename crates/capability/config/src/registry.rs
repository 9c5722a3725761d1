//! 端点注册表
//!
//! 由配置文档生成不可变的 [`ConfigSnapshot`]（端点集合 + 会话参数）。
//! 解析本身无副作用，替换运行中的快照由调用方在配置锁内完成。

use crate::ConfigError;
use crate::document::{Items, scalar_to_string};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_ASSET_PREFIX: &str = "dnp3_";
pub const DEFAULT_MASTER_LINK_ID: u16 = 1;
pub const DEFAULT_TCP_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_TCP_PORT: u16 = 20000;
pub const DEFAULT_OUTSTATION_LINK_ID: u16 = 10;
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_TLS_CA_NAME: &str = "dnp3ca";
pub const DEFAULT_TLS_CERT_NAME: &str = "master1";
/// 链路地址上限（0xFFF0 及以上为保留地址）
pub const MAX_LINK_ID: u16 = 65519;

const MAX_SECONDS: i64 = u32::MAX as i64;

/// 端点传输安全模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// 沿用全局 TLS 开关
    #[default]
    InheritGlobal,
    ForceSecure,
    ForceInsecure,
}

impl TransportMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "" | "Use local default" => Some(Self::InheritGlobal),
            "Enable TLS" => Some(Self::ForceSecure),
            "Disable TLS" => Some(Self::ForceInsecure),
            _ => None,
        }
    }
}

/// 远端外站
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
    /// 外站链路地址，同时作为端点在运行期的键
    pub link_id: u16,
    pub transport: TransportMode,
    /// 端点专用 CA 证书名，空表示未设置
    pub ca_cert_name: String,
    /// 端点专用证书名，空表示未设置
    pub cert_name: String,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16, link_id: u16) -> Self {
        Self {
            address: address.into(),
            port,
            link_id,
            transport: TransportMode::InheritGlobal,
            ca_cert_name: String::new(),
            cert_name: String::new(),
        }
    }

    pub fn with_transport(mut self, transport: TransportMode) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_credentials(
        mut self,
        ca_cert_name: impl Into<String>,
        cert_name: impl Into<String>,
    ) -> Self {
        self.ca_cert_name = ca_cert_name.into();
        self.cert_name = cert_name.into();
        self
    }

    /// 资产名中使用的端点标签。
    pub fn label(&self) -> String {
        format!("remote_{}", self.link_id)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_TCP_ADDRESS, DEFAULT_TCP_PORT, DEFAULT_OUTSTATION_LINK_ID)
    }
}

/// 引擎诊断输出级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    #[default]
    None,
    Normal,
    Data,
    DataAndLink,
    All,
}

impl DiagnosticLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Normal" => Some(Self::Normal),
            "Data" => Some(Self::Data),
            "DataAndLink" => Some(Self::DataAndLink),
            "All" => Some(Self::All),
            _ => None,
        }
    }
}

/// 全局 TLS 默认值
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TlsDefaults {
    pub enabled: bool,
    pub ca_cert_name: String,
    pub cert_name: String,
}

impl Default for TlsDefaults {
    fn default() -> Self {
        Self {
            enabled: false,
            ca_cert_name: DEFAULT_TLS_CA_NAME.to_string(),
            cert_name: DEFAULT_TLS_CERT_NAME.to_string(),
        }
    }
}

/// 会话参数（所有端点共用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionParams {
    /// 主站本地链路地址
    pub local_link_id: u16,
    pub response_timeout: Duration,
    pub scan_enabled: bool,
    pub scan_interval: Duration,
    pub diagnostics: DiagnosticLevel,
    pub asset_prefix: String,
    pub tls: TlsDefaults,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            local_link_id: DEFAULT_MASTER_LINK_ID,
            response_timeout: Duration::from_secs(DEFAULT_RESPONSE_TIMEOUT_SECS),
            scan_enabled: false,
            scan_interval: Duration::from_secs(DEFAULT_SCAN_INTERVAL_SECS),
            diagnostics: DiagnosticLevel::None,
            asset_prefix: DEFAULT_ASSET_PREFIX.to_string(),
            tls: TlsDefaults::default(),
        }
    }
}

/// 配置快照：发布后只读，重新配置时整体替换。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSnapshot {
    pub endpoints: Vec<Endpoint>,
    pub session: SessionParams,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            endpoints: vec![Endpoint::default()],
            session: SessionParams::default(),
        }
    }
}

impl ConfigSnapshot {
    pub fn endpoint(&self, link_id: u16) -> Option<&Endpoint> {
        self.endpoints.iter().find(|endpoint| endpoint.link_id == link_id)
    }

    /// 由已解析的 JSON 文档构建快照。
    pub fn from_value(document: &Value) -> Result<Self, ConfigError> {
        let Value::Object(map) = document else {
            return Err(ConfigError::Parse(
                "configuration document must be a JSON object".to_string(),
            ));
        };
        let items = Items::new(map);
        let session = parse_session(&items)?;
        let endpoints = parse_endpoints(&items)?;
        validate(&endpoints, &session)?;
        Ok(Self { endpoints, session })
    }
}

/// 解析配置文档文本。
pub fn load_document(document: &str) -> Result<ConfigSnapshot, ConfigError> {
    let value: Value =
        serde_json::from_str(document).map_err(|err| ConfigError::Parse(err.to_string()))?;
    ConfigSnapshot::from_value(&value)
}

/// 读取并解析配置文档文件。
pub fn load_document_file(path: impl AsRef<Path>) -> Result<ConfigSnapshot, ConfigError> {
    let path = path.as_ref();
    let document = std::fs::read_to_string(path)
        .map_err(|err| ConfigError::Parse(format!("{}: {}", path.display(), err)))?;
    load_document(&document)
}

fn parse_session(items: &Items<'_>) -> Result<SessionParams, ConfigError> {
    let mut session = SessionParams::default();
    if let Some(asset) = items.string("asset") {
        session.asset_prefix = asset;
    }
    if let Some(master_id) = items.integer("master_id", 1, i64::from(MAX_LINK_ID))? {
        session.local_link_id = master_id as u16;
    }
    if let Some(enabled) = items.boolean("outstation_scan_enable")? {
        session.scan_enabled = enabled;
    }
    if let Some(interval) = items.integer("outstation_scan_interval", 1, MAX_SECONDS)? {
        session.scan_interval = Duration::from_secs(interval as u64);
    }
    if let Some(timeout) = items.integer("data_fetch_timeout", 1, MAX_SECONDS)? {
        session.response_timeout = Duration::from_secs(timeout as u64);
    }
    if let Some(level) = items.string("appLogLevel") {
        session.diagnostics = DiagnosticLevel::parse(&level).unwrap_or_else(|| {
            warn!(target: "dnp3.config", level = %level, "unknown appLogLevel, engine logging disabled");
            DiagnosticLevel::None
        });
    }
    if let Some(enabled) = items.boolean("enableTLS")? {
        session.tls.enabled = enabled;
    }
    if let Some(name) = items.string("TLSCAcertificate") {
        session.tls.ca_cert_name = name.trim().to_string();
    }
    if let Some(name) = items.string("TLScertificate") {
        session.tls.cert_name = name.trim().to_string();
    }
    Ok(session)
}

fn parse_endpoints(items: &Items<'_>) -> Result<Vec<Endpoint>, ConfigError> {
    let list = match items.get("outstations") {
        Some(value) => outstation_list(value)?,
        None => Vec::new(),
    };

    if list.is_empty() {
        let mut endpoint = Endpoint::default();
        if let Some(address) = items.string("outstation_tcp_address") {
            endpoint.address = address.trim().to_string();
        }
        if let Some(port) = items.integer("outstation_tcp_port", 1, 65535)? {
            endpoint.port = port as u16;
        }
        if let Some(link_id) = items.integer("outstation_id", 1, i64::from(MAX_LINK_ID))? {
            endpoint.link_id = link_id as u16;
        }
        return Ok(vec![endpoint]);
    }

    warn!(
        target: "dnp3.config",
        count = list.len(),
        "outstations list is set, single outstation items are ignored"
    );
    list.iter()
        .enumerate()
        .map(|(index, element)| match element {
            Value::Object(object) => endpoint_from_object(index, object),
            _ => Err(ConfigError::NotAnObject { index }),
        })
        .collect()
}

/// `outstations` 可以是 JSON 数组，也可以是内容为数组的字符串。
fn outstation_list(value: &Value) -> Result<Vec<Value>, ConfigError> {
    match value {
        Value::Array(list) => Ok(list.clone()),
        Value::String(text) if text.trim().is_empty() => Ok(Vec::new()),
        Value::String(text) => {
            let parsed: Value = serde_json::from_str(text)
                .map_err(|err| ConfigError::Parse(format!("outstations: {}", err)))?;
            match parsed {
                Value::Array(list) => Ok(list),
                _ => Err(ConfigError::NotAList("outstations".to_string())),
            }
        }
        _ => Err(ConfigError::NotAList("outstations".to_string())),
    }
}

fn endpoint_from_object(index: usize, object: &Map<String, Value>) -> Result<Endpoint, ConfigError> {
    let items = Items::scoped(object, format!("outstations[{}]", index));
    let mut endpoint = Endpoint::default();
    if let Some(address) = items.string("address") {
        endpoint.address = address.trim().to_string();
    }
    if let Some(port) = items.integer("port", 1, 65535)? {
        endpoint.port = port as u16;
    }
    if let Some(link_id) = items.integer("linkid", 1, i64::from(MAX_LINK_ID))? {
        endpoint.link_id = link_id as u16;
    }
    if let Some(mode) = items.get("TLS") {
        let mode = scalar_to_string(mode);
        endpoint.transport = TransportMode::parse(&mode)
            .ok_or_else(|| ConfigError::Invalid(items.key("TLS"), mode.clone()))?;
    }
    if let Some(name) = items.string("TLSCAcertificate") {
        endpoint.ca_cert_name = name.trim().to_string();
    }
    if let Some(name) = items.string("TLScertificate") {
        endpoint.cert_name = name.trim().to_string();
    }
    if endpoint.address.is_empty() {
        return Err(ConfigError::Invalid(items.key("address"), String::new()));
    }
    Ok(endpoint)
}

fn validate(endpoints: &[Endpoint], session: &SessionParams) -> Result<(), ConfigError> {
    if endpoints.iter().any(|endpoint| endpoint.address.is_empty()) {
        return Err(ConfigError::Invalid(
            "outstation_tcp_address".to_string(),
            String::new(),
        ));
    }

    let mut seen = HashSet::new();
    for endpoint in endpoints {
        if !seen.insert(endpoint.link_id) {
            return Err(ConfigError::DuplicateLinkId(endpoint.link_id));
        }
    }

    let tls = &session.tls;
    if tls.enabled {
        if tls.ca_cert_name.is_empty() {
            return Err(ConfigError::MissingCredential("TLSCAcertificate".to_string()));
        }
        if tls.cert_name.is_empty() {
            return Err(ConfigError::MissingCredential("TLScertificate".to_string()));
        }
    }

    for endpoint in endpoints {
        if endpoint.transport != TransportMode::ForceSecure {
            continue;
        }
        let own = !endpoint.ca_cert_name.is_empty() && !endpoint.cert_name.is_empty();
        let global = !tls.ca_cert_name.is_empty() && !tls.cert_name.is_empty();
        if !own && !global {
            return Err(ConfigError::MissingCredential(format!(
                "outstation {}",
                endpoint.link_id
            )));
        }
    }
    Ok(())
}
