//! 传输选择：按端点模式与全局 TLS 开关决定明文或 TLS，并选出证书名。

use crate::error::ConnectError;
use dnp3_config::{Endpoint, SessionParams, TransportMode};
use dnp3_protocol::TlsConfig;
use std::path::Path;

/// TLS 证书名（不含目录与后缀）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ca_cert_name: String,
    pub cert_name: String,
}

impl Credentials {
    /// 在证书仓库目录下拼出文件路径：
    /// `<store>/<ca>.cert`、`<store>/<cert>.cert`、`<store>/<cert>.key`。
    pub fn tls_config(&self, store: &Path, link_id: u16) -> Result<TlsConfig, ConnectError> {
        check_name(&self.ca_cert_name, link_id)?;
        check_name(&self.cert_name, link_id)?;
        Ok(TlsConfig {
            ca_cert_path: store.join(format!("{}.cert", self.ca_cert_name)),
            cert_path: store.join(format!("{}.cert", self.cert_name)),
            key_path: store.join(format!("{}.key", self.cert_name)),
        })
    }
}

fn check_name(name: &str, link_id: u16) -> Result<(), ConnectError> {
    if name.is_empty() {
        return Err(ConnectError::Credentials {
            link_id,
            reason: "empty credential name".to_string(),
        });
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(ConnectError::Credentials {
            link_id,
            reason: format!("credential name '{}' must not contain a path", name),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportChoice {
    Insecure,
    Secure(Credentials),
}

impl TransportChoice {
    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Secure(_))
    }
}

/// 端点专用证书名两者都非空时优先，否则使用全局默认证书名。
pub fn resolve(endpoint: &Endpoint, session: &SessionParams) -> TransportChoice {
    let secure = match endpoint.transport {
        TransportMode::ForceInsecure => false,
        TransportMode::ForceSecure => true,
        TransportMode::InheritGlobal => session.tls.enabled,
    };
    if !secure {
        return TransportChoice::Insecure;
    }
    let credentials = if !endpoint.ca_cert_name.is_empty() && !endpoint.cert_name.is_empty() {
        Credentials {
            ca_cert_name: endpoint.ca_cert_name.clone(),
            cert_name: endpoint.cert_name.clone(),
        }
    } else {
        Credentials {
            ca_cert_name: session.tls.ca_cert_name.clone(),
            cert_name: session.tls.cert_name.clone(),
        }
    };
    TransportChoice::Secure(credentials)
}
