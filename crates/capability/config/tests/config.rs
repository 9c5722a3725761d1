use dnp3_config::{
    AppConfig, ConfigError, ConfigSnapshot, DiagnosticLevel, Endpoint, TransportMode,
    default_config, load_document,
};
use serde_json::json;
use std::time::Duration;

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("DNP3_SERVICE_NAME", "south1");
        std::env::set_var("DNP3_HTTP_ADDR", "127.0.0.1:8091");
        std::env::set_var("DNP3_MQTT_PORT", "1884");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.service_name, "south1");
    assert_eq!(config.http_addr, "127.0.0.1:8091");
    assert_eq!(config.mqtt_port, 1884);
    assert_eq!(config.mqtt_topic_prefix, "south1/readings");
}

#[test]
fn empty_document_uses_defaults() {
    let snapshot = load_document("{}").expect("snapshot");
    assert_eq!(snapshot, ConfigSnapshot::default());
    assert_eq!(snapshot.endpoints, vec![Endpoint::new("127.0.0.1", 20000, 10)]);
    assert_eq!(snapshot.session.asset_prefix, "dnp3_");
    assert_eq!(snapshot.session.response_timeout, Duration::from_secs(5));
}

#[test]
fn default_category_document_loads() {
    let snapshot = ConfigSnapshot::from_value(&default_config()).expect("snapshot");
    assert_eq!(snapshot.endpoints.len(), 1);
    assert_eq!(snapshot.session.diagnostics, DiagnosticLevel::Normal);
    assert!(!snapshot.session.scan_enabled);
    assert!(!snapshot.session.tls.enabled);
}

#[test]
fn inline_endpoint_items() {
    let document = json!({
        "asset": "site_",
        "master_id": { "value": "2" },
        "outstation_tcp_address": "192.168.0.10",
        "outstation_tcp_port": "20001",
        "outstation_id": 7,
        "outstation_scan_enable": "True",
        "outstation_scan_interval": "60",
        "appLogLevel": "Data"
    });
    let snapshot = ConfigSnapshot::from_value(&document).expect("snapshot");
    assert_eq!(snapshot.endpoints, vec![Endpoint::new("192.168.0.10", 20001, 7)]);
    assert_eq!(snapshot.session.local_link_id, 2);
    assert!(snapshot.session.scan_enabled);
    assert_eq!(snapshot.session.scan_interval, Duration::from_secs(60));
    assert_eq!(snapshot.session.diagnostics, DiagnosticLevel::Data);
    assert_eq!(snapshot.session.asset_prefix, "site_");
}

#[test]
fn outstation_list_takes_precedence() {
    let document = json!({
        "outstation_tcp_address": "10.0.0.99",
        "outstations": {
            "value": "[{\"address\":\"10.0.0.1\",\"port\":\"20000\",\"linkid\":\"10\"},{\"address\":\"10.0.0.2\",\"port\":20001,\"linkid\":11,\"TLS\":\"Disable TLS\"}]"
        }
    });
    let snapshot = ConfigSnapshot::from_value(&document).expect("snapshot");
    assert_eq!(snapshot.endpoints.len(), 2);
    assert_eq!(snapshot.endpoints[0], Endpoint::new("10.0.0.1", 20000, 10));
    assert_eq!(snapshot.endpoints[1].transport, TransportMode::ForceInsecure);
    assert!(snapshot.endpoint(11).is_some());
    assert!(snapshot.endpoints.iter().all(|endpoint| endpoint.address != "10.0.0.99"));
}

#[test]
fn empty_list_falls_back_to_inline_endpoint() {
    let document = json!({ "outstations": [], "outstation_id": 12 });
    let snapshot = ConfigSnapshot::from_value(&document).expect("snapshot");
    assert_eq!(snapshot.endpoints, vec![Endpoint::new("127.0.0.1", 20000, 12)]);
}

#[test]
fn list_must_be_a_list() {
    let err = ConfigSnapshot::from_value(&json!({ "outstations": "{\"address\":\"x\"}" }))
        .unwrap_err();
    assert!(matches!(err, ConfigError::NotAList(_)));

    let err = ConfigSnapshot::from_value(&json!({ "outstations": 5 })).unwrap_err();
    assert!(matches!(err, ConfigError::NotAList(_)));
}

#[test]
fn list_elements_must_be_objects() {
    let err = ConfigSnapshot::from_value(&json!({
        "outstations": [{ "address": "10.0.0.1" }, "10.0.0.2"]
    }))
    .unwrap_err();
    assert!(matches!(err, ConfigError::NotAnObject { index: 1 }));
}

#[test]
fn port_out_of_range_is_rejected() {
    let err = ConfigSnapshot::from_value(&json!({
        "outstations": [{ "address": "10.0.0.1", "port": 70000, "linkid": 10 }]
    }))
    .unwrap_err();
    match err {
        ConfigError::OutOfRange { key, value, .. } => {
            assert_eq!(key, "outstations[0].port");
            assert_eq!(value, 70000);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn duplicate_link_ids_are_rejected() {
    let err = ConfigSnapshot::from_value(&json!({
        "outstations": [
            { "address": "10.0.0.1", "linkid": 10 },
            { "address": "10.0.0.2", "linkid": 10 }
        ]
    }))
    .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateLinkId(10)));
}

#[test]
fn global_tls_needs_credential_names() {
    let err = ConfigSnapshot::from_value(&json!({
        "enableTLS": "true",
        "TLSCAcertificate": ""
    }))
    .unwrap_err();
    assert!(matches!(err, ConfigError::MissingCredential(_)));
}

#[test]
fn forced_tls_endpoint_without_any_names_is_rejected() {
    let err = ConfigSnapshot::from_value(&json!({
        "TLSCAcertificate": "",
        "TLScertificate": "",
        "outstations": [{ "address": "10.0.0.1", "linkid": 10, "TLS": "Enable TLS" }]
    }))
    .unwrap_err();
    assert!(matches!(err, ConfigError::MissingCredential(_)));

    let snapshot = ConfigSnapshot::from_value(&json!({
        "TLSCAcertificate": "",
        "TLScertificate": "",
        "outstations": [{
            "address": "10.0.0.1",
            "linkid": 10,
            "TLS": "Enable TLS",
            "TLSCAcertificate": "siteca",
            "TLScertificate": "site"
        }]
    }))
    .expect("snapshot");
    assert_eq!(snapshot.endpoints[0].ca_cert_name, "siteca");
}

#[test]
fn unknown_tls_mode_is_invalid() {
    let err = ConfigSnapshot::from_value(&json!({
        "outstations": [{ "address": "10.0.0.1", "TLS": "sometimes" }]
    }))
    .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(key, _) if key == "outstations[0].TLS"));
}

#[test]
fn unknown_log_level_disables_engine_logging() {
    let snapshot = ConfigSnapshot::from_value(&json!({ "appLogLevel": "Chatty" })).expect("snapshot");
    assert_eq!(snapshot.session.diagnostics, DiagnosticLevel::None);
}

#[test]
fn malformed_document_is_a_parse_error() {
    assert!(matches!(load_document("[1, 2"), Err(ConfigError::Parse(_))));
    assert!(matches!(load_document("[]"), Err(ConfigError::Parse(_))));
}
