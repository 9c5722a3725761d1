use dnp3_config::ConfigError;
use dnp3_ingest::{ChannelSink, NoopSink};
use dnp3_protocol::{
    ChannelHandle, ChannelState, ClassField, Flags, HeaderInfo, InMemoryEngine, IndexedValue,
    Measurement,
};
use dnp3_supervisor::{ConnectError, ServiceError, SouthService};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn outstations(link_ids: &[u16]) -> Value {
    let list: Vec<Value> = link_ids
        .iter()
        .map(|link_id| {
            json!({
                "address": format!("10.0.0.{}", link_id),
                "port": "20000",
                "linkid": link_id.to_string()
            })
        })
        .collect();
    json!({ "outstations": list })
}

fn service(engine: &Arc<InMemoryEngine>) -> SouthService {
    let service = SouthService::new("dnp3", engine.clone(), "/var/lib/dnp3/certs");
    service.register_ingest(Arc::new(NoopSink));
    service
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn start_opens_one_channel_and_one_session_per_endpoint() {
    let engine = Arc::new(InMemoryEngine::new());
    let service = service(&engine);
    service.configure(&outstations(&[10, 11, 12])).unwrap();

    let summary = service.start().await.unwrap();
    assert_eq!(summary.started, vec![10, 11, 12]);

    let channels = engine.active_channels();
    assert_eq!(channels.len(), 3);
    for channel in &channels {
        assert_eq!(channel.masters().len(), 1);
        assert!(channel.masters()[0].is_enabled());
        assert_eq!(channel.state(), ChannelState::Open);
    }

    let statuses = service.channel_statuses().await;
    assert_eq!(statuses.len(), 3);
    assert_eq!(statuses[0].channel, "dnp3_remote_10");
    assert_eq!(statuses[0].address, "10.0.0.10");
    assert!(!statuses[0].secure);
    assert!(service.is_running().await);
}

#[tokio::test]
async fn session_uses_link_identity_and_disables_startup_integrity() {
    let engine = Arc::new(InMemoryEngine::new());
    let service = service(&engine);
    service
        .configure(&json!({
            "master_id": 3,
            "outstation_id": 21,
            "data_fetch_timeout": 9,
            "outstation_scan_enable": "true",
            "outstation_scan_interval": 60
        }))
        .unwrap();
    service.start().await.unwrap();

    let channel = engine.channel("dnp3_remote_21").expect("channel");
    let master = channel.master(21).expect("master");
    let config = master.config();
    assert_eq!(config.alias, "master_3");
    assert_eq!(config.link.local_addr, 3);
    assert_eq!(config.response_timeout, Duration::from_secs(9));
    assert!(config.startup_integrity.is_empty());

    let scans = master.scans();
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].classes, ClassField::all());
    assert_eq!(scans[0].period, Duration::from_secs(60));
}

#[tokio::test]
async fn no_scan_when_disabled() {
    let engine = Arc::new(InMemoryEngine::new());
    let service = service(&engine);
    service.configure(&json!({})).unwrap();
    service.start().await.unwrap();

    let master = engine.channel("dnp3_remote_10").and_then(|c| c.master(10)).expect("master");
    assert!(master.scans().is_empty());
}

#[tokio::test]
async fn reconfigure_leaves_no_old_channels() {
    let engine = Arc::new(InMemoryEngine::new());
    let service = service(&engine);
    service.configure(&outstations(&[10, 11, 12])).unwrap();
    service.start().await.unwrap();
    let old = engine.active_channels();

    let summary = service.reconfigure(&outstations(&[20, 21])).await.unwrap();
    assert_eq!(summary.started, vec![20, 21]);

    let active = engine.active_channels();
    assert_eq!(active.len(), 2);
    assert!(old.iter().all(|channel| channel.is_shut_down()));
    assert!(old
        .iter()
        .flat_map(|channel| channel.masters())
        .all(|master| master.is_shut_down()));
    assert_eq!(engine.channels().len(), 5);
    assert_eq!(service.snapshot().endpoints.len(), 2);
}

#[tokio::test]
async fn invalid_reconfigure_keeps_snapshot_and_channels() {
    let engine = Arc::new(InMemoryEngine::new());
    let service = service(&engine);
    service.configure(&outstations(&[10])).unwrap();
    service.start().await.unwrap();
    let before = service.snapshot();

    let err = service
        .reconfigure(&json!({
            "outstations": [{ "address": "10.0.0.30", "port": 70000, "linkid": 30 }]
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Config(ConfigError::OutOfRange { .. })));

    assert!(Arc::ptr_eq(&before, &service.snapshot()));
    let active = engine.active_channels();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].config().alias, "dnp3_remote_10");
    assert_eq!(active[0].disable_calls(), 0);
}

#[tokio::test]
async fn keep_alive_failure_cycles_the_same_channel_once() {
    let engine = Arc::new(InMemoryEngine::new());
    let service = service(&engine);
    service.configure(&outstations(&[10])).unwrap();
    service.start().await.unwrap();

    let channel = engine.channel("dnp3_remote_10").expect("channel");
    assert_eq!(channel.state(), ChannelState::Open);

    engine.set_accepting(false);
    channel.simulate_keep_alive_failure();
    wait_until(|| channel.enable_calls() == 1).await;
    assert_eq!(channel.disable_calls(), 1);
    assert_eq!(channel.state(), ChannelState::Connecting);
    assert!(!channel.is_shut_down());
    assert_eq!(channel.masters().len(), 1);

    engine.set_accepting(true);
    assert_eq!(channel.state(), ChannelState::Open);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(channel.disable_calls(), 1);
    assert_eq!(channel.enable_calls(), 1);
    assert_eq!(engine.channels().len(), 1);
}

#[tokio::test]
async fn connect_error_rolls_back_started_channels() {
    let engine = Arc::new(InMemoryEngine::new());
    engine.reject_host("10.0.0.12");
    let service = service(&engine);
    service.configure(&outstations(&[10, 11, 12, 13])).unwrap();

    let err = service.start().await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Connect(ConnectError::Engine { link_id: 12, .. })
    ));
    assert!(engine.active_channels().is_empty());
    assert_eq!(engine.channels().len(), 2);
    assert!(service.channel_statuses().await.is_empty());
    assert!(!service.is_running().await);
}

#[tokio::test]
async fn attach_error_fails_start_but_keeps_healthy_endpoints() {
    let engine = Arc::new(InMemoryEngine::new());
    engine.refuse_link(11);
    let service = service(&engine);
    service.configure(&outstations(&[10, 11, 12])).unwrap();

    let err = service.start().await.unwrap_err();
    let ServiceError::Attach { started, failed } = err else {
        panic!("expected attach failure, got {err:?}");
    };
    assert_eq!(started, vec![10, 12]);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].link_id, 11);
    assert!(service.is_running().await);

    assert_eq!(engine.active_channels().len(), 2);
    assert!(engine.channel("dnp3_remote_11").is_none());
    let links: Vec<u16> = service
        .channel_statuses()
        .await
        .iter()
        .map(|status| status.link_id)
        .collect();
    assert_eq!(links, vec![10, 12]);

    service.stop().await;
    assert!(engine.active_channels().is_empty());
}

#[tokio::test]
async fn start_requires_a_sink() {
    let engine = Arc::new(InMemoryEngine::new());
    let service = SouthService::new("dnp3", engine.clone(), "/tmp");
    let err = service.start().await.unwrap_err();
    assert!(matches!(err, ServiceError::SinkNotRegistered));
    assert!(engine.channels().is_empty());
}

#[tokio::test]
async fn second_start_is_rejected_and_stop_allows_restart() {
    let engine = Arc::new(InMemoryEngine::new());
    let service = service(&engine);
    service.start().await.unwrap();
    assert!(matches!(service.start().await, Err(ServiceError::AlreadyRunning)));

    service.stop().await;
    assert!(engine.active_channels().is_empty());
    service.stop().await;

    service.start().await.unwrap();
    assert_eq!(engine.active_channels().len(), 1);
}

#[tokio::test]
async fn secure_channels_get_credential_paths() {
    let engine = Arc::new(InMemoryEngine::new());
    let service = service(&engine);
    service
        .configure(&json!({
            "enableTLS": true,
            "outstations": [
                { "address": "10.0.0.1", "linkid": 10 },
                { "address": "10.0.0.2", "linkid": 11, "TLS": "Disable TLS" },
                {
                    "address": "10.0.0.3",
                    "linkid": 12,
                    "TLSCAcertificate": "siteca",
                    "TLScertificate": "site"
                }
            ]
        }))
        .unwrap();
    service.start().await.unwrap();

    let store = PathBuf::from("/var/lib/dnp3/certs");
    let inherited = engine.channel("dnp3_remote_10").expect("channel");
    let tls = inherited.config().tls.clone().expect("tls");
    assert_eq!(tls.ca_cert_path, store.join("dnp3ca.cert"));
    assert_eq!(tls.key_path, store.join("master1.key"));

    assert!(engine.channel("dnp3_remote_11").expect("channel").config().tls.is_none());

    let own = engine.channel("dnp3_remote_12").expect("channel");
    let tls = own.config().tls.clone().expect("tls");
    assert_eq!(tls.ca_cert_path, store.join("siteca.cert"));
    assert_eq!(tls.cert_path, store.join("site.cert"));

    let statuses = service.channel_statuses().await;
    assert!(statuses[0].secure);
    assert!(!statuses[1].secure);
}

#[tokio::test]
async fn malformed_credential_name_aborts_start() {
    let engine = Arc::new(InMemoryEngine::new());
    let service = service(&engine);
    service
        .configure(&json!({ "enableTLS": true, "TLScertificate": "../master1" }))
        .unwrap();
    let err = service.start().await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Connect(ConnectError::Credentials { link_id: 10, .. })
    ));
    assert!(engine.channels().is_empty());
}

#[tokio::test]
async fn events_reach_the_registered_sink() {
    let engine = Arc::new(InMemoryEngine::new());
    let service = SouthService::new("dnp3", engine.clone(), "/tmp");
    let (sink, mut rx) = ChannelSink::new();
    service.register_ingest(Arc::new(sink));
    service.configure(&outstations(&[10])).unwrap();
    service.start().await.unwrap();

    let master = engine.channel("dnp3_remote_10").and_then(|c| c.master(10)).expect("master");
    let delivered = master.deliver(
        HeaderInfo::default(),
        vec![
            IndexedValue::new(3, Measurement::Analog(21.5), Flags::ONLINE),
            IndexedValue::new(4, Measurement::Analog(1.0), Flags::empty()),
            IndexedValue::new(1, Measurement::DoubleBitBinary(1), Flags::ONLINE),
        ],
    );
    assert_eq!(delivered, 3);

    let first = rx.recv().await.expect("reading");
    assert_eq!(first.asset_name, "dnp3_remote_10_Analog_3");
    assert_eq!(
        first.datapoint("Analog3"),
        Some(&domain::DatapointValue::Float(21.5))
    );
    let second = rx.recv().await.expect("reading");
    assert_eq!(second.asset_name, "dnp3_remote_10_DoubleBitBinary_1");
    assert!(rx.try_recv().is_err());
}
