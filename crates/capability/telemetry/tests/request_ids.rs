use dnp3_telemetry::{metrics, new_request_ids, record_channel_opened, record_event_received};

#[test]
fn request_ids_non_empty() {
    let ids = new_request_ids();
    assert!(!ids.request_id.is_empty());
    assert!(!ids.trace_id.is_empty());
    assert_ne!(ids.request_id, ids.trace_id);
}

#[test]
fn counters_only_grow() {
    let before = metrics().snapshot();
    record_event_received();
    record_channel_opened();
    let after = metrics().snapshot();
    assert!(after.events_received > before.events_received);
    assert!(after.channels_opened > before.channels_opened);
}
