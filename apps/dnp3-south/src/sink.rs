//! 读数接收端装配

use dnp3_config::AppConfig;
use dnp3_ingest::{IngestError, IngestSink, MqttSink, MqttSinkConfig};
use domain::Reading;
use std::sync::Arc;
use tracing::info;

/// 未启用 MQTT 时把读数写入日志。
#[derive(Debug, Default)]
pub struct LoggingSink;

impl IngestSink for LoggingSink {
    fn ingest(&self, reading: Reading) -> Result<(), IngestError> {
        for point in &reading.datapoints {
            info!(
                target: "dnp3.ingest",
                asset = %reading.asset_name,
                datapoint = %point.name,
                value = %point.value,
                "reading"
            );
        }
        Ok(())
    }
}

pub fn build_sink(
    config: &AppConfig,
) -> (Arc<dyn IngestSink>, Option<tokio::task::JoinHandle<()>>) {
    if !config.mqtt_enabled {
        info!(target: "dnp3.ingest", "mqtt disabled, readings are logged");
        return (Arc::new(LoggingSink), None);
    }
    let (sink, task) = MqttSink::connect(MqttSinkConfig {
        host: config.mqtt_host.clone(),
        port: config.mqtt_port,
        username: config.mqtt_username.clone(),
        password: config.mqtt_password.clone(),
        topic_prefix: config.mqtt_topic_prefix.clone(),
        qos: config.mqtt_qos,
    });
    info!(
        target: "dnp3.ingest",
        host = %config.mqtt_host,
        port = config.mqtt_port,
        topic_prefix = %config.mqtt_topic_prefix,
        "mqtt sink enabled"
    );
    (Arc::new(sink), Some(task))
}
