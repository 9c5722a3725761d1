use crate::{IngestError, IngestSink};
use domain::Reading;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, warn};

/// MQTT 接收端配置。
#[derive(Debug, Clone)]
pub struct MqttSinkConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// 读数发布到 `{topic_prefix}/{asset_name}`
    pub topic_prefix: String,
    pub qos: u8,
}

/// 将读数以 JSON 发布到 MQTT。
///
/// 使用 `try_publish` 放入客户端请求队列，不在引擎回调线程中等待网络。
#[derive(Clone)]
pub struct MqttSink {
    client: AsyncClient,
    topic_prefix: String,
    qos: QoS,
}

impl MqttSink {
    /// 创建客户端并在当前 tokio 运行时中启动事件循环任务。
    pub fn connect(config: MqttSinkConfig) -> (Self, tokio::task::JoinHandle<()>) {
        let client_id = format!("dnp3-south-{}", uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (config.username, config.password) {
            options.set_credentials(username, password);
        }
        let (client, mut eventloop) = AsyncClient::new(options, 256);
        let handle = tokio::spawn(async move {
            loop {
                if let Err(err) = eventloop.poll().await {
                    warn!(target: "dnp3.ingest", "mqtt eventloop error: {}", err);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        });
        (
            Self {
                client,
                topic_prefix: config.topic_prefix,
                qos: qos_from_u8(config.qos),
            },
            handle,
        )
    }

    fn topic_for(&self, asset_name: &str) -> String {
        format!("{}/{}", self.topic_prefix.trim_end_matches('/'), asset_name)
    }
}

impl IngestSink for MqttSink {
    fn ingest(&self, reading: Reading) -> Result<(), IngestError> {
        let topic = self.topic_for(&reading.asset_name);
        let payload = reading_payload(&reading)?;
        debug!(
            target: "dnp3.ingest",
            asset = %reading.asset_name,
            topic = %topic,
            payload_size = payload.len(),
            "reading_publish"
        );
        self.client
            .try_publish(topic, self.qos, false, payload)
            .map_err(|err| IngestError::Publish(err.to_string()))
    }
}

/// `{"asset": .., "readings": {name: value, ..}, "ts_ms": ..}`
pub(crate) fn reading_payload(reading: &Reading) -> Result<Vec<u8>, IngestError> {
    let mut readings = Map::new();
    for point in &reading.datapoints {
        let value =
            serde_json::to_value(&point.value).map_err(|err| IngestError::Encode(err.to_string()))?;
        readings.insert(point.name.clone(), value);
    }
    let payload = json!({
        "asset": reading.asset_name,
        "readings": Value::Object(readings),
        "ts_ms": now_epoch_ms(),
    });
    serde_json::to_vec(&payload).map_err(|err| IngestError::Encode(err.to_string()))
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
