//! DNP3 南向采集服务：加载配置、启动外站通道、提供管理接口。

mod handlers;
mod middleware;
mod routes;
mod sink;
mod utils;

use dnp3_config::{AppConfig, default_config};
use dnp3_protocol::{Dnp3Engine, ProtocolEngine};
use dnp3_supervisor::{ServiceError, SouthService};
use dnp3_telemetry::init_tracing;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SouthService>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    // 站点配置文档：未指定文件时使用内置默认配置
    let document: Value = match &config.config_path {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => default_config(),
    };

    let engine: Arc<dyn ProtocolEngine> = Arc::new(Dnp3Engine::new());
    let service = Arc::new(SouthService::new(
        config.service_name.clone(),
        engine.clone(),
        config.cert_store.clone(),
    ));
    service.configure(&document)?;

    let (ingest_sink, mqtt_task) = sink::build_sink(&config);
    service.register_ingest(ingest_sink);

    // 会话绑定失败的外站只记录告警，其余外站继续运行
    let started = match service.start().await {
        Ok(summary) => summary.started,
        Err(ServiceError::Attach { started, failed }) => {
            for endpoint in &failed {
                warn!(target: "dnp3.session", link_id = endpoint.link_id, reason = %endpoint.reason, "outstation_not_started");
            }
            started
        }
        Err(err) => return Err(err.into()),
    };
    info!(
        service = %config.service_name,
        started = started.len(),
        http_addr = %config.http_addr,
        "dnp3 south service running"
    );

    let app = routes::create_router(AppState {
        service: service.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 先拆通道再停引擎，确保没有残留的重连任务
    service.stop().await;
    engine.shutdown().await;
    if let Some(task) = mqtt_task {
        task.abort();
    }
    info!(service = %config.service_name, "dnp3 south service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("ctrl-c handler error: {}", err);
    }
}
