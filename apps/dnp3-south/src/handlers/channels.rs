//! 通道与配置
//!
//! - GET /api/channels：各外站通道状态
//! - GET /api/config：当前发布的配置快照
//! - POST /api/reconfigure：提交新配置文档，校验通过后重建全部通道

use crate::AppState;
use crate::utils::response::{ok, service_error};
use axum::{Json, extract::State, response::Response};
use serde_json::Value;
use tracing::info;

pub async fn list_channels(State(state): State<AppState>) -> Response {
    ok(state.service.channel_statuses().await)
}

pub async fn get_config(State(state): State<AppState>) -> Response {
    ok(state.service.snapshot().as_ref().clone())
}

pub async fn reconfigure(State(state): State<AppState>, Json(document): Json<Value>) -> Response {
    match state.service.reconfigure(&document).await {
        Ok(summary) => {
            info!(
                target: "dnp3.config",
                started = summary.started.len(),
                "reconfigured via api"
            );
            ok(summary)
        }
        Err(err) => service_error(err),
    }
}
