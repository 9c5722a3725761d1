//! 系统信息
//!
//! - GET /health
//! - GET /api/metrics
//! - GET /api/plugin-info

use crate::utils::response::ok;
use axum::{Json, response::{IntoResponse, Response}};
use dnp3_supervisor::plugin_info;
use dnp3_telemetry::metrics;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

pub async fn get_metrics() -> Response {
    ok(metrics().snapshot())
}

pub async fn get_plugin_info() -> Response {
    ok(plugin_info())
}
