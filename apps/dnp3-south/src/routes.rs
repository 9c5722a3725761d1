//! 路由定义
//!
//! - 健康检查：/health
//! - 管理接口：/api/channels, /api/config, /api/metrics, /api/plugin-info, /api/reconfigure

use crate::AppState;
use crate::handlers::*;
use crate::middleware::request_context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/channels", get(list_channels))
        .route("/api/config", get(get_config))
        .route("/api/metrics", get(get_metrics))
        .route("/api/plugin-info", get(get_plugin_info))
        .route("/api/reconfigure", post(reconfigure))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(request_context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use dnp3_ingest::NoopSink;
    use dnp3_protocol::InMemoryEngine;
    use dnp3_supervisor::SouthService;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn started_state(engine: &Arc<InMemoryEngine>) -> AppState {
        let service = Arc::new(SouthService::new("dnp3", engine.clone(), "/tmp/certs"));
        service.register_ingest(Arc::new(NoopSink));
        service
            .configure(&json!({ "outstations": [{ "address": "10.0.0.1", "linkid": 10 }] }))
            .unwrap();
        service.start().await.unwrap();
        AppState { service }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_carries_request_ids() {
        let engine = Arc::new(InMemoryEngine::new());
        let app = create_router(started_state(&engine).await);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert!(response.headers().contains_key("x-trace-id"));
    }

    #[tokio::test]
    async fn channels_are_listed() {
        let engine = Arc::new(InMemoryEngine::new());
        let app = create_router(started_state(&engine).await);
        let response = app
            .oneshot(Request::get("/api/channels").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"][0]["link_id"], 10);
        assert_eq!(body["data"][0]["channel"], "dnp3_remote_10");
        assert_eq!(body["data"][0]["state"], "open");
    }

    #[tokio::test]
    async fn invalid_reconfigure_is_bad_request() {
        let engine = Arc::new(InMemoryEngine::new());
        let state = started_state(&engine).await;
        let app = create_router(state.clone());
        let document = json!({ "outstations": [{ "address": "10.0.0.2", "port": 0 }] });
        let response = app
            .oneshot(
                Request::post("/api/reconfigure")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(document.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "CONFIG.INVALID");
        assert_eq!(engine.active_channels().len(), 1);
        assert_eq!(state.service.snapshot().endpoints[0].link_id, 10);
    }

    #[tokio::test]
    async fn reconfigure_rebuilds_channels() {
        let engine = Arc::new(InMemoryEngine::new());
        let app = create_router(started_state(&engine).await);
        let document = json!({
            "outstations": [
                { "address": "10.0.0.2", "linkid": 20 },
                { "address": "10.0.0.3", "linkid": 21 }
            ]
        });
        let response = app
            .oneshot(
                Request::post("/api/reconfigure")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(document.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["started"], json!([20, 21]));
        assert_eq!(engine.active_channels().len(), 2);
    }

    #[tokio::test]
    async fn plugin_info_is_served() {
        let engine = Arc::new(InMemoryEngine::new());
        let app = create_router(started_state(&engine).await);
        let response = app
            .oneshot(Request::get("/api/plugin-info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["data"]["name"], "dnp3");
        assert_eq!(body["data"]["type"], "south");
        assert!(body["data"]["config"]["plugin"].is_object());
    }
}
