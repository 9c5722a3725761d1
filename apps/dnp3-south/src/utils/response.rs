//! 统一响应封装与错误响应

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dnp3_supervisor::ServiceError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// 服务错误 -> HTTP 状态码 + 错误码
pub fn service_error(err: ServiceError) -> Response {
    let (status, code) = match &err {
        ServiceError::Config(_) => (StatusCode::BAD_REQUEST, "CONFIG.INVALID"),
        ServiceError::Connect(_) => (StatusCode::BAD_GATEWAY, "CHANNEL.CONNECT_FAILED"),
        ServiceError::Attach { .. } => (StatusCode::BAD_GATEWAY, "SESSION.ATTACH_FAILED"),
        ServiceError::SinkNotRegistered => (StatusCode::INTERNAL_SERVER_ERROR, "INGEST.NO_SINK"),
        ServiceError::AlreadyRunning => (StatusCode::CONFLICT, "SERVICE.RUNNING"),
    };
    (status, Json(ApiResponse::<()>::error(code, err.to_string()))).into_response()
}
