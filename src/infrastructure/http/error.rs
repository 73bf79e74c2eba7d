//! HTTP Error Handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::application::ApplicationError;

/// 统一错误响应体
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// API 错误
///
/// 直接映射为真实的 HTTP 状态码；Range/文件下发这类端点依赖
/// 状态码语义（404/416/206），不能折叠进 200 信封。
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Internal(String),
    ServiceUnavailable(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Internal(msg)
            | ApiError::ServiceUnavailable(msg) => msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message().to_string();

        if status.is_server_error() {
            tracing::error!(status = %status.as_u16(), error = %message, "Request failed");
        } else {
            tracing::warn!(status = %status.as_u16(), error = %message, "Request rejected");
        }

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ApplicationError> for ApiError {
    fn from(e: ApplicationError) -> Self {
        match e {
            ApplicationError::NotFound { resource_type, id } => {
                ApiError::NotFound(format!("{} not found: {}", resource_type, id))
            }
            ApplicationError::ValidationError(msg) => ApiError::BadRequest(msg),
            ApplicationError::NotConfigured(msg) => ApiError::ServiceUnavailable(msg),
            ApplicationError::Forbidden(msg) => ApiError::Forbidden(msg),
            ApplicationError::RepositoryError(msg) => ApiError::Internal(msg),
            ApplicationError::ExternalServiceError(msg) => ApiError::ServiceUnavailable(msg),
            ApplicationError::StorageError(msg) => ApiError::Internal(msg),
            ApplicationError::InternalError(msg) => ApiError::Internal(msg),
        }
    }
}
