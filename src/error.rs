//! 统一错误模型
//! 定义工作许可核心的错误分类和 HTTP 错误响应格式

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;

/// 应用错误类型
///
/// 每个业务错误都携带原因说明，调用方据此向用户解释是哪一个前置条件
/// （状态或授权）没有满足。
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// 缺少或无效的身份凭证
    #[error("Authentication failed")]
    Unauthenticated,

    /// 角色或关系校验失败
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// 当前状态不允许该操作
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("Circular reference: {0}")]
    CircularReference(String),

    #[error("Risk assessment already reviewed by {0}")]
    AlreadyReviewed(uuid::Uuid),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState(_) | AppError::AlreadyReviewed(_) => StatusCode::CONFLICT,
            AppError::Validation(_) | AppError::InvalidRange(_) => StatusCode::BAD_REQUEST,
            AppError::CircularReference(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 错误分类名，对应审计中使用的稳定标识
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE",
            AppError::Config(_) => "CONFIG",
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::InvalidRange(_) => "INVALID_RANGE",
            AppError::CircularReference(_) => "CIRCULAR_REFERENCE",
            AppError::AlreadyReviewed(_) => "ALREADY_REVIEWED",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    /// 获取用户友好的错误消息（不包含敏感信息）
    pub fn user_message(&self) -> String {
        match self {
            AppError::Unauthenticated => "Authentication failed".to_string(),
            AppError::Unauthorized(msg) => msg.clone(),
            AppError::NotFound(msg) => format!("Resource not found: {}", msg),
            AppError::InvalidState(msg) => msg.clone(),
            AppError::Validation(msg) => msg.clone(),
            AppError::InvalidRange(msg) => msg.clone(),
            AppError::CircularReference(msg) => msg.clone(),
            AppError::AlreadyReviewed(_) => "Risk assessment has already been reviewed".to_string(),
            AppError::Database(_) => "Database error occurred".to_string(),
            AppError::Config(_) => "Configuration error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> u16 {
        self.status_code().as_u16()
    }

    // 便捷方法
    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        AppError::InvalidState(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}

/// 错误响应 DTO
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub kind: &'static str,
    pub message: String,
    pub request_id: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = uuid::Uuid::new_v4().to_string();

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                kind: self.kind(),
                message: self.user_message(),
                request_id,
            },
        };

        // 服务端错误记为 error，业务拒绝记为 warn
        if status.is_server_error() {
            tracing::error!(
                code = self.code(),
                message = %self,
                request_id = %error_response.error.request_id,
                "Application error"
            );
        } else {
            tracing::warn!(
                code = self.code(),
                kind = self.kind(),
                message = %self,
                request_id = %error_response.error.request_id,
                "Request rejected"
            );
        }

        (status, Json(error_response)).into_response()
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}
