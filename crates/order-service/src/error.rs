//! 订单服务错误类型
//!
//! 定义订单服务的业务错误与系统错误，并映射为统一的 JSON 错误响应。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use fulfillment_shared::error::FulfillmentError;

/// 字段级验证错误明细
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// 订单服务错误类型
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("订单不存在: {0}")]
    OrderNotFound(String),

    #[error("参数验证失败")]
    Validation(Vec<FieldError>),

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Shared(#[from] FulfillmentError),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 订单服务 Result 类型别名
pub type Result<T> = std::result::Result<T, OrderError>;

impl OrderError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::OrderNotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Shared(FulfillmentError::Unauthenticated) => StatusCode::UNAUTHORIZED,
            Self::Shared(FulfillmentError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Database(_) | Self::Serialization(_) | Self::Internal(_) | Self::Shared(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Shared(e) => e.code(),
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志，防止信息泄露
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Serialization(e) => {
                tracing::error!(error = %e, "序列化失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = match &self {
            // 验证错误附带字段级明细，客户端可逐项标红
            Self::Validation(fields) => json!({
                "success": false,
                "code": self.error_code(),
                "message": message,
                "errors": fields,
                "data": null
            }),
            _ => json!({
                "success": false,
                "code": self.error_code(),
                "message": message,
                "data": null
            }),
        };

        (status, axum::Json(body)).into_response()
    }
}
