//! 统一错误处理模块
//!
//! 定义跨服务共享的错误类型，使用 thiserror 提供良好的错误信息。
//! 各服务在此基础上定义自己的业务错误枚举。

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum FulfillmentError {
    // ==================== 数据库错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    #[error("记录已存在: {entity} {field}={value}")]
    AlreadyExists {
        entity: String,
        field: String,
        value: String,
    },

    // ==================== Kafka 错误 ====================
    #[error("Kafka 错误: {0}")]
    Kafka(String),

    // ==================== 验证错误 ====================
    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error("无效的参数: {field} - {message}")]
    InvalidArgument { field: String, message: String },

    // ==================== 权限错误 ====================
    #[error("缺少可信身份标识")]
    Unauthenticated,

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, FulfillmentError>;

impl FulfillmentError {
    /// 获取错误码（用于结构化 API 响应与日志）
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::Kafka(_) => "KAFKA_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Kafka(_))
    }

    /// 判断底层 sqlx 错误是否为唯一约束冲突
    ///
    /// 幂等台账与时间线去重都以唯一约束作为并发互斥手段，
    /// 调用方据此把"插入冲突"恢复为"回读胜者结果"而非报错。
    pub fn is_unique_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = FulfillmentError::NotFound {
            entity: "Order".to_string(),
            id: "ord_1".to_string(),
        };
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(FulfillmentError::Unauthenticated.code(), "UNAUTHENTICATED");
    }

    #[test]
    fn test_is_retryable() {
        let db_err = FulfillmentError::Database(sqlx::Error::PoolTimedOut);
        assert!(db_err.is_retryable());

        let validation = FulfillmentError::Validation("clientId 不能为空".to_string());
        assert!(!validation.is_retryable());
    }

    #[test]
    fn test_is_unique_violation_non_database_error() {
        assert!(!FulfillmentError::is_unique_violation(
            &sqlx::Error::PoolTimedOut
        ));
    }
}
