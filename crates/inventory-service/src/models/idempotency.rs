//! 幂等台账模型
//!
//! 台账按 (操作类型, 客户端幂等键) 唯一，值为首次执行时的完整响应 JSON。
//! 记录只写一次：先写者胜，后来的重复插入被吞掉并回读先写者的响应。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 台账覆盖的操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Scan,
    Dispatch,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Scan => "SCAN",
            Self::Dispatch => "DISPATCH",
        };
        write!(f, "{s}")
    }
}

/// 幂等台账记录
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IdempotencyRecord {
    pub operation_type: OperationType,
    pub idempotency_key: String,
    pub response_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
