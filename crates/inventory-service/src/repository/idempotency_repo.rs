//! 幂等台账仓储 PostgreSQL 实现
//!
//! (operation_type, idempotency_key) 唯一约束即是并发重试的互斥机制：
//! 插入冲突意味着别的请求已先行提交，失败方回读并返回已存储的响应。

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::IdempotencyRepositoryTrait;
use crate::error::{InventoryError, Result};
use crate::models::OperationType;

/// 幂等台账仓储
pub struct IdempotencyRepository {
    pool: PgPool,
}

impl IdempotencyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyRepositoryTrait for IdempotencyRepository {
    async fn find(
        &self,
        operation: OperationType,
        key: &str,
    ) -> Result<Option<serde_json::Value>> {
        let stored: Option<serde_json::Value> = sqlx::query_scalar(
            r#"
            SELECT response_json
            FROM idempotency_records
            WHERE operation_type = $1 AND idempotency_key = $2
            "#,
        )
        .bind(operation)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn insert_or_get(
        &self,
        operation: OperationType,
        key: &str,
        response: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO idempotency_records (operation_type, idempotency_key, response_json)
            VALUES ($1, $2, $3)
            ON CONFLICT (operation_type, idempotency_key) DO NOTHING
            "#,
        )
        .bind(operation)
        .bind(key)
        .bind(response)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok(response.clone());
        }

        // 先写者胜：冲突后回读胜者的响应
        self.find(operation, key).await?.ok_or_else(|| {
            InventoryError::Internal(format!("台账冲突后回读不到记录: {operation} {key}"))
        })
    }
}
