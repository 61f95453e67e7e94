//! 发货单仓储 PostgreSQL 实现
//!
//! 并发控制完全依赖行级锁与唯一约束：
//! - 创建路径：确定性主键 + ON CONFLICT DO NOTHING
//! - 扫码/发车：状态守卫 UPDATE + 台账唯一约束，竞争失败方回读胜者结果

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;

use super::traits::{
    DispatchPersistOutcome, LedgerEntry, ScanPersistOutcome, ShipmentRepositoryTrait,
};
use crate::error::{InventoryError, Result};
use crate::models::{
    DispatchUpdate, NewScan, NewShipment, OperationType, ScanRecord, Shipment, ShipmentStatus,
};

/// 发货单仓储
pub struct ShipmentRepository {
    pool: PgPool,
}

impl ShipmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 回读台账中已存储的响应（竞争失败后走此路径，记录必然存在）
    async fn stored_ledger_response(
        &self,
        operation: OperationType,
        key: &str,
    ) -> Result<serde_json::Value> {
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

        stored.ok_or_else(|| {
            InventoryError::Internal(format!("台账冲突后回读不到记录: {operation} {key}"))
        })
    }
}

#[async_trait]
impl ShipmentRepositoryTrait for ShipmentRepository {
    async fn insert_if_absent(&self, shipment: &NewShipment) -> Result<bool> {
        // 主键（shipment_id）与 order_id 唯一约束任一冲突都说明
        // 同一订单的事件已被处理过，静默忽略即可
        let result = sqlx::query(
            r#"
            INSERT INTO shipments (shipment_id, order_id, client_id, requested_ship_date,
                                   items, status, created_at, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&shipment.shipment_id)
        .bind(&shipment.order_id)
        .bind(&shipment.client_id)
        .bind(shipment.requested_ship_date)
        .bind(Json(&shipment.items))
        .bind(ShipmentStatus::Pending)
        .bind(shipment.created_at)
        .bind(&shipment.created_by)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find(&self, shipment_id: &str) -> Result<Option<Shipment>> {
        let shipment = sqlx::query_as::<_, Shipment>(
            r#"
            SELECT shipment_id, order_id, client_id, requested_ship_date, items, status,
                   created_at, created_by, dispatched_at, dispatched_by, truck_id
            FROM shipments
            WHERE shipment_id = $1
            "#,
        )
        .bind(shipment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(shipment)
    }

    async fn list_by_status(&self, status: Option<ShipmentStatus>) -> Result<Vec<Shipment>> {
        let shipments = match status {
            Some(status) => {
                sqlx::query_as::<_, Shipment>(
                    r#"
                    SELECT shipment_id, order_id, client_id, requested_ship_date, items, status,
                           created_at, created_by, dispatched_at, dispatched_by, truck_id
                    FROM shipments
                    WHERE status = $1
                    ORDER BY created_at ASC
                    "#,
                )
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Shipment>(
                    r#"
                    SELECT shipment_id, order_id, client_id, requested_ship_date, items, status,
                           created_at, created_by, dispatched_at, dispatched_by, truck_id
                    FROM shipments
                    ORDER BY created_at ASC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(shipments)
    }

    async fn scans(&self, shipment_id: &str) -> Result<Vec<ScanRecord>> {
        let scans = sqlx::query_as::<_, ScanRecord>(
            r#"
            SELECT barcode, quantity, scanned_by, scanned_at
            FROM shipment_scans
            WHERE shipment_id = $1
            ORDER BY scanned_at ASC, id ASC
            "#,
        )
        .bind(shipment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(scans)
    }

    async fn record_scan(
        &self,
        shipment_id: &str,
        scan: &NewScan,
        new_status: ShipmentStatus,
        ledger: Option<LedgerEntry>,
    ) -> Result<ScanPersistOutcome> {
        let mut tx = self.pool.begin().await?;

        // 状态守卫：服务层读到的状态可能已被并发发车覆盖，
        // 这里只允许从 PENDING/LOADING 出发的更新
        let updated = sqlx::query(
            r#"
            UPDATE shipments
            SET status = $2
            WHERE shipment_id = $1 AND status IN ('PENDING', 'LOADING')
            "#,
        )
        .bind(shipment_id)
        .bind(new_status)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(ScanPersistOutcome::DispatchedMeanwhile);
        }

        // 扫码日志仅追加：LOADING 状态下的重复扫码不改状态但仍然留痕
        sqlx::query(
            r#"
            INSERT INTO shipment_scans (shipment_id, barcode, quantity, scanned_by, scanned_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(shipment_id)
        .bind(&scan.barcode)
        .bind(scan.quantity)
        .bind(&scan.scanned_by)
        .bind(scan.scanned_at)
        .execute(&mut *tx)
        .await?;

        if let Some(entry) = &ledger {
            let inserted = sqlx::query(
                r#"
                INSERT INTO idempotency_records (operation_type, idempotency_key, response_json)
                VALUES ($1, $2, $3)
                ON CONFLICT (operation_type, idempotency_key) DO NOTHING
                "#,
            )
            .bind(entry.operation)
            .bind(&entry.key)
            .bind(&entry.response)
            .execute(&mut *tx)
            .await?;

            // 台账冲突 = 同键请求已先行提交；回滚本次写入，回读胜者响应
            if inserted.rows_affected() == 0 {
                tx.rollback().await?;
                let stored = self.stored_ledger_response(entry.operation, &entry.key).await?;
                return Ok(ScanPersistOutcome::LedgerConflict(stored));
            }
        }

        tx.commit().await?;
        Ok(ScanPersistOutcome::Recorded)
    }

    async fn dispatch(
        &self,
        shipment_id: &str,
        update: &DispatchUpdate,
        ledger: LedgerEntry,
    ) -> Result<DispatchPersistOutcome> {
        let mut tx = self.pool.begin().await?;

        // 状态守卫：只有 PENDING/LOADING 可以发车，竞争中只有一个请求命中
        let updated = sqlx::query(
            r#"
            UPDATE shipments
            SET status = $2, dispatched_at = $3, dispatched_by = $4, truck_id = $5
            WHERE shipment_id = $1 AND status IN ('PENDING', 'LOADING')
            "#,
        )
        .bind(shipment_id)
        .bind(ShipmentStatus::Dispatched)
        .bind(update.dispatched_at)
        .bind(&update.dispatched_by)
        .bind(&update.truck_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;

            // 守卫未命中说明别的请求已完成发车，回读持久化事实，
            // 首次发车的 truck/时间永远胜出
            let shipment = self.find(shipment_id).await?.ok_or_else(|| {
                InventoryError::Internal(format!("发车竞争后回读不到发货单: {shipment_id}"))
            })?;
            return Ok(DispatchPersistOutcome::LostToExistingDispatch(Box::new(
                shipment,
            )));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO idempotency_records (operation_type, idempotency_key, response_json)
            VALUES ($1, $2, $3)
            ON CONFLICT (operation_type, idempotency_key) DO NOTHING
            "#,
        )
        .bind(ledger.operation)
        .bind(&ledger.key)
        .bind(&ledger.response)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            // 同键请求已先提交：本次状态翻转随事务回滚，返回胜者响应
            tx.rollback().await?;
            let stored = self.stored_ledger_response(ledger.operation, &ledger.key).await?;
            return Ok(DispatchPersistOutcome::LedgerConflict(stored));
        }

        tx.commit().await?;
        Ok(DispatchPersistOutcome::Dispatched)
    }
}
