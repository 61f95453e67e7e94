//! 订单仓储 PostgreSQL 实现
//!
//! 订单主表与时间线表的全部写入都在这里完成。
//! 时间线 (order_id, status) 唯一约束承担事件重复投递的去重。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use super::traits::OrderRepositoryTrait;
use crate::error::Result;
use crate::models::{NewOrder, Order, OrderStatus, ShippedApplyResult, TimelineEntry};

/// 时间线行的来源标识
const SOURCE_ORDER_SERVICE: &str = "order-service";
const SOURCE_INVENTORY_SERVICE: &str = "inventory-service";

/// 订单仓储
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepositoryTrait for OrderRepository {
    async fn next_order_id(&self) -> Result<String> {
        let n: i64 = sqlx::query_scalar("SELECT nextval('order_id_seq')")
            .fetch_one(&self.pool)
            .await?;
        Ok(format!("ord_{n}"))
    }

    async fn create(&self, order: &NewOrder) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (order_id, client_id, requested_ship_date, items, notes,
                                created_by, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&order.order_id)
        .bind(&order.client_id)
        .bind(order.requested_ship_date)
        .bind(Json(&order.items))
        .bind(&order.notes)
        .bind(&order.created_by)
        .bind(OrderStatus::Created)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO order_timeline (order_id, status, at, source)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&order.order_id)
        .bind(OrderStatus::Created)
        .bind(order.created_at)
        .bind(SOURCE_ORDER_SERVICE)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, order_id: &str) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT order_id, client_id, requested_ship_date, items, notes,
                   created_by, status, shipment_id, created_at
            FROM orders
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn list_by_client(&self, client_id: &str) -> Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT order_id, client_id, requested_ship_date, items, notes,
                   created_by, status, shipment_id, created_at
            FROM orders
            WHERE client_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn timeline(&self, order_id: &str) -> Result<Vec<TimelineEntry>> {
        // 两条时间线行可能共享同一时间戳，追加 id 排序保证顺序稳定
        let entries = sqlx::query_as::<_, TimelineEntry>(
            r#"
            SELECT status, at, source
            FROM order_timeline
            WHERE order_id = $1
            ORDER BY at ASC, id ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn mark_shipped(
        &self,
        order_id: &str,
        shipment_id: &str,
        dispatched_at: DateTime<Utc>,
    ) -> Result<ShippedApplyResult> {
        let mut tx = self.pool.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE order_id = $1)")
                .bind(order_id)
                .fetch_one(&mut *tx)
                .await?;

        if !exists {
            return Ok(ShippedApplyResult::OrderNotFound);
        }

        // 唯一约束上的 DO NOTHING 即是重复投递的去重：
        // 没插入行就说明别的投递已经应用过，不再翻转状态
        let inserted = sqlx::query(
            r#"
            INSERT INTO order_timeline (order_id, status, at, source)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id, status) DO NOTHING
            "#,
        )
        .bind(order_id)
        .bind(OrderStatus::Shipped)
        .bind(dispatched_at)
        .bind(SOURCE_INVENTORY_SERVICE)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.commit().await?;
            return Ok(ShippedApplyResult::Duplicate);
        }

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, shipment_id = $3
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .bind(OrderStatus::Shipped)
        .bind(shipment_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ShippedApplyResult::Applied)
    }
}
