//! 订单与时间线模型
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化。

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// 订单状态
///
/// 当前流程只使用 CREATED -> SHIPPED；CANCELLED 为预留扩展值，
/// 任何操作都不会进入该状态。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// 已创建 - 订单唯一的初始状态
    #[default]
    Created,
    /// 已发货 - 消费 shipment.dispatched 事件后进入的终态
    Shipped,
    /// 已取消 - 预留状态，当前无入口
    Cancelled,
}

/// 订单行项目（JSONB 存储）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub sku: String,
    pub quantity: i32,
}

/// 订单
///
/// 订单由本服务独占写入；status 到 SHIPPED 的迁移只能来自
/// `shipment.dispatched.v1` 事件，不存在客户端直接操作的路径。
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Order {
    pub order_id: String,
    pub client_id: String,
    pub requested_ship_date: NaiveDate,
    pub items: Json<Vec<OrderItem>>,
    pub notes: Option<String>,
    pub created_by: String,
    pub status: OrderStatus,
    pub shipment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 待持久化的新订单（order_id 已由序列分配）
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: String,
    pub client_id: String,
    pub requested_ship_date: NaiveDate,
    pub items: Vec<OrderItem>,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// 订单时间线条目（仅追加的审计日志行）
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TimelineEntry {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
    pub source: String,
}

/// SHIPPED 迁移的应用结果
///
/// 事件可能重复投递，也可能（理论上）引用未知订单，
/// 两种情况都不是错误，由调用方决定日志级别。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShippedApplyResult {
    /// 首次应用：时间线新增 SHIPPED 行且订单状态已翻转
    Applied,
    /// 重复投递：时间线已有 SHIPPED 行，本次未做任何变更
    Duplicate,
    /// 订单不存在
    OrderNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_serde_format() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Created).unwrap(),
            "\"CREATED\""
        );
        assert_eq!(
            serde_json::to_string(&OrderStatus::Shipped).unwrap(),
            "\"SHIPPED\""
        );
        assert_eq!(
            serde_json::to_string(&OrderStatus::Cancelled).unwrap(),
            "\"CANCELLED\""
        );

        let parsed: OrderStatus = serde_json::from_str("\"SHIPPED\"").unwrap();
        assert_eq!(parsed, OrderStatus::Shipped);
    }

    #[test]
    fn test_order_item_camel_case() {
        let item = OrderItem {
            sku: "X".to_string(),
            quantity: 5,
        };
        let json = serde_json::to_string(&item).unwrap();
        assert_eq!(json, r#"{"sku":"X","quantity":5}"#);
    }
}
