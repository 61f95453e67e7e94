//! 发货单与扫码记录模型
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化。

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// 发货单状态
///
/// PENDING -> LOADING -> DISPATCHED 为正常流转；
/// FAILED 为汇点状态，当前事件流没有入口，但状态机保留建模。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    /// 待处理 - 首次观察到 order.created 时的唯一初始状态
    #[default]
    Pending,
    /// 装车中 - 首次扫码后进入
    Loading,
    /// 已发车 - 终态，此后拒绝扫码且不再二次变更库存
    Dispatched,
    /// 失败 - 汇点，禁止再发车
    Failed,
}

/// 由订单号确定性导出发货单号
///
/// `ord_123` -> `ship_123`。纯函数而非第二个序列发生器：
/// 重复投递的 order.created 事件算出同一个主键，配合主键冲突忽略，
/// 幂等创建不需要额外查询。
pub fn shipment_id_for_order(order_id: &str) -> String {
    match order_id.strip_prefix("ord_") {
        Some(suffix) => format!("ship_{suffix}"),
        None => format!("ship_{order_id}"),
    }
}

/// 发货行项目（JSONB 存储，复制自订单事件）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentItem {
    pub sku: String,
    pub quantity: i32,
}

/// 发货单
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Shipment {
    pub shipment_id: String,
    pub order_id: String,
    pub client_id: String,
    pub requested_ship_date: NaiveDate,
    pub items: Json<Vec<ShipmentItem>>,
    pub status: ShipmentStatus,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub dispatched_by: Option<String>,
    pub truck_id: Option<String>,
}

/// 待创建的发货单（由 order.created 事件导出）
#[derive(Debug, Clone)]
pub struct NewShipment {
    pub shipment_id: String,
    pub order_id: String,
    pub client_id: String,
    pub requested_ship_date: NaiveDate,
    pub items: Vec<ShipmentItem>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// 扫码审计记录
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScanRecord {
    pub barcode: String,
    pub quantity: i32,
    pub scanned_by: String,
    pub scanned_at: DateTime<Utc>,
}

/// 待追加的扫码记录
#[derive(Debug, Clone)]
pub struct NewScan {
    pub barcode: String,
    pub quantity: i32,
    pub scanned_by: String,
    pub scanned_at: DateTime<Utc>,
}

/// 发车写入内容
#[derive(Debug, Clone)]
pub struct DispatchUpdate {
    pub dispatched_by: String,
    pub truck_id: Option<String>,
    pub dispatched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shipment_id_for_order() {
        assert_eq!(shipment_id_for_order("ord_123"), "ship_123");
        assert_eq!(shipment_id_for_order("ord_1"), "ship_1");
        // 无前缀的订单号整体作为后缀，保持函数全定义
        assert_eq!(shipment_id_for_order("legacy-42"), "ship_legacy-42");
    }

    #[test]
    fn test_shipment_id_is_deterministic() {
        assert_eq!(
            shipment_id_for_order("ord_777"),
            shipment_id_for_order("ord_777")
        );
    }

    #[test]
    fn test_shipment_status_serde_format() {
        assert_eq!(
            serde_json::to_string(&ShipmentStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(
            serde_json::to_string(&ShipmentStatus::Dispatched).unwrap(),
            "\"DISPATCHED\""
        );

        let parsed: ShipmentStatus = serde_json::from_str("\"LOADING\"").unwrap();
        assert_eq!(parsed, ShipmentStatus::Loading);
    }
}
