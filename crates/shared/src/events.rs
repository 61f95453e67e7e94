//! 领域事件信封与事件载荷模型
//!
//! 定义履约系统中所有跨服务事件的统一信封格式（CloudEvents 形状）、
//! 事件类型常量以及各事件的强类型 data 载荷。消费方通过信封 `id` 去重，
//! 通过 `type` 路由，载荷提供防御性 `validate` 供消费侧二次校验。

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FulfillmentError, Result};

/// CloudEvents 规范版本
pub const SPEC_VERSION: &str = "1.0";

/// data 字段的内容类型
pub const DATA_CONTENT_TYPE: &str = "application/json";

/// 信封整体在传输层的内容类型（写入消息 header）
pub const CLOUDEVENTS_CONTENT_TYPE: &str = "application/cloudevents+json";

/// 事件类型的反向域名前缀，路由键为去掉该前缀后的点分后缀
pub const TYPE_PREFIX: &str = "com.fulfillment.";

// ---------------------------------------------------------------------------
// 事件类型常量
// ---------------------------------------------------------------------------

/// 集中管理事件类型全名，防止字符串散落在各服务中导致拼写不一致
pub mod event_types {
    pub const ORDER_CREATED: &str = "com.fulfillment.order.created.v1";
    pub const SHIPMENT_DISPATCHED: &str = "com.fulfillment.shipment.dispatched.v1";
    /// 由外部线索 CRM 服务发布，本仓库只消费
    pub const LEAD_CREATED: &str = "com.fulfillment.lead.created.v1";
}

// ---------------------------------------------------------------------------
// DomainEvent — 事件信封
// ---------------------------------------------------------------------------

/// 领域事件信封
///
/// 字段名与线上 JSON 一一对应（CloudEvents 1.0 形状），不做 rename_all：
/// `{specversion, id, type, source, subject, time, datacontenttype, data}`。
/// - `id` 全局唯一（每次发布生成一次），是消费方幂等去重的键
/// - `time` 是业务时间，不是传输接收时间
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub specversion: String,
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub subject: String,
    pub time: DateTime<Utc>,
    pub datacontenttype: String,
    pub data: serde_json::Value,
}

impl DomainEvent {
    /// 构建新事件信封
    ///
    /// `id` 使用 UUID v7 的十六进制形式并加 `evt_` 前缀：
    /// 时间有序便于索引，同时保证每次发布全局唯一。
    /// `time` 由调用方传入业务时间（如订单创建时刻、发车时刻）。
    pub fn new(
        event_type: &str,
        source: &str,
        subject: &str,
        time: DateTime<Utc>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            specversion: SPEC_VERSION.to_string(),
            id: format!("evt_{}", Uuid::now_v7().simple()),
            event_type: event_type.to_string(),
            source: source.to_string(),
            subject: subject.to_string(),
            time,
            datacontenttype: DATA_CONTENT_TYPE.to_string(),
            data,
        }
    }

    /// 事件路由键：去掉反向域名前缀后的点分后缀
    ///
    /// `com.fulfillment.order.created.v1` -> `order.created.v1`
    pub fn routing_key(&self) -> &str {
        self.event_type
            .strip_prefix(TYPE_PREFIX)
            .unwrap_or(&self.event_type)
    }

    /// 从 JSON 字节反序列化信封
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| FulfillmentError::Validation(format!("事件信封解析失败: {e}")))
    }

    /// 将 data 载荷反序列化为目标类型
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| FulfillmentError::Validation(format!("事件载荷解析失败: {e}")))
    }
}

// ---------------------------------------------------------------------------
// 事件载荷
// ---------------------------------------------------------------------------

/// 订单行项目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemData {
    pub sku: String,
    pub quantity: i32,
}

/// `order.created.v1` 载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedData {
    pub order_id: String,
    pub client_id: String,
    pub requested_ship_date: String,
    pub items: Vec<OrderItemData>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl OrderCreatedData {
    /// 消费侧防御性校验
    ///
    /// 信封可解析不代表载荷可信：空白 id、空白 SKU 或非正数量
    /// 会污染仓库侧的领域数据，校验失败的事件应丢弃并告警。
    pub fn validate(&self) -> Result<()> {
        if self.order_id.trim().is_empty() {
            return Err(invalid("orderId", "不能为空"));
        }
        if self.client_id.trim().is_empty() {
            return Err(invalid("clientId", "不能为空"));
        }
        if self.items.is_empty() {
            return Err(invalid("items", "不能为空"));
        }
        for item in &self.items {
            if item.sku.trim().is_empty() {
                return Err(invalid("items.sku", "不能为空"));
            }
            if item.quantity <= 0 {
                return Err(invalid("items.quantity", "必须为正整数"));
            }
        }
        Ok(())
    }
}

/// `shipment.dispatched.v1` 载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentDispatchedData {
    pub shipment_id: String,
    pub order_id: String,
    pub order_created_by: String,
    pub dispatched_by: String,
    pub truck_id: Option<String>,
    pub dispatched_at: DateTime<Utc>,
}

impl ShipmentDispatchedData {
    pub fn validate(&self) -> Result<()> {
        if self.shipment_id.trim().is_empty() {
            return Err(invalid("shipmentId", "不能为空"));
        }
        if self.order_id.trim().is_empty() {
            return Err(invalid("orderId", "不能为空"));
        }
        if self.dispatched_by.trim().is_empty() {
            return Err(invalid("dispatchedBy", "不能为空"));
        }
        Ok(())
    }
}

/// `lead.created.v1` 载荷（外部线索 CRM 发布，通知投影消费）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadCreatedData {
    pub lead_id: String,
    pub client_id: String,
    pub contact_name: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl LeadCreatedData {
    pub fn validate(&self) -> Result<()> {
        if self.lead_id.trim().is_empty() {
            return Err(invalid("leadId", "不能为空"));
        }
        if self.client_id.trim().is_empty() {
            return Err(invalid("clientId", "不能为空"));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> FulfillmentError {
    FulfillmentError::InvalidArgument {
        field: field.to_string(),
        message: message.to_string(),
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_envelope_wire_field_names() {
        let event = DomainEvent::new(
            event_types::ORDER_CREATED,
            "/order-service",
            "orders/ord_42",
            sample_time(),
            serde_json::json!({"orderId": "ord_42"}),
        );

        let json = serde_json::to_value(&event).unwrap();
        let obj = json.as_object().unwrap();

        // 信封字段名必须与线上格式完全一致
        for key in [
            "specversion",
            "id",
            "type",
            "source",
            "subject",
            "time",
            "datacontenttype",
            "data",
        ] {
            assert!(obj.contains_key(key), "missing field {key}");
        }
        assert_eq!(obj.len(), 8);
        assert_eq!(json["specversion"], "1.0");
        assert_eq!(json["type"], "com.fulfillment.order.created.v1");
        assert_eq!(json["datacontenttype"], "application/json");
    }

    #[test]
    fn test_event_id_format_and_uniqueness() {
        let a = DomainEvent::new(
            event_types::ORDER_CREATED,
            "/order-service",
            "orders/ord_1",
            sample_time(),
            serde_json::Value::Null,
        );
        let b = DomainEvent::new(
            event_types::ORDER_CREATED,
            "/order-service",
            "orders/ord_1",
            sample_time(),
            serde_json::Value::Null,
        );

        assert!(a.id.starts_with("evt_"));
        // evt_ 前缀 + 32 位十六进制
        assert_eq!(a.id.len(), 4 + 32);
        assert!(a.id[4..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_routing_key_strips_prefix() {
        let event = DomainEvent::new(
            event_types::SHIPMENT_DISPATCHED,
            "/inventory-service",
            "shipments/ship_42",
            sample_time(),
            serde_json::Value::Null,
        );
        assert_eq!(event.routing_key(), "shipment.dispatched.v1");

        // 未知前缀的类型原样返回
        let foreign = DomainEvent::new(
            "org.example.thing.happened.v1",
            "/x",
            "x/1",
            sample_time(),
            serde_json::Value::Null,
        );
        assert_eq!(foreign.routing_key(), "org.example.thing.happened.v1");
    }

    #[test]
    fn test_envelope_roundtrip_with_typed_data() {
        let data = OrderCreatedData {
            order_id: "ord_42".to_string(),
            client_id: "c1".to_string(),
            requested_ship_date: "2026-03-01".to_string(),
            items: vec![OrderItemData {
                sku: "X".to_string(),
                quantity: 5,
            }],
            created_by: "u1".to_string(),
            created_at: sample_time(),
        };

        let event = DomainEvent::new(
            event_types::ORDER_CREATED,
            "/order-service",
            "orders/ord_42",
            sample_time(),
            serde_json::to_value(&data).unwrap(),
        );

        let bytes = serde_json::to_vec(&event).unwrap();
        let parsed = DomainEvent::from_slice(&bytes).unwrap();
        let parsed_data: OrderCreatedData = parsed.data_as().unwrap();

        assert_eq!(parsed.id, event.id);
        assert_eq!(parsed_data.order_id, "ord_42");
        assert_eq!(parsed_data.items, data.items);
        // data 载荷使用 camelCase
        assert!(String::from_utf8(bytes).unwrap().contains("requestedShipDate"));
    }

    #[test]
    fn test_from_slice_rejects_garbage() {
        assert!(DomainEvent::from_slice(b"not json").is_err());
        assert!(DomainEvent::from_slice(b"{\"id\": 1}").is_err());
    }

    #[test]
    fn test_order_created_validate() {
        let mut data = OrderCreatedData {
            order_id: "ord_1".to_string(),
            client_id: "c1".to_string(),
            requested_ship_date: "2026-03-01".to_string(),
            items: vec![OrderItemData {
                sku: "X".to_string(),
                quantity: 1,
            }],
            created_by: "u1".to_string(),
            created_at: sample_time(),
        };
        assert!(data.validate().is_ok());

        data.items[0].quantity = 0;
        assert!(data.validate().is_err());

        data.items[0].quantity = 3;
        data.items[0].sku = "   ".to_string();
        assert!(data.validate().is_err());

        data.items.clear();
        assert!(data.validate().is_err());

        data.items.push(OrderItemData {
            sku: "X".to_string(),
            quantity: 1,
        });
        data.order_id = "".to_string();
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_shipment_dispatched_validate() {
        let data = ShipmentDispatchedData {
            shipment_id: "ship_1".to_string(),
            order_id: "ord_1".to_string(),
            order_created_by: "u1".to_string(),
            dispatched_by: "w1".to_string(),
            truck_id: None,
            dispatched_at: sample_time(),
        };
        assert!(data.validate().is_ok());

        let blank = ShipmentDispatchedData {
            shipment_id: " ".to_string(),
            ..data
        };
        assert!(blank.validate().is_err());
    }
}
