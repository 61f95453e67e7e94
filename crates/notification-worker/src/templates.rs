//! 通知模板
//!
//! 把领域事件渲染为面向用户的通知。当前使用硬编码模板以降低外部依赖，
//! 未来可扩展为从配置中心动态加载。

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use fulfillment_shared::events::{
    DomainEvent, LeadCreatedData, OrderCreatedData, ShipmentDispatchedData, event_types,
};

use crate::error::NotificationError;

/// 面向用户的通知
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserNotification {
    pub notification_id: String,
    /// 接收人（订单/线索的创建者）
    pub user_id: String,
    pub title: String,
    pub body: String,
    /// 渲染来源的业务数据，供客户端跳转详情页
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// 把事件信封渲染为用户通知
///
/// 返回 `None` 表示该事件类型不产生通知（未知类型在消费侧已过滤，
/// 这里兜底再过滤一次）。载荷缺字段按渲染失败处理，由调用方丢弃。
pub fn render(event: &DomainEvent) -> Result<Option<UserNotification>, NotificationError> {
    let notification = match event.event_type.as_str() {
        event_types::ORDER_CREATED => {
            let data: OrderCreatedData = parse_data(event)?;
            let total: i32 = data.items.iter().map(|i| i.quantity).sum();
            make(
                &data.created_by,
                "订单已创建",
                format!(
                    "订单 {} 已创建，共 {} 件商品，预计 {} 发货",
                    data.order_id, total, data.requested_ship_date
                ),
                serde_json::json!({
                    "orderId": data.order_id,
                    "clientId": data.client_id,
                    "sourceEventId": event.id,
                }),
            )
        }
        event_types::SHIPMENT_DISPATCHED => {
            let data: ShipmentDispatchedData = parse_data(event)?;
            let truck = data.truck_id.as_deref().unwrap_or("未登记车辆");
            make(
                &data.order_created_by,
                "订单已发货",
                format!("订单 {} 的货物已由 {} 发出", data.order_id, truck),
                serde_json::json!({
                    "orderId": data.order_id,
                    "shipmentId": data.shipment_id,
                    "sourceEventId": event.id,
                }),
            )
        }
        event_types::LEAD_CREATED => {
            let data: LeadCreatedData = parse_data(event)?;
            make(
                &data.created_by,
                "新线索已登记",
                format!("客户 {} 的线索（联系人 {}）已登记", data.client_id, data.contact_name),
                serde_json::json!({
                    "leadId": data.lead_id,
                    "clientId": data.client_id,
                    "sourceEventId": event.id,
                }),
            )
        }
        _ => return Ok(None),
    };

    Ok(Some(notification))
}

fn parse_data<T: serde::de::DeserializeOwned>(
    event: &DomainEvent,
) -> Result<T, NotificationError> {
    event
        .data_as()
        .map_err(|e| NotificationError::RenderFailed(e.to_string()))
}

fn make(
    user_id: &str,
    title: &str,
    body: String,
    data: serde_json::Value,
) -> UserNotification {
    UserNotification {
        notification_id: Uuid::now_v7().to_string(),
        user_id: user_id.to_string(),
        title: title.to_string(),
        body,
        data,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulfillment_shared::test_utils::{
        make_order_created_event, make_shipment_dispatched_event,
    };

    #[test]
    fn test_render_order_created() {
        let event = make_order_created_event("ord_1", "c1");
        let notification = render(&event).unwrap().expect("应产生通知");

        assert_eq!(notification.user_id, "test-user");
        assert_eq!(notification.title, "订单已创建");
        assert!(notification.body.contains("ord_1"));
        assert_eq!(notification.data["orderId"], "ord_1");
        assert_eq!(notification.data["sourceEventId"], event.id);
    }

    #[test]
    fn test_render_shipment_dispatched() {
        let event = make_shipment_dispatched_event("ship_1", "ord_1");
        let notification = render(&event).unwrap().expect("应产生通知");

        assert_eq!(notification.title, "订单已发货");
        assert!(notification.body.contains("TRK-01"));
        assert_eq!(notification.data["shipmentId"], "ship_1");
    }

    #[test]
    fn test_render_unknown_type_is_none() {
        let mut event = make_order_created_event("ord_1", "c1");
        event.event_type = "com.fulfillment.something.else.v1".to_string();

        assert!(render(&event).unwrap().is_none());
    }

    #[test]
    fn test_render_bad_payload_fails() {
        let mut event = make_order_created_event("ord_1", "c1");
        event.data = serde_json::json!({"nothing": "here"});

        assert!(render(&event).is_err());
    }
}
