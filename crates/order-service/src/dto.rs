//! 订单服务 REST API 的请求与响应 DTO

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Order, OrderItem, OrderStatus, TimelineEntry};

// ==================== 通用响应 ====================

/// API 统一响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }
}

// ==================== 请求 ====================

/// 创建订单请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "不能为空"))]
    pub client_id: String,
    /// 日历日期（YYYY-MM-DD），可解析性在服务层校验
    pub requested_ship_date: String,
    #[validate(length(min = 1, message = "不能为空"), nested)]
    pub items: Vec<OrderItemRequest>,
    pub notes: Option<String>,
}

/// 订单行项目请求
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    #[validate(length(min = 1, message = "不能为空"))]
    pub sku: String,
    #[validate(range(min = 1, message = "必须为正整数"))]
    pub quantity: i32,
}

/// 订单列表查询参数
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersQuery {
    pub client_id: Option<String>,
}

// ==================== 响应 ====================

/// 订单响应 DTO
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDto {
    pub order_id: String,
    pub client_id: String,
    pub requested_ship_date: String,
    pub items: Vec<OrderItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_by: String,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderDto {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.order_id,
            client_id: order.client_id,
            requested_ship_date: order.requested_ship_date.format("%Y-%m-%d").to_string(),
            items: order.items.0,
            notes: order.notes,
            created_by: order.created_by,
            status: order.status,
            shipment_id: order.shipment_id,
            created_at: order.created_at,
        }
    }
}

/// 时间线条目响应 DTO
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntryDto {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
    pub source: String,
}

impl From<TimelineEntry> for TimelineEntryDto {
    fn from(entry: TimelineEntry) -> Self {
        Self {
            status: entry.status,
            at: entry.at,
            source: entry.source,
        }
    }
}
