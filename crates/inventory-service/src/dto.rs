//! 仓库服务 REST API 的请求与响应 DTO

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Shipment, ShipmentItem, ShipmentStatus};

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

/// 扫码请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    #[validate(length(min = 1, message = "不能为空"))]
    pub barcode: String,
    #[validate(range(min = 1, message = "必须为正整数"))]
    pub quantity: i32,
}

/// 发车请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub truck_id: Option<String>,
}

/// 发货单列表查询参数
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListShipmentsQuery {
    pub status: Option<String>,
}

// ==================== 响应 ====================

/// 发货单响应 DTO
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentDto {
    pub shipment_id: String,
    pub order_id: String,
    pub client_id: String,
    pub requested_ship_date: String,
    pub items: Vec<ShipmentItem>,
    pub status: ShipmentStatus,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatched_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truck_id: Option<String>,
}

impl From<Shipment> for ShipmentDto {
    fn from(shipment: Shipment) -> Self {
        Self {
            shipment_id: shipment.shipment_id,
            order_id: shipment.order_id,
            client_id: shipment.client_id,
            requested_ship_date: shipment.requested_ship_date.format("%Y-%m-%d").to_string(),
            items: shipment.items.0,
            status: shipment.status,
            created_at: shipment.created_at,
            created_by: shipment.created_by,
            dispatched_at: shipment.dispatched_at,
            dispatched_by: shipment.dispatched_by,
            truck_id: shipment.truck_id,
        }
    }
}

/// 扫码响应
///
/// 完整结构会原样写入幂等台账，重试时逐字节一致地返回，
/// 因此所有字段固定序列化（Option 输出 null 而非省略）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub shipment_id: String,
    pub order_id: String,
    pub status: ShipmentStatus,
    pub barcode: String,
    pub quantity: i32,
    pub scanned_by: String,
    pub scanned_at: DateTime<Utc>,
}

/// 发车响应
///
/// 同 ScanResponse：写入台账后逐字节稳定。`already_dispatched` 为 true 时
/// `truck_id`/`dispatched_at` 反映首次发车的持久化事实，而非本次请求参数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub shipment_id: String,
    pub order_id: String,
    pub status: ShipmentStatus,
    pub truck_id: Option<String>,
    pub dispatched_at: DateTime<Utc>,
    pub dispatched_by: String,
    pub already_dispatched: bool,
}
