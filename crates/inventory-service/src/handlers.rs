//! 发货单 REST API 处理器

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};

use fulfillment_shared::auth::Identity;

use crate::dto::{
    ApiResponse, DispatchRequest, DispatchResponse, ListShipmentsQuery, ScanRequest, ScanResponse,
    ShipmentDto,
};
use crate::error::{FieldError, InventoryError};
use crate::models::{ScanRecord, ShipmentStatus};
use crate::state::AppState;

/// 幂等键请求头
const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// 从请求头提取幂等键（大小写不敏感）
fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// 查询发货单列表
///
/// GET /shipments?status=PENDING
pub async fn list_shipments(
    State(state): State<AppState>,
    Query(query): Query<ListShipmentsQuery>,
) -> Result<Json<ApiResponse<Vec<ShipmentDto>>>, InventoryError> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(parse_status(raw)?),
    };

    let shipments = state.service.list_shipments(status).await?;
    let dtos = shipments.into_iter().map(ShipmentDto::from).collect();
    Ok(Json(ApiResponse::success(dtos)))
}

/// 获取发货单详情
///
/// GET /shipments/{id}
pub async fn get_shipment(
    State(state): State<AppState>,
    Path(shipment_id): Path<String>,
) -> Result<Json<ApiResponse<ShipmentDto>>, InventoryError> {
    let shipment = state.service.get_shipment(&shipment_id).await?;
    Ok(Json(ApiResponse::success(shipment.into())))
}

/// 获取发货单的扫码审计日志
///
/// GET /shipments/{id}/scans
pub async fn get_scans(
    State(state): State<AppState>,
    Path(shipment_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<ScanRecordDto>>>, InventoryError> {
    let scans = state.service.get_scans(&shipment_id).await?;
    let dtos = scans.into_iter().map(ScanRecordDto::from).collect();
    Ok(Json(ApiResponse::success(dtos)))
}

/// 扫码装车
///
/// POST /shipments/{id}/scan（Idempotency-Key 头可选）
pub async fn scan_shipment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(shipment_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ScanRequest>,
) -> Result<Json<ApiResponse<ScanResponse>>, InventoryError> {
    let key = idempotency_key(&headers);
    let response = state
        .service
        .record_scan(&shipment_id, req, identity.as_str(), key)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// 发车
///
/// POST /shipments/{id}/dispatch（Idempotency-Key 头必填）
pub async fn dispatch_shipment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(shipment_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<DispatchRequest>,
) -> Result<Json<ApiResponse<DispatchResponse>>, InventoryError> {
    let key = idempotency_key(&headers);
    let response = state
        .service
        .dispatch_shipment(&shipment_id, req, identity.as_str(), key)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// 存活探针：服务进程正常即返回 ok
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "inventory-service"
    }))
}

/// 就绪探针：检查数据库连接是否可用
pub async fn readiness_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db_ok = state.db.health_check().await.is_ok();

    Json(serde_json::json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "service": "inventory-service",
        "checks": {
            "database": if db_ok { "ok" } else { "fail" }
        }
    }))
}

/// 扫码记录响应 DTO
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecordDto {
    pub barcode: String,
    pub quantity: i32,
    pub scanned_by: String,
    pub scanned_at: chrono::DateTime<chrono::Utc>,
}

impl From<ScanRecord> for ScanRecordDto {
    fn from(record: ScanRecord) -> Self {
        Self {
            barcode: record.barcode,
            quantity: record.quantity,
            scanned_by: record.scanned_by,
            scanned_at: record.scanned_at,
        }
    }
}

/// 解析 status 查询参数
fn parse_status(raw: &str) -> Result<ShipmentStatus, InventoryError> {
    match raw.to_uppercase().as_str() {
        "PENDING" => Ok(ShipmentStatus::Pending),
        "LOADING" => Ok(ShipmentStatus::Loading),
        "DISPATCHED" => Ok(ShipmentStatus::Dispatched),
        "FAILED" => Ok(ShipmentStatus::Failed),
        _ => Err(InventoryError::Validation(vec![FieldError::new(
            "status",
            "必须为 PENDING/LOADING/DISPATCHED/FAILED 之一",
        )])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("PENDING").unwrap(), ShipmentStatus::Pending);
        assert_eq!(parse_status("pending").unwrap(), ShipmentStatus::Pending);
        assert_eq!(
            parse_status("DISPATCHED").unwrap(),
            ShipmentStatus::Dispatched
        );
        assert!(parse_status("SHIPPED").is_err());
    }

    #[test]
    fn test_idempotency_key_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(idempotency_key(&headers), None);

        // HeaderMap 的键匹配大小写不敏感
        headers.insert("Idempotency-Key", "k1".parse().unwrap());
        assert_eq!(idempotency_key(&headers), Some("k1".to_string()));
    }
}
