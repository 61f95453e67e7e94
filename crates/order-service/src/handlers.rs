//! 订单 REST API 处理器

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use fulfillment_shared::auth::Identity;

use crate::dto::{ApiResponse, CreateOrderRequest, ListOrdersQuery, OrderDto, TimelineEntryDto};
use crate::error::{FieldError, OrderError};
use crate::state::AppState;

/// 创建订单
///
/// POST /orders
pub async fn create_order(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderDto>>), OrderError> {
    let order = state.service.create_order(req, identity.as_str()).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(order.into())),
    ))
}

/// 按客户查询订单列表
///
/// GET /orders?clientId=
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<ApiResponse<Vec<OrderDto>>>, OrderError> {
    let client_id = query
        .client_id
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            OrderError::Validation(vec![FieldError::new("clientId", "必须提供查询参数")])
        })?;

    let orders = state.service.list_orders(client_id).await?;
    let dtos = orders.into_iter().map(OrderDto::from).collect();
    Ok(Json(ApiResponse::success(dtos)))
}

/// 获取订单详情
///
/// GET /orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<ApiResponse<OrderDto>>, OrderError> {
    let order = state.service.get_order(&order_id).await?;
    Ok(Json(ApiResponse::success(order.into())))
}

/// 获取订单时间线
///
/// GET /orders/{id}/timeline
pub async fn get_timeline(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<TimelineEntryDto>>>, OrderError> {
    let entries = state.service.get_timeline(&order_id).await?;
    let dtos = entries.into_iter().map(TimelineEntryDto::from).collect();
    Ok(Json(ApiResponse::success(dtos)))
}

/// 存活探针：服务进程正常即返回 ok
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "order-service"
    }))
}

/// 就绪探针：检查数据库连接是否可用
pub async fn readiness_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db_ok = state.db.health_check().await.is_ok();

    Json(serde_json::json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "service": "order-service",
        "checks": {
            "database": if db_ok { "ok" } else { "fail" }
        }
    }))
}
