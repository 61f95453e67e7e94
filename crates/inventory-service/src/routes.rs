//! 路由配置模块
//!
//! 定义仓库服务 REST API 端点的路由映射

use axum::{
    Router,
    routing::{get, post},
};

use crate::{handlers, state::AppState};

/// 构建发货单相关的路由
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/shipments", get(handlers::list_shipments))
        .route("/shipments/{id}", get(handlers::get_shipment))
        .route("/shipments/{id}/scans", get(handlers::get_scans))
        .route("/shipments/{id}/scan", post(handlers::scan_shipment))
        .route("/shipments/{id}/dispatch", post(handlers::dispatch_shipment))
}
