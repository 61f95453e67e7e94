//! 路由配置模块
//!
//! 定义订单服务 REST API 端点的路由映射

use axum::{
    Router,
    routing::{get, post},
};

use crate::{handlers, state::AppState};

/// 构建订单相关的路由
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(handlers::create_order))
        .route("/orders", get(handlers::list_orders))
        .route("/orders/{id}", get(handlers::get_order))
        .route("/orders/{id}/timeline", get(handlers::get_timeline))
}
