//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use std::sync::Arc;

use fulfillment_shared::database::Database;
use fulfillment_shared::kafka::EventPublisher;

use crate::repository::OrderRepository;
use crate::service::OrderService;

/// 生产环境的服务类型（仓储与发布器均为真实实现）
pub type SharedOrderService = OrderService<OrderRepository, EventPublisher>;

/// Axum 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SharedOrderService>,
    /// 就绪探针使用
    pub db: Database,
}

impl AppState {
    pub fn new(service: Arc<SharedOrderService>, db: Database) -> Self {
        Self { service, db }
    }
}
