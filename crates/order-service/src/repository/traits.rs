//! 仓储 Trait 定义
//!
//! 定义仓储接口，便于服务层依赖抽象而非具体实现，支持 mock 测试

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{NewOrder, Order, ShippedApplyResult, TimelineEntry};

/// 订单仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepositoryTrait: Send + Sync {
    /// 从服务端序列分配下一个订单号（ord_<n>）
    async fn next_order_id(&self) -> Result<String>;

    /// 持久化订单及其初始 CREATED 时间线行（单事务）
    async fn create(&self, order: &NewOrder) -> Result<()>;

    async fn find(&self, order_id: &str) -> Result<Option<Order>>;

    async fn list_by_client(&self, client_id: &str) -> Result<Vec<Order>>;

    /// 时间线按业务时间升序，相同时间按插入顺序（id）稳定排序
    async fn timeline(&self, order_id: &str) -> Result<Vec<TimelineEntry>>;

    /// 幂等应用 SHIPPED 迁移（时间线去重 + 状态翻转，单事务）
    async fn mark_shipped(
        &self,
        order_id: &str,
        shipment_id: &str,
        dispatched_at: DateTime<Utc>,
    ) -> Result<ShippedApplyResult>;
}
