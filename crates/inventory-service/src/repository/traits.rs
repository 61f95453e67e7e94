//! 仓储 Trait 定义
//!
//! 定义仓储接口，便于服务层依赖抽象而非具体实现，支持 mock 测试。
//! 事务边界收在仓储方法内部：一次逻辑操作（扫码、发车）对应一个事务，
//! 并发竞争的裁决结果通过 Outcome 枚举交还服务层。

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    DispatchUpdate, NewScan, NewShipment, OperationType, ScanRecord, Shipment, ShipmentStatus,
};

/// 随操作一起写入的台账条目
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub operation: OperationType,
    pub key: String,
    pub response: serde_json::Value,
}

/// 扫码持久化结果
#[derive(Debug, Clone)]
pub enum ScanPersistOutcome {
    /// 扫码已记录，状态已按需更新
    Recorded,
    /// 并发的发车在读取与写入之间提交，扫码被拒绝
    DispatchedMeanwhile,
    /// 同键请求抢先提交，返回其已存储的响应
    LedgerConflict(serde_json::Value),
}

/// 发车持久化结果
#[derive(Debug, Clone)]
pub enum DispatchPersistOutcome {
    /// 本请求完成了真正的发车（状态翻转 + 台账写入，同一事务）
    Dispatched,
    /// 状态守卫未命中：别的请求已先发车，携带回读后的发货单
    LostToExistingDispatch(Box<Shipment>),
    /// 同键请求抢先提交，返回其已存储的响应
    LedgerConflict(serde_json::Value),
}

/// 发货单仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShipmentRepositoryTrait: Send + Sync {
    /// 幂等插入：主键冲突（事件重复投递）时静默忽略，返回是否实际插入
    async fn insert_if_absent(&self, shipment: &NewShipment) -> Result<bool>;

    async fn find(&self, shipment_id: &str) -> Result<Option<Shipment>>;

    async fn list_by_status(&self, status: Option<ShipmentStatus>) -> Result<Vec<Shipment>>;

    /// 发货单的扫码审计日志，按时间升序
    async fn scans(&self, shipment_id: &str) -> Result<Vec<ScanRecord>>;

    /// 单事务：追加扫码记录 + 更新状态（带状态守卫）+ 可选台账写入
    async fn record_scan(
        &self,
        shipment_id: &str,
        scan: &NewScan,
        new_status: ShipmentStatus,
        ledger: Option<LedgerEntry>,
    ) -> Result<ScanPersistOutcome>;

    /// 单事务：发车更新（带状态守卫）+ 台账写入
    async fn dispatch(
        &self,
        shipment_id: &str,
        update: &DispatchUpdate,
        ledger: LedgerEntry,
    ) -> Result<DispatchPersistOutcome>;
}

/// 幂等台账仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdempotencyRepositoryTrait: Send + Sync {
    /// 按 (操作, 键) 查询已存储的响应
    async fn find(
        &self,
        operation: OperationType,
        key: &str,
    ) -> Result<Option<serde_json::Value>>;

    /// 写入台账；键已被占用时返回先写者的响应（先写者胜）
    async fn insert_or_get(
        &self,
        operation: OperationType,
        key: &str,
        response: &serde_json::Value,
    ) -> Result<serde_json::Value>;
}
