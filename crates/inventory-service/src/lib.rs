//! 仓库发货服务
//!
//! 仓库出库的记录系统（system of record）。消费 `order.created.v1`
//! 惰性且幂等地创建发货单；对外提供扫码与发车 REST API；
//! 发车成功后发布 `shipment.dispatched.v1`。发货数据只由本服务写入。
//!
//! 幂等性分两层：创建路径靠确定性 shipment_id + 主键冲突忽略，
//! scan/dispatch 路径靠幂等台账（先写者胜的唯一约束）。

pub mod consumer;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod routes;
pub mod service;
pub mod state;

pub use error::{InventoryError, Result};
pub use models::{
    OperationType, ScanRecord, Shipment, ShipmentStatus, shipment_id_for_order,
};
pub use repository::{IdempotencyRepository, ShipmentRepository};
pub use service::ShipmentService;
