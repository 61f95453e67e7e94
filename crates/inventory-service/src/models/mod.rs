//! 仓库服务数据模型

mod idempotency;
mod shipment;

pub use idempotency::{IdempotencyRecord, OperationType};
pub use shipment::{
    DispatchUpdate, NewScan, NewShipment, ScanRecord, Shipment, ShipmentItem, ShipmentStatus,
    shipment_id_for_order,
};
