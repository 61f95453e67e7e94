//! 发货单与幂等台账仓储

mod idempotency_repo;
mod shipment_repo;
mod traits;

pub use idempotency_repo::IdempotencyRepository;
pub use shipment_repo::ShipmentRepository;
pub use traits::{
    DispatchPersistOutcome, IdempotencyRepositoryTrait, LedgerEntry, ScanPersistOutcome,
    ShipmentRepositoryTrait,
};

#[cfg(test)]
pub use traits::{MockIdempotencyRepositoryTrait, MockShipmentRepositoryTrait};
