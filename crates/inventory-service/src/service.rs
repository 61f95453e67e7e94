//! 发货领域服务
//!
//! 发货单状态机的全部业务规则：幂等创建、扫码、发车协议与发车事件发布。
//!
//! 发车协议的检查顺序不可调换（台账先于发货单）：
//! 1. 台账命中（同键重试）→ 原样返回首次响应；
//! 2. 发货单已 DISPATCHED（不同键重放）→ 按持久化事实构造
//!    `alreadyDispatched = true` 响应，首次发车永远胜出；
//! 3. 真正发车：状态翻转 + 台账写入同一事务，只有这条路径发布
//!    `shipment.dispatched.v1`。
//! 并发竞争由唯一约束与状态守卫裁决，失败方一律回读胜者结果，不报错。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use tracing::{error, info, warn};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use fulfillment_shared::events::{
    DomainEvent, OrderCreatedData, ShipmentDispatchedData, event_types,
};
use fulfillment_shared::kafka::EventPublisher;

use crate::dto::{DispatchRequest, DispatchResponse, ScanRequest, ScanResponse};
use crate::error::{FieldError, InventoryError, Result};
use crate::models::{
    DispatchUpdate, NewScan, NewShipment, OperationType, ScanRecord, Shipment, ShipmentItem,
    ShipmentStatus, shipment_id_for_order,
};
use crate::repository::{
    DispatchPersistOutcome, IdempotencyRepositoryTrait, LedgerEntry, ScanPersistOutcome,
    ShipmentRepositoryTrait,
};

/// 信封 source 字段
const EVENT_SOURCE: &str = "/inventory-service";

// ---------------------------------------------------------------------------
// DomainEventPublisher — 发布抽象
// ---------------------------------------------------------------------------

/// 事件发布抽象，便于服务层单元测试验证"只有真正发车才发布"
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DomainEventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> fulfillment_shared::error::Result<()>;
}

#[async_trait]
impl DomainEventPublisher for EventPublisher {
    async fn publish(&self, event: &DomainEvent) -> fulfillment_shared::error::Result<()> {
        EventPublisher::publish(self, event).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// ShipmentService
// ---------------------------------------------------------------------------

/// 发货服务
pub struct ShipmentService<S, I, P> {
    shipments: Arc<S>,
    ledger: Arc<I>,
    publisher: Arc<P>,
}

impl<S, I, P> ShipmentService<S, I, P>
where
    S: ShipmentRepositoryTrait,
    I: IdempotencyRepositoryTrait,
    P: DomainEventPublisher,
{
    pub fn new(shipments: Arc<S>, ledger: Arc<I>, publisher: Arc<P>) -> Self {
        Self {
            shipments,
            ledger,
            publisher,
        }
    }

    /// 消费 `order.created.v1`：惰性且幂等地创建发货单
    ///
    /// 发货单号由订单号纯函数导出，重复投递算出同一主键，
    /// 插入冲突被静默吞掉。返回是否实际创建。
    pub async fn register_order_created(&self, data: &OrderCreatedData) -> Result<bool> {
        let ship_date = NaiveDate::parse_from_str(&data.requested_ship_date, "%Y-%m-%d")
            .map_err(|_| {
                InventoryError::Validation(vec![FieldError::new(
                    "requestedShipDate",
                    "必须为 YYYY-MM-DD 格式的日历日期",
                )])
            })?;

        let shipment_id = shipment_id_for_order(&data.order_id);

        let new_shipment = NewShipment {
            shipment_id: shipment_id.clone(),
            order_id: data.order_id.clone(),
            client_id: data.client_id.clone(),
            requested_ship_date: ship_date,
            items: data
                .items
                .iter()
                .map(|i| ShipmentItem {
                    sku: i.sku.clone(),
                    quantity: i.quantity,
                })
                .collect(),
            created_by: data.created_by.clone(),
            created_at: Utc::now(),
        };

        let inserted = self.shipments.insert_if_absent(&new_shipment).await?;

        if inserted {
            info!(
                shipment_id = %shipment_id,
                order_id = %data.order_id,
                "发货单已创建（PENDING）"
            );
        } else {
            info!(
                shipment_id = %shipment_id,
                order_id = %data.order_id,
                "order.created 重复投递，发货单已存在"
            );
        }

        Ok(inserted)
    }

    /// 扫码装车
    ///
    /// 幂等键可选：带键且台账命中时原样返回首次响应，不触碰发货单。
    /// 首次扫码把 PENDING 推进到 LOADING；LOADING 下的再次扫码
    /// 状态不变，但审计日志仍然追加。
    pub async fn record_scan(
        &self,
        shipment_id: &str,
        req: ScanRequest,
        scanned_by: &str,
        idempotency_key: Option<String>,
    ) -> Result<ScanResponse> {
        validate_request(&req)?;

        // 1. 台账命中：不读不写发货单，直接返回存储的响应
        if let Some(key) = &idempotency_key
            && let Some(stored) = self.ledger.find(OperationType::Scan, key).await?
        {
            info!(shipment_id, key = %key, "扫码请求命中幂等台账，返回首次响应");
            return parse_stored(stored);
        }

        // 2. 查发货单并检查状态：发车后不再接受扫码
        let shipment = self
            .shipments
            .find(shipment_id)
            .await?
            .ok_or_else(|| InventoryError::ShipmentNotFound(shipment_id.to_string()))?;

        if shipment.status == ShipmentStatus::Dispatched {
            return Err(InventoryError::ScanAfterDispatch(shipment_id.to_string()));
        }

        let new_status = match shipment.status {
            ShipmentStatus::Pending => ShipmentStatus::Loading,
            other => other,
        };

        let scan = NewScan {
            barcode: req.barcode.clone(),
            quantity: req.quantity,
            scanned_by: scanned_by.to_string(),
            scanned_at: Utc::now(),
        };

        let response = ScanResponse {
            shipment_id: shipment.shipment_id.clone(),
            order_id: shipment.order_id.clone(),
            status: new_status,
            barcode: scan.barcode.clone(),
            quantity: scan.quantity,
            scanned_by: scan.scanned_by.clone(),
            scanned_at: scan.scanned_at,
        };

        let entry = match &idempotency_key {
            Some(key) => Some(LedgerEntry {
                operation: OperationType::Scan,
                key: key.clone(),
                response: serde_json::to_value(&response)?,
            }),
            None => None,
        };

        // 3. 单事务落库；并发竞争的裁决结果在 Outcome 里
        match self
            .shipments
            .record_scan(shipment_id, &scan, new_status, entry)
            .await?
        {
            ScanPersistOutcome::Recorded => {
                info!(
                    shipment_id,
                    barcode = %scan.barcode,
                    status = ?new_status,
                    "扫码已记录"
                );
                Ok(response)
            }
            ScanPersistOutcome::DispatchedMeanwhile => {
                Err(InventoryError::ScanAfterDispatch(shipment_id.to_string()))
            }
            ScanPersistOutcome::LedgerConflict(stored) => {
                info!(shipment_id, "扫码请求在台账竞争中落败，返回胜者响应");
                parse_stored(stored)
            }
        }
    }

    /// 发车
    ///
    /// 幂等键必填：发车是物理动作（卡车离场），网络重试绝不允许
    /// 造成第二次出库。协议顺序见模块文档。
    pub async fn dispatch_shipment(
        &self,
        shipment_id: &str,
        req: DispatchRequest,
        dispatched_by: &str,
        idempotency_key: Option<String>,
    ) -> Result<DispatchResponse> {
        // 缺键是验证错误，不替客户端生成：键必须来自重试间保持不变的一端
        let key = idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                InventoryError::Validation(vec![FieldError::new(
                    "Idempotency-Key",
                    "发车请求必须携带幂等键",
                )])
            })?;

        // 1. 台账先于发货单：同键重试返回首次响应，逐字节一致
        if let Some(stored) = self.ledger.find(OperationType::Dispatch, key).await? {
            info!(shipment_id, key, "发车请求命中幂等台账，返回首次响应");
            return parse_stored(stored);
        }

        // 2. 查发货单并检查状态
        let shipment = self
            .shipments
            .find(shipment_id)
            .await?
            .ok_or_else(|| InventoryError::ShipmentNotFound(shipment_id.to_string()))?;

        match shipment.status {
            // 不同键重放（如操作员双击导致客户端键漂移）：
            // 按持久化事实应答并把新键也登记到台账
            ShipmentStatus::Dispatched => {
                info!(shipment_id, key, "发货单已发车，按持久化事实返回");
                return self.record_already_dispatched(key, &shipment).await;
            }
            ShipmentStatus::Failed => {
                return Err(InventoryError::InvalidDispatchState {
                    shipment_id: shipment_id.to_string(),
                    status: "FAILED".to_string(),
                });
            }
            ShipmentStatus::Pending | ShipmentStatus::Loading => {}
        }

        // 3. 真正发车：构造响应，状态翻转与台账写入在同一事务
        let update = DispatchUpdate {
            dispatched_by: dispatched_by.to_string(),
            truck_id: req.truck_id.clone(),
            dispatched_at: Utc::now(),
        };

        let response = DispatchResponse {
            shipment_id: shipment.shipment_id.clone(),
            order_id: shipment.order_id.clone(),
            status: ShipmentStatus::Dispatched,
            truck_id: update.truck_id.clone(),
            dispatched_at: update.dispatched_at,
            dispatched_by: update.dispatched_by.clone(),
            already_dispatched: false,
        };

        let entry = LedgerEntry {
            operation: OperationType::Dispatch,
            key: key.to_string(),
            response: serde_json::to_value(&response)?,
        };

        match self.shipments.dispatch(shipment_id, &update, entry).await? {
            DispatchPersistOutcome::Dispatched => {
                info!(
                    shipment_id,
                    order_id = %shipment.order_id,
                    truck_id = ?update.truck_id,
                    "发货单已发车"
                );

                // 4. 只有真正发车才发布事件；重放/重试路径永不二次发布
                self.publish_shipment_dispatched(&shipment, &update).await;

                Ok(response)
            }
            DispatchPersistOutcome::LostToExistingDispatch(winner) => {
                info!(shipment_id, key, "发车竞争落败，按先行者的持久化事实返回");
                self.record_already_dispatched(key, &winner).await
            }
            DispatchPersistOutcome::LedgerConflict(stored) => {
                info!(shipment_id, key, "同键发车请求抢先提交，返回其响应");
                parse_stored(stored)
            }
        }
    }

    /// 以持久化的发车事实构造 `alreadyDispatched = true` 响应并登记台账
    ///
    /// 台账登记采用先写者胜：若这个键在竞争中已被写入，返回已存储的值，
    /// 保证同键的后续重试同样逐字节一致。
    async fn record_already_dispatched(
        &self,
        key: &str,
        shipment: &Shipment,
    ) -> Result<DispatchResponse> {
        let dispatched_at = shipment.dispatched_at.ok_or_else(|| {
            InventoryError::Internal(format!(
                "发货单 {} 状态为 DISPATCHED 但缺少发车时间",
                shipment.shipment_id
            ))
        })?;
        let dispatched_by = shipment.dispatched_by.clone().ok_or_else(|| {
            InventoryError::Internal(format!(
                "发货单 {} 状态为 DISPATCHED 但缺少发车人",
                shipment.shipment_id
            ))
        })?;

        let response = DispatchResponse {
            shipment_id: shipment.shipment_id.clone(),
            order_id: shipment.order_id.clone(),
            status: ShipmentStatus::Dispatched,
            truck_id: shipment.truck_id.clone(),
            dispatched_at,
            dispatched_by,
            already_dispatched: true,
        };

        let winning = self
            .ledger
            .insert_or_get(
                OperationType::Dispatch,
                key,
                &serde_json::to_value(&response)?,
            )
            .await?;

        parse_stored(winning)
    }

    /// 发布 `shipment.dispatched.v1`（尽力而为）
    ///
    /// 发车已提交，发布失败只记日志，绝不回滚出库事实。
    async fn publish_shipment_dispatched(&self, shipment: &Shipment, update: &DispatchUpdate) {
        let data = ShipmentDispatchedData {
            shipment_id: shipment.shipment_id.clone(),
            order_id: shipment.order_id.clone(),
            order_created_by: shipment.created_by.clone(),
            dispatched_by: update.dispatched_by.clone(),
            truck_id: update.truck_id.clone(),
            dispatched_at: update.dispatched_at,
        };

        let payload = match serde_json::to_value(&data) {
            Ok(v) => v,
            Err(e) => {
                error!(
                    shipment_id = %shipment.shipment_id,
                    error = %e,
                    "shipment.dispatched 载荷序列化失败"
                );
                return;
            }
        };

        let event = DomainEvent::new(
            event_types::SHIPMENT_DISPATCHED,
            EVENT_SOURCE,
            &format!("shipments/{}", shipment.shipment_id),
            update.dispatched_at,
            payload,
        );

        if let Err(e) = self.publisher.publish(&event).await {
            error!(
                shipment_id = %shipment.shipment_id,
                event_id = %event.id,
                error = %e,
                "发布 shipment.dispatched 事件失败，发车已提交，事件待人工补发"
            );
        }
    }

    pub async fn get_shipment(&self, shipment_id: &str) -> Result<Shipment> {
        self.shipments
            .find(shipment_id)
            .await?
            .ok_or_else(|| InventoryError::ShipmentNotFound(shipment_id.to_string()))
    }

    pub async fn list_shipments(&self, status: Option<ShipmentStatus>) -> Result<Vec<Shipment>> {
        self.shipments.list_by_status(status).await
    }

    pub async fn get_scans(&self, shipment_id: &str) -> Result<Vec<ScanRecord>> {
        if self.shipments.find(shipment_id).await?.is_none() {
            return Err(InventoryError::ShipmentNotFound(shipment_id.to_string()));
        }
        self.shipments.scans(shipment_id).await
    }
}

// ---------------------------------------------------------------------------
// 辅助函数
// ---------------------------------------------------------------------------

/// 台账里的响应按原结构解析后返回
///
/// 结构固定、字段顺序固定，重新序列化与首次响应逐字节一致。
fn parse_stored<T: DeserializeOwned>(stored: serde_json::Value) -> Result<T> {
    serde_json::from_value(stored)
        .map_err(|e| InventoryError::Internal(format!("台账响应解析失败: {e}")))
}

/// 校验扁平请求体，错误展平为字段级列表
fn validate_request<T: Validate>(req: &T) -> Result<()> {
    let Err(errors) = req.validate() else {
        return Ok(());
    };

    let mut fields = Vec::new();
    collect_flat_errors(&errors, &mut fields);
    Err(InventoryError::Validation(fields))
}

fn collect_flat_errors(errors: &ValidationErrors, out: &mut Vec<FieldError>) {
    for (field, kind) in errors.errors() {
        if let ValidationErrorsKind::Field(list) = kind {
            for err in list {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| err.code.to_string());
                out.push(FieldError::new(field.to_string(), message));
            }
        } else {
            warn!(field = %field, "忽略了非字段级的校验错误");
        }
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
