//! 订单领域服务
//!
//! 订单状态机的全部业务规则：创建校验、SHIPPED 迁移的幂等应用、
//! 以及提交后的尽力而为事件发布。
//!
//! 发布失败不回滚订单写入：订单是本服务的主记录，不能因为下游消息
//! 系统故障而丢单。丢失的事件依赖人工补发（无 outbox，见 DESIGN.md）。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::{error, info, warn};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use fulfillment_shared::events::{
    DomainEvent, OrderCreatedData, OrderItemData, ShipmentDispatchedData, event_types,
};
use fulfillment_shared::kafka::EventPublisher;

use crate::dto::CreateOrderRequest;
use crate::error::{FieldError, OrderError, Result};
use crate::models::{NewOrder, Order, OrderItem, OrderStatus, ShippedApplyResult, TimelineEntry};
use crate::repository::OrderRepositoryTrait;

/// 信封 source 字段
const EVENT_SOURCE: &str = "/order-service";

// ---------------------------------------------------------------------------
// DomainEventPublisher — 发布抽象
// ---------------------------------------------------------------------------

/// 事件发布抽象，便于服务层单元测试验证发布行为（含失败吞掉的场景）
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
// OrderService
// ---------------------------------------------------------------------------

/// 订单服务
pub struct OrderService<R, P> {
    repo: Arc<R>,
    publisher: Arc<P>,
}

impl<R, P> OrderService<R, P>
where
    R: OrderRepositoryTrait,
    P: DomainEventPublisher,
{
    pub fn new(repo: Arc<R>, publisher: Arc<P>) -> Self {
        Self { repo, publisher }
    }

    /// 创建订单
    ///
    /// 校验失败返回字段级错误列表，不产生任何写入；
    /// 校验通过后分配序列订单号，事务内写入订单 + CREATED 时间线行，
    /// 提交后尽力发布 `order.created.v1`。
    pub async fn create_order(&self, req: CreateOrderRequest, created_by: &str) -> Result<Order> {
        let ship_date = validate_create_request(&req)?;

        let order_id = self.repo.next_order_id().await?;
        let now = Utc::now();

        let new_order = NewOrder {
            order_id: order_id.clone(),
            client_id: req.client_id.clone(),
            requested_ship_date: ship_date,
            items: req
                .items
                .iter()
                .map(|i| OrderItem {
                    sku: i.sku.clone(),
                    quantity: i.quantity,
                })
                .collect(),
            notes: req.notes.clone(),
            created_by: created_by.to_string(),
            created_at: now,
        };

        self.repo.create(&new_order).await?;

        info!(
            order_id = %new_order.order_id,
            client_id = %new_order.client_id,
            items = new_order.items.len(),
            "订单已创建"
        );

        self.publish_order_created(&new_order).await;

        Ok(Order {
            order_id: new_order.order_id,
            client_id: new_order.client_id,
            requested_ship_date: new_order.requested_ship_date,
            items: sqlx::types::Json(new_order.items),
            notes: new_order.notes,
            created_by: new_order.created_by,
            status: OrderStatus::Created,
            shipment_id: None,
            created_at: new_order.created_at,
        })
    }

    /// 发布 `order.created.v1`（尽力而为）
    ///
    /// 失败只记日志：订单写入已提交，不能回滚，也不自动重试。
    async fn publish_order_created(&self, order: &NewOrder) {
        let data = OrderCreatedData {
            order_id: order.order_id.clone(),
            client_id: order.client_id.clone(),
            requested_ship_date: order.requested_ship_date.format("%Y-%m-%d").to_string(),
            items: order
                .items
                .iter()
                .map(|i| OrderItemData {
                    sku: i.sku.clone(),
                    quantity: i.quantity,
                })
                .collect(),
            created_by: order.created_by.clone(),
            created_at: order.created_at,
        };

        let payload = match serde_json::to_value(&data) {
            Ok(v) => v,
            Err(e) => {
                error!(order_id = %order.order_id, error = %e, "order.created 载荷序列化失败");
                return;
            }
        };

        let event = DomainEvent::new(
            event_types::ORDER_CREATED,
            EVENT_SOURCE,
            &format!("orders/{}", order.order_id),
            order.created_at,
            payload,
        );

        if let Err(e) = self.publisher.publish(&event).await {
            error!(
                order_id = %order.order_id,
                event_id = %event.id,
                error = %e,
                "发布 order.created 事件失败，订单已提交，事件待人工补发"
            );
        }
    }

    /// 应用 `shipment.dispatched.v1` 事件
    ///
    /// 必须可被同一事件重复调用：时间线唯一约束保证不会出现
    /// 第二条 SHIPPED 行，状态也不会被重复翻转。
    pub async fn apply_shipment_dispatched(&self, data: &ShipmentDispatchedData) -> Result<()> {
        let result = self
            .repo
            .mark_shipped(&data.order_id, &data.shipment_id, data.dispatched_at)
            .await?;

        match result {
            ShippedApplyResult::Applied => {
                info!(
                    order_id = %data.order_id,
                    shipment_id = %data.shipment_id,
                    "订单已标记为 SHIPPED"
                );
            }
            ShippedApplyResult::Duplicate => {
                info!(
                    order_id = %data.order_id,
                    "shipment.dispatched 重复投递，已忽略"
                );
            }
            ShippedApplyResult::OrderNotFound => {
                warn!(
                    order_id = %data.order_id,
                    shipment_id = %data.shipment_id,
                    "shipment.dispatched 引用了不存在的订单，事件已丢弃"
                );
            }
        }

        Ok(())
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order> {
        self.repo
            .find(order_id)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_id.to_string()))
    }

    pub async fn list_orders(&self, client_id: &str) -> Result<Vec<Order>> {
        self.repo.list_by_client(client_id).await
    }

    /// 获取订单时间线（订单不存在返回 404 而非空列表）
    pub async fn get_timeline(&self, order_id: &str) -> Result<Vec<TimelineEntry>> {
        if self.repo.find(order_id).await?.is_none() {
            return Err(OrderError::OrderNotFound(order_id.to_string()));
        }
        self.repo.timeline(order_id).await
    }
}

// ---------------------------------------------------------------------------
// 请求校验
// ---------------------------------------------------------------------------

/// 校验创建订单请求，返回解析后的发货日期
///
/// validator 覆盖非空/正数约束，日期可解析性需要手工检查。
/// 所有错误合并为一个字段级列表一次性返回。
fn validate_create_request(req: &CreateOrderRequest) -> Result<NaiveDate> {
    let mut fields = Vec::new();

    if let Err(errors) = req.validate() {
        collect_field_errors(&errors, "", &mut fields);
    }

    let ship_date = match NaiveDate::parse_from_str(&req.requested_ship_date, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            fields.push(FieldError::new(
                "requestedShipDate",
                "必须为 YYYY-MM-DD 格式的日历日期",
            ));
            None
        }
    };

    match (fields.is_empty(), ship_date) {
        (true, Some(date)) => Ok(date),
        _ => Err(OrderError::Validation(fields)),
    }
}

/// 将 validator 的嵌套错误结构展平为字段级列表
///
/// 字段名转为 camelCase 与线上请求体保持一致，列表项带下标（items[0].sku）。
fn collect_field_errors(errors: &ValidationErrors, prefix: &str, out: &mut Vec<FieldError>) {
    for (field, kind) in errors.errors() {
        let name = if prefix.is_empty() {
            camelize(field)
        } else {
            format!("{prefix}.{}", camelize(field))
        };

        match kind {
            ValidationErrorsKind::Field(list) => {
                for err in list {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| err.code.to_string());
                    out.push(FieldError::new(name.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(nested) => {
                collect_field_errors(nested, &name, out);
            }
            ValidationErrorsKind::List(map) => {
                for (idx, nested) in map {
                    collect_field_errors(nested, &format!("{name}[{idx}]"), out);
                }
            }
        }
    }
}

/// snake_case -> camelCase（client_id -> clientId）
fn camelize(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper_next = false;
    for c in field.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
