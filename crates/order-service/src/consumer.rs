//! 发货事件消费者
//!
//! 消费 `shipment.dispatched.v1`，把订单推进到 SHIPPED 终态。
//! 消费语义为 at-least-once：同一事件可能重复投递，幂等性由
//! 时间线唯一约束保证。坏消息只丢弃，绝不让消费循环崩溃。

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use fulfillment_shared::config::AppConfig;
use fulfillment_shared::events::{ShipmentDispatchedData, event_types};
use fulfillment_shared::kafka::{ConsumerMessage, EventConsumer, topics};

use crate::error::OrderError;
use crate::service::{DomainEventPublisher, OrderService};
use crate::repository::OrderRepositoryTrait;
use crate::state::SharedOrderService;

/// 发货事件消费者
///
/// 组合 EventConsumer（消息拉取）与 OrderService（业务处理）。
pub struct ShipmentEventConsumer {
    consumer: EventConsumer,
    service: Arc<SharedOrderService>,
}

impl ShipmentEventConsumer {
    pub fn new(config: &AppConfig, service: Arc<SharedOrderService>) -> Result<Self, OrderError> {
        let consumer = EventConsumer::new(&config.kafka, Some("shipment-events"))?;
        Ok(Self { consumer, service })
    }

    /// 启动消费循环，直到收到 shutdown 信号
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), OrderError> {
        self.consumer.subscribe(&[topics::SHIPMENT_DISPATCHED])?;

        info!(topic = topics::SHIPMENT_DISPATCHED, "发货事件消费者已启动");

        let service = self.service;

        self.consumer
            .start(shutdown, |msg| {
                let service = &service;
                async move {
                    if let Err(e) = handle_message(service, &msg).await {
                        error!(
                            error = %e,
                            topic = %msg.topic,
                            partition = msg.partition,
                            offset = msg.offset,
                            "处理发货事件失败"
                        );
                    }
                    Ok(())
                }
            })
            .await;

        info!("发货事件消费者已停止");
        Ok(())
    }
}

/// 处理单条消息的完整流程
///
/// 拆分为独立函数而非方法，便于在测试中直接调用而无需构造完整的 Consumer。
/// 流程：解析信封 -> 类型过滤 -> 载荷防御性校验 -> 幂等应用状态迁移。
/// 解析失败与校验失败的事件丢弃（返回 Ok），只有存储层错误才上抛。
pub async fn handle_message<R, P>(
    service: &OrderService<R, P>,
    msg: &ConsumerMessage,
) -> Result<(), OrderError>
where
    R: OrderRepositoryTrait,
    P: DomainEventPublisher,
{
    // 1. 解析信封：解析失败记日志后丢弃，不中断消费
    let event = match msg.decode_event() {
        Ok(event) => event,
        Err(e) => {
            warn!(
                topic = %msg.topic,
                offset = msg.offset,
                error = %e,
                "事件信封解析失败，已丢弃"
            );
            metrics::counter!("events_dropped_total", "reason" => "unparsable").increment(1);
            return Ok(());
        }
    };

    // 2. 未知类型静默忽略（对未来新增的事件类型保持前向兼容）
    if event.event_type != event_types::SHIPMENT_DISPATCHED {
        debug!(event_type = %event.event_type, "收到无关事件类型，忽略");
        return Ok(());
    }

    // 3. 载荷解析 + 防御性校验：空白字段不能流入订单数据
    let data: ShipmentDispatchedData = match event.data_as() {
        Ok(data) => data,
        Err(e) => {
            warn!(event_id = %event.id, error = %e, "事件载荷解析失败，已丢弃");
            metrics::counter!("events_dropped_total", "reason" => "bad_payload").increment(1);
            return Ok(());
        }
    };
    if let Err(e) = data.validate() {
        warn!(event_id = %event.id, error = %e, "事件载荷校验失败，已丢弃");
        metrics::counter!("events_dropped_total", "reason" => "invalid_data").increment(1);
        return Ok(());
    }

    info!(
        event_id = %event.id,
        order_id = %data.order_id,
        shipment_id = %data.shipment_id,
        "收到 shipment.dispatched 事件"
    );

    // 4. 幂等应用（重复投递在仓储层被唯一约束挡下）
    service.apply_shipment_dispatched(&data).await
}
