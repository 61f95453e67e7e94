//! 通知消费者
//!
//! 以独立消费组订阅三类事件路由键，渲染为用户通知后分发到各渠道。
//! 多渠道发送串行执行但互不影响：单个渠道失败只记日志。
//! 坏消息只丢弃，绝不让消费循环崩溃。

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use fulfillment_shared::config::AppConfig;
use fulfillment_shared::error::FulfillmentError;
use fulfillment_shared::kafka::{ConsumerMessage, EventConsumer, topics};

use crate::sender::NotificationSender;
use crate::templates;

/// 通知消费者
///
/// 组合 EventConsumer（消息拉取）、模板渲染与渠道发送器。
pub struct NotificationConsumer {
    consumer: EventConsumer,
    senders: Vec<Arc<dyn NotificationSender>>,
}

impl NotificationConsumer {
    pub fn new(
        config: &AppConfig,
        senders: Vec<Arc<dyn NotificationSender>>,
    ) -> Result<Self, FulfillmentError> {
        let consumer = EventConsumer::new(&config.kafka, Some("notifications"))?;
        Ok(Self { consumer, senders })
    }

    /// 启动消费循环，直到收到 shutdown 信号
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), FulfillmentError> {
        self.consumer.subscribe(&[
            topics::ORDER_CREATED,
            topics::SHIPMENT_DISPATCHED,
            topics::LEAD_CREATED,
        ])?;

        info!("通知消费者已启动");

        let senders = self.senders;

        self.consumer
            .start(shutdown, |msg| {
                let senders = &senders;
                async move {
                    handle_message(senders, &msg).await;
                    Ok(())
                }
            })
            .await;

        info!("通知消费者已停止");
        Ok(())
    }
}

/// 处理单条消息
///
/// 拆分为独立函数而非方法，便于在测试中直接调用而无需构造完整的 Consumer。
/// 任何失败（解析、渲染、发送）都不上抛：通知是旁路功能，丢一条
/// 好过卡住整个消费组。
pub async fn handle_message(senders: &[Arc<dyn NotificationSender>], msg: &ConsumerMessage) {
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
            return;
        }
    };

    let notification = match templates::render(&event) {
        Ok(Some(notification)) => notification,
        Ok(None) => return,
        Err(e) => {
            warn!(event_id = %event.id, error = %e, "通知渲染失败，已丢弃");
            metrics::counter!("events_dropped_total", "reason" => "render_failed").increment(1);
            return;
        }
    };

    info!(
        event_id = %event.id,
        notification_id = %notification.notification_id,
        user_id = %notification.user_id,
        title = %notification.title,
        "生成用户通知"
    );

    for sender in senders {
        match sender.send(&notification).await {
            Ok(result) if result.success => {}
            Ok(result) => {
                warn!(
                    notification_id = %notification.notification_id,
                    channel = result.channel,
                    error = ?result.error,
                    "渠道发送失败"
                );
            }
            Err(e) => {
                error!(
                    notification_id = %notification.notification_id,
                    channel = sender.channel(),
                    error = %e,
                    "渠道发送异常"
                );
            }
        }
    }
}
