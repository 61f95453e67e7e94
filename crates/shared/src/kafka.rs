//! Kafka 事件总线封装
//!
//! 将 rdkafka 的底层 API 封装为面向领域事件的 Publisher/Consumer 抽象，
//! 统一信封序列化、传输元数据和优雅关闭语义。每个路由键对应一个 topic，
//! 每个消费服务使用独立的消费组，等价于"按消费者绑定的持久队列"。

use std::collections::HashMap;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::error::FulfillmentError;
use crate::events::{CLOUDEVENTS_CONTENT_TYPE, DomainEvent};

// ---------------------------------------------------------------------------
// 路由键 / topic 常量
// ---------------------------------------------------------------------------

/// 集中管理路由键（即 topic 名），与事件类型的点分后缀一致
pub mod topics {
    pub const ORDER_CREATED: &str = "order.created.v1";
    pub const SHIPMENT_DISPATCHED: &str = "shipment.dispatched.v1";
    pub const LEAD_CREATED: &str = "lead.created.v1";
}

/// 传输层 header 名
pub mod headers {
    pub const CONTENT_TYPE: &str = "content-type";
    /// 消息 id = 信封 id，消费方据此去重
    pub const EVENT_ID: &str = "ce-id";
    /// 消息类型 = 信封 type，消费方据此分发
    pub const EVENT_TYPE: &str = "ce-type";
}

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的 Kafka 消息的统一表示
///
/// 将 rdkafka 的 `BorrowedMessage`（带生命周期约束）转换为拥有所有权的结构体，
/// 使消息可以安全地跨 await 点传递给异步处理函数。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl ConsumerMessage {
    /// 从 rdkafka 的借用消息构造，提取并拥有所有字段
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        let payload = msg.payload().map(|p| p.to_vec()).unwrap_or_default();

        let mut headers = HashMap::new();
        if let Some(h) = msg.headers() {
            for idx in 0..h.count() {
                let header = h.get(idx);
                if let Some(raw) = header.value
                    && let Ok(value) = std::str::from_utf8(raw)
                {
                    headers.insert(header.key.to_string(), value.to_string());
                }
            }
        }

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key,
            payload,
            headers,
        }
    }

    /// 解析事件信封
    pub fn decode_event(&self) -> Result<DomainEvent, FulfillmentError> {
        DomainEvent::from_slice(&self.payload)
    }

    /// 传输层携带的事件类型（缺失时为 None，以信封内 type 为准）
    pub fn event_type_header(&self) -> Option<&str> {
        self.headers.get(headers::EVENT_TYPE).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// EventPublisher
// ---------------------------------------------------------------------------

/// 领域事件发布器
///
/// 序列化信封、设置传输元数据后发布到路由键对应的 topic。
/// `send` 等待 broker 确认后返回，调用方决定确认失败后的策略
/// （主写路径记日志吞掉，测试场景直接断言）。
#[derive(Clone)]
pub struct EventPublisher {
    producer: FutureProducer,
}

impl EventPublisher {
    /// 根据配置创建发布器
    ///
    /// `message.timeout.ms` 设为 5 秒：发布是尽力而为的旁路动作，
    /// 不应让主写路径无限等待下游消息系统。
    pub fn new(config: &KafkaConfig) -> Result<Self, FulfillmentError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| FulfillmentError::Kafka(format!("创建生产者失败: {e}")))?;

        info!(brokers = %config.brokers, "Kafka 事件发布器已初始化");
        Ok(Self { producer })
    }

    /// 发布领域事件
    ///
    /// - topic = 信封路由键（事件类型的点分后缀）
    /// - 消息 key = 信封 subject，同一实体的事件落在同一分区保序
    /// - headers 携带 content-type 与信封 id/type
    pub async fn publish(&self, event: &DomainEvent) -> Result<(i32, i64), FulfillmentError> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| FulfillmentError::Kafka(format!("信封序列化失败: {e}")))?;

        let topic = event.routing_key();
        let record_headers = OwnedHeaders::new()
            .insert(Header {
                key: headers::CONTENT_TYPE,
                value: Some(CLOUDEVENTS_CONTENT_TYPE),
            })
            .insert(Header {
                key: headers::EVENT_ID,
                value: Some(event.id.as_str()),
            })
            .insert(Header {
                key: headers::EVENT_TYPE,
                value: Some(event.event_type.as_str()),
            });

        let record = FutureRecord::to(topic)
            .key(&event.subject)
            .payload(&payload)
            .headers(record_headers);

        let delivery = self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| FulfillmentError::Kafka(format!("发布事件失败: {e}")))?;

        metrics::counter!("events_published_total", "type" => event.event_type.clone())
            .increment(1);

        debug!(
            topic,
            event_id = %event.id,
            event_type = %event.event_type,
            partition = delivery.partition,
            offset = delivery.offset,
            "事件已发布"
        );
        Ok((delivery.partition, delivery.offset))
    }
}

// ---------------------------------------------------------------------------
// EventConsumer
// ---------------------------------------------------------------------------

/// 领域事件消费者
///
/// 封装 `StreamConsumer` 并提供基于 `watch` channel 的优雅关闭语义，
/// 确保进程退出时不会丢失正在处理的消息。
pub struct EventConsumer {
    consumer: StreamConsumer,
}

impl EventConsumer {
    /// 创建消费者
    ///
    /// `group_id_suffix` 允许同一服务内不同消费逻辑使用独立的消费组，
    /// 例如 "order-service.shipment-events"。
    pub fn new(
        config: &KafkaConfig,
        group_id_suffix: Option<&str>,
    ) -> Result<Self, FulfillmentError> {
        let group_id = match group_id_suffix {
            Some(suffix) => format!("{}.{}", config.consumer_group, suffix),
            None => config.consumer_group.clone(),
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "true")
            .create()
            .map_err(|e| FulfillmentError::Kafka(format!("创建消费者失败: {e}")))?;

        info!(brokers = %config.brokers, group_id, "Kafka 事件消费者已初始化");
        Ok(Self { consumer })
    }

    /// 订阅指定的路由键列表
    pub fn subscribe(&self, topics: &[&str]) -> Result<(), FulfillmentError> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| FulfillmentError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(?topics, "已订阅事件路由键");
        Ok(())
    }

    /// 启动消费循环
    ///
    /// 使用 `tokio::select!` 同时监听消息流和关闭信号：
    /// - 收到消息时调用 handler 处理；handler 返回错误只记录日志而不中断循环，
    ///   单条坏消息不能让整个消费者停止。
    /// - 关闭信号变为 `true` 时退出循环，确保正在执行的 handler 能自然完成。
    pub async fn start<F, Fut>(self, mut shutdown: watch::Receiver<bool>, handler: F)
    where
        F: Fn(ConsumerMessage) -> Fut,
        Fut: std::future::Future<Output = Result<(), FulfillmentError>>,
    {
        use futures::StreamExt;

        let stream = self.consumer.stream();
        futures::pin_mut!(stream);

        info!("事件消费循环已启动");

        loop {
            tokio::select! {
                // 偏向关闭信号，保证收到关闭时能尽快退出
                biased;

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("收到关闭信号，事件消费循环退出");
                        break;
                    }
                }

                msg_result = stream.next() => {
                    let Some(msg_result) = msg_result else {
                        warn!("Kafka 消息流意外结束");
                        break;
                    };

                    match msg_result {
                        Ok(borrowed_msg) => {
                            let msg = ConsumerMessage::from_borrowed(&borrowed_msg);
                            metrics::counter!("events_consumed_total", "topic" => msg.topic.clone())
                                .increment(1);
                            debug!(
                                topic = %msg.topic,
                                partition = msg.partition,
                                offset = msg.offset,
                                "收到事件消息"
                            );

                            if let Err(e) = handler(msg).await {
                                error!(error = %e, "处理事件消息失败");
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "接收 Kafka 消息出错");
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
