//! 发货流程集成测试
//!
//! 使用真实 PostgreSQL 验证幂等创建、扫码与发车协议的完整行为。
//! 台账唯一约束与状态守卫的并发裁决无法通过纯 mock 覆盖，因此需要集成测试。
//!
//! ## 运行方式
//!
//! ```bash
//! DATABASE_URL=postgres://... cargo test --test dispatch_idempotency_test -- --ignored
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use fulfillment_shared::config::DatabaseConfig;
use fulfillment_shared::database::Database;
use fulfillment_shared::events::{DomainEvent, OrderCreatedData, OrderItemData};
use fulfillment_shared::test_utils::test_order_id;

use inventory_service::dto::{DispatchRequest, ScanRequest};
use inventory_service::error::InventoryError;
use inventory_service::models::{ShipmentStatus, shipment_id_for_order};
use inventory_service::repository::{IdempotencyRepository, ShipmentRepository};
use inventory_service::service::{DomainEventPublisher, ShipmentService};

// ==================== 辅助 ====================

/// 记录发布次数的发布器：断言"只有真正发车才发布"
struct CountingPublisher {
    published: AtomicUsize,
}

impl CountingPublisher {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            published: AtomicUsize::new(0),
        })
    }

    fn count(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DomainEventPublisher for CountingPublisher {
    async fn publish(&self, _event: &DomainEvent) -> fulfillment_shared::error::Result<()> {
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

type TestService = ShipmentService<ShipmentRepository, IdempotencyRepository, CountingPublisher>;

async fn setup() -> (PgPool, TestService, Arc<CountingPublisher>) {
    let url = std::env::var("DATABASE_URL").expect("集成测试需要设置 DATABASE_URL");
    let config = DatabaseConfig {
        url,
        ..DatabaseConfig::default()
    };
    let db = Database::connect(&config).await.expect("数据库连接失败");
    db.run_migrations().await.expect("迁移执行失败");

    let pool = db.pool().clone();
    let publisher = CountingPublisher::new();
    let service = ShipmentService::new(
        Arc::new(ShipmentRepository::new(pool.clone())),
        Arc::new(IdempotencyRepository::new(pool.clone())),
        publisher.clone(),
    );

    (pool, service, publisher)
}

fn order_created(order_id: &str) -> OrderCreatedData {
    OrderCreatedData {
        order_id: order_id.to_string(),
        client_id: "c1".to_string(),
        requested_ship_date: "2026-03-01".to_string(),
        items: vec![OrderItemData {
            sku: "X".to_string(),
            quantity: 5,
        }],
        created_by: "u1".to_string(),
        created_at: Utc::now(),
    }
}

async fn shipment_row_count(pool: &PgPool, order_id: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM shipments WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(pool)
        .await
        .expect("查询发货单数量失败")
}

// ==================== 创建路径 ====================

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_duplicate_order_created_yields_single_shipment() {
    let (pool, service, _) = setup().await;
    let order_id = test_order_id();
    let data = order_created(&order_id);

    let first = service.register_order_created(&data).await.expect("首次创建失败");
    let second = service
        .register_order_created(&data)
        .await
        .expect("重复投递不应报错");

    assert!(first);
    assert!(!second);
    assert_eq!(shipment_row_count(&pool, &order_id).await, 1);

    let shipment = service
        .get_shipment(&shipment_id_for_order(&order_id))
        .await
        .expect("查询发货单失败");
    assert_eq!(shipment.status, ShipmentStatus::Pending);
    assert_eq!(shipment.order_id, order_id);
}

// ==================== 扫码路径 ====================

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_scan_transitions_pending_to_loading() {
    let (_, service, _) = setup().await;
    let order_id = test_order_id();
    service
        .register_order_created(&order_created(&order_id))
        .await
        .expect("创建发货单失败");

    let shipment_id = shipment_id_for_order(&order_id);
    let scan = ScanRequest {
        barcode: "X".to_string(),
        quantity: 5,
    };

    let first = service
        .record_scan(&shipment_id, scan.clone(), "w1", None)
        .await
        .expect("首次扫码失败");
    assert_eq!(first.status, ShipmentStatus::Loading);

    // LOADING 下的再次扫码：状态不变，但审计日志继续追加
    let second = service
        .record_scan(&shipment_id, scan, "w1", None)
        .await
        .expect("二次扫码失败");
    assert_eq!(second.status, ShipmentStatus::Loading);

    let scans = service.get_scans(&shipment_id).await.expect("查询扫码日志失败");
    assert_eq!(scans.len(), 2);
}

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_scan_with_key_replays_stored_response() {
    let (_, service, _) = setup().await;
    let order_id = test_order_id();
    service
        .register_order_created(&order_created(&order_id))
        .await
        .expect("创建发货单失败");

    let shipment_id = shipment_id_for_order(&order_id);
    let key = format!("scan-{order_id}");

    let first = service
        .record_scan(
            &shipment_id,
            ScanRequest {
                barcode: "X".to_string(),
                quantity: 5,
            },
            "w1",
            Some(key.clone()),
        )
        .await
        .expect("带键扫码失败");

    // 同键重试：参数不同也返回首次响应，且不再追加扫码日志
    let replay = service
        .record_scan(
            &shipment_id,
            ScanRequest {
                barcode: "OTHER".to_string(),
                quantity: 99,
            },
            "w2",
            Some(key),
        )
        .await
        .expect("同键重试失败");

    assert_eq!(replay, first);
    let scans = service.get_scans(&shipment_id).await.expect("查询扫码日志失败");
    assert_eq!(scans.len(), 1);
}

// ==================== 发车路径 ====================

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_dispatch_same_key_is_byte_identical_and_publishes_once() {
    let (_, service, publisher) = setup().await;
    let order_id = test_order_id();
    service
        .register_order_created(&order_created(&order_id))
        .await
        .expect("创建发货单失败");

    let shipment_id = shipment_id_for_order(&order_id);
    let key = format!("k1-{order_id}");
    let req = DispatchRequest {
        truck_id: Some("TRK-01".to_string()),
    };

    let first = service
        .dispatch_shipment(&shipment_id, req.clone(), "w1", Some(key.clone()))
        .await
        .expect("首次发车失败");
    assert!(!first.already_dispatched);
    assert_eq!(publisher.count(), 1);

    let retry = service
        .dispatch_shipment(&shipment_id, req, "w1", Some(key))
        .await
        .expect("同键重试失败");

    // 逐字节一致，且重试不会二次发布
    assert_eq!(
        serde_json::to_string(&first).expect("序列化失败"),
        serde_json::to_string(&retry).expect("序列化失败")
    );
    assert_eq!(publisher.count(), 1);
}

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_dispatch_different_key_returns_first_call_facts() {
    let (_, service, publisher) = setup().await;
    let order_id = test_order_id();
    service
        .register_order_created(&order_created(&order_id))
        .await
        .expect("创建发货单失败");

    let shipment_id = shipment_id_for_order(&order_id);

    let first = service
        .dispatch_shipment(
            &shipment_id,
            DispatchRequest {
                truck_id: Some("TRK-FIRST".to_string()),
            },
            "w1",
            Some(format!("ka-{order_id}")),
        )
        .await
        .expect("首次发车失败");
    assert!(!first.already_dispatched);

    // 不同键 + 不同卡车：返回首次发车的事实，不做第二次库存变更
    let second = service
        .dispatch_shipment(
            &shipment_id,
            DispatchRequest {
                truck_id: Some("TRK-SECOND".to_string()),
            },
            "w2",
            Some(format!("kb-{order_id}")),
        )
        .await
        .expect("不同键重放失败");

    assert!(second.already_dispatched);
    assert_eq!(second.truck_id.as_deref(), Some("TRK-FIRST"));
    assert_eq!(second.dispatched_at, first.dispatched_at);
    assert_eq!(second.dispatched_by, first.dispatched_by);
    assert_eq!(publisher.count(), 1);
}

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_dispatch_without_key_rejected() {
    let (_, service, publisher) = setup().await;
    let order_id = test_order_id();
    service
        .register_order_created(&order_created(&order_id))
        .await
        .expect("创建发货单失败");

    let result = service
        .dispatch_shipment(
            &shipment_id_for_order(&order_id),
            DispatchRequest { truck_id: None },
            "w1",
            None,
        )
        .await;

    assert!(matches!(result, Err(InventoryError::Validation(_))));
    assert_eq!(publisher.count(), 0);
}

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_scan_rejected_after_dispatch() {
    let (_, service, _) = setup().await;
    let order_id = test_order_id();
    service
        .register_order_created(&order_created(&order_id))
        .await
        .expect("创建发货单失败");

    let shipment_id = shipment_id_for_order(&order_id);
    service
        .dispatch_shipment(
            &shipment_id,
            DispatchRequest { truck_id: None },
            "w1",
            Some(format!("kd-{order_id}")),
        )
        .await
        .expect("发车失败");

    let result = service
        .record_scan(
            &shipment_id,
            ScanRequest {
                barcode: "X".to_string(),
                quantity: 1,
            },
            "w1",
            None,
        )
        .await;

    assert!(matches!(result, Err(InventoryError::ScanAfterDispatch(_))));
}

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_concurrent_dispatch_same_key_single_winner() {
    let (_, service, publisher) = setup().await;
    let order_id = test_order_id();
    service
        .register_order_created(&order_created(&order_id))
        .await
        .expect("创建发货单失败");

    let shipment_id = shipment_id_for_order(&order_id);
    let key = format!("race-{order_id}");
    let service = Arc::new(service);

    // 两个同键请求并发抢发车：台账唯一约束裁决，两边拿到同一响应
    let a = {
        let service = service.clone();
        let shipment_id = shipment_id.clone();
        let key = key.clone();
        tokio::spawn(async move {
            service
                .dispatch_shipment(
                    &shipment_id,
                    DispatchRequest {
                        truck_id: Some("TRK-A".to_string()),
                    },
                    "wa",
                    Some(key),
                )
                .await
        })
    };
    let b = {
        let service = service.clone();
        let shipment_id = shipment_id.clone();
        let key = key.clone();
        tokio::spawn(async move {
            service
                .dispatch_shipment(
                    &shipment_id,
                    DispatchRequest {
                        truck_id: Some("TRK-B".to_string()),
                    },
                    "wb",
                    Some(key),
                )
                .await
        })
    };

    let ra = a.await.expect("任务 a panic").expect("请求 a 失败");
    let rb = b.await.expect("任务 b panic").expect("请求 b 失败");

    // 胜者只有一个，两个响应指向同一次发车
    assert_eq!(ra.truck_id, rb.truck_id);
    assert_eq!(ra.dispatched_at, rb.dispatched_at);
    assert_eq!(publisher.count(), 1);
}
