//! 履约系统端到端测试
//!
//! 驱动真实部署的 order-service / inventory-service（及其间的 Kafka），
//! 覆盖完整业务链路：下单 -> 事件驱动创建发货单 -> 扫码 -> 发车 ->
//! 订单到达 SHIPPED 终态，以及发车重试的幂等语义。
//!
//! ## 运行方式
//!
//! 先启动 PostgreSQL、Kafka 与两个服务，然后：
//!
//! ```bash
//! ORDER_SERVICE_URL=http://localhost:8080 \
//! INVENTORY_SERVICE_URL=http://localhost:8081 \
//!   cargo test --test e2e -- --ignored
//! ```

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};

// ==================== 环境与客户端 ====================

fn order_service_url() -> String {
    std::env::var("ORDER_SERVICE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

fn inventory_service_url() -> String {
    std::env::var("INVENTORY_SERVICE_URL").unwrap_or_else(|_| "http://localhost:8081".to_string())
}

/// 带可信身份 header 的测试客户端
struct ApiClient {
    http: reqwest::Client,
    user_id: String,
}

impl ApiClient {
    fn new(user_id: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            user_id: user_id.to_string(),
        }
    }

    async fn post(&self, url: &str, body: &Value, idempotency_key: Option<&str>) -> reqwest::Response {
        let mut req = self
            .http
            .post(url)
            .header("x-user-id", &self.user_id)
            .json(body);
        if let Some(key) = idempotency_key {
            req = req.header("Idempotency-Key", key);
        }
        req.send().await.expect("POST 请求失败")
    }

    async fn get(&self, url: &str) -> reqwest::Response {
        self.http
            .get(url)
            .header("x-user-id", &self.user_id)
            .send()
            .await
            .expect("GET 请求失败")
    }
}

/// 轮询直到条件满足或超时（事件经由 Kafka 异步传播）
async fn wait_until<F, Fut>(what: &str, mut probe: F) -> Value
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<Value>>,
{
    for _ in 0..30 {
        if let Some(value) = probe().await {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("等待超时: {what}");
}

// ==================== 端到端场景 ====================

#[tokio::test]
#[ignore] // 需要运行中的服务与 Kafka
async fn test_full_fulfillment_flow() {
    let client = ApiClient::new("e2e-user");
    let order_base = order_service_url();
    let inventory_base = inventory_service_url();

    // 1. 下单：期望 201 且状态为 CREATED
    let response = client
        .post(
            &format!("{order_base}/orders"),
            &json!({
                "clientId": "c1",
                "requestedShipDate": "2026-03-01",
                "items": [{"sku": "X", "quantity": 5}]
            }),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.expect("响应解析失败");
    assert_eq!(body["data"]["status"], "CREATED");
    let order_id = body["data"]["orderId"].as_str().expect("缺少 orderId").to_string();
    let shipment_id = format!("ship_{}", order_id.trim_start_matches("ord_"));

    // 2. 等待 order.created 经 Kafka 传播，发货单以 PENDING 出现
    let shipment = wait_until("发货单创建", || {
        let client = &client;
        let url = format!("{inventory_base}/shipments/{shipment_id}");
        async move {
            let response = client.get(&url).await;
            if response.status() != StatusCode::OK {
                return None;
            }
            let body: Value = response.json().await.ok()?;
            Some(body["data"].clone())
        }
    })
    .await;
    assert_eq!(shipment["status"], "PENDING");
    assert_eq!(shipment["orderId"], order_id);

    // 3. 无键扫码：状态进入 LOADING
    let response = client
        .post(
            &format!("{inventory_base}/shipments/{shipment_id}/scan"),
            &json!({"barcode": "X", "quantity": 5}),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("响应解析失败");
    assert_eq!(body["data"]["status"], "LOADING");

    // 4. 缺少幂等键的发车被拒绝
    let response = client
        .post(
            &format!("{inventory_base}/shipments/{shipment_id}/dispatch"),
            &json!({"truckId": "TRK-01"}),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("响应解析失败");
    assert_eq!(body["code"], "VALIDATION_ERROR");

    // 5. 带键 k1 发车：首次 alreadyDispatched = false
    let response = client
        .post(
            &format!("{inventory_base}/shipments/{shipment_id}/dispatch"),
            &json!({"truckId": "TRK-01"}),
            Some("k1"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let first: Value = response.json().await.expect("响应解析失败");
    assert_eq!(first["data"]["alreadyDispatched"], json!(false));

    // 6. 同键重试：响应负载与首次完全一致
    let response = client
        .post(
            &format!("{inventory_base}/shipments/{shipment_id}/dispatch"),
            &json!({"truckId": "TRK-01"}),
            Some("k1"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let retry: Value = response.json().await.expect("响应解析失败");
    assert_eq!(first["data"], retry["data"]);

    // 7. 不同键重放：alreadyDispatched = true，事实来自首次发车
    let response = client
        .post(
            &format!("{inventory_base}/shipments/{shipment_id}/dispatch"),
            &json!({"truckId": "TRK-99"}),
            Some("k2"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let replay: Value = response.json().await.expect("响应解析失败");
    assert_eq!(replay["data"]["alreadyDispatched"], json!(true));
    assert_eq!(replay["data"]["truckId"], first["data"]["truckId"]);

    // 8. 等待 shipment.dispatched 回流，订单时间线为 [CREATED, SHIPPED]
    let timeline = wait_until("订单抵达 SHIPPED", || {
        let client = &client;
        let url = format!("{order_base}/orders/{order_id}/timeline");
        async move {
            let response = client.get(&url).await;
            if response.status() != StatusCode::OK {
                return None;
            }
            let body: Value = response.json().await.ok()?;
            let entries = body["data"].as_array()?.clone();
            if entries.len() >= 2 {
                Some(Value::Array(entries))
            } else {
                None
            }
        }
    })
    .await;

    let statuses: Vec<&str> = timeline
        .as_array()
        .expect("时间线应为数组")
        .iter()
        .map(|e| e["status"].as_str().expect("缺少 status"))
        .collect();
    assert_eq!(statuses, vec!["CREATED", "SHIPPED"]);
}

// ==================== 边界场景 ====================

#[tokio::test]
#[ignore] // 需要运行中的服务
async fn test_missing_identity_rejected() {
    let http = reqwest::Client::new();

    let response = http
        .get(format!("{}/orders?clientId=c1", order_service_url()))
        .send()
        .await
        .expect("GET 请求失败");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body: Value = response.json().await.expect("响应解析失败");
    assert_eq!(body["code"], "UNAUTHENTICATED");
}

#[tokio::test]
#[ignore] // 需要运行中的服务
async fn test_create_order_validation_error_lists_fields() {
    let client = ApiClient::new("e2e-user");

    let response = client
        .post(
            &format!("{}/orders", order_service_url()),
            &json!({
                "clientId": "",
                "requestedShipDate": "not-a-date",
                "items": []
            }),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = response.json().await.expect("响应解析失败");
    assert_eq!(body["code"], "VALIDATION_ERROR");
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .expect("errors 应为数组")
        .iter()
        .map(|e| e["field"].as_str().expect("缺少 field"))
        .collect();
    assert!(fields.contains(&"clientId"));
    assert!(fields.contains(&"requestedShipDate"));
    assert!(fields.contains(&"items"));
}
