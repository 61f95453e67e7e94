//! 订单服务入口
//!
//! 提供下单与订单查询 REST API，并消费发货事件推进订单状态。

use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info};

use fulfillment_shared::auth::identity_middleware;
use fulfillment_shared::config::AppConfig;
use fulfillment_shared::database::Database;
use fulfillment_shared::kafka::EventPublisher;
use fulfillment_shared::observability::{self, middleware as obs_middleware};

use order_service::consumer::ShipmentEventConsumer;
use order_service::handlers;
use order_service::repository::OrderRepository;
use order_service::routes;
use order_service::service::OrderService;
use order_service::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 统一加载配置：config/{service_name}.toml + FULFILLMENT_* 环境变量
    let config = AppConfig::load("order-service").unwrap_or_default();

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting order-service on {}", config.server_addr());

    // 初始化基础设施
    let db = Database::connect(&config.database).await?;
    if config.database.run_migrations {
        db.run_migrations().await?;
    }

    let publisher = EventPublisher::new(&config.kafka)?;
    let repo = Arc::new(OrderRepository::new(db.pool().clone()));
    let service = Arc::new(OrderService::new(repo, Arc::new(publisher)));

    // 发货事件消费者：独立任务，通过 watch channel 优雅关闭
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = ShipmentEventConsumer::new(&config, service.clone())?;
    let consumer_handle = tokio::spawn(async move {
        if let Err(e) = consumer.run(shutdown_rx).await {
            error!(error = %e, "发货事件消费者异常退出");
        }
    });

    let state = AppState::new(service, db);

    let app = Router::new()
        .merge(routes::api_routes())
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(30)))
        // 身份中间件：要求网关注入的可信身份 header
        .layer(middleware::from_fn(identity_middleware))
        // 可观测性中间件：请求追踪和指标收集
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 优雅关闭：收到 SIGTERM（K8s 停止 Pod）或 Ctrl+C 时，
    // 停止接收新连接并等待已有请求处理完毕
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // HTTP 已停，再通知消费循环退出并等待其完成手头消息
    let _ = shutdown_tx.send(true);
    let _ = consumer_handle.await;

    info!("Server shutdown complete");

    Ok(())
}

/// 监听关闭信号
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("注册 Ctrl+C 处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("注册 SIGTERM 处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
