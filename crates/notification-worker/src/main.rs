//! 通知投影入口
//!
//! 消费履约域事件并推送用户通知的后台 worker，无 HTTP 服务面。

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use fulfillment_shared::config::AppConfig;
use fulfillment_shared::observability;

use notification_worker::consumer::NotificationConsumer;
use notification_worker::sender::{AppPushSender, EmailSender, NotificationSender};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("notification-worker").unwrap_or_default();

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting notification-worker...");

    let senders: Vec<Arc<dyn NotificationSender>> =
        vec![Arc::new(AppPushSender), Arc::new(EmailSender)];

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = NotificationConsumer::new(&config, senders)?;
    let consumer_handle = tokio::spawn(async move { consumer.run(shutdown_rx).await });

    shutdown_signal().await;

    let _ = shutdown_tx.send(true);
    let _ = consumer_handle.await;

    info!("Worker shutdown complete");

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
