//! 通知发送器
//!
//! 通过 `NotificationSender` trait 抽象发送行为。当前版本为模拟发送
//! （仅记录日志），便于在无外部依赖的情况下验证消费管道的完整性。
//! 未来替换为真实推送 SDK 时只需实现同一 trait。

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::error::NotificationError;
use crate::templates::UserNotification;

/// 发送结果
pub struct SendResult {
    pub success: bool,
    pub channel: &'static str,
    /// 外部渠道返回的消息标识，用于追踪投递状态
    pub message_id: Option<String>,
    pub error: Option<String>,
}

/// 通知发送器 trait，各渠道实现具体的推送逻辑
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// 发送通知
    async fn send(&self, notification: &UserNotification)
    -> Result<SendResult, NotificationError>;

    /// 渠道名（用于日志与指标）
    fn channel(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// APP 推送发送器
// ---------------------------------------------------------------------------

/// 模拟 APP 推送发送器
///
/// 生产环境中替换为 APNs / FCM 等推送服务的 SDK 调用
pub struct AppPushSender;

#[async_trait]
impl NotificationSender for AppPushSender {
    async fn send(
        &self,
        notification: &UserNotification,
    ) -> Result<SendResult, NotificationError> {
        let message_id = Uuid::now_v7().to_string();

        info!(
            channel = "APP_PUSH",
            notification_id = %notification.notification_id,
            user_id = %notification.user_id,
            message_id = %message_id,
            title = %notification.title,
            "模拟发送 APP 推送通知"
        );

        Ok(SendResult {
            success: true,
            channel: "APP_PUSH",
            message_id: Some(message_id),
            error: None,
        })
    }

    fn channel(&self) -> &'static str {
        "APP_PUSH"
    }
}

// ---------------------------------------------------------------------------
// 邮件发送器
// ---------------------------------------------------------------------------

/// 模拟邮件发送器
///
/// 生产环境中替换为邮件服务商的 API 调用
pub struct EmailSender;

#[async_trait]
impl NotificationSender for EmailSender {
    async fn send(
        &self,
        notification: &UserNotification,
    ) -> Result<SendResult, NotificationError> {
        let message_id = Uuid::now_v7().to_string();

        info!(
            channel = "EMAIL",
            notification_id = %notification.notification_id,
            user_id = %notification.user_id,
            message_id = %message_id,
            title = %notification.title,
            "模拟发送邮件通知"
        );

        Ok(SendResult {
            success: true,
            channel: "EMAIL",
            message_id: Some(message_id),
            error: None,
        })
    }

    fn channel(&self) -> &'static str {
        "EMAIL"
    }
}
