//! 通知投影错误类型
//!
//! 区分发送失败与渲染失败，便于上层决定重试或丢弃策略。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("通知发送失败: 渠道={channel}, 原因={reason}")]
    SendFailed { channel: String, reason: String },

    #[error("通知渲染失败: {0}")]
    RenderFailed(String),

    #[error(transparent)]
    Shared(#[from] fulfillment_shared::error::FulfillmentError),
}
