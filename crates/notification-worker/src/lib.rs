//! 通知投影
//!
//! 独立消费履约域事件（order.created / shipment.dispatched）与外部
//! 线索事件（lead.created），渲染为面向用户的通知并推送。
//! 投递为 fire-and-forget：不维护去重表，重复投递可能产生重复通知
//! （可接受的取舍，见 DESIGN.md）。

pub mod consumer;
pub mod error;
pub mod sender;
pub mod templates;

pub use error::NotificationError;
pub use templates::UserNotification;
