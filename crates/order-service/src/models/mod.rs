//! 订单服务数据模型

mod order;

pub use order::{NewOrder, Order, OrderItem, OrderStatus, ShippedApplyResult, TimelineEntry};
