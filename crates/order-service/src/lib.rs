//! 订单服务
//!
//! 客户订单的记录系统（system of record）。对外提供下单与查询的 REST API，
//! 订单创建提交后发布 `order.created.v1`；消费 `shipment.dispatched.v1`
//! 将订单推进到 SHIPPED 终态。订单数据只由本服务写入。

pub mod consumer;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod routes;
pub mod service;
pub mod state;

pub use error::{OrderError, Result};
pub use models::{Order, OrderItem, OrderStatus, ShippedApplyResult, TimelineEntry};
pub use repository::OrderRepository;
pub use service::OrderService;
