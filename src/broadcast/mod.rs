//! Outbound event broadcasting
//!
//! The engine emits `GameEvent`s through the `BroadcastGateway` trait;
//! the AMQP implementation fans them out on the room events exchange.

pub mod gateway;

pub use gateway::{AmqpBroadcastGateway, BroadcastGateway, GatewayConfig, MockBroadcastGateway};
