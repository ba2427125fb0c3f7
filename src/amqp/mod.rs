//! AMQP integration layer
//!
//! This module provides the messaging infrastructure for the quiz room
//! service: connection management, message definitions, and the inbound
//! game command consumer. Outbound event publishing lives in the
//! `broadcast` module.

pub mod connection;
pub mod handlers;
pub mod messages;

pub use connection::{AmqpConfig, AmqpConnection};
pub use handlers::{GameCommandConsumer, MessageHandler};
pub use messages::{MessageEnvelope, MessageUtils};
