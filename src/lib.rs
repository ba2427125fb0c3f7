//! Quiz Room - Live multiplayer quiz game service
//!
//! This crate provides AMQP-based game room management with synchronized
//! question timers, time-decay scoring, and leaderboards for live quizzes.

pub mod amqp;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod metrics;
pub mod persistence;
pub mod quiz;
pub mod room;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{GameRoomError, Result};
pub use types::*;

// Re-export key components
pub use broadcast::gateway::BroadcastGateway;
pub use persistence::GameResultStore;
pub use quiz::{QuizProvider, StaticQuizProvider, StaticUserDirectory, UserDirectory};
pub use room::{GameRoomEngine, GameRoomStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
