//! Configuration management for the quiz-room service
//!
//! This module handles all configuration loading from environment variables,
//! validation, and default values for the game room service.

pub mod app;

// Re-export commonly used types
pub use app::{validate_config, AmqpSettings, AppConfig, GameSettings, ServiceSettings};
