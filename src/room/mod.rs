//! Game room engine and its supporting components
//!
//! This module contains the room registry, the per-question timer, the
//! scoring/leaderboard logic, and the engine that orchestrates them.

pub mod engine;
pub mod registry;
pub mod scoring;
pub mod timer;

pub use engine::{GameRoomEngine, GameRoomStats};
pub use registry::{RoomRegistry, RoomSlot};
pub use scoring::{score, Leaderboard};
pub use timer::QuestionTimer;
