//! Durable storage for completed games
//!
//! Rooms are ephemeral; the only durable artifact is the `CompletedGame`
//! flushed when a game finishes. Final results are served from here so
//! they outlive room cleanup.

pub mod store;

pub use store::{GameResultStore, InMemoryGameResultStore, MockGameResultStore};
