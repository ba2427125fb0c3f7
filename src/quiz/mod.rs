//! External quiz and user collaborators
//!
//! The engine snapshots quiz content through these traits at room creation
//! and never re-reads it afterwards.

pub mod provider;

pub use provider::{
    QuizContent, QuizProvider, StaticQuizProvider, StaticUserDirectory, UserDirectory, UserProfile,
};
