//! Error types for the quiz room service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific game room scenarios
#[derive(Debug, thiserror::Error)]
pub enum GameRoomError {
    #[error("Room not found: {room_code}")]
    RoomNotFound { room_code: String },

    #[error("Quiz not found: {quiz_id}")]
    QuizNotFound { quiz_id: i64 },

    #[error("Question {question_id} not found in room {room_code}")]
    QuestionNotFound { room_code: String, question_id: i64 },

    #[error("No leaderboard snapshot for question {question_index} in room {room_code}")]
    LeaderboardNotFound {
        room_code: String,
        question_index: usize,
    },

    #[error("Operation not allowed in {status} state: {reason}")]
    InvalidState { status: String, reason: String },

    #[error("User {user_id} already hosts an active room: {room_code}")]
    HostAlreadyHasRoom { user_id: i64, room_code: String },

    #[error("Room code already in use: {room_code}")]
    RoomCodeCollision { room_code: String },

    #[error("Stale submission for question {question_id} in room {room_code}: current question is {current_question_id}")]
    StaleSubmission {
        room_code: String,
        question_id: i64,
        current_question_id: i64,
    },

    #[error("Invalid game command: {reason}")]
    InvalidCommand { reason: String },

    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Persistence flush failed for room {room_code}: {message}")]
    PersistenceFailed { room_code: String, message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
