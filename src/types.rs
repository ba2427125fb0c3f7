//! Common types used throughout the quiz room service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for users (hosts and participants)
pub type UserId = i64;

/// Unique identifier for quizzes
pub type QuizId = i64;

/// Unique identifier for questions
pub type QuestionId = i64;

/// Human-typeable room identifier (6 chars, A-Z0-9)
pub type RoomCode = String;

/// Lifecycle status of a room; transitions are one-directional
/// Waiting -> InProgress -> Completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomStatus {
    Waiting,
    InProgress,
    Completed,
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomStatus::Waiting => write!(f, "Waiting"),
            RoomStatus::InProgress => write!(f, "InProgress"),
            RoomStatus::Completed => write!(f, "Completed"),
        }
    }
}

/// One of the four answer options of a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerOption {
    A,
    B,
    C,
    D,
}

impl std::fmt::Display for AnswerOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnswerOption::A => write!(f, "A"),
            AnswerOption::B => write!(f, "B"),
            AnswerOption::C => write!(f, "C"),
            AnswerOption::D => write!(f, "D"),
        }
    }
}

impl std::str::FromStr for AnswerOption {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(AnswerOption::A),
            "B" => Ok(AnswerOption::B),
            "C" => Ok(AnswerOption::C),
            "D" => Ok(AnswerOption::D),
            other => Err(format!("Invalid answer option: {}", other)),
        }
    }
}

/// Immutable copy of a question taken when the room is created.
///
/// The snapshot is never re-read from the source quiz, so later edits to
/// the quiz do not affect a running game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSnapshot {
    pub question_id: QuestionId,
    pub quiz_id: QuizId,
    pub content: String,
    /// Option texts indexed A, B, C, D
    pub options: [String; 4],
    pub correct_option: AnswerOption,
}

/// A user who joined a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

/// One live instance of a quiz being played
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub room_code: RoomCode,
    pub quiz_id: QuizId,
    pub host_user_id: UserId,
    pub questions: Vec<QuestionSnapshot>,
    pub participants: Vec<Participant>,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Room {
    /// Snapshot question at a given index
    pub fn question_at(&self, index: usize) -> Option<&QuestionSnapshot> {
        self.questions.get(index)
    }

    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }
}

/// Mutable progress marker for an in-progress room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub room_code: RoomCode,
    pub current_question_index: usize,
    pub total_questions: usize,
    pub start_time: DateTime<Utc>,
    pub status: RoomStatus,
}

impl GameState {
    pub fn is_last_question(&self, question_index: usize) -> bool {
        question_index + 1 >= self.total_questions
    }
}

/// One effective answer per (user, question); a resubmission replaces the
/// earlier record rather than adding a second entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub selected_option: AnswerOption,
    pub is_correct: bool,
    pub elapsed_ms: u64,
    pub score: u32,
}

/// Cumulative standing of one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub score: u32,
    /// Sum of elapsed times across answered questions; used for tie-breaking
    pub total_elapsed_ms: u64,
}

/// Ranked view of cumulative scores at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardSnapshot {
    pub room_code: RoomCode,
    /// None for the final (game-ended) view
    pub question_index: Option<usize>,
    /// Sorted by score descending, then total elapsed ascending, then user id
    pub entries: Vec<LeaderboardEntry>,
}

/// Returned to the submitter of an answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    pub is_correct: bool,
    pub score: u32,
}

/// Per-question breakdown included in the final results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: QuestionId,
    pub content: String,
    pub correct_option: AnswerOption,
    pub answers: Vec<AnswerRecord>,
}

/// Cumulative leaderboard plus per-question breakdown, available once the
/// game completed and was flushed to durable storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameResults {
    pub room_code: RoomCode,
    pub quiz_id: QuizId,
    pub leaderboard: LeaderboardSnapshot,
    pub question_results: Vec<QuestionResult>,
}

/// Atomic persistence unit flushed when a room completes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedGame {
    pub room: Room,
    pub answers: Vec<AnswerRecord>,
    pub final_leaderboard: LeaderboardSnapshot,
    pub results: GameResults,
    pub ended_at: DateTime<Utc>,
}

/// Outcome of a join request; an in-progress room admits the late joiner
/// with enough state to catch up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JoinOutcome {
    Joined(Room),
    JoinedInProgress {
        room: Room,
        state: GameState,
        leaderboard: LeaderboardSnapshot,
    },
}

impl JoinOutcome {
    pub fn room(&self) -> &Room {
        match self {
            JoinOutcome::Joined(room) => room,
            JoinOutcome::JoinedInProgress { room, .. } => room,
        }
    }
}

/// Union type for all outbound room events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameEvent {
    RoomCreated { room: Room },
    UserJoined { room: Room },
    GameStarted { state: GameState },
    QuestionEnded {
        question_index: usize,
        leaderboard: LeaderboardSnapshot,
    },
    NextQuestion { state: GameState },
    GameEnded { leaderboard: LeaderboardSnapshot },
    Error { message: String },
}

impl GameEvent {
    /// Event name used for routing keys and logging
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::RoomCreated { .. } => "RoomCreated",
            GameEvent::UserJoined { .. } => "UserJoined",
            GameEvent::GameStarted { .. } => "GameStarted",
            GameEvent::QuestionEnded { .. } => "QuestionEnded",
            GameEvent::NextQuestion { .. } => "NextQuestion",
            GameEvent::GameEnded { .. } => "GameEnded",
            GameEvent::Error { .. } => "Error",
        }
    }
}

/// Inbound command surface fronted by the AMQP consumer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameCommand {
    CreateRoom {
        quiz_id: QuizId,
        host_user_id: UserId,
    },
    JoinRoom {
        room_code: RoomCode,
        user_id: UserId,
    },
    StartGame {
        room_code: RoomCode,
    },
    SubmitAnswer {
        room_code: RoomCode,
        user_id: UserId,
        question_id: QuestionId,
        answer: AnswerOption,
        elapsed_ms: u64,
    },
    DeleteRoom {
        room_code: RoomCode,
    },
}

impl GameCommand {
    /// Command name used for logging
    pub fn name(&self) -> &'static str {
        match self {
            GameCommand::CreateRoom { .. } => "CreateRoom",
            GameCommand::JoinRoom { .. } => "JoinRoom",
            GameCommand::StartGame { .. } => "StartGame",
            GameCommand::SubmitAnswer { .. } => "SubmitAnswer",
            GameCommand::DeleteRoom { .. } => "DeleteRoom",
        }
    }
}
