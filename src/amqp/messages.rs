//! AMQP message definitions and serialization

use crate::error::{GameRoomError, Result};
use crate::types::{GameCommand, GameEvent, RoomCode};
use crate::utils::{ROOM_CODE_ALPHABET, ROOM_CODE_LEN};
use serde_json;

/// Queue the service consumes game commands from
pub const GAME_COMMANDS_QUEUE: &str = "quizroom.game_commands";

/// Topic exchange room events are published to
pub const ROOM_EVENTS_EXCHANGE: &str = "quizroom.room_events";

/// Message envelope with metadata
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    /// Create a new message envelope
    pub fn new(payload: T, routing_key: String) -> Self {
        Self {
            payload,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            routing_key,
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            GameRoomError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            GameRoomError::InvalidCommand {
                reason: format!("Failed to deserialize message: {}", e),
            }
            .into()
        })
    }
}

/// Message serialization and validation utilities
pub struct MessageUtils;

impl MessageUtils {
    /// Serialize a game command to bytes
    pub fn serialize_game_command(command: &GameCommand) -> Result<Vec<u8>> {
        Self::validate_game_command(command)?;
        serde_json::to_vec(command).map_err(|e| {
            GameRoomError::InternalError {
                message: format!("Failed to serialize game command: {}", e),
            }
            .into()
        })
    }

    /// Deserialize a game command from bytes
    pub fn deserialize_game_command(bytes: &[u8]) -> Result<GameCommand> {
        let command: GameCommand =
            serde_json::from_slice(bytes).map_err(|e| GameRoomError::InvalidCommand {
                reason: format!("Failed to deserialize game command: {}", e),
            })?;

        Self::validate_game_command(&command)?;
        Ok(command)
    }

    /// Validate a game command before it reaches the engine
    pub fn validate_game_command(command: &GameCommand) -> Result<()> {
        match command {
            GameCommand::CreateRoom {
                quiz_id,
                host_user_id,
            } => {
                if *quiz_id <= 0 {
                    return Err(GameRoomError::InvalidCommand {
                        reason: "Quiz id must be positive".to_string(),
                    }
                    .into());
                }
                if *host_user_id <= 0 {
                    return Err(GameRoomError::InvalidCommand {
                        reason: "Host user id must be positive".to_string(),
                    }
                    .into());
                }
            }
            GameCommand::JoinRoom { room_code, user_id } => {
                Self::validate_room_code(room_code)?;
                if *user_id <= 0 {
                    return Err(GameRoomError::InvalidCommand {
                        reason: "User id must be positive".to_string(),
                    }
                    .into());
                }
            }
            GameCommand::StartGame { room_code } | GameCommand::DeleteRoom { room_code } => {
                Self::validate_room_code(room_code)?;
            }
            GameCommand::SubmitAnswer {
                room_code,
                user_id,
                question_id,
                ..
            } => {
                Self::validate_room_code(room_code)?;
                if *user_id <= 0 {
                    return Err(GameRoomError::InvalidCommand {
                        reason: "User id must be positive".to_string(),
                    }
                    .into());
                }
                if *question_id <= 0 {
                    return Err(GameRoomError::InvalidCommand {
                        reason: "Question id must be positive".to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }

    /// Check a room code has the expected shape (6 chars, A-Z0-9)
    pub fn validate_room_code(code: &RoomCode) -> Result<()> {
        if code.len() != ROOM_CODE_LEN
            || !code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b))
        {
            return Err(GameRoomError::InvalidCommand {
                reason: format!("Malformed room code: {}", code),
            }
            .into());
        }
        Ok(())
    }

    /// Routing key for an event scoped to a room
    pub fn room_routing_key(room_code: &RoomCode, event: &GameEvent) -> String {
        format!("room.{}.{}", room_code, event.name())
    }

    /// Routing key for an event addressed back to the caller only
    pub fn caller_routing_key(event: &GameEvent) -> String {
        format!("caller.{}", event.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnswerOption;

    fn create_test_submit_command() -> GameCommand {
        GameCommand::SubmitAnswer {
            room_code: "ABC123".to_string(),
            user_id: 2,
            question_id: 10,
            answer: AnswerOption::B,
            elapsed_ms: 5_000,
        }
    }

    #[test]
    fn test_message_envelope_creation() {
        let command = create_test_submit_command();
        let envelope = MessageEnvelope::new(command, "test.routing.key".to_string());

        assert_eq!(envelope.routing_key, "test.routing.key");
        assert!(!envelope.correlation_id.is_empty());
    }

    #[test]
    fn test_command_validation() {
        assert!(MessageUtils::validate_game_command(&create_test_submit_command()).is_ok());

        // Lowercase codes never come out of the generator
        let bad_code = GameCommand::StartGame {
            room_code: "abc123".to_string(),
        };
        assert!(MessageUtils::validate_game_command(&bad_code).is_err());

        let short_code = GameCommand::JoinRoom {
            room_code: "AB1".to_string(),
            user_id: 2,
        };
        assert!(MessageUtils::validate_game_command(&short_code).is_err());

        let bad_user = GameCommand::JoinRoom {
            room_code: "ABC123".to_string(),
            user_id: 0,
        };
        assert!(MessageUtils::validate_game_command(&bad_user).is_err());

        let bad_quiz = GameCommand::CreateRoom {
            quiz_id: -1,
            host_user_id: 1,
        };
        assert!(MessageUtils::validate_game_command(&bad_quiz).is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let command = create_test_submit_command();
        let bytes = MessageUtils::serialize_game_command(&command).unwrap();
        let deserialized = MessageUtils::deserialize_game_command(&bytes).unwrap();

        match deserialized {
            GameCommand::SubmitAnswer {
                room_code,
                user_id,
                question_id,
                answer,
                elapsed_ms,
            } => {
                assert_eq!(room_code, "ABC123");
                assert_eq!(user_id, 2);
                assert_eq!(question_id, 10);
                assert_eq!(answer, AnswerOption::B);
                assert_eq!(elapsed_ms, 5_000);
            }
            other => panic!("Unexpected command variant: {:?}", other),
        }
    }

    #[test]
    fn test_routing_keys() {
        let event = GameEvent::GameStarted {
            state: crate::types::GameState {
                room_code: "ABC123".to_string(),
                current_question_index: 0,
                total_questions: 3,
                start_time: chrono::Utc::now(),
                status: crate::types::RoomStatus::InProgress,
            },
        };

        assert_eq!(
            MessageUtils::room_routing_key(&"ABC123".to_string(), &event),
            "room.ABC123.GameStarted"
        );
        assert_eq!(MessageUtils::caller_routing_key(&event), "caller.GameStarted");
    }
}
