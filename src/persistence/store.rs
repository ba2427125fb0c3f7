//! Game result storage trait and implementations

use crate::error::{GameRoomError, Result};
use crate::types::{CompletedGame, GameResults, RoomCode};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info};

/// Trait for persisting completed games
///
/// `flush` writes the whole completion record as one unit; partial
/// persistence of a finished game is not representable through this
/// interface. Cleanup of the in-memory room must only happen after a
/// successful flush.
#[async_trait]
pub trait GameResultStore: Send + Sync {
    /// Persist a completed game atomically
    async fn flush(&self, game: CompletedGame) -> Result<()>;

    /// Fetch the final results of a completed game; None if no game with
    /// this code was ever flushed
    async fn fetch_results(&self, room_code: &RoomCode) -> Result<Option<GameResults>>;
}

/// In-memory result store
///
/// The single write under one lock is what makes the flush atomic here.
#[derive(Debug, Default)]
pub struct InMemoryGameResultStore {
    games: RwLock<HashMap<RoomCode, CompletedGame>>,
}

impl InMemoryGameResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of flushed games (for stats/tests)
    pub fn flushed_count(&self) -> usize {
        self.games.read().map(|g| g.len()).unwrap_or(0)
    }
}

#[async_trait]
impl GameResultStore for InMemoryGameResultStore {
    async fn flush(&self, game: CompletedGame) -> Result<()> {
        let code = game.room.room_code.clone();
        let mut games = self.games.write().map_err(|_| GameRoomError::InternalError {
            message: "Failed to acquire games lock".to_string(),
        })?;

        info!(
            "Flushed completed game for room {} ({} answers, {} players)",
            code,
            game.answers.len(),
            game.final_leaderboard.entries.len()
        );

        games.insert(code, game);
        Ok(())
    }

    async fn fetch_results(&self, room_code: &RoomCode) -> Result<Option<GameResults>> {
        let games = self.games.read().map_err(|_| GameRoomError::InternalError {
            message: "Failed to acquire games lock".to_string(),
        })?;

        debug!("Fetching final results for room {}", room_code);
        Ok(games.get(room_code).map(|game| game.results.clone()))
    }
}

/// Mock result store for testing, with failure injection
#[derive(Debug, Default)]
pub struct MockGameResultStore {
    flushed: RwLock<Vec<CompletedGame>>,
    fail_flush: std::sync::atomic::AtomicBool,
}

impl MockGameResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent flushes fail
    pub fn set_fail_flush(&self, fail: bool) {
        self.fail_flush
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// All flushed games, in flush order
    pub fn flushed_games(&self) -> Vec<CompletedGame> {
        self.flushed
            .read()
            .map(|games| games.clone())
            .unwrap_or_default()
    }

    pub fn flush_count(&self) -> usize {
        self.flushed.read().map(|games| games.len()).unwrap_or(0)
    }
}

#[async_trait]
impl GameResultStore for MockGameResultStore {
    async fn flush(&self, game: CompletedGame) -> Result<()> {
        if self.fail_flush.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(GameRoomError::PersistenceFailed {
                room_code: game.room.room_code.clone(),
                message: "Injected flush failure".to_string(),
            }
            .into());
        }

        if let Ok(mut flushed) = self.flushed.write() {
            flushed.push(game);
        }
        Ok(())
    }

    async fn fetch_results(&self, room_code: &RoomCode) -> Result<Option<GameResults>> {
        let flushed = self.flushed.read().map_err(|_| GameRoomError::InternalError {
            message: "Failed to acquire flushed games lock".to_string(),
        })?;

        Ok(flushed
            .iter()
            .rev()
            .find(|game| &game.room.room_code == room_code)
            .map(|game| game.results.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        GameResults, LeaderboardSnapshot, Room, RoomStatus,
    };
    use crate::utils::current_timestamp;

    fn completed_game(code: &str) -> CompletedGame {
        let room = Room {
            room_code: code.to_string(),
            quiz_id: 5,
            host_user_id: 1,
            questions: vec![],
            participants: vec![],
            status: RoomStatus::Completed,
            created_at: current_timestamp(),
            started_at: Some(current_timestamp()),
            ended_at: Some(current_timestamp()),
        };
        let leaderboard = LeaderboardSnapshot {
            room_code: code.to_string(),
            question_index: None,
            entries: vec![],
        };
        CompletedGame {
            results: GameResults {
                room_code: code.to_string(),
                quiz_id: room.quiz_id,
                leaderboard: leaderboard.clone(),
                question_results: vec![],
            },
            room,
            answers: vec![],
            final_leaderboard: leaderboard,
            ended_at: current_timestamp(),
        }
    }

    #[tokio::test]
    async fn test_flush_then_fetch() {
        let store = InMemoryGameResultStore::new();
        store.flush(completed_game("ABC123")).await.unwrap();

        let results = store
            .fetch_results(&"ABC123".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(results.room_code, "ABC123");
        assert_eq!(store.flushed_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_unknown_room() {
        let store = InMemoryGameResultStore::new();
        let results = store.fetch_results(&"NOPE42".to_string()).await.unwrap();
        assert!(results.is_none());
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let store = MockGameResultStore::new();
        store.set_fail_flush(true);

        let err = store.flush(completed_game("ABC123")).await.unwrap_err();
        assert!(err.to_string().contains("Persistence flush failed"));
        assert_eq!(store.flush_count(), 0);

        store.set_fail_flush(false);
        store.flush(completed_game("ABC123")).await.unwrap();
        assert_eq!(store.flush_count(), 1);
    }
}
