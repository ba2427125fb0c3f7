//! Keyed ephemeral storage for rooms and their game state
//!
//! The registry replaces the ambient shared-cache pattern with explicit
//! per-room slots. Each slot is guarded by its own async mutex; holding it
//! for the duration of an operation is what serializes user calls against
//! timer callbacks for the same room. The registry itself only stores.

use crate::error::{GameRoomError, Result};
use crate::room::scoring::Leaderboard;
use crate::types::{
    AnswerRecord, GameState, LeaderboardSnapshot, QuestionId, Room, RoomCode, UserId,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

/// Everything the engine mutates for one room, behind one lock.
///
/// Room, game state, answer ledger, leaderboard, and stored snapshots are
/// created and destroyed together; none outlives the others.
#[derive(Debug)]
pub struct RoomSlot {
    pub room: Room,
    pub game_state: Option<GameState>,
    pub answers: HashMap<(UserId, QuestionId), AnswerRecord>,
    pub leaderboard: Leaderboard,
    /// Per-question snapshots taken at each question boundary
    pub snapshots: HashMap<usize, LeaderboardSnapshot>,
}

impl RoomSlot {
    fn new(room: Room) -> Self {
        Self {
            room,
            game_state: None,
            answers: HashMap::new(),
            leaderboard: Leaderboard::new(),
            snapshots: HashMap::new(),
        }
    }

    /// Answer ledger as a flat list (for persistence)
    pub fn answer_records(&self) -> Vec<AnswerRecord> {
        let mut records: Vec<AnswerRecord> = self.answers.values().cloned().collect();
        records.sort_by(|a, b| {
            a.question_id
                .cmp(&b.question_id)
                .then(a.user_id.cmp(&b.user_id))
        });
        records
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    slots: HashMap<RoomCode, Arc<Mutex<RoomSlot>>>,
    /// Enumerable index of active room codes; kept consistent with `slots`
    active_rooms: HashSet<RoomCode>,
    /// One active room per host
    host_rooms: HashMap<UserId, RoomCode>,
}

/// Keyed store for room slots with an active-room index
#[derive(Debug, Default)]
pub struct RoomRegistry {
    inner: RwLock<RegistryInner>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_inner(&self) -> Result<std::sync::RwLockReadGuard<'_, RegistryInner>> {
        self.inner.read().map_err(|_| {
            GameRoomError::InternalError {
                message: "Failed to acquire registry lock".to_string(),
            }
            .into()
        })
    }

    fn write_inner(&self) -> Result<std::sync::RwLockWriteGuard<'_, RegistryInner>> {
        self.inner.write().map_err(|_| {
            GameRoomError::InternalError {
                message: "Failed to acquire registry lock".to_string(),
            }
            .into()
        })
    }

    /// Register a new room under its code.
    ///
    /// Fails with `RoomCodeCollision` if the code is taken; the caller
    /// regenerates the code rather than overwriting.
    pub fn create(&self, room: Room) -> Result<Arc<Mutex<RoomSlot>>> {
        let mut inner = self.write_inner()?;

        let code = room.room_code.clone();
        if inner.slots.contains_key(&code) {
            return Err(GameRoomError::RoomCodeCollision { room_code: code }.into());
        }

        let host_user_id = room.host_user_id;
        let slot = Arc::new(Mutex::new(RoomSlot::new(room)));
        inner.slots.insert(code.clone(), slot.clone());
        inner.active_rooms.insert(code.clone());
        inner.host_rooms.insert(host_user_id, code);

        Ok(slot)
    }

    /// Get the slot for a room code
    pub fn get(&self, code: &RoomCode) -> Result<Arc<Mutex<RoomSlot>>> {
        let inner = self.read_inner()?;
        inner
            .slots
            .get(code)
            .cloned()
            .ok_or_else(|| {
                GameRoomError::RoomNotFound {
                    room_code: code.clone(),
                }
                .into()
            })
    }

    /// Non-failing slot lookup
    pub fn try_get(&self, code: &RoomCode) -> Option<Arc<Mutex<RoomSlot>>> {
        self.inner.read().ok()?.slots.get(code).cloned()
    }

    pub fn contains(&self, code: &RoomCode) -> bool {
        self.inner
            .read()
            .map(|inner| inner.slots.contains_key(code))
            .unwrap_or(false)
    }

    /// Code of the active room hosted by this user, if any
    pub fn host_room(&self, user_id: UserId) -> Result<Option<RoomCode>> {
        let inner = self.read_inner()?;
        Ok(inner.host_rooms.get(&user_id).cloned())
    }

    /// Remove a room and all its associated state.
    ///
    /// Idempotent; removing an absent code is a no-op. The active index and
    /// host index are cleaned in the same critical section so no orphan
    /// entries survive.
    pub fn remove(&self, code: &RoomCode) -> Result<()> {
        let mut inner = self.write_inner()?;

        inner.slots.remove(code);
        inner.active_rooms.remove(code);
        inner.host_rooms.retain(|_, hosted| hosted != code);

        Ok(())
    }

    /// Codes of all currently active rooms
    pub fn active_rooms(&self) -> Result<Vec<RoomCode>> {
        let inner = self.read_inner()?;
        Ok(inner.active_rooms.iter().cloned().collect())
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .read()
            .map(|inner| inner.active_rooms.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoomStatus;
    use crate::utils::current_timestamp;

    fn test_room(code: &str, host: UserId) -> Room {
        Room {
            room_code: code.to_string(),
            quiz_id: 1,
            host_user_id: host,
            questions: vec![],
            participants: vec![],
            status: RoomStatus::Waiting,
            created_at: current_timestamp(),
            started_at: None,
            ended_at: None,
        }
    }

    #[test]
    fn test_create_and_get() {
        let registry = RoomRegistry::new();
        registry.create(test_room("AAAAAA", 1)).unwrap();

        assert!(registry.contains(&"AAAAAA".to_string()));
        assert!(registry.get(&"AAAAAA".to_string()).is_ok());
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_collision_is_rejected_not_overwritten() {
        let registry = RoomRegistry::new();
        registry.create(test_room("AAAAAA", 1)).unwrap();

        let err = registry.create(test_room("AAAAAA", 2)).unwrap_err();
        assert!(err.to_string().contains("already in use"));

        // Original host mapping survives
        assert_eq!(registry.host_room(1).unwrap(), Some("AAAAAA".to_string()));
        assert_eq!(registry.host_room(2).unwrap(), None);
    }

    #[test]
    fn test_get_missing_room() {
        let registry = RoomRegistry::new();
        let err = registry.get(&"NOPE42".to_string()).unwrap_err();
        assert!(err.to_string().contains("Room not found"));
    }

    #[test]
    fn test_remove_is_idempotent_and_leaves_no_orphans() {
        let registry = RoomRegistry::new();
        registry.create(test_room("AAAAAA", 1)).unwrap();

        registry.remove(&"AAAAAA".to_string()).unwrap();
        assert!(!registry.contains(&"AAAAAA".to_string()));
        assert_eq!(registry.active_count(), 0);
        assert_eq!(registry.host_room(1).unwrap(), None);
        assert!(registry.active_rooms().unwrap().is_empty());

        // Second remove is a no-op, not an error
        registry.remove(&"AAAAAA".to_string()).unwrap();
    }

    #[test]
    fn test_host_index_tracks_rooms_independently() {
        let registry = RoomRegistry::new();
        registry.create(test_room("AAAAAA", 1)).unwrap();
        registry.create(test_room("BBBBBB", 2)).unwrap();

        registry.remove(&"AAAAAA".to_string()).unwrap();
        assert_eq!(registry.host_room(2).unwrap(), Some("BBBBBB".to_string()));
        assert_eq!(registry.active_count(), 1);
    }
}
