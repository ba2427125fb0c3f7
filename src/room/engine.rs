//! Game room engine orchestrating the room lifecycle
//!
//! This module provides the core GameRoomEngine that handles room creation,
//! participant joins, game start, answer submission, question timeouts, and
//! end-of-game persistence and cleanup.

use crate::broadcast::BroadcastGateway;
use crate::config::GameSettings;
use crate::error::{GameRoomError, Result};
use crate::metrics::MetricsCollector;
use crate::persistence::GameResultStore;
use crate::quiz::{QuizProvider, UserDirectory};
use crate::room::registry::{RoomRegistry, RoomSlot};
use crate::room::scoring::score;
use crate::room::timer::QuestionTimer;
use crate::types::{
    AnswerOption, AnswerRecord, AnswerResult, CompletedGame, GameEvent, GameResults, GameState,
    JoinOutcome, LeaderboardSnapshot, Participant, QuestionId, QuestionResult, QuizId, Room,
    RoomCode, RoomStatus, UserId,
};
use crate::utils::{current_timestamp, generate_room_code};
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Statistics about game room engine operations
#[derive(Debug, Clone, Default)]
pub struct GameRoomStats {
    /// Total number of rooms created
    pub rooms_created: u64,
    /// Total number of rooms cleaned up
    pub rooms_cleaned: u64,
    /// Total number of participants joined
    pub participants_joined: u64,
    /// Total number of games started
    pub games_started: u64,
    /// Total number of games completed and flushed
    pub games_completed: u64,
    /// Total number of answers accepted
    pub answers_submitted: u64,
    /// Current number of active rooms
    pub active_rooms: usize,
}

/// The main game room engine
#[derive(Clone)]
pub struct GameRoomEngine {
    /// Registry of active room slots
    registry: Arc<RoomRegistry>,
    /// Per-question timeout scheduler
    timer: Arc<QuestionTimer>,
    /// Quiz provider for room creation snapshots
    quiz_provider: Arc<dyn QuizProvider>,
    /// User directory for display names
    user_directory: Arc<dyn UserDirectory>,
    /// Gateway for outbound room events
    gateway: Arc<dyn BroadcastGateway>,
    /// Durable store for completed games
    result_store: Arc<dyn GameResultStore>,
    /// Engine statistics
    stats: Arc<RwLock<GameRoomStats>>,
    /// Metrics collector for recording performance data
    metrics_collector: Arc<MetricsCollector>,
    /// Game tuning parameters
    settings: GameSettings,
    /// Room code generator; swapped out in tests to force collisions
    code_generator: Arc<dyn Fn() -> RoomCode + Send + Sync>,
}

impl GameRoomEngine {
    /// Create a new game room engine
    pub fn new(
        quiz_provider: Arc<dyn QuizProvider>,
        user_directory: Arc<dyn UserDirectory>,
        gateway: Arc<dyn BroadcastGateway>,
        result_store: Arc<dyn GameResultStore>,
        settings: GameSettings,
    ) -> Self {
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));

        let timer = Arc::new(QuestionTimer::new(Duration::from_secs(
            settings.question_time_budget_seconds,
        )));

        Self::with_components(
            quiz_provider,
            user_directory,
            gateway,
            result_store,
            settings,
            timer,
            metrics_collector,
        )
    }

    /// Create an engine with explicit timer and metrics collector
    pub fn with_components(
        quiz_provider: Arc<dyn QuizProvider>,
        user_directory: Arc<dyn UserDirectory>,
        gateway: Arc<dyn BroadcastGateway>,
        result_store: Arc<dyn GameResultStore>,
        settings: GameSettings,
        timer: Arc<QuestionTimer>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            registry: Arc::new(RoomRegistry::new()),
            timer,
            quiz_provider,
            user_directory,
            gateway,
            result_store,
            stats: Arc::new(RwLock::new(GameRoomStats::default())),
            metrics_collector,
            settings,
            code_generator: Arc::new(generate_room_code),
        }
    }

    /// Replace the room code generator
    pub fn with_code_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> RoomCode + Send + Sync + 'static,
    {
        self.code_generator = Arc::new(generator);
        self
    }

    /// Create a room for a quiz with the given user as host.
    ///
    /// The quiz's questions are snapshotted into the room at this point;
    /// later quiz edits never reach a running game. One active room per
    /// host is enforced before any state is allocated.
    pub async fn create_room(&self, quiz_id: QuizId, host_user_id: UserId) -> Result<Room> {
        info!(
            "Processing room creation - quiz_id: {}, host_user_id: {}",
            quiz_id, host_user_id
        );

        if let Some(existing) = self.registry.host_room(host_user_id)? {
            return Err(GameRoomError::HostAlreadyHasRoom {
                user_id: host_user_id,
                room_code: existing,
            }
            .into());
        }

        let quiz = self.quiz_provider.get_quiz_with_questions(quiz_id).await?;
        if quiz.questions.is_empty() {
            return Err(GameRoomError::InvalidCommand {
                reason: format!("Quiz {} has no questions", quiz_id),
            }
            .into());
        }

        let display_name = self.resolve_display_name(host_user_id).await?;

        let room = self.allocate_room(quiz_id, host_user_id, display_name, quiz.questions)?;

        // Update stats
        {
            let mut stats = self.stats.write().map_err(|_| GameRoomError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?;
            stats.rooms_created += 1;
            stats.active_rooms = self.registry.active_count();

            if stats.active_rooms > self.settings.active_rooms_warn_threshold {
                warn!(
                    "Active room count {} exceeds threshold {}",
                    stats.active_rooms, self.settings.active_rooms_warn_threshold
                );
            }
        }

        self.metrics_collector.record_room_created();

        info!(
            "Created room {} for quiz {} with host {} ({} questions)",
            room.room_code,
            quiz_id,
            host_user_id,
            room.questions.len()
        );

        self.gateway
            .publish_to_caller(GameEvent::RoomCreated { room: room.clone() })
            .await?;

        Ok(room)
    }

    /// Generate a unique code and register the room, retrying on collisions
    fn allocate_room(
        &self,
        quiz_id: QuizId,
        host_user_id: UserId,
        host_display_name: String,
        questions: Vec<crate::types::QuestionSnapshot>,
    ) -> Result<Room> {
        for attempt in 0..self.settings.room_code_max_attempts {
            let code = (self.code_generator)();

            let room = Room {
                room_code: code.clone(),
                quiz_id,
                host_user_id,
                questions: questions.clone(),
                participants: vec![Participant {
                    user_id: host_user_id,
                    display_name: host_display_name.clone(),
                    joined_at: current_timestamp(),
                }],
                status: RoomStatus::Waiting,
                created_at: current_timestamp(),
                started_at: None,
                ended_at: None,
            };

            match self.registry.create(room) {
                Ok(slot) => {
                    let room = slot
                        .try_lock()
                        .map(|s| s.room.clone())
                        .map_err(|_| GameRoomError::InternalError {
                            message: "Fresh room slot unexpectedly locked".to_string(),
                        })?;
                    return Ok(room);
                }
                Err(e)
                    if e.downcast_ref::<GameRoomError>()
                        .map(|err| matches!(err, GameRoomError::RoomCodeCollision { .. }))
                        .unwrap_or(false) =>
                {
                    debug!("Room code {} collided (attempt {}), retrying", code, attempt + 1);
                    self.metrics_collector.record_room_code_retry();
                }
                Err(e) => return Err(e),
            }
        }

        Err(GameRoomError::InternalError {
            message: format!(
                "Failed to generate a unique room code after {} attempts",
                self.settings.room_code_max_attempts
            ),
        }
        .into())
    }

    /// Join a user to a room.
    ///
    /// Joining is idempotent; a user already in the room gets the current
    /// view back without a second participant entry or a duplicate
    /// UserJoined broadcast. A room that is already in progress admits the
    /// late joiner and hands back enough state to catch up.
    pub async fn join_room(&self, room_code: &RoomCode, user_id: UserId) -> Result<JoinOutcome> {
        let display_name = self.resolve_display_name(user_id).await?;

        let slot = self.registry.get(room_code)?;
        let (outcome, newly_joined) = {
            let mut slot = slot.lock().await;

            if slot.room.status == RoomStatus::Completed {
                return Err(GameRoomError::InvalidState {
                    status: slot.room.status.to_string(),
                    reason: "Cannot join a completed game".to_string(),
                }
                .into());
            }

            let newly_joined = !slot.room.has_participant(user_id);
            if newly_joined {
                slot.room.participants.push(Participant {
                    user_id,
                    display_name,
                    joined_at: current_timestamp(),
                });
            }

            let outcome = match slot.room.status {
                RoomStatus::Waiting => JoinOutcome::Joined(slot.room.clone()),
                RoomStatus::InProgress => {
                    let state =
                        slot.game_state
                            .clone()
                            .ok_or_else(|| GameRoomError::InternalError {
                                message: format!(
                                    "Room {} in progress without game state",
                                    room_code
                                ),
                            })?;
                    let leaderboard = slot
                        .leaderboard
                        .snapshot(room_code, Some(state.current_question_index));
                    JoinOutcome::JoinedInProgress {
                        room: slot.room.clone(),
                        state,
                        leaderboard,
                    }
                }
                RoomStatus::Completed => unreachable!("checked above"),
            };

            (outcome, newly_joined)
        };

        if newly_joined {
            {
                let mut stats = self.stats.write().map_err(|_| GameRoomError::InternalError {
                    message: "Failed to acquire stats lock".to_string(),
                })?;
                stats.participants_joined += 1;
            }

            let late = matches!(outcome, JoinOutcome::JoinedInProgress { .. });
            self.metrics_collector.record_participant_joined(late);

            info!(
                "User {} joined room {} ({} participants, late: {})",
                user_id,
                room_code,
                outcome.room().participants.len(),
                late
            );

            self.gateway
                .publish_to_room(
                    room_code,
                    GameEvent::UserJoined {
                        room: outcome.room().clone(),
                    },
                )
                .await?;
        } else {
            debug!("User {} re-joined room {}, no-op", user_id, room_code);
        }

        Ok(outcome)
    }

    /// Start the game in a waiting room and schedule the first question's
    /// timeout.
    pub async fn start_game(&self, room_code: &RoomCode) -> Result<GameState> {
        let slot = self.registry.get(room_code)?;
        let state = {
            let mut slot = slot.lock().await;

            if slot.room.status != RoomStatus::Waiting {
                return Err(GameRoomError::InvalidState {
                    status: slot.room.status.to_string(),
                    reason: "Game can only start from the waiting state".to_string(),
                }
                .into());
            }

            let now = current_timestamp();
            slot.room.status = RoomStatus::InProgress;
            slot.room.started_at = Some(now);

            let state = GameState {
                room_code: room_code.clone(),
                current_question_index: 0,
                total_questions: slot.room.questions.len(),
                start_time: now,
                status: RoomStatus::InProgress,
            };
            slot.game_state = Some(state.clone());
            state
        };

        {
            let mut stats = self.stats.write().map_err(|_| GameRoomError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?;
            stats.games_started += 1;
        }
        self.metrics_collector.record_game_started();

        info!(
            "Game started in room {} ({} questions)",
            room_code, state.total_questions
        );

        self.gateway
            .publish_to_room(room_code, GameEvent::GameStarted { state: state.clone() })
            .await?;

        self.schedule_question(room_code, 0);

        Ok(state)
    }

    /// Submit an answer for the current question.
    ///
    /// Last write wins: a resubmission for the same question replaces the
    /// earlier record and its leaderboard contribution. Submissions for
    /// any question other than the current one are rejected as stale. No
    /// event is broadcast; per-answer results go only to the submitter.
    pub async fn submit_answer(
        &self,
        room_code: &RoomCode,
        user_id: UserId,
        question_id: QuestionId,
        answer: AnswerOption,
        elapsed_ms: u64,
    ) -> Result<AnswerResult> {
        let slot = self.registry.get(room_code)?;
        let result = {
            let mut slot = slot.lock().await;

            let state = slot
                .game_state
                .as_ref()
                .filter(|s| s.status == RoomStatus::InProgress)
                .ok_or_else(|| GameRoomError::InvalidState {
                    status: slot.room.status.to_string(),
                    reason: "Answers are only accepted while a game is in progress".to_string(),
                })?;

            if !slot.room.has_participant(user_id) {
                return Err(GameRoomError::InvalidCommand {
                    reason: format!("User {} is not in room {}", user_id, room_code),
                }
                .into());
            }

            let current = slot
                .room
                .question_at(state.current_question_index)
                .ok_or_else(|| GameRoomError::QuestionNotFound {
                    room_code: room_code.clone(),
                    question_id,
                })?;

            if current.question_id != question_id {
                self.metrics_collector.record_stale_submission();
                return Err(GameRoomError::StaleSubmission {
                    room_code: room_code.clone(),
                    question_id,
                    current_question_id: current.question_id,
                }
                .into());
            }

            let is_correct = answer == current.correct_option;
            let points = score(
                is_correct,
                elapsed_ms,
                self.settings.scoring_time_budget_ms,
                self.settings.max_score,
            );

            let record = AnswerRecord {
                user_id,
                question_id,
                selected_option: answer,
                is_correct,
                elapsed_ms,
                score: points,
            };

            let previous = slot.answers.insert((user_id, question_id), record.clone());
            slot.leaderboard.record_answer(&record, previous.as_ref());

            debug!(
                "Answer recorded - room: {}, user: {}, question: {}, correct: {}, score: {}",
                room_code, user_id, question_id, is_correct, points
            );

            AnswerResult {
                is_correct,
                score: points,
            }
        };

        {
            let mut stats = self.stats.write().map_err(|_| GameRoomError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?;
            stats.answers_submitted += 1;
        }
        self.metrics_collector
            .record_answer_submitted(result.is_correct, result.score);

        Ok(result)
    }

    /// Schedule the timeout for a question index
    fn schedule_question(&self, room_code: &RoomCode, question_index: usize) {
        let engine = self.clone();
        let code = room_code.clone();
        self.timer.start(room_code, question_index, async move {
            engine.on_question_timeout(&code, question_index).await
        });
    }

    /// Handle a question's timeout firing.
    ///
    /// The index match against the live game state is the staleness guard:
    /// a fire for a question that is no longer current (or for a room that
    /// no longer exists) is silently dropped, which makes a duplicate or
    /// late fire harmless.
    pub async fn on_question_timeout(
        &self,
        room_code: &RoomCode,
        question_index: usize,
    ) -> Result<()> {
        let slot = match self.registry.try_get(room_code) {
            Some(slot) => slot,
            None => {
                debug!(
                    "Timeout fired for already removed room {}, ignoring",
                    room_code
                );
                return Ok(());
            }
        };

        enum Advance {
            Next(GameState),
            Finished(Box<CompletedGame>, LeaderboardSnapshot),
        }

        let (ended_snapshot, advance) = {
            let mut slot = slot.lock().await;

            let (current_index, status) = match slot.game_state.as_ref() {
                Some(state) => (state.current_question_index, state.status),
                None => {
                    debug!("Timeout fired for room {} with no running game", room_code);
                    return Ok(());
                }
            };

            if current_index != question_index {
                debug!(
                    "Stale timeout for room {} question {} (current {}), ignoring",
                    room_code, question_index, current_index
                );
                return Ok(());
            }

            match status {
                RoomStatus::InProgress => {
                    let ended_snapshot =
                        slot.leaderboard.snapshot(room_code, Some(question_index));
                    slot.snapshots.insert(question_index, ended_snapshot.clone());

                    let is_last = slot
                        .game_state
                        .as_ref()
                        .map(|s| s.is_last_question(question_index))
                        .unwrap_or(true);

                    let advance = if is_last {
                        let now = current_timestamp();
                        slot.room.status = RoomStatus::Completed;
                        slot.room.ended_at = Some(now);
                        if let Some(state) = slot.game_state.as_mut() {
                            state.status = RoomStatus::Completed;
                        }

                        let (completed, final_leaderboard) =
                            Self::assemble_completed_game(&slot, room_code, now);
                        Advance::Finished(Box::new(completed), final_leaderboard)
                    } else {
                        let next_index = question_index + 1;
                        let state = slot.game_state.as_mut().ok_or_else(|| {
                            GameRoomError::InternalError {
                                message: format!("Room {} lost its game state", room_code),
                            }
                        })?;
                        state.current_question_index = next_index;
                        Advance::Next(state.clone())
                    };

                    (Some(ended_snapshot), advance)
                }
                RoomStatus::Completed => {
                    // A completed room is only still resident when its flush
                    // failed; rebuild the completion record and retry the
                    // flush. QuestionEnded already went out the first time.
                    warn!(
                        "Room {} completed but still resident, retrying flush",
                        room_code
                    );
                    let ended_at = slot.room.ended_at.unwrap_or_else(current_timestamp);
                    let (completed, final_leaderboard) =
                        Self::assemble_completed_game(&slot, room_code, ended_at);
                    (None, Advance::Finished(Box::new(completed), final_leaderboard))
                }
                RoomStatus::Waiting => {
                    debug!("Timeout fired for room {} with no running game", room_code);
                    return Ok(());
                }
            }
        };

        if let Some(leaderboard) = ended_snapshot {
            self.gateway
                .publish_to_room(
                    room_code,
                    GameEvent::QuestionEnded {
                        question_index,
                        leaderboard,
                    },
                )
                .await?;
        }

        match advance {
            Advance::Next(state) => {
                info!(
                    "Room {} advancing to question {}/{}",
                    room_code,
                    state.current_question_index + 1,
                    state.total_questions
                );

                self.schedule_question(room_code, state.current_question_index);
                self.gateway
                    .publish_to_room(room_code, GameEvent::NextQuestion { state })
                    .await?;
            }
            Advance::Finished(completed, final_leaderboard) => {
                self.finish_game(room_code, *completed, final_leaderboard)
                    .await?;
            }
        }

        Ok(())
    }

    /// Build the atomic persistence unit from a finished room's slot
    fn assemble_completed_game(
        slot: &RoomSlot,
        room_code: &RoomCode,
        ended_at: DateTime<Utc>,
    ) -> (CompletedGame, LeaderboardSnapshot) {
        let final_leaderboard = slot.leaderboard.snapshot(room_code, None);
        let answers = slot.answer_records();
        let question_results = slot
            .room
            .questions
            .iter()
            .map(|q| QuestionResult {
                question_id: q.question_id,
                content: q.content.clone(),
                correct_option: q.correct_option,
                answers: answers
                    .iter()
                    .filter(|a| a.question_id == q.question_id)
                    .cloned()
                    .collect(),
            })
            .collect();

        let completed = CompletedGame {
            results: GameResults {
                room_code: room_code.clone(),
                quiz_id: slot.room.quiz_id,
                leaderboard: final_leaderboard.clone(),
                question_results,
            },
            room: slot.room.clone(),
            answers,
            final_leaderboard: final_leaderboard.clone(),
            ended_at,
        };

        (completed, final_leaderboard)
    }

    /// Flush the completed game, tear down the room, and announce the end.
    ///
    /// A failed flush aborts cleanup: the room stays resident so the game
    /// is never lost to a storage hiccup, and a re-fired timeout for the
    /// final question retries the flush against the same record.
    async fn finish_game(
        &self,
        room_code: &RoomCode,
        completed: CompletedGame,
        final_leaderboard: LeaderboardSnapshot,
    ) -> Result<()> {
        let flush_timer = self.metrics_collector.start_timer();
        if let Err(e) = self.result_store.flush(completed).await {
            error!(
                "Flush failed for room {}, keeping room resident: {}",
                room_code, e
            );
            return Err(e);
        }
        let flush_duration = flush_timer.stop();

        self.cleanup_room(room_code)?;

        {
            let mut stats = self.stats.write().map_err(|_| GameRoomError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?;
            stats.games_completed += 1;
            stats.rooms_cleaned += 1;
            stats.active_rooms = self.registry.active_count();
        }
        self.metrics_collector.record_game_completed(flush_duration);
        self.metrics_collector.record_room_cleaned();

        info!(
            "Game in room {} completed, flushed, and cleaned up ({} players)",
            room_code,
            final_leaderboard.entries.len()
        );

        self.gateway
            .publish_to_room(
                room_code,
                GameEvent::GameEnded {
                    leaderboard: final_leaderboard,
                },
            )
            .await?;

        Ok(())
    }

    /// Get the stored leaderboard snapshot for a question that has ended
    pub async fn get_leaderboard(
        &self,
        room_code: &RoomCode,
        question_index: usize,
    ) -> Result<LeaderboardSnapshot> {
        let slot = self.registry.get(room_code)?;
        let slot = slot.lock().await;

        slot.snapshots
            .get(&question_index)
            .cloned()
            .ok_or_else(|| {
                GameRoomError::LeaderboardNotFound {
                    room_code: room_code.clone(),
                    question_index,
                }
                .into()
            })
    }

    /// Get the final results of a completed game.
    ///
    /// Results are served from durable storage, so they remain available
    /// after the room itself has been cleaned up.
    pub async fn get_final_results(&self, room_code: &RoomCode) -> Result<GameResults> {
        if let Some(results) = self.result_store.fetch_results(room_code).await? {
            return Ok(results);
        }

        if self.registry.contains(room_code) {
            return Err(GameRoomError::InvalidState {
                status: RoomStatus::InProgress.to_string(),
                reason: format!("Game in room {} has not completed yet", room_code),
            }
            .into());
        }

        Err(GameRoomError::RoomNotFound {
            room_code: room_code.clone(),
        }
        .into())
    }

    /// Delete a room on request, cancelling its timers.
    ///
    /// This is the host-initiated teardown; nothing is flushed because the
    /// game never completed.
    pub async fn delete_room(&self, room_code: &RoomCode) -> Result<()> {
        // Existence check so deleting an unknown room reports an error
        let _ = self.registry.get(room_code)?;

        self.cleanup_room(room_code)?;

        {
            let mut stats = self.stats.write().map_err(|_| GameRoomError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?;
            stats.rooms_cleaned += 1;
            stats.active_rooms = self.registry.active_count();
        }
        self.metrics_collector.record_room_cleaned();

        info!("Deleted room {}", room_code);
        Ok(())
    }

    /// Cancel all timers for a room and drop its registry entry
    fn cleanup_room(&self, room_code: &RoomCode) -> Result<()> {
        let upto = match self.registry.try_get(room_code) {
            Some(slot) => slot
                .try_lock()
                .map(|s| s.room.questions.len().saturating_sub(1))
                .unwrap_or(0),
            None => 0,
        };

        self.timer.stop_all(room_code, upto);
        self.registry.remove(room_code)?;
        Ok(())
    }

    /// Resolve a user's display name, falling back to a generated one
    async fn resolve_display_name(&self, user_id: UserId) -> Result<String> {
        Ok(self
            .user_directory
            .get_user(user_id)
            .await?
            .map(|profile| profile.display_name)
            .unwrap_or_else(|| format!("Player {}", user_id)))
    }

    /// Get current engine statistics
    pub async fn get_stats(&self) -> Result<GameRoomStats> {
        let mut stats = self
            .stats
            .read()
            .map_err(|_| GameRoomError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?
            .clone();
        stats.active_rooms = self.registry.active_count();
        Ok(stats)
    }

    /// Codes of all currently active rooms
    pub fn active_rooms(&self) -> Result<Vec<RoomCode>> {
        self.registry.active_rooms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::MockBroadcastGateway;
    use crate::persistence::MockGameResultStore;
    use crate::quiz::{QuizContent, StaticQuizProvider, StaticUserDirectory, UserProfile};
    use crate::types::QuestionSnapshot;
    use tokio::time::sleep;

    struct TestHarness {
        engine: GameRoomEngine,
        gateway: Arc<MockBroadcastGateway>,
        store: Arc<MockGameResultStore>,
    }

    fn sample_quiz(quiz_id: QuizId, question_count: usize) -> QuizContent {
        let questions = (0..question_count)
            .map(|i| QuestionSnapshot {
                question_id: (i as i64) + 1,
                quiz_id,
                content: format!("Question {}?", i + 1),
                options: [
                    "Option A".to_string(),
                    "Option B".to_string(),
                    "Option C".to_string(),
                    "Option D".to_string(),
                ],
                correct_option: AnswerOption::B,
            })
            .collect();

        QuizContent {
            quiz_id,
            title: format!("Quiz {}", quiz_id),
            questions,
        }
    }

    fn create_test_engine(timer_budget: Duration) -> TestHarness {
        let quiz_provider = Arc::new(StaticQuizProvider::new());
        quiz_provider.insert_quiz(sample_quiz(5, 3)).unwrap();
        quiz_provider.insert_quiz(sample_quiz(6, 1)).unwrap();

        let user_directory = Arc::new(StaticUserDirectory::new());
        user_directory
            .insert_user(UserProfile {
                user_id: 1,
                display_name: "Alice".to_string(),
            })
            .unwrap();

        let gateway = Arc::new(MockBroadcastGateway::new());
        let store = Arc::new(MockGameResultStore::new());
        let metrics = Arc::new(MetricsCollector::new().unwrap());

        let engine = GameRoomEngine::with_components(
            quiz_provider,
            user_directory,
            gateway.clone(),
            store.clone(),
            GameSettings::default(),
            Arc::new(QuestionTimer::new(timer_budget)),
            metrics,
        );

        TestHarness {
            engine,
            gateway,
            store,
        }
    }

    fn slow_engine() -> TestHarness {
        // Budget long enough that no timer fires during the test
        create_test_engine(Duration::from_secs(60))
    }

    fn fast_engine() -> TestHarness {
        create_test_engine(Duration::from_millis(40))
    }

    #[tokio::test]
    async fn test_create_room() {
        let h = slow_engine();

        let room = h.engine.create_room(5, 1).await.unwrap();

        assert_eq!(room.room_code.len(), 6);
        assert_eq!(room.status, RoomStatus::Waiting);
        assert_eq!(room.questions.len(), 3);
        assert_eq!(room.participants.len(), 1);
        assert_eq!(room.participants[0].user_id, 1);
        assert_eq!(room.participants[0].display_name, "Alice");

        assert_eq!(h.gateway.caller_event_names(), vec!["RoomCreated"]);

        let stats = h.engine.get_stats().await.unwrap();
        assert_eq!(stats.rooms_created, 1);
        assert_eq!(stats.active_rooms, 1);
    }

    #[tokio::test]
    async fn test_create_room_unknown_quiz() {
        let h = slow_engine();
        let err = h.engine.create_room(999, 1).await.unwrap_err();
        assert!(err.to_string().contains("Quiz not found"));
    }

    #[tokio::test]
    async fn test_host_cannot_have_two_rooms() {
        let h = slow_engine();
        h.engine.create_room(5, 1).await.unwrap();

        let err = h.engine.create_room(6, 1).await.unwrap_err();
        assert!(err.to_string().contains("already hosts"));
    }

    #[tokio::test]
    async fn test_host_can_create_again_after_delete() {
        let h = slow_engine();
        let room = h.engine.create_room(5, 1).await.unwrap();

        h.engine.delete_room(&room.room_code).await.unwrap();
        assert!(h.engine.create_room(6, 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_join_room() {
        let h = slow_engine();
        let room = h.engine.create_room(5, 1).await.unwrap();

        let outcome = h.engine.join_room(&room.room_code, 2).await.unwrap();
        assert!(matches!(outcome, JoinOutcome::Joined(_)));
        assert_eq!(outcome.room().participants.len(), 2);
        // Unknown in the directory, so the fallback name applies
        assert_eq!(outcome.room().participants[1].display_name, "Player 2");

        assert_eq!(
            h.gateway.event_names_for_room(&room.room_code),
            vec!["UserJoined"]
        );
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let h = slow_engine();
        let room = h.engine.create_room(5, 1).await.unwrap();

        h.engine.join_room(&room.room_code, 2).await.unwrap();
        let outcome = h.engine.join_room(&room.room_code, 2).await.unwrap();

        assert_eq!(outcome.room().participants.len(), 2);
        // Only one UserJoined despite two join calls
        assert_eq!(
            h.gateway.event_names_for_room(&room.room_code),
            vec!["UserJoined"]
        );

        let stats = h.engine.get_stats().await.unwrap();
        assert_eq!(stats.participants_joined, 1);
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let h = slow_engine();
        let err = h.engine.join_room(&"NOPE42".to_string(), 2).await.unwrap_err();
        assert!(err.to_string().contains("Room not found"));
    }

    #[tokio::test]
    async fn test_late_join_in_progress() {
        let h = slow_engine();
        let room = h.engine.create_room(5, 1).await.unwrap();
        h.engine.start_game(&room.room_code).await.unwrap();

        let outcome = h.engine.join_room(&room.room_code, 3).await.unwrap();
        match outcome {
            JoinOutcome::JoinedInProgress {
                room,
                state,
                leaderboard,
            } => {
                assert!(room.has_participant(3));
                assert_eq!(state.current_question_index, 0);
                assert!(leaderboard.entries.is_empty());
            }
            other => panic!("Expected in-progress join, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_game() {
        let h = slow_engine();
        let room = h.engine.create_room(5, 1).await.unwrap();

        let state = h.engine.start_game(&room.room_code).await.unwrap();
        assert_eq!(state.current_question_index, 0);
        assert_eq!(state.total_questions, 3);
        assert_eq!(state.status, RoomStatus::InProgress);

        assert_eq!(
            h.gateway.event_names_for_room(&room.room_code),
            vec!["GameStarted"]
        );
    }

    #[tokio::test]
    async fn test_start_game_twice_rejected() {
        let h = slow_engine();
        let room = h.engine.create_room(5, 1).await.unwrap();
        h.engine.start_game(&room.room_code).await.unwrap();

        let err = h.engine.start_game(&room.room_code).await.unwrap_err();
        assert!(err.to_string().contains("not allowed in InProgress"));
    }

    #[tokio::test]
    async fn test_submit_answer_scoring() {
        let h = slow_engine();
        let room = h.engine.create_room(5, 1).await.unwrap();
        h.engine.join_room(&room.room_code, 2).await.unwrap();
        h.engine.start_game(&room.room_code).await.unwrap();

        // 5s of a 20s scoring budget leaves three quarters of max score
        let result = h
            .engine
            .submit_answer(&room.room_code, 2, 1, AnswerOption::B, 5_000)
            .await
            .unwrap();
        assert!(result.is_correct);
        assert_eq!(result.score, 7_500);

        let wrong = h
            .engine
            .submit_answer(&room.room_code, 1, 1, AnswerOption::C, 1_000)
            .await
            .unwrap();
        assert!(!wrong.is_correct);
        assert_eq!(wrong.score, 0);

        // Answers are never broadcast
        assert_eq!(
            h.gateway.event_names_for_room(&room.room_code),
            vec!["UserJoined", "GameStarted"]
        );
    }

    #[tokio::test]
    async fn test_resubmission_last_write_wins() {
        let h = slow_engine();
        let room = h.engine.create_room(5, 1).await.unwrap();
        h.engine.start_game(&room.room_code).await.unwrap();

        h.engine
            .submit_answer(&room.room_code, 1, 1, AnswerOption::B, 2_000)
            .await
            .unwrap();
        let second = h
            .engine
            .submit_answer(&room.room_code, 1, 1, AnswerOption::C, 4_000)
            .await
            .unwrap();
        assert_eq!(second.score, 0);

        // Force the question to end and check the snapshot reflects only
        // the replacement answer
        h.engine
            .on_question_timeout(&room.room_code, 0)
            .await
            .unwrap();
        let snapshot = h.engine.get_leaderboard(&room.room_code, 0).await.unwrap();
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].score, 0);
        assert_eq!(snapshot.entries[0].total_elapsed_ms, 4_000);
    }

    #[tokio::test]
    async fn test_stale_submission_rejected() {
        let h = slow_engine();
        let room = h.engine.create_room(5, 1).await.unwrap();
        h.engine.start_game(&room.room_code).await.unwrap();

        // Question 2 is not current yet
        let err = h
            .engine
            .submit_answer(&room.room_code, 1, 2, AnswerOption::B, 1_000)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Stale submission"));
    }

    #[tokio::test]
    async fn test_submit_before_start_rejected() {
        let h = slow_engine();
        let room = h.engine.create_room(5, 1).await.unwrap();

        let err = h
            .engine
            .submit_answer(&room.room_code, 1, 1, AnswerOption::B, 1_000)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("in progress"));
    }

    #[tokio::test]
    async fn test_non_participant_cannot_answer() {
        let h = slow_engine();
        let room = h.engine.create_room(5, 1).await.unwrap();
        h.engine.start_game(&room.room_code).await.unwrap();

        let err = h
            .engine
            .submit_answer(&room.room_code, 42, 1, AnswerOption::B, 1_000)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not in room"));
    }

    #[tokio::test]
    async fn test_timeout_advances_question() {
        let h = slow_engine();
        let room = h.engine.create_room(5, 1).await.unwrap();
        h.engine.start_game(&room.room_code).await.unwrap();

        h.engine
            .on_question_timeout(&room.room_code, 0)
            .await
            .unwrap();

        let events = h.gateway.event_names_for_room(&room.room_code);
        assert_eq!(events, vec!["GameStarted", "QuestionEnded", "NextQuestion"]);

        // Question 1 is now current
        let result = h
            .engine
            .submit_answer(&room.room_code, 1, 2, AnswerOption::B, 1_000)
            .await
            .unwrap();
        assert!(result.is_correct);
    }

    #[tokio::test]
    async fn test_duplicate_timeout_fire_is_noop() {
        let h = slow_engine();
        let room = h.engine.create_room(5, 1).await.unwrap();
        h.engine.start_game(&room.room_code).await.unwrap();

        h.engine
            .on_question_timeout(&room.room_code, 0)
            .await
            .unwrap();
        // Second fire for the same index must change nothing
        h.engine
            .on_question_timeout(&room.room_code, 0)
            .await
            .unwrap();

        let events = h.gateway.event_names_for_room(&room.room_code);
        assert_eq!(events, vec!["GameStarted", "QuestionEnded", "NextQuestion"]);
    }

    #[tokio::test]
    async fn test_full_game_completes_and_cleans_up() {
        let h = fast_engine();
        let room = h.engine.create_room(6, 1).await.unwrap();
        h.engine.join_room(&room.room_code, 2).await.unwrap();
        h.engine.start_game(&room.room_code).await.unwrap();

        h.engine
            .submit_answer(&room.room_code, 2, 1, AnswerOption::B, 5_000)
            .await
            .unwrap();

        // Single-question quiz, so the first timeout ends the game
        sleep(Duration::from_millis(150)).await;

        let events = h.gateway.event_names_for_room(&room.room_code);
        assert_eq!(
            events,
            vec!["UserJoined", "GameStarted", "QuestionEnded", "GameEnded"]
        );

        // Flush happened before cleanup and exactly once
        assert_eq!(h.store.flush_count(), 1);
        let flushed = &h.store.flushed_games()[0];
        assert_eq!(flushed.room.status, RoomStatus::Completed);
        assert_eq!(flushed.answers.len(), 1);
        assert_eq!(flushed.final_leaderboard.entries[0].user_id, 2);
        assert_eq!(flushed.final_leaderboard.entries[0].score, 7_500);

        // The room is gone
        let err = h.engine.join_room(&room.room_code, 3).await.unwrap_err();
        assert!(err.to_string().contains("Room not found"));

        // But the final results survive cleanup
        let results = h.engine.get_final_results(&room.room_code).await.unwrap();
        assert_eq!(results.leaderboard.entries.len(), 1);
        assert_eq!(results.question_results.len(), 1);

        let stats = h.engine.get_stats().await.unwrap();
        assert_eq!(stats.games_completed, 1);
        assert_eq!(stats.active_rooms, 0);
    }

    #[tokio::test]
    async fn test_flush_failure_aborts_cleanup() {
        let h = slow_engine();
        let room = h.engine.create_room(6, 1).await.unwrap();
        h.engine.start_game(&room.room_code).await.unwrap();
        h.store.set_fail_flush(true);

        let err = h
            .engine
            .on_question_timeout(&room.room_code, 0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Persistence flush failed"));

        // Room survives the failed flush; no GameEnded went out
        assert!(h.engine.active_rooms().unwrap().contains(&room.room_code));
        let events = h.gateway.event_names_for_room(&room.room_code);
        assert!(!events.contains(&"GameEnded"));
    }

    #[tokio::test]
    async fn test_refired_timeout_retries_failed_flush() {
        let h = slow_engine();
        let room = h.engine.create_room(6, 1).await.unwrap();
        h.engine.start_game(&room.room_code).await.unwrap();
        h.engine
            .submit_answer(&room.room_code, 1, 1, AnswerOption::B, 3_000)
            .await
            .unwrap();

        h.store.set_fail_flush(true);
        let err = h
            .engine
            .on_question_timeout(&room.room_code, 0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Persistence flush failed"));
        assert_eq!(h.store.flush_count(), 0);
        assert!(h.engine.active_rooms().unwrap().contains(&room.room_code));

        // Storage recovers; a re-fire for the final question retries the
        // flush and completes the teardown
        h.store.set_fail_flush(false);
        h.engine
            .on_question_timeout(&room.room_code, 0)
            .await
            .unwrap();

        assert_eq!(h.store.flush_count(), 1);
        assert!(!h.engine.active_rooms().unwrap().contains(&room.room_code));

        let events = h.gateway.event_names_for_room(&room.room_code);
        assert_eq!(
            events.iter().filter(|&&name| name == "QuestionEnded").count(),
            1
        );
        assert!(events.contains(&"GameEnded"));

        let results = h.engine.get_final_results(&room.room_code).await.unwrap();
        assert_eq!(results.leaderboard.entries[0].user_id, 1);
    }

    #[tokio::test]
    async fn test_room_code_collision_retries() {
        let h = slow_engine();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        let engine = h.engine.clone().with_code_generator(move || {
            // First two calls collide on the same code
            match counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) {
                0 | 1 => "AAAAAA".to_string(),
                _ => "BBBBBB".to_string(),
            }
        });

        let first = engine.create_room(5, 1).await.unwrap();
        assert_eq!(first.room_code, "AAAAAA");

        let second = engine.create_room(6, 2).await.unwrap();
        assert_eq!(second.room_code, "BBBBBB");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_room_code_exhaustion() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let h = slow_engine();
        // Same seed every call, so every candidate code is identical
        let engine = h.engine.clone().with_code_generator(|| {
            let mut rng = StdRng::seed_from_u64(7);
            crate::utils::generate_room_code_with(
                &mut rng,
                crate::utils::ROOM_CODE_ALPHABET,
                crate::utils::ROOM_CODE_LEN,
            )
        });

        engine.create_room(5, 1).await.unwrap();

        let err = engine.create_room(6, 2).await.unwrap_err();
        assert!(err.to_string().contains("unique room code"));
    }

    #[tokio::test]
    async fn test_get_leaderboard_before_question_end() {
        let h = slow_engine();
        let room = h.engine.create_room(5, 1).await.unwrap();
        h.engine.start_game(&room.room_code).await.unwrap();

        let err = h
            .engine
            .get_leaderboard(&room.room_code, 0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No leaderboard snapshot"));
    }

    #[tokio::test]
    async fn test_get_final_results_before_completion() {
        let h = slow_engine();
        let room = h.engine.create_room(5, 1).await.unwrap();
        h.engine.start_game(&room.room_code).await.unwrap();

        let err = h
            .engine
            .get_final_results(&room.room_code)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("has not completed"));
    }

    #[tokio::test]
    async fn test_delete_room_cancels_timers() {
        let h = slow_engine();
        let room = h.engine.create_room(5, 1).await.unwrap();
        h.engine.start_game(&room.room_code).await.unwrap();

        h.engine.delete_room(&room.room_code).await.unwrap();
        assert!(h.engine.active_rooms().unwrap().is_empty());

        // Deleting again reports the room as gone
        let err = h.engine.delete_room(&room.room_code).await.unwrap_err();
        assert!(err.to_string().contains("Room not found"));
    }
}
