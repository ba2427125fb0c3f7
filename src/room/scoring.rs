//! Scoring function and leaderboard accumulator
//!
//! Scoring is pure: correctness plus elapsed time in, points out. The
//! leaderboard keeps cumulative per-user totals and applies per-question
//! deltas so a resubmission never double-counts.

use crate::types::{AnswerRecord, LeaderboardEntry, LeaderboardSnapshot, RoomCode, UserId};
use std::collections::HashMap;

/// Compute the score for one answer.
///
/// Incorrect answers and answers at or past the time budget score 0;
/// otherwise the score decays linearly from `max_score` at 0 ms to 0 at
/// `time_budget_ms`, rounded to the nearest point.
pub fn score(is_correct: bool, elapsed_ms: u64, time_budget_ms: u64, max_score: u32) -> u32 {
    if !is_correct || elapsed_ms >= time_budget_ms {
        return 0;
    }

    let fraction = 1.0 - (elapsed_ms as f64 / time_budget_ms as f64);
    let raw = (max_score as f64 * fraction).round();
    raw.clamp(0.0, max_score as f64) as u32
}

/// Cumulative per-user scores for one room
#[derive(Debug, Clone, Default)]
pub struct Leaderboard {
    entries: HashMap<UserId, LeaderboardEntry>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an answer into the user's cumulative totals.
    ///
    /// `previous` is the record this submission replaces (same user, same
    /// question), if any; its contribution is subtracted first so only the
    /// latest answer for a question counts.
    pub fn record_answer(&mut self, new: &AnswerRecord, previous: Option<&AnswerRecord>) {
        let entry = self
            .entries
            .entry(new.user_id)
            .or_insert_with(|| LeaderboardEntry {
                user_id: new.user_id,
                score: 0,
                total_elapsed_ms: 0,
            });

        if let Some(prev) = previous {
            entry.score = entry.score.saturating_sub(prev.score);
            entry.total_elapsed_ms = entry.total_elapsed_ms.saturating_sub(prev.elapsed_ms);
        }

        entry.score += new.score;
        entry.total_elapsed_ms += new.elapsed_ms;
    }

    /// Entries sorted by score descending; ties break by cumulative elapsed
    /// time ascending, then user id ascending, so the order is deterministic.
    pub fn sorted_entries(&self) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.total_elapsed_ms.cmp(&b.total_elapsed_ms))
                .then(a.user_id.cmp(&b.user_id))
        });
        entries
    }

    /// Produce a ranked snapshot for a question (or the final view)
    pub fn snapshot(&self, room_code: &RoomCode, question_index: Option<usize>) -> LeaderboardSnapshot {
        LeaderboardSnapshot {
            room_code: room_code.clone(),
            question_index,
            entries: self.sorted_entries(),
        }
    }

    pub fn entry(&self, user_id: UserId) -> Option<&LeaderboardEntry> {
        self.entries.get(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnswerOption;
    use proptest::prelude::*;

    fn answer(user_id: UserId, question_id: i64, score: u32, elapsed_ms: u64) -> AnswerRecord {
        AnswerRecord {
            user_id,
            question_id,
            selected_option: AnswerOption::B,
            is_correct: score > 0,
            elapsed_ms,
            score,
        }
    }

    #[test]
    fn test_score_instant_correct_answer() {
        assert_eq!(score(true, 0, 20_000, 10_000), 10_000);
    }

    #[test]
    fn test_score_halfway() {
        assert_eq!(score(true, 10_000, 20_000, 10_000), 5_000);
    }

    #[test]
    fn test_score_quarter_elapsed() {
        // The end-to-end example from the game flow: 5s of a 20s budget
        assert_eq!(score(true, 5_000, 20_000, 10_000), 7_500);
    }

    #[test]
    fn test_score_at_or_past_budget_is_zero() {
        assert_eq!(score(true, 20_000, 20_000, 10_000), 0);
        assert_eq!(score(true, 25_000, 20_000, 10_000), 0);
    }

    #[test]
    fn test_incorrect_answer_scores_zero() {
        assert_eq!(score(false, 0, 20_000, 10_000), 0);
        assert_eq!(score(false, 19_999, 20_000, 10_000), 0);
    }

    proptest! {
        #[test]
        fn prop_score_bounded(elapsed in 0u64..100_000, budget in 1u64..100_000, max in 1u32..100_000) {
            let s = score(true, elapsed, budget, max);
            prop_assert!(s <= max);
        }

        #[test]
        fn prop_incorrect_always_zero(elapsed in 0u64..100_000) {
            prop_assert_eq!(score(false, elapsed, 20_000, 10_000), 0);
        }
    }

    #[test]
    fn test_leaderboard_accumulates_across_questions() {
        let mut board = Leaderboard::new();
        board.record_answer(&answer(1, 10, 7_500, 5_000), None);
        board.record_answer(&answer(1, 11, 5_000, 10_000), None);

        let entry = board.entry(1).unwrap();
        assert_eq!(entry.score, 12_500);
        assert_eq!(entry.total_elapsed_ms, 15_000);
    }

    #[test]
    fn test_resubmission_replaces_contribution() {
        let mut board = Leaderboard::new();
        let first = answer(1, 10, 7_500, 5_000);
        board.record_answer(&first, None);

        // Same question answered again; the earlier contribution must go
        let second = answer(1, 10, 2_500, 15_000);
        board.record_answer(&second, Some(&first));

        let entry = board.entry(1).unwrap();
        assert_eq!(entry.score, 2_500);
        assert_eq!(entry.total_elapsed_ms, 15_000);
    }

    #[test]
    fn test_sorted_descending_by_score() {
        let mut board = Leaderboard::new();
        board.record_answer(&answer(1, 10, 5_000, 10_000), None);
        board.record_answer(&answer(2, 10, 9_000, 2_000), None);
        board.record_answer(&answer(3, 10, 7_000, 6_000), None);

        let entries = board.sorted_entries();
        let user_order: Vec<UserId> = entries.iter().map(|e| e.user_id).collect();
        assert_eq!(user_order, vec![2, 3, 1]);
    }

    #[test]
    fn test_tie_breaks_are_deterministic() {
        let mut board = Leaderboard::new();
        // Same score, different cumulative elapsed time
        board.record_answer(&answer(7, 10, 5_000, 9_000), None);
        board.record_answer(&answer(3, 10, 5_000, 4_000), None);
        // Same score AND same elapsed: falls through to user id
        board.record_answer(&answer(9, 10, 5_000, 4_000), None);

        for _ in 0..10 {
            let entries = board.sorted_entries();
            let user_order: Vec<UserId> = entries.iter().map(|e| e.user_id).collect();
            assert_eq!(user_order, vec![3, 9, 7]);
        }
    }

    #[test]
    fn test_snapshot_carries_question_index() {
        let mut board = Leaderboard::new();
        board.record_answer(&answer(1, 10, 5_000, 10_000), None);

        let per_question = board.snapshot(&"ABC123".to_string(), Some(0));
        assert_eq!(per_question.question_index, Some(0));
        assert_eq!(per_question.entries.len(), 1);

        let final_view = board.snapshot(&"ABC123".to_string(), None);
        assert_eq!(final_view.question_index, None);
    }
}
