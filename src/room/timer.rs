//! Per-question one-shot timers
//!
//! Each (room, question index) pair gets a cancellable delayed task that
//! fires the engine's timeout handler once the question's time budget
//! expires. Cancellation is best effort: a stop can race an in-flight
//! fire, so the engine's index-match guard is the correctness backstop,
//! not the abort here.

use crate::error::Result;
use crate::types::RoomCode;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

struct TimerEntry {
    handle: JoinHandle<()>,
    started_at: Instant,
}

/// One-shot, cancellable timers keyed by (room code, question index)
pub struct QuestionTimer {
    timers: RwLock<HashMap<(RoomCode, usize), TimerEntry>>,
    budget: Duration,
}

impl QuestionTimer {
    /// Create a timer service with the configured question time budget
    pub fn new(budget: Duration) -> Self {
        Self {
            timers: RwLock::new(HashMap::new()),
            budget,
        }
    }

    /// The configured question time budget
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Schedule `on_timeout` to run once after the question time budget.
    ///
    /// Starting a timer for a pair that already has one replaces it. A
    /// failure inside the handler is logged and swallowed; the scheduling
    /// subsystem must not crash because one room's timeout went wrong.
    pub fn start<F>(self: &Arc<Self>, code: &RoomCode, question_index: usize, on_timeout: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        info!(
            "Starting timer for room {} question {} ({}s budget)",
            code,
            question_index,
            self.budget.as_secs()
        );

        let key = (code.clone(), question_index);
        let budget = self.budget;
        let timer = Arc::clone(self);
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(budget).await;

            debug!(
                "Timer elapsed for room {} question {}",
                task_key.0, task_key.1
            );

            if let Err(e) = on_timeout.await {
                error!(
                    "Timeout handler failed for room {} question {}: {}",
                    task_key.0, task_key.1, e
                );
            }

            // The timer consumed itself; drop the bookkeeping entry
            if let Ok(mut timers) = timer.timers.write() {
                timers.remove(&task_key);
            }
        });

        let entry = TimerEntry {
            handle,
            started_at: Instant::now(),
        };

        if let Ok(mut timers) = self.timers.write() {
            if let Some(old) = timers.insert(key, entry) {
                old.handle.abort();
            }
        }
    }

    /// Cancel the timer for one question; a no-op if it already fired or
    /// was never started.
    pub fn stop(&self, code: &RoomCode, question_index: usize) {
        if let Ok(mut timers) = self.timers.write() {
            if let Some(entry) = timers.remove(&(code.clone(), question_index)) {
                debug!(
                    "Stopping timer for room {} question {}",
                    code, question_index
                );
                entry.handle.abort();
            }
        }
    }

    /// Cancel every timer for indices 0..=upto_index, so no timer can
    /// outlive a torn-down room.
    pub fn stop_all(&self, code: &RoomCode, upto_index: usize) {
        info!("Stopping all timers for room {}", code);
        for index in 0..=upto_index {
            self.stop(code, index);
        }
    }

    /// Best-effort seconds left on a running timer; advisory only.
    ///
    /// The authoritative timeout decision is the scheduled task firing,
    /// never a poll of this value.
    pub fn remaining_time(&self, code: &RoomCode, question_index: usize) -> u64 {
        let timers = match self.timers.read() {
            Ok(timers) => timers,
            Err(_) => return 0,
        };

        match timers.get(&(code.clone(), question_index)) {
            Some(entry) => {
                let elapsed = entry.started_at.elapsed();
                self.budget.saturating_sub(elapsed).as_secs()
            }
            None => 0,
        }
    }

    /// Number of timers currently scheduled (for stats/tests)
    pub fn scheduled_count(&self) -> usize {
        self.timers.read().map(|t| t.len()).unwrap_or(0)
    }
}
