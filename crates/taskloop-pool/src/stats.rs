//! Monitoring state: counters, the execution-time sliding window, the
//! bounded run history, and the permit source. Everything here lives under
//! the pool's single mutex, so the reset swap and every stat update are
//! serialized by one lock.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use taskloop_core::config::STATS_WINDOW;

/// One completed (or failed) run, kept for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub timestamp: DateTime<Utc>,
    pub duration_secs: f64,
    pub task_id: String,
    pub success: bool,
}

/// Consistent snapshot of the pool's monitoring state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    /// Fixed worker capacity.
    pub capacity: usize,
    /// Units currently executing.
    pub active_tasks: usize,
    /// Units submitted but not yet started (waiting for a permit).
    pub queued_tasks: usize,
    /// Lifetime successful completions.
    pub completed_tasks: u64,
    /// Lifetime failures (failure flag, or a caught panic).
    pub failed_tasks: u64,
    /// Historical peak of `active_tasks`.
    pub max_concurrent_tasks: usize,
    /// Aggregates over the retained duration window (0 when empty).
    pub avg_execution_time: f64,
    pub min_execution_time: f64,
    pub max_execution_time: f64,
    pub total_execution_time: f64,
    /// Last `STATS_WINDOW` runs, oldest first.
    pub history: Vec<RunRecord>,
}

/// Mutable monitoring state. Not shared directly — the pool guards one of
/// these behind a mutex and hands out [`PoolStats`] snapshots.
#[derive(Debug)]
pub(crate) struct Monitor {
    capacity: usize,
    /// Current permit source. Replaced wholesale on the reset path; workers
    /// clone the `Arc` out before awaiting, so the mutex is never held
    /// across an await point.
    semaphore: Arc<Semaphore>,
    active: usize,
    queued: usize,
    completed: u64,
    failed: u64,
    max_concurrent: usize,
    window: VecDeque<f64>,
    total_execution_time: f64,
    history: VecDeque<RunRecord>,
}

impl Monitor {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            active: 0,
            queued: 0,
            completed: 0,
            failed: 0,
            max_concurrent: 0,
            window: VecDeque::with_capacity(STATS_WINDOW),
            total_execution_time: 0.0,
            history: VecDeque::with_capacity(STATS_WINDOW),
        }
    }

    pub(crate) fn on_submit(&mut self) {
        self.queued += 1;
    }

    /// Clone out the current permit source.
    pub(crate) fn semaphore(&self) -> Arc<Semaphore> {
        Arc::clone(&self.semaphore)
    }

    /// Swap in a fresh permit source of the same capacity, if `stale` is
    /// still the current one. Returns whether the swap happened; the
    /// pointer comparison keeps late observers of a closure from resetting
    /// twice.
    pub(crate) fn replace_semaphore(&mut self, stale: &Arc<Semaphore>) -> bool {
        if Arc::ptr_eq(&self.semaphore, stale) {
            self.semaphore = Arc::new(Semaphore::new(self.capacity));
            true
        } else {
            false
        }
    }

    /// A permit was acquired: the unit moves from queued to active.
    pub(crate) fn on_start(&mut self) {
        self.queued = self.queued.saturating_sub(1);
        self.active += 1;
        if self.active > self.max_concurrent {
            self.max_concurrent = self.active;
        }
    }

    /// A unit finished. Updates the window, the history ring, and the
    /// outcome counters, then releases the active slot.
    pub(crate) fn on_finish(&mut self, task_id: &str, duration_secs: f64, success: bool) {
        if self.window.len() == STATS_WINDOW {
            if let Some(evicted) = self.window.pop_front() {
                self.total_execution_time -= evicted;
            }
        }
        self.window.push_back(duration_secs);
        self.total_execution_time += duration_secs;

        if self.history.len() == STATS_WINDOW {
            self.history.pop_front();
        }
        self.history.push_back(RunRecord {
            timestamp: Utc::now(),
            duration_secs,
            task_id: task_id.to_string(),
            success,
        });

        if success {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        self.active = self.active.saturating_sub(1);
    }

    pub(crate) fn snapshot(&self) -> PoolStats {
        let len = self.window.len();
        let (min, max, avg) = if len == 0 {
            (0.0, 0.0, 0.0)
        } else {
            let min = self.window.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = self.window.iter().cloned().fold(0.0_f64, f64::max);
            (min, max, self.total_execution_time / len as f64)
        };
        PoolStats {
            capacity: self.capacity,
            active_tasks: self.active,
            queued_tasks: self.queued,
            completed_tasks: self.completed,
            failed_tasks: self.failed,
            max_concurrent_tasks: self.max_concurrent,
            avg_execution_time: avg,
            min_execution_time: min,
            max_execution_time: max,
            total_execution_time: self.total_execution_time,
            history: self.history.iter().cloned().collect(),
        }
    }
}
