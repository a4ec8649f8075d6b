//! `taskloop-pool` — bounded, monitored execution of task payloads.
//!
//! A fixed number of permits caps concurrency; every submitted unit gets its
//! own tokio task that waits for a permit, runs the payload through the
//! [`CodeExecutor`] boundary, and records the outcome. Submission never
//! blocks the caller and never fails for a well-formed item.
//!
//! All pool state (counters, the duration window, the run history, and the
//! permit source itself) sits behind one mutex, so [`WorkerPool::stats`]
//! always returns a consistent snapshot and the reset swap is atomic with
//! respect to every stat update.
//!
//! If the permit source has become unusable (closed semaphore), the pool
//! swaps in a fresh one, announces the reset through the notification sink
//! and the event channel, and retries — the submitted work is never lost.

pub mod events;
pub mod executor;
pub mod stats;

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

use taskloop_core::notify::{NotificationSink, NullSink, Severity};

pub use events::PoolEvent;
pub use executor::{CodeExecutor, WorkItem};
pub use stats::{PoolStats, RunRecord};

use stats::Monitor;

/// Bounded worker pool with execution statistics.
///
/// Cheap to clone; all clones share the same pool.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

struct Inner {
    capacity: usize,
    /// The one lock: counters, window, history, and the permit source all
    /// live here, so the reset swap is serialized with every stat update.
    monitor: Mutex<Monitor>,
    executor: Arc<dyn CodeExecutor>,
    events: Option<mpsc::Sender<PoolEvent>>,
    sink: Arc<dyn NotificationSink>,
    /// Captured at construction so `submit` works from any thread.
    runtime: tokio::runtime::Handle,
}

impl WorkerPool {
    /// Create a pool with `capacity` workers and no event channel or
    /// notification sink. Must be called from within a tokio runtime.
    pub fn new(capacity: usize, executor: Arc<dyn CodeExecutor>) -> Self {
        Self::with_observers(capacity, executor, None, Arc::new(NullSink))
    }

    /// Create a pool wired to an event channel and a notification sink.
    ///
    /// Must be called from within a tokio runtime; workers are spawned onto
    /// it, and `submit` may then be called from any thread.
    pub fn with_observers(
        capacity: usize,
        executor: Arc<dyn CodeExecutor>,
        events: Option<mpsc::Sender<PoolEvent>>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity,
                monitor: Mutex::new(Monitor::new(capacity)),
                executor,
                events,
                sink,
                runtime: tokio::runtime::Handle::current(),
            }),
        }
    }

    /// Enqueue a unit of work for asynchronous execution. Returns
    /// immediately and never fails for a well-formed item; completion is
    /// observable via [`Self::stats`] and the event channel.
    pub fn submit(&self, item: WorkItem) {
        self.inner.monitor.lock().unwrap().on_submit();
        let inner = Arc::clone(&self.inner);
        let submitted_at = Utc::now();
        self.inner.runtime.spawn(async move {
            Inner::run_item(inner, item, submitted_at).await;
        });
    }

    /// Consistent snapshot of the monitoring state. Never waits on pending
    /// work.
    pub fn stats(&self) -> PoolStats {
        self.inner.monitor.lock().unwrap().snapshot()
    }

    /// Fixed worker capacity.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    #[cfg(test)]
    fn poison_for_test(&self) {
        self.inner.monitor.lock().unwrap().semaphore().close();
    }
}

impl Inner {
    async fn run_item(inner: Arc<Self>, item: WorkItem, submitted_at: chrono::DateTime<Utc>) {
        let permit = inner.acquire().await;

        inner.monitor.lock().unwrap().on_start();
        inner.send_event(PoolEvent::Started {
            task_id: item.task_id.clone(),
            submitted_at,
        });

        let start = Instant::now();
        let outcome = AssertUnwindSafe(inner.executor.run(&item.payload))
            .catch_unwind()
            .await;
        let duration = start.elapsed().as_secs_f64();

        let success = match outcome {
            Ok((_, true)) => {
                info!(task_id = %item.task_id, "task completed in {:.3}s", duration);
                true
            }
            Ok((result, false)) => {
                error!(task_id = %item.task_id, "task failed after {:.3}s: {}", duration, result);
                false
            }
            Err(_) => {
                error!(task_id = %item.task_id, "task crashed after {:.3}s", duration);
                false
            }
        };

        inner
            .monitor
            .lock()
            .unwrap()
            .on_finish(&item.task_id, duration, success);
        inner.send_event(PoolEvent::Finished {
            task_id: item.task_id,
            duration_secs: duration,
            success,
        });

        drop(permit);
    }

    /// Wait for a permit, transparently resetting the permit source if it
    /// has been closed out from under us.
    async fn acquire(&self) -> tokio::sync::OwnedSemaphorePermit {
        loop {
            let sem = self.monitor.lock().unwrap().semaphore();
            match sem.clone().acquire_owned().await {
                Ok(permit) => return permit,
                Err(_) => self.reset(&sem),
            }
        }
    }

    /// Replace the closed semaphore with a fresh one of the same capacity.
    /// The swap happens under the monitoring mutex; only the first worker
    /// to observe the closure performs it.
    fn reset(&self, stale: &Arc<Semaphore>) {
        let swapped = self.monitor.lock().unwrap().replace_semaphore(stale);
        if swapped {
            warn!(capacity = self.capacity, "worker pool executor was unusable, recreated");
            self.sink.notify(
                "Worker pool reset",
                "The pool's executor became unusable and was recreated; no work was lost.",
                Severity::Warning,
                "taskloop-pool",
            );
            self.send_event(PoolEvent::Reset {
                reason: "semaphore closed".to_string(),
            });
        }
    }

    /// Best-effort event delivery; a full or closed channel never stalls a
    /// worker.
    fn send_event(&self, event: PoolEvent) {
        if let Some(ref tx) = self.events {
            if tx.try_send(event).is_err() {
                warn!("pool event channel full or closed — event dropped");
            }
        }
    }
}
