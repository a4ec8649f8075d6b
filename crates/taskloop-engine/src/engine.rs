use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info};

use taskloop_core::config::SchedulerConfig;
use taskloop_pool::{PoolStats, WorkItem, WorkerPool};
use taskloop_store::{NewTask, StoreError, Task, TaskStore};

use crate::cron::next_occurrence;
use crate::error::Result;
use crate::traits::TimerRegistry;

/// Drives the per-second scheduling cycle against a task store and a worker
/// pool.
pub struct SchedulerEngine {
    store: TaskStore,
    pool: WorkerPool,
    timers: Arc<dyn TimerRegistry>,
    config: SchedulerConfig,
}

impl SchedulerEngine {
    pub fn new(
        store: TaskStore,
        pool: WorkerPool,
        timers: Arc<dyn TimerRegistry>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            pool,
            timers,
            config,
        }
    }

    /// The underlying store, for admin surfaces sharing this engine.
    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Snapshot of the worker pool's monitoring state.
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Ad hoc pass-through to the worker pool, bypassing the schedule.
    pub fn submit(&self, payload: &str, task_id: &str) {
        self.pool.submit(WorkItem::new(task_id, payload));
    }

    /// Create a task, deriving `runtime`/`expire` the same way the admin
    /// form did: an explicit or defaulted window for one-shot tasks, the
    /// next cron occurrence for recurring ones.
    pub fn create_task(&self, new: NewTask) -> Result<Task> {
        let now = Utc::now();
        let window = self.expire_window();
        let crontab = new.crontab.filter(|c| !c.is_empty());

        let task = match crontab {
            Some(expr) => {
                let next = next_occurrence(&expr, now)?;
                let task =
                    self.store
                        .insert(&new.name, &new.code, Some(&expr), next, next + window)?;
                self.timers.register_recurring(&task.name, &task.code, &expr);
                task
            }
            None => {
                let runtime = new.runtime.unwrap_or(now);
                let expire = new.expire.unwrap_or(runtime + window);
                self.store.insert(&new.name, &new.code, None, runtime, expire)?
            }
        };
        Ok(task)
    }

    /// Run exactly one scheduling cycle at the current instant. Returns the
    /// number of tasks dispatched. Idempotent to call repeatedly: a task is
    /// dispatched at most once per tick in which it is selected.
    pub fn tick(&self) -> Result<usize> {
        self.tick_at(Utc::now())
    }

    /// [`Self::tick`] with an explicit clock, for deterministic testing and
    /// hosts that drive the cycle on their own timer.
    pub fn tick_at(&self, now: DateTime<Utc>) -> Result<usize> {
        // 1. Purge: an expired-and-never-run task is dropped, not executed.
        self.store.purge_expired(now)?;

        // 2. Select.
        let due = self.store.list_due(now)?;
        let mut dispatched = 0;

        for task in due {
            if self.dispatch_one(task, now)? {
                dispatched += 1;
            }
        }

        Ok(dispatched)
    }

    /// Steps 3a-3c for a single due task. Returns whether the payload was
    /// handed to the pool; store failures other than a vanished row
    /// propagate and abort the tick.
    fn dispatch_one(&self, task: Task, now: DateTime<Utc>) -> Result<bool> {
        debug!(task = %task.name, "running task");

        // 3a. Record the dispatch before anything else.
        match self.store.mark_started(task.id, now) {
            Ok(()) => {}
            // Deleted by another connection between selection and here; a
            // vanished row is not a store failure.
            Err(StoreError::NotFound { .. }) => {
                debug!(task = %task.name, "task vanished before dispatch, skipping");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        if task.is_recurring() {
            // 3b'. Commit the next occurrence before dispatch so a slow
            // run cannot be re-selected by the next tick.
            let expr = task.crontab.as_deref().unwrap_or_default();
            match next_occurrence(expr, now) {
                Ok(next) => {
                    self.store
                        .reschedule(task.id, next, next + self.expire_window())?;
                }
                Err(e) => {
                    // Fatal for this task only: leave it started and
                    // unscheduled; the purge step reclaims it at expiry.
                    error!(task = %task.name, "cron resolution failed, not dispatching: {e}");
                    return Ok(false);
                }
            }
        } else {
            // 3b. One-shot: cancel the external timer keyed by name.
            self.timers.clear_one_shot(&task.name);
            if self.config.delete_oneshot_after_dispatch {
                self.store.delete(task.id)?;
            }
        }

        // 3c. Fire and forget; the pool tracks the outcome.
        self.pool.submit(WorkItem::new(task.name, task.code));
        Ok(true)
    }

    /// Main event loop. Polls at the configured cadence until `shutdown`
    /// broadcasts `true`; the select keeps the wait interruptible so the
    /// host stops promptly.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_secs = self.config.tick_interval_secs,
            "scheduler engine started"
        );

        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(self.config.tick_interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    // No internal retry: a failed tick is logged and the
                    // next tick is the retry.
                    if let Err(e) = self.tick() {
                        error!("scheduler tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn expire_window(&self) -> Duration {
        Duration::seconds(self.config.expire_window_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rusqlite::Connection;
    use std::sync::Mutex;
    use std::time::Duration as StdDuration;
    use taskloop_pool::CodeExecutor;
    use tokio::sync::mpsc;

    struct RecordingExecutor {
        ran: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl CodeExecutor for RecordingExecutor {
        async fn run(&self, payload: &str) -> (String, bool) {
            let _ = self.ran.send(payload.to_string());
            ("ok".into(), true)
        }
    }

    #[derive(Default)]
    struct RecordingTimers {
        cleared: Mutex<Vec<String>>,
        registered: Mutex<Vec<String>>,
    }

    impl TimerRegistry for RecordingTimers {
        fn clear_one_shot(&self, name: &str) {
            self.cleared.lock().unwrap().push(name.to_string());
        }
        fn register_recurring(&self, name: &str, _payload: &str, _cron_expr: &str) {
            self.registered.lock().unwrap().push(name.to_string());
        }
    }

    struct Harness {
        engine: SchedulerEngine,
        timers: Arc<RecordingTimers>,
        ran: mpsc::UnboundedReceiver<String>,
    }

    fn harness(config: SchedulerConfig) -> Harness {
        let conn = Connection::open_in_memory().unwrap();
        taskloop_store::db::init_db(&conn).unwrap();
        let store = TaskStore::new(conn);

        let (tx, rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::new(4, Arc::new(RecordingExecutor { ran: tx }));
        let timers = Arc::new(RecordingTimers::default());
        let engine = SchedulerEngine::new(store, pool, timers.clone(), config);
        Harness {
            engine,
            timers,
            ran: rx,
        }
    }

    async fn expect_ran(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
        tokio::time::timeout(StdDuration::from_secs(5), rx.recv())
            .await
            .expect("payload never executed")
            .expect("executor channel closed")
    }

    #[tokio::test]
    async fn expired_task_is_purged_and_never_dispatched() {
        let h = harness(SchedulerConfig::default());
        let now = Utc::now();
        h.engine
            .store()
            .insert("stale", "noop", None, now - Duration::minutes(30), now - Duration::seconds(1))
            .unwrap();

        let dispatched = h.engine.tick_at(now).unwrap();
        assert_eq!(dispatched, 0);
        assert!(h.engine.store().list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn recurring_task_advances_before_dispatch() {
        let mut h = harness(SchedulerConfig::default());
        let now = Utc::now();
        let t = h
            .engine
            .store()
            .insert(
                "heartbeat",
                "ping",
                Some("*/5 * * * * *"),
                now - Duration::seconds(10),
                now + Duration::seconds(10),
            )
            .unwrap();

        assert_eq!(h.engine.tick_at(now).unwrap(), 1);
        assert_eq!(expect_ran(&mut h.ran).await, "ping");

        let got = h.engine.store().get(t.id).unwrap().unwrap();
        assert!(got.runtime > now);
        assert!(got.runtime <= now + Duration::seconds(5));
        assert_eq!(got.expire, got.runtime + Duration::seconds(1800));
        assert_eq!(got.started.unwrap(), now);
        assert_eq!(got.crontab.as_deref(), Some("*/5 * * * * *"));

        // Advanced out of the due set: an immediate second tick is a no-op.
        assert_eq!(h.engine.tick_at(now).unwrap(), 0);
    }

    #[tokio::test]
    async fn oneshot_dispatch_leaves_schedule_untouched_and_clears_timer() {
        let mut h = harness(SchedulerConfig::default());
        let now = Utc::now();
        let t = h
            .engine
            .store()
            .insert("once", "do-it", Some(""), now - Duration::seconds(10), now + Duration::seconds(10))
            .unwrap();

        assert_eq!(h.engine.tick_at(now).unwrap(), 1);
        assert_eq!(expect_ran(&mut h.ran).await, "do-it");
        assert_eq!(h.timers.cleared.lock().unwrap().as_slice(), ["once"]);

        let got = h.engine.store().get(t.id).unwrap().unwrap();
        assert_eq!(got.runtime, t.runtime);
        assert_eq!(got.expire, t.expire);
        assert_eq!(got.crontab.as_deref(), Some(""));
        assert!(got.started.is_some());
    }

    #[tokio::test]
    async fn oneshot_is_reselected_every_tick_until_expiry() {
        // Documented legacy behavior: nothing advances the runtime of a
        // dispatched one-shot, so it comes back on the next tick.
        let h = harness(SchedulerConfig::default());
        let now = Utc::now();
        h.engine
            .store()
            .insert("sticky", "noop", None, now - Duration::seconds(10), now + Duration::seconds(10))
            .unwrap();

        assert_eq!(h.engine.tick_at(now).unwrap(), 1);
        assert_eq!(h.engine.tick_at(now + Duration::seconds(1)).unwrap(), 1);

        // ...until the purge step reclaims it.
        assert_eq!(h.engine.tick_at(now + Duration::seconds(11)).unwrap(), 0);
        assert!(h.engine.store().list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn oneshot_is_deleted_after_dispatch_when_configured() {
        let config = SchedulerConfig {
            delete_oneshot_after_dispatch: true,
            ..SchedulerConfig::default()
        };
        let mut h = harness(config);
        let now = Utc::now();
        let t = h
            .engine
            .store()
            .insert("ephemeral", "noop", None, now - Duration::seconds(10), now + Duration::seconds(10))
            .unwrap();

        assert_eq!(h.engine.tick_at(now).unwrap(), 1);
        assert_eq!(expect_ran(&mut h.ran).await, "noop");
        assert!(h.engine.store().get(t.id).unwrap().is_none());
        assert_eq!(h.engine.tick_at(now + Duration::seconds(1)).unwrap(), 0);
    }

    #[tokio::test]
    async fn bad_crontab_is_fatal_for_that_task_only() {
        let h = harness(SchedulerConfig::default());
        let now = Utc::now();
        let bad = h
            .engine
            .store()
            .insert("broken", "noop", Some("not a cron"), now - Duration::seconds(1), now + Duration::seconds(60))
            .unwrap();
        h.engine
            .store()
            .insert("fine", "noop", None, now - Duration::seconds(1), now + Duration::seconds(60))
            .unwrap();

        // The healthy task still dispatches; the broken one is skipped but
        // keeps its started stamp.
        assert_eq!(h.engine.tick_at(now).unwrap(), 1);
        let got = h.engine.store().get(bad.id).unwrap().unwrap();
        assert!(got.started.is_some());
        assert_eq!(got.runtime, bad.runtime);
    }

    #[tokio::test]
    async fn vanished_task_is_skipped_without_aborting_the_tick() {
        // An admin delete can land between selection and mark_started; the
        // remaining due tasks of the tick must still dispatch.
        let mut h = harness(SchedulerConfig::default());
        let now = Utc::now();
        let ghost = h
            .engine
            .store()
            .insert("ghost", "noop", None, now - Duration::seconds(1), now + Duration::seconds(60))
            .unwrap();
        h.engine.store().delete(ghost.id).unwrap();

        // The stale Task value from the earlier selection is a no-op.
        assert!(!h.engine.dispatch_one(ghost, now).unwrap());

        h.engine
            .store()
            .insert("fine", "still-runs", None, now - Duration::seconds(1), now + Duration::seconds(60))
            .unwrap();
        assert_eq!(h.engine.tick_at(now).unwrap(), 1);
        assert_eq!(expect_ran(&mut h.ran).await, "still-runs");
    }

    #[tokio::test]
    async fn create_task_derives_schedule_from_crontab() {
        let h = harness(SchedulerConfig::default());
        let before = Utc::now();
        let task = h
            .engine
            .create_task(NewTask {
                name: "rec".into(),
                code: "ping".into(),
                crontab: Some("*/5 * * * * *".into()),
                ..NewTask::default()
            })
            .unwrap();

        assert!(task.runtime > before);
        assert_eq!(task.expire, task.runtime + Duration::seconds(1800));
        assert_eq!(h.timers.registered.lock().unwrap().as_slice(), ["rec"]);
    }

    #[tokio::test]
    async fn create_task_defaults_oneshot_window() {
        let h = harness(SchedulerConfig::default());
        let before = Utc::now();
        let task = h
            .engine
            .create_task(NewTask {
                name: "once".into(),
                code: "noop".into(),
                ..NewTask::default()
            })
            .unwrap();

        assert!(task.crontab.is_none());
        assert!(task.runtime >= before);
        assert_eq!(task.expire, task.runtime + Duration::seconds(1800));
    }

    #[tokio::test]
    async fn create_task_rejects_bad_crontab() {
        let h = harness(SchedulerConfig::default());
        let err = h
            .engine
            .create_task(NewTask {
                name: "nope".into(),
                code: "noop".into(),
                crontab: Some("whenever".into()),
                ..NewTask::default()
            })
            .unwrap_err();
        assert!(matches!(err, crate::EngineError::InvalidCron { .. }));
        assert!(h.engine.store().list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn adhoc_submit_reaches_the_pool() {
        let mut h = harness(SchedulerConfig::default());
        h.engine.submit("manual-payload", "manual");
        assert_eq!(expect_ran(&mut h.ran).await, "manual-payload");
    }
}
