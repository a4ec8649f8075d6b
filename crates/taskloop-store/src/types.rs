use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted task record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Row ID — assigned by the store on insert.
    pub id: i64,
    /// Human-readable label; also the dedupe/cancellation key for one-shot
    /// timer registrations.
    pub name: String,
    /// Opaque executable payload, handed verbatim to the code executor.
    pub code: String,
    /// Cron expression. `None` or empty means one-shot.
    pub crontab: Option<String>,
    /// Instant at/after which the task is eligible to run (UTC).
    pub runtime: DateTime<Utc>,
    /// Instant after which the task is discarded unrun (UTC).
    pub expire: DateTime<Utc>,
    /// Instant of the last dispatch, if any (UTC).
    pub started: Option<DateTime<Utc>>,
}

impl Task {
    /// A task is recurring iff it carries a non-empty cron expression.
    pub fn is_recurring(&self) -> bool {
        self.crontab.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// Fields supplied when creating a task; `runtime`/`expire` are optional and
/// defaulted (or derived from the cron expression) by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub crontab: Option<String>,
    #[serde(default)]
    pub runtime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expire: Option<DateTime<Utc>>,
}
