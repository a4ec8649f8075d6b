use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observability events emitted by the pool over an optional mpsc channel.
///
/// Delivery is best-effort (`try_send`): a full or closed channel never
/// stalls a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoolEvent {
    /// A unit of work began executing (permit acquired).
    Started {
        task_id: String,
        submitted_at: DateTime<Utc>,
    },
    /// A unit of work finished, successfully or not.
    Finished {
        task_id: String,
        duration_secs: f64,
        success: bool,
    },
    /// The internal executor was found unusable and has been replaced.
    /// No submitted work is lost by a reset.
    Reset { reason: String },
}
