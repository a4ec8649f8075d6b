use thiserror::Error;

/// Errors that can occur within the scheduler engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A task store operation failed; propagates out of the tick.
    #[error("store error: {0}")]
    Store(#[from] taskloop_store::StoreError),

    /// The cron expression could not be parsed.
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    /// The cron expression parses but yields no future occurrence.
    #[error("cron expression '{expr}' has no upcoming occurrence")]
    NoUpcomingOccurrence { expr: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;
