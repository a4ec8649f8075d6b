//! Collaborator seams the host application plugs into.

/// External timer registrations keyed by task name.
///
/// Both operations are side-effecting and fire-and-forget; implementations
/// must not block or fail the caller.
pub trait TimerRegistry: Send + Sync {
    /// Cancel the one-shot timer registration for `name`, if any. Called
    /// when a one-shot task is dispatched.
    fn clear_one_shot(&self, name: &str);

    /// Register (or refresh) a recurring timer for `name`. Called when a
    /// recurring task is created.
    fn register_recurring(&self, name: &str, payload: &str, cron_expr: &str);
}

/// Registry that does nothing. For tests and hosts without external timers.
#[derive(Debug, Default)]
pub struct NullTimerRegistry;

impl TimerRegistry for NullTimerRegistry {
    fn clear_one_shot(&self, _name: &str) {}
    fn register_recurring(&self, _name: &str, _payload: &str, _cron_expr: &str) {}
}
