//! Log-backed implementations of the collaborator seams, for hosts that
//! have no external alerting or timer machinery.

use tracing::{debug, error, info, warn};

use taskloop_core::notify::{NotificationSink, Severity};
use taskloop_engine::TimerRegistry;
use taskloop_pool::PoolEvent;

/// Routes notifications into the log at the matching level.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, title: &str, message: &str, severity: Severity, source: &str) {
        match severity {
            Severity::Info => info!(%source, "{title}: {message}"),
            Severity::Warning => warn!(%source, "{title}: {message}"),
            Severity::Error => error!(%source, "{title}: {message}"),
        }
    }
}

/// Timer registry that only records the calls.
pub struct LogTimerRegistry;

impl TimerRegistry for LogTimerRegistry {
    fn clear_one_shot(&self, name: &str) {
        debug!(task = %name, "one-shot timer cleared");
    }
    fn register_recurring(&self, name: &str, _payload: &str, cron_expr: &str) {
        debug!(task = %name, cron = %cron_expr, "recurring timer registered");
    }
}

/// Drain the pool's event channel into the log. Runs until the pool side
/// closes the channel.
pub async fn log_pool_events(mut rx: tokio::sync::mpsc::Receiver<PoolEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            PoolEvent::Started { ref task_id, .. } => debug!(task = %task_id, "task started"),
            PoolEvent::Finished {
                ref task_id,
                duration_secs,
                success,
            } => {
                debug!(task = %task_id, duration_secs, success, "task finished");
            }
            PoolEvent::Reset { ref reason } => warn!(%reason, "worker pool reset"),
        }
    }
}
