//! Notification types — shared between the worker pool and whatever surface
//! the host application uses to show operator-facing alerts.

use serde::{Deserialize, Serialize};

/// Severity of an operator-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Fire-and-forget sink for operator notifications (e.g. pool resets).
///
/// Implementations must not block and must not fail the caller; delivery
/// problems are theirs to swallow.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, title: &str, message: &str, severity: Severity, source: &str);
}

/// Sink that drops everything. Useful for tests and embedding contexts that
/// have no alerting surface.
#[derive(Debug, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _title: &str, _message: &str, _severity: Severity, _source: &str) {}
}
