use async_trait::async_trait;

/// One unit of work, passed by value into the pool.
///
/// Bundling the payload with its task ID up front avoids capturing loop
/// variables in closures at dispatch time.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Statistics/logging key — the task's name.
    pub task_id: String,
    /// Opaque executable payload.
    pub payload: String,
}

impl WorkItem {
    pub fn new(task_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            payload: payload.into(),
        }
    }
}

/// Boundary to the host's code runner.
///
/// Failures are reported through the returned flag, not by panicking; a
/// panic that escapes anyway is caught by the pool and counted as a failure.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Run the payload, returning `(result, success)`.
    async fn run(&self, payload: &str) -> (String, bool);
}
