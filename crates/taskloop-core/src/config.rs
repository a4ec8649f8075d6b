use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default eligibility window: a task may run for this long past its
/// `runtime` before the purge step discards it.
pub const DEFAULT_EXPIRE_WINDOW_SECS: u64 = 1800;
/// Polling cadence of the scheduler loop.
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 1;
/// Fixed worker count of the execution pool.
pub const DEFAULT_POOL_CAPACITY: usize = 20;
/// Retained samples in the execution-time window and the history ring.
pub const STATS_WINDOW: usize = 100;

/// Top-level config (taskloop.toml + TASKLOOP_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskloopConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub pool: PoolConfig,
}

impl Default for TaskloopConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between polling ticks.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Seconds added to a task's runtime to form its expiry deadline.
    #[serde(default = "default_expire_window")]
    pub expire_window_secs: u64,
    /// When true, a one-shot task is deleted from the store right after
    /// dispatch. When false (default, matching the legacy behavior) the
    /// record stays and is re-selected every tick until it expires or is
    /// removed by hand.
    #[serde(default)]
    pub delete_oneshot_after_dispatch: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            expire_window_secs: default_expire_window(),
            delete_oneshot_after_dispatch: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Fixed worker count. Not resized at runtime.
    #[serde(default = "default_pool_capacity")]
    pub capacity: usize,
    /// Buffer size of the pool event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: default_pool_capacity(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.taskloop/taskloop.db", home)
}
fn default_tick_interval() -> u64 {
    DEFAULT_TICK_INTERVAL_SECS
}
fn default_expire_window() -> u64 {
    DEFAULT_EXPIRE_WINDOW_SECS
}
fn default_pool_capacity() -> usize {
    DEFAULT_POOL_CAPACITY
}
fn default_event_buffer() -> usize {
    256
}

impl TaskloopConfig {
    /// Load config from a TOML file with TASKLOOP_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.taskloop/taskloop.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TaskloopConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TASKLOOP_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.taskloop/taskloop.toml", home)
}
