//! `taskloop-store` — the persisted task table.
//!
//! Tasks live in a SQLite `tasks` table. A task is either *one-shot*
//! (`crontab` NULL or empty — runs once, then sits until it expires or is
//! deleted) or *recurring* (`crontab` set — the scheduler advances
//! `runtime`/`expire` to the next occurrence on every dispatch).
//!
//! All timestamps are stored as RFC-3339 TEXT in UTC, so `<`/`<=` in SQL
//! compares chronologically.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::TaskStore;
pub use types::{NewTask, Task};
