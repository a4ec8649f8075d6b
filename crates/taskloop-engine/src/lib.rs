//! `taskloop-engine` — the polling scheduler loop.
//!
//! # Overview
//!
//! One tick = purge + select + dispatch + reschedule:
//!
//! 1. Delete every task whose `expire` has passed (never executed).
//! 2. Select tasks whose `runtime` has arrived.
//! 3. For each, persist `started`, then commit the next cron occurrence
//!    (recurring) or clear the external one-shot timer (one-shot), and only
//!    then hand the payload to the worker pool, fire-and-forget.
//! 4. Sleep ~1 s, interruptibly, and go again.
//!
//! Committing the next occurrence *before* dispatch means a slow or crashing
//! payload can never cause a recurring task to be picked up twice by
//! consecutive ticks.

pub mod cron;
pub mod engine;
pub mod error;
pub mod traits;

pub use engine::SchedulerEngine;
pub use error::{EngineError, Result};
pub use traits::{NullTimerRegistry, TimerRegistry};
