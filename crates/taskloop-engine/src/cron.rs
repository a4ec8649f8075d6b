//! Next-occurrence resolution for cron expressions. Pure; all math in UTC.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::{EngineError, Result};

/// Return the first occurrence of `expr` strictly after `after`.
///
/// Expressions use the six/seven-field form of the `cron` crate
/// (`sec min hour day-of-month month day-of-week [year]`), so
/// `*/5 * * * * *` fires every five seconds.
pub fn next_occurrence(expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let schedule = Schedule::from_str(expr).map_err(|e| EngineError::InvalidCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })?;
    schedule
        .after(&after)
        .next()
        .ok_or_else(|| EngineError::NoUpcomingOccurrence {
            expr: expr.to_string(),
        })
}
