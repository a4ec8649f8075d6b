use rusqlite::Connection;

use crate::error::Result;

/// Initialise the task schema in `conn`.
///
/// Creates the `tasks` table (idempotent) and an index on `runtime` so the
/// per-second polling query stays cheap with thousands of rows.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tasks (
            id       INTEGER PRIMARY KEY AUTOINCREMENT,
            name     TEXT    NOT NULL,
            code     TEXT    NOT NULL,
            crontab  TEXT,               -- NULL/empty means one-shot
            runtime  TEXT    NOT NULL,   -- RFC-3339 UTC: eligible at/after
            expire   TEXT    NOT NULL,   -- RFC-3339 UTC: purged after
            started  TEXT                -- RFC-3339 UTC of last dispatch
        ) STRICT;

        -- Efficient polling: SELECT … WHERE runtime <= ?
        CREATE INDEX IF NOT EXISTS idx_tasks_runtime ON tasks (runtime);
        ",
    )?;
    Ok(())
}
