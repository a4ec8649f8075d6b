use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, instrument};

use crate::error::{Result, StoreError};
use crate::types::Task;

const TASK_COLUMNS: &str = "id, name, code, crontab, runtime, expire, started";

/// Thread-safe store for persisted tasks.
///
/// Wraps a single SQLite connection in a `Mutex`. The scheduler engine and
/// any admin surface can each hold their own `TaskStore` over separate
/// connections to the same database file.
pub struct TaskStore {
    db: Mutex<Connection>,
}

impl TaskStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Delete every task whose `expire` has passed. Returns the number of
    /// rows removed. Runs unconditionally at the start of each tick, so an
    /// expired-and-never-run task is dropped without execution.
    #[instrument(skip(self))]
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "DELETE FROM tasks WHERE expire < ?1",
            rusqlite::params![now.to_rfc3339()],
        )?;
        if n > 0 {
            debug!(purged = n, "expired tasks removed");
        }
        Ok(n)
    }

    /// All tasks whose `runtime` has arrived, in row order. No priority
    /// ordering is promised.
    #[instrument(skip(self))]
    pub fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE runtime <= ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(rusqlite::params![now.to_rfc3339()], row_to_task)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Record the dispatch time. Persisted before the work is submitted so a
    /// crash mid-tick leaves evidence of the attempt.
    pub fn mark_started(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE tasks SET started = ?1 WHERE id = ?2",
            rusqlite::params![now.to_rfc3339(), id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound { id });
        }
        Ok(())
    }

    /// Commit the next occurrence of a recurring task. Called before the
    /// current invocation is handed to the pool, so a slow run cannot be
    /// re-selected by the next tick.
    pub fn reschedule(&self, id: i64, runtime: DateTime<Utc>, expire: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE tasks SET runtime = ?1, expire = ?2 WHERE id = ?3",
            rusqlite::params![runtime.to_rfc3339(), expire.to_rfc3339(), id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound { id });
        }
        Ok(())
    }

    /// Insert a new task with fully resolved fields. Returns the record with
    /// its store-assigned ID.
    #[instrument(skip(self, code))]
    pub fn insert(
        &self,
        name: &str,
        code: &str,
        crontab: Option<&str>,
        runtime: DateTime<Utc>,
        expire: DateTime<Utc>,
    ) -> Result<Task> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO tasks (name, code, crontab, runtime, expire, started)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
            rusqlite::params![name, code, crontab, runtime.to_rfc3339(), expire.to_rfc3339()],
        )?;
        let id = db.last_insert_rowid();
        debug!(task_id = id, name, "task inserted");
        Ok(Task {
            id,
            name: name.to_string(),
            code: code.to_string(),
            crontab: crontab.map(String::from),
            runtime,
            expire,
            started: None,
        })
    }

    /// Overwrite every mutable field of an existing task.
    pub fn save(&self, task: &Task) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE tasks
             SET name = ?1, code = ?2, crontab = ?3,
                 runtime = ?4, expire = ?5, started = ?6
             WHERE id = ?7",
            rusqlite::params![
                task.name,
                task.code,
                task.crontab,
                task.runtime.to_rfc3339(),
                task.expire.to_rfc3339(),
                task.started.map(|t| t.to_rfc3339()),
                task.id,
            ],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound { id: task.id });
        }
        Ok(())
    }

    /// Remove a task by ID. Returns whether a row was deleted.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let n = db.execute("DELETE FROM tasks WHERE id = ?1", rusqlite::params![id])?;
        Ok(n > 0)
    }

    /// Retrieve a task by ID, returning `None` if it does not exist.
    pub fn get(&self, id: i64) -> Result<Option<Task>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            rusqlite::params![id],
            row_to_task,
        ) {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Return all known tasks in row order.
    pub fn list(&self) -> Result<Vec<Task>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY id"))?;
        let rows = stmt.query_map([], row_to_task)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Total task count (dashboard counter).
    pub fn count(&self) -> Result<u64> {
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Substring search over task names and code payloads, for the host's
    /// global search surface.
    #[instrument(skip(self))]
    pub fn search(&self, query: &str) -> Result<Vec<Task>> {
        let pattern = format!("%{query}%");
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE name LIKE ?1 OR code LIKE ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(rusqlite::params![pattern], row_to_task)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Count of recurring tasks (dashboard counter).
    pub fn count_recurring(&self) -> Result<u64> {
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM tasks WHERE crontab IS NOT NULL AND crontab != ''",
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
        crontab: row.get(3)?,
        runtime: parse_ts(4, &row.get::<_, String>(4)?)?,
        expire: parse_ts(5, &row.get::<_, String>(5)?)?,
        started: match row.get::<_, Option<String>>(6)? {
            Some(s) => Some(parse_ts(6, &s)?),
            None => None,
        },
    })
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn mem_store() -> TaskStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        TaskStore::new(conn)
    }

    fn insert_at(
        store: &TaskStore,
        name: &str,
        runtime: DateTime<Utc>,
        expire: DateTime<Utc>,
    ) -> Task {
        store.insert(name, "noop", None, runtime, expire).unwrap()
    }

    #[test]
    fn purge_removes_only_expired() {
        let store = mem_store();
        let now = Utc::now();
        insert_at(&store, "dead", now - Duration::hours(2), now - Duration::hours(1));
        let alive = insert_at(&store, "alive", now, now + Duration::hours(1));

        let purged = store.purge_expired(now).unwrap();
        assert_eq!(purged, 1);

        let remaining = store.list().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, alive.id);
    }

    #[test]
    fn expired_task_is_purged_regardless_of_runtime() {
        // Due AND expired: the purge step wins.
        let store = mem_store();
        let now = Utc::now();
        insert_at(&store, "late", now - Duration::minutes(30), now - Duration::seconds(1));

        store.purge_expired(now).unwrap();
        assert!(store.list_due(now).unwrap().is_empty());
    }

    #[test]
    fn list_due_selects_runtime_at_or_before_now() {
        let store = mem_store();
        let now = Utc::now();
        let due = insert_at(&store, "due", now - Duration::seconds(10), now + Duration::hours(1));
        insert_at(&store, "future", now + Duration::minutes(5), now + Duration::hours(1));

        let tasks = store.list_due(now).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, due.id);
    }

    #[test]
    fn mark_started_persists() {
        let store = mem_store();
        let now = Utc::now();
        let t = insert_at(&store, "t", now, now + Duration::hours(1));
        store.mark_started(t.id, now).unwrap();

        let got = store.get(t.id).unwrap().unwrap();
        assert_eq!(got.started.unwrap().timestamp(), now.timestamp());
    }

    #[test]
    fn mark_started_unknown_id_is_not_found() {
        let store = mem_store();
        let err = store.mark_started(999, Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id: 999 }));
    }

    #[test]
    fn reschedule_moves_task_out_of_due_set() {
        let store = mem_store();
        let now = Utc::now();
        let t = insert_at(&store, "r", now - Duration::seconds(1), now + Duration::hours(1));
        assert_eq!(store.list_due(now).unwrap().len(), 1);

        let next = now + Duration::seconds(5);
        store
            .reschedule(t.id, next, next + Duration::seconds(1800))
            .unwrap();

        assert!(store.list_due(now).unwrap().is_empty());
        let got = store.get(t.id).unwrap().unwrap();
        assert_eq!(got.runtime.timestamp(), next.timestamp());
        assert_eq!(got.expire.timestamp(), (next + Duration::seconds(1800)).timestamp());
    }

    #[test]
    fn delete_reports_whether_row_existed() {
        let store = mem_store();
        let now = Utc::now();
        let t = insert_at(&store, "d", now, now + Duration::hours(1));
        assert!(store.delete(t.id).unwrap());
        assert!(!store.delete(t.id).unwrap());
    }

    #[test]
    fn search_matches_name_or_code_substring() {
        let store = mem_store();
        let now = Utc::now();
        store
            .insert("backup-nightly", "run_backup()", None, now, now + Duration::hours(1))
            .unwrap();
        store
            .insert("report", "send_backup_report()", None, now, now + Duration::hours(1))
            .unwrap();
        store
            .insert("unrelated", "noop", None, now, now + Duration::hours(1))
            .unwrap();

        let hits = store.search("backup").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].name, "backup-nightly");
        assert_eq!(hits[1].name, "report");

        assert!(store.search("no-such-task").unwrap().is_empty());
    }

    #[test]
    fn counts_distinguish_recurring() {
        let store = mem_store();
        let now = Utc::now();
        insert_at(&store, "one", now, now + Duration::hours(1));
        store
            .insert("rec", "noop", Some("*/5 * * * * *"), now, now + Duration::hours(1))
            .unwrap();
        store
            .insert("empty", "noop", Some(""), now, now + Duration::hours(1))
            .unwrap();

        assert_eq!(store.count().unwrap(), 3);
        assert_eq!(store.count_recurring().unwrap(), 1);
    }
}
