use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use strata_common::{Error, Result};
use tracing::{debug, warn};

use crate::ddl::quote_ident;
use crate::store::SqliteStore;

/// Who holds the run lock and since when.
#[derive(Debug, Clone)]
pub struct LockInfo {
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
}

/// Exclusive run lock on a store. Released when dropped.
///
/// The lock is a single row in the store itself, so it serializes runs
/// across processes as well as within one.
pub struct RunLock<'a> {
    store: &'a SqliteStore,
    holder: String,
}

impl<'a> RunLock<'a> {
    pub(crate) fn new(store: &'a SqliteStore, holder: String) -> Self {
        Self { store, holder }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }
}

impl Drop for RunLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.release_lock(&self.holder) {
            warn!("failed to release run lock {}: {e}", self.holder);
        }
    }
}

pub(crate) fn ensure(conn: &Connection, table: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            holder TEXT NOT NULL,
            acquired_at TEXT NOT NULL
        );",
        quote_ident(table)
    ))
    .map_err(|e| Error::Database(format!("failed to create lock table: {e}")))
}

pub(crate) fn try_acquire(conn: &Connection, table: &str, holder: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let result = conn.execute(
        &format!(
            "INSERT INTO {} (id, holder, acquired_at) VALUES (1, ?1, ?2)",
            quote_ident(table)
        ),
        params![holder, now],
    );

    match result {
        Ok(_) => {
            debug!("run lock acquired by {holder}");
            Ok(())
        }
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation =>
        {
            let info = current(conn, table)?;
            let (holder, since) = match info {
                Some(info) => (info.holder, info.acquired_at.to_rfc3339()),
                None => ("unknown".to_string(), "unknown".to_string()),
            };
            Err(Error::Locked { holder, since })
        }
        Err(e) => Err(Error::Database(format!("failed to acquire run lock: {e}"))),
    }
}

pub(crate) fn release(conn: &Connection, table: &str, holder: &str) -> Result<()> {
    conn.execute(
        &format!("DELETE FROM {} WHERE id = 1 AND holder = ?1", quote_ident(table)),
        params![holder],
    )
    .map_err(|e| Error::Database(format!("failed to release run lock: {e}")))?;
    debug!("run lock released by {holder}");
    Ok(())
}

/// Remove the lock row regardless of holder. Returns whether a row existed.
pub(crate) fn clear(conn: &Connection, table: &str) -> Result<bool> {
    let removed = conn
        .execute(&format!("DELETE FROM {}", quote_ident(table)), [])
        .map_err(|e| Error::Database(format!("failed to clear run lock: {e}")))?;
    Ok(removed > 0)
}

pub(crate) fn current(conn: &Connection, table: &str) -> Result<Option<LockInfo>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT holder, acquired_at FROM {} WHERE id = 1",
                quote_ident(table)
            ),
            [],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to read run lock: {e}")))?;

    row.map(|(holder, acquired_at)| {
        Ok(LockInfo {
            acquired_at: crate::journal::parse_datetime("run lock", &acquired_at)?,
            holder,
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "strata_version_lock";

    fn conn_with_table() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure(&conn, TABLE).unwrap();
        conn
    }

    #[test]
    fn second_acquire_reports_holder() {
        let conn = conn_with_table();
        try_acquire(&conn, TABLE, "run-a").unwrap();

        match try_acquire(&conn, TABLE, "run-b") {
            Err(Error::Locked { holder, .. }) => assert_eq!(holder, "run-a"),
            other => panic!("expected Locked, got {other:?}"),
        }
    }

    #[test]
    fn release_only_frees_own_lock() {
        let conn = conn_with_table();
        try_acquire(&conn, TABLE, "run-a").unwrap();

        release(&conn, TABLE, "run-b").unwrap();
        assert_eq!(current(&conn, TABLE).unwrap().unwrap().holder, "run-a");

        release(&conn, TABLE, "run-a").unwrap();
        assert!(current(&conn, TABLE).unwrap().is_none());
        try_acquire(&conn, TABLE, "run-b").unwrap();
    }

    #[test]
    fn clear_removes_stale_lock() {
        let conn = conn_with_table();
        assert!(!clear(&conn, TABLE).unwrap());
        try_acquire(&conn, TABLE, "crashed-run").unwrap();
        assert!(clear(&conn, TABLE).unwrap());
        assert!(current(&conn, TABLE).unwrap().is_none());
    }
}
