use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, OptionalExtension, TransactionBehavior, params};
use strata_common::{Direction, Error, Operation, Result, RevisionId, marker_label};
use tracing::{debug, info};
use uuid::Uuid;

use crate::journal::{self, JournalAction, JournalEntry};
use crate::lock::{self, LockInfo, RunLock};
use crate::{ddl, version_table};

/// Options for opening a target store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub version_table: String,
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            version_table: version_table::DEFAULT_VERSION_TABLE.to_string(),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
struct Tables {
    version: String,
    lock: String,
    journal: String,
}

impl Tables {
    fn new(version: &str) -> Result<Self> {
        version_table::validate_table_name(version)?;
        Ok(Self {
            version: version.to_string(),
            lock: format!("{version}_lock"),
            journal: format!("{version}_journal"),
        })
    }

    fn contains(&self, name: &str) -> bool {
        name == self.version || name == self.lock || name == self.journal
    }
}

/// One step handed to the store for a transactional commit.
#[derive(Debug, Clone, Copy)]
pub struct StepCommit<'a> {
    pub revision: &'a RevisionId,
    pub direction: Direction,
    pub operations: &'a [Operation],
    pub marker_before: Option<&'a RevisionId>,
    pub marker_after: Option<&'a RevisionId>,
}

/// SQLite database that migrations are applied to. Holds the schema, the
/// applied-revision marker, the run lock and the journal.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    tables: Tables,
    read_only: bool,
}

impl SqliteStore {
    pub const DIALECT: &'static str = "sqlite";

    pub fn open(db_path: &Path, options: &StoreOptions) -> Result<Self> {
        info!("opening target store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;
        Self::init(conn, options)
    }

    /// Open without creating the file, the engine tables or the WAL. A
    /// missing file or version table reads as an empty store. Writes are
    /// refused.
    pub fn open_read_only(db_path: &Path, options: &StoreOptions) -> Result<Self> {
        let tables = Tables::new(&options.version_table)?;
        let conn = if db_path.exists() {
            debug!("opening target store at {} read-only", db_path.display());
            Connection::open_with_flags(
                db_path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        } else {
            debug!("{} does not exist, reading as empty", db_path.display());
            Connection::open_in_memory()
        }
        .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;
        conn.busy_timeout(options.busy_timeout)
            .map_err(|e| Error::Database(format!("failed to set busy timeout: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
            tables,
            read_only: true,
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::in_memory_with(&StoreOptions::default())
    }

    pub fn in_memory_with(options: &StoreOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        Self::init(conn, options)
    }

    fn init(conn: Connection, options: &StoreOptions) -> Result<Self> {
        let tables = Tables::new(&options.version_table)?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;
        conn.busy_timeout(options.busy_timeout)
            .map_err(|e| Error::Database(format!("failed to set busy timeout: {e}")))?;

        version_table::ensure(&conn, &tables.version)?;
        lock::ensure(&conn, &tables.lock)?;
        journal::ensure(&conn, &tables.journal)?;

        Ok(Self {
            conn: Mutex::new(conn),
            tables,
            read_only: false,
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("target store lock poisoned".into()))
    }

    fn writable(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::Database("target store is open read-only".into()));
        }
        Ok(())
    }

    pub fn version_table(&self) -> &str {
        &self.tables.version
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// The applied-revision marker, `None` when nothing was ever applied.
    pub fn current(&self) -> Result<Option<RevisionId>> {
        let conn = self.connection()?;
        if self.read_only && !has_object(&conn, "table", &self.tables.version)? {
            return Ok(None);
        }
        version_table::read(&conn, &self.tables.version)
    }

    /// Run one step inside its own transaction: check the marker, run the
    /// operations, advance the marker and journal the step, then commit.
    /// Any failure rolls the whole step back.
    pub fn apply_step(&self, step: &StepCommit<'_>) -> Result<()> {
        self.writable()?;
        let mut conn = self.connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;

        let found = version_table::read(&tx, &self.tables.version)?;
        if found.as_ref() != step.marker_before {
            return Err(Error::MarkerMismatch {
                expected: marker_label(step.marker_before),
                found: marker_label(found.as_ref()),
            });
        }

        let failed = |reason: String| Error::ActionFailed {
            revision: step.revision.to_string(),
            direction: step.direction.to_string(),
            reason,
        };

        for op in step.operations {
            if !op.applies_to(Self::DIALECT) {
                debug!("{} {}: skipping {}", step.direction, step.revision, op.describe());
                continue;
            }
            let sql = ddl::render(op).map_err(|e| failed(format!("{}: {e}", op.describe())))?;
            debug!("{} {}: {}", step.direction, step.revision, op.describe());
            tx.execute_batch(&sql)
                .map_err(|e| failed(format!("{}: {e}", op.describe())))?;
        }

        version_table::write(&tx, &self.tables.version, step.marker_after)
            .map_err(|e| failed(e.to_string()))?;
        let action = match step.direction {
            Direction::Upgrade => JournalAction::Upgrade,
            Direction::Downgrade => JournalAction::Downgrade,
        };
        journal::append(
            &tx,
            &self.tables.journal,
            action,
            Some(step.revision),
            step.marker_before,
            step.marker_after,
        )
        .map_err(|e| failed(e.to_string()))?;

        tx.commit().map_err(|e| failed(format!("commit: {e}")))
    }

    /// Overwrite the marker without running any operation.
    pub fn stamp(&self, marker: Option<&RevisionId>) -> Result<Option<RevisionId>> {
        self.writable()?;
        let mut conn = self.connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;

        let previous = version_table::read(&tx, &self.tables.version)?;
        version_table::write(&tx, &self.tables.version, marker)?;
        journal::append(
            &tx,
            &self.tables.journal,
            JournalAction::Stamp,
            marker,
            previous.as_ref(),
            marker,
        )?;
        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit stamp: {e}")))?;

        info!(
            "stamped {} (was {})",
            marker_label(marker),
            marker_label(previous.as_ref())
        );
        Ok(previous)
    }

    /// Take the exclusive run lock for the duration of the returned guard.
    pub fn lock(&self) -> Result<RunLock<'_>> {
        self.writable()?;
        let holder = Uuid::new_v4().to_string();
        let conn = self.connection()?;
        lock::try_acquire(&conn, &self.tables.lock, &holder)?;
        Ok(RunLock::new(self, holder))
    }

    pub(crate) fn release_lock(&self, holder: &str) -> Result<()> {
        let conn = self.connection()?;
        lock::release(&conn, &self.tables.lock, holder)
    }

    pub fn lock_info(&self) -> Result<Option<LockInfo>> {
        let conn = self.connection()?;
        lock::current(&conn, &self.tables.lock)
    }

    /// Clear a lock left behind by a run that died. Returns whether one existed.
    pub fn force_unlock(&self) -> Result<bool> {
        self.writable()?;
        let conn = self.connection()?;
        let removed = lock::clear(&conn, &self.tables.lock)?;
        if removed {
            info!("cleared stale run lock");
        }
        Ok(removed)
    }

    pub fn journal(&self, limit: usize) -> Result<Vec<JournalEntry>> {
        let conn = self.connection()?;
        journal::recent(&conn, &self.tables.journal, limit)
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let conn = self.connection()?;
        has_object(&conn, "table", name)
    }

    pub fn index_exists(&self, name: &str) -> Result<bool> {
        let conn = self.connection()?;
        has_object(&conn, "index", name)
    }

    pub fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        let conn = self.connection()?;
        let found: Option<String> = conn
            .query_row(
                "SELECT name FROM pragma_table_info(?1) WHERE name = ?2",
                params![table, column],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to check column: {e}")))?;
        Ok(found.is_some())
    }

    /// Names of user tables, excluding SQLite internals and the engine's own tables.
    pub fn user_tables(&self) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Database(format!("failed to list tables: {e}")))?;

        let mut tables = Vec::new();
        for row in rows {
            let name = row.map_err(|e| Error::Database(format!("failed to read table row: {e}")))?;
            if !self.tables.contains(&name) {
                tables.push(name);
            }
        }
        Ok(tables)
    }

    /// Structural snapshot of user tables (with their columns in order) and
    /// indexes, used to compare store states.
    pub fn schema_snapshot(&self) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT type, name, tbl_name FROM sqlite_master
                 WHERE type IN ('table', 'index') AND name NOT LIKE 'sqlite_%'
                 ORDER BY type, name",
            )
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| Error::Database(format!("failed to read schema: {e}")))?;

        let mut objects = Vec::new();
        for row in rows {
            objects.push(
                row.map_err(|e| Error::Database(format!("failed to read schema row: {e}")))?,
            );
        }

        let mut snapshot = Vec::with_capacity(objects.len());
        for (kind, name, table) in objects {
            if self.tables.contains(&table) {
                continue;
            }
            if kind == "table" {
                let columns = column_names(&conn, &name)?;
                snapshot.push(format!("table {name}({})", columns.join(", ")));
            } else {
                snapshot.push(format!("index {name} on {table}"));
            }
        }
        Ok(snapshot)
    }
}

fn has_object(conn: &Connection, kind: &str, name: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
            params![kind, name],
            |row| row.get(0),
        )
        .map_err(|e| Error::Database(format!("failed to check {kind} {name}: {e}")))?;
    Ok(count > 0)
}

fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
        .map_err(|e| Error::Database(format!("failed to prepare column query: {e}")))?;
    let rows = stmt
        .query_map(params![table], |row| row.get::<_, String>(0))
        .map_err(|e| Error::Database(format!("failed to list columns of {table}: {e}")))?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row.map_err(|e| Error::Database(format!("failed to read column row: {e}")))?);
    }
    Ok(columns)
}
