use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use strata_common::{Error, Result, RevisionId};

use crate::ddl::quote_ident;

/// What a journal row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalAction {
    Upgrade,
    Downgrade,
    Stamp,
}

impl JournalAction {
    fn as_str(&self) -> &'static str {
        match self {
            JournalAction::Upgrade => "upgrade",
            JournalAction::Downgrade => "downgrade",
            JournalAction::Stamp => "stamp",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "upgrade" => Some(JournalAction::Upgrade),
            "downgrade" => Some(JournalAction::Downgrade),
            "stamp" => Some(JournalAction::Stamp),
            _ => None,
        }
    }
}

impl fmt::Display for JournalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed step (or stamp), newest rows have the highest `seq`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: i64,
    pub action: JournalAction,
    pub revision: Option<RevisionId>,
    pub marker_before: Option<RevisionId>,
    pub marker_after: Option<RevisionId>,
    pub applied_at: DateTime<Utc>,
}

pub(crate) fn ensure(conn: &Connection, table: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            action TEXT NOT NULL,
            revision TEXT,
            marker_before TEXT,
            marker_after TEXT,
            applied_at TEXT NOT NULL
        );",
        quote_ident(table)
    ))
    .map_err(|e| Error::Database(format!("failed to create journal table: {e}")))
}

pub(crate) fn append(
    conn: &Connection,
    table: &str,
    action: JournalAction,
    revision: Option<&RevisionId>,
    marker_before: Option<&RevisionId>,
    marker_after: Option<&RevisionId>,
) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {} (action, revision, marker_before, marker_after, applied_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            quote_ident(table)
        ),
        params![
            action.as_str(),
            revision.map(|r| r.as_str()),
            marker_before.map(|r| r.as_str()),
            marker_after.map(|r| r.as_str()),
            Utc::now().to_rfc3339(),
        ],
    )
    .map_err(|e| Error::Database(format!("failed to append journal entry: {e}")))?;
    Ok(())
}

pub(crate) fn recent(conn: &Connection, table: &str, limit: usize) -> Result<Vec<JournalEntry>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT seq, action, revision, marker_before, marker_after, applied_at
             FROM {}
             ORDER BY seq DESC
             LIMIT ?1",
            quote_ident(table)
        ))
        .map_err(|e| Error::Database(format!("failed to prepare journal query: {e}")))?;

    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })
        .map_err(|e| Error::Database(format!("failed to query journal: {e}")))?;

    let mut entries = Vec::new();
    for row in rows {
        let (seq, action, revision, before, after, applied_at) =
            row.map_err(|e| Error::Database(format!("failed to read journal row: {e}")))?;
        let action = JournalAction::parse(&action).ok_or_else(|| {
            Error::Database(format!("journal row {seq} has unknown action {action:?}"))
        })?;
        entries.push(JournalEntry {
            seq,
            action,
            revision: parse_revision(revision)?,
            marker_before: parse_revision(before)?,
            marker_after: parse_revision(after)?,
            applied_at: parse_datetime(&format!("journal row {seq}"), &applied_at)?,
        });
    }
    Ok(entries)
}

fn parse_revision(raw: Option<String>) -> Result<Option<RevisionId>> {
    raw.map(|s| {
        RevisionId::parse(s.clone())
            .map_err(|_| Error::Database(format!("journal holds invalid revision {s:?}")))
    })
    .transpose()
}

/// Timestamps are written as RFC 3339. Anything else means a corrupt row.
pub(crate) fn parse_datetime(what: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Database(format!("{what} has bad timestamp {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "strata_version_journal";

    fn rev(s: &str) -> RevisionId {
        RevisionId::parse(s).unwrap()
    }

    #[test]
    fn recent_returns_newest_first() {
        let conn = Connection::open_in_memory().unwrap();
        ensure(&conn, TABLE).unwrap();

        append(
            &conn,
            TABLE,
            JournalAction::Upgrade,
            Some(&rev("001")),
            None,
            Some(&rev("001")),
        )
        .unwrap();
        append(
            &conn,
            TABLE,
            JournalAction::Upgrade,
            Some(&rev("002")),
            Some(&rev("001")),
            Some(&rev("002")),
        )
        .unwrap();
        append(&conn, TABLE, JournalAction::Stamp, None, Some(&rev("002")), None).unwrap();

        let entries = recent(&conn, TABLE, 10).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].action, JournalAction::Stamp);
        assert!(entries[0].marker_after.is_none());
        assert_eq!(entries[1].revision, Some(rev("002")));
        assert_eq!(entries[2].marker_before, None);

        let limited = recent(&conn, TABLE, 1).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].seq, entries[0].seq);
    }

    #[test]
    fn corrupt_timestamp_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        ensure(&conn, TABLE).unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} (action, revision, applied_at) VALUES ('stamp', '001', 'soon')",
                quote_ident(TABLE)
            ),
            [],
        )
        .unwrap();

        match recent(&conn, TABLE, 10) {
            Err(Error::Database(msg)) => assert!(msg.contains("bad timestamp"), "{msg}"),
            other => panic!("expected Database error, got {other:?}"),
        }
    }

    #[test]
    fn parses_rfc3339_timestamps() {
        let dt = parse_datetime("row", "2026-02-23T10:15:00+01:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-02-23T09:15:00+00:00");
    }
}
