//! Applied-revision marker storage.
//!
//! The marker lives in a one-row table inside the target database, so it is
//! written under the same transaction as the schema change it records.
//! No row means no migration has ever been applied.

use rusqlite::{Connection, params};
use strata_common::{Error, Result, RevisionId};

use crate::ddl::quote_ident;

pub const DEFAULT_VERSION_TABLE: &str = "strata_version";

/// Reject anything that is not a plain SQL identifier.
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::Config(format!(
            "version table name {name:?} is not a plain identifier"
        )));
    }
    if name.len() > 58 {
        return Err(Error::Config(format!("version table name {name:?} is too long")));
    }
    Ok(())
}

pub(crate) fn ensure(conn: &Connection, table: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            version_num VARCHAR(64) NOT NULL PRIMARY KEY
        );",
        quote_ident(table)
    ))
    .map_err(|e| Error::Database(format!("failed to create version table: {e}")))
}

/// Read the marker. `None` when nothing has been applied.
pub fn read(conn: &Connection, table: &str) -> Result<Option<RevisionId>> {
    let mut stmt = conn
        .prepare(&format!("SELECT version_num FROM {} LIMIT 2", quote_ident(table)))
        .map_err(|e| Error::Database(format!("failed to prepare marker query: {e}")))?;

    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| Error::Database(format!("failed to read marker: {e}")))?;

    let mut values = Vec::new();
    for row in rows {
        values.push(row.map_err(|e| Error::Database(format!("failed to read marker row: {e}")))?);
    }

    match values.len() {
        0 => Ok(None),
        1 => {
            let raw = values.remove(0);
            RevisionId::parse(raw.clone())
                .map(Some)
                .map_err(|_| Error::Database(format!("stored marker {raw:?} is not a revision id")))
        }
        _ => Err(Error::Database(format!(
            "version table {table} holds more than one row"
        ))),
    }
}

/// Replace the marker. Writing `None` empties the table.
pub fn write(conn: &Connection, table: &str, marker: Option<&RevisionId>) -> Result<()> {
    let table = quote_ident(table);
    conn.execute(&format!("DELETE FROM {table}"), [])
        .map_err(|e| Error::Database(format!("failed to clear marker: {e}")))?;
    if let Some(revision) = marker {
        conn.execute(
            &format!("INSERT INTO {table} (version_num) VALUES (?1)"),
            params![revision.as_str()],
        )
        .map_err(|e| Error::Database(format!("failed to write marker: {e}")))?;
    }
    Ok(())
}

/// The statements `write` would run, with the marker inlined. Used when
/// rendering a plan as a script instead of running it.
pub fn write_sql(table: &str, marker: Option<&RevisionId>) -> Vec<String> {
    let table = quote_ident(table);
    let mut sql = vec![format!("DELETE FROM {table};")];
    if let Some(revision) = marker {
        sql.push(format!(
            "INSERT INTO {table} (version_num) VALUES ('{}');",
            revision.as_str().replace('\'', "''")
        ));
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn_with_table() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure(&conn, DEFAULT_VERSION_TABLE).unwrap();
        conn
    }

    #[test]
    fn empty_table_reads_as_none() {
        let conn = conn_with_table();
        assert!(read(&conn, DEFAULT_VERSION_TABLE).unwrap().is_none());
    }

    #[test]
    fn write_then_read_returns_marker() {
        let conn = conn_with_table();
        let rev = RevisionId::parse("012").unwrap();
        write(&conn, DEFAULT_VERSION_TABLE, Some(&rev)).unwrap();
        assert_eq!(read(&conn, DEFAULT_VERSION_TABLE).unwrap(), Some(rev));

        let next = RevisionId::parse("013").unwrap();
        write(&conn, DEFAULT_VERSION_TABLE, Some(&next)).unwrap();
        assert_eq!(read(&conn, DEFAULT_VERSION_TABLE).unwrap(), Some(next));
    }

    #[test]
    fn writing_none_clears_marker() {
        let conn = conn_with_table();
        let rev = RevisionId::parse("001").unwrap();
        write(&conn, DEFAULT_VERSION_TABLE, Some(&rev)).unwrap();
        write(&conn, DEFAULT_VERSION_TABLE, None).unwrap();
        assert!(read(&conn, DEFAULT_VERSION_TABLE).unwrap().is_none());
    }

    #[test]
    fn corrupted_table_is_reported() {
        let conn = conn_with_table();
        conn.execute_batch(
            "INSERT INTO strata_version VALUES ('001');
             INSERT INTO strata_version VALUES ('002');",
        )
        .unwrap();
        assert!(matches!(
            read(&conn, DEFAULT_VERSION_TABLE),
            Err(Error::Database(_))
        ));
    }

    #[test]
    fn table_names_must_be_plain_identifiers() {
        assert!(validate_table_name("alembic_version").is_ok());
        assert!(validate_table_name("_v2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2fast").is_err());
        assert!(validate_table_name("v; DROP TABLE x").is_err());
    }

    #[test]
    fn script_statements_match_write() {
        let conn = conn_with_table();
        let rev = RevisionId::parse("006").unwrap();
        for stmt in write_sql(DEFAULT_VERSION_TABLE, Some(&rev)) {
            conn.execute_batch(&stmt).unwrap();
        }
        assert_eq!(read(&conn, DEFAULT_VERSION_TABLE).unwrap(), Some(rev));
        assert_eq!(write_sql(DEFAULT_VERSION_TABLE, None).len(), 1);
    }
}
