//! Additive schema migration: add columns the running binary expects but an
//! older on-disk database lacks. Never drops or renames a column.
//!
//! Transliterated from `migrate_db.py`'s `PRAGMA table_info` + conditional
//! `ALTER TABLE ... ADD COLUMN` pattern.

use crate::error::StoreError;
use rusqlite::Connection;

struct ColumnSpec {
    table: &'static str,
    column: &'static str,
    ddl: &'static str,
}

/// Columns introduced after the initial `schema.rs` shipped. Empty today;
/// exists so a future field lands as one line here instead of a hand-edited
/// `CREATE TABLE`.
const ADDED_COLUMNS: &[ColumnSpec] = &[];

pub fn migrate(conn: &Connection) -> Result<(), StoreError> {
    for spec in ADDED_COLUMNS {
        if !has_column(conn, spec.table, spec.column)? {
            conn.execute(
                &format!("ALTER TABLE {} ADD COLUMN {}", spec.table, spec.ddl),
                [],
            )?;
        }
    }
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema;

    #[test]
    fn migrate_is_idempotent_on_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
    }

    #[test]
    fn has_column_detects_existing_columns() {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        assert!(has_column(&conn, "jobs", "status").unwrap());
        assert!(!has_column(&conn, "jobs", "nonexistent").unwrap());
    }
}
