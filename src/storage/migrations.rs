//! Versioned schema migrations for the prediction log.
//!
//! The applied version lives in SQLite's `user_version` header. Each step runs
//! only when the stored version is below it, so opening an up-to-date store
//! does nothing.

use rusqlite::{Connection, Transaction};

use super::PersistenceError;

/// Schema version this build writes
pub const SCHEMA_VERSION: i64 = 2;

/// Bring the database up to `SCHEMA_VERSION`.
///
/// Stores written before versioning (user_version 0) are handled: the table is
/// created only if absent and `image_data` is added only if missing.
pub fn migrate(conn: &mut Connection) -> Result<(), PersistenceError> {
    let tx = conn.transaction()?;
    let current = schema_version(&tx)?;

    if current > SCHEMA_VERSION {
        tracing::warn!(
            found = current,
            supported = SCHEMA_VERSION,
            "History database was written by a newer version"
        );
        return Ok(());
    }

    if current < 1 {
        create_history_table(&tx)?;
    }
    if current < 2 {
        add_image_data_column(&tx)?;
    }

    if current < SCHEMA_VERSION {
        tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tracing::info!(from = current, to = SCHEMA_VERSION, "Migrated history schema");
    }

    tx.commit()?;
    Ok(())
}

/// Version recorded in the database header
pub fn schema_version(conn: &Connection) -> Result<i64, PersistenceError> {
    let version = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

/// v1: the first table layout, before images were kept
fn create_history_table(tx: &Transaction) -> Result<(), PersistenceError> {
    tx.execute(
        "CREATE TABLE IF NOT EXISTS history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT,
            content_type TEXT,
            predicted_class TEXT NOT NULL,
            confidence REAL NOT NULL,
            probabilities TEXT NOT NULL,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// v2: inline image data URIs
fn add_image_data_column(tx: &Transaction) -> Result<(), PersistenceError> {
    if !has_column(tx, "history", "image_data")? {
        tx.execute("ALTER TABLE history ADD COLUMN image_data TEXT", [])?;
    }
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, PersistenceError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|name| name == column))
}
