//! SQLite-backed prediction log

use rusqlite::{params, Connection, Row};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::migrations;
use super::types::{parse_timestamp, HistoryEntry, NewHistoryEntry};
use super::{HistoryRepository, PersistenceError};

/// How long a connection waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw history row before probabilities are decoded
/// (id, filename, content_type, predicted_class, confidence, probabilities, image_data, created_at)
type HistoryRow = (
    i64,
    Option<String>,
    Option<String>,
    String,
    f64,
    String,
    Option<String>,
    Option<String>,
);

/// Prediction log stored in a single SQLite file
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    /// Open or create the log at `path` and bring its schema up to date
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| PersistenceError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let store = Self { path };
        let mut conn = store.connect()?;
        migrations::migrate(&mut conn)?;

        Ok(store)
    }

    /// Database file backing this store
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Short-lived connection for one operation
    fn connect(&self) -> Result<Connection, PersistenceError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Number of stored entries
    pub fn count(&self) -> Result<usize, PersistenceError> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn read_row(row: &Row) -> rusqlite::Result<HistoryRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    }

    fn decode_row(row: HistoryRow) -> Result<HistoryEntry, PersistenceError> {
        let (id, filename, content_type, predicted_class, confidence, probabilities, image_data, created_at) =
            row;

        let created_at = created_at.as_deref().and_then(|text| {
            let parsed = parse_timestamp(text);
            if parsed.is_none() {
                tracing::warn!(id, created_at = text, "Unreadable history timestamp");
            }
            parsed
        });

        let probabilities: BTreeMap<String, f64> = if probabilities.is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&probabilities)?
        };

        Ok(HistoryEntry {
            id,
            filename,
            content_type,
            predicted_class,
            confidence,
            probabilities,
            image_data,
            created_at,
        })
    }
}

impl HistoryRepository for HistoryStore {
    fn record(&self, entry: &NewHistoryEntry) -> Result<i64, PersistenceError> {
        let probabilities = serde_json::to_string(&entry.probabilities)?;
        let conn = self.connect()?;

        let id: i64 = conn.query_row(
            "INSERT INTO history (
                filename, content_type, predicted_class, confidence, probabilities, image_data
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING id",
            params![
                entry.filename,
                entry.content_type,
                entry.predicted_class,
                entry.confidence,
                probabilities,
                entry.image_data,
            ],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<HistoryEntry>, PersistenceError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, filename, content_type, predicted_class, confidence, probabilities,
                    image_data, CAST(created_at AS TEXT)
             FROM history
             ORDER BY id DESC
             LIMIT ?1 OFFSET ?2",
        )?;

        let rows = stmt
            .query_map(params![limit as i64, offset as i64], Self::read_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(Self::decode_row).collect()
    }

    fn clear(&self) -> Result<usize, PersistenceError> {
        let conn = self.connect()?;
        let removed = conn.execute("DELETE FROM history", [])?;
        Ok(removed)
    }
}
