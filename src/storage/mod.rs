//! Storage layer for wastesort - the SQLite prediction log
//!
//! One append-only table of past predictions. Connections are opened per
//! operation; every write is a single statement, so SQLite's own locking
//! serializes concurrent writers.
//!
//! # Example
//!
//! ```no_run
//! use wastesort::storage::{HistoryRepository, HistoryStore};
//!
//! let store = HistoryStore::open("waste_history.db")?;
//! for entry in store.list(20, 0)? {
//!     println!("{} {} {:.2}", entry.id, entry.predicted_class, entry.confidence);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod history;
pub mod migrations;
pub mod types;

pub use history::HistoryStore;
pub use types::{HistoryEntry, NewHistoryEntry};

use std::path::PathBuf;

/// Storage read/write failures
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid probabilities JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to create database directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The operations the HTTP layer needs from the prediction log
///
/// Requires Send + Sync: one repository is shared by every connection thread.
pub trait HistoryRepository: Send + Sync {
    /// Append an entry; returns the id the store assigned
    fn record(&self, entry: &NewHistoryEntry) -> Result<i64, PersistenceError>;

    /// Newest first, skipping `offset` entries, at most `limit`
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<HistoryEntry>, PersistenceError>;

    /// Delete every entry; returns how many were removed
    fn clear(&self) -> Result<usize, PersistenceError>;
}
