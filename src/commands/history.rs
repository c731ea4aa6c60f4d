//! Inspect or clear the prediction log without running the server

use anyhow::{bail, Context, Result};

use wastesort::storage::types::TIMESTAMP_FORMAT;
use wastesort::storage::{HistoryEntry, HistoryRepository, HistoryStore};
use wastesort::Config;

/// Largest page the list command prints
const MAX_LIMIT: usize = 100;

/// Print the most recent entries, newest first
pub fn list(config: &Config, limit: usize, offset: usize, json: bool) -> Result<()> {
    if limit == 0 || limit > MAX_LIMIT {
        bail!("--limit must be between 1 and {}", MAX_LIMIT);
    }

    let store = open(config)?;
    let items = store.list(limit, offset).context("Failed to read history")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "items": items }))?
        );
        return Ok(());
    }

    if items.is_empty() {
        println!("No predictions recorded in {}", store.path().display());
        return Ok(());
    }

    let total = store.count()?;
    println!(
        "📜 Showing {} of {} predictions ({})",
        items.len(),
        total,
        store.path().display()
    );
    for entry in &items {
        println!("{}", format_entry(entry));
    }

    Ok(())
}

/// Delete every entry
pub fn clear(config: &Config) -> Result<()> {
    let store = open(config)?;
    let removed = store.clear().context("Failed to clear history")?;
    println!("✓ History cleared ({} entries removed)", removed);
    Ok(())
}

fn open(config: &Config) -> Result<HistoryStore> {
    HistoryStore::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open history database {}",
            config.database_path.display()
        )
    })
}

fn format_entry(entry: &HistoryEntry) -> String {
    format!(
        "  #{:<5} {}  {:<10} {:>5.1}%  {}",
        entry.id,
        entry
            .created_at
            .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_else(|| format!("{:<19}", "-")),
        entry.predicted_class,
        entry.confidence * 100.0,
        entry.filename.as_deref().unwrap_or("-"),
    )
}
