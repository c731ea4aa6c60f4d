//! Integration tests for the SQLite prediction log

use approx::assert_relative_eq;
use std::collections::BTreeMap;
use tempfile::TempDir;
use wastesort::storage::migrations::{schema_version, SCHEMA_VERSION};
use wastesort::storage::{HistoryRepository, HistoryStore, NewHistoryEntry};

fn new_entry(i: usize) -> NewHistoryEntry {
    let organik = 0.5 + (i % 5) as f64 * 0.1;
    let rest = (1.0 - organik) / 2.0;
    NewHistoryEntry {
        filename: Some(format!("upload-{}.jpg", i)),
        content_type: Some("image/jpeg".to_string()),
        predicted_class: "organik".to_string(),
        confidence: organik,
        probabilities: BTreeMap::from([
            ("anorganik".to_string(), rest),
            ("campuran".to_string(), rest),
            ("organik".to_string(), organik),
        ]),
        image_data: Some(format!("data:image/jpeg;base64,AAAA{}", i)),
    }
}

fn open_store(temp: &TempDir) -> HistoryStore {
    HistoryStore::open(temp.path().join("waste_history.db")).unwrap()
}

#[test]
fn test_record_then_list_returns_same_fields() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let entry = new_entry(3);

    let id = store.record(&entry).unwrap();
    let items = store.list(1, 0).unwrap();

    assert_eq!(items.len(), 1);
    let stored = &items[0];
    assert_eq!(stored.id, id);
    assert_eq!(stored.filename, entry.filename);
    assert_eq!(stored.content_type, entry.content_type);
    assert_eq!(stored.predicted_class, entry.predicted_class);
    assert_relative_eq!(stored.confidence, entry.confidence);
    assert_eq!(stored.image_data, entry.image_data);

    // created_at is assigned by the database, close to now (UTC)
    let created_at = stored.created_at.expect("created_at populated");
    let age = chrono::Utc::now().naive_utc() - created_at;
    assert!(age.num_seconds().abs() < 60, "created_at too far off: {}", created_at);
}

#[test]
fn test_probabilities_survive_storage() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let entry = NewHistoryEntry {
        probabilities: BTreeMap::from([
            ("organik".to_string(), 0.123456789),
            ("anorganik".to_string(), 1e-7),
            ("campuran".to_string(), 0.876543211),
        ]),
        ..new_entry(0)
    };

    store.record(&entry).unwrap();
    let stored = store.list(1, 0).unwrap().remove(0);

    assert_eq!(
        stored.probabilities.keys().collect::<Vec<_>>(),
        entry.probabilities.keys().collect::<Vec<_>>()
    );
    for (label, value) in &entry.probabilities {
        assert_relative_eq!(stored.probabilities[label], *value, epsilon = 1e-12);
    }
}

#[test]
fn test_clear_then_list_is_empty() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    for i in 0..5 {
        store.record(&new_entry(i)).unwrap();
    }

    assert_eq!(store.clear().unwrap(), 5);
    for (limit, offset) in [(1, 0), (20, 0), (100, 3)] {
        assert!(store.list(limit, offset).unwrap().is_empty());
    }

    // Clearing an empty log is fine
    assert_eq!(store.clear().unwrap(), 0);
}

#[test]
fn test_list_pages_newest_first() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let ids: Vec<i64> = (0..12).map(|i| store.record(&new_entry(i)).unwrap()).collect();

    for (limit, offset) in [(1, 0), (5, 0), (5, 5), (5, 10), (20, 0), (3, 11), (4, 12)] {
        let page = store.list(limit, offset).unwrap();
        assert!(page.len() <= limit);
        assert_eq!(page.len(), limit.min(ids.len().saturating_sub(offset)));
        assert!(page.windows(2).all(|w| w[0].id > w[1].id));
    }

    let newest = store.list(1, 0).unwrap();
    assert_eq!(newest[0].id, *ids.last().unwrap());
    assert_eq!(newest[0].filename.as_deref(), Some("upload-11.jpg"));
}

#[test]
fn test_ids_keep_increasing_after_clear() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    let before = store.record(&new_entry(0)).unwrap();
    store.clear().unwrap();
    let after = store.record(&new_entry(1)).unwrap();
    assert!(after > before);
}

#[test]
fn test_open_twice_shares_file() {
    let temp = TempDir::new().unwrap();
    let a = open_store(&temp);
    let b = open_store(&temp);

    a.record(&new_entry(0)).unwrap();
    b.record(&new_entry(1)).unwrap();
    assert_eq!(a.list(10, 0).unwrap().len(), 2);
    assert_eq!(b.count().unwrap(), 2);
}

#[test]
fn test_concurrent_writers() {
    let temp = TempDir::new().unwrap();
    let store = std::sync::Arc::new(open_store(&temp));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = std::sync::Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..10 {
                    store.record(&new_entry(t * 10 + i)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.count().unwrap(), 40);
}

#[test]
fn test_schema_is_current_after_open() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    let conn = rusqlite::Connection::open(store.path()).unwrap();
    assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
}
