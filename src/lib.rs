pub mod classifier;
pub mod config;
pub mod paths;
pub mod storage;

// Re-export commonly used types
pub use classifier::{ClassifyError, ModelService, PredictionResult};
pub use config::Config;
pub use storage::{HistoryEntry, HistoryRepository, HistoryStore, NewHistoryEntry, PersistenceError};
