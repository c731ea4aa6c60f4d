//! Single source of truth for the wastesort filesystem layout.
//!
//! This module defines WHERE data lives. It has no I/O and no validation.
//!
//! ```text
//! project/
//! ├── wastesort.toml           # Optional config
//! ├── model_sampahh17.onnx     # Classifier artifact (read-only)
//! └── waste_history.db         # Prediction log (SQLite)
//! ```

use std::path::{Path, PathBuf};

/// Config file looked up in the project root when `--config` is not given
pub const CONFIG_FILE: &str = "wastesort.toml";

/// Default classifier artifact, relative to the project root
pub const MODEL_FILE: &str = "model_sampahh17.onnx";

/// Default prediction log database, relative to the project root
pub const HISTORY_DB: &str = "waste_history.db";

/// Project root: the directory the process was started from.
pub fn project_root() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Default config path: `<root>/wastesort.toml`
pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Resolve a configured path against the project root.
///
/// Absolute paths are returned unchanged.
pub fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_joins_root() {
        let root = Path::new("/srv/wastesort");
        assert_eq!(
            resolve(root, Path::new(MODEL_FILE)),
            PathBuf::from("/srv/wastesort/model_sampahh17.onnx")
        );
    }

    #[test]
    fn test_resolve_absolute_unchanged() {
        let root = Path::new("/srv/wastesort");
        assert_eq!(
            resolve(root, Path::new("/data/history.db")),
            PathBuf::from("/data/history.db")
        );
    }
}
