use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::classifier::InputLayout;
use crate::paths;

/// Configuration for wastesort
///
/// Every field has a default, so a missing or partial `wastesort.toml` is fine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the HTTP server binds to
    pub host: String,
    /// Port the HTTP server binds to
    pub port: u16,
    /// Classifier artifact (ONNX)
    pub model_path: PathBuf,
    /// SQLite database holding the prediction log
    pub database_path: PathBuf,
    /// Class names, in the order of the model's output vector
    pub labels: Vec<String>,
    /// Square input resolution the model expects
    pub image_size: u32,
    /// Tensor layout of the model input
    pub input_layout: InputLayout,
    /// Upper bound for a request body (the uploaded image plus multipart framing)
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            model_path: PathBuf::from(paths::MODEL_FILE),
            database_path: PathBuf::from(paths::HISTORY_DB),
            labels: ["anorganik", "campuran", "organik"]
                .into_iter()
                .map(String::from)
                .collect(),
            image_size: 224,
            input_layout: InputLayout::Nhwc,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration
    ///
    /// An explicit path must exist. Without one, `wastesort.toml` in the
    /// project root is used when present, defaults otherwise. Relative
    /// artifact and database paths are resolved against the project root.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let root = paths::project_root();

        let mut config = match explicit {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file not found: {}", path.display());
                }
                Self::from_file(path)?
            }
            None => {
                let default_path = paths::config_path(&root);
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.model_path = paths::resolve(&root, &config.model_path);
        config.database_path = paths::resolve(&root, &config.database_path);
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Parse TOML config content
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.labels.is_empty() {
            bail!("Config must define at least one label");
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.labels.iter().find(|l| !seen.insert(l.as_str())) {
            bail!("Duplicate label in config: {}", dup);
        }
        if self.image_size == 0 {
            bail!("image_size must be greater than zero");
        }
        if self.max_upload_bytes == 0 {
            bail!("max_upload_bytes must be greater than zero");
        }
        Ok(())
    }

    /// `host:port` bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
