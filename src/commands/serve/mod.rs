//! Classification HTTP server
//!
//! Provides:
//! - `POST /predict` multipart image upload, returns class + probabilities
//! - `GET /history` / `DELETE /history` over the prediction log
//! - `GET /` welcome and `GET /health` liveness
//!
//! Design: Blocking HTTP microserver (no async/tokio), thread per connection.
//! All responses allow any origin so a browser front-end can call the API.

mod internal;
mod microserver;
mod multipart;

use anyhow::Result;
use std::path::PathBuf;

use wastesort::Config;

/// Command-line overrides for the serve command
#[derive(Debug, Default)]
pub struct ServeOptions {
    /// Host to bind to (None = config value)
    pub host: Option<String>,
    /// Port to bind to (None = config value, 8000 by default)
    pub port: Option<u16>,
    /// Model artifact override
    pub model: Option<PathBuf>,
    /// History database override
    pub database: Option<PathBuf>,
}

impl ServeOptions {
    /// Apply overrides on top of the loaded config
    fn apply(self, mut config: Config) -> Config {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(model) = self.model {
            config.model_path = model;
        }
        if let Some(database) = self.database {
            config.database_path = database;
        }
        config
    }
}

/// Start the classification server
pub fn execute(config: Config, options: ServeOptions) -> Result<()> {
    let config = options.apply(config);
    internal::run_server(&config)
}
