use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

use wastesort::Config;

#[derive(Parser)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Waste image classification service", long_about = None)]
struct Cli {
    /// Config file (default: wastesort.toml in the project root)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the classification HTTP server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long)]
        port: Option<u16>,

        /// Model artifact (ONNX)
        #[arg(long)]
        model: Option<PathBuf>,

        /// History database file
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Classify one image file
    Classify {
        /// Image to classify
        image: PathBuf,

        /// Model artifact (ONNX)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Output results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Inspect the prediction log
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// List recent predictions, newest first
    List {
        /// Maximum entries to show (1-100)
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Entries to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Output results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Delete every recorded prediction
    Clear,
}

fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _tracing = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .try_init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            model,
            database,
        } => {
            let options = commands::serve::ServeOptions {
                host,
                port,
                model,
                database,
            };
            commands::serve::execute(config, options)?;
        }
        Commands::Classify { image, model, json } => {
            commands::classify::execute(config, &image, model, json)?;
        }
        Commands::History { command } => match command {
            HistoryCommands::List {
                limit,
                offset,
                json,
            } => {
                commands::history::list(&config, limit, offset, json)?;
            }
            HistoryCommands::Clear => {
                commands::history::clear(&config)?;
            }
        },
    }

    Ok(())
}
