//! # Meridian - Main Entry Point
//!
//! Runs a local aggregation cluster with optional simulated users. This
//! entry point handles CLI parsing, configuration loading, and application
//! lifecycle management.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! meridian
//!
//! # Specify custom configuration
//! meridian --config production.toml
//!
//! # Override specific settings
//! meridian --nodes 5 --bots 2000 --log-level debug
//!
//! # JSON logging for production
//! meridian --json-logs
//! ```
//!
//! ## Configuration
//!
//! Configuration is read from a TOML file (default: `meridian.toml`). If the
//! file doesn't exist, a default configuration is written there.
//!
//! ## Signal Handling
//!
//! SIGINT and SIGTERM start a graceful shutdown; a second signal exits at once.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Parses arguments, sets up logging, and runs the application to completion.
///
/// Exits the process with status 1 on any startup or runtime failure.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging settings come from the file, so load it before anything logs.
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

pub use config::{AggregationConfig, BotSettings, ClusterSettings, LoggingSettings};
