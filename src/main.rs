//! # Iron Dash Main Application Entry Point
//!
//! This is the main executable for the Iron Dash dashboard application.
//! It handles command-line argument parsing, tracing initialization,
//! server startup, and application lifecycle management.
//!
//! Settings are read from the environment (see `iron_dash::config`). Two
//! optional positional arguments override the most common ones:
//!
//! - First argument: Port number (defaults to `PORT` or 3000)
//! - Second argument: Path to the dashboard document (defaults to `DATA_FILE`)
//!
//! ## Example Usage
//!
//! ```bash
//! # Run with default settings
//! cargo run
//!
//! # Run on a specific port with a specific document
//! cargo run 8080 /srv/dash/dashboard.json
//! ```
//!
//! Log levels can be controlled through the `RUST_LOG` environment variable.

use iron_dash::config::AppConfig;
use iron_dash::error::IronDashError;
use iron_dash::server;
use std::env;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), IronDashError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = AppConfig::from_env();
    if let Some(port) = env::args().nth(1) {
        match port.parse() {
            Ok(port) => config.port = port,
            Err(_) => tracing::warn!("Ignoring invalid port argument {port:?}"),
        }
    }
    if let Some(path) = env::args().nth(2) {
        config.data_file = PathBuf::from(path);
    }

    tracing::info!("Starting Iron Dash application");

    let cancel_token = CancellationToken::new();
    tokio::spawn({
        let cancel_token = cancel_token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
                cancel_token.cancel();
            }
        }
    });

    server::run(config, cancel_token).await?;

    tracing::info!("Iron Dash application shutting down");
    Ok(())
}
