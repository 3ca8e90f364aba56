//! ticket-broker daemon
//!
//! Listens on a local Unix socket, logs into the authentication provider on
//! behalf of each caller, and returns a hex-encoded session ticket.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tb_broker::provider::DevProvider;
use tb_broker::BrokerServer;
use tb_core::config::{self, BrokerConfig};

#[derive(Parser)]
#[command(name = "tb-broker")]
#[command(about = "ticket-broker daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Socket path (overrides config)
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("ticket-broker starting...");

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                BrokerConfig::default()
            })
        } else {
            tracing::info!("Using default configuration");
            BrokerConfig::default()
        }
    };

    // Override socket path if specified
    if let Some(socket) = args.socket {
        config.socket_path = socket;
    }

    // Create cancellation token for shutdown
    let cancel = CancellationToken::new();

    // Setup signal handlers
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, shutting down...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, shutting down...");
            }
        }

        cancel_clone.cancel();
    });

    match config.provider.as_str() {
        "dev" => {
            let server = BrokerServer::new(config, DevProvider::new).with_shutdown_token(cancel);
            server.run().await?;
        }
        other => {
            anyhow::bail!("Unknown provider '{}' (available: dev)", other);
        }
    }

    tracing::info!("Broker shutdown complete");
    Ok(())
}
