#![deny(unsafe_code)]
#![deny(clippy::all)]
//! `bulwarkd` - standalone gateway daemon.
//!
//! Loads the layered configuration, sets up logging from its `[logging]`
//! section and serves the gateway until Ctrl+C.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;

use bulwark_config::Config;
use bulwark_gateway::{AppState, build_router, config_bridge, serve};

/// Bulwark daemon - admission control over HTTP.
#[derive(Parser)]
#[command(name = "bulwarkd")]
#[command(author, version, about = "Bulwark daemon - admission control over HTTP")]
struct Args {
    /// Configuration file layered over the system and user files.
    #[arg(short, long, env = "BULWARK_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen address.
    #[arg(long)]
    bind: Option<String>,

    /// Log at debug level regardless of configuration.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolved = Config::load(args.config.as_deref())
        .context("failed to load configuration")?;
    let mut config = resolved.config;
    if let Some(bind) = args.bind {
        config.gateway.bind = bind;
        config.validate().context("invalid --bind")?;
    }

    let mut log_config = config_bridge::log_config(&config.logging);
    if args.verbose {
        log_config.level = "debug".to_owned();
    }
    if let Err(e) = bulwark_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }
    for path in &resolved.loaded_files {
        tracing::info!(path = %path, "Loaded configuration file");
    }

    let state = AppState::in_memory(&config)?;
    let router = build_router(state, config.gateway.request_body_limit);
    let listener = TcpListener::bind(&config.gateway.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.gateway.bind))?;
    println!("bulwarkd listening on {}", listener.local_addr()?);

    serve(listener, router, shutdown_signal()).await?;

    println!("bulwarkd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
