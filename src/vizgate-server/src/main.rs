//! Vizgate Server - HTTP server binary.

use std::process::ExitCode;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use vizgate_server::{ServerConfig, run_with_shutdown};

/// Vizgate Server
#[derive(Parser)]
#[command(name = "vizgate-server")]
#[command(about = "Authentication gateway and embed portal for Tableau Server")]
#[command(version)]
struct Args {
    /// Configuration file path (JSON). Without it the environment is used.
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address, overriding the configuration
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,
}

fn setup_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

async fn shutdown_signal(shutdown_timeout: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown (timeout: {}s)...", shutdown_timeout);
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown (timeout: {}s)...", shutdown_timeout);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // A missing .env file is fine.
    let dotenv = dotenvy::dotenv();

    setup_logging(&args.log_level, args.json_logs);

    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    let config = if let Some(config_path) = &args.config {
        match ServerConfig::load(config_path) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to load config from {}: {:#}", config_path, e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        match ServerConfig::from_env() {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to load config from environment: {:#}", e);
                return ExitCode::FAILURE;
            }
        }
    };

    let mut config = config;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    info!("Starting Vizgate server on {}", config.listen_addr);
    info!("Press Ctrl+C to stop");

    let shutdown_timeout = config.shutdown_timeout;

    if let Err(e) = run_with_shutdown(config, shutdown_signal(shutdown_timeout)).await {
        error!("Server error: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}
