use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use floodgate::config::FloodgateConfig;
use floodgate::grpc::GrpcServer;
use floodgate::ratelimit::{PolicyTable, RateLimiter};

/// Fixed-window request rate limiting service.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Floodgate Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match args.config {
        Some(ref path) => FloodgateConfig::from_file(path)?,
        None => FloodgateConfig::default(),
    };
    info!(grpc_addr = %config.server.grpc_addr, "Configuration loaded");

    // Build the policy table; invalid policies abort startup
    let policies = PolicyTable::from_specs(&config.policies)?;
    if policies.is_empty() {
        warn!("No rate limit policies configured; every check will report an unknown policy");
    }

    // Initialize the rate limiter
    let limiter = Arc::new(RateLimiter::new(policies, config.limiter.clone()));
    info!("Rate limiter initialized");

    // Create and start the gRPC server
    let grpc_server = GrpcServer::new(config.server.grpc_addr, limiter);

    info!("Starting gRPC server on {}", config.server.grpc_addr);

    // Run the server with graceful shutdown on Ctrl+C
    grpc_server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Floodgate Rate Limiting Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
