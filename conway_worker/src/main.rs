use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use conway_worker::{ControlService, Engine};
use tokio::net::TcpListener;
use tracing::info;

/// Game of Life worker: computes turns on behalf of a controller.
#[derive(Parser)]
#[command(name = "conway_worker")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = conway::DEFAULT_WORKER_ADDR)]
    listen: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();

    let listener = TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!(addr = %listener.local_addr()?, "worker listening");

    let service = ControlService::new(Arc::new(Engine::new()));
    tokio::select! {
        result = conway_worker::serve(listener, service) => {
            result.context("accept loop failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }
    Ok(())
}
