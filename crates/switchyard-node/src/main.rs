//! Switchyard Node - WebSocket message routing server.
//!
//! Serves the demo chat router over WebSocket, with its AsyncAPI catalog
//! and documentation page.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use switchyard_node::{
    build_app, chat::chat_router, observability::init_logging, observability::LogFormat, serve,
    NodeConfig,
};
use tokio::net::TcpListener;

/// Switchyard Node - WebSocket message routing server
#[derive(Parser, Debug)]
#[command(name = "switchyard-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Listen address (overrides the configuration file)
    #[arg(long)]
    listen_addr: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = NodeConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(addr) = args.listen_addr {
        config.listen_addr = addr;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    if let Some(format) = args.log_format {
        config.log_format = LogFormat::parse(&format);
    }

    init_logging(&config.log_level, config.log_format);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting switchyard node");

    let router = Arc::new(chat_router()?);
    let app = build_app(&config, Arc::clone(&router))?;

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(
        listen_addr = %config.listen_addr,
        catalog = %config.catalog.path,
        docs = %config.catalog.docs_path,
        "Node is ready. Press Ctrl+C to stop."
    );

    serve(listener, app, shutdown_signal()).await?;

    tracing::info!(connections = router.connection_count(), "Node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
