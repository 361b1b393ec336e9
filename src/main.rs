//! gatehouse server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ dispatcher ──▶ routing table ──▶ handler
//!                         │                │              │
//!                         │                │              └─ CookieAuth ─▶ sessions
//!                         │                └─ headers, cookies, security holes
//!                         │
//!     websocket ──────────┴──▶ bridge ◀──▶ stream (one task per stream)
//!                                             ◀──▶ substreams (handlers)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use gatehouse::config::{load_config, AppConfig};
use gatehouse::lifecycle::{startup, wait_for_signal, Shutdown};
use gatehouse::observability::{logging, metrics};
use gatehouse::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "gatehouse", version, about = "Security routing engine and stream multiplexer")]
struct Args {
    /// Path to a TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    logging::init_logging(&config.observability.log_level, &config.observability.log_format)?;
    tracing::info!("gatehouse v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        websocket_path = %config.streaming.websocket_path,
        request_timeout_secs = config.timeouts.request_secs,
        session_timeout_secs = config.session.timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let address: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(address)?;
    }

    let shutdown = Shutdown::new();

    let sessions = Arc::new(startup::session_server(&config)?);
    tokio::spawn(
        sessions
            .clone()
            .run_sweeper(Duration::from_secs(config.session.sweep_interval_secs), shutdown.subscribe()),
    );

    let dispatcher = Arc::new(startup::dispatcher(&config, sessions)?);
    let server = HttpServer::new(&config, dispatcher);
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, server_shutdown).await?;
    tracing::info!("gatehouse stopped");
    Ok(())
}
