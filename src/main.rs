//! Telemetry anchoring service.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────────┐
//!                       │                  TELEMETRY ANCHOR                    │
//!   POST /sendTx        │  ┌────────┐   ┌──────────┐   ┌──────────────────┐    │
//!   ────────────────────┼─▶│  http  │──▶│ pipeline │──▶│     dispatch     │    │
//!                       │  │ server │   │  codec + │   │   coordinator    │    │
//!                       │  └────────┘   │  crypto  │   └───┬─────┬─────┬──┘    │
//!                       │               └──────────┘       │     │     │       │
//!                       │                                  ▼     ▼     ▼       │
//!                       │                                 EVM  Move  feeless ──┼──▶ ledgers
//!                       │                                              │       │
//!                       │                                      storage (receipts)
//!                       │  ┌────────────────────────────────────────────────┐  │
//!                       │  │ config · observability · resilience · lifecycle │  │
//!                       │  └────────────────────────────────────────────────┘  │
//!                       └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use telemetry_anchor::config::{load_config, AnchorConfig};
use telemetry_anchor::http::HttpServer;
use telemetry_anchor::lifecycle::{build_state, spawn_signal_handler, Shutdown};
use telemetry_anchor::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "telemetry-anchor")]
#[command(about = "Seal vehicle telemetry and anchor it on public ledgers", long_about = None)]
struct Args {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => AnchorConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "telemetry-anchor starting");

    tracing::info!(
        config = ?args.config,
        bind_address = %config.listener.bind_address,
        derivation = config.keys.derivation.as_str(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let state = build_state(&config).await?;
    let server = HttpServer::new(&config.listener, &config.timeouts, state);

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    match &config.listener.tls {
        Some(tls) => {
            let addr: SocketAddr = config.listener.bind_address.parse()?;
            server.run_tls(addr, tls, &shutdown).await?;
        }
        None => {
            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "Listening for connections");
            server.run(listener, &shutdown).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
