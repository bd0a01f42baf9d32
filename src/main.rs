//! Blue-green traffic switch (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                 BLUE-GREEN PROXY                 │
//!                      │                                                  │
//!   Client Request     │  ┌─────────┐   /, /api/*   ┌──────────────┐      │
//!   ───────────────────┼─▶│  http   │──────────────▶│    admin     │      │
//!                      │  │ server  │               │  handlers    │      │
//!                      │  └────┬────┘               └──────┬───────┘      │
//!                      │       │ everything else           │ switch       │
//!                      │       ▼                           ▼              │
//!                      │  ┌─────────┐  load   ┌─────────────────────┐     │
//!   Client Response    │  │  proxy  │◀────────│  descriptor store   │     │
//!   ◀──────────────────┼──│ handler │         │ (ArcSwap + persist) │     │
//!                      │  └────┬────┘         └──────────▲──────────┘     │
//!                      │       │                         │ set_status     │
//!                      │       │                  ┌──────┴───────┐        │
//!                      │       │                  │    health    │        │
//!                      │       │                  │   monitor    │        │
//!                      │       │                  └──────┬───────┘        │
//!                      └───────┼─────────────────────────┼────────────────┘
//!                              ▼                         ▼
//!                      active environment        blue + green probes
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use bluegreen_proxy::config::{read_config, ConfigSource, Persistence};
use bluegreen_proxy::http::HttpServer;
use bluegreen_proxy::lifecycle::{signals, Shutdown};
use bluegreen_proxy::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "bluegreen-proxy")]
#[command(about = "Blue-green deployment traffic switch", long_about = None)]
struct Args {
    /// Configuration file; also where switches and address updates are saved
    #[arg(short, long, default_value = "bluegreen.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (config, source) = read_config(&args.config, |key| std::env::var(key).ok())?;
    logging::init(&config.observability);

    tracing::info!("bluegreen-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    if source == ConfigSource::Defaults {
        tracing::info!(path = %args.config.display(), "Config file not found, using defaults");
    }
    tracing::info!(
        path = %args.config.display(),
        service = %config.service_name,
        active = %config.environments.active,
        blue = %config.environments.blue,
        green = %config.environments.green,
        interval_secs = config.health_check.interval_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let persistence = Persistence::file(args.config.clone(), config.clone());
    let server = HttpServer::new(config.clone(), persistence)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let signal_task = signals::spawn_signal_handler(shutdown.clone());

    server.run(listener, shutdown.subscribe()).await?;
    signal_task.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}
