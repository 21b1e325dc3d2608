//! Forward-anywhere HTTP relay.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                      RELAY                        │
//!   Client Request     │  ┌─────────┐   ┌────────────┐   ┌──────────┐     │
//!   ───────────────────┼─▶│ logging │──▶│ rate limit │──▶│ resolver │     │
//!                      │  └─────────┘   └────────────┘   └────┬─────┘     │
//!                      │                                      ▼           │
//!   Client Response    │  ┌──────────┐                  ┌───────────┐    │
//!   ◀──────────────────┼──│ rewriter │◀─────────────────│ forwarder │◀───┼──── http://<target>
//!                      │  └──────────┘                  └───────────┘    │
//!                      └──────────────────────────────────────────────────┘
//! ```
//!
//! The upstream host comes from the request itself: the `target` query
//! parameter by default, or a configured header such as `Target-URL`.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use relay_proxy::config::load_config;
use relay_proxy::lifecycle::{shutdown_signal, Shutdown};
use relay_proxy::observability::{init_tracing, metrics};
use relay_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "relay-proxy")]
#[command(about = "Forward-anywhere HTTP relay with rate limiting and response rewriting", long_about = None)]
struct Cli {
    /// TOML config file. Built-in defaults are used when omitted.
    #[arg(short, long, env = "RELAY_PROXY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.observability);

    tracing::info!("relay-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address(),
        upstream_source = ?config.upstream.source,
        rate_limit_enabled = config.rate_limit.enabled,
        max_requests = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window_secs,
        "Configuration loaded"
    );

    let listener = match TcpListener::bind(config.listener.bind_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(
                bind_address = %config.listener.bind_address(),
                error = %e,
                "Failed to bind listener"
            );
            return Err(e.into());
        }
    };
    tracing::info!(port = config.listener.port, "Server is running on port {}", config.listener.port);

    if config.observability.metrics_enabled {
        // Validation already rejected unparsable addresses.
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let server = HttpServer::new(config)?;

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    server.run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
