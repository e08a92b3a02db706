//! Route gateway.
//!
//! A dynamic API gateway built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                    ROUTE GATEWAY                     │
//!                    │                                                      │
//!  Client Request    │  ┌─────────┐    ┌──────────┐    ┌────────────────┐   │
//!  ──────────────────┼─▶│  http   │───▶│ routing  │───▶│   dispatch     │───┼──▶ Downstream
//!                    │  │ server  │    │ resolver │    │ fan-out, retry │   │    Services
//!                    │  └─────────┘    └────┬─────┘    │ circuit breaker│◀──┼───
//!                    │                      │          └───────┬────────┘   │
//!                    │               ┌──────┴──────┐           ▼            │
//!  Client Response   │  ┌─────────┐  │ route store │   ┌────────────────┐   │
//!  ◀─────────────────┼──│response │  │ (ArcSwap)   │   │   aggregate    │   │
//!                    │  └────▲────┘  └──────▲──────┘   └───────┬────────┘   │
//!                    │       └──────────────┼──────────────────┘            │
//!                    │                      │ reload                        │
//!                    │     admin API / poller / file watcher / SIGHUP       │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use route_gateway::admin::{setup_admin_router, AdminState};
use route_gateway::aggregate::AggregatorRegistry;
use route_gateway::config::load_config;
use route_gateway::dispatch::HyperClient;
use route_gateway::lifecycle::{signals, startup, Shutdown};
use route_gateway::observability::{logging, metrics};
use route_gateway::{AppState, HttpServer};

#[derive(Parser)]
#[command(name = "route-gateway")]
#[command(about = "Dynamic API gateway with response aggregation", long_about = None)]
struct Args {
    /// Path to the gateway configuration file (TOML).
    #[arg(short, long, env = "GATEWAY_CONFIG", default_value = "gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(&args.config)?;
    logging::init(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "route-gateway starting"
    );
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        fan_out_ms = config.timeouts.fan_out_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = startup::initialize_store(&config, &args.config).await?;
    tracing::info!(
        version = store.snapshot().version(),
        routes = store.snapshot().len(),
        "Route definitions loaded"
    );

    let shutdown = Shutdown::new();
    let _triggers = startup::spawn_reload_triggers(&config, &args.config, &store, &shutdown)?;

    let client = Arc::new(HyperClient::new(
        Duration::from_millis(config.timeouts.downstream_call_ms),
        config.limits.max_response_bytes,
    ));
    let state = AppState::new(
        &config,
        store.clone(),
        client,
        AggregatorRegistry::with_builtins(),
    );

    if config.admin.enabled {
        let admin_state = AdminState::new(store.clone(), state.breakers().clone(), &config.admin.api_key);
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");

        let app = setup_admin_router(admin_state);
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            let result = axum::serve(admin_listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Admin server failed");
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(&config, state);
    let trigger = shutdown.clone();
    server
        .run(listener, async move {
            signals::shutdown_signal().await;
            trigger.trigger();
        })
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
