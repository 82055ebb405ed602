// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! airwatch server - store readings and fan them out to live viewers.
//!
//! # Usage
//!
//! ```bash
//! # Per-sensor topics on port 8000, database in the working directory
//! airwatch-server
//!
//! # One global topic, housekeeping on, keep 10k readings per sensor
//! airwatch-server --topic-shape global --scheduler --retention 10000
//! ```

use airwatch::SqliteStore;
use airwatch_server::broadcast::TopicShape;
use airwatch_server::{app, AppState, ServerConfig};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// airwatch ingestion server
#[derive(Parser, Debug)]
#[command(name = "airwatch-server")]
#[command(about = "Sensor ingestion API with real-time websocket fan-out")]
#[command(version)]
struct Args {
    /// HTTP port
    #[arg(short, long, default_value = "8000", env = "AIRWATCH_PORT")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0", env = "AIRWATCH_BIND")]
    bind: String,

    /// SQLite database file
    #[arg(short, long, default_value = "airwatch.db", env = "AIRWATCH_DB")]
    database: PathBuf,

    /// Topic layout for websocket subscribers
    #[arg(long, value_enum, default_value = "per-sensor")]
    topic_shape: TopicShape,

    /// Maximum concurrent websocket subscribers
    #[arg(long, default_value = "100")]
    max_clients: usize,

    /// Per-subscriber queue depth; a subscriber this far behind is dropped
    #[arg(long, default_value = "64")]
    queue_depth: usize,

    /// Start with the housekeeping scheduler enabled
    #[arg(long)]
    scheduler: bool,

    /// Housekeeping period in seconds
    #[arg(long, default_value = "3600")]
    scheduler_period_secs: u64,

    /// Readings kept per sensor and kind by housekeeping (0 keeps everything)
    #[arg(long, default_value = "0")]
    retention: usize,

    /// Milliseconds between scans for readings written by other processes
    /// (0 disables the scan)
    #[arg(long, default_value = "1000")]
    tail_interval_ms: u64,

    /// SQLite busy timeout in milliseconds
    #[arg(long, default_value = "5000")]
    busy_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("airwatch server v{}", env!("CARGO_PKG_VERSION"));

    let store = SqliteStore::open(&args.database, Duration::from_millis(args.busy_timeout_ms))
        .with_context(|| format!("opening database {}", args.database.display()))?;
    info!("Database: {}", args.database.display());

    let config = ServerConfig {
        shape: args.topic_shape,
        max_clients: args.max_clients,
        queue_depth: args.queue_depth,
        scheduler_enabled: args.scheduler,
        scheduler_period: Duration::from_secs(args.scheduler_period_secs),
        retention: args.retention,
        tail_interval: Duration::from_millis(args.tail_interval_ms),
    };
    let state = Arc::new(
        AppState::new(Arc::new(store), &config).context("reading table cursors")?,
    );

    let housekeeping = state
        .scheduler
        .clone()
        .spawn(state.store.clone(), state.router.clone());
    let tail = (args.tail_interval_ms > 0).then(|| {
        state
            .tail
            .clone()
            .spawn(state.router.clone(), config.tail_interval)
    });

    let addr = format!("{}:{}", args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    info!("Topic shape: {:?}", config.shape);
    info!("Ingestion API: http://{}/api/sensors/", addr);
    match config.shape {
        TopicShape::Global => info!("WebSocket endpoint: ws://{}/ws/sensor_data/", addr),
        TopicShape::PerSensor => {
            info!("WebSocket endpoint: ws://{}/ws/sensor_data/<sensor_id>/", addr)
        }
    }

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    housekeeping.abort();
    if let Some(tail) = tail {
        tail.abort();
    }
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Ctrl-C received, shutting down");
    }
}
