// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! airwatch server - ingestion API with real-time fan-out.
//!
//! Readings POSTed to the ingestion routes are validated, stored and then
//! pushed to every websocket subscriber of the reading's topic.
//!
//! # Routes
//!
//! ```text
//! POST     /api/sensors/{temperature|air|indoor}/   ingest a reading (201 / 400)
//! GET      /api/readings/{kind}/?limit=N            newest readings of a kind
//! GET      /api/sensors/{id}/{kind}/last/           latest reading of a sensor (404 if none)
//! GET|POST /api/sensors/                            sensor registry
//! GET|POST /api/scheduler/                          housekeeping toggle
//! GET      /health
//! GET      /ws/sensor_data/                         websocket, global topic
//! GET      /ws/sensor_data/{sensor_id}/             websocket, per-sensor topic
//! ```

pub mod broadcast;
pub mod handlers;
pub mod routes;
pub mod scheduler;
pub mod session;
pub mod tail;

use airwatch::{IngestionEndpoint, ReadingStore, StoreError};
use axum::Router;
use broadcast::{BroadcastRouter, TopicShape};
use scheduler::Scheduler;
use std::sync::Arc;
use std::time::Duration;
use tail::StoreTail;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Server settings, built once from the command line.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub shape: TopicShape,
    pub max_clients: usize,
    /// Per-subscriber queue depth before the subscriber is dropped.
    pub queue_depth: usize,
    pub scheduler_enabled: bool,
    pub scheduler_period: Duration,
    /// Readings kept per sensor and kind by housekeeping (0 = keep all).
    pub retention: usize,
    /// How often the store tail looks for rows written by other processes.
    pub tail_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            shape: TopicShape::PerSensor,
            max_clients: 100,
            queue_depth: 64,
            scheduler_enabled: false,
            scheduler_period: Duration::from_secs(3600),
            retention: 0,
            tail_interval: Duration::from_secs(1),
        }
    }
}

/// Shared application state
pub struct AppState {
    pub endpoint: IngestionEndpoint,
    /// The tailed store; inserts made through it are not re-published.
    pub store: Arc<dyn ReadingStore>,
    pub router: Arc<BroadcastRouter>,
    pub scheduler: Arc<Scheduler>,
    pub tail: Arc<StoreTail>,
    pub max_clients: usize,
}

impl AppState {
    pub fn new(store: Arc<dyn ReadingStore>, config: &ServerConfig) -> Result<Self, StoreError> {
        let router = Arc::new(BroadcastRouter::new(config.shape, config.queue_depth));
        let tail = Arc::new(StoreTail::new(store)?);
        let store: Arc<dyn ReadingStore> = tail.clone();
        let endpoint = IngestionEndpoint::new(store.clone(), router.clone());
        let scheduler = Arc::new(Scheduler::new(
            config.scheduler_enabled,
            config.scheduler_period,
            config.retention,
        ));

        Ok(Self {
            endpoint,
            store,
            router,
            scheduler,
            tail,
            max_clients: config.max_clients,
        })
    }
}

/// Full application router with middleware.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::api_routes())
        .merge(routes::ws_routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
