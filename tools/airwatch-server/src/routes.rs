// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Route definitions for the REST API and websocket endpoints.

use crate::handlers;
use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Ingestion, query and control routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sensors/temperature/", post(handlers::submit_temperature))
        .route("/api/sensors/air/", post(handlers::submit_air))
        .route("/api/sensors/indoor/", post(handlers::submit_indoor))
        .route(
            "/api/sensors/",
            get(handlers::list_sensors).post(handlers::create_sensor),
        )
        .route("/api/sensors/:sensor_id/:kind/last/", get(handlers::latest))
        .route("/api/readings/:kind/", get(handlers::list_readings))
        .route(
            "/api/scheduler/",
            get(handlers::scheduler_status).post(handlers::set_scheduler),
        )
        .route("/health", get(handlers::health))
}

/// Subscriber websocket routes
pub fn ws_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws/sensor_data/", get(handlers::ws_global))
        .route("/ws/sensor_data/:sensor_id/", get(handlers::ws_sensor))
}
