// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP request handlers for the REST API and websocket upgrades.

use crate::session::SubscriberSession;
use crate::AppState;
use airwatch::{IngestError, Reading, ReadingKind, Sensor, SensorId, StoreError};
use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Default and maximum page size of the readings listing.
const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: u16,
}

impl ApiError {
    pub fn new(code: u16, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }

    fn bad_request(error: impl Into<String>) -> Self {
        Self::new(400, error)
    }

    fn not_found(error: impl Into<String>) -> Self {
        Self::new(404, error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        let code = if err.is_rejection() { 400 } else { 500 };
        Self::new(code, err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let code = match err {
            StoreError::DuplicateSensor(_) => 409,
            _ => 500,
        };
        Self::new(code, err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::new(500, format!("worker task failed: {}", err))
    }
}

/// Run store work off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

fn parse_kind(kind: &str) -> Result<ReadingKind, ApiError> {
    kind.parse().map_err(ApiError::not_found)
}

// ============================================================================
// Ingestion
// ============================================================================

async fn submit(
    state: Arc<AppState>,
    kind: ReadingKind,
    body: Value,
) -> Result<Response, ApiError> {
    let reading = Reading::from_submission(kind, body)
        .map_err(|e| ApiError::bad_request(format!("invalid {} reading: {}", kind, e)))?;

    let endpoint = state.endpoint.clone();
    let stored = blocking(move || {
        endpoint.ingest(reading).map_err(|e| {
            warn!(kind = %kind, "ingest rejected: {}", e);
            ApiError::from(e)
        })
    })
    .await?;

    Ok((StatusCode::CREATED, Json(stored.submission_json())).into_response())
}

/// POST /api/sensors/temperature/
pub async fn submit_temperature(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    submit(state, ReadingKind::Temperature, body).await
}

/// POST /api/sensors/air/
pub async fn submit_air(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    submit(state, ReadingKind::Air, body).await
}

/// POST /api/sensors/indoor/
pub async fn submit_indoor(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    submit(state, ReadingKind::Indoor, body).await
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// GET /api/readings/{kind}/?limit=N - newest first
pub async fn list_readings(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let kind = parse_kind(&kind)?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

    let store = state.store.clone();
    let readings = blocking(move || Ok(store.list_readings(kind, limit)?)).await?;

    Ok(Json(readings.iter().map(Reading::submission_json).collect()))
}

/// GET /api/sensors/{id}/{kind}/last/
pub async fn latest(
    State(state): State<Arc<AppState>>,
    Path((sensor_id, kind)): Path<(SensorId, String)>,
) -> Result<Json<Reading>, ApiError> {
    let kind = parse_kind(&kind)?;

    let store = state.store.clone();
    let reading = blocking(move || Ok(store.latest_reading(sensor_id, kind)?)).await?;

    reading.map(Json).ok_or_else(|| {
        ApiError::not_found(format!("no {} reading for sensor {}", kind, sensor_id))
    })
}

// ============================================================================
// Sensor registry
// ============================================================================

/// GET /api/sensors/
pub async fn list_sensors(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Sensor>>, ApiError> {
    let store = state.store.clone();
    let sensors = blocking(move || Ok(store.list_sensors()?)).await?;
    Ok(Json(sensors))
}

/// POST /api/sensors/
pub async fn create_sensor(
    State(state): State<Arc<AppState>>,
    Json(sensor): Json<Sensor>,
) -> Result<Response, ApiError> {
    let store = state.store.clone();
    let sensor = blocking(move || {
        store.create_sensor(&sensor)?;
        Ok(sensor)
    })
    .await?;

    info!(sensor_id = sensor.id, "sensor '{}' registered", sensor.name);
    Ok((StatusCode::CREATED, Json(sensor)).into_response())
}

// ============================================================================
// Scheduler toggle
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SchedulerToggle {
    pub enabled: bool,
}

/// GET /api/scheduler/
pub async fn scheduler_status(State(state): State<Arc<AppState>>) -> Response {
    Json(state.scheduler.status()).into_response()
}

/// POST /api/scheduler/
pub async fn set_scheduler(
    State(state): State<Arc<AppState>>,
    Json(toggle): Json<SchedulerToggle>,
) -> Response {
    state.scheduler.set_enabled(toggle.enabled);
    Json(state.scheduler.status()).into_response()
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let body = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "clients": state.router.subscriber_count(),
        "max_clients": state.max_clients,
        "topic_shape": state.router.shape(),
        "broadcast": state.router.stats(),
    });

    (StatusCode::OK, Json(body)).into_response()
}

// ============================================================================
// WebSocket
// ============================================================================

fn upgrade(state: Arc<AppState>, ws: WebSocketUpgrade, sensor_id: Option<SensorId>) -> Response {
    let Some(key) = state.router.resolve(sensor_id) else {
        return ApiError::not_found(format!(
            "this server publishes {:?} topics",
            state.router.shape()
        ))
        .into_response();
    };

    // Slot is held from here until the membership drops
    let Some(membership) = state.router.try_join(key, state.max_clients) else {
        warn!("Max clients reached, rejecting subscriber");
        return (StatusCode::SERVICE_UNAVAILABLE, "Max clients reached").into_response();
    };

    ws.on_upgrade(move |socket| async move {
        SubscriberSession::new(membership).run(socket).await;
    })
}

/// GET /ws/sensor_data/
pub async fn ws_global(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    upgrade(state, ws, None)
}

/// GET /ws/sensor_data/{sensor_id}/
pub async fn ws_sensor(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(sensor_id): Path<SensorId>,
) -> Response {
    upgrade(state, ws, Some(sensor_id))
}
