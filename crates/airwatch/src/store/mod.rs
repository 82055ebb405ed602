// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Storage collaborator
//!
//! Defines the trait for reading stores and the latest-reading query shared by
//! the store and the API client.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::reading::{Reading, ReadingKind, Sensor, SensorId};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Sensor {0} already exists")]
    DuplicateSensor(SensorId),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Remote query failed: {0}")]
    Remote(String),
}

/// Reading store trait
///
/// Backend-agnostic interface for persisting readings and sensor metadata.
/// Implementations must be usable from several threads at once.
pub trait ReadingStore: Send + Sync {
    /// Persist one reading. The sensor is assumed to exist.
    ///
    /// Returns the row id, which grows with every insert into a kind's table.
    fn insert_reading(&self, reading: &Reading) -> Result<i64, StoreError>;

    /// Highest row id of a kind's table, 0 when it has never held a row.
    fn last_row_id(&self, kind: ReadingKind) -> Result<i64, StoreError>;

    /// Readings of one kind stored after row `after`, oldest first, with
    /// their row ids.
    fn readings_after(
        &self,
        kind: ReadingKind,
        after: i64,
        limit: usize,
    ) -> Result<Vec<(i64, Reading)>, StoreError>;

    /// Most recent reading of `kind` for a sensor, by reading time.
    fn latest_reading(
        &self,
        sensor_id: SensorId,
        kind: ReadingKind,
    ) -> Result<Option<Reading>, StoreError>;

    /// Newest-first readings of one kind, across all sensors.
    fn list_readings(&self, kind: ReadingKind, limit: usize) -> Result<Vec<Reading>, StoreError>;

    /// Look up a registered sensor.
    fn sensor(&self, id: SensorId) -> Result<Option<Sensor>, StoreError>;

    /// All registered sensors, ordered by id.
    fn list_sensors(&self) -> Result<Vec<Sensor>, StoreError>;

    /// Register a sensor. Ids are never reused.
    fn create_sensor(&self, sensor: &Sensor) -> Result<(), StoreError>;

    /// Keep only the newest `keep` readings per sensor and kind.
    ///
    /// Returns the number of deleted readings.
    fn apply_retention(&self, keep: usize) -> Result<usize, StoreError>;

    /// Number of stored readings of one kind.
    fn count(&self, kind: ReadingKind) -> Result<usize, StoreError>;
}

/// Latest-reading query, served both by a local store and by the remote API.
///
/// ENS160 warm start uses it to seed ambient compensation.
pub trait LatestReadings: Send + Sync {
    fn get_latest(
        &self,
        sensor_id: SensorId,
        kind: ReadingKind,
    ) -> Result<Option<Reading>, StoreError>;
}
