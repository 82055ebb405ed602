// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Direct insert into the structured reading store.

use super::{DeliveryError, DeliverySink};
use crate::endpoint::{IngestError, IngestionEndpoint};
use crate::reading::{Reading, ReadingKind, SensorId};
use crate::store::{LatestReadings, ReadingStore, SqliteStore, StoreError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Time-series sink: an in-process ingestion endpoint over SQLite.
pub struct TimeSeriesSink {
    endpoint: IngestionEndpoint,
}

impl TimeSeriesSink {
    /// Open the database. Lock waits are bounded by `timeout`.
    pub fn open(database: &Path, timeout: Duration) -> Result<Self, DeliveryError> {
        let store = SqliteStore::open(database, timeout).map_err(|e| {
            DeliveryError::InvalidDestination(format!("{}: {}", database.display(), e))
        })?;
        Ok(Self::with_store(Arc::new(store)))
    }

    pub fn with_store(store: Arc<dyn ReadingStore>) -> Self {
        Self {
            endpoint: IngestionEndpoint::without_broadcast(store),
        }
    }
}

impl DeliverySink for TimeSeriesSink {
    fn deliver(&self, reading: &Reading) -> Result<(), DeliveryError> {
        match self.endpoint.ingest(reading.clone()) {
            Ok(_) => Ok(()),
            Err(IngestError::Store(StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _))))
                if err.code == rusqlite::ErrorCode::DatabaseBusy =>
            {
                Err(DeliveryError::Timeout)
            }
            Err(e) => Err(DeliveryError::Insert(e.to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "timeseries"
    }
}

impl LatestReadings for TimeSeriesSink {
    fn get_latest(
        &self,
        sensor_id: SensorId,
        kind: ReadingKind,
    ) -> Result<Option<Reading>, StoreError> {
        self.endpoint.store().latest_reading(sensor_id, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{Sensor, TemperatureReading};
    use chrono::Utc;

    fn reading(sensor_id: SensorId) -> Reading {
        Reading::Temperature(TemperatureReading {
            time: Utc::now(),
            sensor_id,
            temperature: 21.0,
            humidity: 48.0,
            pressure: None,
        })
    }

    #[test]
    fn test_deliver_inserts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ts.db");

        {
            let store = SqliteStore::open(&path, Duration::from_secs(1)).unwrap();
            store
                .create_sensor(&Sensor {
                    id: 2,
                    sensor_type: "dht22".into(),
                    name: "Attic".into(),
                    location: None,
                    comments: None,
                })
                .unwrap();
        }

        let sink = TimeSeriesSink::open(&path, Duration::from_secs(1)).unwrap();
        sink.deliver(&reading(2)).unwrap();

        let latest = sink.get_latest(2, ReadingKind::Temperature).unwrap();
        assert!(latest.is_some());
        assert_eq!(sink.name(), "timeseries");
    }

    #[test]
    fn test_unregistered_sensor_fails() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let sink = TimeSeriesSink::with_store(store);

        let err = sink.deliver(&reading(5)).unwrap_err();
        assert!(matches!(err, DeliveryError::Insert(_)));
    }

    #[test]
    fn test_locked_database_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.db");

        let store = SqliteStore::open(&path, Duration::from_secs(1)).unwrap();
        store
            .create_sensor(&Sensor {
                id: 3,
                sensor_type: "bme280".into(),
                name: "Porch".into(),
                location: None,
                comments: None,
            })
            .unwrap();
        let sink = TimeSeriesSink::open(&path, Duration::from_millis(100)).unwrap();

        // Another writer holds the database past the busy timeout
        let locker = rusqlite::Connection::open(&path).unwrap();
        locker.execute_batch("BEGIN EXCLUSIVE;").unwrap();

        let err = sink.deliver(&reading(3)).unwrap_err();
        assert!(matches!(err, DeliveryError::Timeout), "got {:?}", err);

        locker.execute_batch("COMMIT;").unwrap();
        sink.deliver(&reading(3)).unwrap();
        assert_eq!(store.count(ReadingKind::Temperature).unwrap(), 1);
    }
}
