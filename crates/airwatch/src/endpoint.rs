// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingestion endpoint: store a reading, then hand it to the broadcaster.

use crate::reading::{Reading, SensorId};
use crate::store::{ReadingStore, StoreError};
use crate::validate::{self, Rejection};
use std::sync::Arc;
use thiserror::Error;

/// Receives every reading that was durably stored.
///
/// Implementations must not block on subscriber delivery.
pub trait Publish: Send + Sync {
    fn publish(&self, reading: &Reading);
}

/// Publisher for deployments without real-time subscribers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

impl Publish for NullPublisher {
    fn publish(&self, _reading: &Reading) {}
}

/// Why an ingest did not store the reading.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unknown sensor_id {0}")]
    UnknownSensor(SensorId),

    #[error("{0}")]
    OutOfRange(Rejection),

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Rejections are the submitter's fault; storage failures are ours.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, IngestError::Store(_))
    }
}

/// Store-then-publish entry point shared by the HTTP server and the
/// in-process time-series sink.
#[derive(Clone)]
pub struct IngestionEndpoint {
    store: Arc<dyn ReadingStore>,
    publisher: Arc<dyn Publish>,
}

impl IngestionEndpoint {
    pub fn new(store: Arc<dyn ReadingStore>, publisher: Arc<dyn Publish>) -> Self {
        Self { store, publisher }
    }

    /// Endpoint with no subscribers attached.
    pub fn without_broadcast(store: Arc<dyn ReadingStore>) -> Self {
        Self::new(store, Arc::new(NullPublisher))
    }

    pub fn store(&self) -> &Arc<dyn ReadingStore> {
        &self.store
    }

    /// Validate, persist and publish one reading.
    ///
    /// The publisher is called only after the store accepted the reading, and
    /// before this returns.
    pub fn ingest(&self, reading: Reading) -> Result<Reading, IngestError> {
        let sensor_id = reading.sensor_id();

        if self.store.sensor(sensor_id)?.is_none() {
            return Err(IngestError::UnknownSensor(sensor_id));
        }
        validate::check(&reading).map_err(IngestError::OutOfRange)?;

        self.store.insert_reading(&reading)?;
        tracing::debug!(sensor_id, kind = %reading.kind(), "reading stored");

        self.publisher.publish(&reading);
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{ReadingKind, Sensor, TemperatureReading};
    use crate::store::SqliteStore;
    use chrono::Utc;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Reading>>,
    }

    impl Publish for Recorder {
        fn publish(&self, reading: &Reading) {
            self.seen.lock().push(reading.clone());
        }
    }

    fn setup() -> (IngestionEndpoint, Arc<SqliteStore>, Arc<Recorder>) {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        store
            .create_sensor(&Sensor {
                id: 1,
                sensor_type: "bme280".into(),
                name: "Kitchen".into(),
                location: None,
                comments: None,
            })
            .unwrap();
        let recorder = Arc::new(Recorder::default());
        let endpoint = IngestionEndpoint::new(store.clone(), recorder.clone());
        (endpoint, store, recorder)
    }

    fn reading(sensor_id: SensorId, temperature: f64) -> Reading {
        Reading::Temperature(TemperatureReading {
            time: Utc::now(),
            sensor_id,
            temperature,
            humidity: 45.0,
            pressure: Some(1012.3),
        })
    }

    #[test]
    fn test_ingest_stores_then_publishes() {
        let (endpoint, store, recorder) = setup();
        let r = reading(1, 22.5);

        let stored = endpoint.ingest(r.clone()).unwrap();
        assert_eq!(stored, r);
        assert_eq!(store.count(ReadingKind::Temperature).unwrap(), 1);
        assert_eq!(recorder.seen.lock().as_slice(), &[r]);
    }

    #[test]
    fn test_unknown_sensor_rejected_without_publish() {
        let (endpoint, store, recorder) = setup();

        let err = endpoint.ingest(reading(42, 22.5)).unwrap_err();
        assert!(matches!(err, IngestError::UnknownSensor(42)));
        assert!(err.is_rejection());
        assert_eq!(store.count(ReadingKind::Temperature).unwrap(), 0);
        assert!(recorder.seen.lock().is_empty());
    }

    #[test]
    fn test_out_of_range_rejected_without_publish() {
        let (endpoint, _store, recorder) = setup();

        let err = endpoint.ingest(reading(1, 120.0)).unwrap_err();
        match err {
            IngestError::OutOfRange(rejection) => assert_eq!(rejection.field, "temperature"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(recorder.seen.lock().is_empty());
    }
}
