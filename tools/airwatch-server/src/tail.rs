// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Store tail: publish readings that other processes wrote to the database.
//!
//! Agents running with `--send-to-timeseries` insert straight into the shared
//! SQLite file and never pass through the ingestion endpoint. The tail keeps a
//! row-id cursor per reading table and publishes every row past it.
//!
//! The tail also wraps the server's own store. Rows inserted through it are
//! published by the ingestion endpoint already, so the tail records their ids
//! and skips them when the cursor walks past.

use airwatch::{Publish, Reading, ReadingKind, ReadingStore, Sensor, SensorId, StoreError};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Rows read per query while catching up.
const BATCH: usize = 256;

#[derive(Default)]
struct Cursors {
    last: HashMap<ReadingKind, i64>,
    /// Rows this process inserted and published past the cursor.
    local: HashSet<(ReadingKind, i64)>,
}

pub struct StoreTail {
    store: Arc<dyn ReadingStore>,
    cursors: Mutex<Cursors>,
}

impl StoreTail {
    /// Start tailing from the current end of every reading table.
    pub fn new(store: Arc<dyn ReadingStore>) -> Result<Self, StoreError> {
        let mut cursors = Cursors::default();
        for kind in ReadingKind::ALL {
            cursors.last.insert(kind, store.last_row_id(kind)?);
        }

        Ok(Self {
            store,
            cursors: Mutex::new(cursors),
        })
    }

    /// Publish rows stored by other writers since the last poll.
    ///
    /// Blocking: call from a blocking thread. Returns the number of readings
    /// published.
    pub fn poll(&self, publisher: &dyn Publish) -> Result<usize, StoreError> {
        let mut cursors = self.cursors.lock();
        let mut published = 0;

        for kind in ReadingKind::ALL {
            let mut last = cursors.last.get(&kind).copied().unwrap_or(0);
            loop {
                let rows = self.store.readings_after(kind, last, BATCH)?;
                let fetched = rows.len();

                for (id, reading) in rows {
                    last = id;
                    if cursors.local.remove(&(kind, id)) {
                        continue;
                    }
                    publisher.publish(&reading);
                    published += 1;
                }

                if fetched < BATCH {
                    break;
                }
            }
            cursors.last.insert(kind, last);
        }

        // Local rows trimmed by retention before the cursor reached them
        let Cursors { last, local } = &mut *cursors;
        local.retain(|(kind, id)| last.get(kind).map_or(true, |cursor| id > cursor));

        if published > 0 {
            debug!(published, "published readings from other writers");
        }
        Ok(published)
    }

    /// Spawn the polling task.
    pub fn spawn(self: Arc<Self>, publisher: Arc<dyn Publish>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period.max(Duration::from_millis(10)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let tail = Arc::clone(&self);
                let publisher = Arc::clone(&publisher);
                let result =
                    tokio::task::spawn_blocking(move || tail.poll(publisher.as_ref())).await;

                match result {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!("store tail poll failed: {}", e),
                    Err(e) => warn!("store tail task panicked: {}", e),
                }
            }
        })
    }
}

impl ReadingStore for StoreTail {
    fn insert_reading(&self, reading: &Reading) -> Result<i64, StoreError> {
        // Held across the insert so a concurrent poll never sees the row unrecorded
        let mut cursors = self.cursors.lock();
        let id = self.store.insert_reading(reading)?;
        cursors.local.insert((reading.kind(), id));
        Ok(id)
    }

    fn last_row_id(&self, kind: ReadingKind) -> Result<i64, StoreError> {
        self.store.last_row_id(kind)
    }

    fn readings_after(
        &self,
        kind: ReadingKind,
        after: i64,
        limit: usize,
    ) -> Result<Vec<(i64, Reading)>, StoreError> {
        self.store.readings_after(kind, after, limit)
    }

    fn latest_reading(
        &self,
        sensor_id: SensorId,
        kind: ReadingKind,
    ) -> Result<Option<Reading>, StoreError> {
        self.store.latest_reading(sensor_id, kind)
    }

    fn list_readings(&self, kind: ReadingKind, limit: usize) -> Result<Vec<Reading>, StoreError> {
        self.store.list_readings(kind, limit)
    }

    fn sensor(&self, id: SensorId) -> Result<Option<Sensor>, StoreError> {
        self.store.sensor(id)
    }

    fn list_sensors(&self) -> Result<Vec<Sensor>, StoreError> {
        self.store.list_sensors()
    }

    fn create_sensor(&self, sensor: &Sensor) -> Result<(), StoreError> {
        self.store.create_sensor(sensor)
    }

    fn apply_retention(&self, keep: usize) -> Result<usize, StoreError> {
        self.store.apply_retention(keep)
    }

    fn count(&self, kind: ReadingKind) -> Result<usize, StoreError> {
        self.store.count(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airwatch::{IngestionEndpoint, SqliteStore, TemperatureReading};
    use chrono::{TimeZone, Utc};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Reading>>,
    }

    impl Publish for Recorder {
        fn publish(&self, reading: &Reading) {
            self.seen.lock().push(reading.clone());
        }
    }

    fn reading(second: u32) -> Reading {
        Reading::Temperature(TemperatureReading {
            time: Utc.with_ymd_and_hms(2025, 4, 2, 8, 0, second).unwrap(),
            sensor_id: 1,
            temperature: 20.0,
            humidity: 50.0,
            pressure: None,
        })
    }

    fn store() -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        store
            .create_sensor(&Sensor {
                id: 1,
                sensor_type: "dht22".into(),
                name: "Cellar".into(),
                location: None,
                comments: None,
            })
            .unwrap();
        store
    }

    #[test]
    fn test_existing_rows_are_not_replayed() {
        let store = store();
        store.insert_reading(&reading(0)).unwrap();

        let tail = StoreTail::new(store.clone()).unwrap();
        let recorder = Recorder::default();
        assert_eq!(tail.poll(&recorder).unwrap(), 0);
    }

    #[test]
    fn test_foreign_rows_are_published_once() {
        let store = store();
        let tail = StoreTail::new(store.clone()).unwrap();
        let recorder = Recorder::default();

        // Written behind the tail's back
        store.insert_reading(&reading(1)).unwrap();
        store.insert_reading(&reading(2)).unwrap();

        assert_eq!(tail.poll(&recorder).unwrap(), 2);
        assert_eq!(*recorder.seen.lock(), vec![reading(1), reading(2)]);
        assert_eq!(tail.poll(&recorder).unwrap(), 0);
    }

    #[test]
    fn test_local_rows_are_skipped() {
        let store = store();
        let tail = Arc::new(StoreTail::new(store.clone()).unwrap());
        let endpoint_recorder = Arc::new(Recorder::default());
        let endpoint = IngestionEndpoint::new(tail.clone(), endpoint_recorder.clone());

        endpoint.ingest(reading(3)).unwrap();
        store.insert_reading(&reading(4)).unwrap();

        let recorder = Recorder::default();
        assert_eq!(tail.poll(&recorder).unwrap(), 1);
        assert_eq!(*recorder.seen.lock(), vec![reading(4)]);
        assert_eq!(*endpoint_recorder.seen.lock(), vec![reading(3)]);
        assert!(tail.cursors.lock().local.is_empty());
    }
}
