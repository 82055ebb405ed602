// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Housekeeping task behind the scheduler toggle.
//!
//! While enabled, every period the task trims each sensor's history to the
//! newest `retention` readings per kind and logs broadcast statistics. It
//! never touches the ingestion path.

use crate::broadcast::BroadcastRouter;
use airwatch::{ReadingStore, StoreError};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Process-wide scheduler toggle and its settings.
pub struct Scheduler {
    enabled: AtomicBool,
    period: Duration,
    retention: usize,
    runs: AtomicU64,
}

/// Snapshot returned by `GET /api/scheduler/`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub period_secs: u64,
    pub retention: usize,
    pub runs: u64,
}

impl Scheduler {
    pub fn new(enabled: bool, period: Duration, retention: usize) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            period: period.max(Duration::from_secs(1)),
            retention,
            runs: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!("scheduler {}", if enabled { "enabled" } else { "disabled" });
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            enabled: self.is_enabled(),
            period_secs: self.period.as_secs(),
            retention: self.retention,
            runs: self.runs.load(Ordering::Relaxed),
        }
    }

    /// One housekeeping pass. Blocking: call from a blocking thread.
    pub fn run_once(
        &self,
        store: &dyn ReadingStore,
        router: &BroadcastRouter,
    ) -> Result<usize, StoreError> {
        self.runs.fetch_add(1, Ordering::Relaxed);

        let deleted = if self.retention > 0 {
            store.apply_retention(self.retention)?
        } else {
            0
        };

        let stats = router.stats();
        info!(
            deleted,
            topics = stats.topics,
            subscribers = stats.subscribers,
            published = stats.published,
            evicted = stats.evicted,
            "scheduled housekeeping"
        );
        Ok(deleted)
    }

    /// Spawn the periodic task. Ticks while disabled are skipped.
    pub fn spawn(
        self: Arc<Self>,
        store: Arc<dyn ReadingStore>,
        router: Arc<BroadcastRouter>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            // First tick fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !self.is_enabled() {
                    debug!("scheduler tick skipped (disabled)");
                    continue;
                }

                let scheduler = Arc::clone(&self);
                let store = Arc::clone(&store);
                let router = Arc::clone(&router);
                let result =
                    tokio::task::spawn_blocking(move || scheduler.run_once(store.as_ref(), &router))
                        .await;

                match result {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!("housekeeping failed: {}", e),
                    Err(e) => warn!("housekeeping task panicked: {}", e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::TopicShape;
    use airwatch::{Reading, ReadingKind, Sensor, SqliteStore, TemperatureReading};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    #[test]
    fn test_toggle() {
        let scheduler = Scheduler::new(false, Duration::from_secs(60), 10);
        assert!(!scheduler.is_enabled());

        scheduler.set_enabled(true);
        assert!(scheduler.status().enabled);
        assert_eq!(scheduler.status().period_secs, 60);
    }

    #[test]
    fn test_run_once_applies_retention() {
        let store = SqliteStore::new_in_memory().unwrap();
        store
            .create_sensor(&Sensor {
                id: 1,
                sensor_type: "bme280".into(),
                name: "Hall".into(),
                location: None,
                comments: None,
            })
            .unwrap();

        let start = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        for i in 0..5 {
            store
                .insert_reading(&Reading::Temperature(TemperatureReading {
                    time: start + ChronoDuration::minutes(i),
                    sensor_id: 1,
                    temperature: 20.0,
                    humidity: 50.0,
                    pressure: None,
                }))
                .unwrap();
        }

        let router = BroadcastRouter::new(TopicShape::Global, 4);
        let scheduler = Scheduler::new(true, Duration::from_secs(60), 2);

        assert_eq!(scheduler.run_once(&store, &router).unwrap(), 3);
        assert_eq!(store.count(ReadingKind::Temperature).unwrap(), 2);
        assert_eq!(scheduler.status().runs, 1);
    }
}
