// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Retry buffer for readings that failed delivery.
//!
//! Entries keep their enqueue order. A drain pass offers every entry to the
//! sink exactly once, oldest first, and keeps only the ones that failed again.
//! Identical readings are kept as separate entries.
//!
//! The buffer is unbounded unless a limit is configured; with a limit the
//! oldest entry is evicted to make room and counted as dropped.

use crate::reading::Reading;
use std::collections::VecDeque;
use std::time::Instant;

/// A reading waiting for redelivery.
#[derive(Debug, Clone)]
pub struct RetryEntry {
    pub reading: Reading,
    pub enqueued_at: Instant,
}

/// Result of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Entries that were delivered and removed.
    pub delivered: usize,
    /// Entries that failed again and stay buffered.
    pub remaining: usize,
}

/// FIFO queue of readings pending redelivery, owned by one ingestion loop.
#[derive(Debug, Default)]
pub struct RetryBuffer {
    entries: VecDeque<RetryEntry>,
    limit: Option<usize>,
    dropped: u64,
}

impl RetryBuffer {
    /// Create an unbounded buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer holding at most `limit` entries (`None` = unbounded).
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.filter(|l| *l > 0),
            dropped: 0,
        }
    }

    /// Append a reading at the back.
    ///
    /// Returns the evicted oldest entry if the buffer was at its limit.
    pub fn push(&mut self, reading: Reading) -> Option<RetryEntry> {
        let evicted = match self.limit {
            Some(limit) if self.entries.len() >= limit => {
                self.dropped += 1;
                self.entries.pop_front()
            }
            _ => None,
        };

        self.entries.push_back(RetryEntry {
            reading,
            enqueued_at: Instant::now(),
        });

        evicted
    }

    /// Offer every entry to `deliver` once, oldest first.
    ///
    /// Entries for which `deliver` returns `true` are removed; the rest keep
    /// their relative order.
    pub fn drain<F>(&mut self, mut deliver: F) -> DrainStats
    where
        F: FnMut(&Reading) -> bool,
    {
        let pending = std::mem::take(&mut self.entries);
        let mut stats = DrainStats::default();

        for entry in pending {
            if deliver(&entry.reading) {
                stats.delivered += 1;
            } else {
                self.entries.push_back(entry);
            }
        }

        stats.remaining = self.entries.len();
        stats
    }

    /// Number of buffered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries evicted because of the limit since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Iterate entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &RetryEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::TemperatureReading;
    use chrono::Utc;

    fn reading(temperature: f64) -> Reading {
        Reading::Temperature(TemperatureReading {
            time: Utc::now(),
            sensor_id: 1,
            temperature,
            humidity: 50.0,
            pressure: None,
        })
    }

    fn temperatures(buf: &RetryBuffer) -> Vec<f64> {
        buf.iter()
            .map(|e| match &e.reading {
                Reading::Temperature(r) => r.temperature,
                _ => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn test_drain_attempts_in_enqueue_order() {
        let mut buf = RetryBuffer::new();
        buf.push(reading(1.0));
        buf.push(reading(2.0));
        buf.push(reading(3.0));

        let mut attempted = Vec::new();
        let stats = buf.drain(|r| {
            if let Reading::Temperature(t) = r {
                attempted.push(t.temperature);
            }
            true
        });

        assert_eq!(attempted, vec![1.0, 2.0, 3.0]);
        assert_eq!(stats.delivered, 3);
        assert_eq!(stats.remaining, 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_drain_keeps_failures_in_order() {
        let mut buf = RetryBuffer::new();
        for t in [1.0, 2.0, 3.0, 4.0] {
            buf.push(reading(t));
        }

        // Only even temperatures get through
        let stats = buf.drain(|r| match r {
            Reading::Temperature(t) => (t.temperature as i64) % 2 == 0,
            _ => false,
        });

        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.remaining, 2);
        assert_eq!(temperatures(&buf), vec![1.0, 3.0]);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let mut buf = RetryBuffer::new();
        let r = reading(21.0);
        buf.push(r.clone());
        buf.push(r);

        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_each_entry_offered_once_per_drain() {
        let mut buf = RetryBuffer::new();
        buf.push(reading(1.0));
        buf.push(reading(2.0));

        let mut calls = 0;
        buf.drain(|_| {
            calls += 1;
            false
        });

        assert_eq!(calls, 2);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_limit_evicts_oldest() {
        let mut buf = RetryBuffer::with_limit(Some(2));
        assert!(buf.push(reading(1.0)).is_none());
        assert!(buf.push(reading(2.0)).is_none());

        let evicted = buf.push(reading(3.0)).expect("oldest evicted");
        match evicted.reading {
            Reading::Temperature(t) => assert_eq!(t.temperature, 1.0),
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(temperatures(&buf), vec![2.0, 3.0]);
        assert_eq!(buf.dropped(), 1);
    }

    #[test]
    fn test_zero_limit_means_unbounded() {
        let mut buf = RetryBuffer::with_limit(Some(0));
        for t in 0..100 {
            buf.push(reading(t as f64));
        }
        assert_eq!(buf.len(), 100);
        assert_eq!(buf.dropped(), 0);
    }
}
