// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-sensor ingestion loop.
//!
//! ```text
//! Idle -> DrainBuffer -> Read -> Validate -> Deliver -> Sleep -> Idle
//!                          |         |          |
//!                          |         |          +-- failure: append to RetryBuffer
//!                          |         +-- reject: discard (never buffered)
//!                          +-- read error: sleep cooldown, retry Read
//! ```
//!
//! A retried read skips DrainBuffer; the buffer is drained again at the start
//! of the next full cycle.
//!
//! The loop is blocking and owns its retry buffer. It ends only when its
//! [`StopHandle`] is triggered; sleeps wake immediately on stop.

use crate::buffer::RetryBuffer;
use crate::config::{ClientConfig, Timing};
use crate::reading::Reading;
use crate::sink::DeliverySink;
use crate::source::{ReadingSource, SourceError};
use crate::validate::{self, Rejection};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct StopInner {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Handle to stop a running loop (Ctrl+C, tests).
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    inner: Arc<StopInner>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the loop to stop. Wakes any sleep in progress.
    pub fn stop(&self) {
        *self.inner.stopped.lock() = true;
        self.inner.wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.stopped.lock()
    }

    /// Sleep for `duration` unless stopped first.
    ///
    /// Returns `true` if the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut stopped = self.inner.stopped.lock();
        while !*stopped {
            if self.inner.wake.wait_until(&mut stopped, deadline).timed_out() {
                return !*stopped;
            }
        }
        false
    }
}

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    DrainBuffer,
    Read,
    Validate,
    Deliver,
    Sleep,
    Stopped,
}

/// What happened to this cycle's fresh reading.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Delivered on first attempt.
    Delivered,
    /// Delivery failed; the reading is now at the back of the buffer.
    Buffered,
    /// Out of range; discarded.
    Rejected(Rejection),
    /// The source failed; no reading this cycle.
    ReadFailed { transient: bool, reason: String },
}

/// Result of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Buffered readings delivered during DrainBuffer.
    pub drained: usize,
    pub outcome: CycleOutcome,
    /// Buffer size at the end of the cycle.
    pub buffered: usize,
}

/// Loop counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub delivered: u64,
    pub redelivered: u64,
    pub rejected: u64,
    pub read_failures: u64,
    pub delivery_failures: u64,
}

/// Read -> validate -> deliver -> buffer loop for one sensor.
pub struct IngestionLoop<S, K> {
    source: S,
    sink: K,
    buffer: RetryBuffer,
    timing: Timing,
    state: LoopState,
    stats: LoopStats,
    stop: StopHandle,
}

impl<S: ReadingSource, K: DeliverySink> IngestionLoop<S, K> {
    /// Loop with the source's own timing and an unbounded buffer.
    pub fn new(source: S, sink: K) -> Self {
        let timing = source.timing();
        Self {
            source,
            sink,
            buffer: RetryBuffer::new(),
            timing,
            state: LoopState::Idle,
            stats: LoopStats::default(),
            stop: StopHandle::new(),
        }
    }

    /// Loop with timing and buffer bound taken from a validated configuration.
    pub fn from_config(source: S, sink: K, config: &ClientConfig) -> Self {
        Self::new(source, sink)
            .with_timing(Timing {
                interval: config.interval,
                cooldown: config.cooldown,
            })
            .with_buffer_limit(config.retry_buffer_limit)
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_buffer_limit(mut self, limit: Option<usize>) -> Self {
        self.buffer = RetryBuffer::with_limit(limit);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn buffer(&self) -> &RetryBuffer {
        &self.buffer
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Run one cycle without the trailing sleep.
    pub fn run_cycle(&mut self) -> CycleReport {
        self.stats.cycles += 1;

        self.state = LoopState::DrainBuffer;
        let drained = self.drain();

        let outcome = self.read();

        self.state = LoopState::Idle;
        CycleReport {
            drained,
            outcome,
            buffered: self.buffer.len(),
        }
    }

    /// Retry Read after a failed read, without draining the buffer first.
    pub fn retry_read(&mut self) -> CycleReport {
        let outcome = self.read();

        self.state = LoopState::Idle;
        CycleReport {
            drained: 0,
            outcome,
            buffered: self.buffer.len(),
        }
    }

    /// Run cycles until stopped.
    pub fn run(&mut self) -> LoopStats {
        tracing::info!(
            sink = self.sink.name(),
            kind = %self.source.kind(),
            interval_secs = self.timing.interval.as_secs(),
            "ingestion loop started"
        );

        let mut retry = false;
        while !self.stop.is_stopped() {
            let report = if retry {
                self.retry_read()
            } else {
                self.run_cycle()
            };

            retry = matches!(report.outcome, CycleOutcome::ReadFailed { .. });
            let pause = if retry {
                self.timing.cooldown
            } else {
                self.timing.interval
            };

            self.state = LoopState::Sleep;
            if !self.stop.sleep(pause) {
                break;
            }
            self.state = LoopState::Idle;
        }

        self.state = LoopState::Stopped;
        tracing::info!(
            cycles = self.stats.cycles,
            delivered = self.stats.delivered,
            buffered = self.buffer.len(),
            "ingestion loop stopped"
        );
        self.stats
    }

    fn drain(&mut self) -> usize {
        if self.buffer.is_empty() {
            return 0;
        }

        let sink = &self.sink;
        let result = self.buffer.drain(|reading| match sink.deliver(reading) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(sensor_id = reading.sensor_id(), "redelivery failed: {}", e);
                false
            }
        });

        self.stats.redelivered += result.delivered as u64;
        if result.remaining > 0 {
            tracing::warn!(
                buffered = result.remaining,
                "failed to resend buffered readings, will retry later"
            );
        } else {
            tracing::info!(delivered = result.delivered, "retry buffer drained");
        }
        result.delivered
    }

    fn read(&mut self) -> CycleOutcome {
        self.state = LoopState::Read;
        match self.source.read() {
            Ok(reading) => self.handle(reading),
            Err(e) => self.read_failed(e),
        }
    }

    fn handle(&mut self, reading: Reading) -> CycleOutcome {
        tracing::info!(sensor_id = reading.sensor_id(), "{}", reading);

        self.state = LoopState::Validate;
        if let Err(rejection) = validate::check(&reading) {
            self.stats.rejected += 1;
            tracing::warn!(sensor_id = reading.sensor_id(), "reading rejected: {}", rejection);
            return CycleOutcome::Rejected(rejection);
        }

        self.state = LoopState::Deliver;
        match self.sink.deliver(&reading) {
            Ok(()) => {
                self.stats.delivered += 1;
                CycleOutcome::Delivered
            }
            Err(e) => {
                self.stats.delivery_failures += 1;
                let sensor_id = reading.sensor_id();
                if let Some(evicted) = self.buffer.push(reading) {
                    tracing::warn!(
                        sensor_id,
                        dropped = self.buffer.dropped(),
                        "retry buffer full, dropped reading from {}",
                        evicted.reading.time().to_rfc3339()
                    );
                }
                tracing::warn!(
                    sensor_id,
                    buffered = self.buffer.len(),
                    "failed to send new reading ({}), will buffer and retry later",
                    e
                );
                CycleOutcome::Buffered
            }
        }
    }

    fn read_failed(&mut self, err: SourceError) -> CycleOutcome {
        self.stats.read_failures += 1;
        let transient = err.is_transient();
        if transient {
            tracing::warn!("failed to read from sensor ({}), retrying", err);
        } else {
            tracing::error!("sensor unavailable ({}), retrying", err);
        }
        CycleOutcome::ReadFailed {
            transient,
            reason: err.to_string(),
        }
    }
}
