// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scripted sink for tests.

use super::{DeliveryError, DeliverySink};
use crate::reading::Reading;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Default)]
struct State {
    /// Outcomes consumed one per attempt; empty means "use `available`".
    script: VecDeque<bool>,
    available: bool,
    attempts: Vec<Reading>,
    delivered: Vec<Reading>,
}

/// Sink whose outcomes are scripted by the test.
///
/// Clones share state, so a test can keep a handle after moving the sink
/// into an [`IngestionLoop`](crate::IngestionLoop).
#[derive(Debug, Clone)]
pub struct MockSink {
    state: Arc<Mutex<State>>,
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSink {
    /// A sink that accepts everything.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                available: true,
                ..State::default()
            })),
        }
    }

    /// A sink that fails everything until made available.
    pub fn unavailable() -> Self {
        let sink = Self::new();
        sink.set_available(false);
        sink
    }

    /// Default outcome once the script is exhausted.
    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    /// Queue explicit outcomes for the next attempts, in order.
    pub fn script(&self, outcomes: impl IntoIterator<Item = bool>) {
        self.state.lock().script.extend(outcomes);
    }

    /// Every reading offered, including failed attempts.
    pub fn attempts(&self) -> Vec<Reading> {
        self.state.lock().attempts.clone()
    }

    /// Readings that were accepted, in delivery order.
    pub fn delivered(&self) -> Vec<Reading> {
        self.state.lock().delivered.clone()
    }
}

impl DeliverySink for MockSink {
    fn deliver(&self, reading: &Reading) -> Result<(), DeliveryError> {
        let mut state = self.state.lock();
        state.attempts.push(reading.clone());

        let ok = match state.script.pop_front() {
            Some(outcome) => outcome,
            None => state.available,
        };

        if ok {
            state.delivered.push(reading.clone());
            Ok(())
        } else {
            Err(DeliveryError::Network("mock sink unavailable".into()))
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
