// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scripted source for tests.

use super::{ReadingSource, SourceError};
use crate::config::Timing;
use crate::reading::{Reading, ReadingKind};
use std::collections::VecDeque;
use std::time::Duration;

/// Replays a fixed sequence of read results.
///
/// Once the script is exhausted every read fails transiently.
#[derive(Debug)]
pub struct MockSource {
    kind: ReadingKind,
    script: VecDeque<Result<Reading, String>>,
    timing: Timing,
    reads: usize,
}

impl MockSource {
    pub fn new(kind: ReadingKind) -> Self {
        Self {
            kind,
            script: VecDeque::new(),
            timing: Timing {
                interval: Duration::from_millis(1),
                cooldown: Duration::from_millis(1),
            },
            reads: 0,
        }
    }

    /// Queue a successful read.
    pub fn push(mut self, reading: Reading) -> Self {
        self.script.push_back(Ok(reading));
        self
    }

    /// Queue a transient failure.
    pub fn push_transient(mut self, reason: &str) -> Self {
        self.script.push_back(Err(reason.to_string()));
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Number of `read` calls so far.
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl ReadingSource for MockSource {
    fn kind(&self) -> ReadingKind {
        self.kind
    }

    fn read(&mut self) -> Result<Reading, SourceError> {
        self.reads += 1;
        match self.script.pop_front() {
            Some(Ok(reading)) => Ok(reading),
            Some(Err(reason)) => Err(SourceError::Transient(reason)),
            None => Err(SourceError::Transient("script exhausted".into())),
        }
    }

    fn timing(&self) -> Timing {
        self.timing
    }
}
