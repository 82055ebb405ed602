// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Delivery sinks.
//!
//! Exactly one sink is active per deployment:
//!
//! - [`TimeSeriesSink`] inserts straight into the local reading store
//! - [`ApiSink`] POSTs to the HTTP ingestion API
//!
//! A delivery either succeeds (the reading is durable) or fails with a
//! [`DeliveryError`]; every failure is treated as transient by the loop.

mod api;
mod mock;
mod timeseries;

pub use api::ApiSink;
pub use mock::MockSink;
pub use timeseries::TimeSeriesSink;

use crate::config::{ClientConfig, SinkSelection};
use crate::reading::Reading;
use thiserror::Error;

/// Delivery failures.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("destination unreachable: {0}")]
    Network(String),

    #[error("delivery timed out")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed destination: {0}")]
    InvalidDestination(String),

    #[error("insert failed: {0}")]
    Insert(String),
}

/// Single capability: deliver one reading.
pub trait DeliverySink: Send {
    fn deliver(&self, reading: &Reading) -> Result<(), DeliveryError>;

    /// Short label for logs.
    fn name(&self) -> &'static str;
}

impl<S: DeliverySink + ?Sized> DeliverySink for Box<S> {
    fn deliver(&self, reading: &Reading) -> Result<(), DeliveryError> {
        (**self).deliver(reading)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Build the sink selected by the configuration.
pub fn open(config: &ClientConfig) -> Result<Box<dyn DeliverySink>, DeliveryError> {
    match &config.sink {
        SinkSelection::TimeSeries(target) => Ok(Box::new(TimeSeriesSink::open(
            &target.database,
            config.delivery_timeout,
        )?)),
        SinkSelection::Api(target) => Ok(Box::new(ApiSink::new(
            &target.base_url,
            config.delivery_timeout,
        )?)),
    }
}
