// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! airwatch - environmental sensor ingestion
//!
//! Collects periodic readings from edge sensors, validates them and delivers
//! them to exactly one sink, buffering anything that fails delivery until a
//! later cycle succeeds.
//!
//! # Architecture
//!
//! ```text
//! ReadingSource --> validate --> DeliverySink --> IngestionEndpoint --> Publish
//!                                    |
//!                                    +--(failure)--> RetryBuffer (drained first every cycle)
//! ```
//!
//! # Components
//!
//! - [`source`] -- Device drivers (BME280, DHT22, ENS160, AirRohr) behind [`ReadingSource`]
//! - [`validate`] -- Range table for every measured field
//! - [`sink`] -- [`DeliverySink`] with the time-series and API variants
//! - [`buffer`] -- FIFO [`RetryBuffer`] of failed deliveries
//! - [`ingestion`] -- The per-sensor [`IngestionLoop`]
//! - [`endpoint`] -- Store-then-publish [`IngestionEndpoint`]
//! - [`store`] -- Storage collaborator ([`ReadingStore`], SQLite backend)
//!
//! # Example
//!
//! ```ignore
//! use airwatch::config::ClientSettings;
//! use airwatch::source::{Dht22Source, ReadingSource};
//! use airwatch::IngestionLoop;
//!
//! let source = Dht22Source::open("/sys/bus/iio/devices/iio:device0", 2)?;
//! let config = ClientSettings::from_file("agent.toml")?.resolve(source.timing())?;
//! let sink = airwatch::sink::open(&config)?;
//! let mut ingestion = IngestionLoop::from_config(source, sink, &config);
//! ingestion.run();
//! ```

pub mod buffer;
pub mod config;
pub mod endpoint;
pub mod ingestion;
pub mod reading;
pub mod sink;
pub mod source;
pub mod store;
pub mod validate;

pub use buffer::{RetryBuffer, RetryEntry};
pub use config::{
    ApiTarget, ClientConfig, ClientSettings, ConfigError, SinkSelection, TimeSeriesTarget, Timing,
};
pub use endpoint::{IngestError, IngestionEndpoint, NullPublisher, Publish};
pub use ingestion::{CycleOutcome, CycleReport, IngestionLoop, LoopState, LoopStats, StopHandle};
pub use reading::{
    AirReading, IndoorReading, Reading, ReadingKind, Sensor, SensorId, TemperatureReading,
};
pub use sink::{DeliveryError, DeliverySink, MockSink};
pub use source::{MockSource, ReadingSource, SourceError};
pub use store::{LatestReadings, ReadingStore, SqliteStore, StoreError};
pub use validate::{check, validate, Rejection};
