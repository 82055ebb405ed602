// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client (agent) configuration.
//!
//! Settings come from an optional TOML file overlaid with command-line and
//! environment values, then resolve once into a validated [`ClientConfig`].
//!
//! ```toml
//! sensor_id = 1
//! send_to_api = true
//! api_url = "http://192.168.1.10:8000/api"
//! delivery_timeout_secs = 10
//! retry_buffer_limit = 5000
//! ```

use crate::reading::SensorId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default per-request delivery timeout.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sensor id is not set")]
    MissingSensorId,

    #[error("no sink selected: enable exactly one of the time-series or API sinks")]
    NoSink,

    #[error("both sinks selected: enable exactly one of the time-series or API sinks")]
    BothSinks,

    #[error("missing destination: {0}")]
    MissingDestination(&'static str),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Process exit status for this error.
    ///
    /// 4 (hardware unavailable) is reserved for source initialisation.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConfigError::MissingSensorId => 1,
            ConfigError::NoSink => 2,
            ConfigError::BothSinks => 3,
            ConfigError::MissingDestination(_) => 5,
            ConfigError::Io { .. } | ConfigError::Toml(_) | ConfigError::Invalid(_) => 6,
        }
    }
}

/// Direct insert into the local structured store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeriesTarget {
    pub database: PathBuf,
}

/// Networked ingestion API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiTarget {
    /// Base URL, e.g. `http://host:8000/api`. No trailing slash.
    pub base_url: String,
}

/// The one delivery sink active for a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkSelection {
    TimeSeries(TimeSeriesTarget),
    Api(ApiTarget),
}

/// Source-dependent timing defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub interval: Duration,
    pub cooldown: Duration,
}

/// Unvalidated settings, as read from file, flags or environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSettings {
    pub sensor_id: Option<SensorId>,
    pub send_to_timeseries: Option<bool>,
    pub send_to_api: Option<bool>,
    pub api_url: Option<String>,
    pub timeseries_db: Option<PathBuf>,
    pub delivery_timeout_secs: Option<u64>,
    pub retry_buffer_limit: Option<usize>,
    pub interval_secs: Option<u64>,
    pub cooldown_secs: Option<u64>,
}

impl ClientSettings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Overlay `other` on top of `self`; values set in `other` win.
    pub fn merge(self, other: ClientSettings) -> ClientSettings {
        ClientSettings {
            sensor_id: other.sensor_id.or(self.sensor_id),
            send_to_timeseries: other.send_to_timeseries.or(self.send_to_timeseries),
            send_to_api: other.send_to_api.or(self.send_to_api),
            api_url: other.api_url.or(self.api_url),
            timeseries_db: other.timeseries_db.or(self.timeseries_db),
            delivery_timeout_secs: other.delivery_timeout_secs.or(self.delivery_timeout_secs),
            retry_buffer_limit: other.retry_buffer_limit.or(self.retry_buffer_limit),
            interval_secs: other.interval_secs.or(self.interval_secs),
            cooldown_secs: other.cooldown_secs.or(self.cooldown_secs),
        }
    }

    /// Validate and resolve into a [`ClientConfig`].
    ///
    /// Checks run in exit-code order: identity, sink count, destination.
    pub fn resolve(self, defaults: Timing) -> Result<ClientConfig, ConfigError> {
        let sensor_id = self.sensor_id.ok_or(ConfigError::MissingSensorId)?;

        let timeseries = self.send_to_timeseries.unwrap_or(false);
        let api = self.send_to_api.unwrap_or(false);
        let sink = match (timeseries, api) {
            (false, false) => return Err(ConfigError::NoSink),
            (true, true) => return Err(ConfigError::BothSinks),
            (true, false) => {
                let database = self
                    .timeseries_db
                    .filter(|p| !p.as_os_str().is_empty())
                    .ok_or(ConfigError::MissingDestination("time-series database path"))?;
                SinkSelection::TimeSeries(TimeSeriesTarget { database })
            }
            (false, true) => {
                let base_url = self
                    .api_url
                    .map(|u| u.trim().trim_end_matches('/').to_string())
                    .filter(|u| !u.is_empty())
                    .ok_or(ConfigError::MissingDestination("API base URL"))?;
                SinkSelection::Api(ApiTarget { base_url })
            }
        };

        let delivery_timeout = self
            .delivery_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_DELIVERY_TIMEOUT);
        if delivery_timeout.is_zero() {
            return Err(ConfigError::Invalid("delivery timeout must be positive".into()));
        }

        let interval = self
            .interval_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.interval);
        if interval.is_zero() {
            return Err(ConfigError::Invalid("polling interval must be positive".into()));
        }

        Ok(ClientConfig {
            sensor_id,
            sink,
            delivery_timeout,
            retry_buffer_limit: self.retry_buffer_limit.filter(|l| *l > 0),
            interval,
            cooldown: self
                .cooldown_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.cooldown),
        })
    }
}

/// Validated client configuration, built once in `main`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub sensor_id: SensorId,
    pub sink: SinkSelection,
    pub delivery_timeout: Duration,
    /// `None` keeps every failed delivery.
    pub retry_buffer_limit: Option<usize>,
    pub interval: Duration,
    pub cooldown: Duration,
}

impl ClientConfig {
    /// Configuration for tests and embedding: API sink, default timings.
    pub fn api(sensor_id: SensorId, base_url: impl Into<String>, timing: Timing) -> Self {
        Self {
            sensor_id,
            sink: SinkSelection::Api(ApiTarget {
                base_url: base_url.into(),
            }),
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            retry_buffer_limit: None,
            interval: timing.interval,
            cooldown: timing.cooldown,
        }
    }
}
