// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reading sources (device drivers).
//!
//! | Source      | Bus                 | Reading     | Interval | Cooldown |
//! |-------------|---------------------|-------------|----------|----------|
//! | BME280      | I²C `/dev/i2c-N`    | temperature | 55 s     | 10 s     |
//! | DHT22       | IIO `dht11` sysfs   | temperature | 55 s     | 4 s      |
//! | ENS160      | I²C `/dev/i2c-N`    | indoor      | 55 s     | 10 s     |
//! | AirRohr     | HTTP JSON           | air         | 145 s    | 4 s      |
//!
//! Expected hardware hiccups surface as [`SourceError::Transient`]; the loop
//! logs them, waits the cooldown and reads again.

mod airrohr;
mod bme280;
mod dht22;
mod ens160;
pub mod i2c;
mod mock;

pub use airrohr::{parse_sensordatavalues, AirRohrSource};
pub use bme280::{Bme280Source, Calibration, DEFAULT_ADDRESS as BME280_ADDRESS};
pub use dht22::{Dht22Source, DEFAULT_DEVICE as DHT22_DEVICE};
pub use ens160::{Ambient, Ens160Source, DEFAULT_ADDRESS as ENS160_ADDRESS};
pub use mock::MockSource;

use crate::config::Timing;
use crate::reading::{Reading, ReadingKind};
use std::time::Duration;
use thiserror::Error;

pub const AMBIENT_INTERVAL: Duration = Duration::from_secs(55);
pub const AIRROHR_INTERVAL: Duration = Duration::from_secs(145);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(4);
pub const I2C_COOLDOWN: Duration = Duration::from_secs(10);

/// Source errors
#[derive(Debug, Error)]
pub enum SourceError {
    /// Recoverable: retry after the cooldown.
    #[error("transient read error: {0}")]
    Transient(String),

    /// The device cannot be initialised.
    #[error("device unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

/// A device that produces readings of one kind.
pub trait ReadingSource: Send {
    fn kind(&self) -> ReadingKind;

    /// Take one measurement.
    fn read(&mut self) -> Result<Reading, SourceError>;

    /// Polling interval and transient-error cooldown for this device.
    fn timing(&self) -> Timing {
        Timing {
            interval: AMBIENT_INTERVAL,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl<S: ReadingSource + ?Sized> ReadingSource for Box<S> {
    fn kind(&self) -> ReadingKind {
        (**self).kind()
    }

    fn read(&mut self) -> Result<Reading, SourceError> {
        (**self).read()
    }

    fn timing(&self) -> Timing {
        (**self).timing()
    }
}

/// Run `open` up to `attempts` times, sleeping `delay` between failures.
///
/// Returns the last error once every attempt failed.
pub fn open_with_retries<T, F>(attempts: u32, delay: Duration, mut open: F) -> Result<T, SourceError>
where
    F: FnMut() -> Result<T, SourceError>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match open() {
            Ok(device) => return Ok(device),
            Err(e) if attempt < attempts => {
                tracing::warn!(attempt, attempts, "device init failed: {}", e);
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
