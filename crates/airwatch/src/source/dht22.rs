// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DHT22 (AM2302) through the Linux IIO `dht11` driver.
//!
//! The driver exposes milli-degrees and milli-percent in sysfs and fails reads
//! with `EIO` / `ETIMEDOUT` whenever the one-wire handshake glitches, which on
//! a Raspberry Pi is several times an hour.

use super::{ReadingSource, SourceError};
use crate::reading::{Reading, ReadingKind, SensorId, TemperatureReading};
use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_DEVICE: &str = "/sys/bus/iio/devices/iio:device0";

const TEMP_FILE: &str = "in_temp_input";
const HUMIDITY_FILE: &str = "in_humidityrelative_input";

pub struct Dht22Source {
    device: PathBuf,
    sensor_id: SensorId,
}

impl Dht22Source {
    /// Bind to an IIO device directory.
    pub fn open(device: impl Into<PathBuf>, sensor_id: SensorId) -> Result<Self, SourceError> {
        let device = device.into();
        for file in [TEMP_FILE, HUMIDITY_FILE] {
            if !device.join(file).exists() {
                return Err(SourceError::Unavailable(format!(
                    "{} has no {}; is the dht11 overlay loaded?",
                    device.display(),
                    file
                )));
            }
        }
        Ok(Self { device, sensor_id })
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    fn read_milli(&self, file: &str) -> Result<f64, SourceError> {
        let path = self.device.join(file);
        let raw = fs::read_to_string(&path).map_err(|e| classify(&path, e))?;
        let milli: i64 = raw.trim().parse().map_err(|_| {
            SourceError::Transient(format!("{}: unparsable value {:?}", path.display(), raw.trim()))
        })?;
        Ok(milli as f64 / 1000.0)
    }
}

fn classify(path: &Path, err: io::Error) -> SourceError {
    match err.raw_os_error() {
        Some(libc::EIO) | Some(libc::ETIMEDOUT) | Some(libc::EAGAIN) => {
            SourceError::Transient(format!("{}: {}", path.display(), err))
        }
        _ => SourceError::Unavailable(format!("{}: {}", path.display(), err)),
    }
}

impl ReadingSource for Dht22Source {
    fn kind(&self) -> ReadingKind {
        ReadingKind::Temperature
    }

    fn read(&mut self) -> Result<Reading, SourceError> {
        let temperature = self.read_milli(TEMP_FILE)?;
        let humidity = self.read_milli(HUMIDITY_FILE)?;

        Ok(Reading::Temperature(TemperatureReading {
            time: Utc::now(),
            sensor_id: self.sensor_id,
            temperature,
            humidity,
            pressure: None,
        }))
    }
}
