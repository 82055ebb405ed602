// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! AirRohr (Sensor.Community) particulate station, polled over HTTP.
//!
//! The firmware serves `/data.json`:
//!
//! ```json
//! {"sensordatavalues": [
//!     {"value_type": "SDS_P1", "value": "12.30"},
//!     {"value_type": "BME280_pressure", "value": "100325.00"},
//!     {"value_type": "signal", "value": "-67"}
//! ]}
//! ```

use super::{ReadingSource, SourceError, AIRROHR_INTERVAL, DEFAULT_COOLDOWN};
use crate::config::Timing;
use crate::reading::{AirReading, Reading, ReadingKind, SensorId};
use chrono::Utc;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct StationData {
    #[serde(default)]
    sensordatavalues: Vec<DataValue>,
}

#[derive(Debug, Deserialize)]
struct DataValue {
    value_type: String,
    #[serde(default)]
    value: serde_json::Value,
}

fn number(value_type: &str, value: &serde_json::Value) -> Result<f64, SourceError> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Null => Some(0.0),
        _ => None,
    };
    parsed.ok_or_else(|| SourceError::Transient(format!("{}: not a number: {}", value_type, value)))
}

/// Map a station payload to an air reading. Absent values read as 0.
pub fn parse_sensordatavalues(body: &str, sensor_id: SensorId) -> Result<AirReading, SourceError> {
    let data: StationData = serde_json::from_str(body)
        .map_err(|e| SourceError::Transient(format!("bad station payload: {}", e)))?;

    let mut values = HashMap::with_capacity(data.sensordatavalues.len());
    for item in &data.sensordatavalues {
        values.insert(item.value_type.as_str(), number(&item.value_type, &item.value)?);
    }
    let get = |key: &str| values.get(key).copied().unwrap_or(0.0);

    Ok(AirReading {
        time: Utc::now(),
        sensor_id,
        pm10: get("SDS_P1"),
        pm25: get("SDS_P2"),
        temperature: get("BME280_temperature"),
        humidity: get("BME280_humidity"),
        pressure: get("BME280_pressure") / 100.0,
        signal: get("signal").round() as i32,
    })
}

pub struct AirRohrSource {
    client: Client,
    url: String,
    sensor_id: SensorId,
}

impl AirRohrSource {
    pub fn new(url: impl Into<String>, sensor_id: SensorId, timeout: Duration) -> Result<Self, SourceError> {
        let url = url.into();
        reqwest::Url::parse(&url)
            .map_err(|e| SourceError::Unavailable(format!("{}: {}", url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            url,
            sensor_id,
        })
    }
}

impl ReadingSource for AirRohrSource {
    fn kind(&self) -> ReadingKind {
        ReadingKind::Air
    }

    fn read(&mut self) -> Result<Reading, SourceError> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| SourceError::Transient(format!("{}: {}", self.url, e)))?;

        Ok(Reading::Air(parse_sensordatavalues(&body, self.sensor_id)?))
    }

    fn timing(&self) -> Timing {
        Timing {
            interval: AIRROHR_INTERVAL,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}
