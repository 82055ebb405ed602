// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sensor readings and sensor metadata.
//!
//! A [`Reading`] is one timestamped measurement from one sensor. The three
//! kinds share `sensor_id` and `time`; everything else is kind specific.
//!
//! Submission payloads (what a sink sends to the ingestion API) carry no kind
//! field, the kind is implied by the endpoint. Broadcast payloads are the
//! tagged [`Reading`] form, which adds `"type": "temperature" | "air" | "indoor"`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Externally assigned, never reused sensor identity.
pub type SensorId = u32;

/// Measurement family of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingKind {
    /// Temperature / humidity / (optional) pressure.
    Temperature,
    /// Particulate matter plus the station's own ambient values.
    Air,
    /// Indoor air-quality index, TVOC and eCO2.
    Indoor,
}

impl ReadingKind {
    /// All kinds, in a stable order.
    pub const ALL: [ReadingKind; 3] = [
        ReadingKind::Temperature,
        ReadingKind::Air,
        ReadingKind::Indoor,
    ];

    /// Path segment / tag used for this kind on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingKind::Temperature => "temperature",
            ReadingKind::Air => "air",
            ReadingKind::Indoor => "indoor",
        }
    }
}

impl fmt::Display for ReadingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temperature" | "temp" => Ok(ReadingKind::Temperature),
            "air" => Ok(ReadingKind::Air),
            "indoor" => Ok(ReadingKind::Indoor),
            other => Err(format!("unknown reading kind: {}", other)),
        }
    }
}

/// Temperature / humidity / pressure reading (BME280, DHT22).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub time: DateTime<Utc>,
    pub sensor_id: SensorId,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Relative humidity, percent.
    pub humidity: f64,
    /// hPa. DHT22 has no barometer.
    #[serde(default)]
    pub pressure: Option<f64>,
}

/// Particulate reading from an AirRohr station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirReading {
    pub time: DateTime<Utc>,
    pub sensor_id: SensorId,
    /// PM10, µg/m³.
    #[serde(alias = "p1")]
    pub pm10: f64,
    /// PM2.5, µg/m³.
    #[serde(alias = "p2")]
    pub pm25: f64,
    pub temperature: f64,
    pub humidity: f64,
    /// hPa.
    pub pressure: f64,
    /// WiFi signal strength, dBm.
    #[serde(default)]
    pub signal: i32,
}

/// Indoor air quality reading (ENS160).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndoorReading {
    pub time: DateTime<Utc>,
    pub sensor_id: SensorId,
    /// Device validity flag (0 normal, 1 warm-up, 2 initial start-up).
    #[serde(default)]
    pub status: u8,
    /// UBA air quality index, 1-5.
    pub aqi: u8,
    /// Total volatile organic compounds, ppb.
    pub tvoc: u32,
    /// Equivalent CO2, ppm.
    pub eco2: u32,
}

/// One timestamped measurement from one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Reading {
    Temperature(TemperatureReading),
    Air(AirReading),
    Indoor(IndoorReading),
}

impl Reading {
    pub fn kind(&self) -> ReadingKind {
        match self {
            Reading::Temperature(_) => ReadingKind::Temperature,
            Reading::Air(_) => ReadingKind::Air,
            Reading::Indoor(_) => ReadingKind::Indoor,
        }
    }

    pub fn sensor_id(&self) -> SensorId {
        match self {
            Reading::Temperature(r) => r.sensor_id,
            Reading::Air(r) => r.sensor_id,
            Reading::Indoor(r) => r.sensor_id,
        }
    }

    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Reading::Temperature(r) => r.time,
            Reading::Air(r) => r.time,
            Reading::Indoor(r) => r.time,
        }
    }

    /// Untagged submission body, as POSTed to the kind's ingestion endpoint.
    pub fn submission_json(&self) -> serde_json::Value {
        let value = match self {
            Reading::Temperature(r) => serde_json::to_value(r),
            Reading::Air(r) => serde_json::to_value(r),
            Reading::Indoor(r) => serde_json::to_value(r),
        };
        value.unwrap_or(serde_json::Value::Null)
    }

    /// Parse an untagged submission body for a kind known from the route.
    pub fn from_submission(
        kind: ReadingKind,
        body: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            ReadingKind::Temperature => Reading::Temperature(serde_json::from_value(body)?),
            ReadingKind::Air => Reading::Air(serde_json::from_value(body)?),
            ReadingKind::Indoor => Reading::Indoor(serde_json::from_value(body)?),
        })
    }

    /// Tagged JSON text pushed to real-time subscribers.
    pub fn broadcast_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Temperature(r) => {
                write!(
                    f,
                    "Temperature: {:.2} °C\tHumidity: {:.2} %",
                    r.temperature, r.humidity
                )?;
                if let Some(p) = r.pressure {
                    write!(f, "\tPressure: {:.2} hPa", p)?;
                }
            }
            Reading::Air(r) => write!(
                f,
                "PM10: {:.2} µg/m³\tPM2.5: {:.2} µg/m³\tTemperature: {:.2} °C\tHumidity: {:.2} %\tPressure: {:.2} hPa\tSignal: {} dBm",
                r.pm10, r.pm25, r.temperature, r.humidity, r.pressure, r.signal
            )?,
            Reading::Indoor(r) => write!(
                f,
                "status: {}\tAQI: {} (1-5)\tTVOC: {} (ppb)\teCO2: {} (ppm)",
                r.status, r.aqi, r.tvoc, r.eco2
            )?,
        }
        write!(f, "\tTime: {}", self.time().to_rfc3339())
    }
}

/// A registered sensor. Created administratively, read-only to ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub id: SensorId,
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
}
