// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Range validation for sensor readings.
//!
//! Every measured field has an inclusive valid range. A reading with any
//! field outside its range (or NaN) is rejected permanently: it is never
//! buffered, delivered or stored.
//!
//! | Field       | Range            |
//! |-------------|------------------|
//! | temperature | -40 .. 85 °C     |
//! | humidity    | 0 .. 100 %       |
//! | pressure    | 300 .. 1100 hPa  |
//! | pm10, pm25  | 0 .. 1000 µg/m³  |
//! | aqi         | 1 .. 5           |
//! | tvoc        | 0 .. 65000 ppb   |
//! | eco2        | 400 .. 65000 ppm |

use crate::reading::Reading;
use std::fmt;

/// Inclusive bounds for one field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// NaN never satisfies the range.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

pub const TEMPERATURE: Range = Range::new(-40.0, 85.0);
pub const HUMIDITY: Range = Range::new(0.0, 100.0);
pub const PRESSURE: Range = Range::new(300.0, 1100.0);
pub const PARTICULATE: Range = Range::new(0.0, 1000.0);
pub const AQI: Range = Range::new(1.0, 5.0);
pub const TVOC: Range = Range::new(0.0, 65000.0);
pub const ECO2: Range = Range::new(400.0, 65000.0);

/// Why a reading was rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub field: &'static str,
    pub value: f64,
    pub range: Range,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} value: {} (valid {} .. {})",
            self.field, self.value, self.range.min, self.range.max
        )
    }
}

impl std::error::Error for Rejection {}

fn field(name: &'static str, value: f64, range: Range) -> Result<(), Rejection> {
    if range.contains(value) {
        Ok(())
    } else {
        Err(Rejection {
            field: name,
            value,
            range,
        })
    }
}

/// Check every field of a reading, reporting the first one out of range.
pub fn check(reading: &Reading) -> Result<(), Rejection> {
    match reading {
        Reading::Temperature(r) => {
            field("temperature", r.temperature, TEMPERATURE)?;
            field("humidity", r.humidity, HUMIDITY)?;
            if let Some(pressure) = r.pressure {
                field("pressure", pressure, PRESSURE)?;
            }
        }
        Reading::Air(r) => {
            field("pm10", r.pm10, PARTICULATE)?;
            field("pm25", r.pm25, PARTICULATE)?;
            field("temperature", r.temperature, TEMPERATURE)?;
            field("humidity", r.humidity, HUMIDITY)?;
            field("pressure", r.pressure, PRESSURE)?;
        }
        Reading::Indoor(r) => {
            field("aqi", f64::from(r.aqi), AQI)?;
            field("tvoc", f64::from(r.tvoc), TVOC)?;
            field("eco2", f64::from(r.eco2), ECO2)?;
        }
    }
    Ok(())
}

/// `true` when every field is within its range.
pub fn validate(reading: &Reading) -> bool {
    check(reading).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{AirReading, IndoorReading, TemperatureReading};
    use chrono::Utc;

    fn temp(temperature: f64, humidity: f64, pressure: Option<f64>) -> Reading {
        Reading::Temperature(TemperatureReading {
            time: Utc::now(),
            sensor_id: 1,
            temperature,
            humidity,
            pressure,
        })
    }

    fn air(pm10: f64, pm25: f64, pressure: f64) -> Reading {
        Reading::Air(AirReading {
            time: Utc::now(),
            sensor_id: 3,
            pm10,
            pm25,
            temperature: 12.0,
            humidity: 70.0,
            pressure,
            signal: -70,
        })
    }

    fn indoor(aqi: u8, tvoc: u32, eco2: u32) -> Reading {
        Reading::Indoor(IndoorReading {
            time: Utc::now(),
            sensor_id: 4,
            status: 0,
            aqi,
            tvoc,
            eco2,
        })
    }

    #[test]
    fn test_valid_readings_pass() {
        assert!(validate(&temp(22.5, 45.0, Some(1012.3))));
        assert!(validate(&temp(-40.0, 0.0, None)));
        assert!(validate(&temp(85.0, 100.0, Some(1100.0))));
        assert!(validate(&air(0.0, 1000.0, 300.0)));
        assert!(validate(&indoor(1, 0, 400)));
        assert!(validate(&indoor(5, 65000, 65000)));
    }

    #[test]
    fn test_temperature_above_limit_rejected() {
        let rejection = check(&temp(120.0, 45.0, Some(1012.3))).unwrap_err();
        assert_eq!(rejection.field, "temperature");
        assert_eq!(rejection.value, 120.0);
        assert_eq!(rejection.range, TEMPERATURE);
    }

    #[test]
    fn test_each_temperature_field_checked() {
        assert_eq!(check(&temp(-40.1, 50.0, None)).unwrap_err().field, "temperature");
        assert_eq!(check(&temp(20.0, 100.5, None)).unwrap_err().field, "humidity");
        assert_eq!(check(&temp(20.0, 50.0, Some(299.9))).unwrap_err().field, "pressure");
    }

    #[test]
    fn test_air_fields_checked() {
        assert_eq!(check(&air(-1.0, 5.0, 1000.0)).unwrap_err().field, "pm10");
        assert_eq!(check(&air(5.0, 1000.5, 1000.0)).unwrap_err().field, "pm25");
        // A station that lost its BME280 reports 0 hPa
        assert_eq!(check(&air(5.0, 5.0, 0.0)).unwrap_err().field, "pressure");
    }

    #[test]
    fn test_indoor_fields_checked() {
        assert_eq!(check(&indoor(0, 100, 500)).unwrap_err().field, "aqi");
        assert_eq!(check(&indoor(6, 100, 500)).unwrap_err().field, "aqi");
        assert_eq!(check(&indoor(3, 65001, 500)).unwrap_err().field, "tvoc");
        assert_eq!(check(&indoor(3, 100, 399)).unwrap_err().field, "eco2");
    }

    #[test]
    fn test_nan_rejected() {
        assert!(!validate(&temp(f64::NAN, 50.0, None)));
        assert!(!validate(&temp(20.0, 50.0, Some(f64::NAN))));
    }

    #[test]
    fn test_rejection_display() {
        let rejection = check(&temp(120.0, 45.0, None)).unwrap_err();
        assert_eq!(
            rejection.to_string(),
            "invalid temperature value: 120 (valid -40 .. 85)"
        );
    }
}
