// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ScioSense ENS160 indoor air quality sensor over I²C.
//!
//! Gas readings are compensated with an ambient temperature / humidity pair
//! written once at start-up. The pair comes from the latest reading of a
//! companion temperature sensor when one is available.

use super::i2c::{I2cBus, LinuxI2c};
use super::{ReadingSource, SourceError, AMBIENT_INTERVAL, I2C_COOLDOWN};
use crate::config::Timing;
use crate::reading::{IndoorReading, Reading, ReadingKind, SensorId};
use crate::store::LatestReadings;
use chrono::Utc;
use std::io;

pub const DEFAULT_ADDRESS: u16 = 0x53;

const PART_ID: u16 = 0x0160;

const REG_PART_ID: u8 = 0x00;
const REG_OPMODE: u8 = 0x10;
const REG_TEMP_IN: u8 = 0x13;
const REG_RH_IN: u8 = 0x15;
const REG_STATUS: u8 = 0x20;
const REG_AQI: u8 = 0x21;
const REG_TVOC: u8 = 0x22;
const REG_ECO2: u8 = 0x24;

const OPMODE_STANDARD: u8 = 0x02;

/// Validity flag value meaning "invalid output".
const VALIDITY_INVALID: u8 = 3;

/// Ambient conditions used for gas compensation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ambient {
    pub temperature: f64,
    pub humidity: f64,
}

impl Default for Ambient {
    fn default() -> Self {
        Self {
            temperature: 25.0,
            humidity: 50.0,
        }
    }
}

impl Ambient {
    /// Warm start from the companion sensor's latest temperature reading.
    ///
    /// Any failure or absence falls back to the defaults.
    pub fn from_latest(latest: &dyn LatestReadings, companion: SensorId) -> Self {
        match latest.get_latest(companion, ReadingKind::Temperature) {
            Ok(Some(Reading::Temperature(r))) => {
                tracing::info!(
                    companion,
                    "ambient compensation from latest reading: {:.2} °C, {:.2} %",
                    r.temperature,
                    r.humidity
                );
                Self {
                    temperature: r.temperature,
                    humidity: r.humidity,
                }
            }
            Ok(_) => {
                tracing::warn!(companion, "no reading from companion sensor, using defaults");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(companion, "latest reading unavailable ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// (TEMP_IN, RH_IN) register encodings: Kelvin * 64 and %RH * 512.
    pub fn encode(&self) -> (u16, u16) {
        let kelvin = ((self.temperature + 273.15) * 64.0).round();
        let rh = (self.humidity.clamp(0.0, 100.0) * 512.0).round();
        (kelvin.clamp(0.0, f64::from(u16::MAX)) as u16, rh as u16)
    }
}

fn transient(err: io::Error) -> SourceError {
    SourceError::Transient(format!("I2C: {}", err))
}

pub struct Ens160Source<B: I2cBus = LinuxI2c> {
    bus: B,
    sensor_id: SensorId,
}

impl Ens160Source<LinuxI2c> {
    pub fn open(
        bus: u8,
        address: u16,
        sensor_id: SensorId,
        ambient: Ambient,
    ) -> Result<Self, SourceError> {
        let i2c = LinuxI2c::open(bus, address)
            .map_err(|e| SourceError::Unavailable(format!("/dev/i2c-{}: {}", bus, e)))?;
        Self::with_bus(i2c, sensor_id, ambient)
    }
}

impl<B: I2cBus> Ens160Source<B> {
    /// Check the part id, enter standard mode and write compensation.
    pub fn with_bus(mut bus: B, sensor_id: SensorId, ambient: Ambient) -> Result<Self, SourceError> {
        let unavailable = |e: io::Error| SourceError::Unavailable(e.to_string());

        let mut id = [0u8; 2];
        bus.read_registers(REG_PART_ID, &mut id).map_err(unavailable)?;
        let part_id = u16::from_le_bytes(id);
        if part_id != PART_ID {
            return Err(SourceError::Unavailable(format!(
                "unexpected part id 0x{:04X} (expected 0x{:04X})",
                part_id, PART_ID
            )));
        }

        bus.write_register(REG_OPMODE, OPMODE_STANDARD)
            .map_err(unavailable)?;

        let (temp_in, rh_in) = ambient.encode();
        let [t0, t1] = temp_in.to_le_bytes();
        let [h0, h1] = rh_in.to_le_bytes();
        bus.write(&[REG_TEMP_IN, t0, t1]).map_err(unavailable)?;
        bus.write(&[REG_RH_IN, h0, h1]).map_err(unavailable)?;

        Ok(Self { bus, sensor_id })
    }

    fn read_u16(&mut self, reg: u8) -> Result<u16, SourceError> {
        let mut buf = [0u8; 2];
        self.bus.read_registers(reg, &mut buf).map_err(transient)?;
        Ok(u16::from_le_bytes(buf))
    }
}

impl<B: I2cBus> ReadingSource for Ens160Source<B> {
    fn kind(&self) -> ReadingKind {
        ReadingKind::Indoor
    }

    fn read(&mut self) -> Result<Reading, SourceError> {
        let status = self.bus.read_register(REG_STATUS).map_err(transient)?;
        let validity = (status >> 2) & 0x03;
        if validity == VALIDITY_INVALID {
            return Err(SourceError::Transient("invalid output flag set".into()));
        }

        let aqi = self.bus.read_register(REG_AQI).map_err(transient)? & 0x07;
        let tvoc = self.read_u16(REG_TVOC)?;
        let eco2 = self.read_u16(REG_ECO2)?;

        Ok(Reading::Indoor(IndoorReading {
            time: Utc::now(),
            sensor_id: self.sensor_id,
            status: validity,
            aqi,
            tvoc: u32::from(tvoc),
            eco2: u32::from(eco2),
        }))
    }

    fn timing(&self) -> Timing {
        Timing {
            interval: AMBIENT_INTERVAL,
            cooldown: I2C_COOLDOWN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::TemperatureReading;
    use crate::source::i2c::fake::FakeBus;
    use crate::store::StoreError;

    fn fake_device() -> FakeBus {
        let mut bus = FakeBus::new();
        bus.set(REG_PART_ID, &[0x60, 0x01]);
        bus.set(REG_AQI, &[0x02]);
        bus.set(REG_TVOC, &120u16.to_le_bytes());
        bus.set(REG_ECO2, &610u16.to_le_bytes());
        bus
    }

    struct Latest(Result<Option<Reading>, ()>);

    impl LatestReadings for Latest {
        fn get_latest(&self, _: SensorId, _: ReadingKind) -> Result<Option<Reading>, StoreError> {
            self.0.clone().map_err(|_| StoreError::Remote("offline".into()))
        }
    }

    #[test]
    fn test_init_writes_mode_and_compensation() {
        let ambient = Ambient {
            temperature: 21.5,
            humidity: 40.0,
        };
        let source = Ens160Source::with_bus(fake_device(), 4, ambient).unwrap();
        let writes = &source.bus.writes;

        assert!(writes.contains(&(REG_OPMODE, OPMODE_STANDARD)));
        // (21.5 + 273.15) * 64 = 18857.6 -> 18858 = 0x49AA
        assert!(writes.contains(&(REG_TEMP_IN, 0xAA)));
        assert!(writes.contains(&(REG_TEMP_IN + 1, 0x49)));
        // 40 * 512 = 20480 = 0x5000
        assert!(writes.contains(&(REG_RH_IN, 0x00)));
        assert!(writes.contains(&(REG_RH_IN + 1, 0x50)));
    }

    #[test]
    fn test_read_indoor_values() {
        let mut source = Ens160Source::with_bus(fake_device(), 4, Ambient::default()).unwrap();

        match source.read().unwrap() {
            Reading::Indoor(r) => {
                assert_eq!(r.sensor_id, 4);
                assert_eq!(r.status, 0);
                assert_eq!(r.aqi, 2);
                assert_eq!(r.tvoc, 120);
                assert_eq!(r.eco2, 610);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_warm_up_status_reported() {
        let mut bus = fake_device();
        bus.set(REG_STATUS, &[0b0000_0100]);
        let mut source = Ens160Source::with_bus(bus, 4, Ambient::default()).unwrap();

        match source.read().unwrap() {
            Reading::Indoor(r) => assert_eq!(r.status, 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_output_is_transient() {
        let mut bus = fake_device();
        bus.set(REG_STATUS, &[0b0000_1100]);
        let mut source = Ens160Source::with_bus(bus, 4, Ambient::default()).unwrap();

        assert!(source.read().unwrap_err().is_transient());
    }

    #[test]
    fn test_wrong_part_id_unavailable() {
        let mut bus = fake_device();
        bus.set(REG_PART_ID, &[0x61, 0x01]);
        assert!(Ens160Source::with_bus(bus, 4, Ambient::default()).is_err());
    }

    #[test]
    fn test_ambient_warm_start() {
        let reading = Reading::Temperature(TemperatureReading {
            time: Utc::now(),
            sensor_id: 1,
            temperature: 19.25,
            humidity: 61.0,
            pressure: Some(1011.0),
        });

        let ambient = Ambient::from_latest(&Latest(Ok(Some(reading))), 1);
        assert_eq!(ambient.temperature, 19.25);
        assert_eq!(ambient.humidity, 61.0);

        assert_eq!(Ambient::from_latest(&Latest(Ok(None)), 1), Ambient::default());
        assert_eq!(Ambient::from_latest(&Latest(Err(())), 1), Ambient::default());
    }
}
