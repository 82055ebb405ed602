// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bosch BME280 temperature / humidity / pressure sensor over I²C.
//!
//! One forced-mode conversion per read (x1 oversampling on every channel),
//! compensated with the floating-point formulas from the datasheet.

use super::i2c::{I2cBus, LinuxI2c};
use super::{ReadingSource, SourceError, AMBIENT_INTERVAL, I2C_COOLDOWN};
use crate::config::Timing;
use crate::reading::{Reading, ReadingKind, SensorId, TemperatureReading};
use chrono::Utc;
use std::io;
use std::thread;
use std::time::Duration;

pub const DEFAULT_ADDRESS: u16 = 0x76;

const CHIP_ID: u8 = 0x60;

const REG_CALIB_TP: u8 = 0x88;
const REG_CHIP_ID: u8 = 0xD0;
const REG_CALIB_H: u8 = 0xE1;
const REG_CTRL_HUM: u8 = 0xF2;
const REG_STATUS: u8 = 0xF3;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_DATA: u8 = 0xF7;

/// osrs_h = x1
const CTRL_HUM_X1: u8 = 0x01;
/// osrs_t = x1, osrs_p = x1, forced mode
const CTRL_MEAS_FORCED: u8 = 0x25;
const STATUS_MEASURING: u8 = 0x08;

/// ADC value reported for a skipped conversion.
const ADC_SKIPPED: i32 = 0x80000;

/// Factory trimming parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
    pub h1: u8,
    pub h2: i16,
    pub h3: u8,
    pub h4: i16,
    pub h5: i16,
    pub h6: i8,
}

impl Calibration {
    /// Decode the 0x88..=0xA1 and 0xE1..=0xE7 register blocks.
    pub fn from_registers(tp: &[u8; 26], h: &[u8; 7]) -> Self {
        let u16_at = |i: usize| u16::from_le_bytes([tp[i], tp[i + 1]]);
        let i16_at = |i: usize| i16::from_le_bytes([tp[i], tp[i + 1]]);

        Self {
            t1: u16_at(0),
            t2: i16_at(2),
            t3: i16_at(4),
            p1: u16_at(6),
            p2: i16_at(8),
            p3: i16_at(10),
            p4: i16_at(12),
            p5: i16_at(14),
            p6: i16_at(16),
            p7: i16_at(18),
            p8: i16_at(20),
            p9: i16_at(22),
            h1: tp[25],
            h2: i16::from_le_bytes([h[0], h[1]]),
            h3: h[2],
            // 12-bit values sharing the nibbles of 0xE5
            h4: (i16::from(h[3] as i8) << 4) | i16::from(h[4] & 0x0F),
            h5: (i16::from(h[5] as i8) << 4) | i16::from(h[4] >> 4),
            h6: h[6] as i8,
        }
    }

    /// Returns (°C, t_fine).
    pub fn temperature(&self, adc_t: i32) -> (f64, f64) {
        let adc = f64::from(adc_t);
        let t1 = f64::from(self.t1);

        let var1 = (adc / 16384.0 - t1 / 1024.0) * f64::from(self.t2);
        let x = adc / 131072.0 - t1 / 8192.0;
        let var2 = x * x * f64::from(self.t3);
        let t_fine = var1 + var2;

        (t_fine / 5120.0, t_fine)
    }

    /// Pascals.
    pub fn pressure(&self, adc_p: i32, t_fine: f64) -> f64 {
        let mut var1 = t_fine / 2.0 - 64000.0;
        let mut var2 = var1 * var1 * f64::from(self.p6) / 32768.0;
        var2 += var1 * f64::from(self.p5) * 2.0;
        var2 = var2 / 4.0 + f64::from(self.p4) * 65536.0;
        var1 = (f64::from(self.p3) * var1 * var1 / 524288.0 + f64::from(self.p2) * var1) / 524288.0;
        var1 = (1.0 + var1 / 32768.0) * f64::from(self.p1);
        if var1 == 0.0 {
            return 0.0;
        }

        let mut p = 1048576.0 - f64::from(adc_p);
        p = (p - var2 / 4096.0) * 6250.0 / var1;
        let var1 = f64::from(self.p9) * p * p / 2147483648.0;
        let var2 = p * f64::from(self.p8) / 32768.0;
        p + (var1 + var2 + f64::from(self.p7)) / 16.0
    }

    /// %RH, clamped to 0..=100.
    pub fn humidity(&self, adc_h: i32, t_fine: f64) -> f64 {
        let h = t_fine - 76800.0;
        let offset = f64::from(self.h4) * 64.0 + f64::from(self.h5) / 16384.0 * h;
        let scale = f64::from(self.h2) / 65536.0
            * (1.0
                + f64::from(self.h6) / 67108864.0 * h * (1.0 + f64::from(self.h3) / 67108864.0 * h));
        let mut rh = (f64::from(adc_h) - offset) * scale;
        rh *= 1.0 - f64::from(self.h1) * rh / 524288.0;
        rh.clamp(0.0, 100.0)
    }
}

fn transient(err: io::Error) -> SourceError {
    SourceError::Transient(format!("I2C: {}", err))
}

/// BME280 bound to one sensor id.
pub struct Bme280Source<B: I2cBus = LinuxI2c> {
    bus: B,
    calibration: Calibration,
    sensor_id: SensorId,
}

impl Bme280Source<LinuxI2c> {
    /// Open `/dev/i2c-{bus}` at `address` and load calibration.
    pub fn open(bus: u8, address: u16, sensor_id: SensorId) -> Result<Self, SourceError> {
        let i2c = LinuxI2c::open(bus, address)
            .map_err(|e| SourceError::Unavailable(format!("/dev/i2c-{}: {}", bus, e)))?;
        Self::with_bus(i2c, sensor_id)
    }
}

impl<B: I2cBus> Bme280Source<B> {
    pub fn with_bus(mut bus: B, sensor_id: SensorId) -> Result<Self, SourceError> {
        let unavailable = |e: io::Error| SourceError::Unavailable(e.to_string());

        let chip_id = bus.read_register(REG_CHIP_ID).map_err(unavailable)?;
        if chip_id != CHIP_ID {
            return Err(SourceError::Unavailable(format!(
                "unexpected chip id 0x{:02X} (expected 0x{:02X})",
                chip_id, CHIP_ID
            )));
        }

        let mut tp = [0u8; 26];
        let mut h = [0u8; 7];
        bus.read_registers(REG_CALIB_TP, &mut tp).map_err(unavailable)?;
        bus.read_registers(REG_CALIB_H, &mut h).map_err(unavailable)?;

        Ok(Self {
            bus,
            calibration: Calibration::from_registers(&tp, &h),
            sensor_id,
        })
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    fn wait_for_conversion(&mut self) -> Result<(), SourceError> {
        for _ in 0..10 {
            thread::sleep(Duration::from_millis(10));
            let status = self.bus.read_register(REG_STATUS).map_err(transient)?;
            if status & STATUS_MEASURING == 0 {
                return Ok(());
            }
        }
        Err(SourceError::Transient("conversion did not complete".into()))
    }
}

impl<B: I2cBus> ReadingSource for Bme280Source<B> {
    fn kind(&self) -> ReadingKind {
        ReadingKind::Temperature
    }

    fn read(&mut self) -> Result<Reading, SourceError> {
        // ctrl_hum only takes effect after a ctrl_meas write
        self.bus
            .write_register(REG_CTRL_HUM, CTRL_HUM_X1)
            .map_err(transient)?;
        self.bus
            .write_register(REG_CTRL_MEAS, CTRL_MEAS_FORCED)
            .map_err(transient)?;
        self.wait_for_conversion()?;

        let mut data = [0u8; 8];
        self.bus
            .read_registers(REG_DATA, &mut data)
            .map_err(transient)?;

        let adc_p = (i32::from(data[0]) << 12) | (i32::from(data[1]) << 4) | (i32::from(data[2]) >> 4);
        let adc_t = (i32::from(data[3]) << 12) | (i32::from(data[4]) << 4) | (i32::from(data[5]) >> 4);
        let adc_h = (i32::from(data[6]) << 8) | i32::from(data[7]);

        if adc_t == ADC_SKIPPED {
            return Err(SourceError::Transient("temperature conversion skipped".into()));
        }

        let (temperature, t_fine) = self.calibration.temperature(adc_t);
        let pressure = self.calibration.pressure(adc_p, t_fine) / 100.0;
        let humidity = self.calibration.humidity(adc_h, t_fine);

        Ok(Reading::Temperature(TemperatureReading {
            time: Utc::now(),
            sensor_id: self.sensor_id,
            temperature,
            humidity,
            pressure: Some(pressure),
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
    use crate::source::i2c::fake::FakeBus;

    /// Trimming values from the datasheet's worked example.
    fn datasheet_calibration() -> Calibration {
        Calibration {
            t1: 27504,
            t2: 26435,
            t3: -1000,
            p1: 36477,
            p2: -10685,
            p3: 3024,
            p4: 2855,
            p5: 140,
            p6: -7,
            p7: 15500,
            p8: -14600,
            p9: 6000,
            h1: 75,
            h2: 362,
            h3: 0,
            h4: 313,
            h5: 50,
            h6: 30,
        }
    }

    fn registers(cal: &Calibration) -> ([u8; 26], [u8; 7]) {
        let mut tp = [0u8; 26];
        let words: [u16; 12] = [
            cal.t1,
            cal.t2 as u16,
            cal.t3 as u16,
            cal.p1,
            cal.p2 as u16,
            cal.p3 as u16,
            cal.p4 as u16,
            cal.p5 as u16,
            cal.p6 as u16,
            cal.p7 as u16,
            cal.p8 as u16,
            cal.p9 as u16,
        ];
        for (i, w) in words.iter().enumerate() {
            tp[i * 2..i * 2 + 2].copy_from_slice(&w.to_le_bytes());
        }
        tp[25] = cal.h1;

        let h2 = (cal.h2 as u16).to_le_bytes();
        let h = [
            h2[0],
            h2[1],
            cal.h3,
            (cal.h4 >> 4) as u8,
            ((cal.h5 as u8 & 0x0F) << 4) | (cal.h4 as u8 & 0x0F),
            (cal.h5 >> 4) as u8,
            cal.h6 as u8,
        ];
        (tp, h)
    }

    #[test]
    fn test_datasheet_temperature_and_pressure() {
        let cal = datasheet_calibration();
        let (temperature, t_fine) = cal.temperature(519888);
        assert!((temperature - 25.08).abs() < 0.01, "temperature {}", temperature);

        let pressure = cal.pressure(415148, t_fine);
        assert!((pressure - 100653.27).abs() < 1.0, "pressure {}", pressure);
    }

    #[test]
    fn test_humidity_plausible_and_clamped() {
        let cal = datasheet_calibration();
        let (_, t_fine) = cal.temperature(519888);

        let rh = cal.humidity(30000, t_fine);
        assert!(rh > 40.0 && rh < 70.0, "humidity {}", rh);
        assert_eq!(cal.humidity(0, t_fine), 0.0);
        assert_eq!(cal.humidity(65535, t_fine), 100.0);
    }

    #[test]
    fn test_calibration_register_decode() {
        let cal = datasheet_calibration();
        let (tp, h) = registers(&cal);
        assert_eq!(Calibration::from_registers(&tp, &h), cal);
    }

    #[test]
    fn test_negative_h4_h5_sign_extended() {
        let cal = Calibration {
            h4: -100,
            h5: -3,
            ..datasheet_calibration()
        };
        let (tp, h) = registers(&cal);
        let decoded = Calibration::from_registers(&tp, &h);
        assert_eq!(decoded.h4, -100);
        assert_eq!(decoded.h5, -3);
    }

    fn fake_device() -> FakeBus {
        let (tp, h) = registers(&datasheet_calibration());
        let mut bus = FakeBus::new();
        bus.set(REG_CHIP_ID, &[CHIP_ID]);
        bus.set(REG_CALIB_TP, &tp);
        bus.set(REG_CALIB_H, &h);
        // adc_P = 415148, adc_T = 519888, adc_H = 30000
        bus.set(REG_DATA, &[0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x75, 0x30]);
        bus
    }

    #[test]
    fn test_forced_read_produces_hpa() {
        let mut source = Bme280Source::with_bus(fake_device(), 1).unwrap();
        let reading = source.read().unwrap();

        match reading {
            Reading::Temperature(r) => {
                assert_eq!(r.sensor_id, 1);
                assert!((r.temperature - 25.08).abs() < 0.01);
                let pressure = r.pressure.unwrap();
                assert!((pressure - 1006.53).abs() < 0.02, "pressure {}", pressure);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(source.bus.registers[REG_CTRL_MEAS as usize], CTRL_MEAS_FORCED);
        assert_eq!(source.bus.registers[REG_CTRL_HUM as usize], CTRL_HUM_X1);
    }

    #[test]
    fn test_wrong_chip_id_unavailable() {
        let mut bus = fake_device();
        bus.set(REG_CHIP_ID, &[0x58]);

        let err = Bme280Source::with_bus(bus, 1).err().unwrap();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_skipped_conversion_is_transient() {
        let mut bus = fake_device();
        bus.set(REG_DATA + 3, &[0x80, 0x00, 0x00]);

        let mut source = Bme280Source::with_bus(bus, 1).unwrap();
        assert!(source.read().unwrap_err().is_transient());
    }
}
