// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite reading store

use super::{LatestReadings, ReadingStore, StoreError};
use crate::reading::{
    AirReading, IndoorReading, Reading, ReadingKind, Sensor, SensorId, TemperatureReading,
};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

/// SQLite reading store
///
/// One table per reading kind plus the sensor registry. Times are stored as
/// fixed-width RFC 3339 text in UTC so they sort chronologically.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE sensors (id INTEGER PRIMARY KEY, type TEXT, name TEXT, location TEXT, comments TEXT);
/// CREATE TABLE sensor_data_temp   (id, time, sensor_id, temperature, humidity, pressure);
/// CREATE TABLE sensor_data_air    (id, time, sensor_id, pm10, pm25, temperature, humidity, pressure, signal);
/// CREATE TABLE sensor_data_indoor (id, time, sensor_id, status, aqi, tvoc, eco2);
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn table(kind: ReadingKind) -> &'static str {
    match kind {
        ReadingKind::Temperature => "sensor_data_temp",
        ReadingKind::Air => "sensor_data_air",
        ReadingKind::Indoor => "sensor_data_indoor",
    }
}

fn columns(kind: ReadingKind) -> &'static str {
    match kind {
        ReadingKind::Temperature => "time, sensor_id, temperature, humidity, pressure",
        ReadingKind::Air => "time, sensor_id, pm10, pm25, temperature, humidity, pressure, signal",
        ReadingKind::Indoor => "time, sensor_id, status, aqi, tvoc, eco2",
    }
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl SqliteStore {
    /// Open (or create) a file-backed store.
    ///
    /// `busy_timeout` bounds how long a write waits on a locked database.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sensors (
                id INTEGER PRIMARY KEY,
                type TEXT NOT NULL,
                name TEXT NOT NULL,
                location TEXT,
                comments TEXT
            );
            CREATE TABLE IF NOT EXISTS sensor_data_temp (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                time TEXT NOT NULL,
                sensor_id INTEGER NOT NULL REFERENCES sensors(id),
                temperature REAL NOT NULL,
                humidity REAL NOT NULL,
                pressure REAL
            );
            CREATE TABLE IF NOT EXISTS sensor_data_air (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                time TEXT NOT NULL,
                sensor_id INTEGER NOT NULL REFERENCES sensors(id),
                pm10 REAL NOT NULL,
                pm25 REAL NOT NULL,
                temperature REAL NOT NULL,
                humidity REAL NOT NULL,
                pressure REAL NOT NULL,
                signal INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sensor_data_indoor (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                time TEXT NOT NULL,
                sensor_id INTEGER NOT NULL REFERENCES sensors(id),
                status INTEGER NOT NULL,
                aqi INTEGER NOT NULL,
                tvoc INTEGER NOT NULL,
                eco2 INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_temp_sensor_time ON sensor_data_temp(sensor_id, time);
            CREATE INDEX IF NOT EXISTS idx_air_sensor_time ON sensor_data_air(sensor_id, time);
            CREATE INDEX IF NOT EXISTS idx_indoor_sensor_time ON sensor_data_indoor(sensor_id, time);",
        )?;

        Ok(())
    }

    fn parse_time(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    /// Map a row selected with [`columns`] for `kind`.
    fn row_to_reading(kind: ReadingKind, row: &rusqlite::Row) -> rusqlite::Result<Reading> {
        let time = Self::parse_time(0, row.get(0)?)?;
        let sensor_id: SensorId = row.get(1)?;

        Ok(match kind {
            ReadingKind::Temperature => Reading::Temperature(TemperatureReading {
                time,
                sensor_id,
                temperature: row.get(2)?,
                humidity: row.get(3)?,
                pressure: row.get(4)?,
            }),
            ReadingKind::Air => Reading::Air(AirReading {
                time,
                sensor_id,
                pm10: row.get(2)?,
                pm25: row.get(3)?,
                temperature: row.get(4)?,
                humidity: row.get(5)?,
                pressure: row.get(6)?,
                signal: row.get(7)?,
            }),
            ReadingKind::Indoor => Reading::Indoor(IndoorReading {
                time,
                sensor_id,
                status: row.get(2)?,
                aqi: row.get(3)?,
                tvoc: row.get(4)?,
                eco2: row.get(5)?,
            }),
        })
    }

    fn row_to_sensor(row: &rusqlite::Row) -> rusqlite::Result<Sensor> {
        Ok(Sensor {
            id: row.get(0)?,
            sensor_type: row.get(1)?,
            name: row.get(2)?,
            location: row.get(3)?,
            comments: row.get(4)?,
        })
    }
}

impl ReadingStore for SqliteStore {
    fn insert_reading(&self, reading: &Reading) -> Result<i64, StoreError> {
        let conn = self.conn.lock();

        match reading {
            Reading::Temperature(r) => conn.execute(
                "INSERT INTO sensor_data_temp (time, sensor_id, temperature, humidity, pressure)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![format_time(&r.time), r.sensor_id, r.temperature, r.humidity, r.pressure],
            )?,
            Reading::Air(r) => conn.execute(
                "INSERT INTO sensor_data_air
                 (time, sensor_id, pm10, pm25, temperature, humidity, pressure, signal)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    format_time(&r.time),
                    r.sensor_id,
                    r.pm10,
                    r.pm25,
                    r.temperature,
                    r.humidity,
                    r.pressure,
                    r.signal,
                ],
            )?,
            Reading::Indoor(r) => conn.execute(
                "INSERT INTO sensor_data_indoor (time, sensor_id, status, aqi, tvoc, eco2)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![format_time(&r.time), r.sensor_id, r.status, r.aqi, r.tvoc, r.eco2],
            )?,
        };

        Ok(conn.last_insert_rowid())
    }

    fn last_row_id(&self, kind: ReadingKind) -> Result<i64, StoreError> {
        let conn = self.conn.lock();
        let id = conn.query_row(
            &format!("SELECT COALESCE(MAX(id), 0) FROM {}", table(kind)),
            [],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    fn readings_after(
        &self,
        kind: ReadingKind,
        after: i64,
        limit: usize,
    ) -> Result<Vec<(i64, Reading)>, StoreError> {
        let conn = self.conn.lock();
        // id goes last so the reading columns keep their usual positions
        let sql = format!(
            "SELECT {}, id FROM {} WHERE id > ?1 ORDER BY id LIMIT ?2",
            columns(kind),
            table(kind)
        );
        let id_column = columns(kind).split(',').count();

        let mut stmt = conn.prepare(&sql)?;
        let limit = limit.min(i64::MAX as usize) as i64;
        let rows = stmt
            .query_map(params![after, limit], |row| {
                Ok((row.get::<_, i64>(id_column)?, Self::row_to_reading(kind, row)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn latest_reading(
        &self,
        sensor_id: SensorId,
        kind: ReadingKind,
    ) -> Result<Option<Reading>, StoreError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM {} WHERE sensor_id = ?1 ORDER BY time DESC, id DESC LIMIT 1",
            columns(kind),
            table(kind)
        );

        let reading = conn
            .query_row(&sql, [sensor_id], |row| Self::row_to_reading(kind, row))
            .optional()?;

        Ok(reading)
    }

    fn list_readings(&self, kind: ReadingKind, limit: usize) -> Result<Vec<Reading>, StoreError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM {} ORDER BY time DESC, id DESC LIMIT ?1",
            columns(kind),
            table(kind)
        );

        let mut stmt = conn.prepare(&sql)?;
        let limit = limit.min(i64::MAX as usize) as i64;
        let readings = stmt
            .query_map([limit], |row| Self::row_to_reading(kind, row))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(readings)
    }

    fn sensor(&self, id: SensorId) -> Result<Option<Sensor>, StoreError> {
        let conn = self.conn.lock();
        let sensor = conn
            .query_row(
                "SELECT id, type, name, location, comments FROM sensors WHERE id = ?1",
                [id],
                Self::row_to_sensor,
            )
            .optional()?;

        Ok(sensor)
    }

    fn list_sensors(&self) -> Result<Vec<Sensor>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT id, type, name, location, comments FROM sensors ORDER BY id")?;

        let sensors = stmt
            .query_map([], Self::row_to_sensor)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(sensors)
    }

    fn create_sensor(&self, sensor: &Sensor) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO sensors (id, type, name, location, comments) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sensor.id,
                sensor.sensor_type,
                sensor.name,
                sensor.location,
                sensor.comments,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateSensor(sensor.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn apply_retention(&self, keep: usize) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock();
        let keep = keep.min(i64::MAX as usize) as i64;

        let tx = conn.transaction()?;
        let mut deleted = 0;
        for kind in ReadingKind::ALL {
            // Rank rows per sensor, newest first, and drop everything past `keep`
            let sql = format!(
                "DELETE FROM {table} WHERE id IN (
                     SELECT id FROM (
                         SELECT id, ROW_NUMBER() OVER (
                             PARTITION BY sensor_id ORDER BY time DESC, id DESC
                         ) AS rank
                         FROM {table}
                     ) WHERE rank > ?1
                 )",
                table = table(kind)
            );
            deleted += tx.execute(&sql, [keep])?;
        }
        tx.commit()?;

        Ok(deleted)
    }

    fn count(&self, kind: ReadingKind) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table(kind)),
            [],
            |row| row.get(0),
        )?;

        usize::try_from(count).map_err(|_| StoreError::Corrupt(format!("negative count {}", count)))
    }
}

impl LatestReadings for SqliteStore {
    fn get_latest(
        &self,
        sensor_id: SensorId,
        kind: ReadingKind,
    ) -> Result<Option<Reading>, StoreError> {
        self.latest_reading(sensor_id, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn sensor(id: SensorId, sensor_type: &str) -> Sensor {
        Sensor {
            id,
            sensor_type: sensor_type.to_string(),
            name: format!("{} #{}", sensor_type, id),
            location: Some("garden".to_string()),
            comments: None,
        }
    }

    fn temp_at(sensor_id: SensorId, minutes: i64, temperature: f64) -> Reading {
        Reading::Temperature(TemperatureReading {
            time: base_time() + ChronoDuration::minutes(minutes),
            sensor_id,
            temperature,
            humidity: 40.0,
            pressure: Some(1009.5),
        })
    }

    #[test]
    fn test_sqlite_store_insert_and_latest() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.create_sensor(&sensor(1, "bme280")).unwrap();

        store.insert_reading(&temp_at(1, 0, 20.0)).unwrap();
        store.insert_reading(&temp_at(1, 5, 21.0)).unwrap();
        // Inserted later but measured earlier
        store.insert_reading(&temp_at(1, 2, 19.0)).unwrap();

        let latest = store
            .latest_reading(1, ReadingKind::Temperature)
            .unwrap()
            .expect("latest reading");
        assert_eq!(latest, temp_at(1, 5, 21.0));
    }

    #[test]
    fn test_sqlite_store_latest_none() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(store.latest_reading(9, ReadingKind::Air).unwrap().is_none());
        assert!(store.get_latest(9, ReadingKind::Indoor).unwrap().is_none());
    }

    #[test]
    fn test_sqlite_store_round_trips_each_kind() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.create_sensor(&sensor(3, "airrohr")).unwrap();
        store.create_sensor(&sensor(4, "ens160")).unwrap();

        let air = Reading::Air(AirReading {
            time: base_time(),
            sensor_id: 3,
            pm10: 14.2,
            pm25: 8.9,
            temperature: 9.5,
            humidity: 88.0,
            pressure: 1001.25,
            signal: -71,
        });
        let indoor = Reading::Indoor(IndoorReading {
            time: base_time(),
            sensor_id: 4,
            status: 1,
            aqi: 2,
            tvoc: 180,
            eco2: 640,
        });

        store.insert_reading(&air).unwrap();
        store.insert_reading(&indoor).unwrap();

        assert_eq!(store.latest_reading(3, ReadingKind::Air).unwrap(), Some(air));
        assert_eq!(store.latest_reading(4, ReadingKind::Indoor).unwrap(), Some(indoor));
    }

    #[test]
    fn test_sqlite_store_list_newest_first() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.create_sensor(&sensor(1, "dht22")).unwrap();

        for i in 0..5 {
            store.insert_reading(&temp_at(1, i, 20.0 + i as f64)).unwrap();
        }

        let listed = store.list_readings(ReadingKind::Temperature, 3).unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0], temp_at(1, 4, 24.0));
        assert_eq!(listed[2], temp_at(1, 2, 22.0));
    }

    #[test]
    fn test_sqlite_store_sensors() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.create_sensor(&sensor(2, "dht22")).unwrap();
        store.create_sensor(&sensor(1, "bme280")).unwrap();

        let sensors = store.list_sensors().unwrap();
        assert_eq!(sensors.len(), 2);
        assert_eq!(sensors[0].id, 1);
        assert_eq!(store.sensor(2).unwrap(), Some(sensor(2, "dht22")));
        assert!(store.sensor(7).unwrap().is_none());
    }

    #[test]
    fn test_sqlite_store_duplicate_sensor() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.create_sensor(&sensor(1, "bme280")).unwrap();

        let err = store.create_sensor(&sensor(1, "dht22")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSensor(1)));
    }

    #[test]
    fn test_sqlite_store_retention_per_sensor() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.create_sensor(&sensor(1, "bme280")).unwrap();
        store.create_sensor(&sensor(2, "dht22")).unwrap();

        for i in 0..10 {
            store.insert_reading(&temp_at(1, i, 20.0)).unwrap();
        }
        for i in 0..3 {
            store.insert_reading(&temp_at(2, i, 20.0)).unwrap();
        }

        let deleted = store.apply_retention(4).unwrap();
        assert_eq!(deleted, 6);
        assert_eq!(store.count(ReadingKind::Temperature).unwrap(), 7);

        // Newest reading of sensor 1 survives
        let latest = store.latest_reading(1, ReadingKind::Temperature).unwrap();
        assert_eq!(latest, Some(temp_at(1, 9, 20.0)));
    }

    #[test]
    fn test_sqlite_store_file_backed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.db");

        {
            let store = SqliteStore::open(&path, Duration::from_secs(1)).unwrap();
            store.create_sensor(&sensor(1, "bme280")).unwrap();
            store.insert_reading(&temp_at(1, 0, 18.5)).unwrap();
        }

        let reopened = SqliteStore::open(&path, Duration::from_secs(1)).unwrap();
        assert_eq!(reopened.count(ReadingKind::Temperature).unwrap(), 1);
        assert!(reopened.sensor(1).unwrap().is_some());
    }

    #[test]
    fn test_sqlite_store_readings_after_row() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.create_sensor(&sensor(1, "bme280")).unwrap();
        assert_eq!(store.last_row_id(ReadingKind::Temperature).unwrap(), 0);

        let first = store.insert_reading(&temp_at(1, 0, 20.0)).unwrap();
        let second = store.insert_reading(&temp_at(1, 1, 21.0)).unwrap();
        let third = store.insert_reading(&temp_at(1, 2, 22.0)).unwrap();
        assert!(first < second && second < third);
        assert_eq!(store.last_row_id(ReadingKind::Temperature).unwrap(), third);
        assert_eq!(store.last_row_id(ReadingKind::Air).unwrap(), 0);

        let rows = store
            .readings_after(ReadingKind::Temperature, first, 10)
            .unwrap();
        assert_eq!(
            rows,
            vec![(second, temp_at(1, 1, 21.0)), (third, temp_at(1, 2, 22.0))]
        );

        let rows = store
            .readings_after(ReadingKind::Temperature, first, 1)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(store
            .readings_after(ReadingKind::Temperature, third, 10)
            .unwrap()
            .is_empty());
    }
}
