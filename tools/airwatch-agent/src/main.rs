// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! airwatch agent - poll one sensor and deliver its readings.
//!
//! One process per sensor. Exactly one sink must be enabled, either the
//! time-series store or the ingestion API.
//!
//! # Usage
//!
//! ```bash
//! # BME280 on /dev/i2c-1, readings POSTed to the API
//! BME280_SENSOR_ID=1 SEND_TO_API=1 API_URL=http://pi.local:8000/api airwatch-agent bme280
//!
//! # DHT22 straight into a local database
//! airwatch-agent --send-to-timeseries --timeseries-db /var/lib/airwatch.db dht22 --sensor-id 2
//!
//! # Settings from a file, CLI/env still override
//! airwatch-agent --config /etc/airwatch/ens160.toml ens160
//! ```
//!
//! # Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 1 | sensor id not set |
//! | 2 | no sink selected |
//! | 3 | both sinks selected |
//! | 4 | sensor hardware unavailable |
//! | 5 | sink destination missing or unusable |
//! | 6 | configuration file unreadable or invalid |

use airwatch::config::{ClientConfig, ClientSettings, ConfigError, SinkSelection, Timing};
use airwatch::sink::{ApiSink, DeliveryError, TimeSeriesSink};
use airwatch::source::{
    self, open_with_retries, Ambient, AirRohrSource, Bme280Source, Dht22Source, Ens160Source,
    ReadingSource, SourceError,
};
use airwatch::{IngestionLoop, LatestReadings, SensorId};
use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Delay between hardware init attempts.
const INIT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// airwatch edge agent
#[derive(Parser, Debug)]
#[command(name = "airwatch-agent")]
#[command(about = "Poll one sensor and deliver its readings")]
#[command(version)]
struct Args {
    /// TOML settings file; command line and environment take precedence
    #[arg(short, long, env = "AIRWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Deliver to the time-series store
    #[arg(long, env = "SEND_TO_TIMESCALEDB", value_parser = BoolishValueParser::new(),
          num_args = 0..=1, default_missing_value = "true")]
    send_to_timeseries: Option<bool>,

    /// Deliver to the ingestion API
    #[arg(long, env = "SEND_TO_API", value_parser = BoolishValueParser::new(),
          num_args = 0..=1, default_missing_value = "true")]
    send_to_api: Option<bool>,

    /// Ingestion API base URL (e.g. http://localhost:8000/api)
    #[arg(long, env = "API_URL")]
    api_url: Option<String>,

    /// Time-series database file
    #[arg(long, env = "TIMESERIES_DB")]
    timeseries_db: Option<PathBuf>,

    /// Per-delivery timeout in seconds
    #[arg(long)]
    delivery_timeout_secs: Option<u64>,

    /// Cap on buffered readings; the oldest is dropped beyond it (0 = unbounded)
    #[arg(long)]
    retry_buffer_limit: Option<usize>,

    /// Override the sensor's polling interval, seconds
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Override the cooldown after a failed read, seconds
    #[arg(long)]
    cooldown_secs: Option<u64>,

    /// Hardware init attempts before giving up
    #[arg(long, default_value = "3")]
    init_attempts: u32,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    sensor: SensorCommand,
}

#[derive(Subcommand, Debug)]
enum SensorCommand {
    /// Bosch BME280 temperature / humidity / pressure over I2C
    Bme280 {
        #[arg(long, env = "BME280_SENSOR_ID")]
        sensor_id: Option<SensorId>,

        /// I2C bus number (/dev/i2c-N)
        #[arg(long, default_value = "1")]
        bus: u8,

        /// I2C address
        #[arg(long, default_value_t = source::BME280_ADDRESS, value_parser = parse_address)]
        address: u16,
    },

    /// DHT22 temperature / humidity through the Linux IIO driver
    Dht22 {
        #[arg(long, env = "DHT22_SENSOR_ID")]
        sensor_id: Option<SensorId>,

        /// IIO device directory
        #[arg(long, default_value = source::DHT22_DEVICE)]
        device: PathBuf,
    },

    /// AirRohr / sensor.community particulate station polled over HTTP
    Airrohr {
        #[arg(long, env = "AIRROHR_SENSOR_ID")]
        sensor_id: Option<SensorId>,

        /// Station data URL (e.g. http://airrohr.local/data.json)
        #[arg(long, env = "AIRROHR_URL")]
        url: Option<String>,
    },

    /// ScioSense ENS160 indoor air quality over I2C
    Ens160 {
        #[arg(long, env = "ENS160_SENSOR_ID")]
        sensor_id: Option<SensorId>,

        /// I2C bus number (/dev/i2c-N)
        #[arg(long, default_value = "1")]
        bus: u8,

        /// I2C address
        #[arg(long, default_value_t = source::ENS160_ADDRESS, value_parser = parse_address)]
        address: u16,

        /// Temperature sensor whose latest reading seeds ambient compensation
        #[arg(long, env = "BME280_SENSOR_ID")]
        companion_id: Option<SensorId>,
    },
}

impl SensorCommand {
    fn sensor_id(&self) -> Option<SensorId> {
        match self {
            SensorCommand::Bme280 { sensor_id, .. }
            | SensorCommand::Dht22 { sensor_id, .. }
            | SensorCommand::Airrohr { sensor_id, .. }
            | SensorCommand::Ens160 { sensor_id, .. } => *sensor_id,
        }
    }

    /// Device defaults, before any interval/cooldown override.
    fn default_timing(&self) -> Timing {
        match self {
            SensorCommand::Bme280 { .. } | SensorCommand::Ens160 { .. } => Timing {
                interval: source::AMBIENT_INTERVAL,
                cooldown: source::I2C_COOLDOWN,
            },
            SensorCommand::Dht22 { .. } => Timing {
                interval: source::AMBIENT_INTERVAL,
                cooldown: source::DEFAULT_COOLDOWN,
            },
            SensorCommand::Airrohr { .. } => Timing {
                interval: source::AIRROHR_INTERVAL,
                cooldown: source::DEFAULT_COOLDOWN,
            },
        }
    }
}

impl Args {
    /// Settings given on the command line or through the environment.
    fn cli_settings(&self) -> ClientSettings {
        ClientSettings {
            sensor_id: self.sensor.sensor_id(),
            send_to_timeseries: self.send_to_timeseries,
            send_to_api: self.send_to_api,
            api_url: self.api_url.clone(),
            timeseries_db: self.timeseries_db.clone(),
            delivery_timeout_secs: self.delivery_timeout_secs,
            retry_buffer_limit: self.retry_buffer_limit,
            interval_secs: self.interval_secs,
            cooldown_secs: self.cooldown_secs,
        }
    }

    fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let cli = self.cli_settings();
        let settings = match &self.config {
            Some(path) => ClientSettings::from_file(path)?.merge(cli),
            None => cli,
        };
        settings.resolve(self.sensor.default_timing())
    }
}

fn parse_address(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid I2C address '{}': {}", s, e))
}

/// Exit status for a startup failure.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<ConfigError>() {
        return e.exit_code() as u8;
    }
    if err.downcast_ref::<SourceError>().is_some() {
        return 4;
    }
    if err.downcast_ref::<DeliveryError>().is_some() {
        return 5;
    }
    1
}

/// Latest-reading query against whichever sink is configured.
fn latest_readings(config: &ClientConfig) -> Result<Box<dyn LatestReadings>, DeliveryError> {
    match &config.sink {
        SinkSelection::TimeSeries(target) => Ok(Box::new(TimeSeriesSink::open(
            &target.database,
            config.delivery_timeout,
        )?)),
        SinkSelection::Api(target) => Ok(Box::new(ApiSink::new(
            &target.base_url,
            config.delivery_timeout,
        )?)),
    }
}

fn warm_start(config: &ClientConfig, companion: Option<SensorId>) -> Ambient {
    let Some(companion) = companion else {
        info!("No companion sensor configured, using default compensation");
        return Ambient::default();
    };

    match latest_readings(config) {
        Ok(latest) => Ambient::from_latest(latest.as_ref(), companion),
        Err(e) => {
            warn!("Cannot query latest readings ({}), using default compensation", e);
            Ambient::default()
        }
    }
}

fn open_source(args: &Args, config: &ClientConfig) -> Result<Box<dyn ReadingSource>, SourceError> {
    let id = config.sensor_id;
    let attempts = args.init_attempts;

    let source: Box<dyn ReadingSource> = match &args.sensor {
        SensorCommand::Bme280 { bus, address, .. } => Box::new(open_with_retries(
            attempts,
            INIT_RETRY_DELAY,
            || Bme280Source::open(*bus, *address, id),
        )?),
        SensorCommand::Dht22 { device, .. } => Box::new(open_with_retries(
            attempts,
            INIT_RETRY_DELAY,
            || Dht22Source::open(device.clone(), id),
        )?),
        SensorCommand::Airrohr { url, .. } => {
            // Checked by `run` before we get here
            let url = url.clone().unwrap_or_default();
            Box::new(AirRohrSource::new(url, id, config.delivery_timeout)?)
        }
        SensorCommand::Ens160 {
            bus,
            address,
            companion_id,
            ..
        } => {
            let ambient = warm_start(config, *companion_id);
            Box::new(open_with_retries(attempts, INIT_RETRY_DELAY, || {
                Ens160Source::open(*bus, *address, id, ambient)
            })?)
        }
    };
    Ok(source)
}

fn run(args: Args) -> Result<()> {
    let config = args.client_config().context("invalid configuration")?;

    if let SensorCommand::Airrohr { url: None, .. } = &args.sensor {
        return Err(ConfigError::MissingDestination("AirRohr station URL"))
            .context("invalid configuration");
    }

    match &config.sink {
        SinkSelection::TimeSeries(t) => info!("Sink: time-series ({})", t.database.display()),
        SinkSelection::Api(t) => info!("Sink: API ({})", t.base_url),
    }

    let sink = airwatch::sink::open(&config).context("cannot open sink")?;
    let source = open_source(&args, &config).context("sensor initialisation failed")?;
    info!(
        sensor_id = config.sensor_id,
        kind = %source.kind(),
        "Sensor ready"
    );

    let mut ingestion = IngestionLoop::from_config(source, sink, &config);

    let stop = ingestion.stop_handle();
    ctrlc::set_handler(move || stop.stop()).context("cannot install Ctrl-C handler")?;

    let stats = ingestion.run();
    info!(
        cycles = stats.cycles,
        delivered = stats.delivered,
        redelivered = stats.redelivered,
        rejected = stats.rejected,
        read_failures = stats.read_failures,
        delivery_failures = stats.delivery_failures,
        "Agent stopped"
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Setup logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("airwatch agent v{}", env!("CARGO_PKG_VERSION"));

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}
