// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP ingestion API client.
//!
//! ```text
//! POST {base}/sensors/{temperature|air|indoor}/     submission JSON, any 2xx = delivered
//! GET  {base}/sensors/{id}/{kind}/last/             latest reading, 404 = none
//! ```

use super::{DeliveryError, DeliverySink};
use crate::reading::{Reading, ReadingKind, SensorId};
use crate::store::{LatestReadings, StoreError};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::time::Duration;

/// Longest response body kept in an error message.
const MAX_ERROR_BODY: usize = 256;

/// Delivers readings to the ingestion API.
pub struct ApiSink {
    client: Client,
    base_url: String,
}

impl ApiSink {
    /// Create a client whose every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DeliveryError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| DeliveryError::InvalidDestination(format!("{}: {}", base_url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::InvalidDestination(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    pub fn submit_url(&self, kind: ReadingKind) -> String {
        format!("{}/sensors/{}/", self.base_url, kind)
    }

    pub fn latest_url(&self, sensor_id: SensorId, kind: ReadingKind) -> String {
        format!("{}/sensors/{}/{}/last/", self.base_url, sensor_id, kind)
    }
}

fn map_reqwest(err: reqwest::Error) -> DeliveryError {
    if err.is_timeout() {
        DeliveryError::Timeout
    } else if err.is_builder() {
        DeliveryError::InvalidDestination(err.to_string())
    } else {
        DeliveryError::Network(err.to_string())
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}

impl DeliverySink for ApiSink {
    fn deliver(&self, reading: &Reading) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.submit_url(reading.kind()))
            .json(&reading.submission_json())
            .send()
            .map_err(map_reqwest)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().unwrap_or_default();
        Err(DeliveryError::Status {
            status: status.as_u16(),
            body: truncate(body),
        })
    }

    fn name(&self) -> &'static str {
        "api"
    }
}

impl LatestReadings for ApiSink {
    fn get_latest(
        &self,
        sensor_id: SensorId,
        kind: ReadingKind,
    ) -> Result<Option<Reading>, StoreError> {
        let response = self
            .client
            .get(self.latest_url(sensor_id, kind))
            .send()
            .map_err(|e| StoreError::Remote(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: serde_json::Value = response
                    .json()
                    .map_err(|e| StoreError::Remote(e.to_string()))?;
                let reading = Reading::from_submission(kind, body)
                    .map_err(|e| StoreError::Remote(format!("bad reading payload: {}", e)))?;
                Ok(Some(reading))
            }
            status => Err(StoreError::Remote(format!("HTTP {}", status.as_u16()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let sink = ApiSink::new("http://pi.local:8000/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            sink.submit_url(ReadingKind::Air),
            "http://pi.local:8000/api/sensors/air/"
        );
        assert_eq!(
            sink.latest_url(1, ReadingKind::Temperature),
            "http://pi.local:8000/api/sensors/1/temperature/last/"
        );
    }

    #[test]
    fn test_malformed_base_url() {
        let err = ApiSink::new("not a url", Duration::from_secs(5)).err().unwrap();
        assert!(matches!(err, DeliveryError::InvalidDestination(_)));
    }

    #[test]
    fn test_unreachable_destination_fails() {
        // Port 9 on localhost (discard) is closed on any sane test host
        let sink = ApiSink::new("http://127.0.0.1:9/api", Duration::from_secs(2)).unwrap();
        let reading = Reading::Temperature(crate::reading::TemperatureReading {
            time: chrono::Utc::now(),
            sensor_id: 1,
            temperature: 20.0,
            humidity: 50.0,
            pressure: None,
        });

        assert!(sink.deliver(&reading).is_err());
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "é".repeat(300);
        let cut = truncate(body);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= MAX_ERROR_BODY + 3);
    }
}
