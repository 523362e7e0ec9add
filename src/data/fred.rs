//! FRED observations client.

use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::EnvConfig;
use crate::data::types::TimeSeries;
use crate::error::DataError;

const BASE_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

/// Anything that can return a series' observations from a start date on.
pub trait SeriesSource {
    fn fetch(&self, series_id: &str, since: NaiveDate) -> Result<TimeSeries, DataError>;
}

pub struct FredClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FredClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn from_env() -> Result<Self, DataError> {
        let env = EnvConfig::load()?;
        Ok(Self::new(env.fred_api_key))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl SeriesSource for FredClient {
    fn fetch(&self, series_id: &str, since: NaiveDate) -> Result<TimeSeries, DataError> {
        let start = since.format("%Y-%m-%d").to_string();
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("series_id", series_id),
                ("api_key", &self.api_key),
                ("file_type", "json"),
                ("observation_start", &start),
            ])
            .send()
            .map_err(|e| DataError::upstream(series_id, format!("FRED request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(DataError::upstream(
                series_id,
                format!("FRED request failed with status {}", resp.status()),
            ));
        }

        let body: ObservationsResponse = resp.json().map_err(|e| {
            DataError::upstream(series_id, format!("Failed to parse FRED response: {e}"))
        })?;

        debug!("{}: {} observations since {}", series_id, body.observations.len(), start);
        TimeSeries::from_raw(
            series_id,
            body.observations
                .into_iter()
                .map(|obs| (obs.date, parse_value(&obs.value))),
        )
    }
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

/// FRED marks missing observations with ".".
fn parse_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed == "." || trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("4.25"), Some(4.25));
        assert_eq!(parse_value(" -0.12 "), Some(-0.12));
        assert_eq!(parse_value("."), None);
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("NaN"), None);
        assert_eq!(parse_value("abc"), None);
    }

    #[test]
    fn test_observations_decode() {
        let body = r#"{"observations":[
            {"realtime_start":"2025-12-01","date":"2025-09-01","value":"4.4"},
            {"realtime_start":"2025-12-01","date":"2025-10-01","value":"."},
            {"realtime_start":"2025-12-01","date":"2025-11-01","value":"4.6"}
        ]}"#;
        let parsed: ObservationsResponse = serde_json::from_str(body).unwrap();
        let series = TimeSeries::from_raw(
            "UNRATE",
            parsed
                .observations
                .into_iter()
                .map(|obs| (obs.date, parse_value(&obs.value))),
        )
        .unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series.missing_count(), 1);
        assert_eq!(series.last_valid().map(|(_, v)| v), Some(4.6));
    }
}
