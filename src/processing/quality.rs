use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::types::TimeSeries;
use crate::processing::interpolation::{GapWindow, InterpolationMetadata};

/// Series whose collection was disrupted by the October 2025 shutdown.
pub const KNOWN_AFFECTED_SERIES: &[&str] = &[
    // Labor market
    "UNRATE",
    "SAHMREALTIME",
    "SAHM_Rule",
    // Consumer
    "PCE",
    "PCE_MoM",
    "PCE_YoY",
    "Consumer_Confidence",
    // Housing
    "Housing_Starts",
    "Building_Permits",
    "New_Home_Sales",
    "Existing_Home_Sales",
    "Case_Shiller_Index",
    "ZHVI",
    "Mortgage_Rate",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    Actual,
    Interpolated,
    Unknown,
}

impl DataQuality {
    pub fn as_str(self) -> &'static str {
        match self {
            DataQuality::Actual => "actual",
            DataQuality::Interpolated => "interpolated",
            DataQuality::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DataQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualitySummaryRow {
    pub series_key: String,
    pub total_points: usize,
    pub actual_points: usize,
    pub interpolated_points: usize,
    /// Percentage of registered points that were interpolated.
    pub interpolation_rate: f64,
    pub affected: bool,
}

impl QualitySummaryRow {
    pub fn rate_label(&self) -> String {
        format!("{:.2}%", self.interpolation_rate)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AffectedStatus {
    pub has_window_data: bool,
    pub interpolated_dates: Vec<NaiveDate>,
    pub interpolated_count: usize,
    pub method: String,
    pub affected: bool,
}

/// Per-series, per-date record of whether a value was observed or estimated.
///
/// Callers own the registry and register through `&mut self`; there is no
/// shared instance.
#[derive(Debug, Default)]
pub struct QualityRegistry {
    window: GapWindow,
    records: BTreeMap<String, BTreeMap<NaiveDate, DataQuality>>,
    metadata: BTreeMap<String, InterpolationMetadata>,
}

impl QualityRegistry {
    pub fn new(window: GapWindow) -> Self {
        Self {
            window,
            ..Default::default()
        }
    }

    pub fn window(&self) -> GapWindow {
        self.window
    }

    /// Record quality for every present value of `series`, then mark the
    /// metadata's estimated dates as interpolated. Dates not supplied keep
    /// their previous status.
    pub fn register(
        &mut self,
        key: &str,
        series: &TimeSeries,
        metadata: Option<&InterpolationMetadata>,
    ) {
        let record = self.records.entry(key.to_string()).or_default();
        for (date, _) in series.valid() {
            record.insert(date, DataQuality::Actual);
        }

        if let Some(metadata) = metadata {
            for date in &metadata.estimated_dates {
                record.insert(*date, DataQuality::Interpolated);
            }
            self.metadata.insert(key.to_string(), metadata.clone());
        }
    }

    pub fn status(&self, key: &str, date: NaiveDate) -> DataQuality {
        self.records
            .get(key)
            .and_then(|record| record.get(&date))
            .copied()
            .unwrap_or(DataQuality::Unknown)
    }

    /// Quality labels aligned to `dates`.
    pub fn flags<I>(&self, key: &str, dates: I) -> Vec<&'static str>
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        dates.into_iter().map(|d| self.status(key, d).as_str()).collect()
    }

    pub fn estimated_dates(&self, key: &str) -> Vec<NaiveDate> {
        self.records
            .get(key)
            .map(|record| {
                record
                    .iter()
                    .filter(|(_, q)| **q == DataQuality::Interpolated)
                    .map(|(d, _)| *d)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_known_affected(key: &str) -> bool {
        KNOWN_AFFECTED_SERIES.contains(&key)
    }

    pub fn metadata(&self, key: &str) -> Option<&InterpolationMetadata> {
        self.metadata.get(key)
    }

    pub fn registered(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> Vec<QualitySummaryRow> {
        self.records
            .iter()
            .map(|(key, record)| {
                let total_points = record.len();
                let actual_points = record.values().filter(|q| **q == DataQuality::Actual).count();
                let interpolated_points = record
                    .values()
                    .filter(|q| **q == DataQuality::Interpolated)
                    .count();
                let interpolation_rate = if total_points > 0 {
                    interpolated_points as f64 / total_points as f64 * 100.0
                } else {
                    0.0
                };

                QualitySummaryRow {
                    series_key: key.clone(),
                    total_points,
                    actual_points,
                    interpolated_points,
                    interpolation_rate,
                    affected: Self::is_known_affected(key),
                }
            })
            .collect()
    }

    /// Split `series` into `(actual_only, interpolated_only)` on its own index.
    /// Dates with unknown quality appear in neither.
    pub fn split(&self, key: &str, series: &TimeSeries) -> (TimeSeries, TimeSeries) {
        let pick = |wanted: DataQuality| -> Vec<Option<f64>> {
            series
                .iter()
                .map(|(d, v)| if self.status(key, d) == wanted { v } else { None })
                .collect()
        };

        let actual = series.with_values(pick(DataQuality::Actual));
        let interpolated = series.with_values(pick(DataQuality::Interpolated));
        (actual, interpolated)
    }

    /// Gap-window status for every registered series that has a date in the
    /// window or is known to be affected.
    pub fn affected_status_report(&self) -> BTreeMap<String, AffectedStatus> {
        let mut report = BTreeMap::new();

        for (key, record) in &self.records {
            let window_dates: Vec<NaiveDate> = record
                .keys()
                .filter(|d| self.window.contains(**d))
                .copied()
                .collect();
            let affected = Self::is_known_affected(key);
            if window_dates.is_empty() && !affected {
                continue;
            }

            let interpolated_dates: Vec<NaiveDate> = window_dates
                .iter()
                .filter(|d| record.get(d) == Some(&DataQuality::Interpolated))
                .copied()
                .collect();
            let method = self
                .metadata
                .get(key)
                .map(|m| m.method.as_str().to_string())
                .unwrap_or_else(|| "N/A".to_string());

            report.insert(
                key.clone(),
                AffectedStatus {
                    has_window_data: !window_dates.is_empty(),
                    interpolated_count: interpolated_dates.len(),
                    interpolated_dates,
                    method,
                    affected,
                },
            );
        }
        report
    }
}
