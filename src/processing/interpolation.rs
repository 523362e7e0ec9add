//! Gap filling for short missing-data windows.
//!
//! The target-window routine exists for one known event: the October 2025
//! federal shutdown, which stopped collection of several monthly series.
//! The window is a parameter so the same logic applies to any month.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::data::types::TimeSeries;
use crate::error::DataError;
use crate::processing::quality::DataQuality;

/// Margin applied around estimated points by [`confidence_bounds`].
pub const DEFAULT_CONFIDENCE_MARGIN: f64 = 0.2;

/// The month lost to the October 2025 shutdown.
pub const SHUTDOWN_WINDOW: GapWindow = GapWindow {
    year: 2025,
    month: 10,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    #[default]
    Linear,
}

impl InterpolationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            InterpolationMethod::Linear => "linear",
        }
    }
}

/// A calendar month targeted for gap filling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GapWindow {
    year: i32,
    month: u32,
}

impl Default for GapWindow {
    fn default() -> Self {
        SHUTDOWN_WINDOW
    }
}

impl GapWindow {
    pub fn new(year: i32, month: u32) -> Result<Self, DataError> {
        let window = Self { year, month };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<(), DataError> {
        match self.first_day() {
            Some(_) if (1..=12).contains(&self.month) => Ok(()),
            _ => Err(DataError::shape(format!(
                "invalid gap window {}-{:02}",
                self.year, self.month
            ))),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn previous(&self) -> GapWindow {
        if self.month == 1 {
            GapWindow { year: self.year - 1, month: 12 }
        } else {
            GapWindow { year: self.year, month: self.month - 1 }
        }
    }

    pub fn next(&self) -> GapWindow {
        if self.month == 12 {
            GapWindow { year: self.year + 1, month: 1 }
        } else {
            GapWindow { year: self.year, month: self.month + 1 }
        }
    }
}

/// Provenance of one interpolation call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InterpolationMetadata {
    /// Dates whose values were estimated by this call.
    pub estimated_dates: BTreeSet<NaiveDate>,
    pub method: InterpolationMethod,
    /// Missing values in the input series.
    pub original_nan_count: usize,
    pub interpolated_count: usize,
    pub shutdown_affected: bool,
    /// Restriction passed to [`interpolate_range`], if any.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

/// Fill missing values inside `window`.
///
/// If the window has no row at all but both neighbouring months do, a
/// missing placeholder is inserted at the window's first day before filling.
/// Interior gaps across the whole series are filled once any window date
/// needs it; values are never extrapolated past the first or last
/// observation.
pub fn interpolate_gap(
    series: &TimeSeries,
    window: GapWindow,
) -> (TimeSeries, InterpolationMetadata) {
    let mut metadata = InterpolationMetadata {
        original_nan_count: series.missing_count(),
        ..Default::default()
    };

    if series.is_empty() {
        return (series.clone(), metadata);
    }

    let mut working = series.clone();
    if !series.dates().any(|d| window.contains(d)) {
        let has_previous = series.dates().any(|d| window.previous().contains(d));
        let has_next = series.dates().any(|d| window.next().contains(d));
        if has_previous && has_next {
            if let Some(day) = window.first_day() {
                working = working.with_placeholder(day);
            }
        }
    }

    let targets: Vec<NaiveDate> = working
        .missing_dates()
        .into_iter()
        .filter(|d| window.contains(*d))
        .collect();
    if targets.is_empty() {
        return (series.clone(), metadata);
    }

    let filled = working.with_values(fill_inside(&working.values()));
    let estimated: BTreeSet<NaiveDate> = targets
        .into_iter()
        .filter(|d| filled.get(*d).is_some())
        .collect();
    if estimated.is_empty() {
        return (series.clone(), metadata);
    }

    metadata.interpolated_count = estimated.len();
    metadata.shutdown_affected = true;
    metadata.estimated_dates = estimated;
    (filled, metadata)
}

/// Fill interior gaps, optionally only inside `[start, end]`.
///
/// With a range, one observation on each side of it takes part in the
/// interpolation but is never overwritten.
pub fn interpolate_range(
    series: &TimeSeries,
    date_range: Option<(NaiveDate, NaiveDate)>,
    method: InterpolationMethod,
) -> Result<(TimeSeries, InterpolationMetadata), DataError> {
    let InterpolationMethod::Linear = method;

    let values = series.values();
    let filled_values = match date_range {
        None => fill_inside(&values),
        Some((start, end)) => {
            if start > end {
                return Err(DataError::shape(format!(
                    "interpolation range start {start} is after end {end}"
                )));
            }

            let dates: Vec<NaiveDate> = series.dates().collect();
            let lo = dates.partition_point(|d| *d < start);
            let hi = dates.partition_point(|d| *d <= end);

            let mut out = values.clone();
            if lo < hi {
                let expanded_lo = lo.saturating_sub(1);
                let expanded_hi = (hi + 1).min(values.len());
                let slice = fill_inside(&values[expanded_lo..expanded_hi]);
                for i in lo..hi {
                    if values[i].is_none() {
                        out[i] = slice[i - expanded_lo];
                    }
                }
            }
            out
        }
    };

    let filled = series.with_values(filled_values);
    let estimated_dates: BTreeSet<NaiveDate> = series
        .missing_dates()
        .into_iter()
        .filter(|d| filled.get(*d).is_some())
        .collect();

    let metadata = InterpolationMetadata {
        interpolated_count: series.missing_count() - filled.missing_count(),
        original_nan_count: series.missing_count(),
        estimated_dates,
        method,
        shutdown_affected: false,
        date_range,
    };
    Ok((filled, metadata))
}

/// Per-date quality of an interpolated series, aligned to its index.
pub fn quality_flags(
    series: &TimeSeries,
    metadata: &InterpolationMetadata,
) -> Vec<(NaiveDate, DataQuality)> {
    series
        .dates()
        .map(|d| {
            let quality = if metadata.estimated_dates.contains(&d) {
                DataQuality::Interpolated
            } else {
                DataQuality::Actual
            };
            (d, quality)
        })
        .collect()
}

/// Upper and lower bands around estimated points; missing elsewhere.
pub fn confidence_bounds(
    series: &TimeSeries,
    metadata: &InterpolationMetadata,
    margin: f64,
) -> (TimeSeries, TimeSeries) {
    let band = |offset: f64| -> Vec<Option<f64>> {
        series
            .iter()
            .map(|(d, v)| {
                if metadata.estimated_dates.contains(&d) {
                    v.map(|v| v + offset)
                } else {
                    None
                }
            })
            .collect()
    };

    let upper = series
        .with_values(band(margin))
        .with_name(format!("{}_upper", series.name()));
    let lower = series
        .with_values(band(-margin))
        .with_name(format!("{}_lower", series.name()));
    (upper, lower)
}

/// Linear fill of gaps bounded by known values on both sides, by position.
fn fill_inside(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = values.to_vec();
    let mut last_known: Option<(usize, f64)> = None;

    for (i, value) in values.iter().enumerate() {
        let Some(v1) = *value else { continue };
        if let Some((i0, v0)) = last_known {
            let span = (i - i0) as f64;
            for (k, slot) in out.iter_mut().enumerate().take(i).skip(i0 + 1) {
                let t = (k - i0) as f64 / span;
                *slot = Some(v0 + (v1 - v0) * t);
            }
        }
        last_known = Some((i, v1));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn monthly(values: &[(i32, u32, Option<f64>)]) -> TimeSeries {
        let points = values.iter().map(|(y, m, v)| (month(*y, *m), *v));
        TimeSeries::from_points("UNRATE", points).unwrap()
    }

    #[test]
    fn test_midpoint_fill() {
        let data = monthly(&[(2025, 9, Some(4.4)), (2025, 10, None), (2025, 11, Some(4.6))]);
        let (filled, meta) = interpolate_gap(&data, SHUTDOWN_WINDOW);

        assert_eq!(filled.get(month(2025, 10)), Some(4.5));
        assert_eq!(meta.interpolated_count, 1);
        assert_eq!(meta.original_nan_count, 1);
        assert_eq!(meta.method, InterpolationMethod::Linear);
        assert!(meta.shutdown_affected);
        assert!(meta.estimated_dates.contains(&month(2025, 10)));
    }

    #[test]
    fn test_absent_window_row_is_inserted_and_filled() {
        let data = monthly(&[(2025, 8, Some(4.3)), (2025, 9, Some(4.4)), (2025, 11, Some(4.6))]);
        let (filled, meta) = interpolate_gap(&data, SHUTDOWN_WINDOW);

        assert_eq!(filled.len(), 4);
        assert_eq!(filled.get(month(2025, 10)), Some(4.5));
        assert_eq!(meta.interpolated_count, 1);
        assert_eq!(meta.original_nan_count, 0);
    }

    #[test]
    fn test_multiple_daily_dates_in_window() {
        let day = |m: u32, d: u32| NaiveDate::from_ymd_opt(2025, m, d).unwrap();
        let mut points = vec![(day(9, 30), Some(1.0))];
        for d in 1..=4 {
            points.push((day(10, d), None));
        }
        points.push((day(10, 5), Some(6.0)));
        let data = TimeSeries::from_points("DGS10", points).unwrap();

        let (filled, meta) = interpolate_gap(&data, SHUTDOWN_WINDOW);
        assert_eq!(meta.interpolated_count, 4);
        assert_eq!(filled.missing_count(), 0);
        assert_eq!(filled.get(day(10, 2)), Some(3.0));
    }

    #[test]
    fn test_missing_neighbours_still_filled_transitively() {
        let data = monthly(&[
            (2025, 7, Some(4.2)),
            (2025, 8, Some(4.3)),
            (2025, 9, None),
            (2025, 10, None),
            (2025, 11, None),
            (2025, 12, Some(4.7)),
        ]);
        let (filled, meta) = interpolate_gap(&data, SHUTDOWN_WINDOW);

        assert_eq!(filled.missing_count(), 0);
        assert_eq!(meta.estimated_dates.len(), 1);
        assert!(meta.estimated_dates.contains(&month(2025, 10)));
    }

    #[test]
    fn test_no_missing_data_is_a_no_op() {
        let data = monthly(&[(2025, 9, Some(4.4)), (2025, 10, Some(4.5)), (2025, 11, Some(4.6))]);
        let (filled, meta) = interpolate_gap(&data, SHUTDOWN_WINDOW);

        assert_eq!(filled, data);
        assert_eq!(meta.interpolated_count, 0);
        assert!(meta.estimated_dates.is_empty());
        assert!(!meta.shutdown_affected);
    }

    #[test]
    fn test_empty_series_is_a_no_op() {
        let data = TimeSeries::empty("X");
        let (filled, meta) = interpolate_gap(&data, SHUTDOWN_WINDOW);
        assert!(filled.is_empty());
        assert_eq!(meta, InterpolationMetadata::default());
    }

    #[test]
    fn test_never_extrapolates() {
        let data = monthly(&[(2025, 9, Some(4.4)), (2025, 10, None)]);
        let (filled, meta) = interpolate_gap(&data, SHUTDOWN_WINDOW);
        assert_eq!(filled, data);
        assert_eq!(meta.interpolated_count, 0);
    }

    #[test]
    fn test_idempotent() {
        let data = monthly(&[
            (2025, 8, Some(4.3)),
            (2025, 9, Some(4.4)),
            (2025, 10, None),
            (2025, 11, Some(4.6)),
        ]);
        let (once, _) = interpolate_gap(&data, SHUTDOWN_WINDOW);
        let (twice, meta) = interpolate_gap(&once, SHUTDOWN_WINDOW);

        assert_eq!(once, twice);
        assert_eq!(meta.interpolated_count, 0);
    }

    #[test]
    fn test_input_is_not_modified() {
        let data = monthly(&[(2025, 9, Some(4.4)), (2025, 10, None), (2025, 11, Some(4.6))]);
        let copy = data.clone();
        let _ = interpolate_gap(&data, SHUTDOWN_WINDOW);
        assert_eq!(data, copy);
        assert_eq!(data.missing_count(), 1);
    }

    #[test]
    fn test_range_limit_keeps_boundaries() {
        let data = monthly(&[
            (2025, 7, Some(100.0)),
            (2025, 8, None),
            (2025, 9, Some(110.0)),
            (2025, 10, None),
            (2025, 11, None),
            (2025, 12, Some(130.0)),
        ]);
        let range = Some((month(2025, 10), month(2025, 11)));
        let (filled, meta) = interpolate_range(&data, range, InterpolationMethod::Linear).unwrap();

        assert_eq!(filled.get(month(2025, 9)), Some(110.0));
        assert_eq!(filled.get(month(2025, 8)), None);
        let oct = filled.get(month(2025, 10)).unwrap();
        let nov = filled.get(month(2025, 11)).unwrap();
        assert!(110.0 < oct && oct < 130.0);
        assert!(110.0 < nov && nov < 130.0);
        assert_eq!(meta.interpolated_count, 2);
        assert_eq!(meta.date_range, range);
    }

    #[test]
    fn test_range_fill_all_gaps() {
        let data = monthly(&[
            (2025, 1, Some(1.0)),
            (2025, 2, None),
            (2025, 3, Some(3.0)),
            (2025, 4, None),
            (2025, 5, None),
            (2025, 6, Some(6.0)),
        ]);
        let (filled, meta) = interpolate_range(&data, None, InterpolationMethod::Linear).unwrap();
        assert_eq!(filled.missing_count(), 0);
        assert_eq!(meta.interpolated_count, 3);
        assert_eq!(filled.get(month(2025, 5)), Some(5.0));
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        let data = monthly(&[(2025, 1, Some(1.0))]);
        let bounds = Some((month(2025, 5), month(2025, 1)));
        let result = interpolate_range(&data, bounds, InterpolationMethod::Linear);
        assert!(matches!(result, Err(DataError::DataShape(_))));
    }

    #[test]
    fn test_quality_flags_and_confidence_bounds() {
        let data = monthly(&[(2025, 9, Some(4.4)), (2025, 10, None), (2025, 11, Some(4.6))]);
        let (filled, meta) = interpolate_gap(&data, SHUTDOWN_WINDOW);

        let flags = quality_flags(&filled, &meta);
        assert_eq!(flags[0], (month(2025, 9), DataQuality::Actual));
        assert_eq!(flags[1], (month(2025, 10), DataQuality::Interpolated));
        assert_eq!(flags[2], (month(2025, 11), DataQuality::Actual));

        let (upper, lower) = confidence_bounds(&filled, &meta, DEFAULT_CONFIDENCE_MARGIN);
        assert_eq!(upper.get(month(2025, 9)), None);
        assert_eq!(lower.get(month(2025, 11)), None);
        assert!((upper.get(month(2025, 10)).unwrap() - 4.7).abs() < 1e-9);
        assert!((lower.get(month(2025, 10)).unwrap() - 4.3).abs() < 1e-9);

        let (upper, lower) = confidence_bounds(&filled, &meta, 1.5);
        assert!((upper.get(month(2025, 10)).unwrap() - 6.0).abs() < 1e-9);
        assert!((lower.get(month(2025, 10)).unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_gap_window_neighbours() {
        let jan = GapWindow::new(2026, 1).unwrap();
        assert_eq!(jan.previous(), GapWindow::new(2025, 12).unwrap());
        assert_eq!(SHUTDOWN_WINDOW.next(), GapWindow::new(2025, 11).unwrap());
        assert!(GapWindow::new(2025, 13).is_err());
    }
}
