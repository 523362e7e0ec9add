use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Nominal update cadence of an upstream series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
    Unknown,
}

/// FRED series id -> publication frequency.
const SERIES_FREQUENCIES: &[(&str, Frequency)] = &[
    // Daily
    ("DGS10", Frequency::Daily),
    ("DGS2", Frequency::Daily),
    ("DGS3MO", Frequency::Daily),
    ("BAMLH0A0HYM2", Frequency::Daily),
    ("BAMLC0A4CBBB", Frequency::Daily),
    ("DBAA", Frequency::Daily),
    ("DAAA", Frequency::Daily),
    // Weekly
    ("ICSA", Frequency::Weekly),
    // Monthly
    ("UNRATE", Frequency::Monthly),
    ("SAHMREALTIME", Frequency::Monthly),
    ("UMCSENT", Frequency::Monthly),
    ("CSCICP03USM665S", Frequency::Monthly),
    ("PCE", Frequency::Monthly),
    ("RSXFS", Frequency::Monthly),
    ("HOUST", Frequency::Monthly),
    ("PERMIT", Frequency::Monthly),
    ("HSN1F", Frequency::Monthly),
    ("EXHOSLUSM495S", Frequency::Monthly),
    ("MSPUS", Frequency::Monthly),
    ("USSLIND", Frequency::Monthly),
    ("USALOLITONOSTSAM", Frequency::Monthly),
    ("MANEMP", Frequency::Monthly),
    ("NEWORDER", Frequency::Monthly),
    ("INDPRO", Frequency::Monthly),
    ("IPMAN", Frequency::Monthly),
    // Quarterly
    ("GDPC1", Frequency::Quarterly),
    ("A939RX0Q048SBEA", Frequency::Quarterly),
    ("DGDSRG3Q086SBEA", Frequency::Quarterly),
];

impl Frequency {
    pub const ALL: [Frequency; 6] = [
        Frequency::Daily,
        Frequency::Weekly,
        Frequency::Monthly,
        Frequency::Quarterly,
        Frequency::Annual,
        Frequency::Unknown,
    ];

    /// Cache lifetime for data of this frequency.
    pub fn ttl_hours(self) -> i64 {
        match self {
            Frequency::Daily => 24,
            Frequency::Weekly => 168,
            Frequency::Monthly => 720,
            Frequency::Quarterly => 2160,
            Frequency::Annual => 8760,
            Frequency::Unknown => 24,
        }
    }

    /// Static lookup; ids missing from the table are `Unknown`.
    pub fn for_series(series_id: &str) -> Self {
        SERIES_FREQUENCIES
            .iter()
            .find(|(id, _)| *id == series_id)
            .map(|(_, freq)| *freq)
            .unwrap_or(Frequency::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Annual => "annual",
            Frequency::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, date-indexed series of optional values.
///
/// The index is strictly increasing and unique. `None` marks a missing
/// observation; non-finite floats are stored as `None`. Every operation
/// returns a new series, the receiver is never modified.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSeries {
    name: String,
    points: BTreeMap<NaiveDate, Option<f64>>,
}

impl TimeSeries {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: BTreeMap::new(),
        }
    }

    /// Build from ordered points. Fails if dates are not strictly increasing.
    pub fn from_points<I>(name: impl Into<String>, points: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = (NaiveDate, Option<f64>)>,
    {
        let name = name.into();
        let mut map = BTreeMap::new();
        let mut previous: Option<NaiveDate> = None;

        for (date, value) in points {
            if let Some(prev) = previous {
                if date <= prev {
                    return Err(DataError::shape(format!(
                        "series '{name}' index is not chronological: {date} follows {prev}"
                    )));
                }
            }
            previous = Some(date);
            map.insert(date, normalize(value));
        }

        Ok(Self { name, points: map })
    }

    /// Build from fully observed points.
    pub fn from_values<I>(name: impl Into<String>, points: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        Self::from_points(name, points.into_iter().map(|(d, v)| (d, Some(v))))
    }

    /// Build from loosely-typed rows whose index labels must be ISO dates.
    ///
    /// A label that is not a calendar date (e.g. a positional integer) is
    /// rejected instead of being coerced.
    pub fn from_raw<I, L>(name: impl Into<String>, rows: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = (L, Option<f64>)>,
        L: AsRef<str>,
    {
        let name = name.into();
        let mut points = Vec::new();
        for (label, value) in rows {
            let label = label.as_ref().trim();
            let date = NaiveDate::parse_from_str(label, "%Y-%m-%d").map_err(|_| {
                DataError::shape(format!(
                    "series '{name}' index label '{label}' is not a calendar date"
                ))
            })?;
            points.push((date, value));
        }
        Self::from_points(name, points)
    }

    pub(crate) fn from_map(
        name: impl Into<String>,
        points: BTreeMap<NaiveDate, Option<f64>>,
    ) -> Self {
        Self {
            name: name.into(),
            points: points.into_iter().map(|(d, v)| (d, normalize(v))).collect(),
        }
    }

    /// Same index, new values. `values` must match the index length.
    pub(crate) fn with_values(&self, values: Vec<Option<f64>>) -> Self {
        debug_assert_eq!(values.len(), self.points.len());
        let points = self
            .points
            .keys()
            .copied()
            .zip(values)
            .map(|(d, v)| (d, normalize(v)))
            .collect();
        Self {
            name: self.name.clone(),
            points,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.points.contains_key(&date)
    }

    /// Present value at `date`, `None` if absent or missing.
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.points.get(&date).copied().flatten()
    }

    pub fn is_missing(&self, date: NaiveDate) -> bool {
        matches!(self.points.get(&date), Some(None))
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, Option<f64>)> + '_ {
        self.points.iter().map(|(d, v)| (*d, *v))
    }

    pub fn values(&self) -> Vec<Option<f64>> {
        self.points.values().copied().collect()
    }

    /// Present observations only.
    pub fn valid(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.points.iter().filter_map(|(d, v)| v.map(|v| (*d, v)))
    }

    pub fn valid_count(&self) -> usize {
        self.points.values().filter(|v| v.is_some()).count()
    }

    pub fn missing_count(&self) -> usize {
        self.points.values().filter(|v| v.is_none()).count()
    }

    pub fn missing_dates(&self) -> Vec<NaiveDate> {
        self.points
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(d, _)| *d)
            .collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.keys().next_back().copied()
    }

    /// Latest present observation.
    pub fn last_valid(&self) -> Option<(NaiveDate, f64)> {
        self.points
            .iter()
            .rev()
            .find_map(|(d, v)| v.map(|v| (*d, v)))
    }

    /// Copy with a missing placeholder at `date`. Existing values are kept.
    pub fn with_placeholder(&self, date: NaiveDate) -> Self {
        let mut points = self.points.clone();
        points.entry(date).or_insert(None);
        Self {
            name: self.name.clone(),
            points,
        }
    }

    /// Inclusive date slice.
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> Self {
        let points = if start > end {
            BTreeMap::new()
        } else {
            self.points
                .range(start..=end)
                .map(|(d, v)| (*d, *v))
                .collect()
        };
        Self {
            name: self.name.clone(),
            points,
        }
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        self.with_values(self.values().into_iter().map(|v| v.map(&f)).collect())
    }

    /// `self - other` over the union of both indexes.
    pub fn difference(&self, other: &TimeSeries, name: impl Into<String>) -> Self {
        let mut points = BTreeMap::new();
        for date in self.points.keys().chain(other.points.keys()) {
            let value = match (self.get(*date), other.get(*date)) {
                (Some(a), Some(b)) => Some(a - b),
                _ => None,
            };
            points.insert(*date, value);
        }
        Self::from_map(name, points)
    }

    /// Trailing mean over `window` observations; requires a full window.
    pub fn rolling_mean(&self, window: usize) -> Self {
        self.rolling(window, |w| w.iter().sum::<f64>() / w.len() as f64)
    }

    /// Trailing minimum over `window` observations; requires a full window.
    pub fn rolling_min(&self, window: usize) -> Self {
        self.rolling(window, |w| w.iter().copied().fold(f64::INFINITY, f64::min))
    }

    fn rolling(&self, window: usize, reduce: impl Fn(&[f64]) -> f64) -> Self {
        let values = self.values();
        if window == 0 {
            return self.with_values(vec![None; values.len()]);
        }

        let mut out = Vec::with_capacity(values.len());
        let mut buf = Vec::with_capacity(window);
        for i in 0..values.len() {
            if i + 1 < window {
                out.push(None);
                continue;
            }
            buf.clear();
            buf.extend(values[i + 1 - window..=i].iter().flatten());
            out.push(if buf.len() == window { Some(reduce(&buf)) } else { None });
        }
        self.with_values(out)
    }

    /// Percent change against the value `periods` observations earlier.
    pub fn pct_change(&self, periods: usize) -> Self {
        let values = self.values();
        let out = (0..values.len())
            .map(|i| {
                if periods == 0 || i < periods {
                    return None;
                }
                match (values[i - periods], values[i]) {
                    (Some(prev), Some(curr)) if prev != 0.0 => Some((curr / prev - 1.0) * 100.0),
                    _ => None,
                }
            })
            .collect();
        self.with_values(out)
    }
}

fn normalize(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_frequency_lookup_and_ttl() {
        assert_eq!(Frequency::for_series("DGS10"), Frequency::Daily);
        assert_eq!(Frequency::for_series("GDPC1"), Frequency::Quarterly);
        assert_eq!(Frequency::for_series("NOT_A_SERIES"), Frequency::Unknown);

        assert_eq!(Frequency::Daily.ttl_hours(), 24);
        assert_eq!(Frequency::Weekly.ttl_hours(), 168);
        assert_eq!(Frequency::Monthly.ttl_hours(), 720);
        assert_eq!(Frequency::Quarterly.ttl_hours(), 2160);
        assert_eq!(Frequency::Annual.ttl_hours(), 8760);
        assert_eq!(Frequency::Unknown.ttl_hours(), 24);
    }

    #[test]
    fn test_rejects_non_chronological_index() {
        let result = TimeSeries::from_values("X", vec![(d(2025, 2, 1), 1.0), (d(2025, 1, 1), 2.0)]);
        assert!(matches!(result, Err(DataError::DataShape(_))));

        let dup = TimeSeries::from_values("X", vec![(d(2025, 1, 1), 1.0), (d(2025, 1, 1), 2.0)]);
        assert!(matches!(dup, Err(DataError::DataShape(_))));
    }

    #[test]
    fn test_rejects_integer_index_labels() {
        let labels = vec![("0", Some(1.0)), ("1", None), ("2", Some(3.0))];
        let result = TimeSeries::from_raw("X", labels);
        assert!(matches!(result, Err(DataError::DataShape(_))));
    }

    #[test]
    fn test_non_finite_values_are_missing() {
        let points = vec![(d(2025, 1, 1), Some(f64::NAN)), (d(2025, 2, 1), Some(1.0))];
        let s = TimeSeries::from_points("X", points).unwrap();
        assert_eq!(s.missing_count(), 1);
        assert_eq!(s.last_valid(), Some((d(2025, 2, 1), 1.0)));
    }

    #[test]
    fn test_difference_aligns_on_union() {
        let a = TimeSeries::from_values("A", vec![(d(2025, 1, 1), 4.0), (d(2025, 1, 2), 4.1)])
            .unwrap();
        let b = TimeSeries::from_values("B", vec![(d(2025, 1, 2), 4.5), (d(2025, 1, 3), 4.4)])
            .unwrap();
        let spread = a.difference(&b, "Spread");

        assert_eq!(spread.len(), 3);
        assert_eq!(spread.get(d(2025, 1, 1)), None);
        assert!((spread.get(d(2025, 1, 2)).unwrap() + 0.4).abs() < 1e-9);
        assert_eq!(spread.get(d(2025, 1, 3)), None);
    }

    #[test]
    fn test_rolling_requires_full_window() {
        let s = TimeSeries::from_points(
            "X",
            vec![
                (d(2025, 1, 1), Some(1.0)),
                (d(2025, 2, 1), Some(2.0)),
                (d(2025, 3, 1), Some(3.0)),
                (d(2025, 4, 1), None),
                (d(2025, 5, 1), Some(5.0)),
            ],
        )
        .unwrap();

        let mean = s.rolling_mean(3);
        assert_eq!(mean.get(d(2025, 2, 1)), None);
        assert_eq!(mean.get(d(2025, 3, 1)), Some(2.0));
        assert_eq!(mean.get(d(2025, 4, 1)), None);

        let min = s.rolling_min(2);
        assert_eq!(min.get(d(2025, 3, 1)), Some(2.0));
    }

    #[test]
    fn test_pct_change() {
        let s = TimeSeries::from_values("X", vec![(d(2025, 1, 1), 100.0), (d(2025, 2, 1), 110.0)])
            .unwrap();
        let pct = s.pct_change(1);
        assert_eq!(pct.get(d(2025, 1, 1)), None);
        assert!((pct.get(d(2025, 2, 1)).unwrap() - 10.0).abs() < 1e-9);
    }
}
