use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::data::types::{Frequency, TimeSeries};

const METADATA_DIR: &str = "metadata";
const DATA_TYPE: &str = "TimeSeries";
const RESERVED_KEYS: &[&str] = &[
    "series_id",
    "cached_at",
    "frequency",
    "cache_duration_hours",
    "data_points",
    "start_date",
    "end_date",
    "data_type",
];

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Metadata document stored next to every cached payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub series_id: String,
    pub cached_at: DateTime<Utc>,
    pub frequency: Frequency,
    pub cache_duration_hours: i64,
    pub data_points: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub data_type: String,
    /// Caller-supplied fields passed to `save`.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CacheMetadata {
    /// `None` when the TTL runs past the representable range; such
    /// entries never expire.
    pub fn expires_at(&self, ttl_override_hours: Option<i64>) -> Option<DateTime<Utc>> {
        let hours = ttl_override_hours.unwrap_or(self.cache_duration_hours);
        Duration::try_hours(hours).and_then(|ttl| self.cached_at.checked_add_signed(ttl))
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>, ttl_override_hours: Option<i64>) -> bool {
        self.expires_at(ttl_override_hours).map_or(true, |expires| now < expires)
    }
}

/// One row of `list_cached`.
#[derive(Debug, Clone)]
pub struct CacheListing {
    pub metadata: CacheMetadata,
    pub is_valid: bool,
    pub age_hours: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub total_series: usize,
    pub valid_series: usize,
    pub expired_series: usize,
    pub total_size_bytes: u64,
    pub by_frequency: BTreeMap<Frequency, usize>,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedPayload {
    name: String,
    observations: Vec<CachedObservation>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedObservation {
    date: NaiveDate,
    value: Option<f64>,
}

/// On-disk series cache with frequency-aware expiry.
///
/// Layout: `<dir>/<key>.json` holds the payload and
/// `<dir>/metadata/<key>.json` holds its [`CacheMetadata`]. Entries are
/// never locked; concurrent writers of the same key race and the last
/// write wins.
pub struct SeriesCache {
    cache_dir: PathBuf,
    metadata_dir: PathBuf,
}

impl SeriesCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let cache_dir = cache_dir.into();
        let metadata_dir = cache_dir.join(METADATA_DIR);
        fs::create_dir_all(&metadata_dir)?;

        Ok(Self {
            cache_dir,
            metadata_dir,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn data_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.json"))
    }

    fn metadata_path(&self, key: &str) -> PathBuf {
        self.metadata_dir.join(format!("{key}.json"))
    }

    /// Persist `series` under `key`, overwriting any previous entry.
    pub fn save(
        &self,
        key: &str,
        series: &TimeSeries,
        extra: Option<BTreeMap<String, serde_json::Value>>,
    ) -> Result<(), CacheError> {
        self.save_at(key, series, extra, Utc::now())
    }

    /// Like [`save`](Self::save) with an explicit `cached_at` timestamp.
    pub fn save_at(
        &self,
        key: &str,
        series: &TimeSeries,
        extra: Option<BTreeMap<String, serde_json::Value>>,
        cached_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        if !is_valid_key(key) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }

        let payload = CachedPayload {
            name: series.name().to_string(),
            observations: series
                .iter()
                .map(|(date, value)| CachedObservation { date, value })
                .collect(),
        };
        fs::write(self.data_path(key), serde_json::to_vec(&payload)?)?;

        let mut extra = extra.unwrap_or_default();
        extra.retain(|k, _| {
            let reserved = RESERVED_KEYS.contains(&k.as_str());
            if reserved {
                warn!("Ignoring reserved metadata field '{}' for {}", k, key);
            }
            !reserved
        });

        let frequency = Frequency::for_series(key);
        let metadata = CacheMetadata {
            series_id: key.to_string(),
            cached_at,
            frequency,
            cache_duration_hours: frequency.ttl_hours(),
            data_points: series.len(),
            start_date: series.first_date(),
            end_date: series.last_date(),
            data_type: DATA_TYPE.to_string(),
            extra,
        };
        fs::write(self.metadata_path(key), serde_json::to_vec_pretty(&metadata)?)?;

        debug!("Cached {} ({} points, {})", key, series.len(), frequency);
        Ok(())
    }

    /// Last saved payload, valid or not. Unreadable entries are misses.
    pub fn load(&self, key: &str) -> Option<TimeSeries> {
        if !is_valid_key(key) {
            return None;
        }
        let path = self.data_path(key);
        let bytes = fs::read(&path).ok()?;

        let payload: CachedPayload = match serde_json::from_slice(&bytes) {
            Ok(p) => p,
            Err(e) => {
                warn!("Unreadable cache payload {}: {}", path.display(), e);
                return None;
            }
        };

        let points = payload.observations.into_iter().map(|o| (o.date, o.value));
        match TimeSeries::from_points(payload.name, points) {
            Ok(series) => Some(series),
            Err(e) => {
                warn!("Corrupt cache payload {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn metadata(&self, key: &str) -> Option<CacheMetadata> {
        if !is_valid_key(key) {
            return None;
        }
        let path = self.metadata_path(key);
        let bytes = fs::read(&path).ok()?;

        match serde_json::from_slice(&bytes) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!("Unreadable cache metadata {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn is_valid(&self, key: &str, ttl_override_hours: Option<i64>) -> bool {
        self.is_valid_at(key, Utc::now(), ttl_override_hours)
    }

    pub fn is_valid_at(
        &self,
        key: &str,
        now: DateTime<Utc>,
        ttl_override_hours: Option<i64>,
    ) -> bool {
        self.metadata(key)
            .map(|m| m.is_valid_at(now, ttl_override_hours))
            .unwrap_or(false)
    }

    pub fn age(&self, key: &str) -> Option<Duration> {
        self.age_at(key, Utc::now())
    }

    pub fn age_at(&self, key: &str, now: DateTime<Utc>) -> Option<Duration> {
        self.metadata(key).map(|m| now - m.cached_at)
    }

    pub fn clear(&self, key: &str) -> Result<(), CacheError> {
        if !is_valid_key(key) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        remove_if_exists(&self.data_path(key))?;
        remove_if_exists(&self.metadata_path(key))?;
        Ok(())
    }

    pub fn clear_all(&self) -> Result<(), CacheError> {
        for path in json_files(&self.cache_dir)?
            .into_iter()
            .chain(json_files(&self.metadata_dir)?)
        {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Remove every entry whose TTL has elapsed; returns the cleared keys.
    pub fn clear_expired(&self) -> Result<Vec<String>, CacheError> {
        let mut cleared = Vec::new();
        for key in self.cached_keys()? {
            if !self.is_valid(&key, None) {
                self.clear(&key)?;
                cleared.push(key);
            }
        }
        Ok(cleared)
    }

    /// Remove every entry older than `max_age_days`; returns the cleared keys.
    pub fn clear_by_age(&self, max_age_days: i64) -> Result<Vec<String>, CacheError> {
        // Beyond the representable range nothing is old enough.
        let Some(max_age) = Duration::try_days(max_age_days) else {
            return Ok(Vec::new());
        };
        let mut cleared = Vec::new();
        for key in self.cached_keys()? {
            if self.age(&key).is_some_and(|age| age > max_age) {
                self.clear(&key)?;
                cleared.push(key);
            }
        }
        Ok(cleared)
    }

    /// All entries, newest first.
    pub fn list_cached(&self) -> Vec<CacheListing> {
        let now = Utc::now();
        let keys = match self.cached_keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to list cache directory: {}", e);
                return Vec::new();
            }
        };

        let mut listings: Vec<CacheListing> = keys
            .iter()
            .filter_map(|key| self.metadata(key))
            .map(|metadata| CacheListing {
                is_valid: metadata.is_valid_at(now, None),
                age_hours: (now - metadata.cached_at).num_seconds() as f64 / 3600.0,
                metadata,
            })
            .collect();

        listings.sort_by(|a, b| b.metadata.cached_at.cmp(&a.metadata.cached_at));
        listings
    }

    pub fn stats(&self) -> CacheStats {
        let cached = self.list_cached();
        if cached.is_empty() {
            return CacheStats::default();
        }

        let total_size_bytes = [&self.cache_dir, &self.metadata_dir]
            .into_iter()
            .filter_map(|dir| json_files(dir).ok())
            .flatten()
            .filter_map(|path| fs::metadata(path).ok())
            .map(|m| m.len())
            .sum();

        let mut by_frequency = BTreeMap::new();
        for item in &cached {
            *by_frequency.entry(item.metadata.frequency).or_insert(0) += 1;
        }

        let valid_series = cached.iter().filter(|item| item.is_valid).count();

        CacheStats {
            total_series: cached.len(),
            valid_series,
            expired_series: cached.len() - valid_series,
            total_size_bytes,
            by_frequency,
            oldest: cached.iter().map(|item| item.metadata.cached_at).min(),
            newest: cached.iter().map(|item| item.metadata.cached_at).max(),
        }
    }

    fn cached_keys(&self) -> Result<Vec<String>, CacheError> {
        let mut keys: Vec<String> = json_files(&self.metadata_dir)?
            .iter()
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

fn is_valid_key(key: &str) -> bool {
    static KEY_RE: OnceLock<Regex> = OnceLock::new();
    KEY_RE
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("static regex"))
        .is_match(key)
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>, CacheError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    Ok(files)
}

fn remove_if_exists(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monthly_series() -> TimeSeries {
        let d = |m| NaiveDate::from_ymd_opt(2025, m, 1).unwrap();
        let points = vec![(d(9), Some(4.4)), (d(10), None), (d(11), Some(4.6))];
        TimeSeries::from_points("UNRATE", points).unwrap()
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path()).unwrap();
        let series = monthly_series();

        cache.save("UNRATE", &series, None).unwrap();

        assert_eq!(cache.load("UNRATE"), Some(series));
        let meta = cache.metadata("UNRATE").unwrap();
        assert_eq!(meta.frequency, Frequency::Monthly);
        assert_eq!(meta.cache_duration_hours, 720);
        assert_eq!(meta.data_points, 3);
        assert_eq!(meta.start_date, NaiveDate::from_ymd_opt(2025, 9, 1));
        assert_eq!(meta.end_date, NaiveDate::from_ymd_opt(2025, 11, 1));
        assert_eq!(meta.data_type, "TimeSeries");
    }

    #[test]
    fn test_missing_entries_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path()).unwrap();

        assert!(cache.load("NOPE").is_none());
        assert!(!cache.is_valid("NOPE", None));
        assert!(cache.age("NOPE").is_none());
        assert!(cache.load("../etc/passwd").is_none());
    }

    #[test]
    fn test_ttl_validity_for_every_frequency() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path()).unwrap();
        let series = monthly_series();

        let keys = [
            ("DGS10", Frequency::Daily),
            ("ICSA", Frequency::Weekly),
            ("UNRATE", Frequency::Monthly),
            ("GDPC1", Frequency::Quarterly),
            ("CUSTOM_SERIES", Frequency::Unknown),
        ];

        for (key, freq) in keys {
            let cached_at = Utc::now();
            cache.save_at(key, &series, None, cached_at).unwrap();
            assert!(cache.is_valid(key, None), "{key} should be valid right after save");

            let ttl = Duration::hours(freq.ttl_hours());
            assert!(cache.is_valid_at(key, cached_at + ttl - Duration::seconds(1), None));
            assert!(!cache.is_valid_at(key, cached_at + ttl, None));
            assert!(!cache.is_valid_at(key, cached_at + ttl + Duration::seconds(1), None));
        }
    }

    #[test]
    fn test_annual_ttl_validity() {
        let cached_at = Utc::now();
        let metadata = CacheMetadata {
            series_id: "ANNUAL_SERIES".to_string(),
            cached_at,
            frequency: Frequency::Annual,
            cache_duration_hours: Frequency::Annual.ttl_hours(),
            data_points: 3,
            start_date: None,
            end_date: None,
            data_type: DATA_TYPE.to_string(),
            extra: BTreeMap::new(),
        };
        assert_eq!(metadata.cache_duration_hours, 8760);

        let ttl = Duration::hours(8760);
        assert!(metadata.is_valid_at(cached_at + ttl - Duration::seconds(1), None));
        assert!(!metadata.is_valid_at(cached_at + ttl, None));
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path()).unwrap();
        cache.save("UNRATE", &monthly_series(), None).unwrap();

        assert!(cache.is_valid("UNRATE", Some(1_000_000_000_000)));
        assert!(cache.is_valid("UNRATE", Some(i64::MAX)));
        assert!(cache.metadata("UNRATE").unwrap().expires_at(Some(i64::MAX)).is_none());
        assert!(cache.clear_by_age(i64::MAX).unwrap().is_empty());
        assert!(cache.load("UNRATE").is_some());
    }

    #[test]
    fn test_ttl_override() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path()).unwrap();
        let cached_at = Utc::now() - Duration::hours(2);
        cache.save_at("UNRATE", &monthly_series(), None, cached_at).unwrap();

        assert!(cache.is_valid("UNRATE", None));
        assert!(!cache.is_valid("UNRATE", Some(1)));
    }

    #[test]
    fn test_extra_metadata_is_kept_but_cannot_shadow_fields() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path()).unwrap();

        let mut extra = BTreeMap::new();
        extra.insert("source".to_string(), serde_json::json!("fred"));
        extra.insert("frequency".to_string(), serde_json::json!("annual"));
        cache.save("UNRATE", &monthly_series(), Some(extra)).unwrap();

        let meta = cache.metadata("UNRATE").unwrap();
        assert_eq!(meta.extra.get("source"), Some(&serde_json::json!("fred")));
        assert_eq!(meta.frequency, Frequency::Monthly);
    }

    #[test]
    fn test_clear_expired_and_by_age() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path()).unwrap();
        let series = monthly_series();
        let now = Utc::now();

        cache.save_at("DGS10", &series, None, now - Duration::hours(30)).unwrap();
        cache.save_at("UNRATE", &series, None, now - Duration::days(10)).unwrap();
        cache.save_at("GDPC1", &series, None, now).unwrap();

        assert_eq!(cache.clear_expired().unwrap(), vec!["DGS10".to_string()]);
        assert!(cache.load("DGS10").is_none());

        assert_eq!(cache.clear_by_age(7).unwrap(), vec!["UNRATE".to_string()]);
        assert!(cache.load("GDPC1").is_some());
    }

    #[test]
    fn test_list_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path()).unwrap();
        let series = monthly_series();
        let now = Utc::now();

        assert_eq!(cache.stats(), CacheStats::default());

        cache.save_at("DGS10", &series, None, now - Duration::hours(48)).unwrap();
        cache.save_at("DGS2", &series, None, now - Duration::hours(1)).unwrap();
        cache.save_at("UNRATE", &series, None, now - Duration::hours(5)).unwrap();

        let listed = cache.list_cached();
        let order: Vec<&str> = listed.iter().map(|l| l.metadata.series_id.as_str()).collect();
        assert_eq!(order, vec!["DGS2", "UNRATE", "DGS10"]);
        assert!(!listed[2].is_valid);
        assert!(listed[2].age_hours > 47.0);

        let stats = cache.stats();
        assert_eq!(stats.total_series, 3);
        assert_eq!(stats.valid_series, 2);
        assert_eq!(stats.expired_series, 1);
        assert_eq!(stats.by_frequency.get(&Frequency::Daily), Some(&2));
        assert_eq!(stats.by_frequency.get(&Frequency::Monthly), Some(&1));
        assert!(stats.total_size_bytes > 0);
        assert!(stats.oldest < stats.newest);

        cache.clear_all().unwrap();
        assert!(cache.list_cached().is_empty());
    }

    #[test]
    fn test_invalid_key_rejected_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path()).unwrap();
        let result = cache.save("../escape", &monthly_series(), None);
        assert!(matches!(result, Err(CacheError::InvalidKey(_))));
    }
}
