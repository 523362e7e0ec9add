use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::data::fetcher::{default_start_date, FetchOptions};
use crate::error::DataError;
use crate::processing::interpolation::GapWindow;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    #[serde(default)]
    pub ttl_override_hours: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_start_date")]
    pub start_date: NaiveDate,
    #[serde(default)]
    pub force_refresh: bool,
    #[serde(default = "default_true")]
    pub apply_interpolation: bool,
    #[serde(default = "default_true")]
    pub include_secondary: bool,
    #[serde(default)]
    pub gap_window: GapWindow,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_summary_db")]
    pub summary_db: String,
}

fn default_cache_dir() -> String { "data/cache".to_string() }
fn default_summary_db() -> String { "data/last_run.db".to_string() }
fn default_true() -> bool { true }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            ttl_override_hours: None,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            start_date: default_start_date(),
            force_refresh: false,
            apply_interpolation: true,
            include_secondary: true,
            gap_window: GapWindow::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            summary_db: default_summary_db(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub fred_api_key: String,
    pub force_refresh: Option<bool>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {}", path))
    }

    /// Defaults when `path` does not exist.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            info!("No config file at {}, using defaults", path);
            Ok(Self::default())
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.fetch.gap_window.validate()?;
        if let Some(hours) = config.cache.ttl_override_hours {
            if hours <= 0 {
                return Err(DataError::Configuration(format!(
                    "ttl_override_hours must be positive, got {}",
                    hours
                ))
                .into());
            }
        }
        Ok(config)
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            start_date: self.fetch.start_date,
            use_cache: true,
            force_refresh: self.fetch.force_refresh,
            ttl_override_hours: self.cache.ttl_override_hours,
            apply_interpolation: self.fetch.apply_interpolation,
            gap_window: self.fetch.gap_window,
        }
    }
}

impl EnvConfig {
    pub fn load() -> Result<Self, DataError> {
        dotenv::dotenv().ok();

        let fred_api_key = std::env::var("FRED_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| DataError::Configuration("FRED_API_KEY not set".to_string()))?;

        Ok(Self {
            fred_api_key,
            force_refresh: std::env::var("FORCE_REFRESH").ok().and_then(|v| parse_flag(&v)),
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.cache.dir, "data/cache");
        assert_eq!(config.fetch.start_date, NaiveDate::from_ymd_opt(1980, 1, 1).unwrap());
        assert!(config.fetch.apply_interpolation);
        assert!(config.fetch.include_secondary);
        assert!(!config.fetch.force_refresh);
        assert_eq!(config.fetch.gap_window, GapWindow::default());
        assert_eq!(config.storage.summary_db, "data/last_run.db");
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
            [cache]
            dir = "/tmp/fred"
            ttl_override_hours = 6

            [fetch]
            start_date = "2000-01-01"
            force_refresh = true
            apply_interpolation = false
            include_secondary = false
            gap_window = { year = 2019, month = 1 }

            [storage]
            summary_db = "/tmp/run.db"
            "#,
        )
        .unwrap();

        let options = config.fetch_options();
        assert_eq!(options.ttl_override_hours, Some(6));
        assert_eq!(options.start_date, NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        assert!(options.force_refresh);
        assert!(!options.apply_interpolation);
        assert_eq!(options.gap_window, GapWindow::new(2019, 1).unwrap());
        assert!(!config.fetch.include_secondary);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::parse("[fetch]\ngap_window = { year = 2025, month = 13 }").is_err());
        assert!(Config::parse("[cache]\nttl_override_hours = 0").is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
