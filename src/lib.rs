//! Recession risk monitor: cached FRED series, gap interpolation with
//! per-date quality tracking, and a weighted composite risk score.

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod processing;
pub mod storage;
pub mod update;

pub use error::DataError;
