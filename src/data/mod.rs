pub mod cache;
pub mod fetcher;
pub mod fred;
pub mod types;

pub use cache::{CacheError, CacheMetadata, CacheStats, SeriesCache};
pub use fetcher::{
    Candidate, Category, CategoryTable, FetchOptions, IndicatorData, Provenance, SeriesFetcher,
};
pub use fred::{FredClient, SeriesSource};
pub use types::{Frequency, TimeSeries};
