use crate::data::cache::CacheError;

/// Errors raised by the data-quality and scoring pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Upstream fetch failed for {series_id}: {message}")]
    UpstreamFetch { series_id: String, message: String },

    #[error("Invalid series shape: {0}")]
    DataShape(String),

    #[error("Missing dependency data for {column}: {reason}")]
    MissingDependencyData { column: String, reason: String },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl DataError {
    pub fn upstream(series_id: &str, message: impl Into<String>) -> Self {
        DataError::UpstreamFetch {
            series_id: series_id.to_string(),
            message: message.into(),
        }
    }

    pub fn shape(message: impl Into<String>) -> Self {
        DataError::DataShape(message.into())
    }
}
