pub mod summary;

pub use summary::{RunSummary, SummaryStore, TopRisk};
