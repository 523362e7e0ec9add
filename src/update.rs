//! One end-to-end refresh: fetch, score, persist the run summary.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::analysis::composite::{analyze_all, RecessionAnalysis};
use crate::data::fetcher::SeriesFetcher;
use crate::data::fred::SeriesSource;
use crate::storage::summary::{RunSummary, SummaryStore, TopRisk};

#[derive(Debug)]
pub struct UpdateReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cache_cleared: bool,
    /// Populated columns across all fetched categories.
    pub indicators_fetched: usize,
    /// Categories that failed or came back without any data.
    pub indicators_failed: usize,
    pub errors: Vec<String>,
    pub analysis: RecessionAnalysis,
    pub summary: RunSummary,
}

impl UpdateReport {
    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

pub fn run_update<S: SeriesSource>(
    fetcher: &mut SeriesFetcher<S>,
    store: &SummaryStore,
    force_refresh: bool,
    include_secondary: bool,
) -> Result<UpdateReport> {
    let started_at = Utc::now();
    info!("Starting data update (force refresh: {})", force_refresh);

    if force_refresh {
        info!("Clearing all cached data...");
        fetcher.clear_cache(None).context("Failed to clear cache")?;
    } else {
        let stats = fetcher.cache().stats();
        match (stats.oldest, stats.newest) {
            (Some(oldest), Some(newest)) => info!(
                "Cache: {} series ({} valid, {} expired), oldest {}, newest {}",
                stats.total_series,
                stats.valid_series,
                stats.expired_series,
                oldest.format("%Y-%m-%d %H:%M"),
                newest.format("%Y-%m-%d %H:%M")
            ),
            _ => info!("No cached data found"),
        }
    }
    fetcher.set_force_refresh(force_refresh);

    let data = fetcher.fetch_all(include_secondary);

    let mut indicators_fetched = 0;
    let mut indicators_failed = 0;
    let mut errors = Vec::new();
    for table in &data.tables {
        if table.is_empty() {
            indicators_failed += 1;
            errors.push(format!("No data for category: {}", table.category));
            warn!("{}: no data available", table.category);
        } else {
            indicators_fetched += table.populated_columns();
            info!(
                "{}: {} indicators, latest {}",
                table.category,
                table.populated_columns(),
                table
                    .latest_date()
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "n/a".to_string())
            );
        }
    }
    for (category, err) in &data.failures {
        indicators_failed += 1;
        errors.push(format!("{}: {}", category, err));
    }

    for row in fetcher.registry().summary() {
        if row.interpolated_points > 0 {
            info!(
                "{}: {} of {} points interpolated ({})",
                row.series_key,
                row.interpolated_points,
                row.total_points,
                row.rate_label()
            );
        }
    }

    let analysis = analyze_all(&data);
    let composite = &analysis.composite;
    info!("Composite Risk Score: {:.1}/100", composite.composite_score);
    info!("Risk Level: {}", composite.risk_level);

    let top: Vec<TopRisk> = composite
        .top_contributors(3)
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            info!("{}. {}: {:.1} points ({})", i + 1, c.description, c.contribution, c.signal);
            TopRisk {
                indicator: c.description.to_string(),
                contribution: c.contribution,
                signal: c.signal.clone(),
            }
        })
        .collect();

    let summary = RunSummary {
        timestamp: started_at,
        risk_score: composite.composite_score,
        risk_level: composite.risk_level.label().to_string(),
        indicators_fetched,
        indicators_failed,
        latest_data_date: data.latest_date(),
        top_risks: top,
    };
    store.save_latest(&summary).context("Failed to save run summary")?;

    let report = UpdateReport {
        started_at,
        finished_at: Utc::now(),
        cache_cleared: force_refresh,
        indicators_fetched,
        indicators_failed,
        errors,
        analysis,
        summary,
    };
    info!(
        "Update finished in {:.1}s: {} indicators fetched, {} failed",
        report.duration_secs(),
        report.indicators_fetched,
        report.indicators_failed
    );
    Ok(report)
}
