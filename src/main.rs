use anyhow::Result;
use recession_monitor::config::{Config, EnvConfig};
use recession_monitor::data::{FredClient, SeriesCache, SeriesFetcher};
use recession_monitor::storage::SummaryStore;
use recession_monitor::update;

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    tracing::info!("Recession monitor starting...");

    let force_flag = std::env::args().skip(1).any(|arg| arg == "--force");

    // Load configuration
    let config = Config::load_or_default("config.toml")?;
    let env_config = EnvConfig::load()?;
    let force_refresh =
        force_flag || env_config.force_refresh.unwrap_or(config.fetch.force_refresh);

    tracing::info!("Cache directory: {}", config.cache.dir);
    tracing::info!("Observation start: {}", config.fetch.start_date);
    tracing::info!("Interpolation: {}", config.fetch.apply_interpolation);

    let cache = SeriesCache::new(&config.cache.dir)?;
    let source = FredClient::new(env_config.fred_api_key);
    let mut fetcher = SeriesFetcher::new(source, cache, config.fetch_options());

    tracing::info!("Initializing summary database: {}", config.storage.summary_db);
    let store = SummaryStore::new(&config.storage.summary_db)?;

    let report = update::run_update(
        &mut fetcher,
        &store,
        force_refresh,
        config.fetch.include_secondary,
    )?;

    tracing::info!(
        "Composite risk {:.1}/100 ({})",
        report.summary.risk_score,
        report.summary.risk_level
    );
    for err in &report.errors {
        tracing::warn!("{}", err);
    }

    Ok(())
}
