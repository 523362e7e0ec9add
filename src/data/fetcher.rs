use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::data::cache::SeriesCache;
use crate::data::fred::SeriesSource;
use crate::data::types::TimeSeries;
use crate::error::DataError;
use crate::processing::interpolation::{interpolate_gap, GapWindow};
use crate::processing::quality::QualityRegistry;

pub fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1980, 1, 1).unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub start_date: NaiveDate,
    pub use_cache: bool,
    pub force_refresh: bool,
    pub ttl_override_hours: Option<i64>,
    pub apply_interpolation: bool,
    pub gap_window: GapWindow,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            start_date: default_start_date(),
            use_cache: true,
            force_refresh: false,
            ttl_override_hours: None,
            apply_interpolation: true,
            gap_window: GapWindow::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    TreasuryYields,
    LaborMarket,
    CreditSpreads,
    LeadingIndex,
    Manufacturing,
    Gdp,
    Consumer,
    Housing,
}

impl Category {
    pub const CORE: [Category; 3] = [
        Category::TreasuryYields,
        Category::LaborMarket,
        Category::CreditSpreads,
    ];

    pub const SECONDARY: [Category; 5] = [
        Category::LeadingIndex,
        Category::Manufacturing,
        Category::Gdp,
        Category::Consumer,
        Category::Housing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::TreasuryYields => "treasury_yields",
            Category::LaborMarket => "labor_market",
            Category::CreditSpreads => "credit_spreads",
            Category::LeadingIndex => "lei",
            Category::Manufacturing => "manufacturing",
            Category::Gdp => "gdp",
            Category::Consumer => "consumer",
            Category::Housing => "housing",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a fallback chain: an upstream id and an optional transform
/// applied to what it returns.
#[derive(Clone, Copy)]
pub struct Candidate {
    pub series_id: &'static str,
    pub transform: Option<fn(&TimeSeries) -> TimeSeries>,
}

impl Candidate {
    pub fn raw(series_id: &'static str) -> Self {
        Self {
            series_id,
            transform: None,
        }
    }

    pub fn derived(series_id: &'static str, transform: fn(&TimeSeries) -> TimeSeries) -> Self {
        Self {
            series_id,
            transform: Some(transform),
        }
    }
}

/// Where a column's values came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub source: String,
    pub derived: bool,
    /// Position in the fallback chain; 0 is the preferred source.
    pub fallback_rank: usize,
}

impl Provenance {
    fn direct(series_id: &str) -> Self {
        Self {
            source: series_id.to_string(),
            derived: false,
            fallback_rank: 0,
        }
    }

    fn computed(expression: &str) -> Self {
        Self {
            source: expression.to_string(),
            derived: true,
            fallback_rank: 0,
        }
    }
}

/// Named columns for one category. Column names match the series names.
#[derive(Debug)]
pub struct CategoryTable {
    pub category: Category,
    columns: Vec<TimeSeries>,
    pub provenance: BTreeMap<String, Provenance>,
    /// Optional inputs that could not be fetched.
    pub degraded: Vec<DataError>,
}

impl CategoryTable {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            columns: Vec::new(),
            provenance: BTreeMap::new(),
            degraded: Vec::new(),
        }
    }

    pub fn push(&mut self, series: TimeSeries) {
        self.columns.retain(|c| c.name() != series.name());
        self.columns.push(series);
    }

    pub fn column(&self, name: &str) -> Option<&TimeSeries> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn columns(&self) -> impl Iterator<Item = &TimeSeries> {
        self.columns.iter()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name()).collect()
    }

    /// Columns that carry at least one present value.
    pub fn populated_columns(&self) -> usize {
        self.columns.iter().filter(|c| c.valid_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.populated_columns() == 0
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.columns.iter().filter_map(|c| c.last_valid().map(|(d, _)| d)).max()
    }

    fn record(&mut self, column: &str, provenance: Provenance) {
        self.provenance.insert(column.to_string(), provenance);
    }

    fn degrade(&mut self, column: &str, reason: String) {
        let err = DataError::MissingDependencyData {
            column: column.to_string(),
            reason,
        };
        warn!("{}: {}", self.category, err);
        self.degraded.push(err);
    }
}

#[derive(Debug, Default)]
pub struct IndicatorData {
    pub tables: Vec<CategoryTable>,
    pub failures: Vec<(Category, DataError)>,
}

impl IndicatorData {
    pub fn table(&self, category: Category) -> Option<&CategoryTable> {
        self.tables.iter().find(|t| t.category == category)
    }

    pub fn column(&self, category: Category, name: &str) -> Option<&TimeSeries> {
        self.table(category).and_then(|t| t.column(name))
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.tables.iter().filter_map(CategoryTable::latest_date).max()
    }
}

/// Sahm rule: 3-period mean of the unemployment rate minus its 12-period low.
pub fn sahm_rule(unrate: &TimeSeries) -> TimeSeries {
    unrate
        .rolling_mean(3)
        .difference(&unrate.rolling_min(12), "SAHM_Rule")
}

/// Cache-first access to upstream series, organised into category tables.
pub struct SeriesFetcher<S> {
    source: S,
    cache: SeriesCache,
    registry: QualityRegistry,
    options: FetchOptions,
}

impl<S: SeriesSource> SeriesFetcher<S> {
    pub fn new(source: S, cache: SeriesCache, options: FetchOptions) -> Self {
        Self {
            registry: QualityRegistry::new(options.gap_window),
            source,
            cache,
            options,
        }
    }

    pub fn registry(&self) -> &QualityRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &SeriesCache {
        &self.cache
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    pub fn set_force_refresh(&mut self, force_refresh: bool) {
        self.options.force_refresh = force_refresh;
    }

    /// Drop one cached series, or all of them.
    pub fn clear_cache(&self, key: Option<&str>) -> Result<(), DataError> {
        match key {
            Some(key) => self.cache.clear(key)?,
            None => self.cache.clear_all()?,
        }
        Ok(())
    }

    /// Valid cache entry, else upstream; on upstream failure fall back to an
    /// expired cache entry if one exists.
    pub fn fetch_series(&self, series_id: &str) -> Result<TimeSeries, DataError> {
        let opts = &self.options;
        if opts.use_cache
            && !opts.force_refresh
            && self.cache.is_valid(series_id, opts.ttl_override_hours)
        {
            if let Some(cached) = self.cache.load(series_id) {
                debug!("Using cached data for {}", series_id);
                return Ok(cached);
            }
        }

        info!("Fetching {} from FRED", series_id);
        match self.source.fetch(series_id, opts.start_date) {
            Ok(series) => {
                if opts.use_cache {
                    let extra = BTreeMap::from([(
                        "observation_start".to_string(),
                        json!(opts.start_date.format("%Y-%m-%d").to_string()),
                    )]);
                    if let Err(e) = self.cache.save(series_id, &series, Some(extra)) {
                        warn!("Failed to cache {}: {}", series_id, e);
                    }
                }
                Ok(series)
            }
            Err(err) => {
                if opts.use_cache {
                    if let Some(stale) = self.cache.load(series_id) {
                        warn!("{}; using stale cached data", err);
                        return Ok(stale);
                    }
                }
                Err(err)
            }
        }
    }

    /// First candidate that yields data wins. The result is named `column`.
    pub fn fetch_first(
        &self,
        column: &str,
        candidates: &[Candidate],
    ) -> Result<(TimeSeries, Provenance), DataError> {
        let mut reasons = Vec::new();

        for (rank, candidate) in candidates.iter().enumerate() {
            let fetched = match self.fetch_series(candidate.series_id) {
                Ok(series) => series,
                Err(e) => {
                    debug!("{} candidate {} failed: {}", column, candidate.series_id, e);
                    reasons.push(e.to_string());
                    continue;
                }
            };

            let series = match candidate.transform {
                Some(transform) => transform(&fetched),
                None => fetched,
            };
            if series.valid_count() == 0 {
                reasons.push(format!("{} returned no observations", candidate.series_id));
                continue;
            }

            if rank > 0 {
                info!("{} using fallback source {}", column, candidate.series_id);
            }
            let provenance = Provenance {
                source: candidate.series_id.to_string(),
                derived: candidate.transform.is_some(),
                fallback_rank: rank,
            };
            return Ok((series.with_name(column), provenance));
        }

        Err(DataError::MissingDependencyData {
            column: column.to_string(),
            reason: if reasons.is_empty() {
                "no candidate sources".to_string()
            } else {
                reasons.join("; ")
            },
        })
    }

    pub fn fetch_category(&mut self, category: Category) -> Result<CategoryTable, DataError> {
        match category {
            Category::TreasuryYields => self.fetch_treasury_yields(),
            Category::LaborMarket => self.fetch_labor_market(),
            Category::CreditSpreads => Ok(self.fetch_credit_spreads()),
            Category::LeadingIndex => Ok(self.fetch_leading_index()),
            Category::Manufacturing => Ok(self.fetch_manufacturing()),
            Category::Gdp => self.fetch_gdp(),
            Category::Consumer => self.fetch_consumer(),
            Category::Housing => self.fetch_housing(),
        }
    }

    /// Fetch the core categories, plus the secondary ones if requested.
    /// A failing category is recorded and the rest still run.
    pub fn fetch_all(&mut self, include_secondary: bool) -> IndicatorData {
        let mut categories = Category::CORE.to_vec();
        if include_secondary {
            categories.extend(Category::SECONDARY);
        }

        let mut data = IndicatorData::default();
        for category in categories {
            match self.fetch_category(category) {
                Ok(table) => {
                    info!(
                        "{}: {} of {} columns populated",
                        category,
                        table.populated_columns(),
                        table.columns.len()
                    );
                    data.tables.push(table);
                }
                Err(e) => {
                    warn!("Error fetching {}: {}", category, e);
                    data.failures.push((category, e));
                }
            }
        }
        data
    }

    pub fn fetch_treasury_yields(&mut self) -> Result<CategoryTable, DataError> {
        info!("Fetching Treasury yields...");
        let mut table = CategoryTable::new(Category::TreasuryYields);

        let dgs10 = self.required(&mut table, "DGS10", "DGS10")?;
        let dgs2 = self.required(&mut table, "DGS2", "DGS2")?;
        let dgs3mo = self.required(&mut table, "DGS3MO", "DGS3MO")?;

        let spread_2y = dgs10.difference(&dgs2, "Spread_10Y2Y");
        let spread_3m = dgs10.difference(&dgs3mo, "Spread_10Y3M");
        table.record("Spread_10Y2Y", Provenance::computed("DGS10-DGS2"));
        table.record("Spread_10Y3M", Provenance::computed("DGS10-DGS3MO"));

        for series in [dgs10, dgs2, dgs3mo, spread_2y, spread_3m] {
            table.push(series);
        }
        Ok(table)
    }

    pub fn fetch_labor_market(&mut self) -> Result<CategoryTable, DataError> {
        info!("Fetching labor market data...");
        let mut table = CategoryTable::new(Category::LaborMarket);

        let unrate = self.required(&mut table, "UNRATE", "UNRATE")?;
        let (sahm, provenance) = self.fetch_first(
            "SAHM_Rule",
            &[Candidate::raw("SAHMREALTIME"), Candidate::derived("UNRATE", sahm_rule)],
        )?;
        table.record("SAHM_Rule", provenance);
        let claims = self.required(&mut table, "Jobless_Claims", "ICSA")?;

        let unrate = self.prepare("UNRATE", unrate);
        let sahm = self.prepare("SAHM_Rule", sahm);
        let claims = self.prepare("Jobless_Claims", claims);
        let claims_4wk = self.prepare(
            "Jobless_Claims_4WK",
            claims.rolling_mean(4).with_name("Jobless_Claims_4WK"),
        );
        table.record("Jobless_Claims_4WK", Provenance::computed("ICSA 4-period mean"));

        for series in [unrate, sahm, claims, claims_4wk] {
            table.push(series);
        }
        Ok(table)
    }

    pub fn fetch_credit_spreads(&mut self) -> CategoryTable {
        info!("Fetching credit spreads...");
        let mut table = CategoryTable::new(Category::CreditSpreads);

        let hy = self.optional(&mut table, "HY_Spread", "BAMLH0A0HYM2");
        let bbb = self.optional(&mut table, "BBB_Spread", "BAMLC0A4CBBB");

        let (baa, aaa) = match (
            self.fetch_series("DBAA"),
            self.fetch_series("DAAA"),
            self.fetch_series("DGS10"),
        ) {
            (Ok(baa), Ok(aaa), Ok(dgs10)) => {
                table.record("BAA_Spread", Provenance::computed("DBAA-DGS10"));
                table.record("AAA_Spread", Provenance::computed("DAAA-DGS10"));
                (
                    baa.difference(&dgs10, "BAA_Spread"),
                    aaa.difference(&dgs10, "AAA_Spread"),
                )
            }
            (baa, aaa, dgs10) => {
                let reason = [baa.err(), aaa.err(), dgs10.err()]
                    .into_iter()
                    .flatten()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                table.degrade("BAA_Spread", reason.clone());
                table.degrade("AAA_Spread", reason);
                (TimeSeries::empty("BAA_Spread"), TimeSeries::empty("AAA_Spread"))
            }
        };

        for series in [hy, bbb, baa, aaa] {
            table.push(series);
        }
        table
    }

    pub fn fetch_leading_index(&mut self) -> CategoryTable {
        info!("Fetching Leading Economic Index...");
        let mut table = CategoryTable::new(Category::LeadingIndex);

        let lei = self.optional_first(
            &mut table,
            "LEI",
            &[Candidate::raw("USALOLITONOSTSAM"), Candidate::raw("USSLIND")],
        );
        let lei_mom = lei.pct_change(1).with_name("LEI_MoM");
        let lei_6m = lei.pct_change(6).with_name("LEI_6M_Change");

        for series in [lei, lei_mom, lei_6m] {
            table.push(series);
        }
        table
    }

    pub fn fetch_manufacturing(&mut self) -> CategoryTable {
        info!("Fetching manufacturing data...");
        let mut table = CategoryTable::new(Category::Manufacturing);

        let pmi_candidates = [Candidate::raw("IPMAN"), Candidate::raw("INDPRO")];
        let pmi = self.optional_first(&mut table, "ISM_PMI", &pmi_candidates);
        let employment = self.optional(&mut table, "ISM_Employment", "MANEMP");
        let new_orders = self.optional(&mut table, "ISM_New_Orders", "NEWORDER");
        let production = self.optional(&mut table, "Industrial_Production", "INDPRO");
        let ip_mom = production.pct_change(1).with_name("IP_MoM");

        for series in [pmi, employment, new_orders, production, ip_mom] {
            table.push(series);
        }
        table
    }

    pub fn fetch_gdp(&mut self) -> Result<CategoryTable, DataError> {
        info!("Fetching GDP data...");
        let mut table = CategoryTable::new(Category::Gdp);

        let gdp = self.required(&mut table, "Real_GDP", "GDPC1")?;
        let qoq = gdp.pct_change(1).with_name("GDP_QoQ_Growth");
        let yoy = gdp.pct_change(4).with_name("GDP_YoY_Growth");
        let per_capita = self.optional(&mut table, "GDP_Per_Capita", "A939RX0Q048SBEA");
        let goods = self.optional(&mut table, "GDP_Goods", "DGDSRG3Q086SBEA");

        for series in [gdp, qoq, yoy, per_capita, goods] {
            table.push(series);
        }
        Ok(table)
    }

    pub fn fetch_consumer(&mut self) -> Result<CategoryTable, DataError> {
        info!("Fetching consumer data...");
        let mut table = CategoryTable::new(Category::Consumer);

        let sentiment = self.required(&mut table, "UMich_Sentiment", "UMCSENT")?;
        let confidence = self.optional(&mut table, "Consumer_Confidence", "CSCICP03USM665S");
        let pce = self.optional(&mut table, "PCE", "PCE");
        let retail = self.optional(&mut table, "Retail_Sales", "RSXFS");

        let sentiment = self.prepare("UMich_Sentiment", sentiment);
        let confidence = self.prepare("Consumer_Confidence", confidence);
        let pce = self.prepare("PCE", pce);
        let retail = self.prepare("Retail_Sales", retail);

        let pce_mom = pce.pct_change(1).with_name("PCE_MoM");
        let pce_yoy = pce.pct_change(12).with_name("PCE_YoY");
        let retail_mom = retail.pct_change(1).with_name("Retail_Sales_MoM");

        for series in [sentiment, confidence, pce, retail, pce_mom, pce_yoy, retail_mom] {
            table.push(series);
        }
        Ok(table)
    }

    pub fn fetch_housing(&mut self) -> Result<CategoryTable, DataError> {
        info!("Fetching housing data...");
        let mut table = CategoryTable::new(Category::Housing);

        let starts = self.required(&mut table, "Housing_Starts", "HOUST")?;
        let permits = self.required(&mut table, "Building_Permits", "PERMIT")?;
        let starts_mom = starts.pct_change(1).with_name("Starts_MoM");
        let permits_mom = permits.pct_change(1).with_name("Permits_MoM");
        let new_sales = self.optional(&mut table, "New_Home_Sales", "HSN1F");
        let existing_sales = self.optional(&mut table, "Existing_Home_Sales", "EXHOSLUSM495S");
        let median_price = self.optional(&mut table, "Median_Home_Price", "MSPUS");
        let price_yoy = median_price.pct_change(4).with_name("Price_YoY");

        for series in [
            starts,
            permits,
            starts_mom,
            permits_mom,
            new_sales,
            existing_sales,
            median_price,
            price_yoy,
        ] {
            table.push(series);
        }
        Ok(table)
    }

    fn required(
        &self,
        table: &mut CategoryTable,
        column: &str,
        series_id: &str,
    ) -> Result<TimeSeries, DataError> {
        let series = self.fetch_series(series_id)?;
        table.record(column, Provenance::direct(series_id));
        Ok(series.with_name(column))
    }

    fn optional(&self, table: &mut CategoryTable, column: &str, series_id: &str) -> TimeSeries {
        match self.fetch_series(series_id) {
            Ok(series) => {
                table.record(column, Provenance::direct(series_id));
                series.with_name(column)
            }
            Err(e) => {
                table.degrade(column, e.to_string());
                TimeSeries::empty(column)
            }
        }
    }

    fn optional_first(
        &self,
        table: &mut CategoryTable,
        column: &str,
        candidates: &[Candidate],
    ) -> TimeSeries {
        match self.fetch_first(column, candidates) {
            Ok((series, provenance)) => {
                table.record(column, provenance);
                series
            }
            Err(e) => {
                let reason = match e {
                    DataError::MissingDependencyData { reason, .. } => reason,
                    other => other.to_string(),
                };
                table.degrade(column, reason);
                TimeSeries::empty(column)
            }
        }
    }

    /// Fill the gap window and record per-date quality under `key`.
    fn prepare(&mut self, key: &str, series: TimeSeries) -> TimeSeries {
        if !self.options.apply_interpolation || series.is_empty() {
            return series;
        }

        let (filled, mut metadata) = interpolate_gap(&series, self.options.gap_window);
        if metadata.interpolated_count > 0 {
            info!("{}: interpolated {} value(s) in gap window", key, metadata.interpolated_count);

            // Interior gaps outside the window are filled too; they are not observations.
            let side_filled: Vec<NaiveDate> = series
                .missing_dates()
                .into_iter()
                .filter(|d| !metadata.estimated_dates.contains(d) && filled.get(*d).is_some())
                .collect();
            if !side_filled.is_empty() {
                debug!("{}: {} gap(s) outside the window also filled", key, side_filled.len());
                metadata.estimated_dates.extend(side_filled);
                metadata.interpolated_count = metadata.estimated_dates.len();
            }
        }
        self.registry.register(key, &filled, Some(&metadata));
        filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::quality::DataQuality;
    use chrono::{Duration, Utc};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[derive(Default)]
    struct StubSource {
        series: HashMap<String, TimeSeries>,
        calls: RefCell<Vec<String>>,
    }

    impl StubSource {
        fn with(mut self, series: TimeSeries) -> Self {
            self.series.insert(series.name().to_string(), series);
            self
        }

        fn calls(&self, id: &str) -> usize {
            self.calls.borrow().iter().filter(|c| c.as_str() == id).count()
        }
    }

    impl SeriesSource for StubSource {
        fn fetch(&self, series_id: &str, _since: NaiveDate) -> Result<TimeSeries, DataError> {
            self.calls.borrow_mut().push(series_id.to_string());
            self.series
                .get(series_id)
                .cloned()
                .ok_or_else(|| DataError::upstream(series_id, "not found"))
        }
    }

    fn month(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn monthly(id: &str, from_year: i32, values: &[Option<f64>]) -> TimeSeries {
        let points = values.iter().enumerate().map(|(i, v)| {
            let offset = i as u32;
            (month(from_year + (offset / 12) as i32, offset % 12 + 1), *v)
        });
        TimeSeries::from_points(id, points).unwrap()
    }

    fn weekly(id: &str, values: &[f64]) -> TimeSeries {
        let start = NaiveDate::from_ymd_opt(2025, 9, 6).unwrap();
        let points = values
            .iter()
            .enumerate()
            .map(|(i, v)| (start + Duration::weeks(i as i64), *v));
        TimeSeries::from_values(id, points).unwrap()
    }

    fn fetcher(source: StubSource) -> (SeriesFetcher<StubSource>, TempDir) {
        let dir = TempDir::new().unwrap();
        let cache = SeriesCache::new(dir.path()).unwrap();
        (SeriesFetcher::new(source, cache, FetchOptions::default()), dir)
    }

    #[test]
    fn test_fetch_series_uses_cache() {
        let source = StubSource::default().with(monthly("UNRATE", 2025, &[Some(4.0), Some(4.1)]));
        let (fetcher, _dir) = fetcher(source);

        let first = fetcher.fetch_series("UNRATE").unwrap();
        let second = fetcher.fetch_series("UNRATE").unwrap();

        assert_eq!(first, second);
        assert_eq!(fetcher.source.calls("UNRATE"), 1);
        let meta = fetcher.cache().metadata("UNRATE").unwrap();
        assert_eq!(meta.data_points, 2);
        assert_eq!(meta.extra["observation_start"], json!("1980-01-01"));
    }

    #[test]
    fn test_force_refresh_bypasses_cache() {
        let source = StubSource::default().with(monthly("UNRATE", 2025, &[Some(4.0)]));
        let (mut fetcher, _dir) = fetcher(source);

        fetcher.fetch_series("UNRATE").unwrap();
        fetcher.set_force_refresh(true);
        fetcher.fetch_series("UNRATE").unwrap();

        assert_eq!(fetcher.source.calls("UNRATE"), 2);
    }

    #[test]
    fn test_stale_cache_fallback() {
        let (fetcher, _dir) = fetcher(StubSource::default());
        let cached = monthly("UNRATE", 2024, &[Some(3.9), Some(4.0)]);
        fetcher
            .cache()
            .save_at("UNRATE", &cached, None, Utc::now() - Duration::days(60))
            .unwrap();
        assert!(!fetcher.cache().is_valid("UNRATE", None));

        let series = fetcher.fetch_series("UNRATE").unwrap();
        assert_eq!(series, cached);
        assert_eq!(fetcher.source.calls("UNRATE"), 1);
    }

    #[test]
    fn test_upstream_error_without_cache_propagates() {
        let (fetcher, _dir) = fetcher(StubSource::default());
        let result = fetcher.fetch_series("UNRATE");
        assert!(matches!(
            result,
            Err(DataError::UpstreamFetch { ref series_id, .. }) if series_id == "UNRATE"
        ));
    }

    #[test]
    fn test_fetch_first_records_fallback() {
        let source = StubSource::default().with(monthly("USSLIND", 2025, &[Some(1.0), Some(1.1)]));
        let (fetcher, _dir) = fetcher(source);

        let (series, provenance) = fetcher
            .fetch_first("LEI", &[Candidate::raw("USALOLITONOSTSAM"), Candidate::raw("USSLIND")])
            .unwrap();

        assert_eq!(series.name(), "LEI");
        assert_eq!(provenance.source, "USSLIND");
        assert_eq!(provenance.fallback_rank, 1);
        assert!(!provenance.derived);

        let err = fetcher.fetch_first("X", &[Candidate::raw("NOPE")]).unwrap_err();
        assert!(matches!(
            err,
            DataError::MissingDependencyData { ref column, .. } if column == "X"
        ));
    }

    #[test]
    fn test_labor_market_sahm_fallback_and_interpolation() {
        let mut unrate = vec![Some(4.0); 24];
        unrate[4] = None; // 2024-05
        unrate[21] = None; // 2025-10
        let source = StubSource::default()
            .with(monthly("UNRATE", 2024, &unrate))
            .with(weekly("ICSA", &[220.0, 225.0, 230.0, 228.0, 232.0]));
        let (mut fetcher, _dir) = fetcher(source);

        let table = fetcher.fetch_labor_market().unwrap();

        assert_eq!(
            table.column_names(),
            vec!["UNRATE", "SAHM_Rule", "Jobless_Claims", "Jobless_Claims_4WK"]
        );
        let sahm = &table.provenance["SAHM_Rule"];
        assert_eq!(sahm.source, "UNRATE");
        assert!(sahm.derived);
        assert_eq!(sahm.fallback_rank, 1);

        assert_eq!(table.column("UNRATE").unwrap().get(month(2025, 10)), Some(4.0));
        assert_eq!(
            fetcher.registry().status("UNRATE", month(2025, 10)),
            DataQuality::Interpolated
        );
        assert_eq!(fetcher.registry().status("UNRATE", month(2025, 9)), DataQuality::Actual);
        assert_eq!(
            fetcher.registry().status("UNRATE", month(2024, 5)),
            DataQuality::Interpolated
        );
        assert_eq!(table.column("Jobless_Claims_4WK").unwrap().valid_count(), 2);
    }

    #[test]
    fn test_optional_inputs_degrade() {
        let (mut fetcher, _dir) = fetcher(StubSource::default());
        let table = fetcher.fetch_credit_spreads();

        assert_eq!(
            table.column_names(),
            vec!["HY_Spread", "BBB_Spread", "BAA_Spread", "AAA_Spread"]
        );
        assert!(table.is_empty());
        assert_eq!(table.degraded.len(), 4);
        assert!(table
            .degraded
            .iter()
            .all(|e| matches!(e, DataError::MissingDependencyData { .. })));
    }

    #[test]
    fn test_credit_spreads_against_treasury() {
        let source = StubSource::default()
            .with(monthly("DBAA", 2025, &[Some(6.0), Some(6.2)]))
            .with(monthly("DAAA", 2025, &[Some(5.0), Some(5.1)]))
            .with(monthly("DGS10", 2025, &[Some(4.0), Some(4.1)]));
        let (mut fetcher, _dir) = fetcher(source);

        let table = fetcher.fetch_credit_spreads();
        let baa = table.column("BAA_Spread").unwrap();
        assert!((baa.get(month(2025, 2)).unwrap() - 2.1).abs() < 1e-9);
        assert_eq!(table.degraded.len(), 2);
        assert!(table.provenance["AAA_Spread"].derived);
    }

    #[test]
    fn test_fetch_all_isolates_failures() {
        let gdp: Vec<Option<f64>> = (0..8).map(|i| Some(100.0 + i as f64)).collect();
        let source = StubSource::default().with(monthly("GDPC1", 2024, &gdp));
        let (mut fetcher, _dir) = fetcher(source);

        let data = fetcher.fetch_all(true);

        let failed: Vec<Category> = data.failures.iter().map(|(c, _)| *c).collect();
        assert_eq!(
            failed,
            vec![
                Category::TreasuryYields,
                Category::LaborMarket,
                Category::Consumer,
                Category::Housing
            ]
        );
        assert_eq!(data.tables.len(), 4);
        let qoq = data.column(Category::Gdp, "GDP_QoQ_Growth").unwrap();
        assert_eq!(qoq.valid_count(), 7);
        assert!(data.table(Category::LeadingIndex).unwrap().is_empty());
    }

    #[test]
    fn test_fetch_all_core_only() {
        let (mut fetcher, _dir) = fetcher(StubSource::default());
        let data = fetcher.fetch_all(false);
        assert_eq!(data.tables.len() + data.failures.len(), 3);
    }

    #[test]
    fn test_sahm_rule() {
        let mut values = vec![Some(4.0); 12];
        values.extend([Some(4.4), Some(4.6), Some(4.8)]);
        let sahm = sahm_rule(&monthly("UNRATE", 2024, &values));

        assert_eq!(sahm.name(), "SAHM_Rule");
        assert_eq!(sahm.get(month(2024, 12)), Some(0.0));
        let latest = sahm.last_valid().unwrap().1;
        assert!((latest - 0.6).abs() < 1e-9);
    }
}
