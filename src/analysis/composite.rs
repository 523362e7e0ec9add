use std::fmt;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::analysis::indicators::{Indicator, IndicatorScore};
use crate::data::fetcher::{Category, IndicatorData};
use crate::data::types::TimeSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Critical,
    Warning,
    Caution,
    Normal,
    Unknown,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 75.0 {
            RiskLevel::Critical
        } else if score >= 50.0 {
            RiskLevel::Warning
        } else if score >= 25.0 {
            RiskLevel::Caution
        } else {
            RiskLevel::Normal
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::Critical => "Critical - High Recession Risk",
            RiskLevel::Warning => "Warning - Elevated Risk",
            RiskLevel::Caution => "Caution - Moderate Risk",
            RiskLevel::Normal => "Normal - Low Risk",
            RiskLevel::Unknown => "Unknown",
        }
    }

    pub fn color(self) -> RiskColor {
        match self {
            RiskLevel::Critical => RiskColor::Red,
            RiskLevel::Warning => RiskColor::Orange,
            RiskLevel::Caution => RiskColor::Yellow,
            RiskLevel::Normal => RiskColor::Green,
            RiskLevel::Unknown => RiskColor::Gray,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskColor {
    Red,
    Orange,
    Yellow,
    Green,
    Gray,
}

impl RiskColor {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskColor::Red => "red",
            RiskColor::Orange => "orange",
            RiskColor::Yellow => "yellow",
            RiskColor::Green => "green",
            RiskColor::Gray => "gray",
        }
    }
}

/// One indicator's share of the composite.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub indicator: Indicator,
    pub score: f64,
    pub weight: f64,
    /// `score * weight / 100`
    pub contribution: f64,
    pub signal: String,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeScore {
    pub composite_score: f64,
    pub risk_level: RiskLevel,
    pub risk_color: RiskColor,
    pub breakdown: Vec<Contribution>,
    pub total_weight: f64,
}

impl CompositeScore {
    fn unknown() -> Self {
        Self {
            composite_score: 0.0,
            risk_level: RiskLevel::Unknown,
            risk_color: RiskColor::Gray,
            breakdown: Vec::new(),
            total_weight: 0.0,
        }
    }

    /// Largest contributions first.
    pub fn top_contributors(&self, n: usize) -> Vec<&Contribution> {
        let mut rows: Vec<&Contribution> = self.breakdown.iter().collect();
        rows.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));
        rows.truncate(n);
        rows
    }

    pub fn contribution(&self, indicator: Indicator) -> Option<&Contribution> {
        self.breakdown.iter().find(|c| c.indicator == indicator)
    }
}

/// Weighted mean of the scored indicators, renormalised over the weights
/// actually present and rounded to one decimal.
pub fn combine(scores: &[IndicatorScore]) -> CompositeScore {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    let mut breakdown = Vec::new();

    for indicator in Indicator::ALL {
        let Some(score) = scores.iter().find(|s| s.indicator == indicator && s.is_scored()) else {
            continue;
        };
        let thresholds = indicator.thresholds();
        weighted += score.score * thresholds.weight;
        total_weight += thresholds.weight;
        breakdown.push(Contribution {
            indicator,
            score: score.score,
            weight: thresholds.weight,
            contribution: score.score * thresholds.weight / 100.0,
            signal: score.signal.clone(),
            description: thresholds.description,
        });
    }

    if total_weight == 0.0 {
        return CompositeScore::unknown();
    }

    // Level comes from the unrounded score.
    let raw = weighted / total_weight;
    let risk_level = RiskLevel::from_score(raw);
    CompositeScore {
        composite_score: (raw * 10.0).round() / 10.0,
        risk_level,
        risk_color: risk_level.color(),
        breakdown,
        total_weight,
    }
}

#[derive(Debug, Clone)]
pub struct RecessionAnalysis {
    pub scores: Vec<IndicatorScore>,
    pub composite: CompositeScore,
    pub analysis_date: DateTime<Utc>,
}

impl RecessionAnalysis {
    pub fn score(&self, indicator: Indicator) -> Option<&IndicatorScore> {
        self.scores.iter().find(|s| s.indicator == indicator)
    }
}

const CREDIT_PREFERENCE: [&str; 3] = ["HY_Spread", "BBB_Spread", "BAA_Spread"];

/// Score every indicator available in `data` and combine them.
pub fn analyze_all(data: &IndicatorData) -> RecessionAnalysis {
    let score = |indicator: Indicator, column: Option<&TimeSeries>| -> IndicatorScore {
        match column {
            Some(series) => indicator.score(series),
            None => IndicatorScore::no_data(indicator),
        }
    };

    let credit = CREDIT_PREFERENCE
        .iter()
        .filter_map(|name| data.column(Category::CreditSpreads, name))
        .find(|series| series.valid_count() > 0);
    if let Some(series) = credit {
        debug!("Scoring credit stress from {}", series.name());
    }

    let scores = vec![
        score(
            Indicator::YieldCurve,
            data.column(Category::TreasuryYields, "Spread_10Y2Y"),
        ),
        score(Indicator::SahmRule, data.column(Category::LaborMarket, "SAHM_Rule")),
        score(Indicator::CreditSpread, credit),
        score(
            Indicator::UnemploymentChange,
            data.column(Category::LaborMarket, "UNRATE"),
        ),
        score(
            Indicator::LeiDecline,
            data.column(Category::LeadingIndex, "LEI_6M_Change"),
        ),
        score(Indicator::GdpGrowth, data.column(Category::Gdp, "GDP_QoQ_Growth")),
        score(
            Indicator::ManufacturingPmi,
            data.column(Category::Manufacturing, "ISM_PMI"),
        ),
    ];

    let composite = combine(&scores);
    RecessionAnalysis {
        scores,
        composite,
        analysis_date: Utc::now(),
    }
}
