//! Per-indicator recession risk scores on a 0-100 scale.

use std::fmt;

use serde::Serialize;

use crate::data::types::TimeSeries;

/// Alert thresholds and composite weight for one indicator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub warning: f64,
    pub critical: f64,
    pub weight: f64,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    YieldCurve,
    SahmRule,
    CreditSpread,
    UnemploymentChange,
    LeiDecline,
    GdpGrowth,
    ManufacturingPmi,
}

impl Indicator {
    pub const ALL: [Indicator; 7] = [
        Indicator::YieldCurve,
        Indicator::SahmRule,
        Indicator::CreditSpread,
        Indicator::UnemploymentChange,
        Indicator::LeiDecline,
        Indicator::GdpGrowth,
        Indicator::ManufacturingPmi,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Indicator::YieldCurve => "yield_curve",
            Indicator::SahmRule => "sahm_rule",
            Indicator::CreditSpread => "credit_spread",
            Indicator::UnemploymentChange => "unemployment_change",
            Indicator::LeiDecline => "lei_decline",
            Indicator::GdpGrowth => "gdp_growth",
            Indicator::ManufacturingPmi => "manufacturing_pmi",
        }
    }

    pub fn thresholds(self) -> Thresholds {
        let (warning, critical, weight, description) = match self {
            Indicator::YieldCurve => (0.0, -0.5, 25.0, "10Y-2Y Treasury Spread"),
            Indicator::SahmRule => (0.3, 0.5, 25.0, "Sahm Rule Indicator"),
            Indicator::CreditSpread => (4.0, 6.0, 15.0, "High Yield Credit Spread"),
            Indicator::UnemploymentChange => (0.3, 0.5, 20.0, "Unemployment Rate Change (3m)"),
            Indicator::LeiDecline => (-2.0, -5.0, 10.0, "LEI 6-Month Change"),
            Indicator::GdpGrowth => (0.5, -1.0, 15.0, "GDP Growth (QoQ)"),
            Indicator::ManufacturingPmi => (50.0, 45.0, 10.0, "ISM Manufacturing PMI"),
        };
        Thresholds {
            warning,
            critical,
            weight,
            description,
        }
    }

    pub fn weight(self) -> f64 {
        self.thresholds().weight
    }

    pub fn score(self, series: &TimeSeries) -> IndicatorScore {
        match self {
            Indicator::YieldCurve => score_yield_curve(series),
            Indicator::SahmRule => score_sahm_rule(series),
            Indicator::CreditSpread => score_credit_spread(series),
            Indicator::UnemploymentChange => score_unemployment_change(series),
            Indicator::LeiDecline => score_lei(series),
            Indicator::GdpGrowth => score_gdp_growth(series),
            Indicator::ManufacturingPmi => score_manufacturing_pmi(series),
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SignalLevel {
    Critical,
    Warning,
    Caution,
    Normal,
    NoData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorDetail {
    None,
    YieldCurve { is_inverted: bool, inversion_periods: usize },
    SahmRule { threshold: f64 },
    UnemploymentChange { change_3m: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorScore {
    pub indicator: Indicator,
    pub score: f64,
    pub level: SignalLevel,
    pub signal: String,
    pub current_value: Option<f64>,
    pub interpretation: String,
    pub detail: IndicatorDetail,
}

impl IndicatorScore {
    pub fn no_data(indicator: Indicator) -> Self {
        Self {
            indicator,
            score: 0.0,
            level: SignalLevel::NoData,
            signal: "No Data".to_string(),
            current_value: None,
            interpretation: "No data available".to_string(),
            detail: IndicatorDetail::None,
        }
    }

    pub fn is_scored(&self) -> bool {
        self.level != SignalLevel::NoData
    }

    fn new(
        indicator: Indicator,
        score: f64,
        level: SignalLevel,
        signal: &str,
        current: f64,
        interpretation: String,
    ) -> Self {
        Self {
            indicator,
            score: score.clamp(0.0, 100.0),
            level,
            signal: signal.to_string(),
            current_value: Some(current),
            interpretation,
            detail: IndicatorDetail::None,
        }
    }

    fn with_detail(mut self, detail: IndicatorDetail) -> Self {
        self.detail = detail;
        self
    }
}

fn latest(series: &TimeSeries) -> Option<f64> {
    series.last_valid().map(|(_, v)| v)
}

/// Linear ramp from 50 at `from` to 100 at `to`.
fn warning_ramp(value: f64, from: f64, to: f64) -> f64 {
    50.0 + (value - from) / (to - from) * 50.0
}

/// Scores a 10Y-2Y spread; lower spreads score higher.
pub fn score_yield_curve(series: &TimeSeries) -> IndicatorScore {
    let indicator = Indicator::YieldCurve;
    let Some(current) = latest(series) else {
        return IndicatorScore::no_data(indicator);
    };
    let t = indicator.thresholds();

    // Trailing run of inverted observations.
    let valid: Vec<f64> = series.valid().map(|(_, v)| v).collect();
    let inversion_periods = valid.iter().rev().take_while(|v| **v < 0.0).count();
    let is_inverted = current < 0.0;

    let (score, level, signal) = if current <= t.critical {
        (100.0, SignalLevel::Critical, "Critical - Deeply Inverted")
    } else if current <= t.warning {
        (70.0 + current.abs() / 0.5 * 30.0, SignalLevel::Warning, "Warning - Inverted")
    } else if current < 0.5 {
        (30.0 + (0.5 - current) / 0.5 * 40.0, SignalLevel::Caution, "Caution - Flattening")
    } else {
        ((30.0 - (current - 0.5) * 10.0).max(0.0), SignalLevel::Normal, "Normal")
    };

    let interpretation = if is_inverted {
        format!("Spread: {current:+.2}%, Inverted for {inversion_periods} periods")
    } else {
        format!("Spread: {current:+.2}%")
    };

    IndicatorScore::new(indicator, score, level, signal, current, interpretation).with_detail(
        IndicatorDetail::YieldCurve {
            is_inverted,
            inversion_periods,
        },
    )
}

pub fn score_sahm_rule(series: &TimeSeries) -> IndicatorScore {
    let indicator = Indicator::SahmRule;
    let Some(current) = latest(series) else {
        return IndicatorScore::no_data(indicator);
    };
    let t = indicator.thresholds();

    let (score, level, signal) = if current >= t.critical {
        (100.0, SignalLevel::Critical, "RECESSION SIGNAL")
    } else if current >= t.warning {
        (
            warning_ramp(current, t.warning, t.critical),
            SignalLevel::Warning,
            "Warning - Approaching Threshold",
        )
    } else {
        (current / t.warning * 50.0, SignalLevel::Normal, "Normal")
    };

    let interpretation = format!("Sahm Rule: {current:.2} (Threshold: {:.2})", t.critical);
    IndicatorScore::new(indicator, score, level, signal, current, interpretation)
        .with_detail(IndicatorDetail::SahmRule { threshold: t.critical })
}

pub fn score_credit_spread(series: &TimeSeries) -> IndicatorScore {
    let indicator = Indicator::CreditSpread;
    let Some(current) = latest(series) else {
        return IndicatorScore::no_data(indicator);
    };
    let t = indicator.thresholds();

    let (score, level, signal) = if current >= t.critical {
        (100.0, SignalLevel::Critical, "Critical - Severe Stress")
    } else if current >= t.warning {
        (
            warning_ramp(current, t.warning, t.critical),
            SignalLevel::Warning,
            "Warning - Elevated Stress",
        )
    } else {
        (current / t.warning * 50.0, SignalLevel::Normal, "Normal")
    };

    let interpretation = format!("Credit Spread: {current:.2}%");
    IndicatorScore::new(indicator, score, level, signal, current, interpretation)
}

/// Change in the unemployment rate over the last three observations.
/// Needs at least three present values.
pub fn score_unemployment_change(series: &TimeSeries) -> IndicatorScore {
    let indicator = Indicator::UnemploymentChange;
    let valid: Vec<f64> = series.valid().map(|(_, v)| v).collect();
    if valid.len() < 3 {
        return IndicatorScore::no_data(indicator);
    }
    let t = indicator.thresholds();

    let current = valid[valid.len() - 1];
    let three_back = if valid.len() >= 4 { valid[valid.len() - 4] } else { valid[0] };
    let change = current - three_back;

    let (score, level, signal) = if change >= t.critical {
        (100.0, SignalLevel::Critical, "Critical - Rapid Increase")
    } else if change >= t.warning {
        (warning_ramp(change, t.warning, t.critical), SignalLevel::Warning, "Warning - Rising")
    } else if change > 0.0 {
        (change / t.warning * 50.0, SignalLevel::Caution, "Caution - Slight Increase")
    } else {
        (0.0, SignalLevel::Normal, "Normal - Stable or Declining")
    };

    let interpretation = format!("Unemployment: {current:.1}% ({change:+.1}% over 3 months)");
    IndicatorScore::new(indicator, score, level, signal, current, interpretation)
        .with_detail(IndicatorDetail::UnemploymentChange { change_3m: change })
}

pub fn score_lei(series: &TimeSeries) -> IndicatorScore {
    let indicator = Indicator::LeiDecline;
    let Some(current) = latest(series) else {
        return IndicatorScore::no_data(indicator);
    };
    let t = indicator.thresholds();

    let (score, level, signal) = if current <= t.critical {
        (100.0, SignalLevel::Critical, "Critical - Steep Decline")
    } else if current <= t.warning {
        (warning_ramp(current, t.warning, t.critical), SignalLevel::Warning, "Warning - Declining")
    } else {
        ((50.0 - current * 10.0).min(50.0), SignalLevel::Normal, "Normal")
    };

    let interpretation = format!("LEI 6m Change: {current:+.1}%");
    IndicatorScore::new(indicator, score, level, signal, current, interpretation)
}

pub fn score_gdp_growth(series: &TimeSeries) -> IndicatorScore {
    let indicator = Indicator::GdpGrowth;
    let Some(current) = latest(series) else {
        return IndicatorScore::no_data(indicator);
    };
    let t = indicator.thresholds();

    let (score, level, signal) = if current <= t.critical {
        (100.0, SignalLevel::Critical, "Critical - Negative Growth")
    } else if current <= t.warning {
        (
            warning_ramp(current, t.warning, t.critical),
            SignalLevel::Warning,
            "Warning - Weak Growth",
        )
    } else {
        ((50.0 - current * 10.0).min(50.0), SignalLevel::Normal, "Normal")
    };

    let interpretation = format!("GDP Growth: {current:+.1}% QoQ");
    IndicatorScore::new(indicator, score, level, signal, current, interpretation)
}

pub fn score_manufacturing_pmi(series: &TimeSeries) -> IndicatorScore {
    let indicator = Indicator::ManufacturingPmi;
    let Some(current) = latest(series) else {
        return IndicatorScore::no_data(indicator);
    };
    let t = indicator.thresholds();

    let (score, level, signal) = if current <= t.critical {
        (100.0, SignalLevel::Critical, "Critical - Deep Contraction")
    } else if current <= t.warning {
        (
            warning_ramp(current, t.warning, t.critical),
            SignalLevel::Warning,
            "Warning - Contraction",
        )
    } else {
        ((50.0 - (current - 50.0) * 2.0).min(50.0), SignalLevel::Normal, "Normal - Expansion")
    };

    let interpretation = format!("ISM PMI: {current:.1}");
    IndicatorScore::new(indicator, score, level, signal, current, interpretation)
}
