pub mod composite;
pub mod indicators;
pub mod markers;

pub use composite::{
    analyze_all, combine, CompositeScore, Contribution, RecessionAnalysis, RiskColor, RiskLevel,
};
pub use indicators::{Indicator, IndicatorScore, SignalLevel};
