use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse label for current market behaviour, used to pick a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegimeKind {
    Trend,
    Volatile,
    RangeTight,
    RangeWide,
    Normal,
    Uncertain,
}

impl fmt::Display for RegimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegimeKind::Trend => write!(f, "TREND"),
            RegimeKind::Volatile => write!(f, "VOLATILE"),
            RegimeKind::RangeTight => write!(f, "RANGE_TIGHT"),
            RegimeKind::RangeWide => write!(f, "RANGE_WIDE"),
            RegimeKind::Normal => write!(f, "NORMAL"),
            RegimeKind::Uncertain => write!(f, "UNCERTAIN"),
        }
    }
}

/// The closed set of strategy families. The factory's mapping from this enum
/// is the authoritative dispatch table; see `application::strategies`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    TrendFollowing,
    Grid,
    MeanReversion,
    Scalping,
    Sentinel,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::TrendFollowing => write!(f, "TrendFollowing"),
            StrategyKind::Grid => write!(f, "Grid"),
            StrategyKind::MeanReversion => write!(f, "MeanReversion"),
            StrategyKind::Scalping => write!(f, "Scalping"),
            StrategyKind::Sentinel => write!(f, "Sentinel"),
        }
    }
}

/// Classification result: regime, the strategy it suggests, and how sure the
/// classifier is. Immutable value produced once per analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRegime {
    pub regime: RegimeKind,
    pub suggested_strategy: StrategyKind,
    pub confidence: f64,
    pub reason: String,
}

impl MarketRegime {
    pub fn new(
        regime: RegimeKind,
        suggested_strategy: StrategyKind,
        confidence: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            regime,
            suggested_strategy,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
        }
    }

    pub fn uncertain(reason: impl Into<String>) -> Self {
        Self::new(RegimeKind::Uncertain, StrategyKind::MeanReversion, 0.0, reason)
    }
}
