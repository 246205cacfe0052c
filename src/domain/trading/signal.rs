use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Actionable signal direction. HOLD is never surfaced; strategies return
/// `None` instead of a hold signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    Buy,
    Sell,
    ExitLong,
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalAction::Buy => write!(f, "BUY"),
            SignalAction::Sell => write!(f, "SELL"),
            SignalAction::ExitLong => write!(f, "EXIT_LONG"),
        }
    }
}

/// Trade signal emitted by a strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub action: SignalAction,
    pub confidence: f64,
    pub price: f64,
    pub metadata: HashMap<String, String>,
    pub strategy: Option<String>,
}

impl Signal {
    pub fn new(symbol: impl Into<String>, action: SignalAction, confidence: f64, price: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            action,
            confidence: confidence.clamp(0.0, 1.0),
            price,
            metadata: HashMap::new(),
            strategy: None,
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// ATR attached by the emitting strategy, used for entry sizing.
    pub fn atr(&self) -> Option<f64> {
        self.metadata.get("atr").and_then(|v| v.parse().ok())
    }
}

/// Leverage, size fraction and protective prices derived from a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryParams {
    pub leverage: u32,
    pub size_pct: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
}

/// Per-session trading profile supplied by the session layer.
///
/// `*_allowed` fields are the hard ceilings of the active risk profile;
/// requested values are clamped against them by the strategies that size
/// entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub leverage: u32,
    pub max_leverage_allowed: u32,
    pub max_capital_pct: f64,
    pub max_capital_pct_allowed: f64,
    pub risk_per_trade_pct: f64,
    /// External risk-scaling multiplier applied to scalping stop distances.
    pub risk_scale: f64,
    pub fee_rate: f64,
    pub slippage: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            leverage: 5,
            max_leverage_allowed: 10,
            max_capital_pct: 0.10,
            max_capital_pct_allowed: 0.15,
            risk_per_trade_pct: 0.01,
            risk_scale: 1.0,
            fee_rate: 0.001,
            slippage: 0.0005,
        }
    }
}
