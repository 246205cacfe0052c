use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// One closed candle enriched by the feature provider with indicator columns.
///
/// Indicator fields are `Option` because upstream enrichment may not have
/// warmed up yet (e.g. EMA200 needs 200 bars). Consumers pick sensible
/// defaults per indicator, mirroring how they treat a missing column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,

    pub rsi: Option<f64>,
    pub adx: Option<f64>,
    pub atr: Option<f64>,
    pub ema_20: Option<f64>,
    pub ema_50: Option<f64>,
    pub ema_200: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub vol_sma: Option<f64>,
}

impl IndicatorRow {
    /// Bare row with only OHLCV populated.
    pub fn bare(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            rsi: None,
            adx: None,
            atr: None,
            ema_20: None,
            ema_50: None,
            ema_200: None,
            bb_upper: None,
            bb_lower: None,
            macd: None,
            macd_signal: None,
            vol_sma: None,
        }
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.timestamp, 0)
    }

    pub fn hour_of_day(&self) -> f64 {
        self.datetime().map(|dt| dt.hour() as f64).unwrap_or(12.0)
    }

    pub fn day_of_week(&self) -> f64 {
        self.datetime()
            .map(|dt| dt.weekday().num_days_from_monday() as f64)
            .unwrap_or(0.0)
    }

    /// Percent change of this candle, close vs open.
    pub fn pct_change(&self) -> f64 {
        if self.open > 0.0 {
            (self.close - self.open) / self.open * 100.0
        } else {
            0.0
        }
    }
}

/// Override action injected into the analysis context by the risk shield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverrideAction {
    BlackSwan,
    SharkMode,
}

impl std::fmt::Display for OverrideAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverrideAction::BlackSwan => write!(f, "BLACK_SWAN"),
            OverrideAction::SharkMode => write!(f, "SHARK_MODE"),
        }
    }
}

/// Per-symbol market view handed to classifiers and strategies.
///
/// `rows` is the main analysis timeframe, ascending by timestamp with unique
/// timestamps. `macro_rows`/`micro_rows` are the optional higher/lower
/// timeframes used by the confluence filter and scalping trigger. Read-only
/// downstream of the feature provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketData {
    pub symbol: String,
    pub rows: Vec<IndicatorRow>,
    pub macro_rows: Option<Vec<IndicatorRow>>,
    pub micro_rows: Option<Vec<IndicatorRow>>,
    /// Set by the orchestrator for the current event only; strategies read it,
    /// nothing else writes it.
    pub override_action: Option<OverrideAction>,
}

impl MarketData {
    pub fn new(symbol: impl Into<String>, rows: Vec<IndicatorRow>) -> Self {
        Self {
            symbol: symbol.into(),
            rows,
            macro_rows: None,
            micro_rows: None,
            override_action: None,
        }
    }

    pub fn with_macro(mut self, rows: Vec<IndicatorRow>) -> Self {
        self.macro_rows = Some(rows);
        self
    }

    pub fn with_micro(mut self, rows: Vec<IndicatorRow>) -> Self {
        self.micro_rows = Some(rows);
        self
    }

    pub fn last(&self) -> Option<&IndicatorRow> {
        self.rows.last()
    }

    pub fn prev(&self) -> Option<&IndicatorRow> {
        let n = self.rows.len();
        if n >= 2 { self.rows.get(n - 2) } else { None }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Mean of the trailing `period` values of a per-row field, current row
    /// included. Returns None when no value is present in the window.
    pub fn trailing_mean<F>(&self, period: usize, f: F) -> Option<f64>
    where
        F: Fn(&IndicatorRow) -> Option<f64>,
    {
        let start = self.rows.len().saturating_sub(period);
        let values: Vec<f64> = self.rows[start..].iter().filter_map(&f).collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }
}

/// Raw price tick forwarded by the streaming layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: String,
    pub price: f64,
    /// True only on the candle-close boundary for the main timeframe.
    pub is_closed: bool,
    pub timestamp: i64,
}
