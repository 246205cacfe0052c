use crate::domain::market::MarketData;
use crate::domain::trading::SessionConfig;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Three-timeframe bundle returned by the feature provider.
#[derive(Debug, Clone)]
pub struct MultiframeData {
    pub main: MarketData,
    pub macro_tf: Option<MarketData>,
    pub micro_tf: Option<MarketData>,
}

impl MultiframeData {
    /// Collapse into a single `MarketData` carrying the secondary tables,
    /// the shape strategies consume.
    pub fn into_market_data(self) -> MarketData {
        let mut data = self.main;
        data.macro_rows = self.macro_tf.map(|m| m.rows);
        data.micro_rows = self.micro_tf.map(|m| m.rows);
        data
    }
}

/// Feature provider: per-symbol indicator-enriched candle tables.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_candles(&self, symbol: &str) -> Result<MarketData>;
    async fn get_multiframe_candles(&self, symbol: &str) -> Result<MultiframeData>;
}

/// Session/trading layer: wallet state and position maintenance commands
/// used by the profit-safeguard monitor.
#[async_trait]
pub trait TradingSession: Send + Sync {
    async fn wallet_balance(&self) -> Result<f64>;
    fn session_config(&self) -> SessionConfig;
    async fn move_to_breakeven(&self, symbol: &str) -> Result<()>;
    async fn close_position(&self, symbol: &str, reason: &str) -> Result<()>;
}

/// Snapshot of global market health metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalMetrics {
    pub btc_dominance: f64,
    pub total_market_cap: f64,
    pub total_volume_24h: f64,
}

/// External macro metrics source, cached and rate-limited by the caller.
#[async_trait]
pub trait MacroMetricsProvider: Send + Sync {
    async fn global_metrics(&self) -> Result<GlobalMetrics>;
}
