use crate::domain::market::MarketData;
use crate::domain::ports::{
    GlobalMetrics, MacroMetricsProvider, MarketDataProvider, MultiframeData, TradingSession,
};
use crate::domain::trading::SessionConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::RwLock;

/// In-memory feature provider for tests and the demo binary. Tables are
/// registered per symbol; multiframe requests reuse the same table for the
/// secondary timeframes unless those are registered separately.
#[derive(Default)]
pub struct MockMarketDataProvider {
    tables: RwLock<HashMap<String, MarketData>>,
    macro_tables: RwLock<HashMap<String, MarketData>>,
    micro_tables: RwLock<HashMap<String, MarketData>>,
}

impl MockMarketDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_table(&self, symbol: &str, data: MarketData) {
        self.tables.write().await.insert(symbol.to_string(), data);
    }

    pub async fn set_macro_table(&self, symbol: &str, data: MarketData) {
        self.macro_tables
            .write()
            .await
            .insert(symbol.to_string(), data);
    }

    pub async fn set_micro_table(&self, symbol: &str, data: MarketData) {
        self.micro_tables
            .write()
            .await
            .insert(symbol.to_string(), data);
    }
}

#[async_trait]
impl MarketDataProvider for MockMarketDataProvider {
    async fn get_candles(&self, symbol: &str) -> Result<MarketData> {
        self.tables
            .read()
            .await
            .get(symbol)
            .cloned()
            .ok_or_else(|| anyhow!("no table registered for {}", symbol))
    }

    async fn get_multiframe_candles(&self, symbol: &str) -> Result<MultiframeData> {
        let main = self.get_candles(symbol).await?;
        let macro_tf = self.macro_tables.read().await.get(symbol).cloned();
        let micro_tf = self.micro_tables.read().await.get(symbol).cloned();
        Ok(MultiframeData {
            main,
            macro_tf,
            micro_tf,
        })
    }
}

/// Session layer stub recording maintenance commands for assertions.
pub struct MockTradingSession {
    balance: f64,
    config: SessionConfig,
    pub breakeven_calls: Mutex<Vec<String>>,
    pub close_calls: Mutex<Vec<(String, String)>>,
}

impl MockTradingSession {
    pub fn new(balance: f64) -> Self {
        Self {
            balance,
            config: SessionConfig::default(),
            breakeven_calls: Mutex::new(Vec::new()),
            close_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl TradingSession for MockTradingSession {
    async fn wallet_balance(&self) -> Result<f64> {
        Ok(self.balance)
    }

    fn session_config(&self) -> SessionConfig {
        self.config.clone()
    }

    async fn move_to_breakeven(&self, symbol: &str) -> Result<()> {
        self.breakeven_calls
            .lock()
            .expect("mock lock")
            .push(symbol.to_string());
        Ok(())
    }

    async fn close_position(&self, symbol: &str, reason: &str) -> Result<()> {
        self.close_calls
            .lock()
            .expect("mock lock")
            .push((symbol.to_string(), reason.to_string()));
        Ok(())
    }
}

/// Macro metrics stub; `failing` simulates an unreachable upstream.
pub struct MockMacroMetrics {
    metrics: GlobalMetrics,
    failing: bool,
}

impl MockMacroMetrics {
    pub fn new() -> Self {
        Self {
            metrics: GlobalMetrics {
                btc_dominance: 52.0,
                total_market_cap: 2.4e12,
                total_volume_24h: 9.0e10,
            },
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }
}

impl Default for MockMacroMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MacroMetricsProvider for MockMacroMetrics {
    async fn global_metrics(&self) -> Result<GlobalMetrics> {
        if self.failing {
            anyhow::bail!("macro metrics upstream unreachable")
        }
        Ok(self.metrics.clone())
    }
}
