use crate::config::ShieldConfig;
use crate::domain::errors::TradeVeto;
use crate::domain::market::{MarketData, OverrideAction};
use crate::domain::ports::{GlobalMetrics, MacroMetricsProvider};
use crate::domain::trading::{Signal, SignalAction};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Global market health. Exactly one state at a time, driven solely by the
/// reference symbol's closed candles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketHealth {
    Normal,
    SharkContext,
    BlackSwan,
}

impl std::fmt::Display for MarketHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketHealth::Normal => write!(f, "NORMAL"),
            MarketHealth::SharkContext => write!(f, "SHARK_CONTEXT"),
            MarketHealth::BlackSwan => write!(f, "BLACK_SWAN"),
        }
    }
}

/// Centralized risk system: market-health state machine, trade gatekeeper,
/// and breakeven math.
///
/// Single-writer discipline: only the orchestrator's event path calls the
/// mutating methods, and only the reference symbol's tick flips the state.
/// Every other symbol reads the already-evaluated state.
pub struct Shield {
    config: ShieldConfig,
    health: MarketHealth,
    portfolio_correlation: f64,
    macro_metrics: Option<GlobalMetrics>,
    last_macro_poll: Option<Instant>,
}

impl Shield {
    pub fn new(config: ShieldConfig) -> Self {
        Self {
            config,
            health: MarketHealth::Normal,
            portfolio_correlation: 0.0,
            macro_metrics: None,
            last_macro_poll: None,
        }
    }

    pub fn health(&self) -> MarketHealth {
        self.health
    }

    pub fn set_portfolio_correlation(&mut self, correlation: f64) {
        self.portfolio_correlation = correlation;
    }

    /// Re-evaluate global health from the reference symbol's latest closed
    /// candle, then return the override (if any) that applies to `symbol`.
    pub fn override_action(&mut self, symbol: &str, data: &MarketData) -> Option<OverrideAction> {
        if symbol == self.config.reference_symbol {
            self.evaluate_reference(data);
        }
        self.action_for(symbol)
    }

    /// The override currently applying to a symbol, without re-evaluating.
    pub fn action_for(&self, symbol: &str) -> Option<OverrideAction> {
        match self.health {
            MarketHealth::BlackSwan => Some(OverrideAction::BlackSwan),
            MarketHealth::SharkContext if self.config.shark_targets.contains(symbol) => {
                Some(OverrideAction::SharkMode)
            }
            _ => None,
        }
    }

    fn evaluate_reference(&mut self, data: &MarketData) {
        let change = match data.last() {
            Some(last) => last.pct_change(),
            None => return,
        };

        let next = if change < self.config.black_swan_threshold {
            MarketHealth::BlackSwan
        } else if change < self.config.shark_threshold {
            MarketHealth::SharkContext
        } else {
            MarketHealth::Normal
        };

        if next != self.health {
            match next {
                MarketHealth::BlackSwan => error!(
                    "BLACK SWAN: {} candle {:.2}% — forcing defensive posture",
                    data.symbol, change
                ),
                MarketHealth::SharkContext => warn!(
                    "Shark context armed: {} candle {:.2}%",
                    data.symbol, change
                ),
                MarketHealth::Normal => info!("Market health back to NORMAL"),
            }
            self.health = next;
        }
    }

    /// Gatekeeper for new entries.
    pub fn check_trade_approval(
        &self,
        signal: &Signal,
        current_exposure: f64,
    ) -> Result<(), TradeVeto> {
        if self.health == MarketHealth::BlackSwan && signal.action == SignalAction::Buy {
            return Err(TradeVeto::BlackSwanActive);
        }
        if current_exposure >= self.config.max_exposure {
            return Err(TradeVeto::ExposureCeiling {
                current: current_exposure,
                ceiling: self.config.max_exposure,
            });
        }
        if signal.action == SignalAction::Buy
            && self.portfolio_correlation > self.config.correlation_limit
        {
            return Err(TradeVeto::CorrelationLimit {
                correlation: self.portfolio_correlation,
                limit: self.config.correlation_limit,
            });
        }
        Ok(())
    }

    /// The true exit-without-loss price: entry plus round-trip fees and the
    /// slippage estimate.
    pub fn real_breakeven(entry_price: f64, fee_rate: f64, slippage: f64) -> f64 {
        entry_price * (1.0 + fee_rate * 2.0 + slippage)
    }

    pub fn macro_metrics(&self) -> Option<&GlobalMetrics> {
        self.macro_metrics.as_ref()
    }

    /// Rate-limited poll of the external macro metrics source. Failures are
    /// logged and the previous cache kept; this can never take the loop down.
    pub async fn update_macro_health(&mut self, provider: &Arc<dyn MacroMetricsProvider>) {
        if let Some(last) = self.last_macro_poll {
            if last.elapsed() < self.config.macro_poll_interval {
                return;
            }
        }
        self.last_macro_poll = Some(Instant::now());

        match provider.global_metrics().await {
            Ok(metrics) => {
                info!(
                    "Macro health: BTC dominance {:.1}%, market cap {:.0}",
                    metrics.btc_dominance, metrics.total_market_cap
                );
                self.macro_metrics = Some(metrics);
            }
            Err(e) => {
                warn!("Macro metrics poll failed (keeping cache): {}", e);
            }
        }
    }
}
