use super::{signal_atr, TradingStrategy};
use crate::domain::market::MarketData;
use crate::domain::trading::{EntryParams, SessionConfig, Signal, SignalAction};

/// Stateless dynamic grid around the EMA200 mean.
///
/// Volatility bands at EMA200 ± entry_mult·ATR; entries fade the move
/// (buy below the lower band, sell above the upper), with confidence
/// scaling by how many ATRs the price has overshot.
#[derive(Debug, Clone)]
pub struct GridStrategy {
    ema_period: usize,
    entry_mult: f64,
}

impl Default for GridStrategy {
    fn default() -> Self {
        Self {
            ema_period: 200,
            entry_mult: 2.0,
        }
    }
}

impl TradingStrategy for GridStrategy {
    fn analyze(&self, data: &MarketData) -> Option<Signal> {
        if data.len() < self.ema_period {
            return None;
        }
        let last = data.last()?;
        let price = last.close;
        let mean = last.ema_200?;
        let atr = last.atr?;
        if mean <= 0.0 || atr <= 0.0 {
            return None;
        }

        let upper_band = mean + self.entry_mult * atr;
        let lower_band = mean - self.entry_mult * atr;

        let (action, band, dist_sigma) = if price < lower_band {
            (SignalAction::Buy, lower_band, (lower_band - price) / atr)
        } else if price > upper_band {
            (SignalAction::Sell, upper_band, (price - upper_band) / atr)
        } else {
            return None;
        };

        let confidence = (0.6 + dist_sigma * 0.1).min(0.95);
        Some(
            Signal::new(&data.symbol, action, confidence, price)
                .with_meta("grid_dist", format!("{:.2}", dist_sigma))
                .with_meta("band", format!("{:.4}", band))
                .with_meta("atr", atr),
        )
    }

    fn entry_params(&self, signal: &Signal, _balance: f64, config: &SessionConfig) -> EntryParams {
        let atr = signal_atr(signal);
        // Wide stop to survive noise while the price works back to the mean.
        let sl_dist = atr * 4.0;
        let tp_dist = atr * 2.5;
        let (stop_loss_price, take_profit_price) = match signal.action {
            SignalAction::Buy => (signal.price - sl_dist, signal.price + tp_dist),
            _ => (signal.price + sl_dist, signal.price - tp_dist),
        };
        EntryParams {
            leverage: config.leverage.min(config.max_leverage_allowed),
            size_pct: config.max_capital_pct.min(config.max_capital_pct_allowed),
            stop_loss_price,
            take_profit_price,
        }
    }

    fn name(&self) -> &'static str {
        "Grid"
    }
}
