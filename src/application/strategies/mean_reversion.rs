use super::{atr_spike, clamped_sizing, signal_atr, TradingStrategy};
use crate::domain::market::MarketData;
use crate::domain::trading::{EntryParams, SessionConfig, Signal, SignalAction};

/// Bollinger/RSI mean reversion with anti-falling-knife protection.
///
/// Entries require the RSI extreme AND the RSI turning back toward the
/// mean on the latest bar, so a crash in progress never triggers a buy.
/// This is also the factory's unconditional fallback family.
#[derive(Debug, Clone, Default)]
pub struct MeanReversionStrategy;

impl TradingStrategy for MeanReversionStrategy {
    fn analyze(&self, data: &MarketData) -> Option<Signal> {
        if data.len() < 3 || atr_spike(data) {
            return None;
        }
        let last = data.last()?;
        let prev = data.prev()?;

        let price = last.close;
        let rsi = last.rsi.unwrap_or(50.0);
        let rsi_prev = prev.rsi.unwrap_or(50.0);
        let bb_lower = last.bb_lower.unwrap_or(0.0);
        let bb_upper = last.bb_upper.unwrap_or(0.0);
        let ema_200 = last.ema_200.unwrap_or(price);
        let adx = last.adx.unwrap_or(0.0);
        let atr = last.atr.unwrap_or(0.0);

        // Under a ranging ADX both directions count as trend-aligned.
        let is_ranging = adx < 20.0;
        let is_uptrend = is_ranging || price > ema_200;
        let is_downtrend = is_ranging || price < ema_200;

        let rsi_rising = rsi > rsi_prev;
        let rsi_falling = rsi < rsi_prev;

        let (action, confidence) = if price > bb_upper && rsi > 70.0 && rsi_falling {
            let base = 0.7 + ((rsi - 70.0) / 30.0).min(0.2);
            (
                SignalAction::Sell,
                if is_downtrend { base + 0.1 } else { base },
            )
        } else if price < bb_lower && rsi < 30.0 && rsi_rising {
            let base = 0.7 + ((30.0 - rsi) / 30.0).min(0.2);
            (SignalAction::Buy, if is_uptrend { base + 0.1 } else { base })
        } else {
            return None;
        };

        Some(
            Signal::new(&data.symbol, action, confidence, price)
                .with_meta("rsi", format!("{:.1}", rsi))
                .with_meta("rsi_momentum", if rsi_rising { "UP" } else { "DOWN" })
                .with_meta("atr", atr),
        )
    }

    fn entry_params(&self, signal: &Signal, _balance: f64, config: &SessionConfig) -> EntryParams {
        let atr = signal_atr(signal);
        let (leverage, size_pct) = clamped_sizing(config);
        let sl_dist = atr * 2.0;
        let tp_dist = atr * 3.0;
        let (stop_loss_price, take_profit_price) = match signal.action {
            SignalAction::Buy => (signal.price - sl_dist, signal.price + tp_dist),
            _ => (signal.price + sl_dist, signal.price - tp_dist),
        };
        EntryParams {
            leverage,
            size_pct,
            stop_loss_price,
            take_profit_price,
        }
    }

    fn name(&self) -> &'static str {
        "MeanReversion"
    }
}
