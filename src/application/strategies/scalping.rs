use super::{signal_atr, TradingStrategy};
use crate::domain::market::{IndicatorRow, MarketData};
use crate::domain::trading::{EntryParams, SessionConfig, Signal, SignalAction};

/// Dual-timeframe scalping for volatile markets.
///
/// Direction comes from the main table (price vs EMA200); the trigger runs
/// on the micro table when one with enough depth is attached, otherwise on
/// the main table. RSI momentum confirmation guards both sides.
#[derive(Debug, Clone, Default)]
pub struct ScalpingStrategy;

impl ScalpingStrategy {
    fn trigger_rows<'a>(data: &'a MarketData) -> &'a [IndicatorRow] {
        match &data.micro_rows {
            Some(rows) if rows.len() >= 10 => rows,
            _ => &data.rows,
        }
    }
}

impl TradingStrategy for ScalpingStrategy {
    fn analyze(&self, data: &MarketData) -> Option<Signal> {
        let trend_last = data.last()?;
        let trend_close = trend_last.close;
        let ema_200 = trend_last.ema_200.unwrap_or(trend_close);

        let is_uptrend = trend_close > ema_200;
        let is_downtrend = trend_close < ema_200;

        let trigger = Self::trigger_rows(data);
        let last = trigger.last()?;
        let prev = if trigger.len() >= 2 {
            &trigger[trigger.len() - 2]
        } else {
            last
        };

        let rsi = last.rsi.unwrap_or(50.0);
        let rsi_prev = prev.rsi.unwrap_or(50.0);
        let adx = last.adx.unwrap_or(0.0);
        let atr = last.atr.unwrap_or(0.0);

        let rsi_rising = rsi > rsi_prev;
        let rsi_falling = rsi < rsi_prev;

        let (action, confidence) = if is_uptrend && rsi < 45.0 && rsi_rising {
            let mut conf = 0.70;
            if rsi < 35.0 {
                conf += 0.10;
            }
            if rsi < 30.0 {
                conf += 0.05;
            }
            if adx > 25.0 {
                conf += 0.05;
            }
            (SignalAction::Buy, conf)
        } else if is_downtrend && rsi > 55.0 && rsi_falling {
            let mut conf = 0.70;
            if rsi > 65.0 {
                conf += 0.10;
            }
            if rsi > 70.0 {
                conf += 0.05;
            }
            if adx > 25.0 {
                conf += 0.05;
            }
            (SignalAction::Sell, conf)
        } else {
            return None;
        };

        Some(
            Signal::new(&data.symbol, action, confidence, last.close)
                .with_meta("rsi", format!("{:.1}", rsi))
                .with_meta("rsi_momentum", if rsi_rising { "UP" } else { "DOWN" })
                .with_meta("adx", format!("{:.1}", adx))
                .with_meta("atr", atr),
        )
    }

    fn entry_params(&self, signal: &Signal, _balance: f64, config: &SessionConfig) -> EntryParams {
        let atr = signal_atr(signal);
        let price = signal.price;

        // Tight stops scaled by the external risk multiplier, then widened
        // to a 0.5%-of-price floor so fees never eat the whole range.
        let min_dist = price * 0.005;
        let sl_dist = (atr * 1.5 * config.risk_scale).max(min_dist);
        let tp_dist = (atr * 2.5 * config.risk_scale).max(min_dist);

        let (stop_loss_price, take_profit_price) = match signal.action {
            SignalAction::Buy => (price - sl_dist, price + tp_dist),
            _ => (price + sl_dist, price - tp_dist),
        };
        EntryParams {
            leverage: config.leverage.min(config.max_leverage_allowed),
            size_pct: config.max_capital_pct.min(config.max_capital_pct_allowed),
            stop_loss_price,
            take_profit_price,
        }
    }

    fn name(&self) -> &'static str {
        "Scalping"
    }
}
