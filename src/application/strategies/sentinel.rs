use super::{signal_atr, TradingStrategy};
use crate::domain::market::{MarketData, OverrideAction};
use crate::domain::trading::{EntryParams, SessionConfig, Signal, SignalAction};

/// The guardian and the hunter. Only ever selected through a risk override,
/// never by regime classification.
///
/// Black swan: unconditional EXIT_LONG at full confidence. Shark mode:
/// strict bearish-structure short (price < EMA50 < EMA200, strong ADX,
/// bears in control but not bottomed).
#[derive(Debug, Clone, Default)]
pub struct SentinelStrategy;

impl TradingStrategy for SentinelStrategy {
    fn analyze(&self, data: &MarketData) -> Option<Signal> {
        match data.override_action {
            Some(OverrideAction::BlackSwan) => Some(
                Signal::new(&data.symbol, SignalAction::ExitLong, 1.0, 0.0)
                    .with_meta("reason", "BLACK_SWAN_PROTOCOL"),
            ),
            Some(OverrideAction::SharkMode) => {
                if data.len() < 50 {
                    return None;
                }
                let last = data.last()?;
                let price = last.close;
                let ema_50 = last.ema_50.unwrap_or(0.0);
                let ema_200 = last.ema_200.unwrap_or(0.0);
                let adx = last.adx.unwrap_or(0.0);
                let rsi = last.rsi.unwrap_or(50.0);
                let atr = last.atr.unwrap_or(0.0);

                let is_bear_structure = price < ema_50 && ema_50 < ema_200;
                let is_valid_momentum = adx > 25.0 && rsi > 20.0 && rsi < 50.0;
                if !(is_bear_structure && is_valid_momentum) {
                    return None;
                }

                let confidence = (0.7 + adx / 100.0).min(0.95);
                Some(
                    Signal::new(&data.symbol, SignalAction::Sell, confidence, price)
                        .with_meta("sub_mode", "SHARK_HUNT")
                        .with_meta("adx", format!("{:.1}", adx))
                        .with_meta("rsi", format!("{:.1}", rsi))
                        .with_meta("atr", atr),
                )
            }
            None => None,
        }
    }

    fn entry_params(&self, signal: &Signal, _balance: f64, config: &SessionConfig) -> EntryParams {
        // Shark shorts only; exits never reach entry sizing.
        let atr = signal_atr(signal);
        EntryParams {
            leverage: config.leverage.min(config.max_leverage_allowed),
            size_pct: config.max_capital_pct.min(config.max_capital_pct_allowed),
            stop_loss_price: signal.price + atr * 2.0,
            take_profit_price: signal.price - atr * 4.0,
        }
    }

    fn name(&self) -> &'static str {
        "Sentinel"
    }
}
