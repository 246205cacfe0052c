use super::{atr_spike, clamped_sizing, signal_atr, TradingStrategy};
use crate::domain::market::MarketData;
use crate::domain::trading::{EntryParams, SessionConfig, Signal, SignalAction};

/// Bidirectional trend following.
///
/// BUY on EMA20 > EMA50 with ADX confirming strength, SELL on the mirror.
/// When a macro timeframe is present a signal against the macro close-vs-EMA200
/// direction is dropped entirely, and volume relative to its average nudges
/// confidence.
#[derive(Debug, Clone, Default)]
pub struct TrendFollowingStrategy;

impl TradingStrategy for TrendFollowingStrategy {
    fn analyze(&self, data: &MarketData) -> Option<Signal> {
        if data.len() < 3 || atr_spike(data) {
            return None;
        }
        let last = data.last()?;

        let price = last.close;
        let ema_short = last.ema_20.unwrap_or(0.0);
        let ema_long = last.ema_50.unwrap_or(0.0);
        let ema_200 = last.ema_200.unwrap_or(0.0);
        let adx = last.adx.unwrap_or(0.0);
        let atr = last.atr.unwrap_or(0.0);

        let is_macro_uptrend = if ema_200 > 0.0 { price > ema_200 } else { true };

        let (action, mut confidence) = if ema_short > ema_long && adx > 20.0 {
            let base = (adx / 50.0).min(0.8);
            (
                SignalAction::Buy,
                if is_macro_uptrend { base + 0.15 } else { base },
            )
        } else if ema_short < ema_long && adx > 20.0 {
            let base = (adx / 50.0).min(0.8);
            (
                SignalAction::Sell,
                if !is_macro_uptrend { base + 0.15 } else { base },
            )
        } else {
            return None;
        };

        // Macro timeframe confirmation and volume validation.
        if let Some(macro_rows) = &data.macro_rows {
            if let Some(macro_last) = macro_rows.last() {
                let macro_ema = macro_last
                    .ema_200
                    .or(macro_last.ema_50)
                    .unwrap_or(0.0);
                if macro_ema > 0.0 {
                    if action == SignalAction::Buy && macro_last.close < macro_ema {
                        return None;
                    }
                    if action == SignalAction::Sell && macro_last.close > macro_ema {
                        return None;
                    }
                }
                let vol_sma = last.vol_sma.unwrap_or(0.0);
                if last.volume > vol_sma {
                    confidence += 0.10;
                } else {
                    confidence -= 0.05;
                }
            }
        }

        Some(
            Signal::new(&data.symbol, action, confidence, price)
                .with_meta("adx", format!("{:.1}", adx))
                .with_meta("ema_diff", format!("{:.4}", ema_short - ema_long))
                .with_meta("atr", atr),
        )
    }

    fn entry_params(&self, signal: &Signal, _balance: f64, config: &SessionConfig) -> EntryParams {
        let atr = signal_atr(signal);
        let (leverage, size_pct) = clamped_sizing(config);
        // Wide stops to ride the wave: 2 ATR against, 4 ATR target.
        let (stop_loss_price, take_profit_price) = match signal.action {
            SignalAction::Buy => (signal.price - atr * 2.0, signal.price + atr * 4.0),
            _ => (signal.price + atr * 2.0, signal.price - atr * 4.0),
        };
        EntryParams {
            leverage,
            size_pct,
            stop_loss_price,
            take_profit_price,
        }
    }

    fn name(&self) -> &'static str {
        "TrendFollowing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::strategies::test_support::base_table;

    fn trending_up(adx: f64) -> MarketData {
        let mut data = base_table(60, 100.0);
        if let Some(last) = data.rows.last_mut() {
            last.ema_20 = Some(101.0);
            last.ema_50 = Some(100.0);
            last.ema_200 = Some(95.0);
            last.adx = Some(adx);
        }
        data
    }

    #[test]
    fn test_buy_on_aligned_uptrend() {
        let signal = TrendFollowingStrategy.analyze(&trending_up(30.0)).unwrap();
        assert_eq!(signal.action, SignalAction::Buy);
        // base 0.6 + 0.15 macro alignment
        assert!((signal.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_no_signal_on_weak_adx() {
        assert!(TrendFollowingStrategy.analyze(&trending_up(15.0)).is_none());
    }

    #[test]
    fn test_sell_on_downtrend() {
        let mut data = base_table(60, 100.0);
        if let Some(last) = data.rows.last_mut() {
            last.ema_20 = Some(99.0);
            last.ema_50 = Some(100.0);
            last.ema_200 = Some(105.0);
            last.adx = Some(30.0);
        }
        let signal = TrendFollowingStrategy.analyze(&data).unwrap();
        assert_eq!(signal.action, SignalAction::Sell);
        assert!((signal.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_atr_spike_suppresses_signal() {
        let mut data = trending_up(30.0);
        if let Some(last) = data.rows.last_mut() {
            last.atr = Some(3.0); // 3x the 1.0 baseline
        }
        assert!(TrendFollowingStrategy.analyze(&data).is_none());
    }

    #[test]
    fn test_macro_conflict_rejected() {
        let bearish_macro = base_table(60, 100.0).rows;
        let mut macro_rows = bearish_macro;
        if let Some(last) = macro_rows.last_mut() {
            last.close = 90.0;
            last.ema_200 = Some(100.0);
        }
        let data = trending_up(30.0).with_macro(macro_rows);
        assert!(TrendFollowingStrategy.analyze(&data).is_none());
    }

    #[test]
    fn test_volume_breakout_boost() {
        let mut macro_rows = base_table(60, 100.0).rows;
        if let Some(last) = macro_rows.last_mut() {
            last.close = 110.0;
            last.ema_200 = Some(100.0);
        }
        let mut data = trending_up(30.0);
        if let Some(last) = data.rows.last_mut() {
            last.volume = 1000.0; // above 500 vol_sma
        }
        let data = data.with_macro(macro_rows);
        let signal = TrendFollowingStrategy.analyze(&data).unwrap();
        // 0.6 base + 0.15 macro + 0.10 volume
        assert!((signal.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_entry_params_atr_stops() {
        let signal = Signal::new("TESTUSDT", SignalAction::Buy, 0.8, 100.0).with_meta("atr", 2.0);
        let params =
            TrendFollowingStrategy.entry_params(&signal, 1000.0, &SessionConfig::default());
        assert_eq!(params.stop_loss_price, 96.0);
        assert_eq!(params.take_profit_price, 108.0);
        assert_eq!(params.leverage, 5);
    }
}
