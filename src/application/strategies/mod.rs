use crate::domain::market::MarketData;
use crate::domain::trading::{EntryParams, SessionConfig, Signal};

pub mod factory;
pub mod grid;
pub mod mean_reversion;
pub mod scalping;
pub mod sentinel;
pub mod trend;

pub use factory::{StrategyFactory, StrategyRegistry, StrategySelection};
pub use grid::GridStrategy;
pub use mean_reversion::MeanReversionStrategy;
pub use scalping::ScalpingStrategy;
pub use sentinel::SentinelStrategy;
pub use trend::TrendFollowingStrategy;

/// Common contract for all strategy families.
///
/// `analyze` is pure over the provided table: `None` means "no actionable
/// setup" (hold is never a signal). `entry_params` derives sizing and
/// protective prices from an emitted signal.
pub trait TradingStrategy: Send + Sync {
    fn analyze(&self, data: &MarketData) -> Option<Signal>;
    fn entry_params(&self, signal: &Signal, balance: f64, config: &SessionConfig) -> EntryParams;
    fn name(&self) -> &'static str;
}

/// Shared volatility guard: true when the current ATR exceeds twice the
/// trailing 20-period mean (current row included). Signal generation is
/// suppressed in those conditions.
pub(crate) fn atr_spike(data: &MarketData) -> bool {
    let atr = match data.last().and_then(|r| r.atr) {
        Some(atr) => atr,
        None => return false,
    };
    match data.trailing_mean(20, |r| r.atr) {
        Some(avg) if avg > 0.0 => atr > avg * 2.0,
        _ => false,
    }
}

/// Leverage and capital fraction clamped to the risk-profile ceilings.
pub(crate) fn clamped_sizing(config: &SessionConfig) -> (u32, f64) {
    let leverage = config.leverage.min(config.max_leverage_allowed);
    let size_pct = config.max_capital_pct.min(config.max_capital_pct_allowed);
    (leverage, size_pct)
}

/// ATR attached to the signal, with a 1%-of-price fallback.
pub(crate) fn signal_atr(signal: &Signal) -> f64 {
    signal.atr().unwrap_or(signal.price * 0.01)
}


#[cfg(test)]
mod tests {
    use super::*;
    use test_support::base_table;

    #[test]
    fn test_atr_spike_detection() {
        let mut data = base_table(30, 100.0);
        assert!(!atr_spike(&data));

        // Current ATR 3x the trailing mean trips the guard.
        if let Some(last) = data.rows.last_mut() {
            last.atr = Some(3.0);
        }
        assert!(atr_spike(&data));
    }

    #[test]
    fn test_atr_spike_needs_atr_column() {
        let mut data = base_table(30, 100.0);
        for r in data.rows.iter_mut() {
            r.atr = None;
        }
        assert!(!atr_spike(&data));
    }

    #[test]
    fn test_clamped_sizing_respects_ceilings() {
        let config = SessionConfig {
            leverage: 20,
            max_leverage_allowed: 10,
            max_capital_pct: 0.25,
            max_capital_pct_allowed: 0.15,
            ..Default::default()
        };
        let (lev, size) = clamped_sizing(&config);
        assert_eq!(lev, 10);
        assert_eq!(size, 0.15);
    }
}
