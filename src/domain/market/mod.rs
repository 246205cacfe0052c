pub mod regime;
pub mod types;

pub use regime::{MarketRegime, RegimeKind, StrategyKind};
pub use types::{IndicatorRow, MarketData, OverrideAction, PriceTick};
