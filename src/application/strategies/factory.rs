use super::{
    GridStrategy, MeanReversionStrategy, ScalpingStrategy, SentinelStrategy, TradingStrategy,
    TrendFollowingStrategy,
};
use crate::application::classifiers::{ModelClassifier, RuleClassifier};
use crate::config::CoreConfig;
use crate::domain::market::{MarketData, MarketRegime, StrategyKind};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;

type Constructor = fn() -> Arc<dyn TradingStrategy>;

/// Static table of strategy constructors keyed by family.
///
/// Discovery convenience over the closed `StrategyKind` set; the factory's
/// match below is the authoritative dispatch.
pub struct StrategyRegistry;

static REGISTRY: OnceLock<HashMap<StrategyKind, Constructor>> = OnceLock::new();

fn registry() -> &'static HashMap<StrategyKind, Constructor> {
    REGISTRY.get_or_init(|| {
        let mut table: HashMap<StrategyKind, Constructor> = HashMap::new();
        table.insert(StrategyKind::TrendFollowing, || {
            Arc::new(TrendFollowingStrategy)
        });
        table.insert(StrategyKind::Grid, || Arc::new(GridStrategy::default()));
        table.insert(StrategyKind::MeanReversion, || {
            Arc::new(MeanReversionStrategy)
        });
        table.insert(StrategyKind::Scalping, || Arc::new(ScalpingStrategy));
        table.insert(StrategyKind::Sentinel, || Arc::new(SentinelStrategy));
        table
    })
}

impl StrategyRegistry {
    pub fn get(kind: StrategyKind) -> Option<Arc<dyn TradingStrategy>> {
        registry().get(&kind).map(|ctor| ctor())
    }

    pub fn list() -> Vec<StrategyKind> {
        registry().keys().copied().collect()
    }
}

/// The strategy chosen for a tick plus the classification that chose it.
pub struct StrategySelection {
    pub strategy: Arc<dyn TradingStrategy>,
    pub regime: MarketRegime,
}

pub struct StrategyFactory;

impl StrategyFactory {
    /// Pick the strategy for this symbol's current regime.
    ///
    /// Model classification runs first when enabled, falling back to the
    /// rule classifier on any failure. A disabled family falls through to
    /// MeanReversion, which is always returned in the worst case — this
    /// function cannot come back empty-handed.
    pub fn get_strategy(symbol: &str, data: &MarketData, config: &CoreConfig) -> StrategySelection {
        let regime = Self::classify(data, config);

        let suggested = regime.suggested_strategy;
        let family_enabled = Self::is_enabled(suggested, config);
        if !family_enabled {
            debug!(
                "{}: {} family disabled, falling back to MeanReversion",
                symbol, suggested
            );
        }

        let strategy = if family_enabled {
            StrategyRegistry::get(suggested)
        } else {
            None
        }
        .unwrap_or_else(|| Arc::new(MeanReversionStrategy));

        debug!(
            "{}: regime {} -> {} ({})",
            symbol,
            regime.regime,
            strategy.name(),
            regime.reason
        );
        StrategySelection { strategy, regime }
    }

    fn classify(data: &MarketData, config: &CoreConfig) -> MarketRegime {
        if config.model.enabled {
            if let Some(regime) = ModelClassifier::classify(
                data,
                &config.model.model_path,
                config.model.scaler_path.as_deref(),
            ) {
                return regime;
            }
        }
        RuleClassifier::classify(data)
    }

    fn is_enabled(kind: StrategyKind, config: &CoreConfig) -> bool {
        let enabled = &config.enabled_strategies;
        match kind {
            StrategyKind::TrendFollowing => enabled.trend,
            StrategyKind::Grid => enabled.grid,
            StrategyKind::MeanReversion => enabled.mean_reversion,
            StrategyKind::Scalping => enabled.scalping,
            StrategyKind::Sentinel => enabled.shark || enabled.black_swan,
        }
    }
}
