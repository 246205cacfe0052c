//! Configuration for the decision core.
//!
//! Everything loads from environment variables with compiled-in defaults, so
//! a bare process comes up with a sane paper profile. `Default` impls mirror
//! the env defaults and are what the tests use.

use crate::domain::trading::SessionConfig;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Per-family strategy toggles.
///
/// Disabling a family only removes it from classifier-suggested selection;
/// MeanReversion remains the factory fallback even when disabled.
#[derive(Debug, Clone)]
pub struct EnabledStrategies {
    pub trend: bool,
    pub grid: bool,
    pub mean_reversion: bool,
    pub scalping: bool,
    pub shark: bool,
    pub black_swan: bool,
}

impl Default for EnabledStrategies {
    fn default() -> Self {
        Self {
            trend: true,
            grid: true,
            mean_reversion: true,
            scalping: true,
            // Offensive shorting is opt-in.
            shark: false,
            black_swan: true,
        }
    }
}

impl EnabledStrategies {
    fn from_env() -> Result<Self> {
        Ok(Self {
            trend: parse_bool("STRATEGY_TREND_ENABLED", true)?,
            grid: parse_bool("STRATEGY_GRID_ENABLED", true)?,
            mean_reversion: parse_bool("STRATEGY_MEAN_REVERSION_ENABLED", true)?,
            scalping: parse_bool("STRATEGY_SCALPING_ENABLED", true)?,
            shark: parse_bool("STRATEGY_SHARK_ENABLED", false)?,
            black_swan: parse_bool("STRATEGY_BLACK_SWAN_ENABLED", true)?,
        })
    }
}

/// Model classifier artifacts.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub enabled: bool,
    pub model_path: PathBuf,
    pub scaler_path: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model_path: PathBuf::from("models/regime_model.json"),
            scaler_path: Some(PathBuf::from("models/regime_scaler.json")),
        }
    }
}

impl ModelConfig {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            enabled: parse_bool("MODEL_CLASSIFIER_ENABLED", defaults.enabled)?,
            model_path: env::var("MODEL_BUNDLE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            scaler_path: env::var("MODEL_SCALER_PATH")
                .map(|p| Some(PathBuf::from(p)))
                .unwrap_or(defaults.scaler_path),
        })
    }
}

/// Weights of the four confluence sub-scores. Must describe a full
/// weighting; normalization is the caller's responsibility upstream.
#[derive(Debug, Clone, Copy)]
pub struct MtfWeights {
    pub trend: f64,
    pub structure: f64,
    pub momentum: f64,
    pub volume: f64,
}

impl Default for MtfWeights {
    fn default() -> Self {
        Self {
            trend: 0.40,
            structure: 0.25,
            momentum: 0.20,
            volume: 0.15,
        }
    }
}

/// Multi-timeframe confluence filter settings.
#[derive(Debug, Clone)]
pub struct MtfConfig {
    pub enabled: bool,
    pub min_score: f64,
    pub weights: MtfWeights,
}

impl Default for MtfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_score: 6.0,
            weights: MtfWeights::default(),
        }
    }
}

impl MtfConfig {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            enabled: parse_bool("MTF_FILTER_ENABLED", defaults.enabled)?,
            min_score: parse_f64("MTF_MIN_SCORE", defaults.min_score)?,
            weights: MtfWeights {
                trend: parse_f64("MTF_WEIGHT_TREND", defaults.weights.trend)?,
                structure: parse_f64("MTF_WEIGHT_STRUCTURE", defaults.weights.structure)?,
                momentum: parse_f64("MTF_WEIGHT_MOMENTUM", defaults.weights.momentum)?,
                volume: parse_f64("MTF_WEIGHT_VOLUME", defaults.weights.volume)?,
            },
        })
    }
}

/// Risk shield settings: reference symbol thresholds and portfolio limits.
#[derive(Debug, Clone)]
pub struct ShieldConfig {
    /// The single symbol whose closed candles drive the global state machine.
    pub reference_symbol: String,
    /// Drop worse than this (percent) flips to black swan.
    pub black_swan_threshold: f64,
    /// Drop worse than this (percent) arms shark context.
    pub shark_threshold: f64,
    /// Symbols eligible for shark-mode shorts.
    pub shark_targets: HashSet<String>,
    pub max_exposure: f64,
    pub correlation_limit: f64,
    pub macro_poll_interval: Duration,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            reference_symbol: "BTCUSDT".to_string(),
            black_swan_threshold: -4.0,
            shark_threshold: -1.5,
            shark_targets: ["ETHUSDT", "SOLUSDT", "DOGEUSDT"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_exposure: 0.5,
            correlation_limit: 0.8,
            macro_poll_interval: Duration::from_secs(300),
        }
    }
}

impl ShieldConfig {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let shark_targets = match env::var("SHARK_TARGETS") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => defaults.shark_targets,
        };
        Ok(Self {
            reference_symbol: env::var("REFERENCE_SYMBOL")
                .unwrap_or(defaults.reference_symbol)
                .to_uppercase(),
            black_swan_threshold: parse_f64("BLACK_SWAN_THRESHOLD", defaults.black_swan_threshold)?,
            shark_threshold: parse_f64("SHARK_THRESHOLD", defaults.shark_threshold)?,
            shark_targets,
            max_exposure: parse_f64("MAX_EXPOSURE", defaults.max_exposure)?,
            correlation_limit: parse_f64("CORRELATION_LIMIT", defaults.correlation_limit)?,
            macro_poll_interval: Duration::from_secs(parse_u64("MACRO_POLL_INTERVAL_SECS", 300)?),
        })
    }
}

/// Top-level decision-core configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub enabled_strategies: EnabledStrategies,
    pub model: ModelConfig,
    pub mtf: MtfConfig,
    pub shield: ShieldConfig,
    pub session: SessionConfig,
    pub max_concurrent_analyses: usize,
    pub debounce: Duration,
    /// Symbols administratively excluded from analysis.
    pub disabled_assets: HashSet<String>,
    /// Breakeven safeguard arms once price clears breakeven by this fraction.
    pub breakeven_margin: f64,
}

impl CoreConfig {
    pub fn from_env() -> Result<Self> {
        let disabled_assets = match env::var("DISABLED_ASSETS") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => HashSet::new(),
        };
        Ok(Self {
            enabled_strategies: EnabledStrategies::from_env()?,
            model: ModelConfig::from_env()?,
            mtf: MtfConfig::from_env()?,
            shield: ShieldConfig::from_env()?,
            session: SessionConfig {
                leverage: parse_u64("SESSION_LEVERAGE", 5)? as u32,
                max_leverage_allowed: parse_u64("MAX_LEVERAGE_ALLOWED", 10)? as u32,
                max_capital_pct: parse_f64("MAX_CAPITAL_PCT", 0.10)?,
                max_capital_pct_allowed: parse_f64("MAX_CAPITAL_PCT_ALLOWED", 0.15)?,
                risk_per_trade_pct: parse_f64("RISK_PER_TRADE_PCT", 0.01)?,
                risk_scale: parse_f64("RISK_SCALE", 1.0)?,
                fee_rate: parse_f64("FEE_RATE", 0.001)?,
                slippage: parse_f64("SLIPPAGE", 0.0005)?,
            },
            max_concurrent_analyses: parse_u64("MAX_CONCURRENT_ANALYSES", 10)? as usize,
            debounce: Duration::from_millis(parse_u64("ANALYSIS_DEBOUNCE_MS", 1000)?),
            disabled_assets,
            breakeven_margin: parse_f64("BREAKEVEN_MARGIN", 0.002)?,
        })
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            enabled_strategies: EnabledStrategies::default(),
            model: ModelConfig::default(),
            mtf: MtfConfig::default(),
            shield: ShieldConfig::default(),
            session: SessionConfig::default(),
            max_concurrent_analyses: 10,
            debounce: Duration::from_secs(1),
            disabled_assets: HashSet::new(),
            breakeven_margin: 0.002,
        }
    }
}

fn parse_bool(key: &str, default: bool) -> Result<bool> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<bool>()
        .context(format!("Failed to parse {}", key))
}

fn parse_f64(key: &str, default: f64) -> Result<f64> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<f64>()
        .context(format!("Failed to parse {}", key))
}

fn parse_u64(key: &str, default: u64) -> Result<u64> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<u64>()
        .context(format!("Failed to parse {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_profile() {
        let config = CoreConfig::from_env().expect("defaults should parse");
        assert_eq!(config.shield.reference_symbol, "BTCUSDT");
        assert_eq!(config.shield.black_swan_threshold, -4.0);
        assert_eq!(config.shield.shark_threshold, -1.5);
        assert_eq!(config.max_concurrent_analyses, 10);
        assert_eq!(config.debounce, Duration::from_secs(1));
        assert_eq!(config.mtf.min_score, 6.0);
        assert!(!config.model.enabled);
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = MtfWeights::default();
        assert!((w.trend + w.structure + w.momentum + w.volume - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_shark_disabled_by_default() {
        let enabled = EnabledStrategies::default();
        assert!(!enabled.shark);
        assert!(enabled.mean_reversion);
    }
}
