use crate::config::{MtfConfig, MtfWeights};
use crate::domain::market::{IndicatorRow, MarketData};
use crate::domain::trading::SignalAction;
use serde::{Deserialize, Serialize};

/// Trend label derived per timeframe from the EMA20/EMA50 relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Bullish => write!(f, "BULLISH"),
            TrendDirection::Bearish => write!(f, "BEARISH"),
            TrendDirection::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Full confluence verdict for one symbol at one tick.
#[derive(Debug, Clone)]
pub struct MtfAnalysis {
    pub symbol: String,
    pub micro_trend: TrendDirection,
    pub main_trend: TrendDirection,
    pub macro_trend: TrendDirection,
    pub trend_score: f64,
    pub momentum_score: f64,
    pub volume_score: f64,
    pub structure_score: f64,
    pub confluence_score: f64,
    pub passed: bool,
    pub reason: String,
}

/// Multi-timeframe confluence filter.
///
/// Four 0-10 sub-scores combine into a weighted confluence score; trend
/// alignment dominates. A near-perfect trend score earns an alignment
/// bonus. Signals must clear the minimum AND not fight a decided macro
/// trend.
pub struct MtfFilter {
    min_score: f64,
    weights: MtfWeights,
}

const PERFECT_ALIGNMENT_BONUS: f64 = 2.0;
const TREND_HYSTERESIS: f64 = 1.002;

impl MtfFilter {
    pub fn new(config: &MtfConfig) -> Self {
        Self {
            min_score: config.min_score,
            weights: config.weights,
        }
    }

    /// Trend from the last row's EMA20 vs EMA50 with a 0.2% hysteresis band;
    /// thin or indicator-less tables are Neutral.
    fn trend_of(rows: Option<&[IndicatorRow]>) -> TrendDirection {
        let rows = match rows {
            Some(rows) if rows.len() >= 50 => rows,
            _ => return TrendDirection::Neutral,
        };
        let last = match rows.last() {
            Some(last) => last,
            None => return TrendDirection::Neutral,
        };
        match (last.ema_20, last.ema_50) {
            (Some(ema20), Some(ema50)) => {
                if ema20 > ema50 * TREND_HYSTERESIS {
                    TrendDirection::Bullish
                } else if ema50 > ema20 * TREND_HYSTERESIS {
                    TrendDirection::Bearish
                } else {
                    TrendDirection::Neutral
                }
            }
            _ => TrendDirection::Neutral,
        }
    }

    fn score_trend_alignment(
        micro: TrendDirection,
        main: TrendDirection,
        macro_tf: TrendDirection,
    ) -> (f64, &'static str) {
        let trends = [micro, main, macro_tf];
        let bullish = trends.iter().filter(|t| **t == TrendDirection::Bullish).count();
        let bearish = trends.iter().filter(|t| **t == TrendDirection::Bearish).count();
        let neutral = trends.iter().filter(|t| **t == TrendDirection::Neutral).count();

        if bullish == 3 {
            return (10.0, "perfect bullish alignment");
        }
        if bearish == 3 {
            return (10.0, "perfect bearish alignment");
        }
        if bullish == 2 && macro_tf == TrendDirection::Bullish {
            return (8.0, "strong bullish (2/3 + macro)");
        }
        if bearish == 2 && macro_tf == TrendDirection::Bearish {
            return (8.0, "strong bearish (2/3 + macro)");
        }
        if bullish == 2 {
            return (6.0, "moderate bullish (2/3)");
        }
        if bearish == 2 {
            return (6.0, "moderate bearish (2/3)");
        }
        if neutral >= 2 {
            return (4.0, "no clear trend");
        }
        (2.0, "conflicting trends")
    }

    fn score_momentum(main: &[IndicatorRow], macro_rows: Option<&[IndicatorRow]>) -> f64 {
        let mut score = 5.0;
        let last = match main.last() {
            Some(last) => last,
            None => return score,
        };

        if let Some(rsi) = last.rsi {
            if rsi > 30.0 && rsi < 70.0 {
                score += 1.5;
                if rsi > 40.0 && rsi < 60.0 {
                    score += 0.5;
                }
            } else {
                score -= 1.0;
            }
        }

        if let (Some(macd), Some(signal)) = (last.macd, last.macd_signal) {
            if macd > signal {
                score += 1.0;
            }
            if let Some(macro_last) = macro_rows.and_then(|r| r.last()) {
                if let (Some(macd_macro), Some(signal_macro)) =
                    (macro_last.macd, macro_last.macd_signal)
                {
                    let aligned = (macd > signal && macd_macro > signal_macro)
                        || (macd < signal && macd_macro < signal_macro);
                    if aligned {
                        score += 1.5;
                    }
                }
            }
        }

        score.clamp(0.0, 10.0)
    }

    fn score_volume(main: &[IndicatorRow]) -> f64 {
        let mut score = 5.0;
        let last = match main.last() {
            Some(last) => last,
            None => return score,
        };

        let start = main.len().saturating_sub(20);
        let window = &main[start..];
        let avg: f64 = window.iter().map(|r| r.volume).sum::<f64>() / window.len().max(1) as f64;
        if avg > 0.0 {
            let ratio = last.volume / avg;
            if ratio > 2.0 {
                score += 3.0;
            } else if ratio >= 1.0 {
                score += 2.0;
            } else if ratio < 0.5 {
                score -= 2.0;
            }
        }
        score.clamp(0.0, 10.0)
    }

    fn score_structure(main: &[IndicatorRow]) -> f64 {
        let last = match main.last() {
            Some(last) => last,
            None => return 5.0,
        };
        let (ema20, ema50, ema_long) = match (last.ema_20, last.ema_50, last.ema_200) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => return 5.0,
        };
        let close = last.close;

        if close > ema20 && ema20 > ema50 && ema50 > ema_long {
            9.0
        } else if close < ema20 && ema20 < ema50 && ema50 < ema_long {
            9.0
        } else if (close > ema20 && ema20 > ema50) || (close < ema20 && ema20 < ema50) {
            7.0
        } else {
            5.0
        }
    }

    pub fn analyze(&self, data: &MarketData) -> MtfAnalysis {
        let micro_trend = Self::trend_of(data.micro_rows.as_deref());
        let main_trend = Self::trend_of(Some(&data.rows));
        let macro_trend = Self::trend_of(data.macro_rows.as_deref());

        let (trend_score, trend_reason) =
            Self::score_trend_alignment(micro_trend, main_trend, macro_trend);
        let momentum_score = Self::score_momentum(&data.rows, data.macro_rows.as_deref());
        let volume_score = Self::score_volume(&data.rows);
        let structure_score = Self::score_structure(&data.rows);

        let mut confluence = trend_score * self.weights.trend
            + structure_score * self.weights.structure
            + momentum_score * self.weights.momentum
            + volume_score * self.weights.volume;
        if trend_score >= 9.5 {
            confluence = (confluence + PERFECT_ALIGNMENT_BONUS).min(10.0);
        }

        let passed = confluence >= self.min_score;
        let reason = if passed {
            format!("confluence {:.1}/10 (min {:.1})", confluence, self.min_score)
        } else {
            format!(
                "low confluence {:.1}/10 (need {:.1}): {}",
                confluence, self.min_score, trend_reason
            )
        };

        MtfAnalysis {
            symbol: data.symbol.clone(),
            micro_trend,
            main_trend,
            macro_trend,
            trend_score,
            momentum_score,
            volume_score,
            structure_score,
            confluence_score: confluence,
            passed,
            reason,
        }
    }

    /// Confluence gate for a concrete signal direction.
    ///
    /// Passing requires the score minimum AND that the macro trend, when
    /// decided, points the same way as the signal.
    pub fn should_trade(&self, data: &MarketData, direction: SignalAction) -> (bool, MtfAnalysis) {
        let mut analysis = self.analyze(data);
        if !analysis.passed {
            return (false, analysis);
        }

        let expected = match direction {
            SignalAction::Buy => TrendDirection::Bullish,
            _ => TrendDirection::Bearish,
        };
        if analysis.macro_trend != expected && analysis.macro_trend != TrendDirection::Neutral {
            analysis.passed = false;
            analysis.reason = format!(
                "signal {} conflicts with macro trend ({})",
                direction, analysis.macro_trend
            );
            return (false, analysis);
        }
        (true, analysis)
    }
}
