use crate::domain::market::{MarketData, MarketRegime, RegimeKind, StrategyKind};

/// Minimum rows before any classification is attempted.
pub const MIN_ROWS: usize = 50;

/// Deterministic regime classifier over the latest enriched row.
///
/// Pure function of its input: no side effects, identical input yields
/// identical output. First matching rule wins.
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn classify(data: &MarketData) -> MarketRegime {
        if data.len() < MIN_ROWS {
            return MarketRegime::uncertain("Insufficient Data");
        }
        let last = match data.last() {
            Some(row) => row,
            None => return MarketRegime::uncertain("Insufficient Data"),
        };

        let close = last.close;
        let adx = last.adx.unwrap_or(0.0);
        let atr = last.atr.unwrap_or(0.0);
        let ema_20 = last.ema_20.unwrap_or(0.0);
        let ema_50 = last.ema_50.unwrap_or(0.0);
        let ema_200 = last.ema_200.unwrap_or(0.0);

        let atr_pct = if close > 0.0 { atr / close * 100.0 } else { 0.0 };
        // Normalized EMA divergence, a proxy for trend strength.
        let divergence = if close > 0.0 {
            (ema_20 - ema_50).abs() / close * 1000.0
        } else {
            0.0
        };

        // 1. Trend: decisive ADX or wide EMA divergence.
        if adx > 25.0 || divergence > 5.0 {
            let aligned_macro = (close > ema_200 && ema_20 > ema_50)
                || (close < ema_200 && ema_20 < ema_50);
            let confidence = if aligned_macro { 0.8 } else { 0.6 };
            return MarketRegime::new(
                RegimeKind::Trend,
                StrategyKind::TrendFollowing,
                confidence,
                format!("Trend (ADX: {:.1}, Div: {:.1})", adx, divergence),
            );
        }

        // 2. Volatile: elevated ATR relative to price.
        if atr_pct > 1.5 {
            return MarketRegime::new(
                RegimeKind::Volatile,
                StrategyKind::Scalping,
                0.75,
                format!("Volatile Market (ATR: {:.2}%)", atr_pct),
            );
        }

        // 3. Ranging: low ADX and converged EMAs; band width splits the family.
        if adx < 20.0 && divergence < 2.0 {
            let bb_width_pct = if close > 0.0 {
                (last.bb_upper.unwrap_or(0.0) - last.bb_lower.unwrap_or(0.0)) / close * 100.0
            } else {
                0.0
            };
            if bb_width_pct < 2.0 {
                return MarketRegime::new(
                    RegimeKind::RangeTight,
                    StrategyKind::Grid,
                    0.7,
                    format!("Tight Range (ADX: {:.1}, BB: {:.1}%)", adx, bb_width_pct),
                );
            }
            return MarketRegime::new(
                RegimeKind::RangeWide,
                StrategyKind::MeanReversion,
                0.7,
                format!("Wide Range (ADX: {:.1}, BB: {:.1}%)", adx, bb_width_pct),
            );
        }

        // 4. Default fallback.
        MarketRegime::new(
            RegimeKind::Normal,
            StrategyKind::MeanReversion,
            0.5,
            format!("Normal Market (ADX: {:.1})", adx),
        )
    }
}
