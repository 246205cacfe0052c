use crate::domain::market::MarketData;
use serde::{Deserialize, Serialize};

/// Ordered feature names the classifier bundle is trained against. The
/// extraction below must stay in lockstep with this list.
pub const FEATURE_NAMES: [&str; 21] = [
    "rsi",
    "adx",
    "atr_pct",
    "trend_str",
    "vol_change",
    "macd_hist_norm",
    "bb_pct",
    "bb_width",
    "roc_5",
    "roc_10",
    "obv_change",
    "price_position",
    "body_pct",
    "above_ema200",
    "ema_cross",
    "ema20_slope",
    "mfi",
    "dist_50_high",
    "dist_50_low",
    "hour_of_day",
    "day_of_week",
];

pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

/// Minimum rows for a meaningful feature vector (lookbacks go to 50 bars).
pub const MIN_FEATURE_ROWS: usize = 50;

/// Standard scaler artifact exported at training time: per-feature means and
/// standard deviations, same order as `FEATURE_NAMES`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl FeatureScaler {
    pub fn transform(&self, features: &[f64]) -> Vec<f64> {
        features
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                let mean = self.mean.get(i).copied().unwrap_or(0.0);
                let scale = self.scale.get(i).copied().unwrap_or(1.0);
                if scale.abs() > f64::EPSILON {
                    (x - mean) / scale
                } else {
                    x - mean
                }
            })
            .collect()
    }
}

fn roc(data: &MarketData, bars: usize) -> f64 {
    let n = data.len();
    if n <= bars {
        return 0.0;
    }
    let past = data.rows[n - 1 - bars].close;
    let now = data.rows[n - 1].close;
    if past > 0.0 {
        (now - past) / past * 100.0
    } else {
        0.0
    }
}

/// On-balance-volume delta over the last 10 bars, normalized by the total
/// traded volume of the window so the scale is symbol-independent.
fn obv_change(data: &MarketData) -> f64 {
    let start = data.len().saturating_sub(11);
    let window = &data.rows[start..];
    if window.len() < 2 {
        return 0.0;
    }
    let mut obv = 0.0;
    let mut total = 0.0;
    for pair in window.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        if cur.close > prev.close {
            obv += cur.volume;
        } else if cur.close < prev.close {
            obv -= cur.volume;
        }
        total += cur.volume;
    }
    if total > 0.0 {
        obv / total
    } else {
        0.0
    }
}

/// Money flow index over a 14-bar window; neutral 50 when volume is flat.
fn mfi_14(data: &MarketData) -> f64 {
    let start = data.len().saturating_sub(15);
    let window = &data.rows[start..];
    if window.len() < 2 {
        return 50.0;
    }
    let mut positive = 0.0;
    let mut negative = 0.0;
    let mut prev_tp = (window[0].high + window[0].low + window[0].close) / 3.0;
    for row in &window[1..] {
        let tp = (row.high + row.low + row.close) / 3.0;
        let flow = tp * row.volume;
        if tp > prev_tp {
            positive += flow;
        } else if tp < prev_tp {
            negative += flow;
        }
        prev_tp = tp;
    }
    if negative <= f64::EPSILON {
        return if positive > 0.0 { 100.0 } else { 50.0 };
    }
    100.0 - 100.0 / (1.0 + positive / negative)
}

/// Extract the fixed 21-feature vector from the tail of the table.
///
/// Returns `None` below the row floor. Missing indicator columns fall back
/// to per-feature neutral defaults rather than failing the whole vector.
pub fn extract_features(data: &MarketData) -> Option<Vec<f64>> {
    if data.len() < MIN_FEATURE_ROWS {
        return None;
    }
    let last = data.last()?;
    let close = last.close;
    if close <= 0.0 {
        return None;
    }

    let ema_20 = last.ema_20.unwrap_or(close);
    let ema_50 = last.ema_50.unwrap_or(close);
    let ema_200 = last.ema_200.unwrap_or(close);
    let bb_upper = last.bb_upper.unwrap_or(close);
    let bb_lower = last.bb_lower.unwrap_or(close);
    let bb_range = bb_upper - bb_lower;

    let lookback = &data.rows[data.len() - 50..];
    let high_50 = lookback.iter().map(|r| r.high).fold(f64::MIN, f64::max);
    let low_50 = lookback.iter().map(|r| r.low).fold(f64::MAX, f64::min);
    let range_50 = high_50 - low_50;

    let ema20_ago = data.rows[data.len() - 6].ema_20.unwrap_or(ema_20);

    let vol_change = match last.vol_sma {
        Some(sma) if sma > 0.0 => (last.volume - sma) / sma * 100.0,
        _ => 0.0,
    };
    let macd_hist_norm = match (last.macd, last.macd_signal) {
        (Some(m), Some(s)) => (m - s) / close * 100.0,
        _ => 0.0,
    };

    Some(vec![
        last.rsi.unwrap_or(50.0),
        last.adx.unwrap_or(0.0),
        last.atr.unwrap_or(0.0) / close * 100.0,
        (ema_20 - ema_50) / close * 100.0,
        vol_change,
        macd_hist_norm,
        if bb_range > 0.0 { (close - bb_lower) / bb_range } else { 0.5 },
        bb_range / close * 100.0,
        roc(data, 5),
        roc(data, 10),
        obv_change(data),
        if range_50 > 0.0 { (close - low_50) / range_50 } else { 0.5 },
        (close - last.open).abs() / (last.high - last.low + 1e-10),
        if close > ema_200 { 1.0 } else { 0.0 },
        if ema_20 > ema_50 { 1.0 } else if ema_20 < ema_50 { -1.0 } else { 0.0 },
        (ema_20 - ema20_ago) / close * 100.0,
        mfi_14(data),
        (high_50 - close) / close * 100.0,
        (close - low_50) / close * 100.0,
        last.hour_of_day(),
        last.day_of_week(),
    ])
}
