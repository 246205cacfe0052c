//! Synthetic candle generation for the demo binary and offline experiments.
//!
//! Produces a random-walk OHLCV series and enriches it with the indicator
//! columns the decision core consumes, streaming each indicator over closes
//! the same way the live feature pipeline does.

use crate::domain::market::{IndicatorRow, MarketData};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ta::indicators::{
    AverageTrueRange, BollingerBands, ExponentialMovingAverage,
    MovingAverageConvergenceDivergence, RelativeStrengthIndex, SimpleMovingAverage,
};
use ta::Next;

const ADX_PERIOD: f64 = 14.0;

/// Seeded random-walk candle generator.
pub struct SyntheticSeries {
    rng: StdRng,
    price: f64,
    /// Per-candle drift as a fraction, e.g. 0.001 for a grinding uptrend.
    drift: f64,
    volatility: f64,
}

impl SyntheticSeries {
    pub fn new(seed: u64, start_price: f64, drift: f64, volatility: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            price: start_price,
            drift,
            volatility,
        }
    }

    /// Generate `n` candles at 15-minute spacing ending at `end_ts`.
    pub fn generate(&mut self, symbol: &str, n: usize, end_ts: i64) -> MarketData {
        let step = 900;
        let start_ts = end_ts - (n as i64 - 1) * step;
        let rows: Vec<IndicatorRow> = (0..n)
            .map(|i| {
                let open = self.price;
                let shock: f64 = self.rng.random_range(-1.0..1.0);
                let close = open * (1.0 + self.drift + self.volatility * shock);
                let wick = open * self.volatility * self.rng.random_range(0.0..0.5);
                let high = open.max(close) + wick;
                let low = open.min(close) - wick;
                let volume = 500.0 * self.rng.random_range(0.5..1.5);
                self.price = close;
                IndicatorRow::bare(start_ts + i as i64 * step, open, high, low, close, volume)
            })
            .collect();
        enrich(MarketData::new(symbol, rows))
    }
}

/// Fill the indicator columns of a bare table in one streaming pass.
///
/// Early rows keep `None` until each indicator's warmup window is satisfied,
/// matching what the live pipeline hands out mid-warmup.
pub fn enrich(mut data: MarketData) -> MarketData {
    let mut rsi = RelativeStrengthIndex::new(14).unwrap();
    let mut atr = AverageTrueRange::new(14).unwrap();
    let mut ema_20 = ExponentialMovingAverage::new(20).unwrap();
    let mut ema_50 = ExponentialMovingAverage::new(50).unwrap();
    let mut ema_200 = ExponentialMovingAverage::new(200).unwrap();
    let mut bb = BollingerBands::new(20, 2.0).unwrap();
    let mut macd = MovingAverageConvergenceDivergence::new(12, 26, 9).unwrap();
    let mut vol_sma = SimpleMovingAverage::new(20).unwrap();
    let mut adx = AdxTracker::default();

    for (i, row) in data.rows.iter_mut().enumerate() {
        let close = row.close;
        let rsi_val = rsi.next(close);
        let atr_val = atr.next(close);
        let ema20_val = ema_20.next(close);
        let ema50_val = ema_50.next(close);
        let ema200_val = ema_200.next(close);
        let bb_val = bb.next(close);
        let macd_val = macd.next(close);
        let vol_val = vol_sma.next(row.volume);
        let adx_val = adx.next(row.high, row.low, close);

        if i >= 14 {
            row.rsi = Some(rsi_val);
            row.atr = Some(atr_val);
        }
        if i >= 20 {
            row.ema_20 = Some(ema20_val);
            row.bb_upper = Some(bb_val.upper);
            row.bb_lower = Some(bb_val.lower);
            row.vol_sma = Some(vol_val);
        }
        if i >= 50 {
            row.ema_50 = Some(ema50_val);
        }
        if i >= 200 {
            row.ema_200 = Some(ema200_val);
        }
        if i >= 35 {
            row.macd = Some(macd_val.macd);
            row.macd_signal = Some(macd_val.signal);
        }
        if i >= 28 {
            row.adx = Some(adx_val);
        }
    }
    data
}

/// Wilder ADX over raw highs/lows; the ta crate has no ADX indicator.
#[derive(Default)]
struct AdxTracker {
    prev: Option<(f64, f64, f64)>,
    smooth_tr: f64,
    smooth_plus: f64,
    smooth_minus: f64,
    adx: f64,
    count: u32,
}

impl AdxTracker {
    fn next(&mut self, high: f64, low: f64, close: f64) -> f64 {
        let (ph, pl, pc) = match self.prev.replace((high, low, close)) {
            Some(prev) => prev,
            None => return 0.0,
        };

        let tr = (high - low).max((high - pc).abs()).max((low - pc).abs());
        let up = high - ph;
        let down = pl - low;
        let plus_dm = if up > down && up > 0.0 { up } else { 0.0 };
        let minus_dm = if down > up && down > 0.0 { down } else { 0.0 };

        let alpha = 1.0 / ADX_PERIOD;
        self.smooth_tr += alpha * (tr - self.smooth_tr);
        self.smooth_plus += alpha * (plus_dm - self.smooth_plus);
        self.smooth_minus += alpha * (minus_dm - self.smooth_minus);

        if self.smooth_tr <= 0.0 {
            return self.adx;
        }
        let plus_di = 100.0 * self.smooth_plus / self.smooth_tr;
        let minus_di = 100.0 * self.smooth_minus / self.smooth_tr;
        let di_sum = plus_di + minus_di;
        let dx = if di_sum > 0.0 {
            100.0 * (plus_di - minus_di).abs() / di_sum
        } else {
            0.0
        };

        self.count += 1;
        if self.count == 1 {
            self.adx = dx;
        } else {
            self.adx += alpha * (dx - self.adx);
        }
        self.adx
    }
}
