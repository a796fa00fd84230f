//! Indicator pipeline
//!
//! Turns a candle sequence into an equally long sequence of `IndicatorFrame`s.
//! Every series is computed once, left to right, with no lookahead. Windowed
//! values are `None` until their window is full; `warm_up` trims those rows.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ta::indicators::{
    ExponentialMovingAverage, MovingAverageConvergenceDivergence, SimpleMovingAverage,
    StandardDeviation,
};
use ta::Next;

use crate::types::Candle;

pub const RSI_PERIOD: usize = 14;
pub const VOLATILITY_PERIOD: usize = 20;
pub const SLOW_SMA_PERIOD: usize = 99;
pub const BOLLINGER_MULTIPLIER: f64 = 2.0;

/// Rolling means below this are treated as zero (running-sum residue)
const MEAN_EPSILON: f64 = 1e-12;

/// A candle together with its derived indicator values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorFrame {
    pub candle: Candle,
    pub rsi: Option<f64>,
    pub ema_9: f64,
    pub ema_21: f64,
    pub ema_50: f64,
    pub ema_200: f64,
    pub sma_99: Option<f64>,
    pub std_20: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_lower: Option<f64>,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
}

impl IndicatorFrame {
    pub fn timestamp(&self) -> i64 {
        self.candle.timestamp
    }

    pub fn close(&self) -> f64 {
        decimal_f64(self.candle.close)
    }

    pub fn high(&self) -> f64 {
        decimal_f64(self.candle.high)
    }

    pub fn low(&self) -> f64 {
        decimal_f64(self.candle.low)
    }

    /// True once every windowed indicator has a value
    pub fn is_complete(&self) -> bool {
        self.rsi.is_some()
            && self.sma_99.is_some()
            && self.std_20.is_some()
            && self.bollinger_upper.is_some()
            && self.bollinger_lower.is_some()
    }
}

pub(crate) fn decimal_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// RSI from simple rolling means of gains and losses.
///
/// A window with no movement at all reads 50; a window with no losses reads 100.
pub fn rsi_from_means(avg_gain: f64, avg_loss: f64) -> f64 {
    let gain = if avg_gain > MEAN_EPSILON { avg_gain } else { 0.0 };
    let loss = if avg_loss > MEAN_EPSILON { avg_loss } else { 0.0 };

    if loss == 0.0 {
        return if gain == 0.0 { 50.0 } else { 100.0 };
    }
    let rs = gain / loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}

/// RSI over closes, `None` for the first `period` rows
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut gains = SimpleMovingAverage::new(period).expect("Invalid RSI period");
    let mut losses = SimpleMovingAverage::new(period).expect("Invalid RSI period");

    let mut out = Vec::with_capacity(closes.len());
    for (i, close) in closes.iter().enumerate() {
        if i == 0 {
            out.push(None);
            continue;
        }
        let delta = close - closes[i - 1];
        let avg_gain = gains.next(delta.max(0.0));
        let avg_loss = losses.next((-delta).max(0.0));
        out.push((i >= period).then(|| rsi_from_means(avg_gain, avg_loss)));
    }
    out
}

/// Rolling simple mean, `None` until the window is full
pub fn sma_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut sma = SimpleMovingAverage::new(period).expect("Invalid SMA period");
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let mean = sma.next(v);
            (i + 1 >= period).then_some(mean)
        })
        .collect()
}

/// Rolling sample standard deviation (n - 1 denominator), `None` until the window is full
pub fn sample_std_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut sd = StandardDeviation::new(period).expect("Invalid volatility period");
    let bessel = if period > 1 {
        (period as f64 / (period as f64 - 1.0)).sqrt()
    } else {
        0.0
    };
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let population = sd.next(v);
            (i + 1 >= period).then_some(population * bessel)
        })
        .collect()
}

/// Exponential moving average seeded with the first value
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut ema = ExponentialMovingAverage::new(period).expect("Invalid EMA period");
    values.iter().map(|&v| ema.next(v)).collect()
}

/// Compute every indicator for the candle sequence
pub fn compute_indicators(candles: &[Candle]) -> Vec<IndicatorFrame> {
    let closes: Vec<f64> = candles.iter().map(|c| decimal_f64(c.close)).collect();

    let rsi = rsi_series(&closes, RSI_PERIOD);
    let ema_9 = ema_series(&closes, 9);
    let ema_21 = ema_series(&closes, 21);
    let ema_50 = ema_series(&closes, 50);
    let ema_200 = ema_series(&closes, 200);
    let sma_99 = sma_series(&closes, SLOW_SMA_PERIOD);
    let std_20 = sample_std_series(&closes, VOLATILITY_PERIOD);

    let mut macd = MovingAverageConvergenceDivergence::new(12, 26, 9).expect("Invalid MACD params");

    candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            let macd_out = macd.next(closes[i]);
            let band = std_20[i].map(|sd| sd * BOLLINGER_MULTIPLIER);
            IndicatorFrame {
                candle: candle.clone(),
                rsi: rsi[i],
                ema_9: ema_9[i],
                ema_21: ema_21[i],
                ema_50: ema_50[i],
                ema_200: ema_200[i],
                sma_99: sma_99[i],
                std_20: std_20[i],
                bollinger_upper: band.map(|b| ema_21[i] + b),
                bollinger_lower: band.map(|b| ema_21[i] - b),
                macd: macd_out.macd,
                macd_signal: macd_out.signal,
                macd_hist: macd_out.histogram,
            }
        })
        .collect()
}

/// Drop the leading rows whose indicator windows are not yet filled
pub fn warm_up(frames: &[IndicatorFrame]) -> &[IndicatorFrame] {
    let start = frames
        .iter()
        .position(IndicatorFrame::is_complete)
        .unwrap_or(frames.len());
    &frames[start..]
}
