//! Regime-switching strategy
//!
//! Every bar re-classifies the trailing 21-bar window by volatility (a
//! Bollinger-width proxy) and short-vs-long SMA alignment. Trend regimes follow
//! the alignment, range regimes fade RSI extremes. Nothing carries over between
//! bars.

use serde::{Deserialize, Serialize};

use super::{Signal, SignalRule, StrategyParams, StrategyState};
use crate::indicators::IndicatorFrame;
use crate::types::PositionStatus;

const WINDOW: usize = 21;
const SHORT_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    Trend,
    BearTrend,
    Range,
    TightRange,
}

impl Regime {
    pub fn is_trending(self) -> bool {
        matches!(self, Regime::Trend | Regime::BearTrend)
    }
}

/// Regime snapshot for one bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeReading {
    pub regime: Regime,
    /// 4 standard deviations over the mean close
    pub width: f64,
    /// Short SMA above long SMA
    pub aligned: bool,
}

/// Classify the window ending at `index`; `None` until 21 bars are available
pub fn detect_regime(
    index: usize,
    frames: &[IndicatorFrame],
    trend_width: f64,
    tight_width: f64,
) -> Option<RegimeReading> {
    if index + 1 < WINDOW || index >= frames.len() {
        return None;
    }
    let closes: Vec<f64> = frames[index + 1 - WINDOW..=index]
        .iter()
        .map(IndicatorFrame::close)
        .collect();

    let long_sma = closes.iter().sum::<f64>() / WINDOW as f64;
    if long_sma <= 0.0 {
        return None;
    }
    let variance = closes.iter().map(|c| (c - long_sma).powi(2)).sum::<f64>() / WINDOW as f64;
    let width = 4.0 * variance.sqrt() / long_sma;

    let short_sma = closes[WINDOW - SHORT_WINDOW..].iter().sum::<f64>() / SHORT_WINDOW as f64;
    let aligned = short_sma > long_sma;

    let regime = if width > trend_width {
        if aligned {
            Regime::Trend
        } else {
            Regime::BearTrend
        }
    } else if width < tight_width {
        Regime::TightRange
    } else {
        Regime::Range
    };

    Some(RegimeReading {
        regime,
        width,
        aligned,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metamorphosis {
    pub rsi_buy: f64,
    pub rsi_sell: f64,
    pub trend_width: f64,
    pub tight_width: f64,
}

impl Default for Metamorphosis {
    fn default() -> Self {
        Self {
            rsi_buy: 30.0,
            rsi_sell: 70.0,
            trend_width: 0.05,
            tight_width: 0.02,
        }
    }
}

impl Metamorphosis {
    pub fn from_params(params: &StrategyParams) -> Self {
        let d = Self::default();
        let trend_width = params.positive_or("trend_width", d.trend_width);
        let tight_width = params
            .positive_or("tight_width", d.tight_width)
            .min(trend_width);
        Self {
            rsi_buy: params.bounded_or("rsi_buy", 0.0, 100.0, d.rsi_buy),
            rsi_sell: params.bounded_or("rsi_sell", 0.0, 100.0, d.rsi_sell),
            trend_width,
            tight_width,
        }
    }
}

impl SignalRule for Metamorphosis {
    fn name(&self) -> &str {
        "METAMORPHOSIS"
    }

    fn signal(
        &self,
        index: usize,
        frames: &[IndicatorFrame],
        position: PositionStatus,
        _state: &mut StrategyState,
    ) -> Signal {
        let Some(reading) = detect_regime(index, frames, self.trend_width, self.tight_width) else {
            return Signal::Hold;
        };

        if reading.regime.is_trending() {
            return match position {
                PositionStatus::Flat if reading.aligned => Signal::Buy,
                PositionStatus::Long if !reading.aligned => Signal::Close,
                _ => Signal::Hold,
            };
        }

        let Some(rsi) = frames[index].rsi else {
            return Signal::Hold;
        };
        match position {
            PositionStatus::Flat if rsi < self.rsi_buy => Signal::Buy,
            PositionStatus::Long if rsi > self.rsi_sell => Signal::Close,
            _ => Signal::Hold,
        }
    }
}
