//! Lookahead oracle
//!
//! Non-causal ground truth generator: it reads the next `lookahead` bars to
//! buy only at the lowest low and sell only at the highest high of that
//! window. Used to derive thresholds for `Learned`, never for live-style
//! trading. When the window would run past the end of the data an open
//! position is closed.

use super::{Signal, SignalRule, StrategyParams, StrategyState};
use crate::indicators::{decimal_f64, IndicatorFrame};
use crate::types::PositionStatus;

#[derive(Debug, Clone, PartialEq)]
pub struct Oracle {
    pub lookahead: usize,
    /// Minimum move to the opposite extreme of the window, in percent of close
    pub min_move_pct: f64,
}

impl Default for Oracle {
    fn default() -> Self {
        Self {
            lookahead: 48,
            min_move_pct: 1.5,
        }
    }
}

impl Oracle {
    pub fn from_params(params: &StrategyParams) -> Self {
        let d = Self::default();
        Self {
            lookahead: params.count_or("lookahead", d.lookahead),
            min_move_pct: params.non_negative_or("min_move_pct", d.min_move_pct),
        }
    }
}

impl SignalRule for Oracle {
    fn name(&self) -> &str {
        "ORACLE"
    }

    fn signal(
        &self,
        index: usize,
        frames: &[IndicatorFrame],
        position: PositionStatus,
        _state: &mut StrategyState,
    ) -> Signal {
        let end = index + self.lookahead;
        if end >= frames.len() {
            return match position {
                PositionStatus::Long => Signal::Close,
                PositionStatus::Flat => Signal::Hold,
            };
        }

        let window = &frames[index..=end];
        let (Some(min_low), Some(max_high)) = (
            window.iter().map(|f| f.candle.low).min(),
            window.iter().map(|f| f.candle.high).max(),
        ) else {
            return Signal::Hold;
        };

        let current = &frames[index].candle;
        let close = decimal_f64(current.close);
        if close <= 0.0 {
            return Signal::Hold;
        }
        let threshold = self.min_move_pct / 100.0;

        match position {
            PositionStatus::Flat
                if current.low == min_low
                    && (decimal_f64(max_high) - close) / close > threshold =>
            {
                Signal::Buy
            }
            PositionStatus::Long
                if current.high == max_high
                    && (close - decimal_f64(min_low)) / close > threshold =>
            {
                Signal::Close
            }
            _ => Signal::Hold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::tests::{flat_frame, with_range};

    fn frames(closes: &[f64]) -> Vec<IndicatorFrame> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| with_range(flat_frame(i, c), c + 0.5, c - 0.5))
            .collect()
    }

    fn small() -> Oracle {
        Oracle {
            lookahead: 4,
            min_move_pct: 1.5,
        }
    }

    #[test]
    fn test_buys_window_bottom_with_enough_upside() {
        let f = frames(&[100.0, 98.0, 99.0, 101.0, 103.0, 104.0, 104.0]);
        let mut state = StrategyState::new();
        assert_eq!(small().signal(1, &f, PositionStatus::Flat, &mut state), Signal::Buy);
        // Not the bottom of its window
        assert_eq!(small().signal(0, &f, PositionStatus::Flat, &mut state), Signal::Hold);
    }

    #[test]
    fn test_skips_bottom_without_upside() {
        let f = frames(&[100.0, 100.2, 100.3, 100.4, 100.5, 100.6]);
        let mut state = StrategyState::new();
        assert_eq!(small().signal(0, &f, PositionStatus::Flat, &mut state), Signal::Hold);
    }

    #[test]
    fn test_sells_window_top_with_enough_downside() {
        let f = frames(&[104.0, 102.0, 100.0, 99.0, 98.0, 97.0]);
        let mut state = StrategyState::new();
        assert_eq!(small().signal(0, &f, PositionStatus::Long, &mut state), Signal::Close);
    }

    #[test]
    fn test_tail_force_closes_open_position() {
        let f = frames(&[100.0, 101.0, 102.0, 103.0]);
        let mut state = StrategyState::new();
        assert_eq!(small().signal(0, &f, PositionStatus::Long, &mut state), Signal::Close);
        assert_eq!(small().signal(0, &f, PositionStatus::Flat, &mut state), Signal::Hold);
    }

    #[test]
    fn test_rising_series_never_sells_before_tail() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let f = frames(&closes);
        let rule = small();
        let mut state = StrategyState::new();
        for i in 0..f.len() - rule.lookahead {
            assert_ne!(rule.signal(i, &f, PositionStatus::Long, &mut state), Signal::Close);
        }
    }
}
