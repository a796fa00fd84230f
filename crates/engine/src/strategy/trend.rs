//! Fixed-rule strategies: dual-EMA trend, EMA21 grid band and Bollinger breakout

use super::{Signal, SignalRule, StrategyState};
use crate::indicators::IndicatorFrame;
use crate::types::PositionStatus;

const GRID_ENTRY_BAND: f64 = 0.99;
const GRID_EXIT_BAND: f64 = 1.005;

/// Long while EMA50 is above EMA200
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EmaTrend;

impl SignalRule for EmaTrend {
    fn name(&self) -> &str {
        "TREND"
    }

    fn signal(
        &self,
        index: usize,
        frames: &[IndicatorFrame],
        position: PositionStatus,
        _state: &mut StrategyState,
    ) -> Signal {
        let frame = &frames[index];
        match position {
            PositionStatus::Flat if frame.ema_50 > frame.ema_200 => Signal::Buy,
            PositionStatus::Long if frame.ema_50 < frame.ema_200 => Signal::Close,
            _ => Signal::Hold,
        }
    }
}

/// Buy 1% under EMA21, sell 0.5% over it
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Grid;

impl SignalRule for Grid {
    fn name(&self) -> &str {
        "GRID"
    }

    fn signal(
        &self,
        index: usize,
        frames: &[IndicatorFrame],
        position: PositionStatus,
        _state: &mut StrategyState,
    ) -> Signal {
        let frame = &frames[index];
        let close = frame.close();
        match position {
            PositionStatus::Flat if close < frame.ema_21 * GRID_ENTRY_BAND => Signal::Buy,
            PositionStatus::Long if close > frame.ema_21 * GRID_EXIT_BAND => Signal::Close,
            _ => Signal::Hold,
        }
    }
}

/// Buy a close above the upper Bollinger band, exit under EMA21
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Breakout;

impl SignalRule for Breakout {
    fn name(&self) -> &str {
        "BREAKOUT"
    }

    fn signal(
        &self,
        index: usize,
        frames: &[IndicatorFrame],
        position: PositionStatus,
        _state: &mut StrategyState,
    ) -> Signal {
        let frame = &frames[index];
        let close = frame.close();
        match position {
            PositionStatus::Flat => match frame.bollinger_upper {
                Some(upper) if close > upper => Signal::Buy,
                _ => Signal::Hold,
            },
            PositionStatus::Long if close < frame.ema_21 => Signal::Close,
            PositionStatus::Long => Signal::Hold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::tests::flat_frame;

    fn run(rule: &dyn SignalRule, frame: IndicatorFrame, position: PositionStatus) -> Signal {
        rule.signal(0, &[frame], position, &mut StrategyState::new())
    }

    #[test]
    fn test_trend_follows_ema_alignment() {
        let mut up = flat_frame(0, 100.0);
        up.ema_50 = 101.0;
        assert_eq!(run(&EmaTrend, up.clone(), PositionStatus::Flat), Signal::Buy);
        assert_eq!(run(&EmaTrend, up, PositionStatus::Long), Signal::Hold);

        let mut down = flat_frame(0, 100.0);
        down.ema_50 = 99.0;
        assert_eq!(run(&EmaTrend, down.clone(), PositionStatus::Long), Signal::Close);
        assert_eq!(run(&EmaTrend, down, PositionStatus::Flat), Signal::Hold);
    }

    #[test]
    fn test_grid_band_edges() {
        let mut frame = flat_frame(0, 98.0);
        frame.ema_21 = 100.0;
        assert_eq!(run(&Grid, frame, PositionStatus::Flat), Signal::Buy);

        // inside the band
        let mut frame = flat_frame(0, 99.5);
        frame.ema_21 = 100.0;
        assert_eq!(run(&Grid, frame, PositionStatus::Flat), Signal::Hold);

        let mut frame = flat_frame(0, 100.6);
        frame.ema_21 = 100.0;
        assert_eq!(run(&Grid, frame, PositionStatus::Long), Signal::Close);
    }

    #[test]
    fn test_breakout_needs_upper_band() {
        let mut frame = flat_frame(0, 105.0);
        frame.bollinger_upper = Some(104.0);
        assert_eq!(run(&Breakout, frame.clone(), PositionStatus::Flat), Signal::Buy);

        frame.bollinger_upper = None;
        assert_eq!(run(&Breakout, frame, PositionStatus::Flat), Signal::Hold);

        let mut frame = flat_frame(0, 95.0);
        frame.ema_21 = 100.0;
        assert_eq!(run(&Breakout, frame, PositionStatus::Long), Signal::Close);
    }
}
