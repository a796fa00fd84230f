//! Touch-count RSI strategy around the 99-period SMA
//!
//! Entries need two separate RSI crosses below the entry level while flat,
//! with RSI revisiting the reset level (50) between them. The buy itself waits
//! until price trades above the SMA99 band. Exits fire after price has spent
//! enough bars in the trade and closes under the band, or after two separate
//! RSI crosses above the exit level.

use super::{prev_rsi, Signal, SignalRule, StrategyParams, StrategyState};
use crate::indicators::IndicatorFrame;
use crate::types::PositionStatus;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitcoinBeyState {
    pub entry_touches: u32,
    pub exit_touches: u32,
    /// RSI has been at or above the reset level since the last counted entry touch
    pub entry_rearmed: bool,
    /// RSI has been at or below the reset level since the last counted exit touch
    pub exit_rearmed: bool,
    pub bars_in_trade: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitcoinBey {
    pub rsi_entry: f64,
    pub rsi_exit: f64,
    pub rsi_reset: f64,
    /// Half-width of the SMA99 band in percent
    pub ma_band_pct: f64,
    pub min_bars_in_trade: u32,
}

impl Default for BitcoinBey {
    fn default() -> Self {
        Self {
            rsi_entry: 30.0,
            rsi_exit: 68.0,
            rsi_reset: 50.0,
            ma_band_pct: 0.1,
            min_bars_in_trade: 5,
        }
    }
}

impl BitcoinBey {
    pub fn from_params(params: &StrategyParams) -> Self {
        let d = Self::default();
        Self {
            rsi_entry: params.bounded_or("rsi_entry", 0.0, 100.0, d.rsi_entry),
            rsi_exit: params.bounded_or("rsi_exit", 0.0, 100.0, d.rsi_exit),
            rsi_reset: params.bounded_or("rsi_reset", 0.0, 100.0, d.rsi_reset),
            ma_band_pct: params.non_negative_or("ma_band_pct", d.ma_band_pct),
            min_bars_in_trade: params.count_or("min_bars_in_trade", d.min_bars_in_trade as usize)
                as u32,
        }
    }
}

/// Count a qualifying cross. The first touch always counts; later touches
/// need the rearm flag. Counting consumes the flag.
fn count_touch(touches: &mut u32, rearmed: &mut bool) {
    if *touches == 0 {
        *touches = 1;
        *rearmed = false;
    } else if *rearmed {
        *touches += 1;
        *rearmed = false;
    }
}

impl SignalRule for BitcoinBey {
    fn name(&self) -> &str {
        "BITCOINBEY"
    }

    fn signal(
        &self,
        index: usize,
        frames: &[IndicatorFrame],
        position: PositionStatus,
        state: &mut StrategyState,
    ) -> Signal {
        let state = state.bitcoinbey();
        let frame = &frames[index];
        let (Some(rsi), Some(ma99), Some(prev_rsi)) = (frame.rsi, frame.sma_99, prev_rsi(index, frames))
        else {
            return Signal::Hold;
        };

        let close = frame.close();
        let band = self.ma_band_pct / 100.0;
        let above_ma = close > ma99 * (1.0 + band);
        let below_ma = close < ma99 * (1.0 - band);
        let long = position == PositionStatus::Long;

        if long {
            state.bars_in_trade += 1;
        } else {
            state.bars_in_trade = 0;
        }

        if rsi >= self.rsi_reset {
            state.entry_rearmed = true;
        }
        if rsi <= self.rsi_reset {
            state.exit_rearmed = true;
        }

        if !long && rsi <= self.rsi_entry && prev_rsi > self.rsi_entry {
            count_touch(&mut state.entry_touches, &mut state.entry_rearmed);
        }
        if long && rsi >= self.rsi_exit && prev_rsi < self.rsi_exit {
            count_touch(&mut state.exit_touches, &mut state.exit_rearmed);
        }

        if !long && above_ma && state.entry_touches >= 2 {
            state.entry_touches = 0;
            state.exit_touches = 0;
            state.entry_rearmed = false;
            state.exit_rearmed = false;
            return Signal::Buy;
        }

        let trend_lost = below_ma && state.bars_in_trade >= self.min_bars_in_trade;
        let exhausted = state.exit_touches >= 2 && rsi >= self.rsi_exit;
        if long && (trend_lost || exhausted) {
            state.entry_touches = 0;
            state.exit_touches = 0;
            state.entry_rearmed = true;
            state.exit_rearmed = true;
            return Signal::Close;
        }

        Signal::Hold
    }
}
