//! RSI divergence strategy with DCA entries and take-profit / stop-loss overrides
//!
//! A cross under the oversold level (after RSI has been back at the reset
//! level) starts a bullish divergence search anchored at that bar's low.
//! Confirmed 5-bar pivot lows move the anchor. A new low under the anchor with
//! RSI above the anchor's RSI is a bullish divergence and buys, up to
//! `max_buys` times per position. The bearish side mirrors this on highs and
//! closes the position.

use super::{prev_rsi, Signal, SignalRule, StrategyParams, StrategyState};
use crate::indicators::IndicatorFrame;
use crate::types::PositionStatus;

/// Bars on each side of a pivot
const PIVOT_SPAN: usize = 2;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DivergenceState {
    pub buy_count: usize,
    pub bullish_armed: bool,
    pub bearish_armed: bool,
    pub bullish_active: bool,
    pub bearish_active: bool,
    /// (price, rsi) of the tracked swing low
    pub last_low: Option<(f64, f64)>,
    /// (price, rsi) of the tracked swing high
    pub last_high: Option<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RsiDivergence {
    pub max_buys: usize,
    pub rsi_reset: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// 0 disables
    pub take_profit_pct: f64,
    /// 0 disables
    pub stop_loss_pct: f64,
}

impl Default for RsiDivergence {
    fn default() -> Self {
        Self {
            max_buys: 4,
            rsi_reset: 50.0,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            take_profit_pct: 0.0,
            stop_loss_pct: 0.0,
        }
    }
}

impl RsiDivergence {
    pub fn from_params(params: &StrategyParams) -> Self {
        let d = Self::default();
        Self {
            max_buys: params.count_or("max_buys", d.max_buys),
            rsi_reset: params.bounded_or("rsi_reset", 0.0, 100.0, d.rsi_reset),
            rsi_oversold: params.bounded_or("rsi_oversold", 0.0, 100.0, d.rsi_oversold),
            rsi_overbought: params.bounded_or("rsi_overbought", 0.0, 100.0, d.rsi_overbought),
            take_profit_pct: params.non_negative_or("take_profit_pct", d.take_profit_pct),
            stop_loss_pct: params.non_negative_or("stop_loss_pct", d.stop_loss_pct),
        }
    }

    /// Take-profit / stop-loss against the simulator's average entry price
    fn protective_exit(&self, close: f64, avg_entry: f64) -> Option<Signal> {
        let change = (close - avg_entry) / avg_entry;
        if self.take_profit_pct > 0.0 && change >= self.take_profit_pct / 100.0 {
            return Some(Signal::TakeProfit);
        }
        if self.stop_loss_pct > 0.0 && change <= -(self.stop_loss_pct / 100.0) {
            return Some(Signal::StopLoss);
        }
        None
    }
}

/// Which extreme a pivot is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pivot {
    Low,
    High,
}

/// Confirmed pivot at `index - 2`: strictly below (or above) the two bars on
/// each side. Needs two bars of history before the pivot.
fn confirmed_pivot(index: usize, frames: &[IndicatorFrame], kind: Pivot) -> Option<usize> {
    let pivot = index.checked_sub(PIVOT_SPAN)?;
    if pivot < PIVOT_SPAN || pivot + PIVOT_SPAN >= frames.len() {
        return None;
    }
    let value = |i: usize| match kind {
        Pivot::Low => frames[i].low(),
        Pivot::High => frames[i].high(),
    };
    let centre = value(pivot);
    let extreme = (pivot - PIVOT_SPAN..=pivot + PIVOT_SPAN)
        .filter(|&i| i != pivot)
        .all(|i| match kind {
            Pivot::Low => centre < value(i),
            Pivot::High => centre > value(i),
        });
    extreme.then_some(pivot)
}

impl SignalRule for RsiDivergence {
    fn name(&self) -> &str {
        "RSI_DIV"
    }

    fn signal(
        &self,
        index: usize,
        frames: &[IndicatorFrame],
        position: PositionStatus,
        state: &mut StrategyState,
    ) -> Signal {
        let frame = &frames[index];
        let long = position == PositionStatus::Long;

        if long {
            if let Some(avg_entry) = state.avg_entry_price.filter(|p| *p > 0.0) {
                if let Some(exit) = self.protective_exit(frame.close(), avg_entry) {
                    state.divergence().buy_count = 0;
                    state.clear_entry();
                    return exit;
                }
            }
        }

        let div = state.divergence();
        let (Some(rsi), Some(prev_rsi)) = (frame.rsi, prev_rsi(index, frames)) else {
            return Signal::Hold;
        };
        let low = frame.low();
        let high = frame.high();

        if rsi >= self.rsi_reset {
            div.bullish_armed = true;
        }
        if rsi <= self.rsi_reset {
            div.bearish_armed = true;
        }

        if rsi <= self.rsi_oversold && prev_rsi > self.rsi_oversold && div.bullish_armed {
            div.bullish_active = true;
            div.last_low = Some((low, rsi));
            div.bullish_armed = false;
        }
        if rsi >= self.rsi_overbought && prev_rsi < self.rsi_overbought && div.bearish_armed {
            div.bearish_active = true;
            div.last_high = Some((high, rsi));
            div.bearish_armed = false;
        }

        if div.bullish_active {
            if let Some(p) = confirmed_pivot(index, frames, Pivot::Low) {
                if let Some(pivot_rsi) = frames[p].rsi {
                    div.last_low = Some((frames[p].low(), pivot_rsi));
                }
            }
        }
        if div.bearish_active {
            if let Some(p) = confirmed_pivot(index, frames, Pivot::High) {
                if let Some(pivot_rsi) = frames[p].rsi {
                    div.last_high = Some((frames[p].high(), pivot_rsi));
                }
            }
        }

        let mut bullish = false;
        if div.bullish_active {
            if let Some((anchor_low, anchor_rsi)) = div.last_low {
                if low < anchor_low && rsi > anchor_rsi {
                    bullish = true;
                    div.bullish_active = false;
                }
            }
        }

        let mut bearish = false;
        if div.bearish_active {
            if let Some((anchor_high, anchor_rsi)) = div.last_high {
                if high > anchor_high && rsi < anchor_rsi {
                    bearish = true;
                    div.bearish_active = false;
                }
            }
        }

        if bullish && div.buy_count < self.max_buys {
            div.buy_count += 1;
            return Signal::Buy;
        }

        if bearish && long {
            div.buy_count = 0;
            state.clear_entry();
            return Signal::Close;
        }

        Signal::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::tests::{flat_frame, with_range};

    /// Frames built from (low, high, rsi) bars
    fn bars(path: &[(f64, f64, f64)]) -> Vec<IndicatorFrame> {
        path.iter()
            .enumerate()
            .map(|(i, &(low, high, rsi))| {
                let mut f = with_range(flat_frame(i, (low + high) / 2.0), high, low);
                f.rsi = Some(rsi);
                f
            })
            .collect()
    }

    fn drive(rule: &RsiDivergence, frames: &[IndicatorFrame], position: PositionStatus, state: &mut StrategyState) -> Vec<Signal> {
        (0..frames.len())
            .map(|i| rule.signal(i, frames, position, state))
            .collect()
    }

    #[test]
    fn test_pivot_requires_strict_extreme() {
        let f = bars(&[
            (100.0, 101.0, 50.0),
            (99.0, 100.0, 50.0),
            (98.0, 99.0, 50.0),
            (99.0, 100.0, 50.0),
            (100.0, 101.0, 50.0),
        ]);
        assert_eq!(confirmed_pivot(4, &f, Pivot::Low), Some(2));
        assert_eq!(confirmed_pivot(4, &f, Pivot::High), None);
        assert_eq!(confirmed_pivot(3, &f, Pivot::Low), None);

        let mut flat = f.clone();
        flat[3] = with_range(flat[3].clone(), 99.0, 98.0);
        assert_eq!(confirmed_pivot(4, &flat, Pivot::Low), None);
    }

    #[test]
    fn test_bullish_divergence_buys() {
        let rule = RsiDivergence::default();
        let mut state = StrategyState::new();
        let f = bars(&[
            (100.0, 102.0, 55.0), // armed
            (95.0, 97.0, 28.0),   // cross under 30: anchor low 95 @ rsi 28
            (96.0, 98.0, 33.0),
            (94.0, 96.0, 31.0), // lower low, higher rsi
        ]);
        let signals = drive(&rule, &f, PositionStatus::Flat, &mut state);
        assert_eq!(signals, vec![Signal::Hold, Signal::Hold, Signal::Hold, Signal::Buy]);

        let div = state.divergence_state().unwrap();
        assert_eq!(div.buy_count, 1);
        assert!(!div.bullish_active);
    }

    #[test]
    fn test_search_needs_rearm() {
        let rule = RsiDivergence::default();
        let mut state = StrategyState::new();
        let f = bars(&[
            (100.0, 102.0, 45.0), // below the reset level: not armed
            (95.0, 97.0, 28.0),
            (94.0, 96.0, 31.0),
        ]);
        let signals = drive(&rule, &f, PositionStatus::Flat, &mut state);
        assert!(signals.iter().all(|s| *s == Signal::Hold));
        assert!(!state.divergence_state().unwrap().bullish_active);
    }

    #[test]
    fn test_buy_count_capped() {
        let rule = RsiDivergence::from_params(&StrategyParams::new().with("max_buys", 1));
        let mut state = StrategyState::new();
        let episode = [
            (100.0, 102.0, 55.0),
            (95.0, 97.0, 28.0),
            (94.0, 96.0, 31.0),
        ];
        let f = bars(&episode);
        let first = drive(&rule, &f, PositionStatus::Long, &mut state);
        assert_eq!(first.iter().filter(|s| **s == Signal::Buy).count(), 1);

        let second = drive(&rule, &f, PositionStatus::Long, &mut state);
        assert!(second.iter().all(|s| *s != Signal::Buy));
    }

    #[test]
    fn test_bearish_divergence_closes_long() {
        let rule = RsiDivergence::default();
        let mut state = StrategyState::new();
        state.record_entry(100.0);
        let f = bars(&[
            (98.0, 100.0, 45.0),  // armed for bearish
            (103.0, 105.0, 72.0), // cross over 70: anchor high 105 @ 72
            (102.0, 104.0, 66.0),
            (104.0, 106.0, 69.0), // higher high, lower rsi
        ]);
        let signals = drive(&rule, &f, PositionStatus::Long, &mut state);
        assert_eq!(signals[3], Signal::Close);
        assert_eq!(state.avg_entry_price, None);
    }

    #[test]
    fn test_take_profit_overrides_divergence() {
        let rule = RsiDivergence::from_params(
            &StrategyParams::new()
                .with("take_profit_pct", 5)
                .with("stop_loss_pct", 2),
        );

        let mut state = StrategyState::new();
        state.record_entry(100.0);
        let f = bars(&[(105.0, 107.0, 50.0)]);
        assert_eq!(drive(&rule, &f, PositionStatus::Long, &mut state), vec![Signal::TakeProfit]);
        assert_eq!(state.avg_entry_price, None);

        let mut state = StrategyState::new();
        state.record_entry(100.0);
        let f = bars(&[(96.0, 97.0, 50.0)]);
        assert_eq!(drive(&rule, &f, PositionStatus::Long, &mut state), vec![Signal::StopLoss]);
    }

    #[test]
    fn test_protective_exit_ignored_when_flat() {
        let rule = RsiDivergence::from_params(&StrategyParams::new().with("take_profit_pct", 1));
        let mut state = StrategyState::new();
        state.record_entry(100.0);
        let f = bars(&[(110.0, 112.0, 50.0)]);
        assert_eq!(drive(&rule, &f, PositionStatus::Flat, &mut state), vec![Signal::Hold]);
    }
}
