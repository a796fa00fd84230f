//! Threshold strategy whose parameters come from pattern inference or oracle training

use serde::{Deserialize, Serialize};

use super::{Signal, SignalRule, StrategyParams, StrategyState};
use crate::indicators::IndicatorFrame;
use crate::types::PositionStatus;

pub const TREND_FILTER_KEY: &str = "trend_filter";

/// Optional regime gate on entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendFilter {
    AboveEma200,
}

impl TrendFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendFilter::AboveEma200 => "ABOVE_EMA200",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        value
            .eq_ignore_ascii_case("ABOVE_EMA200")
            .then_some(TrendFilter::AboveEma200)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Learned {
    pub rsi_buy: f64,
    pub rsi_sell: f64,
    /// Default is permissive so MACD never blocks an entry
    pub macd_buy: f64,
    pub trend_filter: Option<TrendFilter>,
}

impl Default for Learned {
    fn default() -> Self {
        Self {
            rsi_buy: 30.0,
            rsi_sell: 70.0,
            macd_buy: -100.0,
            trend_filter: None,
        }
    }
}

impl Learned {
    pub fn from_params(params: &StrategyParams) -> Self {
        let d = Self::default();
        Self {
            rsi_buy: params.f64_or("rsi_buy", d.rsi_buy),
            rsi_sell: params.f64_or("rsi_sell", d.rsi_sell),
            macd_buy: params.f64_or("macd_buy", d.macd_buy),
            trend_filter: params.get_str(TREND_FILTER_KEY).and_then(TrendFilter::parse),
        }
    }

    fn entry_allowed(&self, frame: &IndicatorFrame) -> bool {
        match self.trend_filter {
            Some(TrendFilter::AboveEma200) => frame.close() > frame.ema_200,
            None => true,
        }
    }
}

impl SignalRule for Learned {
    fn name(&self) -> &str {
        "LEARNED"
    }

    fn signal(
        &self,
        index: usize,
        frames: &[IndicatorFrame],
        position: PositionStatus,
        _state: &mut StrategyState,
    ) -> Signal {
        let frame = &frames[index];
        let Some(rsi) = frame.rsi else {
            return Signal::Hold;
        };

        match position {
            PositionStatus::Flat
                if rsi < self.rsi_buy && frame.macd > self.macd_buy && self.entry_allowed(frame) =>
            {
                Signal::Buy
            }
            PositionStatus::Long if rsi > self.rsi_sell => Signal::Close,
            _ => Signal::Hold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::tests::flat_frame;

    fn signal(rule: &Learned, frame: IndicatorFrame, position: PositionStatus) -> Signal {
        rule.signal(0, &[frame], position, &mut StrategyState::new())
    }

    #[test]
    fn test_defaults_when_params_missing() {
        assert_eq!(Learned::from_params(&StrategyParams::new()), Learned::default());
    }

    #[test]
    fn test_buys_low_rsi_with_macd_above_threshold() {
        let rule = Learned::from_params(&StrategyParams::new().with("rsi_buy", 28).with("macd_buy", -1.0));
        let mut frame = flat_frame(0, 100.0);
        frame.rsi = Some(25.0);
        frame.macd = -0.5;
        assert_eq!(signal(&rule, frame.clone(), PositionStatus::Flat), Signal::Buy);

        frame.macd = -2.0;
        assert_eq!(signal(&rule, frame, PositionStatus::Flat), Signal::Hold);
    }

    #[test]
    fn test_sells_high_rsi() {
        let rule = Learned::default();
        let mut frame = flat_frame(0, 100.0);
        frame.rsi = Some(75.0);
        assert_eq!(signal(&rule, frame.clone(), PositionStatus::Long), Signal::Close);
        assert_eq!(signal(&rule, frame, PositionStatus::Flat), Signal::Hold);
    }

    #[test]
    fn test_trend_filter_gates_entries() {
        let rule = Learned::from_params(&StrategyParams::new().with(TREND_FILTER_KEY, "ABOVE_EMA200"));
        assert_eq!(rule.trend_filter, Some(TrendFilter::AboveEma200));

        let mut frame = flat_frame(0, 100.0);
        frame.rsi = Some(20.0);
        frame.ema_200 = 110.0;
        assert_eq!(signal(&rule, frame.clone(), PositionStatus::Flat), Signal::Hold);

        frame.ema_200 = 90.0;
        assert_eq!(signal(&rule, frame, PositionStatus::Flat), Signal::Buy);
    }

    #[test]
    fn test_undefined_rsi_holds() {
        let mut frame = flat_frame(0, 100.0);
        frame.rsi = None;
        assert_eq!(signal(&Learned::default(), frame, PositionStatus::Long), Signal::Hold);
    }
}
