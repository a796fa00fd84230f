//! Signal engine
//!
//! Each strategy variant is a `SignalRule`: called once per candle in index
//! order with the full indicator sequence, the simulator's position status and
//! the run's `StrategyState`, it answers with a discrete `Signal`.
//!
//! Variants are a closed set (`StrategyKind`). `Strategy::new` reads the
//! loose parameter map once and builds the matching rule with its defaults.

mod bitcoinbey;
mod divergence;
mod learned;
mod metamorphosis;
mod oracle;
mod params;
mod state;
mod trend;

pub use bitcoinbey::{BitcoinBey, BitcoinBeyState};
pub use divergence::{DivergenceState, RsiDivergence};
pub use learned::{Learned, TrendFilter, TREND_FILTER_KEY};
pub use metamorphosis::{detect_regime, Metamorphosis, Regime, RegimeReading};
pub use oracle::Oracle;
pub use params::StrategyParams;
pub use state::StrategyState;
pub use trend::{Breakout, EmaTrend, Grid};

use serde::{Deserialize, Serialize};

use crate::indicators::IndicatorFrame;
use crate::types::{PositionStatus, TradeKind};

/// RSI assumed for the bar before the first one
pub(crate) const NEUTRAL_RSI: f64 = 50.0;

/// Discrete per-candle decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    #[serde(rename = "NONE")]
    Hold,
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "CLOSE")]
    Close,
    #[serde(rename = "CLOSE_TP")]
    TakeProfit,
    #[serde(rename = "CLOSE_SL")]
    StopLoss,
}

impl Signal {
    pub fn is_exit(self) -> bool {
        matches!(self, Signal::Close | Signal::TakeProfit | Signal::StopLoss)
    }

    /// Ledger tag for an exit signal
    pub fn exit_kind(self) -> Option<TradeKind> {
        match self {
            Signal::Close => Some(TradeKind::Exit),
            Signal::TakeProfit => Some(TradeKind::TakeProfit),
            Signal::StopLoss => Some(TradeKind::StopLoss),
            Signal::Hold | Signal::Buy => None,
        }
    }
}

/// Strategy discriminator. Unknown, absent or null names select `Trend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "&'static str")]
pub enum StrategyKind {
    #[default]
    Trend,
    Grid,
    Breakout,
    BitcoinBey,
    RsiDivergence,
    Oracle,
    Metamorphosis,
    Learned,
}

impl StrategyKind {
    pub fn all() -> &'static [StrategyKind] {
        &[
            Self::Trend,
            Self::Grid,
            Self::Breakout,
            Self::BitcoinBey,
            Self::RsiDivergence,
            Self::Oracle,
            Self::Metamorphosis,
            Self::Learned,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Trend => "TREND",
            Self::Grid => "GRID",
            Self::Breakout => "BREAKOUT",
            Self::BitcoinBey => "BITCOINBEY",
            Self::RsiDivergence => "RSI_DIV",
            Self::Oracle => "ORACLE",
            Self::Metamorphosis => "METAMORPHOSIS",
            Self::Learned => "LEARNED",
        }
    }

    /// Case-insensitive lookup; anything unrecognised is `Trend`
    pub fn parse(name: &str) -> Self {
        let name = name.trim();
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Option<String>> for StrategyKind {
    fn from(name: Option<String>) -> Self {
        name.as_deref().map(Self::parse).unwrap_or_default()
    }
}

impl From<StrategyKind> for &'static str {
    fn from(kind: StrategyKind) -> Self {
        kind.name()
    }
}

/// Bar-by-bar signal generation over a materialized indicator sequence
pub trait SignalRule {
    fn name(&self) -> &str;

    /// Decide for `frames[index]`. Lookback or lookahead outside the sequence
    /// yields `Signal::Hold` for that check.
    fn signal(
        &self,
        index: usize,
        frames: &[IndicatorFrame],
        position: PositionStatus,
        state: &mut StrategyState,
    ) -> Signal;
}

/// A configured strategy variant
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    Trend(EmaTrend),
    Grid(Grid),
    Breakout(Breakout),
    BitcoinBey(BitcoinBey),
    RsiDivergence(RsiDivergence),
    Oracle(Oracle),
    Metamorphosis(Metamorphosis),
    Learned(Learned),
}

impl Strategy {
    pub fn new(kind: StrategyKind, params: &StrategyParams) -> Self {
        match kind {
            StrategyKind::Trend => Self::Trend(EmaTrend),
            StrategyKind::Grid => Self::Grid(Grid),
            StrategyKind::Breakout => Self::Breakout(Breakout),
            StrategyKind::BitcoinBey => Self::BitcoinBey(BitcoinBey::from_params(params)),
            StrategyKind::RsiDivergence => Self::RsiDivergence(RsiDivergence::from_params(params)),
            StrategyKind::Oracle => Self::Oracle(Oracle::from_params(params)),
            StrategyKind::Metamorphosis => Self::Metamorphosis(Metamorphosis::from_params(params)),
            StrategyKind::Learned => Self::Learned(Learned::from_params(params)),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Trend(_) => StrategyKind::Trend,
            Self::Grid(_) => StrategyKind::Grid,
            Self::Breakout(_) => StrategyKind::Breakout,
            Self::BitcoinBey(_) => StrategyKind::BitcoinBey,
            Self::RsiDivergence(_) => StrategyKind::RsiDivergence,
            Self::Oracle(_) => StrategyKind::Oracle,
            Self::Metamorphosis(_) => StrategyKind::Metamorphosis,
            Self::Learned(_) => StrategyKind::Learned,
        }
    }

    fn rule(&self) -> &dyn SignalRule {
        match self {
            Self::Trend(rule) => rule,
            Self::Grid(rule) => rule,
            Self::Breakout(rule) => rule,
            Self::BitcoinBey(rule) => rule,
            Self::RsiDivergence(rule) => rule,
            Self::Oracle(rule) => rule,
            Self::Metamorphosis(rule) => rule,
            Self::Learned(rule) => rule,
        }
    }
}

impl SignalRule for Strategy {
    fn name(&self) -> &str {
        self.rule().name()
    }

    fn signal(
        &self,
        index: usize,
        frames: &[IndicatorFrame],
        position: PositionStatus,
        state: &mut StrategyState,
    ) -> Signal {
        if index >= frames.len() {
            return Signal::Hold;
        }
        self.rule().signal(index, frames, position, state)
    }
}

/// RSI of the previous bar, neutral when there is none
pub(crate) fn prev_rsi(index: usize, frames: &[IndicatorFrame]) -> Option<f64> {
    match index.checked_sub(1) {
        Some(prev) => frames.get(prev).and_then(|f| f.rsi),
        None => Some(NEUTRAL_RSI),
    }
}
