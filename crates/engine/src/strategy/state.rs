//! Per-run mutable strategy memory
//!
//! Created empty at run start, owned by a single run, dropped at run end.
//! Stateful variants initialize their slot on first use.

use super::bitcoinbey::BitcoinBeyState;
use super::divergence::DivergenceState;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyState {
    /// Average entry price of the open position, written by the simulator on every fill
    pub avg_entry_price: Option<f64>,
    memory: Memory,
}

#[derive(Debug, Clone, Default, PartialEq)]
enum Memory {
    #[default]
    Empty,
    BitcoinBey(BitcoinBeyState),
    Divergence(DivergenceState),
}

impl StrategyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.avg_entry_price.is_none() && self.memory == Memory::Empty
    }

    pub fn record_entry(&mut self, avg_entry_price: f64) {
        self.avg_entry_price = Some(avg_entry_price);
    }

    pub fn clear_entry(&mut self) {
        self.avg_entry_price = None;
    }

    pub fn bitcoinbey_state(&self) -> Option<&BitcoinBeyState> {
        match &self.memory {
            Memory::BitcoinBey(state) => Some(state),
            _ => None,
        }
    }

    pub fn divergence_state(&self) -> Option<&DivergenceState> {
        match &self.memory {
            Memory::Divergence(state) => Some(state),
            _ => None,
        }
    }

    pub(crate) fn bitcoinbey(&mut self) -> &mut BitcoinBeyState {
        if !matches!(self.memory, Memory::BitcoinBey(_)) {
            self.memory = Memory::BitcoinBey(BitcoinBeyState::default());
        }
        match &mut self.memory {
            Memory::BitcoinBey(state) => state,
            _ => unreachable!("memory initialized above"),
        }
    }

    pub(crate) fn divergence(&mut self) -> &mut DivergenceState {
        if !matches!(self.memory, Memory::Divergence(_)) {
            self.memory = Memory::Divergence(DivergenceState::default());
        }
        match &mut self.memory {
            Memory::Divergence(state) => state,
            _ => unreachable!("memory initialized above"),
        }
    }
}
