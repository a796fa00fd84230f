//! Backtest Lab Engine: indicators, strategies, simulation and inference
//!
//! Provides:
//! - Indicator pipeline (RSI, EMAs, SMA99, Bollinger, MACD) over candle sequences
//! - Eight signal-generating strategy variants, including a lookahead oracle
//! - Long-only execution simulator with DCA fills and a trade ledger
//! - Parameter inference from user-marked trades and from oracle trades

pub mod engine;
pub mod error;
pub mod indicators;
pub mod inference;
pub mod strategy;
pub mod training;
pub mod types;

// Re-exports for convenience
pub use engine::{buy_and_hold, BacktestEngine, DEFAULT_INVEST_LIMIT};
pub use error::{EngineError, EngineResult};
pub use indicators::{compute_indicators, warm_up, IndicatorFrame};
pub use inference::{infer_strategy_from_marks, InferredStrategy, Mark};
pub use strategy::{Signal, SignalRule, Strategy, StrategyKind, StrategyParams, StrategyState};
pub use training::{train_from_oracle, TrainingReport};
pub use types::*;
