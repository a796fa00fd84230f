//! Engine error type

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("No candles supplied")]
    EmptyCandles,

    #[error("Not enough marks matched candles: {matched} matched, need at least 2")]
    InsufficientMarks { matched: usize },

    #[error("Invalid mark date: {date}")]
    InvalidMark { date: String },

    #[error("Oracle made no trades, nothing to learn from")]
    NoOracleTrades,
}

pub type EngineResult<T> = Result<T, EngineError>;
