//! Oracle training
//!
//! Runs the lookahead oracle and averages the indicator readings at its fills
//! into `LEARNED` thresholds.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::BacktestEngine;
use crate::error::{EngineError, EngineResult};
use crate::indicators::compute_indicators;
use crate::strategy::{StrategyKind, StrategyParams};
use crate::types::{BacktestConfig, Candle, TradeSide};

const DEFAULT_RSI_BUY: f64 = 30.0;
const DEFAULT_RSI_SELL: f64 = 70.0;
const DEFAULT_MACD_BUY: f64 = 0.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub learned_params: StrategyParams,
    pub oracle_trades: usize,
    pub message: String,
}

/// Derive LEARNED thresholds from the oracle's trades.
///
/// `oracle_params` tunes the oracle itself (`lookahead`, `min_move_pct`).
pub fn train_from_oracle(
    candles: &[Candle],
    oracle_params: &StrategyParams,
) -> EngineResult<TrainingReport> {
    if candles.is_empty() {
        return Err(EngineError::EmptyCandles);
    }

    let config = BacktestConfig::with_strategy(StrategyKind::Oracle, oracle_params.clone());
    let result = BacktestEngine::run(&config, candles);
    if result.trades.is_empty() {
        return Err(EngineError::NoOracleTrades);
    }

    let frames = compute_indicators(candles);
    let by_time: HashMap<i64, (Option<f64>, f64)> = frames
        .iter()
        .map(|f| (f.timestamp(), (f.rsi, f.macd)))
        .collect();

    let mut rsi_buys = Vec::new();
    let mut rsi_sells = Vec::new();
    let mut macd_buys = Vec::new();
    for trade in &result.trades {
        let Some(&(rsi, macd)) = by_time.get(&trade.timestamp) else {
            continue;
        };
        match trade.side {
            TradeSide::Buy => {
                rsi_buys.extend(rsi);
                macd_buys.push(macd);
            }
            TradeSide::Sell => rsi_sells.extend(rsi),
        }
    }

    let rsi_buy = round_to(mean_or(&rsi_buys, DEFAULT_RSI_BUY), 2);
    let rsi_sell = round_to(mean_or(&rsi_sells, DEFAULT_RSI_SELL), 2);
    let macd_buy = round_to(mean_or(&macd_buys, DEFAULT_MACD_BUY), 4);

    let learned_params = StrategyParams::new()
        .with("rsi_buy", rsi_buy)
        .with("rsi_sell", rsi_sell)
        .with("macd_buy", macd_buy);

    let oracle_trades = result.trades.len();
    info!(oracle_trades, rsi_buy, rsi_sell, macd_buy, "Trained from oracle");

    Ok(TrainingReport {
        learned_params,
        oracle_trades,
        message: format!(
            "Analyzed {} oracle trades. Oracle usually buys at RSI {} and sells at {}.",
            oracle_trades, rsi_buy, rsi_sell
        ),
    })
}

fn mean_or(values: &[f64], default: f64) -> f64 {
    if values.is_empty() {
        default
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::tests::make_candles;

    fn wave(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| 100.0 + 10.0 * (i as f64 * std::f64::consts::TAU / 40.0).sin())
            .collect()
    }

    #[test]
    fn test_oracle_buys_low_rsi_and_sells_high() {
        let candles = make_candles(&wave(400));
        let report = train_from_oracle(&candles, &StrategyParams::new()).unwrap();

        assert!(report.oracle_trades > 0);
        let rsi_buy = report.learned_params.get_f64("rsi_buy").unwrap();
        let rsi_sell = report.learned_params.get_f64("rsi_sell").unwrap();
        assert!(rsi_buy < rsi_sell, "buy {} sell {}", rsi_buy, rsi_sell);
        assert!(report.message.starts_with("Analyzed "));
    }

    #[test]
    fn test_flat_market_has_nothing_to_learn() {
        let candles = make_candles(&[100.0; 200]);
        assert_eq!(
            train_from_oracle(&candles, &StrategyParams::new()).unwrap_err(),
            EngineError::NoOracleTrades
        );
    }

    #[test]
    fn test_empty_candles_rejected() {
        assert_eq!(
            train_from_oracle(&[], &StrategyParams::new()).unwrap_err(),
            EngineError::EmptyCandles
        );
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round_to(29.876, 2), 29.88);
        assert_eq!(round_to(-0.123456, 4), -0.1235);
        assert_eq!(mean_or(&[], 70.0), 70.0);
    }
}
