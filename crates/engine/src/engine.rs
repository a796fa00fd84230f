//! Bar-by-bar execution simulator

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info};

use crate::indicators::{compute_indicators, decimal_f64, warm_up, IndicatorFrame};
use crate::strategy::{Signal, SignalRule, Strategy, StrategyParams, StrategyState};
use crate::types::*;

/// Quote amount committed per BUY fill unless `invest_limit` overrides it
pub const DEFAULT_INVEST_LIMIT: Decimal = dec!(2500);

/// Backtesting engine that simulates bar-by-bar execution
pub struct BacktestEngine;

impl BacktestEngine {
    /// Compute indicators, drop the warm-up rows and simulate
    pub fn run(config: &BacktestConfig, candles: &[Candle]) -> BacktestResult {
        let frames = compute_indicators(candles);
        Self::simulate(config, warm_up(&frames))
    }

    /// Run the strategy and a buy-and-hold benchmark over the same candles
    pub fn compare(config: &BacktestConfig, candles: &[Candle]) -> Comparison {
        Comparison {
            strategy: Self::run(config, candles),
            benchmark: buy_and_hold(candles, config.initial_capital),
        }
    }

    /// Simulate over an already warmed-up indicator sequence.
    ///
    /// The first row only provides history; decisions start at the second.
    pub fn simulate(config: &BacktestConfig, frames: &[IndicatorFrame]) -> BacktestResult {
        let selection = &config.strategy;
        let strategy = Strategy::new(selection.kind, &selection.params);
        let invest_limit = invest_limit(&selection.params);

        let mut capital = config.initial_capital;
        let mut position = Position::default();
        let mut state = StrategyState::new();

        let mut trades: Vec<Trade> = Vec::new();
        let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(frames.len());

        let hundred = dec!(100);
        let mut peak_equity = capital;
        let mut max_drawdown_pct = Decimal::ZERO;

        info!(
            strategy = strategy.name(),
            bars = frames.len(),
            capital = %config.initial_capital,
            invest_limit = %invest_limit,
            "Starting backtest"
        );

        for index in 1..frames.len() {
            let frame = &frames[index];
            let price = frame.candle.close;
            let signal = strategy.signal(index, frames, position.status, &mut state);

            match signal {
                Signal::Buy => {
                    if capital >= invest_limit && price > Decimal::ZERO {
                        let avg_entry = position.fill_buy(invest_limit, price);
                        capital -= invest_limit;
                        state.record_entry(decimal_f64(avg_entry));

                        trades.push(Trade {
                            timestamp: frame.timestamp(),
                            side: TradeSide::Buy,
                            price,
                            kind: TradeKind::Entry,
                            pnl: None,
                        });

                        debug!(
                            price = %price,
                            quantity = %position.quantity,
                            avg_entry = %avg_entry,
                            time = frame.timestamp(),
                            "Filled BUY"
                        );
                    } else {
                        debug!(
                            capital = %capital,
                            time = frame.timestamp(),
                            "Skipped BUY, insufficient capital"
                        );
                    }
                }
                exit if exit.is_exit() && position.is_long() => {
                    let (proceeds, pnl) = position.liquidate(price);
                    capital += proceeds;
                    state.clear_entry();

                    let kind = exit.exit_kind().unwrap_or(TradeKind::Exit);
                    trades.push(Trade {
                        timestamp: frame.timestamp(),
                        side: TradeSide::Sell,
                        price,
                        kind,
                        pnl: Some(pnl),
                    });

                    debug!(price = %price, pnl = %pnl, kind = ?kind, "Closed position");
                }
                _ => {}
            }

            let equity = capital + position.market_value(price);
            equity_curve.push(EquityPoint {
                timestamp: frame.timestamp(),
                equity,
                price,
            });

            if equity > peak_equity {
                peak_equity = equity;
            }
            if peak_equity > Decimal::ZERO {
                let drawdown_pct = (peak_equity - equity) / peak_equity * hundred;
                if drawdown_pct > max_drawdown_pct {
                    max_drawdown_pct = drawdown_pct;
                }
            }
        }

        let metrics = Self::metrics(config.initial_capital, &trades, &equity_curve, max_drawdown_pct);

        info!(
            strategy = strategy.name(),
            total_trades = metrics.total_trades,
            total_return_pct = %metrics.total_return_pct,
            final_equity = %metrics.final_equity,
            "Backtest complete"
        );

        BacktestResult {
            strategy: strategy.kind(),
            initial_capital: config.initial_capital,
            metrics,
            equity_curve,
            trades,
        }
    }

    fn metrics(
        initial_capital: Decimal,
        trades: &[Trade],
        equity_curve: &[EquityPoint],
        max_drawdown_pct: Decimal,
    ) -> BacktestMetrics {
        let hundred = dec!(100);
        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return_pct = if initial_capital > Decimal::ZERO {
            (final_equity - initial_capital) / initial_capital * hundred
        } else {
            Decimal::ZERO
        };

        let realized: Vec<Decimal> = trades.iter().filter_map(|t| t.pnl).collect();
        let winning_trades = realized.iter().filter(|p| **p > Decimal::ZERO).count() as u32;
        let losing_trades = realized.len() as u32 - winning_trades;
        let win_rate = if realized.is_empty() {
            Decimal::ZERO
        } else {
            Decimal::from(winning_trades) / Decimal::from(realized.len() as u32) * hundred
        };

        BacktestMetrics {
            total_return_pct: total_return_pct.round_dp(2),
            total_trades: trades.len() as u32,
            final_equity: final_equity.round_dp(2),
            realized_pnl: realized.iter().copied().sum::<Decimal>().round_dp(2),
            winning_trades,
            losing_trades,
            win_rate: win_rate.round_dp(2),
            max_drawdown_pct: max_drawdown_pct.round_dp(2),
        }
    }
}

/// Per-fill investment from the `invest_limit` param, falling back to the default
pub fn invest_limit(params: &StrategyParams) -> Decimal {
    params
        .get_f64("invest_limit")
        .filter(|v| *v > 0.0)
        .and_then(Decimal::from_f64)
        .unwrap_or(DEFAULT_INVEST_LIMIT)
}

/// Equity of buying at the first close and holding
pub fn buy_and_hold(candles: &[Candle], initial_capital: Decimal) -> Vec<EquityPoint> {
    let Some(first) = candles.first().map(|c| c.close).filter(|c| *c > Decimal::ZERO) else {
        return Vec::new();
    };
    candles
        .iter()
        .map(|c| EquityPoint {
            timestamp: c.timestamp,
            equity: initial_capital * c.close / first,
            price: c.close,
        })
        .collect()
}
