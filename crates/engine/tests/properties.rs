//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. RSI bounds: RSI stays in [0, 100] wherever defined
//! 2. Determinism: identical inputs give identical results
//! 3. Position invariant: quantity > 0 exactly when the position is long
//! 4. Equity accounting: the last equity point reconciles with the ledger
//! 5. RSI_DIV DCA cap: consecutive BUY fills never exceed `max_buys`

use engine::indicators::{rsi_series, RSI_PERIOD};
use engine::{
    BacktestConfig, BacktestEngine, BacktestResult, Candle, Position, PositionStatus,
    StrategyKind, StrategyParams, TradeSide, DEFAULT_INVEST_LIMIT,
};
use proptest::prelude::*;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (10.0..500.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

/// Random walk of closes starting at 100, floored at 1
fn arb_walk(min_len: usize, max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-3.0..3.0_f64, min_len..max_len).prop_map(|steps| {
        let mut price = 100.0_f64;
        steps
            .into_iter()
            .map(|step| {
                price = (price + step).max(1.0);
                (price * 100.0).round() / 100.0
            })
            .collect()
    })
}

fn arb_kind() -> impl Strategy<Value = StrategyKind> {
    prop::sample::select(StrategyKind::all().to_vec())
}

fn to_candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let close = Decimal::from_f64(p).unwrap().round_dp(2);
            Candle {
                timestamp: i as i64 * 3_600_000,
                open: close,
                high: close + dec!(0.5),
                low: (close - dec!(0.5)).max(dec!(0.01)),
                close,
                volume: dec!(10),
            }
        })
        .collect()
}

/// Open quantity and cost basis implied by the BUYs after the last SELL
fn open_from_ledger(result: &BacktestResult) -> (Decimal, Decimal) {
    let open_buys = result
        .trades
        .iter()
        .rev()
        .take_while(|t| t.side == TradeSide::Buy);
    let mut quantity = Decimal::ZERO;
    let mut cost = Decimal::ZERO;
    for buy in open_buys {
        quantity += DEFAULT_INVEST_LIMIT / buy.price;
        cost += DEFAULT_INVEST_LIMIT;
    }
    (quantity, cost)
}

// ── 1. RSI bounds ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn rsi_stays_in_bounds(closes in prop::collection::vec(arb_price(), 0..120)) {
        let rsi = rsi_series(&closes, RSI_PERIOD);
        prop_assert_eq!(rsi.len(), closes.len());
        for value in rsi.into_iter().flatten() {
            prop_assert!((0.0..=100.0).contains(&value), "rsi {}", value);
        }
    }
}

// ── 2. Determinism ───────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn same_inputs_same_result(closes in arb_walk(100, 260), kind in arb_kind()) {
        let candles = to_candles(&closes);
        let config = BacktestConfig::with_strategy(kind, StrategyParams::new());
        let first = BacktestEngine::run(&config, &candles);
        let second = BacktestEngine::run(&config, &candles);
        prop_assert_eq!(first, second);
    }
}

// ── 3. Position invariant ────────────────────────────────────────────

proptest! {
    #[test]
    fn quantity_tracks_status(
        ops in prop::collection::vec((any::<bool>(), arb_price()), 1..40),
    ) {
        let mut position = Position::default();
        for (buy, price) in ops {
            let price = Decimal::from_f64(price).unwrap().round_dp(2);
            if buy {
                position.fill_buy(dec!(100), price);
            } else {
                position.liquidate(price);
            }
            let long = position.status == PositionStatus::Long;
            prop_assert_eq!(long, position.quantity > Decimal::ZERO);
        }
    }
}

// ── 4. Equity accounting ─────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn equity_reconciles_with_ledger(closes in arb_walk(100, 260), kind in arb_kind()) {
        let candles = to_candles(&closes);
        let config = BacktestConfig::with_strategy(kind, StrategyParams::new());
        let result = BacktestEngine::run(&config, &candles);

        let Some(last) = result.equity_curve.last() else {
            return Ok(());
        };
        let realized: Decimal = result.trades.iter().filter_map(|t| t.pnl).sum();
        let (quantity, cost) = open_from_ledger(&result);

        let expected = config.initial_capital + realized + quantity * last.price - cost;
        prop_assert!(
            (last.equity - expected).abs() < dec!(0.000001),
            "equity {} expected {}", last.equity, expected
        );
    }
}

// ── 5. RSI_DIV DCA cap ───────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn rsi_div_buys_capped(closes in arb_walk(120, 300), max_buys in 1usize..5) {
        let candles = to_candles(&closes);
        let params = StrategyParams::new().with("max_buys", max_buys);
        let config = BacktestConfig::with_strategy(StrategyKind::RsiDivergence, params);
        let result = BacktestEngine::run(&config, &candles);

        let mut run = 0;
        for trade in &result.trades {
            match trade.side {
                TradeSide::Buy => {
                    run += 1;
                    prop_assert!(run <= max_buys, "{} buys with max_buys {}", run, max_buys);
                }
                TradeSide::Sell => run = 0,
            }
        }
    }
}
