//! Types for the backtesting engine

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::strategy::{StrategyKind, StrategyParams};

/// A single candlestick (OHLCV), one per period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Period open time, epoch milliseconds
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Strategy discriminator plus its raw parameter map, as supplied by the caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategySelection {
    #[serde(rename = "type", default)]
    pub kind: StrategyKind,
    #[serde(default)]
    pub params: StrategyParams,
}

/// Configuration for a backtest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,
    #[serde(default)]
    pub strategy: StrategySelection,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: default_initial_capital(),
            strategy: StrategySelection::default(),
        }
    }
}

fn default_initial_capital() -> Decimal {
    dec!(10000)
}

impl BacktestConfig {
    pub fn with_strategy(kind: StrategyKind, params: StrategyParams) -> Self {
        Self {
            strategy: StrategySelection { kind, params },
            ..Default::default()
        }
    }
}

/// Side of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Why a ledger entry was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeKind {
    Entry,
    Exit,
    TakeProfit,
    StopLoss,
}

/// A single fill in the append-only trade ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: i64,
    pub side: TradeSide,
    pub price: Decimal,
    pub kind: TradeKind,
    /// Realized profit, present only on SELL fills
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl: Option<Decimal>,
}

/// A point on the equity curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: i64,
    pub equity: Decimal,
    pub price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Flat,
    Long,
}

/// Long-only position owned by the simulator.
///
/// `quantity > 0` exactly when `status == Long`; no shorts, no leverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub status: PositionStatus,
    pub quantity: Decimal,
    pub average_entry_price: Decimal,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            status: PositionStatus::Flat,
            quantity: Decimal::ZERO,
            average_entry_price: Decimal::ZERO,
        }
    }
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.status == PositionStatus::Long
    }

    /// Cost basis of the open quantity
    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.average_entry_price
    }

    /// Add `amount` of quote currency at `price`, re-averaging the entry price.
    /// Returns the new average entry price.
    pub fn fill_buy(&mut self, amount: Decimal, price: Decimal) -> Decimal {
        let new_qty = amount / price;
        let total_cost = self.cost_basis() + amount;
        self.quantity += new_qty;
        self.average_entry_price = total_cost / self.quantity;
        self.status = PositionStatus::Long;
        self.average_entry_price
    }

    /// Sell the whole quantity at `price`. Returns `(proceeds, pnl)` and leaves the position flat.
    pub fn liquidate(&mut self, price: Decimal) -> (Decimal, Decimal) {
        let proceeds = self.quantity * price;
        let pnl = proceeds - self.cost_basis();
        *self = Position::default();
        (proceeds, pnl)
    }

    /// Mark-to-market value of the open quantity
    pub fn market_value(&self, price: Decimal) -> Decimal {
        self.quantity * price
    }
}

/// Summary metrics of a backtest run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub total_return_pct: Decimal,
    /// Number of ledger entries (BUY and SELL fills)
    pub total_trades: u32,
    pub final_equity: Decimal,
    pub realized_pnl: Decimal,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub win_rate: Decimal,
    pub max_drawdown_pct: Decimal,
}

/// Result of a backtest run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy: StrategyKind,
    pub initial_capital: Decimal,
    pub metrics: BacktestMetrics,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
}

/// Strategy run side by side with buy-and-hold over the same candles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub strategy: BacktestResult,
    pub benchmark: Vec<EquityPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_averages_dca_entries() {
        let mut pos = Position::default();
        pos.fill_buy(dec!(2500), dec!(100));
        let avg = pos.fill_buy(dec!(2500), dec!(50));

        // 25 + 50 units for 5000 total
        assert_eq!(pos.quantity, dec!(75));
        assert_eq!(avg.round_dp(10), (dec!(5000) / dec!(75)).round_dp(10));
        assert!(pos.is_long());
    }

    #[test]
    fn test_liquidate_returns_flat_position() {
        let mut pos = Position::default();
        pos.fill_buy(dec!(2500), dec!(100));
        let (proceeds, pnl) = pos.liquidate(dec!(110));

        assert_eq!(proceeds, dec!(2750));
        assert_eq!(pnl, dec!(250));
        assert_eq!(pos.status, PositionStatus::Flat);
        assert_eq!(pos.quantity, Decimal::ZERO);
    }

    #[test]
    fn test_config_deserializes_request_shape() {
        let json = r#"{"initial_capital":"10000","strategy":{"type":"rsi_div","params":{"max_buys":2}}}"#;
        let config: BacktestConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.strategy.kind, StrategyKind::RsiDivergence);
        assert_eq!(config.strategy.params.f64_or("max_buys", 4.0), 2.0);
    }

    #[test]
    fn test_config_defaults_capital() {
        let config: BacktestConfig = serde_json::from_str(r#"{"strategy":{"type":"GRID"}}"#).unwrap();
        assert_eq!(config.initial_capital, dec!(10000));
        assert_eq!(config.strategy.kind, StrategyKind::Grid);

        let config: BacktestConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.initial_capital, BacktestConfig::default().initial_capital);
        assert_eq!(config.strategy.kind, StrategyKind::Trend);
    }

    #[test]
    fn test_trade_omits_pnl_on_buy() {
        let trade = Trade {
            timestamp: 0,
            side: TradeSide::Buy,
            price: dec!(100),
            kind: TradeKind::Entry,
            pnl: None,
        };
        let json = serde_json::to_string(&trade).unwrap();
        assert!(!json.contains("pnl"));
        assert!(json.contains("\"ENTRY\""));
    }
}
