//! Pattern inference from user-marked trades
//!
//! Marks are matched to candles by minute-truncated timestamp. Features at the
//! matched BUY marks are summarised into parameters for the `LEARNED` strategy,
//! together with a plain-language explanation of what was found.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::indicators::{
    compute_indicators, sma_series, IndicatorFrame, BOLLINGER_MULTIPLIER, VOLATILITY_PERIOD,
};
use crate::strategy::{StrategyKind, StrategyParams, TrendFilter, TREND_FILTER_KEY};
use crate::types::{Candle, StrategySelection, TradeSide};

/// Matched marks required before anything is inferred
pub const MIN_MATCHED_MARKS: usize = 2;

/// Mean RSI at entries below which entries count as "buying low"
const LOW_RSI_MEAN: f64 = 40.0;
/// Slack added on top of mean + stdev for the learned entry threshold
const RSI_SLACK: f64 = 2.0;
/// Mean distance above EMA200 that marks entries as trend-following
const UPTREND_DISTANCE: f64 = 0.005;
/// Entry threshold used when no BUY mark matched
const FALLBACK_RSI_BUY: i64 = 30;
/// Threshold that never triggers
const DISABLED_RSI_BUY: i64 = 100;

const MINUTE_MS: i64 = 60_000;

/// A user-marked trade, located either by a date string or epoch milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    pub side: TradeSide,
}

impl Mark {
    pub fn at(time: i64, side: TradeSide) -> Self {
        Self {
            date: None,
            time: Some(time),
            side,
        }
    }

    pub fn on(date: &str, side: TradeSide) -> Self {
        Self {
            date: Some(date.to_string()),
            time: None,
            side,
        }
    }

    /// Minute-truncated epoch milliseconds. `time` wins over `date`.
    pub fn minute(&self) -> EngineResult<i64> {
        let millis = match (self.time, self.date.as_deref()) {
            (Some(time), _) => time,
            (None, Some(date)) => parse_date_millis(date)?,
            (None, None) => {
                return Err(EngineError::InvalidMark {
                    date: String::new(),
                })
            }
        };
        Ok(truncate_to_minute(millis))
    }
}

/// Parse a mark date as UTC. Accepts "YYYY-MM-DD HH:MM[:SS]", the `T`
/// separated form, RFC 3339, or a bare date.
fn parse_date_millis(date: &str) -> EngineResult<i64> {
    let date = date.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return Ok(dt.timestamp_millis());
    }
    for format in [
        "%Y-%m-%d %H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%dT%H:%M:%S",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(date, format) {
            return Ok(dt.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .ok_or_else(|| EngineError::InvalidMark {
            date: date.to_string(),
        })
}

fn truncate_to_minute(millis: i64) -> i64 {
    millis - millis.rem_euclid(MINUTE_MS)
}

/// Features sampled at a BUY mark
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryFeatures {
    pub rsi: f64,
    /// (close - ema200) / ema200
    pub dist_ema200: f64,
    pub macd: f64,
    /// 0 at the lower band, 1 at the upper band, 0.5 when the band is flat.
    /// Collected for reporting only; parameter derivation never reads it.
    pub bb_position: f64,
}

impl EntryFeatures {
    /// Bollinger position is measured against SMA20 +/- 2 std20
    fn from_frame(frame: &IndicatorFrame, sma_20: Option<f64>) -> Option<Self> {
        let rsi = frame.rsi?;
        let close = frame.close();
        let dist_ema200 = if frame.ema_200 != 0.0 {
            (close - frame.ema_200) / frame.ema_200
        } else {
            0.0
        };
        let bb_position = match (sma_20, frame.std_20) {
            (Some(mid), Some(std)) if std > 0.0 => {
                let lower = mid - BOLLINGER_MULTIPLIER * std;
                (close - lower) / (2.0 * BOLLINGER_MULTIPLIER * std)
            }
            _ => 0.5,
        };
        Some(Self {
            rsi,
            dist_ema200,
            macd: frame.macd,
            bb_position,
        })
    }
}

/// LEARNED strategy derived from marks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferredStrategy {
    #[serde(rename = "type")]
    pub kind: StrategyKind,
    pub params: StrategyParams,
    pub explanation: Vec<String>,
    pub description: String,
    pub matched_marks: usize,
}

impl InferredStrategy {
    /// Selection ready to hand to the backtest engine
    pub fn selection(&self) -> StrategySelection {
        StrategySelection {
            kind: self.kind,
            params: self.params.clone(),
        }
    }
}

/// Match marks against candles and derive LEARNED parameters
pub fn infer_strategy_from_marks(
    candles: &[Candle],
    marks: &[Mark],
) -> EngineResult<InferredStrategy> {
    if candles.is_empty() {
        return Err(EngineError::EmptyCandles);
    }

    let frames = compute_indicators(candles);
    let closes: Vec<f64> = frames.iter().map(IndicatorFrame::close).collect();
    let sma_20 = sma_series(&closes, VOLATILITY_PERIOD);

    // First usable row per minute
    let mut by_minute: HashMap<i64, usize> = HashMap::new();
    for (i, frame) in frames.iter().enumerate() {
        if frame.rsi.is_some() && frame.std_20.is_some() {
            by_minute
                .entry(truncate_to_minute(frame.timestamp()))
                .or_insert(i);
        }
    }

    let mut matched = 0;
    let mut entries: Vec<EntryFeatures> = Vec::new();
    for mark in marks {
        let minute = mark.minute()?;
        let Some(&i) = by_minute.get(&minute) else {
            debug!(minute, side = ?mark.side, "Mark has no matching candle");
            continue;
        };
        matched += 1;
        if mark.side == TradeSide::Buy {
            entries.extend(EntryFeatures::from_frame(&frames[i], sma_20[i]));
        }
    }

    if matched < MIN_MATCHED_MARKS {
        return Err(EngineError::InsufficientMarks { matched });
    }

    let inferred = derive_strategy(&entries, matched);
    info!(
        marks = marks.len(),
        matched,
        buys = entries.len(),
        params = ?inferred.params,
        "Inferred strategy from marks"
    );
    Ok(inferred)
}

/// Summarise BUY-mark features into LEARNED parameters
pub fn derive_strategy(entries: &[EntryFeatures], matched_marks: usize) -> InferredStrategy {
    let mut params = StrategyParams::new();
    let mut explanation = Vec::new();

    if entries.is_empty() {
        params.set("rsi_buy", FALLBACK_RSI_BUY);
        explanation.push(format!(
            "No strong RSI pattern found, defaulting to RSI < {}.",
            FALLBACK_RSI_BUY
        ));
    } else {
        let rsi: Vec<f64> = entries.iter().map(|e| e.rsi).collect();
        let (mean_rsi, std_rsi) = mean_and_std(&rsi);
        if mean_rsi < LOW_RSI_MEAN {
            let threshold = (mean_rsi + std_rsi + RSI_SLACK).round() as i64;
            params.set("rsi_buy", threshold);
            explanation.push(format!(
                "You tend to buy when RSI is low (avg {:.1}).",
                mean_rsi
            ));
        } else {
            params.set("rsi_buy", DISABLED_RSI_BUY);
            explanation.push(format!(
                "Your entries average RSI {:.1}, which is not low, so RSI does not gate entries.",
                mean_rsi
            ));
        }

        let distances: Vec<f64> = entries.iter().map(|e| e.dist_ema200).collect();
        let (mean_distance, _) = mean_and_std(&distances);
        if mean_distance > UPTREND_DISTANCE {
            params.set(TREND_FILTER_KEY, TrendFilter::AboveEma200.as_str());
            explanation.push("Your entries mostly occur in an Uptrend (Above EMA200).".to_string());
        }
    }

    let description = explanation.join(" ");
    InferredStrategy {
        kind: StrategyKind::Learned,
        params,
        explanation,
        description,
        matched_marks,
    }
}

/// Mean and population standard deviation
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
