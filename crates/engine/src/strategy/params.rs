//! Loose name → value parameter map supplied with a strategy selection
//!
//! Lookups never fail: a missing key, a value of the wrong type, or a value
//! outside the accepted range all resolve to the caller's default.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyParams(BTreeMap<String, Value>);

impl StrategyParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Finite numeric value; numeric strings are accepted too
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        let value = match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        value.is_finite().then_some(value)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.get_f64(key).unwrap_or(default)
    }

    /// Value in `[min, max]`, otherwise `default`
    pub fn bounded_or(&self, key: &str, min: f64, max: f64, default: f64) -> f64 {
        self.get_f64(key)
            .filter(|v| (min..=max).contains(v))
            .unwrap_or(default)
    }

    /// Strictly positive value, otherwise `default`
    pub fn positive_or(&self, key: &str, default: f64) -> f64 {
        self.get_f64(key).filter(|v| *v > 0.0).unwrap_or(default)
    }

    /// Zero or positive value, otherwise `default`
    pub fn non_negative_or(&self, key: &str, default: f64) -> f64 {
        self.get_f64(key).filter(|v| *v >= 0.0).unwrap_or(default)
    }

    /// Whole count of at least one, otherwise `default`
    pub fn count_or(&self, key: &str, default: usize) -> usize {
        self.get_f64(key)
            .filter(|v| *v >= 1.0)
            .map(|v| v.floor() as usize)
            .unwrap_or(default)
    }
}
