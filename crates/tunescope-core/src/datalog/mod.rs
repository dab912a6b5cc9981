//! Data Logs
//!
//! Uniform row stream consumed by every analyzer, plus logical column
//! resolution for the many ways logging tools name the same signal.

mod columns;
mod log;

pub use columns::{ColumnResolver, ResolvedColumns, Signal};
pub use log::LogData;

use serde::{Deserialize, Serialize};

/// A single logged value as delivered by the upstream parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    /// Numeric sample
    Number(f64),
    /// Text sample, such as an on/off state
    Text(String),
}

impl SignalValue {
    /// Numeric reading with parse-or-default-0 semantics
    pub fn as_f64(&self) -> f64 {
        match self {
            SignalValue::Number(v) => *v,
            SignalValue::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        }
    }
}

impl From<f64> for SignalValue {
    fn from(value: f64) -> Self {
        SignalValue::Number(value)
    }
}

impl From<&str> for SignalValue {
    fn from(value: &str) -> Self {
        SignalValue::Text(value.to_string())
    }
}

/// One logged sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRow {
    /// Seconds from start of log, non-decreasing
    pub time: f64,
    /// Values in channel order
    pub values: Vec<SignalValue>,
}

impl LogRow {
    /// Create a new row
    pub fn new(time: f64, values: Vec<SignalValue>) -> Self {
        Self { time, values }
    }

    /// Create a row from plain numbers
    pub fn from_numbers(time: f64, values: &[f64]) -> Self {
        Self {
            time,
            values: values.iter().map(|&v| SignalValue::Number(v)).collect(),
        }
    }

    /// Numeric value of a channel; a short row reads as 0
    pub fn number(&self, channel: usize) -> f64 {
        self.values.get(channel).map(SignalValue::as_f64).unwrap_or(0.0)
    }

    /// Numeric value of an optionally resolved channel
    pub fn get(&self, channel: Option<usize>) -> Option<f64> {
        channel.map(|idx| self.number(idx))
    }

    /// Numeric value of an optionally resolved channel, 0 when unresolved
    pub fn get_or_zero(&self, channel: Option<usize>) -> f64 {
        self.get(channel).unwrap_or(0.0)
    }
}
