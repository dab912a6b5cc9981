//! In-memory log
//!
//! Holds a completed log for analysis.

use serde::{Deserialize, Serialize};

use super::LogRow;

/// A completed, in-memory datalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogData {
    /// Channel names as they appear in the source file
    channels: Vec<String>,
    /// Samples in time order
    rows: Vec<LogRow>,
}

impl LogData {
    /// Create a new log
    pub fn new(channels: Vec<String>, rows: Vec<LogRow>) -> Self {
        Self { channels, rows }
    }

    /// Get the number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get the channel names
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Get all rows
    pub fn rows(&self) -> &[LogRow] {
        &self.rows
    }

    /// First and last timestamps
    pub fn time_range(&self) -> Option<(f64, f64)> {
        let first = self.rows.first()?.time;
        let last = self.rows.last()?.time;
        Some((first, last))
    }

    /// Total time span covered by the log in seconds
    pub fn duration(&self) -> f64 {
        self.time_range()
            .map(|(first, last)| (last - first).max(0.0))
            .unwrap_or(0.0)
    }
}
