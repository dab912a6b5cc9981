//! Error types for log analysis and autotune

use thiserror::Error;

/// Errors that can occur while analyzing a log or exporting a tune
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The log has no rows
    #[error("Log contains no data")]
    EmptyLog,

    /// No log column resolved for a required signal
    #[error("Missing required column for {role} ({signal})")]
    MissingColumn {
        /// What the analyzer needed the signal for
        role: String,
        /// Signal key
        signal: String,
    },

    /// The operation needs a calibration and none was supplied
    #[error("No calibration loaded")]
    MissingCalibration,

    /// A named table is absent from the calibration
    #[error("Calibration table not found: {0}")]
    MissingTable(String),

    /// A table's shape disagrees with its axes or with the values written to it
    #[error("Dimension mismatch for '{table}': expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Table name
        table: String,
        /// Shape the axes call for
        expected: String,
        /// Shape found
        actual: String,
    },

    /// Settings that cannot be used, such as an unparseable custom filter
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Reading or writing a file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document did not parse or serialize
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    /// Build a missing-column error for a logical signal
    pub fn missing_column(role: impl Into<String>, signal: crate::datalog::Signal) -> Self {
        Self::MissingColumn {
            role: role.into(),
            signal: signal.key().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalog::Signal;

    #[test]
    fn test_error_display() {
        let err = AnalysisError::missing_column("knock retard", Signal::KnockRetard);
        assert!(err.to_string().contains("knock retard"));
        assert!(err.to_string().contains("knockRetard"));

        let err = AnalysisError::DimensionMismatch {
            table: "fuel_base".into(),
            expected: "16x16".into(),
            actual: "12x16".into(),
        };
        assert!(err.to_string().contains("16x16"));
        assert!(err.to_string().contains("12x16"));
    }
}
