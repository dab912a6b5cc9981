//! Log Analyzers
//!
//! Each analyzer scans the row stream once, classifies every sample, groups
//! the classified samples into events and computes summary statistics.
//! Analyzers are constructed with their configuration and a
//! [`ColumnResolver`]; the log and calibration are passed to
//! [`LogAnalyzer::analyze`], so nothing depends on ambient state.
//!
//! Failures never propagate out of an analyzer: a missing column or an empty
//! log yields an empty report whose `error` explains why.

pub mod afr;
pub mod boost;
pub mod fuel_trim;
pub mod iam;
pub mod knock;
pub mod load_limit;
pub mod temperature;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::calibration::Calibration;
use crate::datalog::{LogData, ResolvedColumns};
use crate::error::AnalysisError;

/// Per-analyzer severity tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Within limits
    Normal,
    /// Outside limits but harmless
    Mild,
    /// Worth reviewing
    Moderate,
    /// Needs attention
    Severe,
    /// Needs attention before the next pull
    Critical,
}

impl Severity {
    /// Lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one analyzer run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport<E, S> {
    /// Grouped events in start-time order
    pub events: Vec<E>,
    /// Summary statistics
    pub statistics: S,
    /// Signal key -> column name actually used
    pub columns: BTreeMap<String, String>,
    /// Non-fatal notes about degraded inputs
    pub warnings: Vec<String>,
    /// Why the analysis produced no data, if it could not run
    pub error: Option<String>,
}

impl<E, S: Default> AnalysisReport<E, S> {
    /// Build a report from an analyzer's internal result
    pub fn from_result(
        analyzer: &str,
        result: Result<(Vec<E>, S), AnalysisError>,
        columns: &ResolvedColumns,
        warnings: Vec<String>,
    ) -> Self {
        match result {
            Ok((events, statistics)) => {
                tracing::debug!("{} produced {} events", analyzer, events.len());
                Self {
                    events,
                    statistics,
                    columns: columns.names().clone(),
                    warnings,
                    error: None,
                }
            }
            Err(err) => {
                tracing::debug!("{} could not run: {}", analyzer, err);
                Self {
                    events: Vec::new(),
                    statistics: S::default(),
                    columns: columns.names().clone(),
                    warnings,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Whether the analyzer ran
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Common interface implemented by every analyzer
pub trait LogAnalyzer {
    /// Grouped event type
    type Event;
    /// Summary statistics type
    type Statistics: Default;

    /// Short identifier used in logs and issue sources
    fn id(&self) -> &'static str;

    /// Run the analysis and cache the result
    fn analyze(
        &mut self,
        log: &LogData,
        calibration: Option<&Calibration>,
    ) -> &AnalysisReport<Self::Event, Self::Statistics>;

    /// Last computed report, without recomputation
    fn last_report(&self) -> Option<&AnalysisReport<Self::Event, Self::Statistics>>;

    /// Events from the last run
    fn events(&self) -> &[Self::Event] {
        self.last_report()
            .map(|r| r.events.as_slice())
            .unwrap_or(&[])
    }

    /// Statistics from the last run
    fn statistics(&self) -> Option<&Self::Statistics> {
        self.last_report().map(|r| &r.statistics)
    }
}

/// Fail fast on an empty log
pub(crate) fn require_rows(log: &LogData) -> Result<(), AnalysisError> {
    if log.is_empty() {
        Err(AnalysisError::EmptyLog)
    } else {
        Ok(())
    }
}

/// `part / total` as a percentage, 0 when `total` is 0
pub(crate) fn percent(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        100.0 * part / total
    } else {
        0.0
    }
}

/// Running sum/min/max over a stream of values
#[derive(Debug, Clone, Copy)]
pub(crate) struct Accumulator {
    pub count: usize,
    pub sum: f64,
    pub sum_abs: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_abs: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Accumulator {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_abs += value.abs();
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn mean_abs(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_abs / self.count as f64
        }
    }

    /// Minimum, 0 when empty
    pub fn min_or_zero(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.min
        }
    }

    /// Maximum, 0 when empty
    pub fn max_or_zero(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.max
        }
    }

    /// (min, max) when any value was seen
    pub fn range(&self) -> Option<(f64, f64)> {
        (self.count > 0).then_some((self.min, self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(Severity::Critical > Severity::Severe);
        assert!(Severity::Mild > Severity::Normal);
        assert_eq!(Severity::Moderate.to_string(), "moderate");
    }

    #[test]
    fn test_report_from_error() {
        let report: AnalysisReport<(), Vec<f64>> = AnalysisReport::from_result(
            "test",
            Err(AnalysisError::EmptyLog),
            &ResolvedColumns::default(),
            Vec::new(),
        );
        assert!(report.events.is_empty());
        assert!(!report.is_ok());
        assert_eq!(report.error.as_deref(), Some("Log contains no data"));
    }

    #[test]
    fn test_accumulator() {
        let mut acc = Accumulator::default();
        assert_eq!(acc.mean(), 0.0);
        assert_eq!(acc.range(), None);
        for v in [-2.0, 4.0, 1.0] {
            acc.push(v);
        }
        assert_eq!(acc.mean(), 1.0);
        assert!((acc.mean_abs() - 7.0 / 3.0).abs() < 1e-9);
        assert_eq!(acc.range(), Some((-2.0, 4.0)));
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(1.0, 4.0), 25.0);
        assert_eq!(percent(1.0, 0.0), 0.0);
    }
}
