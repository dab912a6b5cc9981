//! Air/Fuel Ratio Analyzer
//!
//! Compares measured lambda against the logged target, with tighter limits
//! while power enrichment runs open loop.

use serde::{Deserialize, Serialize};

use super::{percent, require_rows, Accumulator, AnalysisReport, LogAnalyzer, Severity};
use crate::calibration::{self, Calibration};
use crate::datalog::{ColumnResolver, LogData, ResolvedColumns, Signal};
use crate::error::AnalysisError;
use crate::grouping::{group_by_window, Candidate, Group};
use crate::unit_conversion::lambda_to_afr;

const SIGNALS: [Signal; 5] = [
    Signal::LambdaActual,
    Signal::LambdaTarget,
    Signal::Rpm,
    Signal::Load,
    Signal::Throttle,
];

/// AFR deviation thresholds (lambda units unless noted)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AfrConfig {
    /// Closed-loop deviation that flags a lean/rich event
    pub closed_loop_threshold: f64,
    /// Closed-loop deviation still counted as on target
    pub closed_loop_tolerance: f64,
    /// Power-enrichment deviation that flags a lean/rich event
    pub pe_threshold: f64,
    /// Power-enrichment deviation still counted as on target
    pub pe_tolerance: f64,
    /// Targets this close to 1.0 are the closed-loop baseline and skipped
    pub stoich_band: f64,
    /// Logged vs calibrated PE target difference that flags a mismatch
    pub target_mismatch_threshold: f64,
    /// No deviation events below this throttle (%)
    pub min_event_throttle: f64,
    /// Deviation must exceed this share of target (%)
    pub min_error_pct: f64,
    /// "Time in target" only counts samples at or above this throttle (%)
    pub time_in_target_min_throttle: f64,
    /// |error %| ladder for lean/rich events: critical, severe, moderate
    pub severity_pct: [f64; 3],
    /// Grouping window (s)
    pub group_window: f64,
}

impl Default for AfrConfig {
    fn default() -> Self {
        Self {
            closed_loop_threshold: 0.05,
            closed_loop_tolerance: 0.02,
            pe_threshold: 0.03,
            pe_tolerance: 0.015,
            stoich_band: 0.001,
            target_mismatch_threshold: 0.01,
            min_event_throttle: 10.0,
            min_error_pct: 7.0,
            time_in_target_min_throttle: 15.0,
            severity_pct: [20.0, 15.0, 10.0],
            group_window: 1.0,
        }
    }
}

/// AFR event classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AfrEventType {
    /// Measured leaner than target
    Lean,
    /// Measured richer than target
    Rich,
    /// Significant deviation inside the lean/rich band
    Normal,
    /// Logged PE target disagrees with the calibrated one
    TargetMismatch,
}

impl AfrEventType {
    /// Stable identifier used in serialized output and issue lists
    pub fn as_str(&self) -> &'static str {
        match self {
            AfrEventType::Lean => "lean",
            AfrEventType::Rich => "rich",
            AfrEventType::Normal => "normal",
            AfrEventType::TargetMismatch => "target_mismatch",
        }
    }
}

#[derive(Debug, Clone)]
struct AfrSample {
    time: f64,
    kind: AfrEventType,
    severity: Severity,
    measured: f64,
    target: f64,
    error: f64,
    error_pct: f64,
    expected_target: Option<f64>,
    rpm: f64,
    load: f64,
    throttle: f64,
    pe_mode: bool,
}

impl Candidate for AfrSample {
    type Kind = AfrEventType;

    fn time(&self) -> f64 {
        self.time
    }

    fn kind(&self) -> AfrEventType {
        self.kind
    }
}

/// A grouped AFR event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AfrEvent {
    /// Time of the first grouped sample (s)
    pub time: f64,
    /// Time of the last grouped sample (s)
    pub end_time: f64,
    /// Span covered by the group (s)
    pub duration: f64,
    /// Event classification
    pub event_type: AfrEventType,
    /// Worst severity in the group
    pub severity: Severity,
    /// Target lambda at the first grouped sample
    pub target_lambda: f64,
    /// Measured lambda at the first grouped sample
    pub measured_lambda: f64,
    /// Target as gasoline AFR
    pub target_afr: f64,
    /// Measured as gasoline AFR
    pub measured_afr: f64,
    /// Deviation of the most severe sample
    pub lambda_error: f64,
    /// Same deviation as % of target
    pub error_pct: f64,
    /// Calibrated PE target, for target mismatches
    pub expected_target: Option<f64>,
    /// Mean engine speed (rpm)
    pub rpm: f64,
    /// Mean load (g/rev)
    pub load: f64,
    /// Mean throttle (%)
    pub throttle: f64,
    /// Any grouped sample was in power enrichment
    #[serde(rename = "isPEMode")]
    pub is_pe_mode: bool,
    /// Samples in the group
    pub event_count: usize,
}

impl AfrEvent {
    fn from_group(group: &Group<AfrSample>) -> Self {
        let first = group.first();
        let peak = match group.kind() {
            AfrEventType::TargetMismatch => {
                group.peak_by(|s| (s.expected_target.unwrap_or(s.target) - s.target).abs())
            }
            _ => group.peak_by(|s| s.error.abs()),
        };
        Self {
            time: group.start(),
            end_time: group.end(),
            duration: group.duration(),
            event_type: group.kind(),
            severity: peak.severity,
            target_lambda: first.target,
            measured_lambda: first.measured,
            target_afr: lambda_to_afr(first.target),
            measured_afr: lambda_to_afr(first.measured),
            lambda_error: peak.error,
            error_pct: peak.error_pct,
            expected_target: peak.expected_target,
            rpm: group.mean(|s| s.rpm),
            load: group.mean(|s| s.load),
            throttle: group.mean(|s| s.throttle),
            is_pe_mode: group.any(|s| s.pe_mode),
            event_count: group.len(),
        }
    }
}

/// AFR summary statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AfrStatistics {
    /// Samples with a usable target and measurement
    pub analyzed_samples: usize,
    /// Samples skipped for missing or out-of-range values
    pub skipped_samples: usize,
    /// Samples in power enrichment
    pub pe_samples: usize,
    /// Mean signed lambda error
    pub average_error: f64,
    /// Mean absolute lambda error
    pub average_abs_error: f64,
    /// Mean signed error as % of target
    pub average_error_pct: f64,
    /// Largest positive (lean) error
    pub max_lean: f64,
    /// Largest negative (rich) error
    pub max_rich: f64,
    /// Share of samples within tolerance (%)
    pub time_in_target_pct: f64,
    /// Events of every type
    pub total_events: usize,
    /// Lean events
    pub lean_events: usize,
    /// Rich events
    pub rich_events: usize,
    /// Significant deviations inside the lean/rich band
    pub normal_events: usize,
    /// Logged vs calibrated PE target disagreements
    pub target_mismatch_events: usize,
}

/// Report produced by [`AfrAnalyzer`]
pub type AfrReport = AnalysisReport<AfrEvent, AfrStatistics>;

/// Air/fuel ratio analyzer
#[derive(Debug, Clone, Default)]
pub struct AfrAnalyzer {
    config: AfrConfig,
    resolver: ColumnResolver,
    last: Option<AfrReport>,
}

impl AfrAnalyzer {
    /// Create an analyzer with explicit thresholds and column overrides
    pub fn new(config: AfrConfig, resolver: ColumnResolver) -> Self {
        Self {
            config,
            resolver,
            last: None,
        }
    }

    /// Active thresholds
    pub fn config(&self) -> &AfrConfig {
        &self.config
    }

    /// Severity for a lean/rich deviation expressed as % of target
    fn deviation_severity(&self, error_pct: f64) -> Severity {
        let [critical, severe, moderate] = self.config.severity_pct;
        let magnitude = error_pct.abs();
        if magnitude > critical {
            Severity::Critical
        } else if magnitude > severe {
            Severity::Severe
        } else if magnitude > moderate {
            Severity::Moderate
        } else {
            Severity::Mild
        }
    }

    /// Event type for a deviation, if it is significant enough to report
    fn classify(&self, error: f64, error_pct: f64, pe_mode: bool) -> Option<AfrEventType> {
        let (threshold, tolerance) = if pe_mode {
            (self.config.pe_threshold, self.config.pe_tolerance)
        } else {
            (self.config.closed_loop_threshold, self.config.closed_loop_tolerance)
        };

        let kind = if error > threshold {
            AfrEventType::Lean
        } else if error < -threshold {
            AfrEventType::Rich
        } else {
            AfrEventType::Normal
        };

        let outside_band = kind != AfrEventType::Normal || error.abs() > tolerance;
        (outside_band && error_pct.abs() > self.config.min_error_pct).then_some(kind)
    }

    fn tolerance(&self, pe_mode: bool) -> f64 {
        if pe_mode {
            self.config.pe_tolerance
        } else {
            self.config.closed_loop_tolerance
        }
    }

    fn run(
        &self,
        log: &LogData,
        calibration: Option<&Calibration>,
        columns: &ResolvedColumns,
    ) -> Result<(Vec<AfrEvent>, AfrStatistics), AnalysisError> {
        require_rows(log)?;
        let target_col = columns.require(Signal::LambdaTarget, "target lambda")?;
        let measured_col = columns.require(Signal::LambdaActual, "measured lambda")?;
        let rpm_col = columns.index(Signal::Rpm);
        let load_col = columns.index(Signal::Load);
        let throttle_col = columns.index(Signal::Throttle);

        let mut errors = Accumulator::default();
        let mut error_pcts = Accumulator::default();
        let mut skipped = 0usize;
        let mut pe_samples = 0usize;
        let mut target_window = 0usize;
        let mut in_target = 0usize;
        let mut candidates = Vec::new();

        for row in log.rows() {
            let measured = row.number(measured_col);
            let target = row.number(target_col);
            if !measured.is_finite()
                || !target.is_finite()
                || measured <= 0.0
                || target <= 0.0
                || (target - 1.0).abs() <= self.config.stoich_band
            {
                skipped += 1;
                continue;
            }

            let rpm = row.get_or_zero(rpm_col);
            let load = row.get_or_zero(load_col);
            let throttle = row.get_or_zero(throttle_col);
            let pe_mode = calibration::pe_mode_active(calibration, rpm, load, throttle);

            let error = measured - target;
            let error_pct = 100.0 * error / target;
            errors.push(error);
            error_pcts.push(error_pct);
            if pe_mode {
                pe_samples += 1;
            }
            if throttle >= self.config.time_in_target_min_throttle {
                target_window += 1;
                if error.abs() <= self.tolerance(pe_mode) {
                    in_target += 1;
                }
            }

            let sample = |kind, severity, expected_target| AfrSample {
                time: row.time,
                kind,
                severity,
                measured,
                target,
                error,
                error_pct,
                expected_target,
                rpm,
                load,
                throttle,
                pe_mode,
            };

            if pe_mode {
                let expected = calibration.and_then(|c| c.pe_target_lambda(rpm, load));
                if let Some(expected) = expected {
                    if (expected - target).abs() > self.config.target_mismatch_threshold {
                        candidates.push(sample(
                            AfrEventType::TargetMismatch,
                            Severity::Moderate,
                            Some(expected),
                        ));
                    }
                }
            }

            if throttle < self.config.min_event_throttle {
                continue;
            }

            if let Some(kind) = self.classify(error, error_pct, pe_mode) {
                let severity = match kind {
                    AfrEventType::Normal => Severity::Mild,
                    _ => self.deviation_severity(error_pct),
                };
                candidates.push(sample(kind, severity, None));
            }
        }

        let events: Vec<AfrEvent> = group_by_window(candidates, self.config.group_window)
            .iter()
            .map(AfrEvent::from_group)
            .collect();

        let by_type = |t: AfrEventType| events.iter().filter(|e| e.event_type == t).count();
        let statistics = AfrStatistics {
            analyzed_samples: errors.count,
            skipped_samples: skipped,
            pe_samples,
            average_error: errors.mean(),
            average_abs_error: errors.mean_abs(),
            average_error_pct: error_pcts.mean(),
            max_lean: errors.max_or_zero().max(0.0),
            max_rich: errors.min_or_zero().min(0.0),
            time_in_target_pct: percent(in_target as f64, target_window as f64),
            total_events: events.len(),
            lean_events: by_type(AfrEventType::Lean),
            rich_events: by_type(AfrEventType::Rich),
            normal_events: by_type(AfrEventType::Normal),
            target_mismatch_events: by_type(AfrEventType::TargetMismatch),
        };

        Ok((events, statistics))
    }
}

impl LogAnalyzer for AfrAnalyzer {
    type Event = AfrEvent;
    type Statistics = AfrStatistics;

    fn id(&self) -> &'static str {
        "afr"
    }

    fn analyze(&mut self, log: &LogData, calibration: Option<&Calibration>) -> &AfrReport {
        let columns = ResolvedColumns::resolve(&self.resolver, log, &SIGNALS);
        let result = self.run(log, calibration, &columns);
        let report = AnalysisReport::from_result(self.id(), result, &columns, Vec::new());
        self.last.insert(report)
    }

    fn last_report(&self) -> Option<&AfrReport> {
        self.last.as_ref()
    }
}
