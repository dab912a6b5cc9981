//! Boost Control Analyzer
//!
//! Compares manifold pressure against the boost target while the engine is
//! actually in boost, and checks actual pressure against the calibrated
//! boost limit.

use serde::{Deserialize, Serialize};

use super::{percent, require_rows, Accumulator, AnalysisReport, LogAnalyzer, Severity};
use crate::calibration::Calibration;
use crate::datalog::{ColumnResolver, LogData, ResolvedColumns, Signal};
use crate::error::AnalysisError;
use crate::grouping::{group_by_window, retain_min_duration, Candidate, Group};

const SIGNALS: [Signal; 5] = [
    Signal::BoostActual,
    Signal::BoostTarget,
    Signal::Rpm,
    Signal::Throttle,
    Signal::WastegateDuty,
];

/// Boost control thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BoostConfig {
    /// Samples below this pressure are not in boost (kPa)
    pub min_boost_kpa: f64,
    /// |actual - target| beyond this is over/undershoot (kPa)
    pub error_threshold: f64,
    /// Fallback |error| ladder when the calibration carries none (kPa, descending)
    pub severity_ladder: [f64; 4],
    /// Band counted as "on target" (kPa)
    pub tolerance: f64,
    /// Overshoot below this throttle is ignored (%)
    pub overshoot_min_throttle: f64,
    /// Undershoot at or below this throttle is ignored (%)
    pub undershoot_min_throttle: f64,
    /// Overshoot with duty at this fraction of the wastegate max is saturated
    pub wastegate_saturation_ratio: f64,
    /// Undershoot with duty at or below this is saturated (%)
    pub wastegate_min_duty: f64,
    /// Grouping window (s)
    pub group_window: f64,
    /// Overshoot events shorter than this are dropped (s)
    pub overshoot_min_duration: f64,
    /// Undershoot events shorter than this are dropped (s)
    pub undershoot_min_duration: f64,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            min_boost_kpa: 100.0,
            error_threshold: 5.0,
            severity_ladder: [20.3, 11.7, 5.3, 2.1],
            tolerance: 10.0,
            overshoot_min_throttle: 30.0,
            undershoot_min_throttle: 50.0,
            wastegate_saturation_ratio: 0.95,
            wastegate_min_duty: 5.0,
            group_window: 0.5,
            overshoot_min_duration: 0.25,
            undershoot_min_duration: 0.5,
        }
    }
}

/// Boost event classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostEventType {
    /// Actual above target
    Overshoot,
    /// Actual below target
    Undershoot,
    /// Actual above the calibrated boost limit
    LimitViolation,
}

impl BoostEventType {
    /// Stable identifier used in serialized output and issue lists
    pub fn as_str(&self) -> &'static str {
        match self {
            BoostEventType::Overshoot => "overshoot",
            BoostEventType::Undershoot => "undershoot",
            BoostEventType::LimitViolation => "limit_violation",
        }
    }
}

/// Severity of a boost error magnitude against a descending 4-step ladder
pub fn classify_boost_error(abs_error: f64, ladder: &[f64; 4]) -> Severity {
    if abs_error > ladder[0] {
        Severity::Critical
    } else if abs_error > ladder[1] {
        Severity::Severe
    } else if abs_error > ladder[2] {
        Severity::Moderate
    } else if abs_error > ladder[3] {
        Severity::Mild
    } else {
        Severity::Normal
    }
}

#[derive(Debug, Clone)]
struct BoostSample {
    time: f64,
    kind: BoostEventType,
    severity: Severity,
    actual: f64,
    target: f64,
    error: f64,
    limit: Option<f64>,
    rpm: f64,
    throttle: f64,
    duty: f64,
    saturated: bool,
}

impl Candidate for BoostSample {
    type Kind = BoostEventType;

    fn time(&self) -> f64 {
        self.time
    }

    fn kind(&self) -> BoostEventType {
        self.kind
    }
}

/// A grouped boost control event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostEvent {
    /// Time of the first grouped sample (s)
    pub time: f64,
    /// Time of the last grouped sample (s)
    pub end_time: f64,
    /// Span covered by the group (s)
    pub duration: f64,
    /// Event classification
    pub event_type: BoostEventType,
    /// Severity of the sample with the largest |error|
    pub severity: Severity,
    /// Actual boost at the sample with the largest |error| (kPa)
    pub actual_boost: f64,
    /// Target at that sample (kPa)
    pub target_boost: f64,
    /// Actual minus target (kPa)
    pub boost_error: f64,
    /// Calibrated limit at that sample, if any (kPa)
    pub boost_limit: Option<f64>,
    /// Mean engine speed (rpm)
    pub rpm: f64,
    /// Mean throttle (%)
    pub throttle: f64,
    /// Mean wastegate duty (%)
    pub wastegate_duty: f64,
    /// Any grouped sample had the wastegate at its limit
    pub wastegate_saturated: bool,
    /// Samples in the group
    pub event_count: usize,
}

impl BoostEvent {
    fn from_group(group: &Group<BoostSample>) -> Self {
        let peak = group.peak_by(|s| s.error.abs());
        Self {
            time: group.start(),
            end_time: group.end(),
            duration: group.duration(),
            event_type: group.kind(),
            severity: peak.severity,
            actual_boost: peak.actual,
            target_boost: peak.target,
            boost_error: peak.error,
            boost_limit: peak.limit,
            rpm: group.mean(|s| s.rpm),
            throttle: group.mean(|s| s.throttle),
            wastegate_duty: group.mean(|s| s.duty),
            wastegate_saturated: group.any(|s| s.saturated),
            event_count: group.len(),
        }
    }
}

/// Boost control summary statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostStatistics {
    /// Samples at or above the boost threshold
    pub analyzed_samples: usize,
    /// Mean signed error (kPa)
    pub average_error: f64,
    /// Mean absolute error (kPa)
    pub average_abs_error: f64,
    /// Largest positive error (kPa)
    pub max_overshoot: f64,
    /// Largest negative error (kPa)
    pub max_undershoot: f64,
    /// Share of samples within tolerance (%)
    pub time_in_tolerance_pct: f64,
    /// Events of every type
    pub total_events: usize,
    /// Overshoot events
    pub overshoot_events: usize,
    /// Undershoot events
    pub undershoot_events: usize,
    /// Limit violation events
    pub limit_violations: usize,
    /// Events at critical severity
    pub critical_events: usize,
    /// Events at severe severity
    pub severe_events: usize,
    /// Events at moderate severity
    pub moderate_events: usize,
    /// Events at mild severity
    pub mild_events: usize,
    /// Events with a saturated wastegate
    pub wastegate_saturated_events: usize,
    /// Mean wastegate duty over analyzed samples (%)
    pub average_wastegate_duty: f64,
}

/// Report produced by [`BoostControlAnalyzer`]
pub type BoostReport = AnalysisReport<BoostEvent, BoostStatistics>;

/// Boost control analyzer
#[derive(Debug, Clone, Default)]
pub struct BoostControlAnalyzer {
    config: BoostConfig,
    resolver: ColumnResolver,
    last: Option<BoostReport>,
}

impl BoostControlAnalyzer {
    /// Create an analyzer with explicit thresholds and column overrides
    pub fn new(config: BoostConfig, resolver: ColumnResolver) -> Self {
        Self {
            config,
            resolver,
            last: None,
        }
    }

    /// Active thresholds
    pub fn config(&self) -> &BoostConfig {
        &self.config
    }

    /// Whether a classified sample survives the throttle filters
    fn passes_throttle_filter(&self, kind: BoostEventType, throttle: Option<f64>) -> bool {
        let Some(throttle) = throttle else {
            return true;
        };
        match kind {
            BoostEventType::Overshoot => throttle >= self.config.overshoot_min_throttle,
            BoostEventType::Undershoot => throttle > self.config.undershoot_min_throttle,
            BoostEventType::LimitViolation => true,
        }
    }

    fn run(
        &self,
        log: &LogData,
        calibration: Option<&Calibration>,
        columns: &ResolvedColumns,
    ) -> Result<(Vec<BoostEvent>, BoostStatistics), AnalysisError> {
        require_rows(log)?;
        let boost_col = columns.require(Signal::BoostActual, "actual boost")?;
        let target_col = columns.index(Signal::BoostTarget);
        let rpm_col = columns.index(Signal::Rpm);
        let throttle_col = columns.index(Signal::Throttle);
        let duty_col = columns.index(Signal::WastegateDuty);

        let ladder = calibration
            .and_then(Calibration::boost_error_index)
            .unwrap_or(self.config.severity_ladder);

        let mut errors = Accumulator::default();
        let mut duty_stats = Accumulator::default();
        let mut in_tolerance = 0usize;
        let mut candidates = Vec::new();

        for row in log.rows() {
            let actual = row.number(boost_col);
            if !actual.is_finite() || actual < self.config.min_boost_kpa {
                continue;
            }
            let target = row.get(target_col).unwrap_or(actual);
            let error = actual - target;
            if !error.is_finite() {
                continue;
            }

            let rpm = row.get_or_zero(rpm_col);
            let throttle = row.get(throttle_col);
            let duty = row.get(duty_col);

            errors.push(error);
            if let Some(d) = duty {
                duty_stats.push(d);
            }
            if error.abs() <= self.config.tolerance {
                in_tolerance += 1;
            }

            let limit = calibration.and_then(|c| c.boost_limit(rpm));
            let kind = if limit.is_some_and(|l| actual > l) {
                BoostEventType::LimitViolation
            } else if error > self.config.error_threshold {
                BoostEventType::Overshoot
            } else if error < -self.config.error_threshold {
                BoostEventType::Undershoot
            } else {
                continue;
            };

            if !self.passes_throttle_filter(kind, throttle) {
                continue;
            }

            let severity = match kind {
                BoostEventType::LimitViolation => Severity::Critical,
                _ => classify_boost_error(error.abs(), &ladder),
            };

            let throttle = throttle.unwrap_or(0.0);
            let saturated = match (kind, duty) {
                (BoostEventType::Overshoot, Some(d)) => calibration
                    .and_then(|c| c.wastegate_max(rpm, throttle))
                    .is_some_and(|max| d >= self.config.wastegate_saturation_ratio * max),
                (BoostEventType::Undershoot, Some(d)) => d <= self.config.wastegate_min_duty,
                _ => false,
            };

            candidates.push(BoostSample {
                time: row.time,
                kind,
                severity,
                actual,
                target,
                error,
                limit,
                rpm,
                throttle,
                duty: duty.unwrap_or(0.0),
                saturated,
            });
        }

        let mut groups = group_by_window(candidates, self.config.group_window);
        retain_min_duration(&mut groups, |kind| match kind {
            BoostEventType::Overshoot => Some(self.config.overshoot_min_duration),
            BoostEventType::Undershoot => Some(self.config.undershoot_min_duration),
            BoostEventType::LimitViolation => None,
        });
        let events: Vec<BoostEvent> = groups.iter().map(BoostEvent::from_group).collect();

        let by_type = |t: BoostEventType| events.iter().filter(|e| e.event_type == t).count();
        let by_severity = |s: Severity| events.iter().filter(|e| e.severity == s).count();
        let statistics = BoostStatistics {
            analyzed_samples: errors.count,
            average_error: errors.mean(),
            average_abs_error: errors.mean_abs(),
            max_overshoot: errors.max_or_zero().max(0.0),
            max_undershoot: errors.min_or_zero().min(0.0),
            time_in_tolerance_pct: percent(in_tolerance as f64, errors.count as f64),
            total_events: events.len(),
            overshoot_events: by_type(BoostEventType::Overshoot),
            undershoot_events: by_type(BoostEventType::Undershoot),
            limit_violations: by_type(BoostEventType::LimitViolation),
            critical_events: by_severity(Severity::Critical),
            severe_events: by_severity(Severity::Severe),
            moderate_events: by_severity(Severity::Moderate),
            mild_events: by_severity(Severity::Mild),
            wastegate_saturated_events: events.iter().filter(|e| e.wastegate_saturated).count(),
            average_wastegate_duty: duty_stats.mean(),
        };

        Ok((events, statistics))
    }
}

impl LogAnalyzer for BoostControlAnalyzer {
    type Event = BoostEvent;
    type Statistics = BoostStatistics;

    fn id(&self) -> &'static str {
        "boost"
    }

    fn analyze(&mut self, log: &LogData, calibration: Option<&Calibration>) -> &BoostReport {
        let columns = ResolvedColumns::resolve(&self.resolver, log, &SIGNALS);
        let mut warnings = Vec::new();
        if columns.index(Signal::BoostTarget).is_none() {
            warnings.push("Boost target column not found; error is reported as 0".to_string());
        }
        if columns.index(Signal::Throttle).is_none() {
            warnings.push("Throttle column not found; throttle filters disabled".to_string());
        }
        let result = self.run(log, calibration, &columns);
        let report = AnalysisReport::from_result(self.id(), result, &columns, warnings);
        self.last.insert(report)
    }

    fn last_report(&self) -> Option<&BoostReport> {
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{names, CalibrationTable};
    use crate::datalog::LogRow;

    const LADDER: [f64; 4] = [20.3, 11.7, 5.3, 2.1];

    /// (time, actual, target, throttle, duty)
    fn boost_log(samples: &[(f64, f64, f64, f64, f64)]) -> LogData {
        let channels = [
            "Time (s)",
            "Engine Speed (rpm)",
            "Manifold Absolute Pressure (kPa)",
            "Boost Target (kPa)",
            "Throttle Position (%)",
            "Wastegate Duty Cycle (%)",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let rows = samples
            .iter()
            .map(|&(t, actual, target, tps, duty)| {
                LogRow::from_numbers(t, &[t, 4000.0, actual, target, tps, duty])
            })
            .collect();
        LogData::new(channels, rows)
    }

    #[test]
    fn test_severity_ladder() {
        assert_eq!(classify_boost_error(20.4, &LADDER), Severity::Critical);
        assert_eq!(classify_boost_error(20.3, &LADDER), Severity::Severe);
        assert_eq!(classify_boost_error(11.8, &LADDER), Severity::Severe);
        assert_eq!(classify_boost_error(11.7, &LADDER), Severity::Moderate);
        assert_eq!(classify_boost_error(5.4, &LADDER), Severity::Moderate);
        assert_eq!(classify_boost_error(5.3, &LADDER), Severity::Mild);
        assert_eq!(classify_boost_error(2.2, &LADDER), Severity::Mild);
        assert_eq!(classify_boost_error(2.1, &LADDER), Severity::Normal);
    }

    #[test]
    fn test_overshoot_event() {
        let mut samples: Vec<_> = (0..=6)
            .map(|i| (i as f64 * 0.05, 150.0, 130.0, 80.0, 40.0))
            .collect();
        samples.extend((7..40).map(|i| (i as f64 * 0.05, 130.0, 130.0, 80.0, 40.0)));

        let mut analyzer = BoostControlAnalyzer::default();
        let report = analyzer.analyze(&boost_log(&samples), None);
        assert_eq!(report.events.len(), 1);
        let event = &report.events[0];
        assert_eq!(event.event_type, BoostEventType::Overshoot);
        assert_eq!(event.severity, Severity::Severe);
        assert!((event.duration - 0.3).abs() < 1e-9);
        assert_eq!(event.boost_error, 20.0);
        assert_eq!(report.statistics.max_overshoot, 20.0);
    }

    #[test]
    fn test_short_overshoot_dropped() {
        let samples: Vec<_> = (0..3)
            .map(|i| (i as f64 * 0.05, 150.0, 130.0, 80.0, 40.0))
            .collect();
        let mut analyzer = BoostControlAnalyzer::default();
        assert!(analyzer.analyze(&boost_log(&samples), None).events.is_empty());
    }

    #[test]
    fn test_throttle_filters() {
        let over: Vec<_> = (0..10)
            .map(|i| (i as f64 * 0.1, 150.0, 130.0, 25.0, 40.0))
            .collect();
        let under: Vec<_> = (0..10)
            .map(|i| (i as f64 * 0.1, 110.0, 130.0, 50.0, 40.0))
            .collect();
        let mut analyzer = BoostControlAnalyzer::default();
        assert!(analyzer.analyze(&boost_log(&over), None).events.is_empty());
        assert!(analyzer.analyze(&boost_log(&under), None).events.is_empty());
    }

    #[test]
    fn test_limit_violation_exempt_from_filters() {
        let mut cal = Calibration::new("test");
        cal.set_table(
            names::BOOST_LIMIT,
            CalibrationTable::new_1d(vec![1000.0, 7000.0], vec![140.0, 140.0]),
        );
        let samples = [(0.0, 145.0, 145.0, 10.0, 40.0)];
        let mut analyzer = BoostControlAnalyzer::default();
        let report = analyzer.analyze(&boost_log(&samples), Some(&cal));
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].event_type, BoostEventType::LimitViolation);
        assert_eq!(report.events[0].severity, Severity::Critical);
        assert_eq!(report.events[0].boost_limit, Some(140.0));
    }

    #[test]
    fn test_undershoot_saturation() {
        let samples: Vec<_> = (0..=12)
            .map(|i| (i as f64 * 0.05, 110.0, 130.0, 90.0, 2.0))
            .collect();
        let mut analyzer = BoostControlAnalyzer::default();
        let report = analyzer.analyze(&boost_log(&samples), None);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].event_type, BoostEventType::Undershoot);
        assert!(report.events[0].wastegate_saturated);
    }

    #[test]
    fn test_vacuum_ignored() {
        let samples = [(0.0, 60.0, 130.0, 90.0, 0.0), (0.1, 95.0, 130.0, 90.0, 0.0)];
        let mut analyzer = BoostControlAnalyzer::default();
        let report = analyzer.analyze(&boost_log(&samples), None);
        assert_eq!(report.statistics.analyzed_samples, 0);
        assert!(report.events.is_empty());
    }

    #[test]
    fn test_requires_boost_column() {
        let log = LogData::new(
            vec!["Engine Speed (rpm)".to_string()],
            vec![LogRow::from_numbers(0.0, &[3000.0])],
        );
        let mut analyzer = BoostControlAnalyzer::default();
        let report = analyzer.analyze(&log, None);
        assert!(report.error.as_deref().is_some_and(|e| e.contains("actualBoost")));
    }
}
