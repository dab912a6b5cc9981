//! Load Limit Analyzer
//!
//! Compares calculated load with the RPM-indexed load limit and flags
//! samples at or beyond it.

use serde::{Deserialize, Serialize};

use super::{percent, require_rows, Accumulator, AnalysisReport, LogAnalyzer, Severity};
use crate::calibration::{interpolate_1d, names, Calibration};
use crate::datalog::{ColumnResolver, LogData, ResolvedColumns, Signal};
use crate::error::AnalysisError;
use crate::grouping::{group_by_window, Candidate, Group};

const SIGNALS: [Signal; 4] = [
    Signal::Load,
    Signal::Rpm,
    Signal::Throttle,
    Signal::InjectorPulseWidth,
];

/// Load limit curve used when the calibration has none: 800-6800 rpm in
/// 400 rpm steps, 1.28-2.54 g/rev
pub fn default_load_limit_curve() -> (Vec<f64>, Vec<f64>) {
    let rpm = (0..16).map(|i| 800.0 + 400.0 * i as f64).collect();
    let load = (0..16).map(|i| 1.28 + 0.084 * i as f64).collect();
    (rpm, load)
}

/// Load limit thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoadLimitConfig {
    /// Ratio at which a sample is near the limit
    pub near_limit_ratio: f64,
    /// Injector pulse width below this is a fuel cut (ms)
    pub fuel_cut_pulse_width: f64,
    /// Grouping window (s)
    pub group_window: f64,
}

impl Default for LoadLimitConfig {
    fn default() -> Self {
        Self {
            near_limit_ratio: 0.9,
            fuel_cut_pulse_width: 0.1,
            group_window: 0.5,
        }
    }
}

/// Load limit event classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadLimitEventType {
    /// Load above the calibrated limit
    LimitViolation,
    /// Load within the near-limit ratio of the limit
    NearLimit,
}

impl LoadLimitEventType {
    /// Stable identifier used in serialized output and issue lists
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadLimitEventType::LimitViolation => "limit_violation",
            LoadLimitEventType::NearLimit => "near_limit",
        }
    }
}

#[derive(Debug, Clone)]
struct LoadSample {
    time: f64,
    kind: LoadLimitEventType,
    load: f64,
    limit: f64,
    ratio: f64,
    rpm: f64,
    throttle: f64,
    fuel_cut: bool,
}

impl Candidate for LoadSample {
    type Kind = LoadLimitEventType;

    fn time(&self) -> f64 {
        self.time
    }

    fn kind(&self) -> LoadLimitEventType {
        self.kind
    }
}

/// A grouped load limit event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadLimitEvent {
    /// Time of the first grouped sample (s)
    pub time: f64,
    /// Time of the last grouped sample (s)
    pub end_time: f64,
    /// Span covered by the group (s)
    pub duration: f64,
    /// Event classification
    pub event_type: LoadLimitEventType,
    /// Critical for violations, severe otherwise
    pub severity: Severity,
    /// Load at the highest-ratio sample (g/rev)
    pub load: f64,
    /// Limit at that sample (g/rev)
    pub load_limit: f64,
    /// Load over limit at that sample
    pub load_ratio: f64,
    /// Engine speed at that sample (rpm)
    pub rpm: f64,
    /// Throttle at that sample (%)
    pub throttle: f64,
    /// Highest load in the group (g/rev)
    pub peak_load: f64,
    /// Any grouped sample was in fuel cut
    pub fuel_cut: bool,
    /// Samples in the group
    pub event_count: usize,
}

impl LoadLimitEvent {
    fn from_group(group: &Group<LoadSample>) -> Self {
        let peak = group.peak_by(|s| s.ratio);
        Self {
            time: group.start(),
            end_time: group.end(),
            duration: group.duration(),
            event_type: group.kind(),
            severity: match group.kind() {
                LoadLimitEventType::LimitViolation => Severity::Critical,
                LoadLimitEventType::NearLimit => Severity::Severe,
            },
            load: peak.load,
            load_limit: peak.limit,
            load_ratio: peak.ratio,
            rpm: peak.rpm,
            throttle: peak.throttle,
            peak_load: group.max(|s| s.load),
            fuel_cut: group.any(|s| s.fuel_cut),
            event_count: group.len(),
        }
    }
}

/// Load limit summary statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadLimitStatistics {
    /// Samples with a usable load and limit
    pub analyzed_samples: usize,
    /// Highest load (g/rev)
    pub max_load: f64,
    /// Highest load over limit ratio
    pub max_ratio: f64,
    /// Mean load over limit ratio
    pub average_ratio: f64,
    /// Share of samples at or past the near-limit ratio (%)
    pub time_near_limit_pct: f64,
    /// Events of every type
    pub total_events: usize,
    /// Limit violation events
    pub violation_events: usize,
    /// Near-limit events
    pub near_limit_events: usize,
    /// Events with a fuel cut
    pub fuel_cut_events: usize,
    /// The built-in curve was used instead of a calibrated limit
    pub used_default_limit: bool,
}

/// Report produced by [`LoadLimitAnalyzer`]
pub type LoadLimitReport = AnalysisReport<LoadLimitEvent, LoadLimitStatistics>;

/// Load limit analyzer
#[derive(Debug, Clone, Default)]
pub struct LoadLimitAnalyzer {
    config: LoadLimitConfig,
    resolver: ColumnResolver,
    last: Option<LoadLimitReport>,
}

impl LoadLimitAnalyzer {
    /// Create an analyzer with explicit thresholds and column overrides
    pub fn new(config: LoadLimitConfig, resolver: ColumnResolver) -> Self {
        Self {
            config,
            resolver,
            last: None,
        }
    }

    /// Active thresholds
    pub fn config(&self) -> &LoadLimitConfig {
        &self.config
    }

    fn run(
        &self,
        log: &LogData,
        calibration: Option<&Calibration>,
        columns: &ResolvedColumns,
    ) -> Result<(Vec<LoadLimitEvent>, LoadLimitStatistics), AnalysisError> {
        require_rows(log)?;
        let load_col = columns.require(Signal::Load, "engine load")?;
        let rpm_col = columns.require(Signal::Rpm, "engine speed")?;
        let throttle_col = columns.index(Signal::Throttle);
        let ipw_col = columns.index(Signal::InjectorPulseWidth);

        let (default_rpm, default_load) = default_load_limit_curve();
        let calibrated = calibration.is_some_and(|c| c.table(names::LOAD_LIMIT).is_some());
        let limit_at = |rpm: f64| {
            calibration
                .and_then(|c| c.load_limit(rpm))
                .unwrap_or_else(|| interpolate_1d(&default_rpm, &default_load, rpm))
        };

        let mut loads = Accumulator::default();
        let mut ratios = Accumulator::default();
        let mut near = 0usize;
        let mut candidates = Vec::new();

        for row in log.rows() {
            let load = row.number(load_col);
            let rpm = row.number(rpm_col);
            let limit = limit_at(rpm);
            if !load.is_finite() || !limit.is_finite() || limit <= 0.0 {
                continue;
            }

            let ratio = load / limit;
            loads.push(load);
            ratios.push(ratio);

            let kind = if load > limit {
                LoadLimitEventType::LimitViolation
            } else if ratio >= self.config.near_limit_ratio {
                LoadLimitEventType::NearLimit
            } else {
                continue;
            };
            near += 1;

            candidates.push(LoadSample {
                time: row.time,
                kind,
                load,
                limit,
                ratio,
                rpm,
                throttle: row.get_or_zero(throttle_col),
                fuel_cut: row
                    .get(ipw_col)
                    .is_some_and(|ipw| ipw < self.config.fuel_cut_pulse_width),
            });
        }

        let events: Vec<LoadLimitEvent> = group_by_window(candidates, self.config.group_window)
            .iter()
            .map(LoadLimitEvent::from_group)
            .collect();

        let by_type = |t: LoadLimitEventType| events.iter().filter(|e| e.event_type == t).count();
        let statistics = LoadLimitStatistics {
            analyzed_samples: loads.count,
            max_load: loads.max_or_zero(),
            max_ratio: ratios.max_or_zero(),
            average_ratio: ratios.mean(),
            time_near_limit_pct: percent(near as f64, loads.count as f64),
            total_events: events.len(),
            violation_events: by_type(LoadLimitEventType::LimitViolation),
            near_limit_events: by_type(LoadLimitEventType::NearLimit),
            fuel_cut_events: events.iter().filter(|e| e.fuel_cut).count(),
            used_default_limit: !calibrated,
        };

        Ok((events, statistics))
    }
}

impl LogAnalyzer for LoadLimitAnalyzer {
    type Event = LoadLimitEvent;
    type Statistics = LoadLimitStatistics;

    fn id(&self) -> &'static str {
        "load"
    }

    fn analyze(&mut self, log: &LogData, calibration: Option<&Calibration>) -> &LoadLimitReport {
        let columns = ResolvedColumns::resolve(&self.resolver, log, &SIGNALS);
        let result = self.run(log, calibration, &columns);
        let report = AnalysisReport::from_result(self.id(), result, &columns, Vec::new());
        self.last.insert(report)
    }

    fn last_report(&self) -> Option<&LoadLimitReport> {
        self.last.as_ref()
    }
}
