//! Knock Detector
//!
//! Flags samples where the ECU is pulling timing, groups them into knock
//! events and checks how quickly the retard is removed afterwards.

use serde::{Deserialize, Serialize};

use super::{percent, require_rows, Accumulator, AnalysisReport, LogAnalyzer, Severity};
use crate::calibration::{self, Calibration, KnockParameters};
use crate::datalog::{ColumnResolver, LogData, LogRow, ResolvedColumns, Signal};
use crate::error::AnalysisError;
use crate::grouping::{group_by_window, Candidate, Group};
use crate::unit_conversion::lambda_to_afr;

/// Signals read by the knock detector
const SIGNALS: [Signal; 8] = [
    Signal::KnockRetard,
    Signal::Rpm,
    Signal::Throttle,
    Signal::Load,
    Signal::LambdaActual,
    Signal::BoostActual,
    Signal::CoolantTemp,
    Signal::IntakeTemp,
];

/// Knock detection thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KnockConfig {
    /// Retard must be more negative than this to count as knock
    pub detection_threshold: f64,
    /// Retard below this is critical (degrees)
    pub critical_threshold: f64,
    /// Retard below this is severe (degrees)
    pub severe_threshold: f64,
    /// Retard below this is moderate (degrees)
    pub moderate_threshold: f64,
    /// Added to every tier threshold below the low-load sensitivity point
    pub low_load_shift: f64,
    /// Grouping window (s)
    pub group_window: f64,
    /// Recovery scan limits
    pub recovery_max_samples: usize,
    /// Maximum recovery scan length (s)
    pub recovery_max_seconds: f64,
    /// Knock-control updates per second
    pub updates_per_second: f64,
    /// Recovery slower than this fraction of expected is "slow"
    pub slow_recovery_ratio: f64,
    /// Recovery runs longer than this are "persistent"
    pub persistent_samples: usize,
}

impl Default for KnockConfig {
    fn default() -> Self {
        Self {
            detection_threshold: -0.0001,
            critical_threshold: -6.0,
            severe_threshold: -4.0,
            moderate_threshold: -2.0,
            low_load_shift: 0.5,
            group_window: 0.1,
            recovery_max_samples: 100,
            recovery_max_seconds: 2.0,
            updates_per_second: 10.0,
            slow_recovery_ratio: 0.5,
            persistent_samples: 20,
        }
    }
}

/// Classify a knock retard value
///
/// Below the low-load sensitivity point every tier threshold moves up by
/// `low_load_shift`, so the same retard lands in a higher tier.
pub fn classify_knock(
    retard: f64,
    load: f64,
    params: &KnockParameters,
    config: &KnockConfig,
) -> Severity {
    let shift = if load < params.sensitivity_low_load {
        config.low_load_shift
    } else {
        0.0
    };

    if retard < config.critical_threshold + shift {
        Severity::Critical
    } else if retard < config.severe_threshold + shift {
        Severity::Severe
    } else if retard < config.moderate_threshold + shift {
        Severity::Moderate
    } else {
        Severity::Mild
    }
}

#[derive(Debug, Clone)]
struct KnockSample {
    index: usize,
    time: f64,
    retard: f64,
    severity: Severity,
    rpm: f64,
    throttle: f64,
    load: f64,
    afr: f64,
    boost: f64,
    coolant: f64,
    intake: f64,
    pe_mode: bool,
}

impl Candidate for KnockSample {
    type Kind = ();

    fn time(&self) -> f64 {
        self.time
    }

    fn kind(&self) {}
}

/// Knock event classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnockEventType {
    /// Timing pulled by knock control
    #[default]
    Knock,
}

impl KnockEventType {
    /// Stable identifier used in serialized output and issue lists
    pub fn as_str(&self) -> &'static str {
        match self {
            KnockEventType::Knock => "knock",
        }
    }
}

/// A grouped knock event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnockEvent {
    /// Time of the first grouped sample (s)
    pub time: f64,
    /// Time of the last grouped sample (s)
    pub end_time: f64,
    /// Span covered by the group (s)
    pub duration: f64,
    /// Event classification
    pub event_type: KnockEventType,
    /// Severity of the deepest retard
    pub severity: Severity,
    /// Most negative retard in the group
    pub knock_retard: f64,
    /// Mean engine speed (rpm)
    pub rpm: f64,
    /// Mean throttle (%)
    pub throttle: f64,
    /// Mean load (g/rev)
    pub load: f64,
    /// Mean AFR from the wideband, gasoline scale
    pub afr: f64,
    /// Mean boost (kPa)
    pub boost: f64,
    /// Mean coolant temperature (°C)
    pub coolant_temp: f64,
    /// Mean intake air temperature (°C)
    pub intake_temp: f64,
    /// Any grouped sample was in power enrichment
    #[serde(rename = "isPEMode")]
    pub is_pe_mode: bool,
    /// Peak retard reached the calibrated maximum
    pub at_max_retard: bool,
    /// Samples in the group
    pub event_count: usize,
    /// Degrees per second over the recovery run
    pub recovery_rate: Option<f64>,
    /// Samples in the recovery run
    pub recovery_samples: usize,
    /// Recovery slower than expected from the decay rate
    pub slow_recovery: bool,
    /// Recovery run longer than the persistent limit
    pub persistent_knock: bool,
    /// Row index of the last grouped sample
    #[serde(skip)]
    pub end_index: usize,
}

impl KnockEvent {
    fn from_group(group: &Group<KnockSample>, params: &KnockParameters) -> Self {
        let peak = group.peak_by(|s| -s.retard);
        let last = &group.members()[group.len() - 1];
        Self {
            time: group.start(),
            end_time: group.end(),
            duration: group.duration(),
            event_type: KnockEventType::Knock,
            severity: peak.severity,
            knock_retard: peak.retard,
            rpm: group.mean(|s| s.rpm),
            throttle: group.mean(|s| s.throttle),
            load: group.mean(|s| s.load),
            afr: group.mean(|s| s.afr),
            boost: group.mean(|s| s.boost),
            coolant_temp: group.mean(|s| s.coolant),
            intake_temp: group.mean(|s| s.intake),
            is_pe_mode: group.any(|s| s.pe_mode),
            at_max_retard: peak.retard.abs() >= params.retard_max,
            event_count: group.len(),
            recovery_rate: None,
            recovery_samples: 0,
            slow_recovery: false,
            persistent_knock: false,
            end_index: last.index,
        }
    }

    /// Follow the retard after the event until it clears
    fn analyze_recovery(
        &mut self,
        rows: &[LogRow],
        knock_col: usize,
        params: &KnockParameters,
        config: &KnockConfig,
    ) {
        let horizon = self.end_time + config.recovery_max_seconds;
        let run: Vec<(f64, f64)> = rows
            .iter()
            .skip(self.end_index + 1)
            .take(config.recovery_max_samples)
            .take_while(|row| row.time <= horizon)
            .map(|row| (row.time, row.number(knock_col)))
            .take_while(|(_, retard)| retard.is_finite() && *retard < config.detection_threshold)
            .collect();

        self.recovery_samples = run.len();
        if run.len() < 2 {
            return;
        }

        self.persistent_knock = run.len() > config.persistent_samples;

        let (t0, r0) = run[0];
        let (t1, r1) = run[run.len() - 1];
        let dt = t1 - t0;
        if dt <= 0.0 {
            return;
        }

        let rate = (r1 - r0) / dt;
        let expected = config.updates_per_second * params.retard_decay;
        self.recovery_rate = Some(rate);
        self.slow_recovery = expected > 0.0 && rate.abs() < config.slow_recovery_ratio * expected;
    }
}

/// Knock summary statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnockStatistics {
    /// Knock events
    pub total_events: usize,
    /// Events at critical severity
    pub critical_events: usize,
    /// Events at severe severity
    pub severe_events: usize,
    /// Events at moderate severity
    pub moderate_events: usize,
    /// Events at mild severity
    pub mild_events: usize,
    /// Samples with retard past the detection threshold
    pub knock_samples: usize,
    /// Most negative retard seen, 0 when none
    pub max_retard: f64,
    /// Mean retard over knock samples (degrees)
    pub average_retard: f64,
    /// Share of log time spent knocking (%)
    pub knock_time_pct: f64,
    /// Events with slow recovery
    pub slow_recovery_events: usize,
    /// Events with persistent knock
    pub persistent_events: usize,
    /// Events in power enrichment
    pub pe_mode_events: usize,
    /// Events at the calibrated maximum retard
    pub max_retard_events: usize,
    /// Lowest and highest rpm among knock samples
    pub rpm_range: Option<(f64, f64)>,
    /// First and last knock sample times (s)
    pub time_range: Option<(f64, f64)>,
}

/// Report produced by [`KnockDetector`]
pub type KnockReport = AnalysisReport<KnockEvent, KnockStatistics>;

/// Knock retard analyzer
#[derive(Debug, Clone, Default)]
pub struct KnockDetector {
    config: KnockConfig,
    resolver: ColumnResolver,
    last: Option<KnockReport>,
}

impl KnockDetector {
    /// Create a detector with explicit thresholds and column overrides
    pub fn new(config: KnockConfig, resolver: ColumnResolver) -> Self {
        Self {
            config,
            resolver,
            last: None,
        }
    }

    /// Active thresholds
    pub fn config(&self) -> &KnockConfig {
        &self.config
    }

    fn detect(
        &self,
        log: &LogData,
        calibration: Option<&Calibration>,
        columns: &ResolvedColumns,
    ) -> Result<(Vec<KnockEvent>, KnockStatistics), AnalysisError> {
        require_rows(log)?;
        let Some(knock_col) = columns.index(Signal::KnockRetard) else {
            return Ok((Vec::new(), KnockStatistics::default()));
        };
        let rpm_col = columns.require(Signal::Rpm, "engine speed")?;

        let params = calibration::knock_parameters(calibration);
        let throttle_col = columns.index(Signal::Throttle);
        let load_col = columns.index(Signal::Load);
        let lambda_col = columns.index(Signal::LambdaActual);
        let boost_col = columns.index(Signal::BoostActual);
        let coolant_col = columns.index(Signal::CoolantTemp);
        let intake_col = columns.index(Signal::IntakeTemp);

        let mut candidates = Vec::new();
        let mut retard_stats = Accumulator::default();
        let mut rpm_stats = Accumulator::default();
        let mut time_stats = Accumulator::default();

        for (index, row) in log.rows().iter().enumerate() {
            let retard = row.number(knock_col);
            let rpm = row.number(rpm_col);
            if !retard.is_finite()
                || retard >= self.config.detection_threshold
                || rpm < params.rpm_min
            {
                continue;
            }

            let load = row.get_or_zero(load_col);
            let throttle = row.get_or_zero(throttle_col);
            let severity = classify_knock(retard, load, &params, &self.config);

            retard_stats.push(retard);
            rpm_stats.push(rpm);
            time_stats.push(row.time);

            candidates.push(KnockSample {
                index,
                time: row.time,
                retard,
                severity,
                rpm,
                throttle,
                load,
                afr: lambda_to_afr(row.get_or_zero(lambda_col)),
                boost: row.get_or_zero(boost_col),
                coolant: row.get_or_zero(coolant_col),
                intake: row.get_or_zero(intake_col),
                pe_mode: calibration::pe_mode_active(calibration, rpm, load, throttle),
            });
        }

        let groups = group_by_window(candidates, self.config.group_window);
        let mut events: Vec<KnockEvent> = groups
            .iter()
            .map(|g| KnockEvent::from_group(g, &params))
            .collect();

        for event in &mut events {
            event.analyze_recovery(log.rows(), knock_col, &params, &self.config);
        }

        let count = |sev: Severity| events.iter().filter(|e| e.severity == sev).count();
        let knock_time: f64 = events.iter().map(|e| e.duration).sum();
        let statistics = KnockStatistics {
            total_events: events.len(),
            critical_events: count(Severity::Critical),
            severe_events: count(Severity::Severe),
            moderate_events: count(Severity::Moderate),
            mild_events: count(Severity::Mild),
            knock_samples: retard_stats.count,
            max_retard: retard_stats.min_or_zero(),
            average_retard: retard_stats.mean(),
            knock_time_pct: percent(knock_time, log.duration()),
            slow_recovery_events: events.iter().filter(|e| e.slow_recovery).count(),
            persistent_events: events.iter().filter(|e| e.persistent_knock).count(),
            pe_mode_events: events.iter().filter(|e| e.is_pe_mode).count(),
            max_retard_events: events.iter().filter(|e| e.at_max_retard).count(),
            rpm_range: rpm_stats.range(),
            time_range: time_stats.range(),
        };

        Ok((events, statistics))
    }
}

impl LogAnalyzer for KnockDetector {
    type Event = KnockEvent;
    type Statistics = KnockStatistics;

    fn id(&self) -> &'static str {
        "knock"
    }

    fn analyze(&mut self, log: &LogData, calibration: Option<&Calibration>) -> &KnockReport {
        let columns = ResolvedColumns::resolve(&self.resolver, log, &SIGNALS);
        let mut warnings = Vec::new();
        if columns.index(Signal::KnockRetard).is_none() && !log.is_empty() {
            warnings.push("Knock retard column not found; no knock events reported".to_string());
        }
        let result = self.detect(log, calibration, &columns);
        let report = AnalysisReport::from_result(self.id(), result, &columns, warnings);
        self.last.insert(report)
    }

    fn last_report(&self) -> Option<&KnockReport> {
        self.last.as_ref()
    }
}
