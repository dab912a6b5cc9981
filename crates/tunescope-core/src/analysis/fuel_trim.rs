//! Fuel Trim Analyzers
//!
//! Short-term and long-term fuel trim share one analyzer; the variant picks
//! the signal and the defaults. Short-term trim is also checked while power
//! enrichment runs open loop, where it should sit near zero.

use serde::{Deserialize, Serialize};

use super::{percent, require_rows, Accumulator, AnalysisReport, LogAnalyzer, Severity};
use crate::calibration::{self, Calibration};
use crate::datalog::{ColumnResolver, LogData, ResolvedColumns, Signal};
use crate::error::AnalysisError;
use crate::grouping::{group_by_window, retain_min_duration, Candidate, Group};

/// Which fuel trim an analyzer reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrimVariant {
    /// Short-term (per-sample) trim
    ShortTerm,
    /// Long-term (learned) trim
    LongTerm,
}

impl TrimVariant {
    /// Log signal carrying this trim
    pub fn signal(&self) -> Signal {
        match self {
            TrimVariant::ShortTerm => Signal::ShortTermTrim,
            TrimVariant::LongTerm => Signal::LongTermTrim,
        }
    }

    /// Short identifier, matching the issue source ids
    pub fn id(&self) -> &'static str {
        match self {
            TrimVariant::ShortTerm => "stft",
            TrimVariant::LongTerm => "ltft",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TrimVariant::ShortTerm => "short-term fuel trim",
            TrimVariant::LongTerm => "long-term fuel trim",
        }
    }
}

/// Fuel trim thresholds (%)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FuelTrimConfig {
    /// |trim| beyond this is abnormal
    pub threshold: f64,
    /// |trim| at or beyond this is severe
    pub severe_threshold: f64,
    /// |trim| at or beyond this is critical
    pub critical_threshold: f64,
    /// |trim| beyond this is abnormal while open loop (short-term only)
    pub pe_threshold: f64,
    /// Coolant below this is a cold start (°C)
    pub cold_start_coolant: f64,
    /// Throttle above this marks acceleration (%)
    pub acceleration_throttle: f64,
    /// Load above this marks acceleration (g/rev)
    pub acceleration_load: f64,
    /// Grouping window (s)
    pub group_window: f64,
    /// Events shorter than this are dropped (s)
    pub min_duration: f64,
}

impl FuelTrimConfig {
    /// Defaults for short-term trim
    pub fn short_term() -> Self {
        Self {
            threshold: 10.0,
            severe_threshold: 20.0,
            critical_threshold: 25.0,
            pe_threshold: 5.0,
            cold_start_coolant: 60.0,
            acceleration_throttle: 50.0,
            acceleration_load: 1.0,
            group_window: 0.5,
            min_duration: 0.3,
        }
    }

    /// Defaults for long-term trim: tighter threshold, same tiers
    pub fn long_term() -> Self {
        Self {
            threshold: 8.0,
            ..Self::short_term()
        }
    }

    /// Severity tier for a trim magnitude
    pub fn classify(&self, trim: f64) -> Severity {
        let magnitude = trim.abs();
        if magnitude >= self.critical_threshold {
            Severity::Critical
        } else if magnitude >= self.severe_threshold {
            Severity::Severe
        } else {
            Severity::Moderate
        }
    }
}

impl Default for FuelTrimConfig {
    fn default() -> Self {
        Self::short_term()
    }
}

/// Fuel trim event classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuelTrimEventType {
    /// Trim above +threshold (adding fuel)
    Positive,
    /// Trim below -threshold (pulling fuel)
    Negative,
    /// Short-term trim away from zero while open loop
    PeActiveTrim,
}

impl FuelTrimEventType {
    /// Stable identifier used in serialized output and issue lists
    pub fn as_str(&self) -> &'static str {
        match self {
            FuelTrimEventType::Positive => "positive",
            FuelTrimEventType::Negative => "negative",
            FuelTrimEventType::PeActiveTrim => "pe_active_trim",
        }
    }
}

#[derive(Debug, Clone)]
struct TrimSample {
    time: f64,
    kind: FuelTrimEventType,
    severity: Severity,
    trim: f64,
    rpm: f64,
    load: f64,
    throttle: f64,
    coolant: f64,
    cold_start: bool,
    acceleration: bool,
}

impl Candidate for TrimSample {
    type Kind = FuelTrimEventType;

    fn time(&self) -> f64 {
        self.time
    }

    fn kind(&self) -> FuelTrimEventType {
        self.kind
    }
}

/// A grouped fuel trim event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelTrimEvent {
    /// Time of the first grouped sample (s)
    pub time: f64,
    /// Time of the last grouped sample (s)
    pub end_time: f64,
    /// Span covered by the group (s)
    pub duration: f64,
    /// Event classification
    pub event_type: FuelTrimEventType,
    /// Severity of the sample furthest from zero
    pub severity: Severity,
    /// Trim of the sample furthest from zero
    pub trim: f64,
    /// Mean trim over the group (%)
    pub average_trim: f64,
    /// Mean engine speed (rpm)
    pub rpm: f64,
    /// Mean load (g/rev)
    pub load: f64,
    /// Mean throttle (%)
    pub throttle: f64,
    /// Mean coolant temperature (°C)
    pub coolant_temp: f64,
    /// Any grouped sample was a cold start
    pub is_cold_start: bool,
    /// Any grouped sample was under acceleration
    pub is_acceleration: bool,
    /// Samples in the group
    pub event_count: usize,
}

impl FuelTrimEvent {
    fn from_group(group: &Group<TrimSample>) -> Self {
        let peak = group.peak_by(|s| s.trim.abs());
        Self {
            time: group.start(),
            end_time: group.end(),
            duration: group.duration(),
            event_type: group.kind(),
            severity: peak.severity,
            trim: peak.trim,
            average_trim: group.mean(|s| s.trim),
            rpm: group.mean(|s| s.rpm),
            load: group.mean(|s| s.load),
            throttle: group.mean(|s| s.throttle),
            coolant_temp: group.mean(|s| s.coolant),
            is_cold_start: group.any(|s| s.cold_start),
            is_acceleration: group.any(|s| s.acceleration),
            event_count: group.len(),
        }
    }
}

/// Fuel trim summary statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelTrimStatistics {
    /// Closed-loop samples in the standard statistics
    pub analyzed_samples: usize,
    /// Mean signed trim (%)
    pub average_trim: f64,
    /// Mean absolute trim (%)
    pub average_abs_trim: f64,
    /// Largest positive trim (%)
    pub max_positive: f64,
    /// Largest negative trim (%)
    pub max_negative: f64,
    /// Share of samples within the threshold (%)
    pub within_threshold_pct: f64,
    /// Open-loop samples tracked separately (short-term only)
    pub pe_samples: usize,
    /// Mean open-loop trim (%)
    pub pe_average_trim: f64,
    /// Open-loop samples beyond the PE threshold
    pub pe_abnormal_samples: usize,
    /// Events of every type
    pub total_events: usize,
    /// Positive trim events
    pub positive_events: usize,
    /// Negative trim events
    pub negative_events: usize,
    /// Trim-while-open-loop events
    pub pe_events: usize,
    /// Events at critical severity
    pub critical_events: usize,
    /// Events at severe severity
    pub severe_events: usize,
    /// Events during a cold start
    pub cold_start_events: usize,
}

/// Report produced by [`FuelTrimAnalyzer`]
pub type FuelTrimReport = AnalysisReport<FuelTrimEvent, FuelTrimStatistics>;

/// Fuel trim analyzer for one trim variant
#[derive(Debug, Clone)]
pub struct FuelTrimAnalyzer {
    variant: TrimVariant,
    config: FuelTrimConfig,
    resolver: ColumnResolver,
    last: Option<FuelTrimReport>,
}

impl FuelTrimAnalyzer {
    /// Create an analyzer with explicit thresholds and column overrides
    pub fn new(variant: TrimVariant, config: FuelTrimConfig, resolver: ColumnResolver) -> Self {
        Self {
            variant,
            config,
            resolver,
            last: None,
        }
    }

    /// Short-term trim analyzer with default thresholds
    pub fn short_term(resolver: ColumnResolver) -> Self {
        Self::new(TrimVariant::ShortTerm, FuelTrimConfig::short_term(), resolver)
    }

    /// Long-term trim analyzer with default thresholds
    pub fn long_term(resolver: ColumnResolver) -> Self {
        Self::new(TrimVariant::LongTerm, FuelTrimConfig::long_term(), resolver)
    }

    /// Trim this analyzer reads
    pub fn variant(&self) -> TrimVariant {
        self.variant
    }

    /// Active thresholds
    pub fn config(&self) -> &FuelTrimConfig {
        &self.config
    }

    fn signals(&self) -> [Signal; 5] {
        [
            self.variant.signal(),
            Signal::Rpm,
            Signal::Load,
            Signal::Throttle,
            Signal::CoolantTemp,
        ]
    }

    fn run(
        &self,
        log: &LogData,
        calibration: Option<&Calibration>,
        columns: &ResolvedColumns,
    ) -> Result<(Vec<FuelTrimEvent>, FuelTrimStatistics), AnalysisError> {
        require_rows(log)?;
        let trim_col = columns.require(self.variant.signal(), self.variant.label())?;
        let rpm_col = columns.index(Signal::Rpm);
        let load_col = columns.index(Signal::Load);
        let throttle_col = columns.index(Signal::Throttle);
        let coolant_col = columns.index(Signal::CoolantTemp);
        let check_pe = self.variant == TrimVariant::ShortTerm;

        let mut trims = Accumulator::default();
        let mut pe_trims = Accumulator::default();
        let mut within = 0usize;
        let mut pe_abnormal = 0usize;
        let mut candidates = Vec::new();

        for row in log.rows() {
            let trim = row.number(trim_col);
            if !trim.is_finite() {
                continue;
            }

            let rpm = row.get_or_zero(rpm_col);
            let load = row.get_or_zero(load_col);
            let throttle = row.get_or_zero(throttle_col);
            let coolant = row.get(coolant_col);
            let pe_mode = check_pe && calibration::pe_mode_active(calibration, rpm, load, throttle);

            let (kind, severity) = if pe_mode {
                pe_trims.push(trim);
                if trim.abs() <= self.config.pe_threshold {
                    continue;
                }
                pe_abnormal += 1;
                (FuelTrimEventType::PeActiveTrim, Severity::Severe)
            } else {
                trims.push(trim);
                if trim > self.config.threshold {
                    (FuelTrimEventType::Positive, self.config.classify(trim))
                } else if trim < -self.config.threshold {
                    (FuelTrimEventType::Negative, self.config.classify(trim))
                } else {
                    within += 1;
                    continue;
                }
            };

            candidates.push(TrimSample {
                time: row.time,
                kind,
                severity,
                trim,
                rpm,
                load,
                throttle,
                coolant: coolant.unwrap_or(0.0),
                cold_start: coolant.is_some_and(|c| c < self.config.cold_start_coolant),
                acceleration: throttle > self.config.acceleration_throttle
                    && load > self.config.acceleration_load,
            });
        }

        let mut groups = group_by_window(candidates, self.config.group_window);
        retain_min_duration(&mut groups, |_| Some(self.config.min_duration));
        let events: Vec<FuelTrimEvent> = groups.iter().map(FuelTrimEvent::from_group).collect();

        let by_type = |t: FuelTrimEventType| events.iter().filter(|e| e.event_type == t).count();
        let by_severity = |s: Severity| events.iter().filter(|e| e.severity == s).count();
        let statistics = FuelTrimStatistics {
            analyzed_samples: trims.count,
            average_trim: trims.mean(),
            average_abs_trim: trims.mean_abs(),
            max_positive: trims.max_or_zero().max(0.0),
            max_negative: trims.min_or_zero().min(0.0),
            within_threshold_pct: percent(within as f64, trims.count as f64),
            pe_samples: pe_trims.count,
            pe_average_trim: pe_trims.mean(),
            pe_abnormal_samples: pe_abnormal,
            total_events: events.len(),
            positive_events: by_type(FuelTrimEventType::Positive),
            negative_events: by_type(FuelTrimEventType::Negative),
            pe_events: by_type(FuelTrimEventType::PeActiveTrim),
            critical_events: by_severity(Severity::Critical),
            severe_events: by_severity(Severity::Severe),
            cold_start_events: events.iter().filter(|e| e.is_cold_start).count(),
        };

        Ok((events, statistics))
    }
}

impl LogAnalyzer for FuelTrimAnalyzer {
    type Event = FuelTrimEvent;
    type Statistics = FuelTrimStatistics;

    fn id(&self) -> &'static str {
        self.variant.id()
    }

    fn analyze(&mut self, log: &LogData, calibration: Option<&Calibration>) -> &FuelTrimReport {
        let columns = ResolvedColumns::resolve(&self.resolver, log, &self.signals());
        let result = self.run(log, calibration, &columns);
        let report = AnalysisReport::from_result(self.id(), result, &columns, Vec::new());
        self.last.insert(report)
    }

    fn last_report(&self) -> Option<&FuelTrimReport> {
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{names, CalibrationTable};
    use crate::datalog::LogRow;

    /// (time, stft, ltft, throttle, load, coolant)
    fn trim_log(samples: &[(f64, f64, f64, f64, f64, f64)]) -> LogData {
        let channels = [
            "Time (s)",
            "Engine Speed (rpm)",
            "Fuel Trim - Short Term (%)",
            "Fuel Trim - Long Term (%)",
            "Throttle Position (%)",
            "Engine Load (g/rev)",
            "Coolant Temperature (°C)",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let rows = samples
            .iter()
            .map(|&(t, stft, ltft, tps, load, clt)| {
                LogRow::from_numbers(t, &[t, 3000.0, stft, ltft, tps, load, clt])
            })
            .collect();
        LogData::new(channels, rows)
    }

    fn steady(trim: f64, count: usize, step: f64) -> Vec<(f64, f64, f64, f64, f64, f64)> {
        (0..count)
            .map(|i| (i as f64 * step, trim, trim, 20.0, 0.6, 90.0))
            .collect()
    }

    #[test]
    fn test_tiers() {
        let config = FuelTrimConfig::short_term();
        assert_eq!(config.classify(12.0), Severity::Moderate);
        assert_eq!(config.classify(-20.0), Severity::Severe);
        assert_eq!(config.classify(25.0), Severity::Critical);
    }

    #[test]
    fn test_positive_event() {
        let mut analyzer = FuelTrimAnalyzer::short_term(ColumnResolver::new());
        let report = analyzer.analyze(&trim_log(&steady(15.0, 5, 0.1)), None);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].event_type, FuelTrimEventType::Positive);
        assert_eq!(report.events[0].severity, Severity::Moderate);
        assert_eq!(report.events[0].event_count, 5);
    }

    #[test]
    fn test_transient_removed() {
        let mut analyzer = FuelTrimAnalyzer::short_term(ColumnResolver::new());
        let report = analyzer.analyze(&trim_log(&steady(15.0, 2, 0.1)), None);
        assert!(report.events.is_empty());
        assert_eq!(report.statistics.analyzed_samples, 2);
    }

    #[test]
    fn test_long_term_threshold() {
        let log = trim_log(&steady(9.0, 5, 0.1));
        let mut stft = FuelTrimAnalyzer::short_term(ColumnResolver::new());
        let mut ltft = FuelTrimAnalyzer::long_term(ColumnResolver::new());
        assert!(stft.analyze(&log, None).events.is_empty());
        assert_eq!(ltft.analyze(&log, None).events.len(), 1);
        assert_eq!(ltft.id(), "ltft");
    }

    #[test]
    fn test_pe_samples_tracked_separately() {
        let mut cal = Calibration::new("pe");
        cal.set_table(
            names::PE_ENABLE_LOAD,
            CalibrationTable::new_1d(vec![1000.0, 7000.0], vec![1.0, 1.0]),
        );
        cal.set_table(
            names::PE_ENABLE_TPS,
            CalibrationTable::new_1d(vec![1000.0, 7000.0], vec![50.0, 50.0]),
        );
        let samples: Vec<_> = (0..5)
            .map(|i| (i as f64 * 0.1, 7.0, 0.0, 80.0, 1.5, 90.0))
            .collect();

        let mut analyzer = FuelTrimAnalyzer::short_term(ColumnResolver::new());
        let report = analyzer.analyze(&trim_log(&samples), Some(&cal));
        assert_eq!(report.statistics.analyzed_samples, 0);
        assert_eq!(report.statistics.pe_samples, 5);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].event_type, FuelTrimEventType::PeActiveTrim);
        assert_eq!(report.events[0].severity, Severity::Severe);
        assert!(report.events[0].is_acceleration);
    }

    #[test]
    fn test_cold_start_flag() {
        let samples: Vec<_> = (0..5)
            .map(|i| (i as f64 * 0.1, 18.0, 0.0, 10.0, 0.4, 40.0))
            .collect();
        let mut analyzer = FuelTrimAnalyzer::short_term(ColumnResolver::new());
        let report = analyzer.analyze(&trim_log(&samples), None);
        assert!(report.events[0].is_cold_start);
        assert_eq!(report.statistics.cold_start_events, 1);
    }
}
