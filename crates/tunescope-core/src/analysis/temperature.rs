//! Temperature Analyzers
//!
//! Threshold checks for coolant and intake air temperature.

use serde::{Deserialize, Serialize};

use super::{percent, require_rows, Accumulator, AnalysisReport, LogAnalyzer, Severity};
use crate::calibration::Calibration;
use crate::datalog::{ColumnResolver, LogData, ResolvedColumns, Signal};
use crate::error::AnalysisError;
use crate::grouping::{group_by_window, Candidate, Group};

/// Which temperature an analyzer reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemperatureSensor {
    /// Engine coolant
    Coolant,
    /// Intake air
    Intake,
}

impl TemperatureSensor {
    /// Log signal carrying this temperature
    pub fn signal(&self) -> Signal {
        match self {
            TemperatureSensor::Coolant => Signal::CoolantTemp,
            TemperatureSensor::Intake => Signal::IntakeTemp,
        }
    }

    /// Short identifier, matching the issue source ids
    pub fn id(&self) -> &'static str {
        match self {
            TemperatureSensor::Coolant => "coolant",
            TemperatureSensor::Intake => "intake",
        }
    }

    /// Classification and severity above the first threshold
    fn elevated(&self) -> (TemperatureEventType, Severity) {
        match self {
            TemperatureSensor::Coolant => (TemperatureEventType::Warning, Severity::Severe),
            TemperatureSensor::Intake => (TemperatureEventType::High, Severity::Moderate),
        }
    }
}

/// Temperature thresholds (°C)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TemperatureConfig {
    /// At or below this is too cold, when set
    pub low_threshold: Option<f64>,
    /// At or above this is elevated
    pub high_threshold: f64,
    /// At or above this is critical
    pub critical_threshold: f64,
    /// Grouping window (s)
    pub group_window: f64,
}

impl TemperatureConfig {
    /// Defaults for coolant
    pub fn coolant() -> Self {
        Self {
            low_threshold: None,
            high_threshold: 100.0,
            critical_threshold: 110.0,
            group_window: 1.0,
        }
    }

    /// Defaults for intake air
    pub fn intake() -> Self {
        Self {
            low_threshold: Some(0.0),
            high_threshold: 50.0,
            critical_threshold: 65.0,
            group_window: 0.5,
        }
    }
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self::coolant()
    }
}

/// Temperature event classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureEventType {
    /// At or below the low threshold
    Low,
    /// Elevated coolant
    Warning,
    /// Elevated intake air
    High,
    /// At or above the critical threshold
    Critical,
}

impl TemperatureEventType {
    /// Stable identifier used in serialized output and issue lists
    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureEventType::Low => "low",
            TemperatureEventType::Warning => "warning",
            TemperatureEventType::High => "high",
            TemperatureEventType::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone)]
struct TemperatureSample {
    time: f64,
    kind: TemperatureEventType,
    severity: Severity,
    temperature: f64,
    rpm: f64,
    fan_on: bool,
}

impl Candidate for TemperatureSample {
    type Kind = TemperatureEventType;

    fn time(&self) -> f64 {
        self.time
    }

    fn kind(&self) -> TemperatureEventType {
        self.kind
    }
}

/// A grouped temperature event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureEvent {
    /// Time of the first grouped sample (s)
    pub time: f64,
    /// Time of the last grouped sample (s)
    pub end_time: f64,
    /// Span covered by the group (s)
    pub duration: f64,
    /// Event classification
    pub event_type: TemperatureEventType,
    /// Severity of the extreme sample
    pub severity: Severity,
    /// Extreme temperature in the event (lowest for `low`, highest otherwise)
    pub temperature: f64,
    /// Mean temperature over the group (°C)
    pub average_temperature: f64,
    /// Mean engine speed (rpm)
    pub rpm: f64,
    /// Any grouped sample had the fan on
    pub fan_on: bool,
    /// Samples in the group
    pub event_count: usize,
}

impl TemperatureEvent {
    fn from_group(group: &Group<TemperatureSample>) -> Self {
        let peak = match group.kind() {
            TemperatureEventType::Low => group.peak_by(|s| -s.temperature),
            _ => group.peak_by(|s| s.temperature),
        };
        Self {
            time: group.start(),
            end_time: group.end(),
            duration: group.duration(),
            event_type: group.kind(),
            severity: peak.severity,
            temperature: peak.temperature,
            average_temperature: group.mean(|s| s.temperature),
            rpm: group.mean(|s| s.rpm),
            fan_on: group.any(|s| s.fan_on),
            event_count: group.len(),
        }
    }
}

/// Temperature summary statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureStatistics {
    /// Samples with a usable temperature
    pub analyzed_samples: usize,
    /// Lowest temperature (°C)
    pub min_temperature: f64,
    /// Highest temperature (°C)
    pub max_temperature: f64,
    /// Mean temperature (°C)
    pub average_temperature: f64,
    /// Share of samples at or above the elevated threshold
    pub time_elevated_pct: f64,
    /// Share of samples with the fan on, when the fan is logged
    pub fan_on_pct: Option<f64>,
    /// Events of every type
    pub total_events: usize,
    /// Low events
    pub low_events: usize,
    /// Warning or high events
    pub elevated_events: usize,
    /// Critical events
    pub critical_events: usize,
}

/// Report produced by [`TemperatureAnalyzer`]
pub type TemperatureReport = AnalysisReport<TemperatureEvent, TemperatureStatistics>;

/// Temperature analyzer for one sensor
#[derive(Debug, Clone)]
pub struct TemperatureAnalyzer {
    sensor: TemperatureSensor,
    config: TemperatureConfig,
    resolver: ColumnResolver,
    last: Option<TemperatureReport>,
}

impl TemperatureAnalyzer {
    /// Create an analyzer for one sensor with explicit thresholds and column overrides
    pub fn new(sensor: TemperatureSensor, config: TemperatureConfig, resolver: ColumnResolver) -> Self {
        Self {
            sensor,
            config,
            resolver,
            last: None,
        }
    }

    /// Coolant analyzer with default thresholds
    pub fn coolant(resolver: ColumnResolver) -> Self {
        Self::new(TemperatureSensor::Coolant, TemperatureConfig::coolant(), resolver)
    }

    /// Intake air analyzer with default thresholds
    pub fn intake(resolver: ColumnResolver) -> Self {
        Self::new(TemperatureSensor::Intake, TemperatureConfig::intake(), resolver)
    }

    /// Sensor this analyzer reads
    pub fn sensor(&self) -> TemperatureSensor {
        self.sensor
    }

    /// Active thresholds
    pub fn config(&self) -> &TemperatureConfig {
        &self.config
    }

    /// Classification of a single reading, if it is out of range
    pub fn classify(&self, temperature: f64) -> Option<(TemperatureEventType, Severity)> {
        if temperature >= self.config.critical_threshold {
            Some((TemperatureEventType::Critical, Severity::Critical))
        } else if temperature >= self.config.high_threshold {
            Some(self.sensor.elevated())
        } else if self.config.low_threshold.is_some_and(|low| temperature <= low) {
            Some((TemperatureEventType::Low, Severity::Mild))
        } else {
            None
        }
    }

    fn run(
        &self,
        log: &LogData,
        columns: &ResolvedColumns,
    ) -> Result<(Vec<TemperatureEvent>, TemperatureStatistics), AnalysisError> {
        require_rows(log)?;
        let temp_col = columns.require(self.sensor.signal(), self.sensor.id())?;
        let rpm_col = columns.index(Signal::Rpm);
        let fan_col = columns.index(Signal::FanStatus);

        let mut temps = Accumulator::default();
        let mut elevated = 0usize;
        let mut fan_on_samples = 0usize;
        let mut candidates = Vec::new();

        for row in log.rows() {
            let temperature = row.number(temp_col);
            if !temperature.is_finite() {
                continue;
            }
            temps.push(temperature);
            if temperature >= self.config.high_threshold {
                elevated += 1;
            }
            let fan_on = row.get(fan_col).is_some_and(|f| f != 0.0);
            if fan_on {
                fan_on_samples += 1;
            }

            if let Some((kind, severity)) = self.classify(temperature) {
                candidates.push(TemperatureSample {
                    time: row.time,
                    kind,
                    severity,
                    temperature,
                    rpm: row.get_or_zero(rpm_col),
                    fan_on,
                });
            }
        }

        let events: Vec<TemperatureEvent> = group_by_window(candidates, self.config.group_window)
            .iter()
            .map(TemperatureEvent::from_group)
            .collect();

        let statistics = TemperatureStatistics {
            analyzed_samples: temps.count,
            min_temperature: temps.min_or_zero(),
            max_temperature: temps.max_or_zero(),
            average_temperature: temps.mean(),
            time_elevated_pct: percent(elevated as f64, temps.count as f64),
            fan_on_pct: fan_col.map(|_| percent(fan_on_samples as f64, temps.count as f64)),
            total_events: events.len(),
            low_events: events
                .iter()
                .filter(|e| e.event_type == TemperatureEventType::Low)
                .count(),
            elevated_events: events
                .iter()
                .filter(|e| {
                    matches!(
                        e.event_type,
                        TemperatureEventType::Warning | TemperatureEventType::High
                    )
                })
                .count(),
            critical_events: events
                .iter()
                .filter(|e| e.event_type == TemperatureEventType::Critical)
                .count(),
        };

        Ok((events, statistics))
    }
}

impl LogAnalyzer for TemperatureAnalyzer {
    type Event = TemperatureEvent;
    type Statistics = TemperatureStatistics;

    fn id(&self) -> &'static str {
        self.sensor.id()
    }

    fn analyze(&mut self, log: &LogData, _calibration: Option<&Calibration>) -> &TemperatureReport {
        let signals = [self.sensor.signal(), Signal::Rpm, Signal::FanStatus];
        let columns = ResolvedColumns::resolve(&self.resolver, log, &signals);
        let result = self.run(log, &columns);
        let report = AnalysisReport::from_result(self.id(), result, &columns, Vec::new());
        self.last.insert(report)
    }

    fn last_report(&self) -> Option<&TemperatureReport> {
        self.last.as_ref()
    }
}
