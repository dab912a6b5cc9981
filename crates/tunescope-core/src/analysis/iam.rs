//! IAM Analyzer
//!
//! Tracks the ignition advance multiplier: low values, step drops and
//! recoveries, and long stretches stuck low. Drops can be correlated with
//! knock events produced by the knock detector.

use serde::{Deserialize, Serialize};

use super::knock::KnockEvent;
use super::{percent, require_rows, Accumulator, AnalysisReport, LogAnalyzer, Severity};
use crate::calibration::Calibration;
use crate::datalog::{ColumnResolver, LogData, ResolvedColumns, Signal};
use crate::error::AnalysisError;
use crate::grouping::{group_by_window, Candidate, TIME_TOLERANCE};

/// Slack for IAM equality comparisons
const IAM_EPSILON: f64 = 1e-9;

const SIGNALS: [Signal; 4] = [Signal::Iam, Signal::KnockRetard, Signal::Rpm, Signal::Load];

/// IAM thresholds (ratio, 0-1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IamConfig {
    /// IAM below this is low
    pub low_threshold: f64,
    /// IAM below this is critical
    pub critical_threshold: f64,
    /// Step decrease that counts as a drop
    pub drop_threshold: f64,
    /// Step increase that counts as a recovery
    pub recovery_threshold: f64,
    /// Continuous time below `low_threshold` that counts as stuck (s)
    pub stuck_duration: f64,
    /// Logs whose maximum exceeds this are on a 0-100 scale
    pub percent_scale_detect: f64,
    /// Drop-to-knock correlation window (s)
    pub knock_correlation_window: f64,
    /// Grouping window (s)
    pub group_window: f64,
}

impl Default for IamConfig {
    fn default() -> Self {
        Self {
            low_threshold: 0.30,
            critical_threshold: 0.20,
            drop_threshold: 0.05,
            recovery_threshold: 0.01,
            stuck_duration: 5.0,
            percent_scale_detect: 1.5,
            knock_correlation_window: 1.0,
            group_window: 1.0,
        }
    }
}

/// IAM event classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IamEventType {
    /// IAM below the low threshold
    LowIam,
    /// IAM below the low threshold for longer than the stuck duration
    StuckLow,
}

impl IamEventType {
    /// Stable identifier used in serialized output and issue lists
    pub fn as_str(&self) -> &'static str {
        match self {
            IamEventType::LowIam => "low_iam",
            IamEventType::StuckLow => "stuck_low",
        }
    }
}

/// A step decrease in IAM
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IamDrop {
    /// Time of the lower sample (s)
    pub time: f64,
    /// IAM before the drop
    pub from: f64,
    /// IAM after the drop
    pub to: f64,
    /// Knock retard at the drop (degrees)
    pub knock_retard: f64,
    /// Within the correlation window of a knock event
    pub near_knock: bool,
}

/// A step increase in IAM while below 1.0
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IamRecovery {
    /// Time of the higher sample (s)
    pub time: f64,
    /// IAM before the recovery
    pub from: f64,
    /// IAM after the recovery
    pub to: f64,
}

#[derive(Debug, Clone)]
struct IamSample {
    time: f64,
    iam: f64,
    knock: f64,
    rpm: f64,
    load: f64,
}

impl Candidate for IamSample {
    type Kind = IamEventType;

    fn time(&self) -> f64 {
        self.time
    }

    fn kind(&self) -> IamEventType {
        IamEventType::LowIam
    }
}

/// A grouped IAM event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IamEvent {
    /// Time of the first sample (s)
    pub time: f64,
    /// Time of the last sample (s)
    pub end_time: f64,
    /// Span covered by the event (s)
    pub duration: f64,
    /// Event classification
    pub event_type: IamEventType,
    /// Critical when stuck or below the critical threshold, severe otherwise
    pub severity: Severity,
    /// Lowest IAM in the event
    pub iam: f64,
    /// Mean IAM over the event
    pub average_iam: f64,
    /// Mean engine speed (rpm)
    pub rpm: f64,
    /// Mean load (g/rev)
    pub load: f64,
    /// Most negative knock retard during the event
    pub knock_retard: f64,
    /// Samples in the event
    pub event_count: usize,
}

impl IamEvent {
    fn from_members(event_type: IamEventType, members: &[IamSample], config: &IamConfig) -> Self {
        let first = &members[0];
        let last = &members[members.len() - 1];
        let count = members.len() as f64;
        let iam = members.iter().map(|s| s.iam).fold(f64::INFINITY, f64::min);
        let severity = if event_type == IamEventType::StuckLow || iam < config.critical_threshold {
            Severity::Critical
        } else {
            Severity::Severe
        };
        Self {
            time: first.time,
            end_time: last.time,
            duration: last.time - first.time,
            event_type,
            severity,
            iam,
            average_iam: members.iter().map(|s| s.iam).sum::<f64>() / count,
            rpm: members.iter().map(|s| s.rpm).sum::<f64>() / count,
            load: members.iter().map(|s| s.load).sum::<f64>() / count,
            knock_retard: members.iter().map(|s| s.knock).fold(f64::INFINITY, f64::min),
            event_count: members.len(),
        }
    }
}

/// IAM summary statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IamStatistics {
    /// Samples with a usable IAM value
    pub analyzed_samples: usize,
    /// The log was on a 0-100 scale and was normalized
    pub normalized: bool,
    /// Nominal IAM from the calibration (1.0 when absent)
    pub baseline: f64,
    /// First IAM in the log
    pub initial_iam: f64,
    /// Last IAM in the log
    pub final_iam: f64,
    /// Lowest IAM in the log
    pub min_iam: f64,
    /// Mean IAM over the log
    pub average_iam: f64,
    /// The log opened below the baseline
    pub started_below_baseline: bool,
    /// Share of samples below the baseline (%)
    pub time_below_baseline_pct: f64,
    /// Events of every type
    pub total_events: usize,
    /// Low IAM events
    pub low_iam_events: usize,
    /// Stuck low events
    pub stuck_low_events: usize,
    /// Events at critical severity
    pub critical_events: usize,
    /// Step decreases in order
    pub drops: Vec<IamDrop>,
    /// Step increases in order
    pub recoveries: Vec<IamRecovery>,
    /// Drops near a knock event
    pub knock_correlated_drops: usize,
    /// Share of drops near a knock event, when knock events were supplied
    pub knock_correlation_pct: Option<f64>,
}

/// Report produced by [`IamAnalyzer`]
pub type IamReport = AnalysisReport<IamEvent, IamStatistics>;

/// Ignition advance multiplier analyzer
#[derive(Debug, Clone, Default)]
pub struct IamAnalyzer {
    config: IamConfig,
    resolver: ColumnResolver,
    last: Option<IamReport>,
}

impl IamAnalyzer {
    /// Create an analyzer with explicit thresholds and column overrides
    pub fn new(config: IamConfig, resolver: ColumnResolver) -> Self {
        Self {
            config,
            resolver,
            last: None,
        }
    }

    /// Active thresholds
    pub fn config(&self) -> &IamConfig {
        &self.config
    }

    /// Analyze and correlate drops with knock detector output
    pub fn analyze_with_knock(
        &mut self,
        log: &LogData,
        calibration: Option<&Calibration>,
        knock_events: Option<&[KnockEvent]>,
    ) -> &IamReport {
        let columns = ResolvedColumns::resolve(&self.resolver, log, &SIGNALS);
        let result = self.run(log, calibration, &columns, knock_events);
        let report = AnalysisReport::from_result(self.id(), result, &columns, Vec::new());
        self.last.insert(report)
    }

    fn run(
        &self,
        log: &LogData,
        calibration: Option<&Calibration>,
        columns: &ResolvedColumns,
        knock_events: Option<&[KnockEvent]>,
    ) -> Result<(Vec<IamEvent>, IamStatistics), AnalysisError> {
        require_rows(log)?;
        let iam_col = columns.require(Signal::Iam, "ignition advance multiplier")?;
        let knock_col = columns.index(Signal::KnockRetard);
        let rpm_col = columns.index(Signal::Rpm);
        let load_col = columns.index(Signal::Load);

        let raw_max = log
            .rows()
            .iter()
            .map(|r| r.number(iam_col))
            .filter(|v| v.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);
        let normalized = raw_max > self.config.percent_scale_detect;
        let scale = |v: f64| if v > self.config.percent_scale_detect { v / 100.0 } else { v };
        let scale_log = |v: f64| if normalized { v / 100.0 } else { v };

        let baseline = calibration
            .and_then(Calibration::iam_init)
            .map(scale)
            .unwrap_or(1.0);

        let samples: Vec<IamSample> = log
            .rows()
            .iter()
            .filter_map(|row| {
                let iam = scale_log(row.number(iam_col));
                iam.is_finite().then(|| IamSample {
                    time: row.time,
                    iam,
                    knock: row.get_or_zero(knock_col),
                    rpm: row.get_or_zero(rpm_col),
                    load: row.get_or_zero(load_col),
                })
            })
            .collect();

        let mut iams = Accumulator::default();
        let mut below_baseline = 0usize;
        let mut drops = Vec::new();
        let mut recoveries = Vec::new();
        for (i, sample) in samples.iter().enumerate() {
            iams.push(sample.iam);
            if sample.iam < baseline - IAM_EPSILON {
                below_baseline += 1;
            }
            let Some(prev) = i.checked_sub(1).map(|p| &samples[p]) else {
                continue;
            };
            let step = sample.iam - prev.iam;
            if -step > self.config.drop_threshold {
                drops.push(IamDrop {
                    time: sample.time,
                    from: prev.iam,
                    to: sample.iam,
                    knock_retard: sample.knock,
                    near_knock: false,
                });
            } else if step > self.config.recovery_threshold && prev.iam < 1.0 {
                recoveries.push(IamRecovery {
                    time: sample.time,
                    from: prev.iam,
                    to: sample.iam,
                });
            }
        }

        let mut knock_correlated = 0usize;
        if let Some(knock) = knock_events {
            let window = self.config.knock_correlation_window;
            for drop in &mut drops {
                drop.near_knock = knock
                    .iter()
                    .any(|k| drop.time >= k.time - window && drop.time <= k.end_time + window);
                if drop.near_knock {
                    knock_correlated += 1;
                }
            }
        }

        let mut events = self.stuck_low_events(&samples);
        let low: Vec<IamSample> = samples
            .iter()
            .filter(|s| s.iam < self.config.low_threshold)
            .cloned()
            .collect();
        events.extend(
            group_by_window(low, self.config.group_window)
                .iter()
                .map(|g| IamEvent::from_members(IamEventType::LowIam, g.members(), &self.config)),
        );
        events.sort_by(|a, b| a.time.total_cmp(&b.time));

        let by_type = |t: IamEventType| events.iter().filter(|e| e.event_type == t).count();
        let initial_iam = samples.first().map(|s| s.iam).unwrap_or(0.0);
        let statistics = IamStatistics {
            analyzed_samples: iams.count,
            normalized,
            baseline,
            initial_iam,
            final_iam: samples.last().map(|s| s.iam).unwrap_or(0.0),
            min_iam: iams.min_or_zero(),
            average_iam: iams.mean(),
            started_below_baseline: !samples.is_empty() && initial_iam < baseline - IAM_EPSILON,
            time_below_baseline_pct: percent(below_baseline as f64, iams.count as f64),
            total_events: events.len(),
            low_iam_events: by_type(IamEventType::LowIam),
            stuck_low_events: by_type(IamEventType::StuckLow),
            critical_events: events.iter().filter(|e| e.severity == Severity::Critical).count(),
            knock_correlated_drops: knock_correlated,
            knock_correlation_pct: knock_events
                .map(|_| percent(knock_correlated as f64, drops.len() as f64)),
            drops,
            recoveries,
        };

        Ok((events, statistics))
    }

    /// Continuous runs below the low threshold lasting at least `stuck_duration`
    fn stuck_low_events(&self, samples: &[IamSample]) -> Vec<IamEvent> {
        let mut events = Vec::new();
        let mut start = 0usize;
        while start < samples.len() {
            if samples[start].iam >= self.config.low_threshold {
                start += 1;
                continue;
            }
            let end = samples[start..]
                .iter()
                .position(|s| s.iam >= self.config.low_threshold)
                .map(|p| start + p)
                .unwrap_or(samples.len());
            let run = &samples[start..end];
            let span = run[run.len() - 1].time - run[0].time;
            if span + TIME_TOLERANCE >= self.config.stuck_duration {
                events.push(IamEvent::from_members(IamEventType::StuckLow, run, &self.config));
            }
            start = end;
        }
        events
    }
}

impl LogAnalyzer for IamAnalyzer {
    type Event = IamEvent;
    type Statistics = IamStatistics;

    fn id(&self) -> &'static str {
        "iam"
    }

    fn analyze(&mut self, log: &LogData, calibration: Option<&Calibration>) -> &IamReport {
        self.analyze_with_knock(log, calibration, None)
    }

    fn last_report(&self) -> Option<&IamReport> {
        self.last.as_ref()
    }
}
