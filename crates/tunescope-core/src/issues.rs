//! Issue Compiler
//!
//! Flattens every analyzer's events into one list of [`Issue`]s with a
//! shared severity scale and display units. Compilation is a pure function
//! of the analyzer reports and [`CompileOptions`]; callers recompile when an
//! option changes.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::analysis::afr::{AfrEventType, AfrReport};
use crate::analysis::boost::{BoostEventType, BoostReport};
use crate::analysis::fuel_trim::FuelTrimReport;
use crate::analysis::iam::{IamEventType, IamReport};
use crate::analysis::knock::KnockReport;
use crate::analysis::load_limit::{LoadLimitEventType, LoadLimitReport};
use crate::analysis::temperature::TemperatureReport;
use crate::analysis::Severity;
use crate::unit_conversion::kpa_to_psi_gauge;

/// Knock retard at or below this is critical (degrees)
const CRITICAL_KNOCK_RETARD: f64 = -4.0;
/// Boost error beyond this is critical (kPa)
const CRITICAL_BOOST_ERROR: f64 = 20.3;
/// Lean deviation beyond this is critical (% of target)
const CRITICAL_LEAN_PCT: f64 = 10.0;
/// Lean deviation within this is only "low" (% of target)
const MINOR_LEAN_PCT: f64 = 5.0;

/// Analyzer an issue came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueSource {
    /// Knock detector
    Knock,
    /// Boost control analyzer
    Boost,
    /// Air/fuel ratio analyzer
    Afr,
    /// Short-term fuel trim analyzer
    ShortTermTrim,
    /// Long-term fuel trim analyzer
    LongTermTrim,
    /// Load limit analyzer
    LoadLimit,
    /// IAM analyzer
    Iam,
    /// Coolant temperature analyzer
    Coolant,
    /// Intake temperature analyzer
    Intake,
}

impl IssueSource {
    /// Every source, in display order
    pub const ALL: [IssueSource; 9] = [
        IssueSource::Knock,
        IssueSource::Boost,
        IssueSource::Afr,
        IssueSource::ShortTermTrim,
        IssueSource::LongTermTrim,
        IssueSource::LoadLimit,
        IssueSource::Iam,
        IssueSource::Coolant,
        IssueSource::Intake,
    ];

    /// Short identifier, matching the analyzer ids
    pub fn id(&self) -> &'static str {
        match self {
            IssueSource::Knock => "knock",
            IssueSource::Boost => "boost",
            IssueSource::Afr => "afr",
            IssueSource::ShortTermTrim => "stft",
            IssueSource::LongTermTrim => "ltft",
            IssueSource::LoadLimit => "load",
            IssueSource::Iam => "iam",
            IssueSource::Coolant => "coolant",
            IssueSource::Intake => "intake",
        }
    }

    /// Display name
    pub fn label(&self) -> &'static str {
        match self {
            IssueSource::Knock => "Knock",
            IssueSource::Boost => "Boost Control",
            IssueSource::Afr => "Air/Fuel Ratio",
            IssueSource::ShortTermTrim => "Short-Term Fuel Trim",
            IssueSource::LongTermTrim => "Long-Term Fuel Trim",
            IssueSource::LoadLimit => "Load Limit",
            IssueSource::Iam => "IAM",
            IssueSource::Coolant => "Coolant Temperature",
            IssueSource::Intake => "Intake Temperature",
        }
    }
}

/// Normalized issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Informational
    Mild,
    /// Worth a look
    Low,
    /// Needs attention
    High,
    /// Needs attention before the next pull
    Severe,
}

impl From<Severity> for IssueSeverity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Critical => IssueSeverity::Severe,
            Severity::Severe => IssueSeverity::High,
            Severity::Moderate => IssueSeverity::Low,
            Severity::Mild | Severity::Normal => IssueSeverity::Mild,
        }
    }
}

/// One analyzer event in the shared issue shape
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// Start of the originating event (s)
    pub time: f64,
    /// End of the originating event (s)
    pub end_time: f64,
    /// Length of the originating event (s)
    pub duration: f64,
    /// Analyzer the issue came from
    pub source: IssueSource,
    /// Stable id, `<source>-<event index>`
    pub source_id: String,
    /// Event type identifier from the analyzer
    pub event_type: String,
    /// Severity on the shared scale
    pub severity: IssueSeverity,
    /// Severity as reported by the analyzer
    pub analyzer_severity: Severity,
    /// Headline value, in `value_unit`
    pub value: f64,
    /// Display unit for `value`
    pub value_unit: String,
    /// Human-readable summary
    pub description: String,
    /// Deviation the critical thresholds are judged on: knock retard
    /// (degrees), boost error (kPa) or AFR error (% of target); `value` for
    /// the other sources
    pub deviation: f64,
    /// Index of the originating event in its analyzer's event list
    pub event_index: usize,
}

impl Issue {
    /// Whether the issue passes the "critical" filter, by per-source rule
    pub fn is_critical(&self) -> bool {
        match self.source {
            IssueSource::Knock => self.deviation <= CRITICAL_KNOCK_RETARD,
            IssueSource::Boost => {
                self.event_type == BoostEventType::LimitViolation.as_str()
                    || self.deviation.abs() > CRITICAL_BOOST_ERROR
            }
            IssueSource::Afr => {
                self.event_type == AfrEventType::Lean.as_str()
                    && self.deviation.abs() > CRITICAL_LEAN_PCT
            }
            IssueSource::LoadLimit => {
                self.event_type == LoadLimitEventType::LimitViolation.as_str()
            }
            IssueSource::Iam => {
                self.event_type == IamEventType::StuckLow.as_str()
                    || self.analyzer_severity == Severity::Critical
            }
            IssueSource::ShortTermTrim
            | IssueSource::LongTermTrim
            | IssueSource::Coolant
            | IssueSource::Intake => self.analyzer_severity == Severity::Critical,
        }
    }
}

/// Borrowed analyzer reports to compile
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzerResults<'a> {
    /// Knock detector report
    pub knock: Option<&'a KnockReport>,
    /// Boost control report
    pub boost: Option<&'a BoostReport>,
    /// Air/fuel ratio report
    pub afr: Option<&'a AfrReport>,
    /// Short-term fuel trim report
    pub short_term_trim: Option<&'a FuelTrimReport>,
    /// Long-term fuel trim report
    pub long_term_trim: Option<&'a FuelTrimReport>,
    /// Load limit report
    pub load_limit: Option<&'a LoadLimitReport>,
    /// IAM report
    pub iam: Option<&'a IamReport>,
    /// Coolant temperature report
    pub coolant: Option<&'a TemperatureReport>,
    /// Intake temperature report
    pub intake: Option<&'a TemperatureReport>,
}

/// Issue compilation options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompileOptions {
    /// Short-term trim events are noisy and left out unless requested
    pub include_short_term_trim: bool,
}

struct IssueBuilder {
    source: IssueSource,
    index: usize,
    time: f64,
    end_time: f64,
    duration: f64,
    event_type: &'static str,
    analyzer_severity: Severity,
}

impl IssueBuilder {
    fn finish(
        self,
        severity: IssueSeverity,
        value: f64,
        unit: &str,
        description: String,
        deviation: f64,
    ) -> Issue {
        Issue {
            time: self.time,
            end_time: self.end_time,
            duration: self.duration,
            source: self.source,
            source_id: format!("{}-{}", self.source.id(), self.index),
            event_type: self.event_type.to_string(),
            severity,
            analyzer_severity: self.analyzer_severity,
            value,
            value_unit: unit.to_string(),
            description,
            deviation,
            event_index: self.index,
        }
    }
}

macro_rules! builder {
    ($source:expr, $index:expr, $event:expr, $event_type:expr) => {
        IssueBuilder {
            source: $source,
            index: $index,
            time: $event.time,
            end_time: $event.end_time,
            duration: $event.duration,
            event_type: $event_type,
            analyzer_severity: $event.severity,
        }
    };
}

/// Compile analyzer reports into a time-ordered issue list
pub fn compile(results: &AnalyzerResults<'_>, options: &CompileOptions) -> Vec<Issue> {
    let mut issues = Vec::new();

    if let Some(report) = results.knock {
        for (i, e) in report.events.iter().enumerate() {
            let mut description = format!(
                "Knock retard {:.1}° at {:.0} rpm, {:.2} g/rev",
                e.knock_retard, e.rpm, e.load
            );
            if e.slow_recovery {
                description.push_str(", slow recovery");
            }
            if e.persistent_knock {
                description.push_str(", persistent");
            }
            issues.push(builder!(IssueSource::Knock, i, e, e.event_type.as_str()).finish(
                IssueSeverity::High,
                e.knock_retard,
                "°",
                description,
                e.knock_retard,
            ));
        }
    }

    if let Some(report) = results.boost {
        for (i, e) in report.events.iter().enumerate() {
            let psi = kpa_to_psi_gauge(e.actual_boost);
            let description = match e.event_type {
                BoostEventType::LimitViolation => format!(
                    "Boost {:.1} kPa exceeds limit {:.1} kPa at {:.0} rpm",
                    e.actual_boost,
                    e.boost_limit.unwrap_or(0.0),
                    e.rpm
                ),
                _ => format!(
                    "Boost {} of {:+.1} kPa ({:.1} psi) at {:.0} rpm",
                    e.event_type.as_str(),
                    e.boost_error,
                    psi,
                    e.rpm
                ),
            };
            issues.push(
                builder!(IssueSource::Boost, i, e, e.event_type.as_str()).finish(
                    e.severity.into(),
                    psi,
                    "psi",
                    description,
                    e.boost_error,
                ),
            );
        }
    }

    if let Some(report) = results.afr {
        for (i, e) in report.events.iter().enumerate() {
            let severity = match e.event_type {
                AfrEventType::Lean if e.error_pct.abs() <= MINOR_LEAN_PCT => IssueSeverity::Low,
                AfrEventType::Lean => IssueSeverity::High,
                AfrEventType::Rich | AfrEventType::TargetMismatch => IssueSeverity::Low,
                AfrEventType::Normal => IssueSeverity::Mild,
            };
            let description = match e.event_type {
                AfrEventType::TargetMismatch => format!(
                    "Logged PE target λ {:.3} differs from calibrated λ {:.3}",
                    e.target_lambda,
                    e.expected_target.unwrap_or(e.target_lambda)
                ),
                _ => format!(
                    "AFR {} by {:.1}% (AFR {:.2} vs target {:.2})",
                    e.event_type.as_str(),
                    e.error_pct.abs(),
                    e.measured_afr,
                    e.target_afr
                ),
            };
            issues.push(builder!(IssueSource::Afr, i, e, e.event_type.as_str()).finish(
                severity,
                e.measured_afr,
                "AFR",
                description,
                e.error_pct,
            ));
        }
    }

    let trims = [
        (
            IssueSource::ShortTermTrim,
            results
                .short_term_trim
                .filter(|_| options.include_short_term_trim),
        ),
        (IssueSource::LongTermTrim, results.long_term_trim),
    ];
    for (source, report) in trims {
        let Some(report) = report else { continue };
        for (i, e) in report.events.iter().enumerate() {
            let mut description = format!(
                "{} {:+.1}% at {:.0} rpm, {:.2} g/rev",
                source.label(),
                e.trim,
                e.rpm,
                e.load
            );
            if e.is_cold_start {
                description.push_str(" (cold start)");
            } else if e.is_acceleration {
                description.push_str(" (acceleration)");
            }
            issues.push(builder!(source, i, e, e.event_type.as_str()).finish(
                e.severity.into(),
                e.trim,
                "%",
                description,
                e.trim,
            ));
        }
    }

    if let Some(report) = results.load_limit {
        for (i, e) in report.events.iter().enumerate() {
            let mut description = format!(
                "Load {:.2} g/rev is {:.0}% of limit {:.2} at {:.0} rpm",
                e.load,
                e.load_ratio * 100.0,
                e.load_limit,
                e.rpm
            );
            if e.fuel_cut {
                description.push_str(", fuel cut");
            }
            issues.push(
                builder!(IssueSource::LoadLimit, i, e, e.event_type.as_str()).finish(
                    e.severity.into(),
                    e.load,
                    "g/rev",
                    description,
                    e.load,
                ),
            );
        }
    }

    if let Some(report) = results.iam {
        for (i, e) in report.events.iter().enumerate() {
            let description = match e.event_type {
                IamEventType::StuckLow => {
                    format!("IAM stuck at {:.2} for {:.1} s", e.iam, e.duration)
                }
                IamEventType::LowIam => format!("IAM low at {:.2}", e.iam),
            };
            issues.push(builder!(IssueSource::Iam, i, e, e.event_type.as_str()).finish(
                e.severity.into(),
                e.iam,
                "",
                description,
                e.iam,
            ));
        }
    }

    let temps = [
        (IssueSource::Coolant, results.coolant),
        (IssueSource::Intake, results.intake),
    ];
    for (source, report) in temps {
        let Some(report) = report else { continue };
        for (i, e) in report.events.iter().enumerate() {
            let mut description = format!("{} {:.1} °C", source.label(), e.temperature);
            if e.fan_on {
                description.push_str(", fan on");
            }
            issues.push(builder!(source, i, e, e.event_type.as_str()).finish(
                e.severity.into(),
                e.temperature,
                "°C",
                description,
                e.temperature,
            ));
        }
    }

    issues.sort_by(|a, b| a.time.total_cmp(&b.time));
    tracing::debug!("Compiled {} issues", issues.len());
    issues
}

/// Predicates over compiled issues; empty lists match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IssueFilter {
    /// Keep only these sources
    pub sources: Vec<IssueSource>,
    /// Keep only these event types
    pub event_types: Vec<String>,
    /// Keep only these severities
    pub severities: Vec<IssueSeverity>,
    /// Case-insensitive text match on description, type and source
    pub search: Option<String>,
    /// Keep only critical issues
    pub critical_only: bool,
}

impl IssueFilter {
    /// Whether an issue passes every predicate
    pub fn matches(&self, issue: &Issue) -> bool {
        if !self.sources.is_empty() && !self.sources.contains(&issue.source) {
            return false;
        }
        if !self.event_types.is_empty() && !self.event_types.contains(&issue.event_type) {
            return false;
        }
        if !self.severities.is_empty() && !self.severities.contains(&issue.severity) {
            return false;
        }
        if self.critical_only && !issue.is_critical() {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                issue.description.to_lowercase().contains(&needle)
                    || issue.event_type.to_lowercase().contains(&needle)
                    || issue.source.label().to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }

    /// Issues that pass, in input order
    pub fn apply<'a>(&self, issues: &'a [Issue]) -> Vec<&'a Issue> {
        issues.iter().filter(|i| self.matches(i)).collect()
    }
}

/// Column an issue list can be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueSortKey {
    /// Event start
    Time,
    /// Shared severity scale
    Severity,
    /// Source analyzer
    Source,
    /// Event type identifier
    EventType,
    /// Headline value
    Value,
    /// Event length
    Duration,
}

/// Sort order for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending
    #[default]
    Asc,
    /// Descending
    Desc,
}

fn compare_by(key: IssueSortKey, a: &Issue, b: &Issue) -> Ordering {
    match key {
        IssueSortKey::Time => a.time.total_cmp(&b.time),
        IssueSortKey::Severity => a.severity.cmp(&b.severity),
        IssueSortKey::Source => a.source.cmp(&b.source),
        IssueSortKey::EventType => a.event_type.cmp(&b.event_type),
        IssueSortKey::Value => a.value.total_cmp(&b.value),
        IssueSortKey::Duration => a.duration.total_cmp(&b.duration),
    }
}

/// Stable multi-key sort; earlier keys take precedence
pub fn sort_issues(issues: &mut [Issue], keys: &[(IssueSortKey, SortDirection)]) {
    issues.sort_by(|a, b| {
        keys.iter()
            .map(|&(key, direction)| match direction {
                SortDirection::Asc => compare_by(key, a, b),
                SortDirection::Desc => compare_by(key, b, a),
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

/// Aggregate counts over an issue list
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSummary {
    /// Issues counted
    pub total: usize,
    /// Critical issues
    pub critical: usize,
    /// Issues per severity
    pub by_severity: BTreeMap<IssueSeverity, usize>,
    /// Issues per source
    pub by_source: BTreeMap<IssueSource, usize>,
}

impl IssueSummary {
    /// Count a list of issues
    pub fn from_issues<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> Self {
        let mut summary = Self::default();
        for issue in issues {
            summary.total += 1;
            if issue.is_critical() {
                summary.critical += 1;
            }
            *summary.by_severity.entry(issue.severity).or_default() += 1;
            *summary.by_source.entry(issue.source).or_default() += 1;
        }
        summary
    }

    /// Issues at one severity
    pub fn count(&self, severity: IssueSeverity) -> usize {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fuel_trim::{FuelTrimEvent, FuelTrimEventType, FuelTrimStatistics};
    use crate::analysis::AnalysisReport;

    fn issue(source: IssueSource, time: f64, severity: IssueSeverity, value: f64) -> Issue {
        Issue {
            time,
            end_time: time,
            duration: 0.0,
            source,
            source_id: format!("{}-0", source.id()),
            event_type: "test".to_string(),
            severity,
            analyzer_severity: if severity == IssueSeverity::Severe {
                Severity::Critical
            } else {
                Severity::Moderate
            },
            value,
            value_unit: String::new(),
            description: format!("{} issue", source.label()),
            deviation: value,
            event_index: 0,
        }
    }

    fn trim_report(time: f64) -> FuelTrimReport {
        AnalysisReport {
            events: vec![FuelTrimEvent {
                time,
                end_time: time + 0.5,
                duration: 0.5,
                event_type: FuelTrimEventType::Positive,
                severity: Severity::Critical,
                trim: 26.0,
                average_trim: 24.0,
                rpm: 2500.0,
                load: 0.8,
                throttle: 20.0,
                coolant_temp: 90.0,
                is_cold_start: false,
                is_acceleration: false,
                event_count: 6,
            }],
            statistics: FuelTrimStatistics::default(),
            columns: BTreeMap::new(),
            warnings: Vec::new(),
            error: None,
        }
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(IssueSeverity::from(Severity::Critical), IssueSeverity::Severe);
        assert_eq!(IssueSeverity::from(Severity::Severe), IssueSeverity::High);
        assert_eq!(IssueSeverity::from(Severity::Moderate), IssueSeverity::Low);
        assert_eq!(IssueSeverity::from(Severity::Normal), IssueSeverity::Mild);
    }

    #[test]
    fn test_short_term_toggle() {
        let stft = trim_report(1.0);
        let ltft = trim_report(2.0);
        let results = AnalyzerResults {
            short_term_trim: Some(&stft),
            long_term_trim: Some(&ltft),
            ..AnalyzerResults::default()
        };

        let default = compile(&results, &CompileOptions::default());
        assert_eq!(default.len(), 1);
        assert_eq!(default[0].source, IssueSource::LongTermTrim);
        assert!(default[0].is_critical());
        assert_eq!(default[0].severity, IssueSeverity::Severe);

        let all = compile(
            &results,
            &CompileOptions {
                include_short_term_trim: true,
            },
        );
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].source, IssueSource::ShortTermTrim);
        assert_eq!(all[0].source_id, "stft-0");
    }

    #[test]
    fn test_critical_is_derived_per_source() {
        let mut knock = issue(IssueSource::Knock, 1.0, IssueSeverity::High, -4.0);
        assert!(knock.is_critical());
        knock.deviation = -3.9;
        assert!(!knock.is_critical());

        let mut boost = issue(IssueSource::Boost, 2.0, IssueSeverity::Low, 20.3);
        assert!(!boost.is_critical());
        boost.deviation = -20.4;
        assert!(boost.is_critical());
        boost.deviation = 2.0;
        boost.event_type = "limit_violation".to_string();
        assert!(boost.is_critical());

        let mut afr = issue(IssueSource::Afr, 3.0, IssueSeverity::High, 12.5);
        afr.event_type = "lean".to_string();
        assert!(afr.is_critical());
        afr.event_type = "rich".to_string();
        assert!(!afr.is_critical());

        let mut iam = issue(IssueSource::Iam, 4.0, IssueSeverity::High, 0.25);
        assert!(!iam.is_critical());
        iam.event_type = "stuck_low".to_string();
        assert!(iam.is_critical());

        let coolant = issue(IssueSource::Coolant, 5.0, IssueSeverity::Severe, 112.0);
        assert!(coolant.is_critical());
        let json = serde_json::to_value(&coolant).expect("serialize");
        assert!(json.get("critical").is_none());
        assert_eq!(json["deviation"], 112.0);
    }

    #[test]
    fn test_filter() {
        let issues = vec![
            issue(IssueSource::Knock, 1.0, IssueSeverity::High, -3.0),
            issue(IssueSource::Boost, 2.0, IssueSeverity::Severe, 25.0),
            issue(IssueSource::Afr, 3.0, IssueSeverity::Low, 13.0),
        ];

        let by_source = IssueFilter {
            sources: vec![IssueSource::Boost, IssueSource::Afr],
            ..IssueFilter::default()
        };
        assert_eq!(by_source.apply(&issues).len(), 2);

        let critical = IssueFilter {
            critical_only: true,
            ..IssueFilter::default()
        };
        assert_eq!(critical.apply(&issues)[0].source, IssueSource::Boost);

        let search = IssueFilter {
            search: Some("air/FUEL".to_string()),
            ..IssueFilter::default()
        };
        assert_eq!(search.apply(&issues).len(), 1);
        assert_eq!(IssueFilter::default().apply(&issues).len(), 3);
    }

    #[test]
    fn test_multi_key_sort_is_stable() {
        let mut issues = vec![
            issue(IssueSource::Afr, 1.0, IssueSeverity::Low, 1.0),
            issue(IssueSource::Knock, 2.0, IssueSeverity::High, 2.0),
            issue(IssueSource::Boost, 3.0, IssueSeverity::Low, 3.0),
            issue(IssueSource::Iam, 4.0, IssueSeverity::High, 4.0),
        ];
        sort_issues(&mut issues, &[(IssueSortKey::Severity, SortDirection::Desc)]);
        let times: Vec<f64> = issues.iter().map(|i| i.time).collect();
        assert_eq!(times, vec![2.0, 4.0, 1.0, 3.0]);

        sort_issues(
            &mut issues,
            &[
                (IssueSortKey::Severity, SortDirection::Asc),
                (IssueSortKey::Value, SortDirection::Desc),
            ],
        );
        let times: Vec<f64> = issues.iter().map(|i| i.time).collect();
        assert_eq!(times, vec![3.0, 1.0, 4.0, 2.0]);
    }

    #[test]
    fn test_summary() {
        let issues = vec![
            issue(IssueSource::Knock, 1.0, IssueSeverity::High, 0.0),
            issue(IssueSource::Knock, 2.0, IssueSeverity::Severe, -5.0),
            issue(IssueSource::Coolant, 3.0, IssueSeverity::Severe, 0.0),
        ];
        let summary = IssueSummary::from_issues(&issues);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.critical, 2);
        assert_eq!(summary.count(IssueSeverity::Severe), 2);
        assert_eq!(summary.count(IssueSeverity::Mild), 0);
        assert_eq!(summary.by_source.get(&IssueSource::Knock), Some(&2));
    }
}
