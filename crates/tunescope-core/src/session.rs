//! Analysis session
//!
//! Runs every analyzer over one log and calibration with a shared column
//! resolver, then compiles the issue list. A session is a plain value; it
//! keeps no state between runs.

use serde::Serialize;

use crate::analysis::afr::{AfrAnalyzer, AfrReport};
use crate::analysis::boost::{BoostControlAnalyzer, BoostReport};
use crate::analysis::fuel_trim::{FuelTrimAnalyzer, FuelTrimReport, TrimVariant};
use crate::analysis::iam::{IamAnalyzer, IamReport};
use crate::analysis::knock::{KnockDetector, KnockReport};
use crate::analysis::load_limit::{LoadLimitAnalyzer, LoadLimitReport};
use crate::analysis::temperature::{TemperatureAnalyzer, TemperatureReport, TemperatureSensor};
use crate::analysis::LogAnalyzer;
use crate::autotune::{AutoTuneEngine, AutoTuneSummary};
use crate::calibration::Calibration;
use crate::datalog::LogData;
use crate::error::AnalysisError;
use crate::issues::{compile, AnalyzerResults, CompileOptions, Issue, IssueSummary};
use crate::settings::AnalysisSettings;

/// Every report produced by one session run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    /// Knock detector report
    pub knock: KnockReport,
    /// Boost control report
    pub boost: BoostReport,
    /// Air/fuel ratio report
    pub afr: AfrReport,
    /// Short-term fuel trim report
    pub short_term_trim: FuelTrimReport,
    /// Long-term fuel trim report
    pub long_term_trim: FuelTrimReport,
    /// Load limit report
    pub load_limit: LoadLimitReport,
    /// IAM report
    pub iam: IamReport,
    /// Coolant temperature report
    pub coolant: TemperatureReport,
    /// Intake temperature report
    pub intake: TemperatureReport,
    /// Autotune suggestions
    pub autotune: AutoTuneSummary,
    /// Compiled issues in time order
    pub issues: Vec<Issue>,
    /// Counts over `issues`
    pub issue_summary: IssueSummary,
}

impl SessionReport {
    /// Borrow the analyzer reports for issue compilation
    pub fn results(&self) -> AnalyzerResults<'_> {
        AnalyzerResults {
            knock: Some(&self.knock),
            boost: Some(&self.boost),
            afr: Some(&self.afr),
            short_term_trim: Some(&self.short_term_trim),
            long_term_trim: Some(&self.long_term_trim),
            load_limit: Some(&self.load_limit),
            iam: Some(&self.iam),
            coolant: Some(&self.coolant),
            intake: Some(&self.intake),
        }
    }

    /// Rebuild the issue list after a compile option changed
    pub fn recompile(&mut self, options: &CompileOptions) {
        self.issues = compile(&self.results(), options);
        self.issue_summary = IssueSummary::from_issues(&self.issues);
    }

    /// Analyzer ids whose reports carry an error
    pub fn failed_analyzers(&self) -> Vec<&'static str> {
        [
            ("knock", self.knock.is_ok()),
            ("boost", self.boost.is_ok()),
            ("afr", self.afr.is_ok()),
            ("stft", self.short_term_trim.is_ok()),
            ("ltft", self.long_term_trim.is_ok()),
            ("load", self.load_limit.is_ok()),
            ("iam", self.iam.is_ok()),
            ("coolant", self.coolant.is_ok()),
            ("intake", self.intake.is_ok()),
            ("autotune", self.autotune.is_ok()),
        ]
        .into_iter()
        .filter(|(_, ok)| !ok)
        .map(|(id, _)| id)
        .collect()
    }
}

/// Runs the full analysis suite with one set of settings
#[derive(Debug, Clone, Default)]
pub struct AnalysisSession {
    settings: AnalysisSettings,
}

impl AnalysisSession {
    /// Validate and sanitize `settings` for use in every run
    pub fn new(settings: AnalysisSettings) -> Result<Self, AnalysisError> {
        settings.validate()?;
        Ok(Self {
            settings: settings.sanitized(),
        })
    }

    /// Settings after sanitizing
    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Analyze a log against an optional calibration
    pub fn run(&self, log: &LogData, calibration: Option<&Calibration>) -> SessionReport {
        let s = &self.settings;
        let resolver = &s.columns;
        if let Some(calibration) = calibration {
            calibration.log_inconsistencies();
        }

        let knock = KnockDetector::new(s.knock.clone(), resolver.clone())
            .analyze(log, calibration)
            .clone();
        let boost = BoostControlAnalyzer::new(s.boost.clone(), resolver.clone())
            .analyze(log, calibration)
            .clone();
        let afr = AfrAnalyzer::new(s.afr.clone(), resolver.clone())
            .analyze(log, calibration)
            .clone();
        let short_term_trim = FuelTrimAnalyzer::new(
            TrimVariant::ShortTerm,
            s.short_term_trim.clone(),
            resolver.clone(),
        )
        .analyze(log, calibration)
        .clone();
        let long_term_trim = FuelTrimAnalyzer::new(
            TrimVariant::LongTerm,
            s.long_term_trim.clone(),
            resolver.clone(),
        )
        .analyze(log, calibration)
        .clone();
        let load_limit = LoadLimitAnalyzer::new(s.load_limit.clone(), resolver.clone())
            .analyze(log, calibration)
            .clone();
        let iam = IamAnalyzer::new(s.iam.clone(), resolver.clone())
            .analyze_with_knock(log, calibration, Some(&knock.events))
            .clone();
        let coolant = TemperatureAnalyzer::new(
            TemperatureSensor::Coolant,
            s.coolant.clone(),
            resolver.clone(),
        )
        .analyze(log, calibration)
        .clone();
        let intake = TemperatureAnalyzer::new(
            TemperatureSensor::Intake,
            s.intake.clone(),
            resolver.clone(),
        )
        .analyze(log, calibration)
        .clone();
        let autotune = AutoTuneEngine::new(s.autotune.clone(), resolver.clone())
            .analyze(log, calibration)
            .clone();

        let mut report = SessionReport {
            knock,
            boost,
            afr,
            short_term_trim,
            long_term_trim,
            load_limit,
            iam,
            coolant,
            intake,
            autotune,
            issues: Vec::new(),
            issue_summary: IssueSummary::default(),
        };
        report.recompile(&s.issues);

        tracing::debug!(
            "Session over {} samples: {} issues ({} critical)",
            log.len(),
            report.issue_summary.total,
            report.issue_summary.critical
        );
        report
    }
}
