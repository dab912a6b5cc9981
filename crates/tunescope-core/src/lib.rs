//! # TuneScope Core Library
//!
//! Datalog analysis and autotune for ECU calibration work.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Column resolution for datalogs from different logging tools
//! - A read-only calibration model with table lookups
//! - Event detectors for knock, boost control, air/fuel ratio, fuel trims,
//!   load limit, IAM and temperatures
//! - An issue compiler that merges every detector's events
//! - An autotune engine that suggests fuel-base and MAF-scale changes
//!
//! ## Example
//!
//! ```rust,ignore
//! use tunescope_core::prelude::*;
//!
//! let calibration = Calibration::load("base.json")?;
//! let log: LogData = serde_json::from_str(&std::fs::read_to_string("pull.json")?)?;
//!
//! let session = AnalysisSession::new(AnalysisSettings::load("settings.json")?)?;
//! let report = session.run(&log, Some(&calibration));
//! for issue in &report.issues {
//!     println!("{:>8.2}s {:?} {}", issue.time, issue.severity, issue.description);
//! }
//!
//! let tuned = download_tune(&report.autotune, &calibration, None)?;
//! tuned.save("tuned.json")?;
//! ```

pub mod analysis;
pub mod autotune;
pub mod calibration;
pub mod datalog;
pub mod error;
pub mod grouping;
pub mod issues;
pub mod session;
pub mod settings;
pub mod unit_conversion;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::analysis::afr::AfrAnalyzer;
    pub use crate::analysis::boost::BoostControlAnalyzer;
    pub use crate::analysis::fuel_trim::{FuelTrimAnalyzer, TrimVariant};
    pub use crate::analysis::iam::IamAnalyzer;
    pub use crate::analysis::knock::KnockDetector;
    pub use crate::analysis::load_limit::LoadLimitAnalyzer;
    pub use crate::analysis::temperature::{TemperatureAnalyzer, TemperatureSensor};
    pub use crate::analysis::{AnalysisReport, LogAnalyzer, Severity};
    pub use crate::autotune::{download_tune, AutoTuneEngine, AutoTuneOptions, AutoTuneSummary};
    pub use crate::calibration::{Calibration, CalibrationTable, TuneValue};
    pub use crate::datalog::{ColumnResolver, LogData, LogRow, Signal, SignalValue};
    pub use crate::error::AnalysisError;
    pub use crate::issues::{
        compile, CompileOptions, Issue, IssueFilter, IssueSeverity, IssueSource, IssueSummary,
    };
    pub use crate::session::{AnalysisSession, SessionReport};
    pub use crate::settings::AnalysisSettings;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
