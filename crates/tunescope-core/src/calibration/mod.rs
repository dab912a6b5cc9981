//! Calibration Model
//!
//! Read-only view of a parsed tune file: named tables with their axes,
//! scalar parameters, and the derived predicates the analyzers rely on
//! (power enrichment, boost/load limits, knock parameters).

mod table;

pub use table::{
    axis_index, interpolate_1d, interpolate_2d, synthesize_voltage_axis, CalibrationTable,
    TableValues,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::AnalysisError;

/// Well-known table and parameter names
pub mod names {
    /// Base fuel map, rows = RPM, columns = load
    pub const FUEL_BASE: &str = "fuel_base";
    /// MAF sensor scaling curve over sensor voltage
    pub const MAF_SCALE: &str = "maf_scale";
    /// Maximum boost over RPM (kPa)
    pub const BOOST_LIMIT: &str = "boost_limit";
    /// Maximum load over RPM (g/rev)
    pub const LOAD_LIMIT: &str = "load_limit";
    /// Wastegate duty ceiling, rows = RPM, columns = throttle
    pub const WASTEGATE_MAX: &str = "wastegate_max";
    /// Power enrichment load threshold over RPM
    pub const PE_ENABLE_LOAD: &str = "pe_enable_load";
    /// Power enrichment throttle threshold over RPM
    pub const PE_ENABLE_TPS: &str = "pe_enable_tps";
    /// Commanded lambda in power enrichment, rows = RPM, columns = load
    pub const PE_TARGET_LAMBDA: &str = "pe_target_lambda";

    /// Knock control disabled below this engine speed (scalar, rpm)
    pub const KNOCK_RPM_MIN: &str = "knock_rpm_min";
    /// Retard removed per knock-control update (scalar, degrees)
    pub const KNOCK_RETARD_DECAY: &str = "knock_retard_decay";
    /// Deepest retard knock control may apply (scalar, degrees)
    pub const KNOCK_RETARD_MAX: &str = "knock_retard_max";
    /// Load below which knock sensitivity rises (scalar, g/rev)
    pub const KNOCK_SENSITIVITY_LOW_LOAD: &str = "knock_sensitivity_low_load";
    /// Initial ignition advance multiplier (scalar)
    pub const IAM_INIT: &str = "iam_init";
    /// Boost error severity ladder (array, kPa, descending)
    pub const BOOST_ERROR_INDEX: &str = "boost_error_index";
}

/// A value in a tune file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TuneValue {
    /// Single number
    Scalar(f64),
    /// Flat list of numbers
    Array(Vec<f64>),
    /// Free text
    String(String),
    /// Flag
    Bool(bool),
}

/// Knock control parameters from the calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnockParameters {
    /// Minimum RPM at which knock retard is considered
    pub rpm_min: f64,
    /// Retard removed per knock-control update (degrees)
    pub retard_decay: f64,
    /// Maximum retard the ECU may apply (degrees, positive)
    pub retard_max: f64,
    /// Load below which the knock sensor is more sensitive (g/rev)
    pub sensitivity_low_load: f64,
}

impl Default for KnockParameters {
    fn default() -> Self {
        Self {
            rpm_min: 1000.0,
            retard_decay: 0.35,
            retard_max: 8.0,
            sensitivity_low_load: 0.81,
        }
    }
}

/// A parsed calibration ("tune") document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Calibration identifier
    #[serde(default)]
    pub name: String,

    /// Last modified timestamp (RFC 3339)
    #[serde(default)]
    pub modified: Option<String>,

    /// Named tables
    #[serde(default)]
    pub tables: BTreeMap<String, CalibrationTable>,

    /// Named parameters
    #[serde(default)]
    pub parameters: BTreeMap<String, TuneValue>,
}

impl Calibration {
    /// Create an empty calibration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Load a calibration document from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AnalysisError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse a calibration document from JSON
    pub fn from_json(content: &str) -> Result<Self, AnalysisError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Save the calibration document as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), AnalysisError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Insert or replace a table
    pub fn set_table(&mut self, name: impl Into<String>, table: CalibrationTable) {
        self.tables.insert(name.into(), table);
    }

    /// Insert or replace a parameter
    pub fn set_parameter(&mut self, name: impl Into<String>, value: TuneValue) {
        self.parameters.insert(name.into(), value);
    }

    /// Get a table whose axes agree with its data
    pub fn table(&self, name: &str) -> Option<&CalibrationTable> {
        self.tables.get(name).filter(|t| t.is_consistent())
    }

    /// Names of tables whose axes disagree with their data
    pub fn inconsistent_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|(_, t)| !t.is_consistent())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Warn once per inconsistent table; lookups treat them as absent
    pub fn log_inconsistencies(&self) {
        for name in self.inconsistent_tables() {
            tracing::warn!(
                "Calibration table '{}' has axes that do not match its data; ignoring it",
                name
            );
        }
    }

    /// Get a table that an operation cannot run without
    pub fn require_table(&self, name: &str) -> Result<&CalibrationTable, AnalysisError> {
        let table = self
            .tables
            .get(name)
            .ok_or_else(|| AnalysisError::MissingTable(name.to_string()))?;
        if !table.is_consistent() {
            let (rows, cols) = table.dimensions();
            return Err(AnalysisError::DimensionMismatch {
                table: name.to_string(),
                expected: format!(
                    "{} rows x {} columns from axes",
                    table.y_axis.as_ref().map(|a| a.len()).unwrap_or(1),
                    table.x_axis.len()
                ),
                actual: format!("{} rows x {} columns", rows, cols),
            });
        }
        Ok(table)
    }

    /// Scalar parameter lookup
    pub fn scalar(&self, name: &str) -> Option<f64> {
        match self.parameters.get(name)? {
            TuneValue::Scalar(v) => Some(*v),
            TuneValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Array parameter lookup
    pub fn array(&self, name: &str) -> Option<&[f64]> {
        match self.parameters.get(name)? {
            TuneValue::Array(v) => Some(v),
            _ => None,
        }
    }

    /// 1D table lookup with interpolation
    pub fn lookup_1d(&self, name: &str, x: f64) -> Option<f64> {
        self.table(name)?.lookup_1d(x)
    }

    /// 2D table lookup with bilinear interpolation (`x` = columns, `y` = rows)
    pub fn lookup_2d(&self, name: &str, x: f64, y: f64) -> Option<f64> {
        self.table(name)?.lookup_2d(x, y)
    }

    /// Whether power enrichment (open loop) is active at an operating point
    pub fn pe_mode_active(&self, rpm: f64, load: f64, throttle: f64) -> bool {
        match self.pe_thresholds(rpm) {
            Some((load_threshold, tps_threshold)) => {
                load >= load_threshold && throttle >= tps_threshold
            }
            None => false,
        }
    }

    /// Power enrichment (load, throttle) enable thresholds at an RPM
    pub fn pe_thresholds(&self, rpm: f64) -> Option<(f64, f64)> {
        let load = self.lookup_1d(names::PE_ENABLE_LOAD, rpm)?;
        let tps = self.lookup_1d(names::PE_ENABLE_TPS, rpm)?;
        Some((load, tps))
    }

    /// Commanded power enrichment lambda at an operating point
    pub fn pe_target_lambda(&self, rpm: f64, load: f64) -> Option<f64> {
        self.lookup_2d(names::PE_TARGET_LAMBDA, load, rpm)
    }

    /// Boost limit at an RPM (kPa)
    pub fn boost_limit(&self, rpm: f64) -> Option<f64> {
        self.lookup_1d(names::BOOST_LIMIT, rpm)
    }

    /// Load limit at an RPM (g/rev)
    pub fn load_limit(&self, rpm: f64) -> Option<f64> {
        self.lookup_1d(names::LOAD_LIMIT, rpm)
    }

    /// Wastegate duty ceiling at (rpm, throttle)
    pub fn wastegate_max(&self, rpm: f64, throttle: f64) -> Option<f64> {
        self.lookup_2d(names::WASTEGATE_MAX, throttle, rpm)
    }

    /// Knock parameters, falling back to defaults per field
    pub fn knock_parameters(&self) -> KnockParameters {
        let defaults = KnockParameters::default();
        KnockParameters {
            rpm_min: self.scalar(names::KNOCK_RPM_MIN).unwrap_or(defaults.rpm_min),
            retard_decay: self
                .scalar(names::KNOCK_RETARD_DECAY)
                .unwrap_or(defaults.retard_decay),
            retard_max: self
                .scalar(names::KNOCK_RETARD_MAX)
                .map(f64::abs)
                .unwrap_or(defaults.retard_max),
            sensitivity_low_load: self
                .scalar(names::KNOCK_SENSITIVITY_LOW_LOAD)
                .unwrap_or(defaults.sensitivity_low_load),
        }
    }

    /// Initial IAM value, if calibrated
    pub fn iam_init(&self) -> Option<f64> {
        self.scalar(names::IAM_INIT)
    }

    /// Boost error severity ladder (kPa, descending), if calibrated
    pub fn boost_error_index(&self) -> Option<[f64; 4]> {
        let values = self.array(names::BOOST_ERROR_INDEX)?;
        if values.len() < 4 {
            return None;
        }
        let mut ladder = [values[0], values[1], values[2], values[3]];
        ladder.sort_by(|a, b| b.total_cmp(a));
        Some(ladder)
    }
}

/// Knock parameters for an optional calibration
pub fn knock_parameters(calibration: Option<&Calibration>) -> KnockParameters {
    calibration
        .map(Calibration::knock_parameters)
        .unwrap_or_default()
}

/// Power enrichment state for an optional calibration
pub fn pe_mode_active(
    calibration: Option<&Calibration>,
    rpm: f64,
    load: f64,
    throttle: f64,
) -> bool {
    calibration
        .map(|c| c.pe_mode_active(rpm, load, throttle))
        .unwrap_or(false)
}
