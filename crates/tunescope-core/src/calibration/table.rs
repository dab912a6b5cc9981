//! Calibration tables
//!
//! 1D curves and 2D maps with their breakpoint axes, plus the lookup
//! primitives shared by the analyzers and the autotune engine.

use serde::{Deserialize, Serialize};

/// Table data, row-major for 2D maps (`values[y][x]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableValues {
    /// Map, one inner vector per row
    TwoD(Vec<Vec<f64>>),
    /// Curve
    OneD(Vec<f64>),
}

/// A calibration table and its axes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTable {
    /// Column breakpoints (the only axis of a 1D table)
    #[serde(default)]
    pub x_axis: Vec<f64>,
    /// Row breakpoints, 2D tables only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_axis: Option<Vec<f64>>,
    /// Cell values
    pub values: TableValues,
}

impl CalibrationTable {
    /// Create a 1D curve
    pub fn new_1d(x_axis: Vec<f64>, values: Vec<f64>) -> Self {
        Self {
            x_axis,
            y_axis: None,
            values: TableValues::OneD(values),
        }
    }

    /// Create a 2D map; `values` has one row per `y_axis` entry
    pub fn new_2d(x_axis: Vec<f64>, y_axis: Vec<f64>, values: Vec<Vec<f64>>) -> Self {
        Self {
            x_axis,
            y_axis: Some(y_axis),
            values: TableValues::TwoD(values),
        }
    }

    /// Whether this is a 2D map
    pub fn is_2d(&self) -> bool {
        matches!(self.values, TableValues::TwoD(_))
    }

    /// (rows, columns); a 1D curve has one row
    pub fn dimensions(&self) -> (usize, usize) {
        match &self.values {
            TableValues::OneD(v) => (1, v.len()),
            TableValues::TwoD(rows) => (rows.len(), rows.first().map(|r| r.len()).unwrap_or(0)),
        }
    }

    /// Human-readable shape, e.g. "16x16"
    pub fn shape_label(&self) -> String {
        let (rows, cols) = self.dimensions();
        if self.is_2d() {
            format!("{}x{}", rows, cols)
        } else {
            format!("{}", cols)
        }
    }

    /// Check that every axis matches the data it indexes
    pub fn is_consistent(&self) -> bool {
        match &self.values {
            TableValues::OneD(v) => {
                !v.is_empty() && (self.x_axis.is_empty() || self.x_axis.len() == v.len())
            }
            TableValues::TwoD(rows) => {
                let Some(y_axis) = &self.y_axis else {
                    return false;
                };
                !rows.is_empty()
                    && y_axis.len() == rows.len()
                    && rows.iter().all(|r| r.len() == self.x_axis.len())
                    && !self.x_axis.is_empty()
            }
        }
    }

    /// 1D values, if this is a curve
    pub fn curve(&self) -> Option<&[f64]> {
        match &self.values {
            TableValues::OneD(v) => Some(v),
            TableValues::TwoD(_) => None,
        }
    }

    /// 2D values, if this is a map
    pub fn map(&self) -> Option<&[Vec<f64>]> {
        match &self.values {
            TableValues::TwoD(rows) => Some(rows),
            TableValues::OneD(_) => None,
        }
    }

    /// Look up a 1D curve at `x` with linear interpolation
    pub fn lookup_1d(&self, x: f64) -> Option<f64> {
        let values = self.curve()?;
        if self.x_axis.len() != values.len() {
            return None;
        }
        Some(interpolate_1d(&self.x_axis, values, x))
    }

    /// Look up a 2D map at (`x`, `y`) with bilinear interpolation
    pub fn lookup_2d(&self, x: f64, y: f64) -> Option<f64> {
        if !self.is_consistent() {
            return None;
        }
        let rows = self.map()?;
        let y_axis = self.y_axis.as_deref()?;
        Some(interpolate_2d(rows, &self.x_axis, y_axis, x, y))
    }
}

/// Index of the last breakpoint at or below `value`, clamped to the axis
///
/// Values below `axis[0]` land in bin 0 and values past the last breakpoint
/// land in the last bin.
pub fn axis_index(value: f64, axis: &[f64]) -> usize {
    if axis.is_empty() {
        return 0;
    }
    axis.iter()
        .rposition(|&bp| bp <= value)
        .unwrap_or(0)
}

/// Breakpoints on either side of `value` and the fraction of the way between them
///
/// Built on [`axis_index`], so the same clamping applies: outside the axis
/// the result weights the edge breakpoint fully.
fn bracket(value: f64, axis: &[f64]) -> (usize, usize, f64) {
    if axis.is_empty() {
        return (0, 0, 0.0);
    }
    let lo = axis_index(value, axis);
    let hi = (lo + 1).min(axis.len() - 1);
    let span = axis[hi] - axis[lo];
    if hi == lo || span.abs() < f64::EPSILON {
        return (lo, lo, 0.0);
    }
    (lo, hi, ((value - axis[lo]) / span).clamp(0.0, 1.0))
}

/// Linear interpolation along a curve, clamped at both ends
pub fn interpolate_1d(axis: &[f64], values: &[f64], x: f64) -> f64 {
    assert_eq!(
        axis.len(),
        values.len(),
        "axis length must match curve length"
    );
    if values.is_empty() {
        return 0.0;
    }
    let (i0, i1, t) = bracket(x, axis);
    values[i0] + (values[i1] - values[i0]) * t
}

/// Bilinear interpolation for a point in a row-major table
///
/// `x` indexes columns and `y` indexes rows; both clamp at the table edges.
pub fn interpolate_2d(
    values: &[Vec<f64>],
    x_axis: &[f64],
    y_axis: &[f64],
    x: f64,
    y: f64,
) -> f64 {
    assert_eq!(y_axis.len(), values.len(), "row axis length must match table rows");
    assert!(
        values.iter().all(|row| row.len() == x_axis.len()),
        "column axis length must match table columns"
    );
    if values.is_empty() || x_axis.is_empty() {
        return 0.0;
    }

    let (x0, x1, tx) = bracket(x, x_axis);
    let (y0, y1, ty) = bracket(y, y_axis);

    let v00 = values[y0][x0];
    let v10 = values[y0][x1];
    let v01 = values[y1][x0];
    let v11 = values[y1][x1];

    let top = v00 + (v10 - v00) * tx;
    let bottom = v01 + (v11 - v01) * tx;

    top + (bottom - top) * ty
}

/// Linear 0-5 V axis matching a curve length
pub fn synthesize_voltage_axis(len: usize) -> Vec<f64> {
    match len {
        0 => Vec::new(),
        1 => vec![0.0],
        n => (0..n).map(|i| 5.0 * i as f64 / (n - 1) as f64).collect(),
    }
}
