//! AutoTune Module
//!
//! Derives fuel-base and MAF-scale corrections from a datalog.
//! Features:
//! - Open-loop (lambda ratio) and closed-loop (fuel trim) accumulation
//! - Triangular cell-centering weights with a minimum hit weight
//! - Change limits relative to the original calibration value
//! - Data filtering (RPM window, coolant floor, custom expressions)
//! - Export of a modified calibration document

mod bins;
mod export;
mod filters;

pub use bins::{centering_weight, CellAccumulator, LoopCell};
pub use export::download_tune;
pub use filters::{AutoTuneFilters, FilterSample};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analysis::require_rows;
use crate::calibration::{axis_index, names, synthesize_voltage_axis, Calibration};
use crate::datalog::{ColumnResolver, LogData, ResolvedColumns, Signal};
use crate::error::AnalysisError;

const SIGNALS: [Signal; 9] = [
    Signal::Rpm,
    Signal::Load,
    Signal::LambdaActual,
    Signal::LambdaTarget,
    Signal::Throttle,
    Signal::ShortTermTrim,
    Signal::LongTermTrim,
    Signal::CoolantTemp,
    Signal::MafVoltage,
];

/// Autotune options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoTuneOptions {
    /// Weighted samples a cell needs before it gets a suggestion
    pub min_samples: usize,
    /// Largest change from the original value, in percent
    pub change_limit_pct: f64,
    /// Samples weighing less than this only count toward hit counts
    pub min_hit_weight: f64,
    /// Sample filters applied before binning
    pub filters: AutoTuneFilters,
}

impl Default for AutoTuneOptions {
    fn default() -> Self {
        Self {
            min_samples: 10,
            change_limit_pct: 10.0,
            min_hit_weight: 0.1,
            filters: AutoTuneFilters::default(),
        }
    }
}

impl AutoTuneOptions {
    /// Smallest accepted change limit (%)
    pub const MIN_CHANGE_LIMIT_PCT: f64 = 0.5;
    /// Largest accepted change limit (%)
    pub const MAX_CHANGE_LIMIT_PCT: f64 = 50.0;

    /// Clamp every option into its supported range
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let change_limit_pct = if self.change_limit_pct.is_nan() {
            defaults.change_limit_pct
        } else {
            self.change_limit_pct
                .clamp(Self::MIN_CHANGE_LIMIT_PCT, Self::MAX_CHANGE_LIMIT_PCT)
        };
        let min_hit_weight = if self.min_hit_weight.is_nan() {
            defaults.min_hit_weight
        } else {
            self.min_hit_weight.clamp(0.0, 1.0)
        };
        Self {
            min_samples: self.min_samples.max(1),
            change_limit_pct,
            min_hit_weight,
            filters: self.filters.clone(),
        }
    }
}

/// Which loop mode produced a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionSource {
    /// Measured vs target lambda while open loop
    OpenLoop,
    /// Fuel trims while closed loop
    ClosedLoop,
}

/// Suggested change for one table cell
///
/// MAF-scale cells use `row` 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellChange {
    /// Table row (load bin)
    pub row: usize,
    /// Table column (rpm bin, or voltage bin for MAF)
    pub col: usize,
    /// Value in the source calibration
    pub current: f64,
    /// Value after the limited change
    pub suggested: f64,
    /// Applied change (%)
    pub change_pct: f64,
    /// Change before the limit was applied
    pub raw_change_pct: f64,
    /// Samples binned into the cell for this loop mode
    pub samples: usize,
    /// Total centering weight of those samples
    pub weight: f64,
    /// Loop mode the suggestion came from
    pub source: CorrectionSource,
    /// The change limit cut this change down
    pub clamped: bool,
}

impl CellChange {
    fn new(
        (row, col): (usize, usize),
        current: f64,
        factor: f64,
        acc: &CellAccumulator,
        source: CorrectionSource,
        change_limit_pct: f64,
    ) -> Self {
        let raw_change_pct = (factor - 1.0) * 100.0;
        let change_pct = raw_change_pct.clamp(-change_limit_pct, change_limit_pct);
        Self {
            row,
            col,
            current,
            suggested: current * (1.0 + change_pct / 100.0),
            change_pct,
            raw_change_pct,
            samples: acc.samples,
            weight: acc.weight,
            source,
            clamped: raw_change_pct.abs() > change_limit_pct,
        }
    }
}

/// Audit record for a change cut down by the change limit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClampedModification {
    /// Calibration table the cell belongs to
    pub table: String,
    /// Table row
    pub row: usize,
    /// Table column
    pub col: usize,
    /// Value in the source calibration
    pub current: f64,
    /// Value the unlimited change would have produced
    pub raw_suggested: f64,
    /// Value after the limited change
    pub suggested: f64,
    /// Unlimited change (%)
    pub raw_change_pct: f64,
    /// Applied change (%)
    pub change_pct: f64,
}

impl ClampedModification {
    fn from_change(table: &str, change: &CellChange) -> Self {
        Self {
            table: table.to_string(),
            row: change.row,
            col: change.col,
            current: change.current,
            raw_suggested: change.current * (1.0 + change.raw_change_pct / 100.0),
            suggested: change.suggested,
            raw_change_pct: change.raw_change_pct,
            change_pct: change.change_pct,
        }
    }
}

/// Sample accounting for one autotune run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoTuneStatistics {
    /// Rows in the log
    pub total_samples: usize,
    /// Samples that reached binning
    pub analyzed_samples: usize,
    /// Missing or non-physical required values
    pub skipped_samples: usize,
    /// Rejected by a data filter
    pub filtered_samples: usize,
    /// Binned but below the minimum hit weight
    pub low_weight_samples: usize,
    /// Analyzed samples taken while open loop
    pub open_loop_samples: usize,
    /// Analyzed samples taken while closed loop
    pub closed_loop_samples: usize,
    /// Samples binned into the MAF-scale curve
    pub maf_samples: usize,
}

/// Result of an autotune run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoTuneSummary {
    /// Open-loop suggestions for the fuel-base map
    pub open_summary: Vec<CellChange>,
    /// Closed-loop suggestions for the fuel-base map
    pub closed_summary: Vec<CellChange>,
    /// Applied fuel-base changes, open loop taking precedence
    pub fuel_changes: Vec<CellChange>,
    /// Fuel-base map with the applied changes
    pub suggested_table: Vec<Vec<f64>>,
    /// Open-loop suggestions for the MAF-scale curve
    pub maf_open_summary: Vec<CellChange>,
    /// Closed-loop suggestions for the MAF-scale curve
    pub maf_closed_summary: Vec<CellChange>,
    /// Applied MAF-scale changes, open loop taking precedence
    pub maf_combined_changes: Vec<CellChange>,
    /// MAF-scale curve with the applied changes; empty when not analyzed
    pub suggested_maf: Vec<f64>,
    /// Every binned sample per fuel-base cell, regardless of weight
    pub hit_counts: Vec<Vec<usize>>,
    /// Every binned sample per MAF-scale cell, regardless of weight
    pub maf_hit_counts: Vec<usize>,
    /// Changes cut down by the change limit, both tables
    pub clamped_modifications: Vec<ClampedModification>,
    /// Cells changed across both tables
    pub modifications_applied: usize,
    /// Sample accounting
    pub statistics: AutoTuneStatistics,
    /// Log column resolved for each signal key
    pub columns: BTreeMap<String, String>,
    /// Non-fatal problems met during the run
    pub warnings: Vec<String>,
    /// Why the run produced no results, when it failed
    pub error: Option<String>,
}

impl AutoTuneSummary {
    /// Whether the run produced usable results
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-loop summaries plus the merged list for one table
struct TableSummary {
    open: Vec<CellChange>,
    closed: Vec<CellChange>,
    combined: Vec<CellChange>,
}

fn summarize(
    cells: &BTreeMap<(usize, usize), LoopCell>,
    current_value: impl Fn(usize, usize) -> f64,
    options: &AutoTuneOptions,
) -> TableSummary {
    let mut summary = TableSummary {
        open: Vec::new(),
        closed: Vec::new(),
        combined: Vec::new(),
    };

    for (&key, cell) in cells {
        let current = current_value(key.0, key.1);
        if !current.is_finite() || current <= 0.0 {
            continue;
        }

        let open = (cell.open.samples >= options.min_samples)
            .then(|| cell.open.mean())
            .flatten()
            .map(|ratio| {
                CellChange::new(
                    key,
                    current,
                    ratio,
                    &cell.open,
                    CorrectionSource::OpenLoop,
                    options.change_limit_pct,
                )
            });
        let closed = (cell.closed.samples >= options.min_samples)
            .then(|| cell.closed.mean())
            .flatten()
            .map(|trim| {
                CellChange::new(
                    key,
                    current,
                    1.0 + trim / 100.0,
                    &cell.closed,
                    CorrectionSource::ClosedLoop,
                    options.change_limit_pct,
                )
            });

        if let Some(change) = open.as_ref().or(closed.as_ref()) {
            summary.combined.push(change.clone());
        }
        summary.open.extend(open);
        summary.closed.extend(closed);
    }

    summary
}

/// MAF-scale curve being analyzed alongside the fuel-base map
struct MafPath {
    column: usize,
    axis: Vec<f64>,
    values: Vec<f64>,
}

/// Autotune engine
#[derive(Debug, Clone, Default)]
pub struct AutoTuneEngine {
    options: AutoTuneOptions,
    resolver: ColumnResolver,
    last: Option<AutoTuneSummary>,
}

impl AutoTuneEngine {
    /// Create an engine; options are sanitized on the way in
    pub fn new(options: AutoTuneOptions, resolver: ColumnResolver) -> Self {
        Self {
            options: options.sanitized(),
            resolver,
            last: None,
        }
    }

    /// Active options after sanitizing
    pub fn options(&self) -> &AutoTuneOptions {
        &self.options
    }

    /// Analyze a log against the calibration it was recorded with
    pub fn analyze(&mut self, log: &LogData, calibration: Option<&Calibration>) -> &AutoTuneSummary {
        let columns = ResolvedColumns::resolve(&self.resolver, log, &SIGNALS);
        let summary = match self.run(log, calibration, &columns) {
            Ok(summary) => summary,
            Err(e) => {
                tracing::debug!("autotune: {}", e);
                AutoTuneSummary {
                    columns: columns.names().clone(),
                    error: Some(e.to_string()),
                    ..AutoTuneSummary::default()
                }
            }
        };
        self.last.insert(summary)
    }

    /// Last computed summary
    pub fn last_summary(&self) -> Option<&AutoTuneSummary> {
        self.last.as_ref()
    }

    fn run(
        &self,
        log: &LogData,
        calibration: Option<&Calibration>,
        columns: &ResolvedColumns,
    ) -> Result<AutoTuneSummary, AnalysisError> {
        let calibration = calibration.ok_or(AnalysisError::MissingCalibration)?;
        require_rows(log)?;
        let rpm_col = columns.require(Signal::Rpm, "engine speed")?;
        let load_col = columns.require(Signal::Load, "engine load")?;
        let lambda_col = columns.require(Signal::LambdaActual, "measured lambda")?;
        let target_col = columns.require(Signal::LambdaTarget, "target lambda")?;
        let throttle_col = columns.index(Signal::Throttle);
        let stft_col = columns.index(Signal::ShortTermTrim);
        let ltft_col = columns.index(Signal::LongTermTrim);
        let coolant_col = columns.index(Signal::CoolantTemp);

        let fuel = calibration.require_table(names::FUEL_BASE)?;
        let (Some(fuel_map), Some(rpm_axis)) = (fuel.map(), fuel.y_axis.as_deref()) else {
            return Err(AnalysisError::DimensionMismatch {
                table: names::FUEL_BASE.to_string(),
                expected: "2D map".to_string(),
                actual: fuel.shape_label(),
            });
        };
        let load_axis = fuel.x_axis.as_slice();

        let mut warnings = Vec::new();
        let maf = match (calibration.table(names::MAF_SCALE), columns.index(Signal::MafVoltage)) {
            (Some(table), Some(column)) => table.curve().map(|values| MafPath {
                column,
                axis: if table.x_axis.is_empty() {
                    synthesize_voltage_axis(values.len())
                } else {
                    table.x_axis.clone()
                },
                values: values.to_vec(),
            }),
            (Some(_), None) => {
                warnings.push("MAF voltage column not found; MAF scale not analyzed".to_string());
                None
            }
            _ => None,
        };
        if self.options.filters.min_coolant.is_some() && coolant_col.is_none() {
            warnings.push("Coolant column not found; coolant filter ignored".to_string());
        }

        let min_weight = self.options.min_hit_weight;
        let mut stats = AutoTuneStatistics::default();
        let mut hit_counts = vec![vec![0usize; load_axis.len()]; rpm_axis.len()];
        let mut maf_hit_counts = vec![0usize; maf.as_ref().map_or(0, |m| m.values.len())];
        let mut cells: BTreeMap<(usize, usize), LoopCell> = BTreeMap::new();
        let mut maf_cells: BTreeMap<(usize, usize), LoopCell> = BTreeMap::new();
        let mut filter_errors = 0usize;
        let mut first_filter_error: Option<String> = None;

        for row in log.rows() {
            stats.total_samples += 1;

            let sample = FilterSample {
                rpm: row.number(rpm_col),
                load: row.number(load_col),
                throttle: row.get_or_zero(throttle_col),
                coolant: row.get(coolant_col),
                lambda: row.number(lambda_col),
                target: row.number(target_col),
                stft: row.get_or_zero(stft_col),
                ltft: row.get_or_zero(ltft_col),
                maf_voltage: maf.as_ref().map_or(0.0, |m| row.number(m.column)),
            };
            let valid = [sample.rpm, sample.load, sample.lambda, sample.target]
                .iter()
                .all(|v| v.is_finite())
                && sample.lambda > 0.0
                && sample.target > 0.0;
            if !valid {
                stats.skipped_samples += 1;
                continue;
            }

            match self.options.filters.accepts(&sample) {
                Ok(true) => {}
                Ok(false) => {
                    stats.filtered_samples += 1;
                    continue;
                }
                Err(e) => {
                    if first_filter_error.is_none() {
                        tracing::warn!("AutoTune custom filter rejected data: {e}");
                        first_filter_error = Some(e);
                    }
                    filter_errors += 1;
                    stats.filtered_samples += 1;
                    continue;
                }
            }

            stats.analyzed_samples += 1;
            let open_loop = calibration.pe_mode_active(sample.rpm, sample.load, sample.throttle);
            if open_loop {
                stats.open_loop_samples += 1;
            } else {
                stats.closed_loop_samples += 1;
            }
            let ratio = sample.lambda / sample.target;
            let trim = sample.stft + sample.ltft;

            let row_idx = axis_index(sample.rpm, rpm_axis);
            let col_idx = axis_index(sample.load, load_axis);
            hit_counts[row_idx][col_idx] += 1;
            let weight = centering_weight(sample.rpm, rpm_axis, row_idx)
                * centering_weight(sample.load, load_axis, col_idx);
            if weight < min_weight {
                stats.low_weight_samples += 1;
            } else {
                cells
                    .entry((row_idx, col_idx))
                    .or_default()
                    .push(open_loop, weight, ratio, trim);
            }

            if let Some(maf) = &maf {
                let voltage = sample.maf_voltage;
                if voltage.is_finite() {
                    stats.maf_samples += 1;
                    let idx = axis_index(voltage, &maf.axis);
                    maf_hit_counts[idx] += 1;
                    let weight = centering_weight(voltage, &maf.axis, idx);
                    if weight >= min_weight {
                        maf_cells
                            .entry((0, idx))
                            .or_default()
                            .push(open_loop, weight, ratio, trim);
                    }
                }
            }
        }

        if let Some(e) = first_filter_error {
            warnings.push(format!(
                "Custom filter failed on {} samples: {}",
                filter_errors, e
            ));
        }

        let fuel_summary = summarize(&cells, |r, c| fuel_map[r][c], &self.options);
        let mut suggested_table = fuel_map.to_vec();
        for change in &fuel_summary.combined {
            suggested_table[change.row][change.col] = change.suggested;
        }

        let (maf_summary, suggested_maf) = match &maf {
            Some(maf) => {
                let summary = summarize(&maf_cells, |_, c| maf.values[c], &self.options);
                let mut curve = maf.values.clone();
                for change in &summary.combined {
                    curve[change.col] = change.suggested;
                }
                (summary, curve)
            }
            None => (
                TableSummary {
                    open: Vec::new(),
                    closed: Vec::new(),
                    combined: Vec::new(),
                },
                Vec::new(),
            ),
        };

        let clamped_modifications: Vec<ClampedModification> = fuel_summary
            .combined
            .iter()
            .filter(|c| c.clamped)
            .map(|c| ClampedModification::from_change(names::FUEL_BASE, c))
            .chain(
                maf_summary
                    .combined
                    .iter()
                    .filter(|c| c.clamped)
                    .map(|c| ClampedModification::from_change(names::MAF_SCALE, c)),
            )
            .collect();
        let modifications_applied = fuel_summary.combined.len() + maf_summary.combined.len();

        tracing::debug!(
            "autotune: {} samples analyzed, {} skipped, {} filtered, {} cell changes",
            stats.analyzed_samples,
            stats.skipped_samples,
            stats.filtered_samples,
            modifications_applied
        );

        Ok(AutoTuneSummary {
            open_summary: fuel_summary.open,
            closed_summary: fuel_summary.closed,
            fuel_changes: fuel_summary.combined,
            suggested_table,
            maf_open_summary: maf_summary.open,
            maf_closed_summary: maf_summary.closed,
            maf_combined_changes: maf_summary.combined,
            suggested_maf,
            hit_counts,
            maf_hit_counts,
            clamped_modifications,
            modifications_applied,
            statistics: stats,
            columns: columns.names().clone(),
            warnings,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationTable;
    use crate::datalog::LogRow;

    const CHANNELS: [&str; 7] = [
        "Engine Speed (rpm)",
        "Engine Load (g/rev)",
        "Air/Fuel Sensor #1 (λ)",
        "Power Mode - Fuel Ratio Target (λ)",
        "Throttle Position (%)",
        "Fuel Trim - Short Term (%)",
        "Fuel Trim - Long Term (%)",
    ];

    fn calibration() -> Calibration {
        let mut cal = Calibration::new("base");
        cal.set_table(
            names::FUEL_BASE,
            CalibrationTable::new_2d(
                vec![0.5, 1.0, 1.5],
                vec![1000.0, 2000.0, 3000.0],
                vec![vec![10.0; 3], vec![20.0; 3], vec![30.0; 3]],
            ),
        );
        cal.set_table(
            names::PE_ENABLE_LOAD,
            CalibrationTable::new_1d(vec![1000.0, 3000.0], vec![1.2, 1.2]),
        );
        cal.set_table(
            names::PE_ENABLE_TPS,
            CalibrationTable::new_1d(vec![1000.0, 3000.0], vec![50.0, 50.0]),
        );
        cal
    }

    /// (rpm, load, lambda, target, throttle, stft, ltft), 0.1 s apart
    fn log(samples: &[(f64, f64, f64, f64, f64, f64, f64)]) -> LogData {
        let rows = samples
            .iter()
            .enumerate()
            .map(|(i, &(rpm, load, lambda, target, tps, stft, ltft))| {
                LogRow::from_numbers(i as f64 * 0.1, &[rpm, load, lambda, target, tps, stft, ltft])
            })
            .collect();
        LogData::new(CHANNELS.iter().map(|s| s.to_string()).collect(), rows)
    }

    fn engine(min_samples: usize, change_limit_pct: f64) -> AutoTuneEngine {
        AutoTuneEngine::new(
            AutoTuneOptions {
                min_samples,
                change_limit_pct,
                ..AutoTuneOptions::default()
            },
            ColumnResolver::default(),
        )
    }

    #[test]
    fn test_options_sanitized() {
        let options = AutoTuneOptions {
            min_samples: 0,
            change_limit_pct: -3.0,
            min_hit_weight: 4.0,
            ..AutoTuneOptions::default()
        }
        .sanitized();
        assert_eq!(options.min_samples, 1);
        assert_eq!(options.change_limit_pct, 0.5);
        assert_eq!(options.min_hit_weight, 1.0);

        let options = AutoTuneOptions {
            change_limit_pct: 80.0,
            ..AutoTuneOptions::default()
        };
        assert_eq!(options.sanitized().change_limit_pct, 50.0);
    }

    #[test]
    fn test_open_loop_clamped_to_limit() {
        // Cell (row 1, col 2): rpm 2500 mid-bin, load 1.75 mid of last bin
        let samples = vec![(2500.0, 1.75, 0.88, 0.8, 80.0, 0.0, 0.0); 30];
        let mut engine = engine(25, 5.0);
        let summary = engine.analyze(&log(&samples), Some(&calibration()));

        assert!(summary.is_ok(), "{:?}", summary.error);
        assert_eq!(summary.statistics.open_loop_samples, 30);
        assert_eq!(summary.open_summary.len(), 1);
        let change = &summary.fuel_changes[0];
        assert_eq!((change.row, change.col), (1, 2));
        assert_eq!(change.source, CorrectionSource::OpenLoop);
        assert!((change.raw_change_pct - 10.0).abs() < 1e-6);
        assert!((change.change_pct - 5.0).abs() < 1e-9);
        assert!((change.suggested - 21.0).abs() < 1e-9);
        assert!(change.clamped);
        assert_eq!(summary.clamped_modifications.len(), 1);
        assert!((summary.clamped_modifications[0].raw_suggested - 22.0).abs() < 1e-6);
        assert!((summary.suggested_table[1][2] - 21.0).abs() < 1e-9);
        assert_eq!(summary.suggested_table[0][0], 10.0);
        assert_eq!(summary.hit_counts[1][2], 30);
    }

    #[test]
    fn test_closed_loop_trims() {
        // stft + ltft = +4 %
        let samples = vec![(1500.0, 0.75, 1.0, 1.0, 10.0, 3.0, 1.0); 12];
        let mut engine = engine(10, 10.0);
        let summary = engine.analyze(&log(&samples), Some(&calibration()));

        assert_eq!(summary.closed_summary.len(), 1);
        let change = &summary.fuel_changes[0];
        assert_eq!(change.source, CorrectionSource::ClosedLoop);
        assert!((change.suggested - 10.4).abs() < 1e-9);
        assert!(!change.clamped);
        assert!(summary.clamped_modifications.is_empty());
    }

    #[test]
    fn test_open_loop_supersedes_closed_loop() {
        let mut samples = vec![(2500.0, 1.25, 1.05, 1.0, 80.0, 0.0, 0.0); 10];
        samples.extend(vec![(2500.0, 1.25, 1.0, 1.0, 10.0, -6.0, 0.0); 10]);
        let mut engine = engine(10, 20.0);
        let summary = engine.analyze(&log(&samples), Some(&calibration()));

        assert_eq!(summary.open_summary.len(), 1);
        assert_eq!(summary.closed_summary.len(), 1);
        assert_eq!(summary.fuel_changes.len(), 1);
        assert_eq!(summary.fuel_changes[0].source, CorrectionSource::OpenLoop);
        assert!((summary.suggested_table[1][1] - 21.0).abs() < 1e-9);
    }

    #[test]
    fn test_min_samples_and_low_weight() {
        // On a breakpoint: weight 0, only counted in the heatmap
        let mut samples = vec![(2000.0, 1.0, 1.1, 1.0, 10.0, 5.0, 0.0); 15];
        samples.extend(vec![(1500.0, 0.75, 1.0, 1.0, 10.0, 5.0, 0.0); 5]);
        let mut engine = engine(10, 10.0);
        let summary = engine.analyze(&log(&samples), Some(&calibration()));

        assert_eq!(summary.statistics.low_weight_samples, 15);
        assert_eq!(summary.hit_counts[1][1], 15);
        assert_eq!(summary.hit_counts[0][0], 5);
        assert!(summary.fuel_changes.is_empty());
        assert_eq!(summary.modifications_applied, 0);
        assert_eq!(summary.suggested_table, vec![vec![10.0; 3], vec![20.0; 3], vec![30.0; 3]]);
    }

    #[test]
    fn test_invalid_samples_skipped() {
        let samples = vec![
            (2500.0, 1.25, 0.0, 1.0, 10.0, 0.0, 0.0),
            (2500.0, 1.25, 1.0, 0.0, 10.0, 0.0, 0.0),
            (f64::NAN, 1.25, 1.0, 1.0, 10.0, 0.0, 0.0),
            (2500.0, 1.25, 1.0, 1.0, 10.0, 0.0, 0.0),
        ];
        let mut engine = engine(1, 10.0);
        let summary = engine.analyze(&log(&samples), Some(&calibration()));
        assert_eq!(summary.statistics.total_samples, 4);
        assert_eq!(summary.statistics.skipped_samples, 3);
        assert_eq!(summary.statistics.analyzed_samples, 1);
    }

    #[test]
    fn test_filters_count_as_filtered() {
        let samples = vec![(2500.0, 1.25, 1.0, 1.0, 10.0, 4.0, 0.0); 10];
        let mut engine = AutoTuneEngine::new(
            AutoTuneOptions {
                min_samples: 1,
                filters: AutoTuneFilters {
                    custom_filter: Some("rpm < 2000".to_string()),
                    ..AutoTuneFilters::default()
                },
                ..AutoTuneOptions::default()
            },
            ColumnResolver::default(),
        );
        let summary = engine.analyze(&log(&samples), Some(&calibration()));
        assert_eq!(summary.statistics.filtered_samples, 10);
        assert_eq!(summary.statistics.skipped_samples, 0);
        assert!(summary.fuel_changes.is_empty());
    }

    #[test]
    fn test_broken_filter_warns() {
        let samples = vec![(2500.0, 1.25, 1.0, 1.0, 10.0, 4.0, 0.0); 3];
        let mut engine = AutoTuneEngine::new(
            AutoTuneOptions {
                filters: AutoTuneFilters {
                    custom_filter: Some("rpm >".to_string()),
                    ..AutoTuneFilters::default()
                },
                ..AutoTuneOptions::default()
            },
            ColumnResolver::default(),
        );
        let summary = engine.analyze(&log(&samples), Some(&calibration()));
        assert_eq!(summary.statistics.filtered_samples, 3);
        assert!(summary.warnings.iter().any(|w| w.contains("3 samples")));
    }

    #[test]
    fn test_maf_scale_path() {
        let mut cal = calibration();
        cal.set_table(
            names::MAF_SCALE,
            CalibrationTable::new_1d(Vec::new(), vec![2.0, 4.0, 8.0, 16.0, 32.0, 64.0]),
        );
        let mut channels: Vec<String> = CHANNELS.iter().map(|s| s.to_string()).collect();
        channels.push("Mass Airflow Sensor Voltage (V)".to_string());
        // Synthesized axis 0,1,2,3,4,5 V; 2.5 V is mid-bin 2
        let rows = (0..10)
            .map(|i| {
                LogRow::from_numbers(
                    i as f64 * 0.1,
                    &[2500.0, 1.25, 1.0, 1.0, 10.0, -2.0, 0.0, 2.5],
                )
            })
            .collect();
        let log = LogData::new(channels, rows);

        let mut engine = engine(10, 10.0);
        let summary = engine.analyze(&log, Some(&cal));

        assert_eq!(summary.maf_hit_counts, vec![0, 0, 10, 0, 0, 0]);
        assert_eq!(summary.maf_combined_changes.len(), 1);
        assert_eq!(summary.maf_combined_changes[0].col, 2);
        assert!((summary.suggested_maf[2] - 7.84).abs() < 1e-9);
        assert_eq!(summary.modifications_applied, 2);
    }

    #[test]
    fn test_missing_inputs_reported() {
        let mut engine = AutoTuneEngine::default();
        let summary = engine.analyze(&log(&[(2500.0, 1.25, 1.0, 1.0, 10.0, 0.0, 0.0)]), None);
        assert_eq!(summary.error.as_deref(), Some("No calibration loaded"));

        let summary = engine.analyze(&log(&[]), Some(&calibration()));
        assert_eq!(summary.error.as_deref(), Some("Log contains no data"));

        let mut cal = calibration();
        cal.tables.remove(names::FUEL_BASE);
        let summary = engine.analyze(&log(&[(2500.0, 1.25, 1.0, 1.0, 10.0, 0.0, 0.0)]), Some(&cal));
        assert!(summary.error.as_deref().unwrap_or("").contains("fuel_base"));
        assert!(engine.last_summary().is_some());
    }
}
