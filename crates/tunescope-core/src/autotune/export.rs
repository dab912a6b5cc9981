//! Writing autotune results into a calibration document

use chrono::Utc;

use super::AutoTuneSummary;
use crate::calibration::{names, Calibration, CalibrationTable, TableValues};
use crate::error::AnalysisError;

fn shape(table: &CalibrationTable) -> String {
    format!(
        "{} (x axis {}, y axis {})",
        table.shape_label(),
        table.x_axis.len(),
        table.y_axis.as_ref().map_or(0, Vec::len)
    )
}

/// Fail unless `target` has exactly the analyzed table's shape and axes
fn check_same_shape(
    name: &str,
    analyzed: &CalibrationTable,
    target: &CalibrationTable,
) -> Result<(), AnalysisError> {
    let same = analyzed.dimensions() == target.dimensions()
        && analyzed.is_2d() == target.is_2d()
        && analyzed.x_axis.len() == target.x_axis.len()
        && analyzed.y_axis.as_ref().map(Vec::len) == target.y_axis.as_ref().map(Vec::len);
    if same {
        Ok(())
    } else {
        Err(AnalysisError::DimensionMismatch {
            table: name.to_string(),
            expected: shape(analyzed),
            actual: shape(target),
        })
    }
}

fn replace_values(
    target: &mut Calibration,
    analyzed: &Calibration,
    name: &str,
    values: TableValues,
) -> Result<(), AnalysisError> {
    let source = analyzed.require_table(name)?;
    let destination = target
        .tables
        .get_mut(name)
        .ok_or_else(|| AnalysisError::MissingTable(name.to_string()))?;
    check_same_shape(name, source, destination)?;

    let suggested = CalibrationTable {
        values,
        ..source.clone()
    };
    check_same_shape(name, source, &suggested)?;
    destination.values = suggested.values;
    Ok(())
}

/// Build a modified calibration from an autotune summary
///
/// Clones `base` (or `analyzed` when no base is given) and overwrites the
/// fuel-base and MAF-scale values; every other table and parameter is kept.
/// Suggested values are absolute, so applying the same summary to an already
/// exported document yields the same tables.
pub fn download_tune(
    summary: &AutoTuneSummary,
    analyzed: &Calibration,
    base: Option<&Calibration>,
) -> Result<Calibration, AnalysisError> {
    let mut target = base.unwrap_or(analyzed).clone();

    replace_values(
        &mut target,
        analyzed,
        names::FUEL_BASE,
        TableValues::TwoD(summary.suggested_table.clone()),
    )?;
    if !summary.suggested_maf.is_empty() {
        replace_values(
            &mut target,
            analyzed,
            names::MAF_SCALE,
            TableValues::OneD(summary.suggested_maf.clone()),
        )?;
    }

    target.modified = Some(Utc::now().to_rfc3339());
    tracing::info!(
        "Applied {} autotune modifications to '{}'",
        summary.modifications_applied,
        target.name
    );
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibration(rows: usize) -> Calibration {
        let mut cal = Calibration::new("base");
        cal.set_table(
            names::FUEL_BASE,
            CalibrationTable::new_2d(
                vec![0.5, 1.0],
                (0..rows).map(|r| 1000.0 * (r + 1) as f64).collect(),
                vec![vec![10.0, 10.0]; rows],
            ),
        );
        cal.set_table(
            names::BOOST_LIMIT,
            CalibrationTable::new_1d(vec![1000.0], vec![200.0]),
        );
        cal
    }

    fn summary() -> AutoTuneSummary {
        AutoTuneSummary {
            suggested_table: vec![vec![10.0, 11.0], vec![10.0, 9.5]],
            modifications_applied: 2,
            ..AutoTuneSummary::default()
        }
    }

    #[test]
    fn test_overwrites_only_fuel_base() {
        let analyzed = calibration(2);
        let tuned = download_tune(&summary(), &analyzed, None).expect("export");

        let fuel = tuned.table(names::FUEL_BASE).expect("fuel table");
        assert_eq!(fuel.map(), Some(&summary().suggested_table[..]));
        assert_eq!(fuel.x_axis, vec![0.5, 1.0]);
        assert_eq!(
            tuned.table(names::BOOST_LIMIT),
            analyzed.table(names::BOOST_LIMIT)
        );
        assert!(tuned.modified.is_some());
        assert!(analyzed.modified.is_none());
    }

    #[test]
    fn test_base_with_other_shape_refused() {
        let analyzed = calibration(2);
        let base = calibration(3);
        let err = download_tune(&summary(), &analyzed, Some(&base)).unwrap_err();
        assert!(matches!(err, AnalysisError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_summary_without_results_refused() {
        let analyzed = calibration(2);
        let err = download_tune(&AutoTuneSummary::default(), &analyzed, None).unwrap_err();
        assert!(matches!(err, AnalysisError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_missing_maf_table_refused() {
        let analyzed = calibration(2);
        let summary = AutoTuneSummary {
            suggested_maf: vec![1.0, 2.0],
            ..summary()
        };
        let err = download_tune(&summary, &analyzed, None).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingTable(_)));
    }
}
