//! Boost control scenarios

mod common;

use common::*;
use pretty_assertions::assert_eq;
use tunescope_core::analysis::boost::{classify_boost_error, BoostConfig, BoostEventType};
use tunescope_core::calibration::names;
use tunescope_core::prelude::*;

fn overshoot_log(error: f64) -> LogData {
    LogBuilder::new(&[RPM, THROTTLE, BOOST, BOOST_TARGET])
        .repeat(0.0, 0.05, 7, &[4500.0, 60.0, 130.0 + error, 130.0])
        .repeat(0.35, 0.05, 34, &[4500.0, 60.0, 130.0, 130.0])
        .build()
}

#[test]
fn sustained_overshoot_forms_one_severe_event() {
    init_tracing();
    let mut analyzer = BoostControlAnalyzer::default();
    let report = analyzer.analyze(&overshoot_log(20.0), None);

    assert!(report.is_ok());
    assert_eq!(report.events.len(), 1);
    let event = &report.events[0];
    assert_eq!(event.event_type, BoostEventType::Overshoot);
    assert_eq!(event.severity, Severity::Severe);
    assert_eq!(event.boost_error, 20.0);
    assert_eq!(event.event_count, 7);
    assert!((event.duration - 0.3).abs() < 1e-9);
    assert_eq!(report.statistics.overshoot_events, 1);
    assert_eq!(report.statistics.max_overshoot, 20.0);
}

#[test]
fn ladder_boundaries() {
    let ladder = BoostConfig::default().severity_ladder;
    let cases = [
        (20.4, Severity::Critical),
        (20.3, Severity::Severe),
        (11.8, Severity::Severe),
        (11.7, Severity::Moderate),
        (5.4, Severity::Moderate),
        (5.3, Severity::Mild),
        (2.2, Severity::Mild),
        (2.1, Severity::Normal),
        (0.0, Severity::Normal),
    ];
    for (error, expected) in cases {
        assert_eq!(classify_boost_error(error, &ladder), expected, "error {error}");
    }
}

#[test]
fn calibrated_error_index_replaces_default_ladder() {
    let mut cal = Calibration::new("ladder");
    cal.set_parameter(
        names::BOOST_ERROR_INDEX,
        TuneValue::Array(vec![25.0, 15.0, 8.0, 3.0]),
    );

    let mut analyzer = BoostControlAnalyzer::default();
    let default_report = analyzer.analyze(&overshoot_log(12.0), None).clone();
    let calibrated = analyzer.analyze(&overshoot_log(12.0), Some(&cal));

    assert_eq!(default_report.events[0].severity, Severity::Severe);
    assert_eq!(calibrated.events[0].severity, Severity::Moderate);
}

#[test]
fn limit_violation_is_critical_even_when_brief() {
    let log = LogBuilder::new(&[RPM, THROTTLE, BOOST, BOOST_TARGET])
        .row(0.0, &[5000.0, 90.0, 240.0, 240.0])
        .row(0.05, &[5000.0, 90.0, 262.0, 255.0])
        .row(0.10, &[5000.0, 90.0, 240.0, 240.0])
        .build();
    let cal = fuel_calibration();
    let mut analyzer = BoostControlAnalyzer::default();
    let report = analyzer.analyze(&log, Some(&cal));

    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].event_type, BoostEventType::LimitViolation);
    assert_eq!(report.events[0].severity, Severity::Critical);
    assert_eq!(report.events[0].boost_limit, Some(250.0));
}

/// Wastegate duty ceiling rising from 40 % at closed throttle to 80 % at WOT
fn wastegate_calibration() -> Calibration {
    let mut cal = Calibration::new("wastegate");
    cal.set_table(
        names::WASTEGATE_MAX,
        CalibrationTable::new_2d(
            vec![0.0, 100.0],
            vec![2000.0, 6000.0],
            vec![vec![40.0, 80.0], vec![40.0, 80.0]],
        ),
    );
    cal
}

#[test]
fn wastegate_ceiling_is_looked_up_by_rpm_and_throttle() {
    let cal = wastegate_calibration();
    assert_eq!(cal.wastegate_max(4500.0, 50.0), Some(60.0));
    assert_eq!(cal.wastegate_max(9000.0, 100.0), Some(80.0));
    assert_eq!(Calibration::new("empty").wastegate_max(4500.0, 50.0), None);
}

#[test]
fn wastegate_saturation_in_both_directions() {
    // Ceiling at 60 % throttle is 64 %, saturated from 60.8 %
    let log = LogBuilder::new(&[RPM, THROTTLE, BOOST, BOOST_TARGET, WG_DUTY])
        .repeat(0.0, 0.05, 7, &[4500.0, 60.0, 150.0, 130.0, 62.0])
        .repeat(2.0, 0.05, 7, &[4500.0, 60.0, 150.0, 130.0, 50.0])
        .repeat(4.0, 0.05, 12, &[4500.0, 80.0, 110.0, 130.0, 3.0])
        .repeat(6.0, 0.05, 12, &[4500.0, 80.0, 110.0, 130.0, 30.0])
        .build();
    let cal = wastegate_calibration();
    let mut analyzer = BoostControlAnalyzer::default();
    let report = analyzer.analyze(&log, Some(&cal));

    let flags: Vec<(BoostEventType, bool)> = report
        .events
        .iter()
        .map(|e| (e.event_type, e.wastegate_saturated))
        .collect();
    assert_eq!(
        flags,
        vec![
            (BoostEventType::Overshoot, true),
            (BoostEventType::Overshoot, false),
            (BoostEventType::Undershoot, true),
            (BoostEventType::Undershoot, false),
        ]
    );
    assert_eq!(report.statistics.wastegate_saturated_events, 2);
}

#[test]
fn overshoot_without_wastegate_table_is_never_saturated() {
    let log = LogBuilder::new(&[RPM, THROTTLE, BOOST, BOOST_TARGET, WG_DUTY])
        .repeat(0.0, 0.05, 7, &[4500.0, 60.0, 150.0, 130.0, 100.0])
        .build();
    let mut analyzer = BoostControlAnalyzer::default();
    let report = analyzer.analyze(&log, None);
    assert_eq!(report.events.len(), 1);
    assert!(!report.events[0].wastegate_saturated);
    assert_eq!(report.statistics.wastegate_saturated_events, 0);
}
