//! Knock detector scenarios

mod common;

use common::*;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tunescope_core::analysis::knock::{classify_knock, KnockConfig};
use tunescope_core::calibration::KnockParameters;
use tunescope_core::prelude::*;

#[test]
fn five_consecutive_samples_form_one_severe_event() {
    init_tracing();
    let log = LogBuilder::new(&[RPM, LOAD, KNOCK])
        .repeat(9.0, 0.01, 50, &[3000.0, 1.0, 0.0])
        .repeat(10.0, 0.01, 5, &[3000.0, 1.0, -5.0])
        .repeat(10.05, 0.01, 50, &[3000.0, 1.0, 0.0])
        .build();

    let mut detector = KnockDetector::default();
    let report = detector.analyze(&log, None);

    assert!(report.is_ok());
    assert_eq!(report.events.len(), 1);
    let event = &report.events[0];
    assert_eq!(event.time, 10.0);
    assert!((event.end_time - 10.04).abs() < 1e-9);
    assert!((event.duration - 0.04).abs() < 1e-9);
    assert_eq!(event.severity, Severity::Severe);
    assert_eq!(event.knock_retard, -5.0);
    assert_eq!(event.event_count, 5);
    assert_eq!(report.statistics.severe_events, 1);
    assert_eq!(report.statistics.knock_samples, 5);
}

#[test]
fn severity_ladder_holds_for_random_samples() {
    let params = KnockParameters::default();
    let config = KnockConfig::default();
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..2000 {
        let retard: f64 = rng.gen_range(-12.0..-0.001);
        let load: f64 = rng.gen_range(0.2..2.5);
        let shift = if load < 0.81 { 0.5 } else { 0.0 };
        let expected = if retard < -6.0 + shift {
            Severity::Critical
        } else if retard < -4.0 + shift {
            Severity::Severe
        } else if retard < -2.0 + shift {
            Severity::Moderate
        } else {
            Severity::Mild
        };
        assert_eq!(
            classify_knock(retard, load, &params, &config),
            expected,
            "retard {retard} at load {load}"
        );
    }
}

#[test]
fn low_load_moves_boundary_samples_up_a_tier() {
    let params = KnockParameters::default();
    let config = KnockConfig::default();
    assert_eq!(classify_knock(-5.8, 1.0, &params, &config), Severity::Severe);
    assert_eq!(classify_knock(-5.8, 0.5, &params, &config), Severity::Critical);
    assert_eq!(classify_knock(-1.8, 1.0, &params, &config), Severity::Mild);
    assert_eq!(classify_knock(-1.8, 0.5, &params, &config), Severity::Moderate);
}

#[test]
fn samples_below_rpm_minimum_are_ignored() {
    let log = LogBuilder::new(&[RPM, LOAD, KNOCK])
        .repeat(0.0, 0.05, 5, &[900.0, 1.0, -8.0])
        .build();
    let mut detector = KnockDetector::default();
    assert!(detector.analyze(&log, None).events.is_empty());
}

#[test]
fn events_flag_power_enrichment() {
    let log = LogBuilder::new(&[RPM, LOAD, THROTTLE, KNOCK])
        .repeat(0.0, 0.02, 3, &[4000.0, 1.6, 90.0, -2.5])
        .build();
    let cal = fuel_calibration();
    let mut detector = KnockDetector::default();
    let report = detector.analyze(&log, Some(&cal));

    assert_eq!(report.events.len(), 1);
    assert!(report.events[0].is_pe_mode);
    assert_eq!(report.statistics.pe_mode_events, 1);
}
