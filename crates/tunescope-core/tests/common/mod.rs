//! Synthetic logs and calibrations shared by the integration tests

#![allow(dead_code)]

use tunescope_core::calibration::names;
use tunescope_core::prelude::*;

pub const TIME: &str = "Time (s)";
pub const RPM: &str = "Engine Speed (rpm)";
pub const THROTTLE: &str = "Throttle Position (%)";
pub const LOAD: &str = "Engine Load (g/rev)";
pub const KNOCK: &str = "Knock Retard (°)";
pub const LAMBDA: &str = "Air/Fuel Sensor #1 (λ)";
pub const LAMBDA_TARGET: &str = "Power Mode - Fuel Ratio Target (λ)";
pub const BOOST: &str = "Manifold Absolute Pressure (kPa)";
pub const BOOST_TARGET: &str = "Boost Target (kPa)";
pub const STFT: &str = "Fuel Trim - Short Term (%)";
pub const LTFT: &str = "Fuel Trim - Long Term (%)";
pub const IAM: &str = "Ignition Advance Multiplier";
pub const COOLANT: &str = "Coolant Temperature (°C)";
pub const INTAKE: &str = "Intake Air Temperature (°C)";
pub const MAF_VOLTAGE: &str = "Mass Airflow Sensor Voltage (V)";
pub const WG_DUTY: &str = "Wastegate Duty Cycle (%)";

/// Builds a log whose first channel is the time column
pub struct LogBuilder {
    channels: Vec<String>,
    rows: Vec<LogRow>,
}

impl LogBuilder {
    pub fn new(channels: &[&str]) -> Self {
        let mut all = vec![TIME.to_string()];
        all.extend(channels.iter().map(|c| c.to_string()));
        Self {
            channels: all,
            rows: Vec::new(),
        }
    }

    /// Add a sample; `values` follow the channel order given to `new`
    pub fn row(mut self, time: f64, values: &[f64]) -> Self {
        self.push(time, values);
        self
    }

    pub fn push(&mut self, time: f64, values: &[f64]) {
        let mut all = vec![time];
        all.extend_from_slice(values);
        self.rows.push(LogRow::from_numbers(time, &all));
    }

    /// Add `count` identical samples spaced `step` seconds apart
    pub fn repeat(mut self, start: f64, step: f64, count: usize, values: &[f64]) -> Self {
        for i in 0..count {
            self.push(start + step * i as f64, values);
        }
        self
    }

    pub fn build(self) -> LogData {
        LogData::new(self.channels, self.rows)
    }
}

/// Calibration with a 3x3 fuel-base map and PE thresholds of 1.2 g/rev and
/// 50 % throttle
///
/// Fuel base rows are 1000/2000/3000 rpm, columns 0.5/1.0/1.5 g/rev; each
/// row holds 10, 20 and 30.
pub fn fuel_calibration() -> Calibration {
    let mut cal = Calibration::new("stock");
    cal.set_table(
        names::FUEL_BASE,
        CalibrationTable::new_2d(
            vec![0.5, 1.0, 1.5],
            vec![1000.0, 2000.0, 3000.0],
            vec![vec![10.0, 20.0, 30.0]; 3],
        ),
    );
    cal.set_table(
        names::PE_ENABLE_LOAD,
        CalibrationTable::new_1d(vec![1000.0, 7000.0], vec![1.2, 1.2]),
    );
    cal.set_table(
        names::PE_ENABLE_TPS,
        CalibrationTable::new_1d(vec![1000.0, 7000.0], vec![50.0, 50.0]),
    );
    cal.set_table(
        names::BOOST_LIMIT,
        CalibrationTable::new_1d(vec![1000.0, 7000.0], vec![250.0, 250.0]),
    );
    cal.set_parameter(names::IAM_INIT, TuneValue::Scalar(0.5));
    cal
}

/// Route library tracing to the test output; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
