//! Unit Conversion Functions
//!
//! Conversions used when presenting analyzer results:
//! - Pressure: kPa absolute -> PSI gauge
//! - Lambda -> gasoline AFR

/// Standard sea-level atmospheric pressure (kPa)
pub const ATMOSPHERIC_KPA: f64 = 101.325;

/// Stoichiometric AFR for gasoline
pub const GASOLINE_STOICH_AFR: f64 = 14.7;

/// Convert kPa to PSI
pub fn kpa_to_psi(kpa: f64) -> f64 {
    kpa * 0.14503773773020923
}

/// Convert absolute kPa to gauge PSI (boost above atmosphere)
pub fn kpa_to_psi_gauge(kpa: f64) -> f64 {
    kpa_to_psi(kpa - ATMOSPHERIC_KPA)
}

/// Convert Lambda to gasoline AFR
pub fn lambda_to_afr(lambda: f64) -> f64 {
    lambda * GASOLINE_STOICH_AFR
}
