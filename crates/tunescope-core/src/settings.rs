//! Analysis settings
//!
//! One JSON document carrying every analyzer's thresholds, the autotune
//! options, issue compilation options and column-name overrides. Missing
//! keys fall back to the built-in defaults.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;

use crate::analysis::afr::AfrConfig;
use crate::analysis::boost::BoostConfig;
use crate::analysis::fuel_trim::FuelTrimConfig;
use crate::analysis::iam::IamConfig;
use crate::analysis::knock::KnockConfig;
use crate::analysis::load_limit::LoadLimitConfig;
use crate::analysis::temperature::TemperatureConfig;
use crate::autotune::AutoTuneOptions;
use crate::datalog::ColumnResolver;
use crate::error::AnalysisError;
use crate::issues::CompileOptions;

/// Settings for a full analysis session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisSettings {
    /// Knock detector thresholds
    pub knock: KnockConfig,
    /// Boost control thresholds
    pub boost: BoostConfig,
    /// Air/fuel ratio thresholds
    pub afr: AfrConfig,
    /// Short-term fuel trim thresholds
    pub short_term_trim: FuelTrimConfig,
    /// Long-term fuel trim thresholds; omitted keys take long-term defaults
    #[serde(deserialize_with = "long_term_trim")]
    pub long_term_trim: FuelTrimConfig,
    /// Load limit thresholds
    pub load_limit: LoadLimitConfig,
    /// IAM thresholds
    pub iam: IamConfig,
    /// Coolant thresholds
    pub coolant: TemperatureConfig,
    /// Intake air thresholds; omitted keys take intake defaults
    #[serde(deserialize_with = "intake")]
    pub intake: TemperatureConfig,
    /// Autotune options and filters
    pub autotune: AutoTuneOptions,
    /// Issue compilation options
    pub issues: CompileOptions,
    /// Column overrides shared by every analyzer
    pub columns: ColumnResolver,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            knock: KnockConfig::default(),
            boost: BoostConfig::default(),
            afr: AfrConfig::default(),
            short_term_trim: FuelTrimConfig::short_term(),
            long_term_trim: FuelTrimConfig::long_term(),
            load_limit: LoadLimitConfig::default(),
            iam: IamConfig::default(),
            coolant: TemperatureConfig::coolant(),
            intake: TemperatureConfig::intake(),
            autotune: AutoTuneOptions::default(),
            issues: CompileOptions::default(),
            columns: ColumnResolver::default(),
        }
    }
}

/// Deserialize a partial object on top of `defaults`
fn overlay<'de, D, T>(defaults: T, deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Serialize + DeserializeOwned,
{
    let patch = serde_json::Value::deserialize(deserializer)?;
    let mut merged = serde_json::to_value(defaults).map_err(D::Error::custom)?;
    match (&mut merged, patch) {
        (serde_json::Value::Object(base), serde_json::Value::Object(fields)) => {
            base.extend(fields);
        }
        (_, other) => merged = other,
    }
    serde_json::from_value(merged).map_err(D::Error::custom)
}

fn long_term_trim<'de, D: Deserializer<'de>>(d: D) -> Result<FuelTrimConfig, D::Error> {
    overlay(FuelTrimConfig::long_term(), d)
}

fn intake<'de, D: Deserializer<'de>>(d: D) -> Result<TemperatureConfig, D::Error> {
    overlay(TemperatureConfig::intake(), d)
}

impl AnalysisSettings {
    /// Parse settings from JSON, clamping out-of-range values
    ///
    /// A custom autotune filter that does not parse is rejected here rather
    /// than failing on every sample later.
    pub fn from_json(content: &str) -> Result<Self, AnalysisError> {
        let settings: Self = serde_json::from_str(content)?;
        settings.validate()?;
        Ok(settings.sanitized())
    }

    /// Reject settings that cannot be sanitized into something usable
    pub fn validate(&self) -> Result<(), AnalysisError> {
        self.autotune
            .filters
            .validate()
            .map_err(AnalysisError::InvalidSettings)
    }

    /// Load settings from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AnalysisError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Save settings as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), AnalysisError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Copy with windows and durations non-negative and autotune options
    /// clamped to their supported ranges
    pub fn sanitized(&self) -> Self {
        let mut s = self.clone();
        let non_negative = |v: &mut f64| *v = v.max(0.0);

        non_negative(&mut s.knock.group_window);
        non_negative(&mut s.knock.recovery_max_seconds);
        non_negative(&mut s.boost.group_window);
        non_negative(&mut s.boost.overshoot_min_duration);
        non_negative(&mut s.boost.undershoot_min_duration);
        non_negative(&mut s.afr.group_window);
        for trim in [&mut s.short_term_trim, &mut s.long_term_trim] {
            non_negative(&mut trim.group_window);
            non_negative(&mut trim.min_duration);
        }
        non_negative(&mut s.load_limit.group_window);
        non_negative(&mut s.iam.group_window);
        non_negative(&mut s.iam.stuck_duration);
        non_negative(&mut s.iam.knock_correlation_window);
        non_negative(&mut s.coolant.group_window);
        non_negative(&mut s.intake.group_window);

        s.autotune = s.autotune.sanitized();
        s
    }
}
