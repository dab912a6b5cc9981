//! Autotune data filters
//!
//! RPM window, coolant floor, and an optional user expression evaluated
//! with `evalexpr` against each sample.

use evalexpr::{
    build_operator_tree, eval_with_context, ContextWithMutableVariables, HashMapContext, Value,
};
use serde::{Deserialize, Serialize};

/// Sample filters applied before binning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoTuneFilters {
    /// Samples below this are dropped (rpm)
    pub min_rpm: Option<f64>,
    /// Samples above this are dropped (rpm)
    pub max_rpm: Option<f64>,
    /// Ignored when the log has no coolant column (°C)
    pub min_coolant: Option<f64>,
    /// Boolean expression over `rpm, load, throttle, coolant, lambda,
    /// target, stft, ltft, maf_voltage`
    pub custom_filter: Option<String>,
}

/// Values a filter can see for one log sample
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSample {
    /// Engine speed (rpm)
    pub rpm: f64,
    /// Load (g/rev)
    pub load: f64,
    /// Throttle (%)
    pub throttle: f64,
    /// Coolant temperature, when logged (°C)
    pub coolant: Option<f64>,
    /// Measured lambda
    pub lambda: f64,
    /// Target lambda
    pub target: f64,
    /// Short-term trim (%)
    pub stft: f64,
    /// Long-term trim (%)
    pub ltft: f64,
    /// MAF sensor voltage (V)
    pub maf_voltage: f64,
}

impl AutoTuneFilters {
    /// Whether any filter is configured
    pub fn is_active(&self) -> bool {
        self.min_rpm.is_some()
            || self.max_rpm.is_some()
            || self.min_coolant.is_some()
            || self.custom_expression().is_some()
    }

    fn custom_expression(&self) -> Option<&str> {
        self.custom_filter
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    /// Syntax-check the custom expression without evaluating it
    pub fn validate(&self) -> Result<(), String> {
        match self.custom_expression() {
            Some(expr) => build_operator_tree(expr)
                .map(|_| ())
                .map_err(|e| format!("Custom filter '{expr}' does not parse: {e}")),
            None => Ok(()),
        }
    }

    /// Check a sample; `Err` carries an expression evaluation failure
    pub fn accepts(&self, sample: &FilterSample) -> Result<bool, String> {
        if self.min_rpm.is_some_and(|min| sample.rpm < min)
            || self.max_rpm.is_some_and(|max| sample.rpm > max)
        {
            return Ok(false);
        }
        if let (Some(min), Some(coolant)) = (self.min_coolant, sample.coolant) {
            if coolant < min {
                return Ok(false);
            }
        }
        match self.custom_expression() {
            Some(expr) => evaluate_custom_filter(expr, sample),
            None => Ok(true),
        }
    }
}

fn evaluate_custom_filter(expr: &str, sample: &FilterSample) -> Result<bool, String> {
    let mut ctx = HashMapContext::new();

    let set_value = |ctx: &mut HashMapContext, name: &str, value: Value| {
        ctx.set_value(name.to_string(), value)
            .map_err(|e| format!("Failed to set {name}: {e}"))
    };

    set_value(&mut ctx, "rpm", sample.rpm.into())?;
    set_value(&mut ctx, "load", sample.load.into())?;
    set_value(&mut ctx, "throttle", sample.throttle.into())?;
    if let Some(coolant) = sample.coolant {
        set_value(&mut ctx, "coolant", coolant.into())?;
    }
    set_value(&mut ctx, "lambda", sample.lambda.into())?;
    set_value(&mut ctx, "target", sample.target.into())?;
    set_value(&mut ctx, "stft", sample.stft.into())?;
    set_value(&mut ctx, "ltft", sample.ltft.into())?;
    set_value(&mut ctx, "maf_voltage", sample.maf_voltage.into())?;

    match eval_with_context(expr, &ctx) {
        Ok(Value::Boolean(val)) => Ok(val),
        Ok(Value::Int(val)) => Ok(val != 0),
        Ok(Value::Float(val)) => Ok(val != 0.0),
        Ok(other) => Err(format!(
            "Custom filter must return boolean or number, got {other:?}"
        )),
        Err(e) => Err(format!("Custom filter eval error: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FilterSample {
        FilterSample {
            rpm: 2500.0,
            load: 1.2,
            throttle: 25.0,
            coolant: Some(85.0),
            lambda: 1.0,
            target: 1.0,
            ..FilterSample::default()
        }
    }

    #[test]
    fn test_rpm_window_and_coolant() {
        let filters = AutoTuneFilters {
            min_rpm: Some(1000.0),
            max_rpm: Some(3000.0),
            min_coolant: Some(70.0),
            ..AutoTuneFilters::default()
        };
        assert_eq!(filters.accepts(&sample()), Ok(true));

        let high = FilterSample {
            rpm: 3500.0,
            ..sample()
        };
        assert_eq!(filters.accepts(&high), Ok(false));

        let cold = FilterSample {
            coolant: Some(40.0),
            ..sample()
        };
        assert_eq!(filters.accepts(&cold), Ok(false));

        let unlogged = FilterSample {
            coolant: None,
            ..sample()
        };
        assert_eq!(filters.accepts(&unlogged), Ok(true));
    }

    #[test]
    fn test_custom_filter_matches() {
        let filters = AutoTuneFilters {
            custom_filter: Some("rpm > 2000 && throttle < 50 && coolant > 70".to_string()),
            ..AutoTuneFilters::default()
        };
        assert!(filters.is_active());
        assert_eq!(filters.accepts(&sample()), Ok(true));

        let filters = AutoTuneFilters {
            custom_filter: Some("rpm > 3000 && lambda < 0.9".to_string()),
            ..AutoTuneFilters::default()
        };
        assert_eq!(filters.accepts(&sample()), Ok(false));
    }

    #[test]
    fn test_invalid_expression_is_an_error() {
        let filters = AutoTuneFilters {
            custom_filter: Some("rpm >".to_string()),
            ..AutoTuneFilters::default()
        };
        assert!(filters.accepts(&sample()).is_err());
    }

    #[test]
    fn test_validate_catches_unbalanced_braces() {
        let filters = AutoTuneFilters {
            custom_filter: Some("(rpm > 2000".to_string()),
            ..AutoTuneFilters::default()
        };
        assert!(filters.validate().is_err());
        assert_eq!(AutoTuneFilters::default().validate(), Ok(()));
    }

    #[test]
    fn test_blank_expression_is_ignored() {
        let filters = AutoTuneFilters {
            custom_filter: Some("   ".to_string()),
            ..AutoTuneFilters::default()
        };
        assert!(!filters.is_active());
        assert_eq!(filters.accepts(&sample()), Ok(true));
    }
}
