//! Parameter metadata for pattern validators
//!
//! Every validator publishes its thresholds as a static table, enabling:
//! - Building validators from rule-book derived parameter maps
//! - Parameter documentation
//!
//! # Example
//!
//! ```rust
//! use yawc::params::{ParamMeta, ParamType, ParameterizedValidator};
//! use yawc::prelude::*;
//!
//! for param in ZigzagValidator::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use crate::{Ratio, Result, WaveError};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Fraction in 0.0..=1.0 (retracement depths, similarity thresholds)
  Ratio,
  /// Positive multiplier that may exceed 1.0 (extension targets, 1.618)
  Factor,
}

/// Metadata for a single validator parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "wave2_max")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Accepted range and tuning step: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn factor(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Factor, default, range, description }
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    if !value.is_finite() {
      return Err(WaveError::InvalidValue("parameter must be finite"));
    }
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(WaveError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio if !(0.0..=1.0).contains(&value) => {
        Err(WaveError::OutOfRange { field: self.name, value, min: 0.0, max: 1.0 })
      },
      ParamType::Factor if value <= 0.0 => Err(WaveError::InvalidValue("factor must be > 0")),
      _ => Ok(()),
    }
  }
}

// ============================================================
// PARAMETERIZED VALIDATOR TRAIT
// ============================================================

/// Trait for validators that can be built from a parameter map
pub trait ParameterizedValidator: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates a validator with parameters from a HashMap
  ///
  /// Missing parameters use their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  /// Returns the pattern ID string
  fn pattern_id_str() -> &'static str;

  /// Check a parameter map against [`Self::param_meta`]: unknown keys and
  /// out-of-range values are rejected.
  fn validated_params(params: &HashMap<&str, f64>) -> Result<()> {
    let meta = Self::param_meta();
    for (&key, &value) in params {
      let Some(param) = meta.iter().find(|m| m.name == key) else {
        return Err(WaveError::InvalidConfig(format!(
          "{}: unknown parameter '{}'",
          Self::pattern_id_str(),
          key
        )));
      };
      param.validate(value)?;
    }
    Ok(())
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get a positive finite factor from params with default fallback
pub fn get_factor(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<f64> {
  let value = params.get(key).copied().unwrap_or(default);
  if !value.is_finite() || value <= 0.0 {
    return Err(WaveError::InvalidValue("factor must be positive and finite"));
  }
  Ok(value)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;
  use crate::patterns::{ImpulseValidator, ZigzagValidator};

  #[test]
  fn test_param_meta_ratio() {
    let meta = ParamMeta::ratio("wave2_min", 0.236, (0.1, 0.5, 0.05), "Minimum wave-2 retrace");

    assert_eq!(meta.name, "wave2_min");
    assert_eq!(meta.param_type, ParamType::Ratio);
    assert_eq!(meta.default, 0.236);
  }

  #[test]
  fn test_param_meta_factor() {
    let meta = ParamMeta::factor("extension", 1.618, (1.2, 2.618, 0.1), "Extension target");

    assert_eq!(meta.param_type, ParamType::Factor);
    assert_eq!(meta.default, 1.618);
  }

  #[test]
  fn test_validate_ratio() {
    let meta = ParamMeta::ratio("test", 0.5, (0.3, 0.7, 0.1), "Test");

    assert!(meta.validate(0.5).is_ok());
    assert!(meta.validate(0.3).is_ok());
    assert!(meta.validate(0.7).is_ok());
    assert!(meta.validate(0.2).is_err());
    assert!(meta.validate(0.8).is_err());
    assert!(meta.validate(f64::NAN).is_err());
  }

  #[test]
  fn test_validate_factor() {
    let meta = ParamMeta::factor("test", 1.618, (1.0, 3.0, 0.1), "Test");

    assert!(meta.validate(2.618).is_ok());
    assert!(meta.validate(0.9).is_err());
    assert!(meta.validate(3.5).is_err());
  }

  #[test]
  fn test_get_ratio_helper() {
    let mut params = HashMap::new();
    params.insert("key1", 0.8);

    assert!((get_ratio(&params, "key1", 0.5).unwrap().get() - 0.8).abs() < f64::EPSILON);
    assert!((get_ratio(&params, "key2", 0.5).unwrap().get() - 0.5).abs() < f64::EPSILON);
    params.insert("key3", 1.5);
    assert!(get_ratio(&params, "key3", 0.5).is_err());
  }

  #[test]
  fn test_get_factor_helper() {
    let mut params = HashMap::new();
    params.insert("ext", 2.618);

    assert_eq!(get_factor(&params, "ext", 1.618).unwrap(), 2.618);
    assert_eq!(get_factor(&params, "missing", 1.618).unwrap(), 1.618);
    params.insert("bad", -1.0);
    assert!(get_factor(&params, "bad", 1.0).is_err());
  }

  #[test]
  fn test_validated_params_rejects_unknown_key() {
    let mut params = HashMap::new();
    params.insert("no_such_param", 0.5);
    assert!(ZigzagValidator::validated_params(&params).is_err());
    assert!(ZigzagValidator::with_params(&params).is_err());
  }

  #[test]
  fn test_every_default_passes_its_own_meta() {
    for meta in ImpulseValidator::param_meta().iter().chain(ZigzagValidator::param_meta()) {
      assert!(meta.validate(meta.default).is_ok(), "{} default out of range", meta.name);
    }
  }
}
