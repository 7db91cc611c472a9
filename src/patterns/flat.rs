//! Flat validator (3-3-5 sideways correction)

use std::collections::HashMap;

use super::{
    helpers::{at_least, at_most, ratio, shape_guard},
    Leg, PatternCheck, PatternKind, Scorecard, Subtype, WaveValidator,
};
use crate::{
    params::{get_factor, get_ratio, ParamMeta, ParamType, ParameterizedValidator},
    Ratio, Result, WaveError,
};

impl_with_defaults!(FlatValidator);

/// Flat: B retraces most of A, C at least a fraction of A.
///
/// The subtype comes from B/A: `weak_b` up to `weak_b_max`, `normal` up to
/// `normal_max`, `expanded` up to `expanded_max`, `running_flat` beyond.
#[derive(Debug, Clone)]
pub struct FlatValidator {
    pub b_min: Ratio,
    pub c_min: f64,
    pub weak_b_max: f64,
    pub normal_max: f64,
    pub expanded_max: f64,
    /// C/B above this reads as an elongated C
    pub c_failure_max: f64,
}

impl Default for FlatValidator {
    fn default() -> Self {
        Self {
            b_min: Ratio::new_const(0.618),
            c_min: 0.382,
            weak_b_max: 0.8,
            normal_max: 1.0,
            expanded_max: 1.236,
            c_failure_max: 1.38,
        }
    }
}

impl FlatValidator {
    fn subtype(&self, b_ratio: f64) -> Subtype {
        if b_ratio <= self.weak_b_max {
            Subtype::WeakB
        } else if b_ratio <= self.normal_max {
            Subtype::Normal
        } else if b_ratio <= self.expanded_max {
            Subtype::Expanded
        } else {
            Subtype::RunningFlat
        }
    }
}

impl WaveValidator for FlatValidator {
    fn kind(&self) -> PatternKind {
        PatternKind::Flat
    }

    fn check<L: Leg>(&self, legs: &[L]) -> PatternCheck {
        if let Some(rejected) = shape_guard(PatternKind::Flat, legs) {
            return rejected;
        }
        let (a, b, c) = (&legs[0], &legs[1], &legs[2]);
        let b_ratio = ratio(b.length(), a.length());
        let c_ratio = ratio(c.length(), a.length());
        let c_vs_b = ratio(c.length(), b.length());
        let mut card = Scorecard::new(PatternKind::Flat);

        card.critical(
            "b_over_a_min",
            "Wave B too small for a flat",
            b_ratio,
            at_least(self.b_min.get()),
            b_ratio >= self.b_min.get(),
        );
        card.critical(
            "c_over_a_min",
            "Wave C too small relative to wave A",
            c_ratio,
            at_least(self.c_min),
            c_ratio >= self.c_min,
        );
        if a.duration() > 0.0 {
            card.soft(
                "b_time",
                "Wave B briefer than wave A",
                ratio(b.duration(), a.duration()),
                at_least(1.0),
                b.duration() >= a.duration(),
                0.1,
            );
            card.soft(
                "c_time",
                "Wave C briefer than wave A",
                ratio(c.duration(), a.duration()),
                at_least(1.0),
                c.duration() >= a.duration(),
                0.1,
            );
        }

        let subtype = self.subtype(b_ratio);
        if subtype == Subtype::WeakB {
            card.soft(
                "weak_b_short_c",
                "Weak-B flat with a C shorter than B",
                c_vs_b,
                at_least(1.0),
                c_vs_b >= 1.0,
                0.1,
            );
        }
        card.soft(
            "c_over_b_max",
            "Wave C elongated relative to wave B",
            c_vs_b,
            at_most(self.c_failure_max),
            c_vs_b <= self.c_failure_max,
            0.1,
        );

        card.finish(1.0, Some(subtype), Some(a.direction()), Vec::new())
    }

    fn validate_config(&self) -> Result<()> {
        let bands = [self.b_min.get(), self.weak_b_max, self.normal_max, self.expanded_max];
        if bands.windows(2).any(|w| w[0] > w[1]) {
            return Err(WaveError::InvalidConfig(
                "flat: expected b_min <= weak_b_max <= normal_max <= expanded_max".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// PARAMETERIZED VALIDATOR IMPLEMENTATION
// ============================================================

static FLAT_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "b_min",
        param_type: ParamType::Ratio,
        default: 0.618,
        range: (0.5, 0.9, 0.05),
        description: "Minimum B retracement of A",
    },
    ParamMeta {
        name: "c_min",
        param_type: ParamType::Factor,
        default: 0.382,
        range: (0.2, 0.8, 0.05),
        description: "Minimum C length relative to A",
    },
    ParamMeta {
        name: "weak_b_max",
        param_type: ParamType::Factor,
        default: 0.8,
        range: (0.618, 0.9, 0.05),
        description: "B/A up to this is a weak-B flat",
    },
    ParamMeta {
        name: "normal_max",
        param_type: ParamType::Factor,
        default: 1.0,
        range: (0.9, 1.1, 0.05),
        description: "B/A up to this is a normal flat",
    },
    ParamMeta {
        name: "expanded_max",
        param_type: ParamType::Factor,
        default: 1.236,
        range: (1.1, 1.618, 0.05),
        description: "B/A up to this is an expanded flat, beyond it a running flat",
    },
    ParamMeta {
        name: "c_failure_max",
        param_type: ParamType::Factor,
        default: 1.38,
        range: (1.0, 2.0, 0.1),
        description: "Maximum C/B before C counts as elongated",
    },
];

impl ParameterizedValidator for FlatValidator {
    fn param_meta() -> &'static [ParamMeta] {
        FLAT_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Self::validated_params(params)?;
        Ok(Self {
            b_min: get_ratio(params, "b_min", 0.618)?,
            c_min: get_factor(params, "c_min", 0.382)?,
            weak_b_max: get_factor(params, "weak_b_max", 0.8)?,
            normal_max: get_factor(params, "normal_max", 1.0)?,
            expanded_max: get_factor(params, "expanded_max", 1.236)?,
            c_failure_max: get_factor(params, "c_failure_max", 1.38)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "FLAT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::tests::legs;

    #[test]
    fn test_normal_flat() {
        let check = FlatValidator::default().check(&legs(&[100.0, 90.0, 100.0, 92.0], &[2, 2, 3]));
        assert!(check.is_valid);
        assert_eq!(check.subtype, Some(Subtype::Normal));
        assert!((check.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_subtype_bands() {
        let v = FlatValidator::default();
        assert_eq!(v.subtype(0.7), Subtype::WeakB);
        assert_eq!(v.subtype(0.95), Subtype::Normal);
        assert_eq!(v.subtype(1.1), Subtype::Expanded);
        assert_eq!(v.subtype(1.5), Subtype::RunningFlat);
    }

    #[test]
    fn test_weak_b_with_short_c() {
        // B/A = 0.7, C/B = 6/7
        let check = FlatValidator::default().check(&legs(&[100.0, 90.0, 97.0, 91.0], &[]));
        assert_eq!(check.subtype, Some(Subtype::WeakB));
        assert!(check.violated().any(|c| c.key == "weak_b_short_c"));
        assert!((check.score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_shallow_b_is_critical() {
        let check = FlatValidator::default().check(&legs(&[100.0, 90.0, 94.0, 85.0], &[]));
        assert_eq!(check.score, 0.0);
        assert!(!check.hard_valid);
    }
}
