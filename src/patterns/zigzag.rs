//! Zigzag validator (5-3-5 sharp correction)

use std::collections::HashMap;

use super::{
    helpers::{at_least, at_most, ratio, shape_guard},
    Leg, PatternCheck, PatternKind, Scorecard, Subtype, WaveValidator,
};
use crate::{
    params::{get_factor, get_ratio, ParamMeta, ParamType, ParameterizedValidator},
    Ratio, Result, WaveError,
};

impl_with_defaults!(ZigzagValidator);

/// Zigzag: shallow B, C carrying at least a fraction of A.
///
/// Subtype from C/A: `truncated` below the typical ratio, `elongated` above
/// the elongation ratio, `normal` in between. Both outer subtypes cost 0.1.
#[derive(Debug, Clone)]
pub struct ZigzagValidator {
    pub b_max: Ratio,
    pub c_min: f64,
    pub c_typical: f64,
    pub c_elongated: f64,
}

impl Default for ZigzagValidator {
    fn default() -> Self {
        Self {
            b_max: Ratio::new_const(0.618),
            c_min: 0.382,
            c_typical: 0.618,
            c_elongated: 1.618,
        }
    }
}

impl WaveValidator for ZigzagValidator {
    fn kind(&self) -> PatternKind {
        PatternKind::Zigzag
    }

    fn check<L: Leg>(&self, legs: &[L]) -> PatternCheck {
        if let Some(rejected) = shape_guard(PatternKind::Zigzag, legs) {
            return rejected;
        }
        let (a, b, c) = (&legs[0], &legs[1], &legs[2]);
        let b_ratio = ratio(b.length(), a.length());
        let c_ratio = ratio(c.length(), a.length());
        let mut card = Scorecard::new(PatternKind::Zigzag);

        card.critical(
            "b_over_a_max",
            "Wave B retraces too much for a zigzag",
            b_ratio,
            at_most(self.b_max.get()),
            b_ratio <= self.b_max.get(),
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

        let subtype = if c_ratio < self.c_typical {
            Subtype::Truncated
        } else if c_ratio > self.c_elongated {
            Subtype::Elongated
        } else {
            Subtype::Normal
        };
        card.soft(
            "c_typical",
            "Wave C outside its typical range",
            c_ratio,
            format!("{:.3} - {:.3}", self.c_typical, self.c_elongated),
            subtype == Subtype::Normal,
            0.1,
        );

        card.finish(1.0, Some(subtype), Some(a.direction()), Vec::new())
    }

    fn validate_config(&self) -> Result<()> {
        if !(self.c_min <= self.c_typical && self.c_typical <= self.c_elongated) {
            return Err(WaveError::InvalidConfig(
                "zigzag: expected c_min <= c_typical <= c_elongated".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// PARAMETERIZED VALIDATOR IMPLEMENTATION
// ============================================================

static ZIGZAG_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "b_max",
        param_type: ParamType::Ratio,
        default: 0.618,
        range: (0.382, 0.8, 0.05),
        description: "Maximum B retracement of A",
    },
    ParamMeta {
        name: "c_min",
        param_type: ParamType::Factor,
        default: 0.382,
        range: (0.2, 0.618, 0.05),
        description: "Minimum C length relative to A",
    },
    ParamMeta {
        name: "c_typical",
        param_type: ParamType::Factor,
        default: 0.618,
        range: (0.5, 1.0, 0.05),
        description: "C/A below this is a truncated zigzag",
    },
    ParamMeta {
        name: "c_elongated",
        param_type: ParamType::Factor,
        default: 1.618,
        range: (1.236, 2.618, 0.1),
        description: "C/A above this is an elongated zigzag",
    },
];

impl ParameterizedValidator for ZigzagValidator {
    fn param_meta() -> &'static [ParamMeta] {
        ZIGZAG_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Self::validated_params(params)?;
        Ok(Self {
            b_max: get_ratio(params, "b_max", 0.618)?,
            c_min: get_factor(params, "c_min", 0.382)?,
            c_typical: get_factor(params, "c_typical", 0.618)?,
            c_elongated: get_factor(params, "c_elongated", 1.618)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "ZIGZAG"
    }
}
