//! Combination validators (double and triple threes)
//!
//! A combination chains simple corrections through single-leg connectors.
//! Each segment is fitted against the simple corrective validators held in
//! a [`CorrectionSet`]; the combination score is the mean segment score less
//! the structural penalties.

use std::collections::HashMap;

use super::{
    helpers::{at_least, at_most, flag, ratio, shape_guard},
    BuiltinValidator, FlatValidator, Leg, PatternCheck, PatternKind, Scorecard, SegmentFit,
    TriangleValidator, WaveValidator, ZigzagValidator,
};
use crate::{
    params::{get_factor, ParamMeta, ParamType, ParameterizedValidator},
    Direction, Result,
};

impl_with_defaults!(DoubleThreeValidator, TripleThreeValidator);

// ============================================================
// CORRECTION SET
// ============================================================

/// Simple corrective validators used to fit combination segments
#[derive(Debug, Clone, Default)]
pub struct CorrectionSet {
    pub zigzag: ZigzagValidator,
    pub flat: FlatValidator,
    pub triangle: TriangleValidator,
}

impl CorrectionSet {
    /// Adopt `validator` if it is one of the simple corrections.
    pub fn update(&mut self, validator: &BuiltinValidator) {
        match validator {
            BuiltinValidator::Zigzag(v) => self.zigzag = v.clone(),
            BuiltinValidator::Flat(v) => self.flat = v.clone(),
            BuiltinValidator::Triangle(v) => self.triangle = v.clone(),
            _ => {}
        }
    }

    /// Best-scoring simple correction for a 3- or 5-leg segment.
    /// Zigzag wins a tie with flat.
    pub fn best_fit<L: Leg>(&self, legs: &[L]) -> Option<PatternCheck> {
        match legs.len() {
            3 => {
                let zigzag = self.zigzag.check(legs);
                let flat = self.flat.check(legs);
                Some(if flat.score > zigzag.score { flat } else { zigzag })
            }
            5 => Some(self.triangle.check(legs)),
            _ => None,
        }
    }

    fn fit<L: Leg>(&self, role: &'static str, legs: &[L]) -> (PatternCheck, SegmentFit) {
        let check = self.best_fit(legs).unwrap_or_else(|| {
            PatternCheck::rejected(
                PatternKind::Composite,
                format!("no simple correction spans {} legs", legs.len()),
            )
        });
        let fit = SegmentFit {
            role,
            kind: check.kind,
            subtype: check.subtype,
            score: check.score,
            valid: check.is_valid,
            legs: legs.len(),
        };
        (check, fit)
    }
}

/// Summed leg lengths of a segment
fn travel<L: Leg>(legs: &[L]) -> f64 {
    legs.iter().map(|l| l.length()).sum()
}

fn segment_trend<L: Leg>(legs: &[L]) -> Option<Direction> {
    legs.first().map(|l| l.direction())
}

// ============================================================
// DOUBLE THREE
// ============================================================

/// W-X-Y over seven legs: two three-leg corrections joined by one connector
#[derive(Debug, Clone)]
pub struct DoubleThreeValidator {
    /// Maximum connector length relative to the larger segment's travel
    pub connector_max: f64,
    pub corrections: CorrectionSet,
}

impl Default for DoubleThreeValidator {
    fn default() -> Self {
        Self {
            connector_max: 0.8,
            corrections: CorrectionSet::default(),
        }
    }
}

impl WaveValidator for DoubleThreeValidator {
    fn kind(&self) -> PatternKind {
        PatternKind::DoubleThree
    }

    fn check<L: Leg>(&self, legs: &[L]) -> PatternCheck {
        if let Some(rejected) = shape_guard(PatternKind::DoubleThree, legs) {
            return rejected;
        }
        let (w, x, y) = (&legs[0..3], &legs[3], &legs[4..7]);
        let (w_check, w_fit) = self.corrections.fit("W", w);
        let (y_check, y_fit) = self.corrections.fit("Y", y);
        let mut card = Scorecard::new(PatternKind::DoubleThree);

        let same = segment_trend(w) == segment_trend(y);
        card.soft(
            "w_y_same_trend",
            "W and Y trend in different directions",
            flag(same),
            "same direction".to_string(),
            same,
            0.3,
        );
        let span = travel(w).max(travel(y));
        if span > 0.0 {
            let x_ratio = ratio(x.length(), span);
            card.soft(
                "connector_size",
                "Connector X too large relative to W/Y",
                x_ratio,
                at_most(self.connector_max),
                x_ratio <= self.connector_max,
                0.2,
            );
        }
        card.soft(
            "w_valid",
            "W segment is not a valid correction",
            w_check.score,
            at_least(w_check.kind.validity_threshold()),
            w_check.is_valid,
            0.4,
        );
        card.soft(
            "y_valid",
            "Y segment is not a valid correction",
            y_check.score,
            at_least(y_check.kind.validity_threshold()),
            y_check.is_valid,
            0.4,
        );

        let base = (w_check.score + y_check.score) / 2.0;
        card.finish(base, None, Some(legs[0].direction()), vec![w_fit, y_fit])
    }

    fn validate_config(&self) -> Result<()> {
        self.corrections.zigzag.validate_config()?;
        self.corrections.flat.validate_config()?;
        self.corrections.triangle.validate_config()
    }
}

// ============================================================
// TRIPLE THREE
// ============================================================

/// W-X-Y-X-Z over eleven legs
#[derive(Debug, Clone)]
pub struct TripleThreeValidator {
    pub connector_max: f64,
    pub corrections: CorrectionSet,
}

impl Default for TripleThreeValidator {
    fn default() -> Self {
        Self {
            connector_max: 0.8,
            corrections: CorrectionSet::default(),
        }
    }
}

impl WaveValidator for TripleThreeValidator {
    fn kind(&self) -> PatternKind {
        PatternKind::TripleThree
    }

    fn check<L: Leg>(&self, legs: &[L]) -> PatternCheck {
        if let Some(rejected) = shape_guard(PatternKind::TripleThree, legs) {
            return rejected;
        }
        let (w, x1, y, x2, z) = (&legs[0..3], &legs[3], &legs[4..7], &legs[7], &legs[8..11]);
        let fits = [
            self.corrections.fit("W", w),
            self.corrections.fit("Y", y),
            self.corrections.fit("Z", z),
        ];
        let mut card = Scorecard::new(PatternKind::TripleThree);

        let same = segment_trend(w) == segment_trend(y) && segment_trend(y) == segment_trend(z);
        card.soft(
            "w_y_z_same_trend",
            "W, Y and Z trend in different directions",
            flag(same),
            "same direction".to_string(),
            same,
            0.4,
        );
        let span = travel(w).max(travel(y)).max(travel(z));
        if span > 0.0 {
            for (key, description, connector) in [
                ("connector_x1", "First connector X too large", x1),
                ("connector_x2", "Second connector X too large", x2),
            ] {
                let x_ratio = ratio(connector.length(), span);
                card.soft(
                    key,
                    description,
                    x_ratio,
                    at_most(self.connector_max),
                    x_ratio <= self.connector_max,
                    0.15,
                );
            }
        }
        for ((check, fit), key) in fits.iter().zip(["w_valid", "y_valid", "z_valid"]) {
            card.soft(
                key,
                "Segment is not a valid correction",
                check.score,
                at_least(check.kind.validity_threshold()),
                fit.valid,
                0.25,
            );
        }

        let base = fits.iter().map(|(check, _)| check.score).sum::<f64>() / 3.0;
        let segments = fits.into_iter().map(|(_, fit)| fit).collect();
        card.finish(base, None, Some(legs[0].direction()), segments)
    }

    fn validate_config(&self) -> Result<()> {
        self.corrections.zigzag.validate_config()?;
        self.corrections.flat.validate_config()?;
        self.corrections.triangle.validate_config()
    }
}

// ============================================================
// PARAMETERIZED VALIDATOR IMPLEMENTATION
// ============================================================

static COMBINATION_PARAMS: &[ParamMeta] = &[ParamMeta {
    name: "connector_max",
    param_type: ParamType::Factor,
    default: 0.8,
    range: (0.382, 1.0, 0.05),
    description: "Maximum connector length relative to the largest segment travel",
}];

impl ParameterizedValidator for DoubleThreeValidator {
    fn param_meta() -> &'static [ParamMeta] {
        COMBINATION_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Self::validated_params(params)?;
        Ok(Self {
            connector_max: get_factor(params, "connector_max", 0.8)?,
            corrections: CorrectionSet::default(),
        })
    }

    fn pattern_id_str() -> &'static str {
        "DOUBLE_THREE"
    }
}

impl ParameterizedValidator for TripleThreeValidator {
    fn param_meta() -> &'static [ParamMeta] {
        COMBINATION_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Self::validated_params(params)?;
        Ok(Self {
            connector_max: get_factor(params, "connector_max", 0.8)?,
            corrections: CorrectionSet::default(),
        })
    }

    fn pattern_id_str() -> &'static str {
        "TRIPLE_THREE"
    }
}
