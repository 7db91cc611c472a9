//! Triangle validator (3-3-3-3-3 horizontal correction)
//!
//! The five legs are scored three times, once per triangle family, and the
//! best-scoring family becomes the subtype. Ties keep the earlier family in
//! the order contracting, expanding, neutral.

use std::collections::HashMap;

use super::{
    helpers::{at_least, at_most, between, ratio, shape_guard, similarity},
    Leg, PatternCheck, PatternKind, Scorecard, Subtype, WaveValidator,
};
use crate::{
    params::{get_factor, get_ratio, ParamMeta, ParamType, ParameterizedValidator},
    Ratio, Result, WaveError,
};

impl_with_defaults!(TriangleValidator);

#[derive(Debug, Clone)]
pub struct TriangleValidator {
    pub contracting_c_max: f64,
    pub contracting_e_min: f64,
    pub contracting_e_max: f64,
    pub expanding_c_min: f64,
    pub expanding_e_min: f64,
    /// Blow-off cap on E/C for expanding triangles
    pub expanding_e_max: f64,
    pub neutral_a_min: f64,
    pub neutral_a_max: f64,
    pub neutral_e_min: f64,
    pub neutral_e_max: f64,
    /// Minimum A/E similarity in a neutral triangle
    pub similarity_tolerance: Ratio,
}

impl Default for TriangleValidator {
    fn default() -> Self {
        Self {
            contracting_c_max: 0.9,
            contracting_e_min: 0.382,
            contracting_e_max: 1.0,
            expanding_c_min: 1.0,
            expanding_e_min: 1.0,
            expanding_e_max: 2.618,
            neutral_a_min: 0.5,
            neutral_a_max: 0.9,
            neutral_e_min: 0.5,
            neutral_e_max: 0.9,
            similarity_tolerance: Ratio::new_const(0.5),
        }
    }
}

impl TriangleValidator {
    fn contracting(&self, len: &[f64]) -> Scorecard {
        let mut card = Scorecard::new(PatternKind::Triangle);
        let c_a = ratio(len[2], len[0]);
        let e_c = ratio(len[4], len[2]);
        card.soft(
            "contracting_c_vs_a",
            "Wave C should contract relative to wave A",
            c_a,
            at_most(self.contracting_c_max),
            c_a <= self.contracting_c_max,
            0.25,
        );
        card.soft(
            "contracting_e_vs_c",
            "Wave E not proportionate to wave C",
            e_c,
            between(self.contracting_e_min, self.contracting_e_max),
            (self.contracting_e_min..=self.contracting_e_max).contains(&e_c),
            0.2,
        );
        card.soft(
            "contracting_b_vs_a",
            "Wave B should be smaller than wave A",
            len[1] - len[0],
            "< 0".to_string(),
            len[1] < len[0],
            0.1,
        );
        card.soft(
            "contracting_d_vs_c",
            "Wave D should be smaller than wave C",
            len[3] - len[2],
            "<= 0".to_string(),
            len[3] <= len[2],
            0.1,
        );
        card.soft(
            "contracting_e_smaller",
            "Wave E should be smaller than wave C",
            len[4] - len[2],
            "<= 0".to_string(),
            len[4] <= len[2],
            0.1,
        );
        card.soft(
            "contracting_a_gt_c",
            "Wave A should be larger than wave C",
            len[0] - len[2],
            ">= 0".to_string(),
            len[0] >= len[2],
            0.2,
        );
        card
    }

    fn expanding(&self, len: &[f64]) -> Scorecard {
        let mut card = Scorecard::new(PatternKind::Triangle);
        let c_a = ratio(len[2], len[0]);
        let e_c = ratio(len[4], len[2]);
        card.soft(
            "expanding_c_vs_a",
            "Wave C must expand beyond wave A",
            c_a,
            at_least(self.expanding_c_min),
            c_a >= self.expanding_c_min,
            0.3,
        );
        card.soft(
            "expanding_e_vs_c",
            "Wave E must expand beyond wave C",
            e_c,
            at_least(self.expanding_e_min),
            e_c >= self.expanding_e_min,
            0.3,
        );
        card.soft(
            "expanding_b_vs_a",
            "Wave B should be at least as large as wave A",
            ratio(len[1], len[0]),
            at_least(1.0),
            len[1] >= len[0],
            0.1,
        );
        card.soft(
            "expanding_d_vs_b",
            "Wave D should expand beyond wave B",
            ratio(len[3], len[1]),
            at_least(1.0),
            len[3] >= len[1],
            0.1,
        );
        card.soft(
            "expanding_e_blowoff",
            "Wave E blow-off exceeds expanding triangle bounds",
            e_c,
            at_most(self.expanding_e_max),
            e_c <= self.expanding_e_max,
            0.2,
        );
        card
    }

    fn neutral(&self, len: &[f64]) -> Scorecard {
        let mut card = Scorecard::new(PatternKind::Triangle);
        let largest = len.iter().copied().fold(f64::MIN, f64::max);
        let a_c = ratio(len[0], len[2]);
        let e_c = ratio(len[4], len[2]);
        let a_e = similarity(len[0], len[4]);
        card.soft(
            "neutral_c_largest",
            "Wave C should be the largest leg",
            len[2],
            format!(">= {largest:.2}"),
            len[2] >= largest,
            0.25,
        );
        card.soft(
            "neutral_a_vs_c",
            "Wave A out of neutral proportion",
            a_c,
            between(self.neutral_a_min, self.neutral_a_max),
            (self.neutral_a_min..=self.neutral_a_max).contains(&a_c),
            0.2,
        );
        card.soft(
            "neutral_e_vs_c",
            "Wave E out of neutral proportion",
            e_c,
            between(self.neutral_e_min, self.neutral_e_max),
            (self.neutral_e_min..=self.neutral_e_max).contains(&e_c),
            0.2,
        );
        card.soft(
            "neutral_similarity",
            "Waves A and E should be similar in size",
            a_e,
            at_least(self.similarity_tolerance.get()),
            a_e >= self.similarity_tolerance.get(),
            0.15,
        );
        card
    }

    /// Scorecards of every family, in tie-break order
    fn families(&self, len: &[f64]) -> [(Subtype, Scorecard); 3] {
        [
            (Subtype::Contracting, self.contracting(len)),
            (Subtype::Expanding, self.expanding(len)),
            (Subtype::Neutral, self.neutral(len)),
        ]
    }

    /// Score of each family over a five-leg window, contracting first.
    /// Empty when the window is not an alternating five.
    pub fn family_scores<L: Leg>(&self, legs: &[L]) -> Vec<(Subtype, f64)> {
        if shape_guard(PatternKind::Triangle, legs).is_some() {
            return Vec::new();
        }
        let len: Vec<f64> = legs.iter().map(|l| l.length()).collect();
        self.families(&len)
            .into_iter()
            .map(|(subtype, card)| (subtype, family_score(&card)))
            .collect()
    }
}

#[inline]
fn family_score(card: &Scorecard) -> f64 {
    (1.0 - card.penalty()).clamp(0.0, 1.0)
}

impl WaveValidator for TriangleValidator {
    fn kind(&self) -> PatternKind {
        PatternKind::Triangle
    }

    fn check<L: Leg>(&self, legs: &[L]) -> PatternCheck {
        if let Some(rejected) = shape_guard(PatternKind::Triangle, legs) {
            return rejected;
        }
        let len: Vec<f64> = legs.iter().map(|l| l.length()).collect();
        let direction = legs[0].direction();

        let mut best: Option<(f64, Subtype, Scorecard)> = None;
        for (subtype, card) in self.families(&len) {
            let score = family_score(&card);
            if best.as_ref().map_or(true, |(s, _, _)| score > *s) {
                best = Some((score, subtype, card));
            }
        }
        match best {
            Some((_, subtype, card)) => card.finish(1.0, Some(subtype), Some(direction), Vec::new()),
            None => PatternCheck::rejected(PatternKind::Triangle, "no triangle family evaluated"),
        }
    }

    fn validate_config(&self) -> Result<()> {
        if self.contracting_e_min > self.contracting_e_max
            || self.neutral_a_min > self.neutral_a_max
            || self.neutral_e_min > self.neutral_e_max
            || self.expanding_e_min > self.expanding_e_max
        {
            return Err(WaveError::InvalidConfig(
                "triangle: every min bound must not exceed its max".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// PARAMETERIZED VALIDATOR IMPLEMENTATION
// ============================================================

static TRIANGLE_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "contracting_c_max",
        param_type: ParamType::Factor,
        default: 0.9,
        range: (0.618, 1.0, 0.05),
        description: "Maximum C/A in a contracting triangle",
    },
    ParamMeta {
        name: "contracting_e_min",
        param_type: ParamType::Factor,
        default: 0.382,
        range: (0.2, 0.618, 0.05),
        description: "Minimum E/C in a contracting triangle",
    },
    ParamMeta {
        name: "contracting_e_max",
        param_type: ParamType::Factor,
        default: 1.0,
        range: (0.618, 1.0, 0.05),
        description: "Maximum E/C in a contracting triangle",
    },
    ParamMeta {
        name: "expanding_c_min",
        param_type: ParamType::Factor,
        default: 1.0,
        range: (1.0, 1.618, 0.05),
        description: "Minimum C/A in an expanding triangle",
    },
    ParamMeta {
        name: "expanding_e_min",
        param_type: ParamType::Factor,
        default: 1.0,
        range: (1.0, 1.618, 0.05),
        description: "Minimum E/C in an expanding triangle",
    },
    ParamMeta {
        name: "expanding_e_max",
        param_type: ParamType::Factor,
        default: 2.618,
        range: (1.618, 4.236, 0.1),
        description: "Blow-off cap on E/C in an expanding triangle",
    },
    ParamMeta {
        name: "neutral_a_min",
        param_type: ParamType::Factor,
        default: 0.5,
        range: (0.3, 0.8, 0.05),
        description: "Minimum A/C in a neutral triangle",
    },
    ParamMeta {
        name: "neutral_a_max",
        param_type: ParamType::Factor,
        default: 0.9,
        range: (0.618, 1.0, 0.05),
        description: "Maximum A/C in a neutral triangle",
    },
    ParamMeta {
        name: "neutral_e_min",
        param_type: ParamType::Factor,
        default: 0.5,
        range: (0.3, 0.8, 0.05),
        description: "Minimum E/C in a neutral triangle",
    },
    ParamMeta {
        name: "neutral_e_max",
        param_type: ParamType::Factor,
        default: 0.9,
        range: (0.618, 1.0, 0.05),
        description: "Maximum E/C in a neutral triangle",
    },
    ParamMeta {
        name: "similarity_tolerance",
        param_type: ParamType::Ratio,
        default: 0.5,
        range: (0.3, 0.8, 0.05),
        description: "Minimum A/E similarity in a neutral triangle",
    },
];

impl ParameterizedValidator for TriangleValidator {
    fn param_meta() -> &'static [ParamMeta] {
        TRIANGLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Self::validated_params(params)?;
        Ok(Self {
            contracting_c_max: get_factor(params, "contracting_c_max", 0.9)?,
            contracting_e_min: get_factor(params, "contracting_e_min", 0.382)?,
            contracting_e_max: get_factor(params, "contracting_e_max", 1.0)?,
            expanding_c_min: get_factor(params, "expanding_c_min", 1.0)?,
            expanding_e_min: get_factor(params, "expanding_e_min", 1.0)?,
            expanding_e_max: get_factor(params, "expanding_e_max", 2.618)?,
            neutral_a_min: get_factor(params, "neutral_a_min", 0.5)?,
            neutral_a_max: get_factor(params, "neutral_a_max", 0.9)?,
            neutral_e_min: get_factor(params, "neutral_e_min", 0.5)?,
            neutral_e_max: get_factor(params, "neutral_e_max", 0.9)?,
            similarity_tolerance: get_ratio(params, "similarity_tolerance", 0.5)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "TRIANGLE"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::tests::legs;

    #[test]
    fn test_contracting_triangle() {
        // a=10 b=5 c=7 d=5 e=4
        let window = legs(&[100.0, 90.0, 95.0, 88.0, 93.0, 89.0], &[]);
        let v = TriangleValidator::default();
        let check = v.check(&window);
        assert!(check.is_valid);
        assert_eq!(check.subtype, Some(Subtype::Contracting));
        assert!((check.score - 1.0).abs() < 1e-9);

        let len = [10.0, 5.0, 7.0, 5.0, 4.0];
        assert!((1.0 - v.expanding(&len).penalty() - 0.3).abs() < 1e-9);
        assert!((1.0 - v.neutral(&len).penalty() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_expanding_triangle() {
        // a=4 b=5 c=7 d=8 e=10
        let window = legs(&[100.0, 96.0, 101.0, 94.0, 102.0, 92.0], &[]);
        let check = TriangleValidator::default().check(&window);
        assert_eq!(check.subtype, Some(Subtype::Expanding));
        assert!((check.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_tie_keeps_earlier_family() {
        // a=2 b=3 c=5 d=2 e=2: expanding and neutral both lose 0.4
        let window = legs(&[100.0, 98.0, 101.0, 96.0, 98.0, 96.0], &[]);
        let v = TriangleValidator::default();
        let scores = v.family_scores(&window);
        assert_eq!(scores[1], (Subtype::Expanding, 0.6));
        assert_eq!(scores[2], (Subtype::Neutral, 0.6));
        assert!(scores[0].1 < 0.6);
        let check = v.check(&window);
        assert_eq!(check.subtype, Some(Subtype::Expanding));
        assert!(check.checks.iter().all(|c| c.key.starts_with("expanding_")));
    }

    #[test]
    fn test_family_scores_need_five_legs() {
        let window = legs(&[100.0, 90.0, 95.0, 88.0], &[]);
        assert!(TriangleValidator::default().family_scores(&window).is_empty());
    }

    #[test]
    fn test_checks_come_from_winning_family() {
        let window = legs(&[100.0, 90.0, 95.0, 88.0, 93.0, 89.0], &[]);
        let check = TriangleValidator::default().check(&window);
        assert!(check.checks.iter().all(|c| c.key.starts_with("contracting_")));
    }
}
