//! Impulse validator (5-3-5-3-5 motive wave)

use std::collections::HashMap;

use super::{
    helpers::{at_least, below, flag, pair_similar, ratio, shape_guard, similarity},
    Leg, PatternCheck, PatternKind, Scorecard, Subtype, WaveValidator,
};
use crate::{
    params::{get_factor, get_ratio, ParamMeta, ParamType, ParameterizedValidator},
    Direction, Ratio, Result, WaveError,
};

impl_with_defaults!(ImpulseValidator);

/// Impulse: five alternating legs where wave 3 is never the shortest motive
/// leg and wave 2 never retraces all of wave 1.
///
/// The subtype is `trending` unless wave 4 trades into wave 1's price
/// territory, which makes it `terminal`.
#[derive(Debug, Clone)]
pub struct ImpulseValidator {
    /// Minimum wave-2 retrace of wave 1
    pub wave2_min: Ratio,
    /// Wave 2 must retrace strictly less than this
    pub wave2_max: Ratio,
    /// Longest motive leg vs. the runner-up that counts as an extension
    pub extension_ratio: f64,
    pub wave5_vs_wave4_min: f64,
    pub similarity_threshold: Ratio,
}

impl Default for ImpulseValidator {
    fn default() -> Self {
        Self {
            wave2_min: Ratio::new_const(0.236),
            wave2_max: Ratio::new_const(1.0),
            extension_ratio: 1.618,
            wave5_vs_wave4_min: 0.382,
            similarity_threshold: Ratio::new_const(0.33),
        }
    }
}

fn has_extension(w1: f64, w3: f64, w5: f64, ext: f64) -> bool {
    let mut legs = [w1, w3, w5];
    legs.sort_by(|a, b| a.total_cmp(b));
    legs[1] > 0.0 && legs[2] >= ext * legs[1]
}

/// Rare layouts accepted without a full extension: a dominant wave 3 or
/// wave 1 that falls just short of the ratio.
fn extension_exception(w1: f64, w3: f64, w5: f64, ext: f64) -> bool {
    (w3 >= w1 && w3 > w5 && w3 < ext * w1) || (w1 >= w3 && w1 >= w5 && w1 < ext * w3)
}

/// Wave 4 trades into wave 1's territory
fn overlaps<L: Leg>(trend: Direction, wave1: &L, wave4: &L) -> bool {
    match trend {
        Direction::Up => wave4.low() <= wave1.high(),
        Direction::Down => wave4.high() >= wave1.low(),
    }
}

impl WaveValidator for ImpulseValidator {
    fn kind(&self) -> PatternKind {
        PatternKind::Impulse
    }

    fn check<L: Leg>(&self, legs: &[L]) -> PatternCheck {
        if let Some(rejected) = shape_guard(PatternKind::Impulse, legs) {
            return rejected;
        }
        let trend = legs[0].direction();
        let len: Vec<f64> = legs.iter().map(|l| l.length()).collect();
        let dur: Vec<f64> = legs.iter().map(|l| l.duration()).collect();
        let tau = self.similarity_threshold.get();
        let mut card = Scorecard::new(PatternKind::Impulse);

        let w2 = ratio(len[1], len[0]);
        card.soft(
            "wave2_retrace_min",
            "Wave 2 retracement too shallow",
            w2,
            at_least(self.wave2_min.get()),
            w2 >= self.wave2_min.get(),
            0.1,
        );
        card.critical(
            "wave2_retrace_max",
            "Wave 2 retraced all of wave 1",
            w2,
            below(self.wave2_max.get()),
            w2 < self.wave2_max.get(),
        );
        card.soft(
            "wave3_gt_wave2",
            "Wave 3 must exceed wave 2",
            len[2] - len[1],
            "> 0".to_string(),
            len[2] > len[1],
            0.2,
        );
        card.soft(
            "wave3_vs_wave1",
            "Wave 3 smaller than wave 1",
            ratio(len[2], len[0]),
            at_least(1.0),
            len[2] >= len[0],
            0.2,
        );
        card.critical(
            "wave3_not_shortest",
            "Wave 3 is the shortest motive wave",
            len[2],
            format!(">= {:.2}", len[0].min(len[4])),
            len[2] >= len[0].min(len[4]),
        );

        let ext = self.extension_ratio;
        let extended = has_extension(len[0], len[2], len[4], ext)
            || extension_exception(len[0], len[2], len[4], ext);
        card.soft(
            "extension_present",
            "No extended motive wave",
            flag(extended),
            format!("one leg >= {ext:.3}x"),
            extended,
            0.6,
        );

        let w5 = ratio(len[4], len[3]);
        card.soft(
            "wave5_vs_wave4",
            "Wave 5 too short relative to wave 4",
            w5,
            at_least(self.wave5_vs_wave4_min),
            len[3] > 0.0 && w5 >= self.wave5_vs_wave4_min,
            0.3,
        );

        let overlap = overlaps(trend, &legs[0], &legs[3]);
        card.soft(
            "wave4_overlap",
            "Wave 4 overlaps wave 1 territory",
            flag(overlap),
            "no overlap".to_string(),
            !overlap,
            0.4,
        );

        if dur[0] > 0.0 {
            let t2 = ratio(dur[1], dur[0]);
            card.soft(
                "wave2_time",
                "Wave 2 too brief vs wave 1",
                t2,
                at_least(tau),
                t2 >= tau,
                0.1,
            );
        }
        if dur[2] > 0.0 {
            let t4 = ratio(dur[3], dur[2]);
            card.soft(
                "wave4_time",
                "Wave 4 too brief vs wave 3",
                t4,
                at_least(tau),
                t4 >= tau,
                0.1,
            );
        }
        for pair in legs.windows(2) {
            card.soft(
                "adjacent_similarity",
                "Adjacent waves violate similarity",
                similarity(pair[0].length(), pair[1].length()),
                at_least(tau),
                pair_similar(&pair[0], &pair[1], tau),
                0.05,
            );
        }

        let subtype = if overlap {
            Subtype::Terminal
        } else {
            Subtype::Trending
        };
        card.finish(1.0, Some(subtype), Some(trend), Vec::new())
    }

    fn validate_config(&self) -> Result<()> {
        if self.wave2_min.get() >= self.wave2_max.get() {
            return Err(WaveError::InvalidConfig(
                "impulse: wave2_min must be below wave2_max".to_string(),
            ));
        }
        if self.extension_ratio < 1.0 {
            return Err(WaveError::OutOfRange {
                field: "extension_ratio",
                value: self.extension_ratio,
                min: 1.0,
                max: f64::INFINITY,
            });
        }
        Ok(())
    }
}

// ============================================================
// PARAMETERIZED VALIDATOR IMPLEMENTATION
// ============================================================

static IMPULSE_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "wave2_min",
        param_type: ParamType::Ratio,
        default: 0.236,
        range: (0.1, 0.5, 0.05),
        description: "Minimum wave-2 retracement of wave 1",
    },
    ParamMeta {
        name: "wave2_max",
        param_type: ParamType::Ratio,
        default: 1.0,
        range: (0.618, 1.0, 0.05),
        description: "Wave 2 must retrace less than this fraction of wave 1",
    },
    ParamMeta {
        name: "extension_ratio",
        param_type: ParamType::Factor,
        default: 1.618,
        range: (1.2, 2.618, 0.1),
        description: "Longest motive wave vs. runner-up that counts as extended",
    },
    ParamMeta {
        name: "wave5_vs_wave4_min",
        param_type: ParamType::Factor,
        default: 0.382,
        range: (0.2, 1.0, 0.05),
        description: "Minimum wave-5 length relative to wave 4",
    },
    ParamMeta {
        name: "similarity_threshold",
        param_type: ParamType::Ratio,
        default: 0.33,
        range: (0.1, 0.6, 0.05),
        description: "Rule of Similarity threshold for adjacent waves",
    },
];

impl ParameterizedValidator for ImpulseValidator {
    fn param_meta() -> &'static [ParamMeta] {
        IMPULSE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Self::validated_params(params)?;
        Ok(Self {
            wave2_min: get_ratio(params, "wave2_min", 0.236)?,
            wave2_max: get_ratio(params, "wave2_max", 1.0)?,
            extension_ratio: get_factor(params, "extension_ratio", 1.618)?,
            wave5_vs_wave4_min: get_factor(params, "wave5_vs_wave4_min", 0.382)?,
            similarity_threshold: get_ratio(params, "similarity_threshold", 0.33)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "IMPULSE"
    }
}

// ============================================================
// TESTS
// ============================================================
