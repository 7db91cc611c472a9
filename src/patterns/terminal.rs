//! Terminal impulse validator (ending diagonal)

use std::collections::HashMap;

use super::{
    helpers::{at_least, below, flag, ratio, shape_guard, similarity},
    Leg, PatternCheck, PatternKind, Scorecard, Subtype, WaveValidator,
};
use crate::{
    params::{get_ratio, ParamMeta, ParamType, ParameterizedValidator},
    Direction, Ratio, Result,
};

impl_with_defaults!(TerminalImpulseValidator);

/// Terminal impulse: five overlapping legs with deep corrections whose motive
/// legs shrink (contracting) or grow (expanding) progressively.
#[derive(Debug, Clone)]
pub struct TerminalImpulseValidator {
    /// Minimum depth of waves 2 and 4 relative to the preceding leg
    pub correction_depth_min: Ratio,
    /// Minimum similarity between waves 1/3 and 3/5
    pub proportion_similarity: Ratio,
    /// Minimum duration of waves 2 and 4 relative to the preceding leg
    pub time_ratio_min: Ratio,
    pub wave2_max: Ratio,
}

impl Default for TerminalImpulseValidator {
    fn default() -> Self {
        Self {
            correction_depth_min: Ratio::new_const(0.5),
            proportion_similarity: Ratio::new_const(0.382),
            time_ratio_min: Ratio::new_const(0.33),
            wave2_max: Ratio::new_const(1.0),
        }
    }
}

impl WaveValidator for TerminalImpulseValidator {
    fn kind(&self) -> PatternKind {
        PatternKind::TerminalImpulse
    }

    fn check<L: Leg>(&self, legs: &[L]) -> PatternCheck {
        if let Some(rejected) = shape_guard(PatternKind::TerminalImpulse, legs) {
            return rejected;
        }
        let trend = legs[0].direction();
        let len: Vec<f64> = legs.iter().map(|l| l.length()).collect();
        let dur: Vec<f64> = legs.iter().map(|l| l.duration()).collect();
        let depth = self.correction_depth_min.get();
        let mut card = Scorecard::new(PatternKind::TerminalImpulse);

        card.critical(
            "wave2_retrace_max",
            "Wave 2 retraced all of wave 1",
            ratio(len[1], len[0]),
            below(self.wave2_max.get()),
            ratio(len[1], len[0]) < self.wave2_max.get(),
        );
        card.critical(
            "wave3_not_shortest",
            "Wave 3 is the shortest motive wave",
            len[2],
            format!(">= {:.2}", len[0].min(len[4])),
            len[2] >= len[0].min(len[4]),
        );

        let contracting = len[0] > len[2] && len[2] > len[4];
        let expanding = len[0] < len[2] && len[2] < len[4];
        card.soft(
            "progression",
            "Motive waves neither contract nor expand",
            flag(contracting || expanding),
            "contracting or expanding".to_string(),
            contracting || expanding,
            0.25,
        );
        card.soft(
            "wave2_depth",
            "Wave 2 is not a deep correction",
            ratio(len[1], len[0]),
            at_least(depth),
            ratio(len[1], len[0]) >= depth,
            0.1,
        );
        card.soft(
            "wave4_depth",
            "Wave 4 is not a deep correction",
            ratio(len[3], len[2]),
            at_least(depth),
            ratio(len[3], len[2]) >= depth,
            0.1,
        );

        let proportion = self.proportion_similarity.get();
        card.soft(
            "w1_w3_similarity",
            "Waves 1 and 3 out of proportion",
            similarity(len[0], len[2]),
            at_least(proportion),
            similarity(len[0], len[2]) >= proportion,
            0.1,
        );
        card.soft(
            "w3_w5_similarity",
            "Waves 3 and 5 out of proportion",
            similarity(len[2], len[4]),
            at_least(proportion),
            similarity(len[2], len[4]) >= proportion,
            0.1,
        );

        let time_min = self.time_ratio_min.get();
        if dur[0] > 0.0 && dur[1] > 0.0 {
            card.soft(
                "wave2_time",
                "Wave 2 too brief vs wave 1",
                ratio(dur[1], dur[0]),
                at_least(time_min),
                ratio(dur[1], dur[0]) >= time_min,
                0.05,
            );
        }
        if dur[2] > 0.0 && dur[3] > 0.0 {
            card.soft(
                "wave4_time",
                "Wave 4 too brief vs wave 3",
                ratio(dur[3], dur[2]),
                at_least(time_min),
                ratio(dur[3], dur[2]) >= time_min,
                0.05,
            );
        }

        let overlap = match trend {
            Direction::Up => legs[3].low() <= legs[0].high(),
            Direction::Down => legs[3].high() >= legs[0].low(),
        };
        card.soft(
            "wave4_overlap",
            "Wave 4 does not overlap wave 1 territory",
            flag(overlap),
            "overlap".to_string(),
            overlap,
            0.2,
        );

        let mode = if len[4] <= len[0] {
            Subtype::Contracting
        } else {
            Subtype::Expanding
        };
        card.finish(1.0, Some(mode), Some(trend), Vec::new())
    }
}

// ============================================================
// PARAMETERIZED VALIDATOR IMPLEMENTATION
// ============================================================

static TERMINAL_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "correction_depth_min",
        param_type: ParamType::Ratio,
        default: 0.5,
        range: (0.3, 0.8, 0.05),
        description: "Minimum depth of waves 2 and 4",
    },
    ParamMeta {
        name: "proportion_similarity",
        param_type: ParamType::Ratio,
        default: 0.382,
        range: (0.2, 0.8, 0.05),
        description: "Minimum similarity of consecutive motive waves",
    },
    ParamMeta {
        name: "time_ratio_min",
        param_type: ParamType::Ratio,
        default: 0.33,
        range: (0.1, 0.8, 0.05),
        description: "Minimum duration of corrective waves vs. the previous wave",
    },
    ParamMeta {
        name: "wave2_max",
        param_type: ParamType::Ratio,
        default: 1.0,
        range: (0.618, 1.0, 0.05),
        description: "Wave 2 must retrace less than this fraction of wave 1",
    },
];

impl ParameterizedValidator for TerminalImpulseValidator {
    fn param_meta() -> &'static [ParamMeta] {
        TERMINAL_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Self::validated_params(params)?;
        Ok(Self {
            correction_depth_min: get_ratio(params, "correction_depth_min", 0.5)?,
            proportion_similarity: get_ratio(params, "proportion_similarity", 0.382)?,
            time_ratio_min: get_ratio(params, "time_ratio_min", 0.33)?,
            wave2_max: get_ratio(params, "wave2_max", 1.0)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "TERMINAL_IMPULSE"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::tests::legs;

    #[test]
    fn test_contracting_diagonal() {
        // 1=20, 2=12, 3=16, 4=10, 5=12; wave 4 low 114 dips under wave 1 high 120
        let window = legs(&[100.0, 120.0, 108.0, 124.0, 114.0, 126.0], &[3, 2, 3, 2, 3]);
        let check = TerminalImpulseValidator::default().check(&window);

        assert!(check.is_valid, "{:?}", check.violations);
        assert_eq!(check.subtype, Some(Subtype::Contracting));
        assert!(check.satisfied().any(|c| c.key == "wave4_overlap"));
    }

    #[test]
    fn test_textbook_impulse_is_weak_terminal() {
        let window = legs(&[100.0, 110.0, 104.0, 128.0, 120.0, 133.0], &[2, 2, 3, 2, 2]);
        let check = TerminalImpulseValidator::default().check(&window);
        assert!(!check.is_valid);
        assert!(check.hard_valid);
    }
}
