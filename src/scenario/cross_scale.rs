//! Multi-scale cross-check
//!
//! A macro node is compared with the finer partition inside its time
//! window: enough legs for its pattern class, alternation, similarity
//! between adjacent micro legs, clear scale separation and, for impulses
//! and triangles, an independent re-parse that should agree.

use super::{explore, SearchContext, SearchSettings};
use crate::{
    parser::parse_wave_tree,
    patterns::{
        helpers::{dissimilar_pairs, is_alternating, ratio},
        PatternKind,
    },
    rules::Validation,
    wave::{IdGen, MicroCheck, Scenario, Swing, WaveNode},
    Count,
};

/// Micro score below which a root is penalized
const MICRO_FLOOR: f64 = 0.7;
/// Macro legs should be at least this many times the micro legs
const MIN_SEPARATION: f64 = 3.0;
/// Beam width for micro re-runs
const VERIFY_BEAM: usize = 10;

/// Micro swings lying entirely inside the node's time window
fn inside(node: &WaveNode, micro: &[Swing]) -> Vec<Swing> {
    micro
        .iter()
        .filter(|s| s.start_time >= node.start_time && s.end_time <= node.end_time)
        .copied()
        .collect()
}

/// Dominant pattern of a greedy re-parse
fn reparse(swings: &[Swing], ctx: &SearchContext<'_>) -> Option<PatternKind> {
    let mut ids = IdGen::new();
    let tree = parse_wave_tree(
        swings,
        ctx.validators,
        &ctx.settings.parse_settings(),
        &mut ids,
    );
    tree.roots
        .iter()
        .filter(|r| !r.is_leaf())
        .max_by_key(|r| r.span())
        .map(|r| r.kind)
}

/// Mean macro leg (the node's children, or the node itself) over the mean
/// micro leg
fn scale_separation(node: &WaveNode, micro: &[Swing]) -> f64 {
    let macro_mean = if node.is_leaf() {
        node.length()
    } else {
        node.children.iter().map(WaveNode::length).sum::<f64>() / node.children.len() as f64
    };
    let micro_mean = micro.iter().map(Swing::length).sum::<f64>() / micro.len().max(1) as f64;
    ratio(macro_mean, micro_mean)
}

/// Consistency of `node` with the micro swings inside its window; `None`
/// when the window holds no micro swing.
pub fn micro_check(node: &WaveNode, micro: &[Swing], ctx: &SearchContext<'_>) -> Option<MicroCheck> {
    let legs = inside(node, micro);
    if legs.is_empty() {
        return None;
    }

    let mut score = 1.0;
    let mut violations = Vec::new();
    let (few_legs, choppy) = match node.kind {
        PatternKind::Impulse | PatternKind::TerminalImpulse => (0.4, 0.2),
        PatternKind::Triangle => (0.25, 0.1),
        _ => (0.2, 0.1),
    };

    let expected = node.kind.window_len().max(node.children.len());
    if legs.len() < expected {
        score -= few_legs;
        violations.push(format!("{} micro legs, expected at least {expected}", legs.len()));
    }
    let alternating = is_alternating(&legs);
    if !alternating {
        score -= choppy;
        violations.push("micro legs do not alternate".to_string());
    }

    let pattern = reparse(&legs, ctx);
    match node.kind {
        PatternKind::Impulse | PatternKind::TerminalImpulse
            if !pattern.is_some_and(PatternKind::is_motive) =>
        {
            score -= 0.25;
            violations.push(format!("micro re-parse is not motive ({pattern:?})"));
        }
        PatternKind::Triangle if pattern != Some(PatternKind::Triangle) => {
            score -= 0.1;
            violations.push(format!("micro re-parse is not a triangle ({pattern:?})"));
        }
        _ => {}
    }

    let dissimilar = dissimilar_pairs(&legs, ctx.settings.similarity_threshold.get());
    if dissimilar > 0 {
        score -= 0.05 * dissimilar as f64;
        violations.push(format!("{dissimilar} dissimilar adjacent micro legs"));
    }
    let separation = scale_separation(node, &legs);
    if separation < MIN_SEPARATION {
        score -= 0.05;
        violations.push(format!("scale separation {separation:.2}x"));
    }

    Some(MicroCheck {
        score: f64::clamp(score, 0.0, 1.0),
        legs: legs.len(),
        alternating,
        pattern,
        violations,
    })
}

/// Attach micro checks to the scenario's pattern roots. Returns the score
/// penalty for roots below the consistency floor.
pub(crate) fn apply(scenario: &mut Scenario, micro: &[Swing], ctx: &SearchContext<'_>) -> f64 {
    let mut penalty = 0.0;
    for root in scenario.roots.iter_mut().filter(|r| !r.is_leaf() && !r.projected) {
        let Some(check) = micro_check(root, micro, ctx) else {
            continue;
        };
        if check.score < MICRO_FLOOR {
            penalty += 0.1 + (0.02 * check.violations.len() as f64).min(0.1);
        }
        root.micro = Some(check);
    }
    penalty
}

/// Re-run the scenario search on the micro swings inside `node` and check
/// that the best micro scenario reduces to a single pattern of the node's
/// kind. `soft_penalty` is one minus that scenario's score.
pub fn verify_pattern(node: &WaveNode, micro: &[Swing], ctx: &SearchContext<'_>) -> Validation {
    let mut validation = Validation::default();
    let legs = inside(node, micro);
    if legs.is_empty() {
        validation.hard_valid = false;
        validation.soft_penalty = 1.0;
        validation
            .violated_hard
            .push("no micro swings inside the node window".to_string());
        return validation;
    }

    let settings = SearchSettings {
        beam_width: Count::new_const(ctx.settings.beam_width.get().max(VERIFY_BEAM)),
        ..*ctx.settings
    };
    let local = SearchContext {
        settings: &settings,
        micro: None,
        ..*ctx
    };
    let mut ids = IdGen::new();
    let scenarios = explore(&legs, 0, "micro", &mut ids, &local);
    let Some(best) = scenarios.iter().max_by(|a, b| a.score.total_cmp(&b.score)) else {
        validation.hard_valid = false;
        validation.soft_penalty = 1.0;
        validation
            .violated_hard
            .push("micro search found no structure".to_string());
        return validation;
    };

    match best.roots.as_slice() {
        [root] if root.kind == node.kind => {
            validation.soft_penalty = 1.0 - best.score;
            validation
                .satisfied
                .push(format!("micro structure confirms {}", node.kind));
        }
        [root] => {
            validation.hard_valid = false;
            validation.soft_penalty = 1.0;
            validation
                .violated_hard
                .push(format!("expected {}, found {}", node.kind, root.kind));
        }
        roots => {
            validation.hard_valid = false;
            validation.soft_penalty = 1.0;
            validation.violated_hard.push(format!(
                "micro structure did not form a single {} ({} fragments)",
                node.kind,
                roots.len()
            ));
        }
    }
    validation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{patterns::tests::legs, scenario::tests::Fixture};

    /// Reference impulse shrunk to a third of its price range
    fn micro_impulse() -> Vec<Swing> {
        let points: Vec<f64> = [0.0, 10.0, 4.0, 28.0, 20.0, 33.0]
            .iter()
            .map(|x| 100.0 + x / 3.0)
            .collect();
        legs(&points, &[5, 5, 5, 5, 5])
    }

    /// Macro impulse over 100..133, 5h per wave
    fn impulse_node(ids: &mut IdGen) -> WaveNode {
        let swings = legs(&[100.0, 110.0, 104.0, 128.0, 120.0, 133.0], &[5, 5, 5, 5, 5]);
        let children = swings
            .iter()
            .enumerate()
            .map(|(i, s)| WaveNode::leaf(ids.node(), i, s))
            .collect();
        WaveNode::from_children(ids.node(), PatternKind::Impulse, None, 1.0, children)
    }

    #[test]
    fn test_no_micro_swings_is_none() {
        let fixture = Fixture::new();
        let mut ids = IdGen::new();
        let node = impulse_node(&mut ids);
        assert!(micro_check(&node, &[], &fixture.ctx()).is_none());
    }

    #[test]
    fn test_sparse_micro_window_scores_low() {
        let fixture = Fixture::new();
        let mut ids = IdGen::new();
        let node = impulse_node(&mut ids);
        // one micro leg spanning the whole window
        let micro = vec![Swing::new(0, 5, 0, 25 * 3600, 100.0, 133.0)];
        let check = micro_check(&node, &micro, &fixture.ctx()).unwrap();
        assert_eq!(check.legs, 1);
        assert!(check.score < MICRO_FLOOR);
        assert!(check.pattern.is_none());
        assert!(!check.violations.is_empty());
    }

    #[test]
    fn test_micro_impulse_confirms_macro_impulse() {
        let fixture = Fixture::new();
        let mut ids = IdGen::new();
        let node = impulse_node(&mut ids);
        let micro = micro_impulse();
        let check = micro_check(&node, &micro, &fixture.ctx()).unwrap();
        assert_eq!(check.legs, 5);
        assert!(check.alternating);
        assert_eq!(check.pattern, Some(PatternKind::Impulse));
    }

    #[test]
    fn test_apply_attaches_micro_record() {
        let fixture = Fixture::new();
        let mut ids = IdGen::new();
        let node = impulse_node(&mut ids);
        let mut scenario = Scenario::new(1, "x", vec![node], 1.0);
        let micro = vec![Swing::new(0, 5, 0, 25 * 3600, 100.0, 133.0)];
        let penalty = apply(&mut scenario, &micro, &fixture.ctx());
        assert!(penalty >= 0.1 && penalty <= 0.2);
        assert!(scenario.roots[0].micro.is_some());
    }

    #[test]
    fn test_verify_pattern() {
        let fixture = Fixture::new();
        let mut ids = IdGen::new();
        let node = impulse_node(&mut ids);

        let micro = micro_impulse();
        let confirmed = verify_pattern(&node, &micro, &fixture.ctx());
        assert!(confirmed.hard_valid);
        assert!(confirmed.soft_penalty < 0.5);

        let zigzag = legs(&[100.0, 90.0, 95.0, 82.0], &[5, 5, 5]);
        let rejected = verify_pattern(&node, &zigzag, &fixture.ctx());
        assert!(!rejected.hard_valid);
        assert!(rejected.violated_hard[0].contains("expected Impulse"));

        let empty = verify_pattern(&node, &[], &fixture.ctx());
        assert!(!empty.hard_valid);
    }
}
