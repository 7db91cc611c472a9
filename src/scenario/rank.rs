//! Scenario ranking, de-duplication and price invalidation

use crate::{
    patterns::PatternKind,
    wave::{Scenario, WaveNode},
};

/// Bonus for scenarios whose dominant pattern is still forming
const IN_PROGRESS_BONUS: f64 = 1.05;

/// Prior preference among dominant pattern kinds
pub fn kind_weight(kind: PatternKind) -> f64 {
    match kind {
        PatternKind::Impulse => 1.0,
        PatternKind::Zigzag => 0.95,
        PatternKind::TerminalImpulse | PatternKind::Flat => 0.9,
        PatternKind::Triangle => 0.85,
        PatternKind::DoubleThree => 0.8,
        PatternKind::TripleThree => 0.75,
        PatternKind::Composite => 0.6,
        PatternKind::Monowave => 0.5,
    }
}

/// Ranking value: score weighted by the dominant kind
pub fn rank_value(scenario: &Scenario) -> f64 {
    let Some(node) = scenario.dominant() else {
        return 0.0;
    };
    let mut value = kind_weight(node.kind) * scenario.score;
    if !node.complete {
        value *= IN_PROGRESS_BONUS;
    }
    value
}

/// Drop scenarios whose invalidation price `last_price` has crossed.
/// Structurally invalidated scenarios are kept so callers can inspect why.
pub fn filter_invalidated(scenarios: Vec<Scenario>, last_price: f64) -> Vec<Scenario> {
    let before = scenarios.len();
    let kept: Vec<Scenario> = scenarios
        .into_iter()
        .filter(|s| !s.invalidation.is_some_and(|level| level.is_crossed_by(last_price)))
        .collect();
    if kept.len() < before {
        tracing::debug!(
            "{} scenarios invalidated by price {last_price}",
            before - kept.len()
        );
    }
    kept
}

fn overlap(a: &WaveNode, b: &WaveNode) -> usize {
    let start = a.start_index.max(b.start_index);
    let end = a.end_index.min(b.end_index);
    end.saturating_sub(start)
}

/// Same dominant kind, and the dominant spans share at least `threshold`
/// of the shorter one.
fn is_duplicate(a: &Scenario, b: &Scenario, threshold: f64) -> bool {
    let (Some(x), Some(y)) = (a.dominant(), b.dominant()) else {
        return false;
    };
    if x.kind != y.kind {
        return false;
    }
    let shorter = (x.end_index - x.start_index).min(y.end_index - y.start_index);
    if shorter == 0 {
        return x.start_index == y.start_index;
    }
    overlap(x, y) as f64 >= threshold * shorter as f64
}

/// Order scenarios active first, then by [`rank_value`], drop duplicates of
/// better-ranked ones and keep at most `max`.
pub fn rank(mut scenarios: Vec<Scenario>, max: usize, duplicate_overlap: f64) -> Vec<Scenario> {
    scenarios.sort_by(|a, b| {
        b.is_active()
            .cmp(&a.is_active())
            .then_with(|| rank_value(b).total_cmp(&rank_value(a)))
    });

    let mut kept: Vec<Scenario> = Vec::with_capacity(max.min(scenarios.len()));
    for scenario in scenarios {
        if kept.len() == max {
            break;
        }
        if kept.iter().any(|k| is_duplicate(k, &scenario, duplicate_overlap)) {
            tracing::trace!("dropping duplicate scenario {}", scenario.id);
            continue;
        }
        kept.push(scenario);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{patterns::tests::legs, wave::IdGen};

    fn scenario(id: u32, points: &[f64], offset: usize, kind: PatternKind, score: f64) -> Scenario {
        let mut ids = IdGen::with_offset(id << 8);
        let children = legs(points, &[])
            .iter()
            .enumerate()
            .map(|(i, s)| WaveNode::leaf(ids.node(), offset + i, s))
            .collect();
        let node = WaveNode::from_children(ids.node(), kind, None, score, children);
        Scenario::new(id, "x", vec![node], score)
    }

    #[test]
    fn test_kind_weight_prefers_impulse() {
        assert!(kind_weight(PatternKind::Impulse) > kind_weight(PatternKind::Zigzag));
        assert!(kind_weight(PatternKind::Composite) > kind_weight(PatternKind::Monowave));
    }

    #[test]
    fn test_filter_drops_crossed_levels() {
        let up = scenario(1, &[100.0, 110.0, 104.0, 128.0], 0, PatternKind::Zigzag, 0.8);
        let down = scenario(2, &[100.0, 90.0, 95.0, 82.0], 0, PatternKind::Zigzag, 0.8);
        // up pattern is invalid below 100, down pattern above 100
        let kept = filter_invalidated(vec![up, down], 99.0);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 2);
    }

    #[test]
    fn test_filter_keeps_structural_invalids() {
        let mut s = scenario(1, &[100.0, 90.0, 95.0, 82.0], 0, PatternKind::Zigzag, 0.8);
        s.invalidate("wrong child count");
        assert_eq!(filter_invalidated(vec![s], 85.0).len(), 1);
    }

    #[test]
    fn test_rank_orders_active_first_then_value() {
        let a = scenario(1, &[100.0, 90.0, 95.0, 82.0], 0, PatternKind::Zigzag, 0.6);
        let impulse = [100.0, 110.0, 104.0, 128.0, 120.0, 133.0];
        let b = scenario(2, &impulse, 10, PatternKind::Impulse, 0.7);
        let mut c = scenario(3, &[100.0, 90.0, 95.0, 82.0], 20, PatternKind::Flat, 0.99);
        c.invalidate("bad");
        let ranked = rank(vec![a, c, b], 5, 0.5);
        let ids: Vec<u32> = ranked.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_rank_drops_overlapping_duplicates() {
        let a = scenario(1, &[100.0, 90.0, 95.0, 82.0], 0, PatternKind::Zigzag, 0.9);
        let b = scenario(2, &[100.0, 90.0, 95.0, 82.0], 1, PatternKind::Zigzag, 0.8);
        let c = scenario(3, &[100.0, 90.0, 95.0, 82.0], 1, PatternKind::Flat, 0.7);
        let ranked = rank(vec![a, b, c], 5, 0.5);
        let ids: Vec<u32> = ranked.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_rank_truncates() {
        let zigzag = [100.0, 90.0, 95.0, 82.0];
        let list = (0..4)
            .map(|k| scenario(k + 1, &zigzag, k as usize * 10, PatternKind::Zigzag, 0.5))
            .collect();
        assert_eq!(rank(list, 2, 0.5).len(), 2);
    }
}
