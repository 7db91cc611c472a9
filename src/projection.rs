//! Forward projection of in-progress impulses
//!
//! When the last three swings read as waves 1-2-3 of a motive opening,
//! phantom waves 4 and 5 are synthesized from Fibonacci ratios and emitted
//! as a lower-confidence scenario.

use serde::Serialize;

use crate::{
    parser::anchor_label,
    patterns::{helpers::ratio, Leg, PatternKind, Subtype},
    wave::{IdGen, Scenario, Swing, WaveNode},
};

/// Wave 4 retraces this fraction of wave 3
pub const WAVE4_RETRACE: f64 = 0.382;
/// Score of projected scenarios
pub const PROJECTED_SCORE: f64 = 0.5;

/// Price and time targets for the phantom legs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    pub wave4_target: f64,
    pub wave5_target: f64,
    pub wave4_time: i64,
    pub wave5_time: i64,
    /// Wave 1 origin; crossing it falsifies the count
    pub invalidation: f64,
}

/// Project waves 4 and 5 from a 1-2-3 opening.
///
/// Requires alternating legs, a non-zero wave 1 and a wave 2 retracing less
/// than all of wave 1. Wave 4 retraces [`WAVE4_RETRACE`] of wave 3; wave 5
/// repeats wave 1 in the direction of wave 3. Each phantom leg lasts the
/// mean duration of waves 1-3.
pub fn project_impulse<L: Leg>(w1: &L, w2: &L, w3: &L) -> Option<Projection> {
    if w1.direction() == w2.direction() || w2.direction() == w3.direction() {
        return None;
    }
    if w1.length() <= 0.0 || ratio(w2.length(), w1.length()) >= 1.0 {
        return None;
    }

    let sign = w3.direction().sign();
    let wave4_target = w3.end_price() - sign * WAVE4_RETRACE * w3.length();
    let wave5_target = wave4_target + sign * w1.length();

    let step = ((w1.duration() + w2.duration() + w3.duration()) / 3.0).round() as i64;
    let wave4_time = w3.end_time() + step;
    Some(Projection {
        wave4_target,
        wave5_target,
        wave4_time,
        wave5_time: wave4_time + step,
        invalidation: w1.start_price(),
    })
}

fn phantom(ids: &mut IdGen, index: usize, swing: &Swing) -> WaveNode {
    let mut leaf = WaveNode::leaf(ids.node(), index, swing);
    leaf.projected = true;
    leaf
}

/// Projected-impulse scenario over the tail of `swings`, or `None` when the
/// last three swings do not open a motive wave. The anchor is taken from the
/// best ranked scenario when there is one.
pub fn projected_scenario(ranked: &[Scenario], swings: &[Swing], ids: &mut IdGen) -> Option<Scenario> {
    let n = swings.len();
    if n < 3 {
        return None;
    }
    let opening = &swings[n - 3..];
    let projection = project_impulse(&opening[0], &opening[1], &opening[2])?;

    let bars = opening.iter().map(|s| s.end_index - s.start_index).sum::<usize>() / 3;
    let step = bars.max(1);
    let w3 = &opening[2];
    let wave4 = Swing::new(
        w3.end_index,
        w3.end_index + step,
        w3.end_time,
        projection.wave4_time,
        w3.end_price,
        projection.wave4_target,
    );
    let wave5 = Swing::new(
        wave4.end_index,
        wave4.end_index + step,
        wave4.end_time,
        projection.wave5_time,
        wave4.end_price,
        projection.wave5_target,
    );

    let mut roots: Vec<WaveNode> = swings[..n - 3]
        .iter()
        .enumerate()
        .map(|(i, s)| WaveNode::leaf(ids.node(), i, s))
        .collect();
    let mut children: Vec<WaveNode> = opening
        .iter()
        .enumerate()
        .map(|(i, s)| WaveNode::leaf(ids.node(), n - 3 + i, s))
        .collect();
    children.push(phantom(ids, n, &wave4));
    children.push(phantom(ids, n + 1, &wave5));

    let mut parent = WaveNode::from_children(
        ids.node(),
        PatternKind::Impulse,
        Some(Subtype::Projected),
        PROJECTED_SCORE,
        children,
    );
    parent.complete = false;
    parent.children[3].label = Some("4?".to_string());
    parent.children[4].label = Some("5?".to_string());
    roots.push(parent);

    let anchor = ranked
        .first()
        .map(|s| s.anchor.clone())
        .unwrap_or_else(|| anchor_label(swings));
    tracing::debug!(
        "projected wave 4 at {:.2}, wave 5 at {:.2}",
        projection.wave4_target,
        projection.wave5_target
    );
    let mut scenario = Scenario::new(ids.scenario(), anchor, roots, PROJECTED_SCORE);
    scenario.projection = Some(projection);
    Some(scenario)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{patterns::tests::legs, wave::ScenarioStatus};

    #[test]
    fn test_fibonacci_targets() {
        let swings = legs(&[100.0, 200.0, 150.0, 350.0], &[2, 1, 3]);
        let p = project_impulse(&swings[0], &swings[1], &swings[2]).unwrap();
        assert!((p.wave4_target - 273.6).abs() < 1e-9);
        assert!((p.wave5_target - 373.6).abs() < 1e-9);
        assert_eq!(p.wave4_time, swings[2].end_time + 2 * 3600);
        assert_eq!(p.wave5_time, p.wave4_time + 2 * 3600);
        assert_eq!(p.invalidation, 100.0);
    }

    #[test]
    fn test_downward_opening() {
        let swings = legs(&[350.0, 250.0, 300.0, 100.0], &[]);
        let p = project_impulse(&swings[0], &swings[1], &swings[2]).unwrap();
        assert!((p.wave4_target - 176.4).abs() < 1e-9);
        assert!((p.wave5_target - 76.4).abs() < 1e-9);
    }

    #[test]
    fn test_full_retrace_is_not_projected() {
        let swings = legs(&[100.0, 200.0, 90.0, 350.0], &[]);
        assert!(project_impulse(&swings[0], &swings[1], &swings[2]).is_none());
        let mut ids = IdGen::new();
        assert!(projected_scenario(&[], &swings, &mut ids).is_none());
    }

    #[test]
    fn test_projected_scenario_shape() {
        let swings = legs(&[120.0, 100.0, 200.0, 150.0, 350.0], &[]);
        let mut ids = IdGen::new();
        let scenario = projected_scenario(&[], &swings, &mut ids).unwrap();

        assert_eq!(scenario.roots.len(), 2);
        assert!(scenario.roots[0].is_leaf());
        let parent = &scenario.roots[1];
        assert_eq!(parent.kind, PatternKind::Impulse);
        assert_eq!(parent.subtype, Some(Subtype::Projected));
        assert!(parent.projected);
        assert!(!parent.complete);
        assert_eq!(parent.children.len(), 5);
        assert_eq!(parent.children[3].label.as_deref(), Some("4?"));
        assert_eq!(parent.children[4].label.as_deref(), Some("5?"));
        assert!(parent.children[4].projected);
        assert!((parent.end_price - 373.6).abs() < 1e-9);

        assert_eq!(scenario.score, PROJECTED_SCORE);
        assert_eq!(scenario.status, ScenarioStatus::Active);
        assert!(scenario.projection.is_some());
        assert!(scenario.pattern_spans().is_empty());
    }

    #[test]
    fn test_too_few_swings() {
        let swings = legs(&[100.0, 200.0, 150.0], &[]);
        let mut ids = IdGen::new();
        assert!(projected_scenario(&[], &swings, &mut ids).is_none());
    }
}
