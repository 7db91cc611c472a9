//! Top-down macro scan
//!
//! Coarse percentage-ZigZag swings are scanned for every locally valid
//! pattern; each match becomes its own scenario with the rest of the
//! sequence left as bare swings. A projection of the tail is added when the
//! last three swings open an impulse.

use crate::{
    parser::{anchor_label, pattern_node},
    patterns::ValidatorSet,
    projection::projected_scenario,
    segmenter::macro_swings_adaptive,
    wave::{IdGen, Scenario, WaveNode},
    OHLCV,
};

/// Window sizes in scan order
const SIZES: [usize; 4] = [5, 3, 7, 11];

/// One scenario per valid match over the macro partition of `bars`, best
/// first.
pub fn macro_scan<T: OHLCV>(bars: &[T], target: usize, validators: &ValidatorSet) -> Vec<Scenario> {
    let swings = macro_swings_adaptive(bars, target);
    if swings.is_empty() {
        return Vec::new();
    }
    let mut ids = IdGen::new();
    let tail = swings.len() - 1;
    let leaves: Vec<WaveNode> = swings
        .iter()
        .enumerate()
        .map(|(i, s)| WaveNode::leaf(ids.node(), i, s))
        .collect();
    let anchor = anchor_label(&swings);

    let mut scenarios = Vec::new();
    for size in SIZES {
        if size > leaves.len() {
            continue;
        }
        for validator in validators.for_window(size) {
            for start in 0..=leaves.len() - size {
                let window = &leaves[start..start + size];
                let check = validator.check(window);
                if !check.is_valid {
                    continue;
                }
                let score = check.score;
                let mut roots = leaves[..start].to_vec();
                roots.push(pattern_node(&mut ids, check, window, tail));
                roots.extend_from_slice(&leaves[start + size..]);
                scenarios.push(Scenario::new(ids.scenario(), anchor.as_str(), roots, score));
            }
        }
    }
    tracing::debug!(
        "macro scan: {} swings, {} matches",
        swings.len(),
        scenarios.len()
    );

    if let Some(projected) = projected_scenario(&scenarios, &swings, &mut ids) {
        scenarios.push(projected);
    }
    scenarios.sort_by(|a, b| b.score.total_cmp(&a.score));
    scenarios
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        patterns::{PatternKind, Subtype},
        Bar,
    };

    fn path(points: &[f64], steps: usize) -> Vec<Bar> {
        let mut closes = vec![points[0]];
        for pair in points.windows(2) {
            for k in 1..=steps {
                closes.push(pair[0] + (pair[1] - pair[0]) * k as f64 / steps as f64);
            }
        }
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::from_close(i as i64 * 3600, c))
            .collect()
    }

    #[test]
    fn test_impulse_found_and_projected() {
        let bars = path(&[100.0, 110.0, 104.0, 128.0, 120.0, 133.0], 4);
        let scenarios = macro_scan(&bars, 5, &ValidatorSet::default());
        assert!(!scenarios.is_empty());
        assert!(scenarios
            .windows(2)
            .all(|w| w[0].score >= w[1].score));
        assert!(scenarios
            .iter()
            .any(|s| s.roots.len() == 1 && s.roots[0].kind == PatternKind::Impulse));
        assert!(scenarios
            .iter()
            .any(|s| s.roots.last().and_then(|r| r.subtype) == Some(Subtype::Projected)));
    }

    #[test]
    fn test_every_match_keeps_full_coverage() {
        let bars = path(&[100.0, 110.0, 104.0, 128.0, 120.0, 133.0], 4);
        for scenario in macro_scan(&bars, 5, &ValidatorSet::default()) {
            let first = &scenario.roots[0];
            assert_eq!(first.start_index, 0);
            assert!(scenario.roots.iter().any(|r| !r.is_leaf()));
        }
    }

    #[test]
    fn test_flat_data_yields_nothing() {
        let bars = path(&[100.0, 100.0], 10);
        assert!(macro_scan(&bars, 5, &ValidatorSet::default()).is_empty());
        let empty: Vec<Bar> = Vec::new();
        assert!(macro_scan(&empty, 5, &ValidatorSet::default()).is_empty());
    }
}
