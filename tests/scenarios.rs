//! Integration tests for the full analysis pipeline: segmentation, search,
//! ranking, invalidation and projection.

use yawc::prelude::*;

/// Simple test bar structure
#[derive(Debug, Clone, Copy)]
struct TestBar {
    t: i64,
    c: f64,
}

impl OHLCV for TestBar {
    fn open(&self) -> f64 {
        self.c
    }

    fn high(&self) -> f64 {
        self.c
    }

    fn low(&self) -> f64 {
        self.c
    }

    fn close(&self) -> f64 {
        self.c
    }

    fn volume(&self) -> f64 {
        1000.0
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.t)
    }
}

/// Linear legs between turning points, `steps` hourly bars per leg
fn path(points: &[f64], steps: usize) -> Vec<TestBar> {
    let mut closes = vec![points[0]];
    for pair in points.windows(2) {
        for k in 1..=steps {
            closes.push(pair[0] + (pair[1] - pair[0]) * k as f64 / steps as f64);
        }
    }
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| TestBar { t: i as i64 * 3600, c })
        .collect()
}

const IMPULSE: [f64; 6] = [100.0, 110.0, 104.0, 128.0, 120.0, 133.0];

fn engine() -> WaveEngine {
    EngineBuilder::new().build().unwrap()
}

// ============================================================
// ANALYSIS
// ============================================================

#[test]
fn test_impulse_is_top_scenario() {
    let analysis = engine().analyze(&path(&IMPULSE, 4)).unwrap();
    let best = analysis.best().unwrap();
    let dominant = best.dominant().unwrap();
    assert_eq!(dominant.kind, PatternKind::Impulse);
    assert_eq!(dominant.children.len(), 5);
    assert_eq!(best.status, ScenarioStatus::Active);
    assert!(best.summary.starts_with("Impulse"));
}

#[test]
fn test_scores_and_ids() {
    let analysis = engine().analyze(&path(&IMPULSE, 4)).unwrap();
    assert!(!analysis.scenarios.is_empty());
    for (i, scenario) in analysis.scenarios.iter().enumerate() {
        assert_eq!(scenario.id, i as u32 + 1);
        assert!((0.0..=1.0).contains(&scenario.score));
    }
}

#[test]
fn test_roots_cover_every_swing_once() {
    let bars = path(
        &[100.0, 90.0, 95.0, 82.0, 90.0, 86.0, 99.0, 93.0, 97.0, 80.0, 88.0],
        3,
    );
    let analysis = engine().analyze(&bars).unwrap();
    let n = analysis.swings.base_swings.len();
    for scenario in analysis.scenarios.iter().filter(|s| s.projection.is_none()) {
        let first = scenario.roots.first().unwrap();
        let last = scenario.roots.last().unwrap();
        assert_eq!(last.end_index, n - 1);
        if scenario.anchor.starts_with("Pivot#") {
            continue;
        }
        assert_eq!(first.start_index, 0);
        for pair in scenario.roots.windows(2) {
            assert_eq!(pair[0].end_index + 1, pair[1].start_index);
        }
    }
}

#[test]
fn test_max_scenarios_is_respected() {
    let engine = EngineBuilder::new()
        .max_scenarios(2)
        .unwrap()
        .projection(false)
        .build()
        .unwrap();
    let bars = path(
        &[100.0, 90.0, 95.0, 82.0, 90.0, 86.0, 99.0, 93.0, 97.0, 80.0, 88.0],
        3,
    );
    assert!(engine.analyze(&bars).unwrap().scenarios.len() <= 2);
}

#[test]
fn test_crossed_invalidation_is_filtered() {
    // zigzag down from 100, then price rallies through the origin
    let bars = path(&[100.0, 90.0, 95.0, 82.0, 115.0], 4);
    let analysis = engine().analyze(&bars).unwrap();
    let last = 115.0;
    for scenario in &analysis.scenarios {
        if let Some(level) = scenario.invalidation {
            if scenario.projection.is_none() {
                assert!(!level.is_crossed_by(last));
            }
        }
    }
}

#[test]
fn test_no_structure_yields_empty_or_leaf_scenarios() {
    let bars = path(&[100.0, 100.0], 5);
    let analysis = engine().analyze(&bars).unwrap();
    for scenario in &analysis.scenarios {
        assert!(scenario.pattern_spans().is_empty());
    }
}

#[test]
fn test_data_errors() {
    let bars = vec![TestBar { t: 10, c: 1.0 }, TestBar { t: 5, c: 2.0 }];
    let err = engine().analyze(&bars).unwrap_err();
    assert!(err.is_data_error());
    assert!(matches!(err, WaveError::NonMonotonicTimestamp { index: 1, .. }));
}

// ============================================================
// PROJECTION
// ============================================================

#[test]
fn test_projection_scenario_is_last() {
    // 1-2-3 opening at the data boundary
    let bars = path(&[100.0, 200.0, 150.0, 350.0], 5);
    let analysis = engine().analyze(&bars).unwrap();
    let projected = analysis
        .scenarios
        .iter()
        .find(|s| s.projection.is_some())
        .unwrap();
    let parent = projected.roots.last().unwrap();
    assert_eq!(parent.subtype, Some(Subtype::Projected));
    assert!(!parent.complete);
    assert_eq!(projected.score, 0.5);
    assert!(analysis.scenarios.last().unwrap().projection.is_some());
}

#[test]
fn test_projection_can_be_disabled() {
    let engine = EngineBuilder::new().projection(false).build().unwrap();
    let analysis = engine.analyze(&path(&[100.0, 200.0, 150.0, 350.0], 5)).unwrap();
    assert!(analysis.scenarios.iter().all(|s| s.projection.is_none()));
}

#[test]
fn test_project_impulse_targets() {
    let w = [
        Swing::new(0, 1, 0, 3600, 100.0, 200.0),
        Swing::new(1, 2, 3600, 7200, 200.0, 150.0),
        Swing::new(2, 3, 7200, 10800, 150.0, 350.0),
    ];
    let p = project_impulse(&w[0], &w[1], &w[2]).unwrap();
    assert!((p.wave4_target - 273.6).abs() < 1e-9);
    assert!((p.wave5_target - 373.6).abs() < 1e-9);
    assert_eq!(p.wave5_time - p.wave4_time, 3600);
}

// ============================================================
// MACRO SCAN AND MICRO VERIFICATION
// ============================================================

#[test]
fn test_macro_scan_finds_impulse() {
    let scenarios = engine().macro_scan(&path(&IMPULSE, 4), 5).unwrap();
    assert!(scenarios
        .iter()
        .flat_map(|s| s.roots.iter())
        .any(|r| r.kind == PatternKind::Impulse));
}

#[test]
fn test_verify_pattern_against_micro_partition() {
    let engine = engine();
    let analysis = engine.analyze(&path(&IMPULSE, 4)).unwrap();
    let node = analysis.best().unwrap().dominant().unwrap();
    // a single micro leg cannot confirm five waves
    let micro = [Swing::new(0, 20, 0, 20 * 3600, 100.0, 133.0)];
    let validation = engine.verify_pattern(node, &micro);
    assert!(!validation.hard_valid);
}

// ============================================================
// SERIALIZATION
// ============================================================

#[test]
fn test_json_output_shape() {
    let analysis = engine().analyze(&path(&IMPULSE, 4)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&analysis.to_json().unwrap()).unwrap();
    let scenario = &value["scenarios"][0];
    assert!(scenario["roots"].is_array());
    assert!(scenario["score"].is_number());
    assert_eq!(scenario["status"], "active");
    assert!(scenario["summary"].is_string());
}

#[test]
fn test_scenario_view_limits_nodes() {
    let analysis = engine().analyze(&path(&IMPULSE, 4)).unwrap();
    let best = analysis.best().unwrap();
    let (_, nodes) = best.view(5);
    assert!(!nodes.is_empty());
    assert!(nodes.len() <= 5);
}
