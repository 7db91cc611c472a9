//! Scenario search
//!
//! Generalizes the greedy parser into a search over every locally valid
//! match. Each pass enumerates hard-valid candidates over 3/5/7/11-node
//! windows, picks non-overlapping subsets (exact optimum plus beam
//! alternatives) and collapses them; passes repeat until nothing changes.
//! Finished scenarios are re-validated structurally, cross-checked against
//! the micro partition and scored.
//!
//! Search weights are higher-is-better: a candidate's weight is its
//! validator score less a per-kind bias, a complexity cost and a small
//! deduction per soft rule the rule book reports violated.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    parser::ParseSettings,
    patterns::ValidatorSet,
    rules::RuleEvaluator,
    wave::{IdGen, Scenario, Swing, WaveNode},
    Count, Ratio,
};

pub mod anchors;
pub mod cross_scale;
pub mod macro_scan;
pub mod rank;
mod search;
pub mod structure;

pub use cross_scale::{micro_check, verify_pattern};
pub use search::{complexity_penalty, kind_bias};

/// Credit a bare swing earns toward the coverage score
const LEAF_CREDIT: f64 = 0.2;
/// Deduction per root beyond the first
const FRAGMENT_COST: f64 = 0.02;

// ============================================================
// SETTINGS
// ============================================================

/// Scenario search settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Partial solutions kept per selection, and scenarios kept per pass
    pub beam_width: Count,
    pub similarity_threshold: Ratio,
    /// 1 = simple patterns only, 2 adds double threes, 3 adds triple threes
    pub complexity_cap: u8,
    /// Allowed parent/children energy ratio
    pub energy_band: (f64, f64),
    /// Fraction of the shorter dominant span two scenarios must share to
    /// count as duplicates
    pub duplicate_overlap: f64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            beam_width: Count::new_const(6),
            similarity_threshold: Ratio::new_const(0.33),
            complexity_cap: 3,
            energy_band: (0.5, 2.5),
            duplicate_overlap: 0.5,
        }
    }
}

impl SearchSettings {
    /// Parser settings matching this search, used for micro re-parses
    pub fn parse_settings(&self) -> ParseSettings {
        ParseSettings {
            similarity_threshold: self.similarity_threshold,
            complexity_cap: self.complexity_cap,
        }
    }
}

/// Everything one search run reads
#[derive(Debug, Clone, Copy)]
pub struct SearchContext<'a> {
    pub validators: &'a ValidatorSet,
    pub evaluator: &'a RuleEvaluator,
    pub settings: &'a SearchSettings,
    /// Finer partition for the cross-scale check; `None` skips it
    pub micro: Option<&'a [Swing]>,
}

// ============================================================
// EXPLORATION
// ============================================================

/// Search `swings`, the suffix of a partition starting at swing `offset`,
/// and return its scenarios labeled with `anchor`.
pub fn explore(
    swings: &[Swing],
    offset: usize,
    anchor: &str,
    ids: &mut IdGen,
    ctx: &SearchContext<'_>,
) -> Vec<Scenario> {
    if swings.is_empty() {
        return Vec::new();
    }
    let tail = offset + swings.len() - 1;
    let leaves: Vec<WaveNode> = swings
        .iter()
        .enumerate()
        .map(|(i, s)| WaveNode::leaf(ids.node(), offset + i, s))
        .collect();

    let states = search::reduce(leaves, tail, ids, ctx);
    states
        .into_iter()
        .map(|state| {
            let mut scenario = Scenario::new(ids.scenario(), anchor, state.nodes, 0.0);
            let mut penalty = structure::revalidate(&mut scenario, ctx.settings);
            if let Some(micro) = ctx.micro {
                penalty += cross_scale::apply(&mut scenario, micro, ctx);
            }
            scenario.score = (coverage_score(&scenario.roots) - penalty).clamp(0.0, 1.0);
            scenario.refresh_summary();
            scenario
        })
        .collect()
}

/// Search from the sequence start and from each of up to `max_anchors`
/// major pivots. Anchor runs execute in parallel, each with its own
/// [`IdGen`]; results keep pivot order.
pub fn explore_anchors(
    swings: &[Swing],
    anchor: &str,
    max_anchors: usize,
    ctx: &SearchContext<'_>,
) -> Vec<Scenario> {
    let mut ids = IdGen::new();
    let mut scenarios = explore(swings, 0, anchor, &mut ids, ctx);

    let pivots: Vec<usize> = anchors::major_pivots(swings, max_anchors)
        .into_iter()
        .filter(|&p| p > 0 && swings.len() - p >= 3)
        .collect();
    let runs: Vec<Vec<Scenario>> = pivots
        .par_iter()
        .enumerate()
        .map(|(k, &p)| {
            let mut ids = IdGen::with_offset(((k + 1) as u32) << 20);
            let label = format!("Pivot#{p}@{:.2}", swings[p].start_price);
            let found = explore(&swings[p..], p, &label, &mut ids, ctx);
            tracing::debug!("anchor {label}: {} scenarios", found.len());
            found
        })
        .collect();

    scenarios.extend(runs.into_iter().flatten());
    scenarios
}

/// Span-weighted mean of root scores, bare swings earning [`LEAF_CREDIT`],
/// less [`FRAGMENT_COST`] per extra root.
fn coverage_score(roots: &[WaveNode]) -> f64 {
    let covered: usize = roots.iter().map(WaveNode::span).sum();
    if covered == 0 {
        return 0.0;
    }
    let weighted: f64 = roots
        .iter()
        .map(|r| {
            let credit = if r.is_leaf() { LEAF_CREDIT } else { r.score };
            credit * r.span() as f64
        })
        .sum();
    let fragments = roots.len().saturating_sub(1) as f64;
    weighted / covered as f64 - FRAGMENT_COST * fragments
}

// ============================================================
// TESTS
// ============================================================
