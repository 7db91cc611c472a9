//! Candidate enumeration, non-overlapping selection and collapse
//!
//! Every score here is higher-is-better: validator scores, candidate
//! weights and state values all grow with the quality of the reading. The
//! greedy parser in [`crate::parser`] follows the same convention, so a
//! search weight is always a validator score minus deductions.
//!
//! A window is only considered when the parser would also accept it: its
//! nodes share one degree and every adjacent pair is similar. A state is
//! ranked by the value of the roots it ends with, per swing covered, so
//! extra nesting levels earn nothing by themselves.

use std::collections::HashSet;

use super::SearchContext;
use crate::{
    parser::{gate, pattern_node},
    patterns::{PatternCheck, PatternKind},
    wave::{IdGen, WaveNode},
};

/// Window sizes tried at every position
const WINDOWS: [usize; 4] = [3, 5, 7, 11];
/// Weight lost per soft rule the rule book reports violated
const SOFT_RULE_COST: f64 = 0.01;

/// Bias subtracted from a candidate's validator score
pub fn kind_bias(kind: PatternKind) -> f64 {
    match kind {
        PatternKind::Impulse => 0.02,
        PatternKind::TerminalImpulse => 0.07,
        PatternKind::Zigzag => 0.05,
        PatternKind::Flat => 0.06,
        PatternKind::Triangle => 0.08,
        _ => 0.05,
    }
}

/// Extra cost of combinations
pub fn complexity_penalty(kind: PatternKind) -> f64 {
    if kind.is_combination() {
        0.1
    } else {
        0.0
    }
}

// ============================================================
// CANDIDATES
// ============================================================

#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    /// Position of the first node in the current sequence
    pub start: usize,
    pub len: usize,
    /// Swings covered by the window
    pub span: usize,
    pub check: PatternCheck,
    pub weight: f64,
}

impl Candidate {
    /// One past the last node
    #[inline]
    fn end(&self) -> usize {
        self.start + self.len
    }

    /// Selection value: weight times the swings covered, so a long valid
    /// pattern outranks a scatter of short ones over the same swings
    #[inline]
    fn value(&self) -> f64 {
        self.weight * self.span as f64
    }
}

/// Every match over a gated window that is valid for its validator, passes
/// the rule book's hard rules and keeps a positive weight.
pub(crate) fn candidates(nodes: &[WaveNode], ctx: &SearchContext<'_>) -> Vec<Candidate> {
    let parse = ctx.settings.parse_settings();
    let tau = ctx.settings.similarity_threshold.get();
    let mut out = Vec::new();
    for size in WINDOWS {
        if nodes.len() < size {
            break;
        }
        for start in 0..=nodes.len() - size {
            let window = &nodes[start..start + size];
            if !gate(window, tau) {
                continue;
            }
            let span = window[size - 1].end_index + 1 - window[0].start_index;
            for validator in ctx.validators.for_window(size) {
                let kind = validator.kind();
                if !parse.allows(kind) {
                    continue;
                }
                let check = validator.check(window);
                if !check.is_valid {
                    continue;
                }
                let rules = ctx.evaluator.evaluate(kind, check.subtype, window);
                if !rules.hard_valid {
                    tracing::trace!(
                        "{kind} at {start} rejected by rule book: {:?}",
                        rules.violated_hard
                    );
                    continue;
                }
                let weight = check.score
                    - kind_bias(kind)
                    - complexity_penalty(kind)
                    - SOFT_RULE_COST * rules.soft_violations() as f64;
                if weight > 0.0 {
                    out.push(Candidate {
                        start,
                        len: size,
                        span,
                        check,
                        weight,
                    });
                }
            }
        }
    }
    out
}

// ============================================================
// SELECTION
// ============================================================

/// Non-overlapping candidate sets, each listed in sequence order: the exact
/// optimum first, then distinct beam alternatives. At most `width` sets;
/// empty sets are dropped.
pub(crate) fn select(cands: &[Candidate], width: usize) -> Vec<Vec<usize>> {
    if cands.is_empty() || width == 0 {
        return Vec::new();
    }
    let mut order: Vec<usize> = (0..cands.len()).collect();
    order.sort_by_key(|&i| (cands[i].end(), cands[i].start));

    let mut sets = vec![optimal(cands, &order)];
    for alternative in beam(cands, &order, width) {
        if !sets.contains(&alternative) {
            sets.push(alternative);
        }
    }
    sets.retain(|s| !s.is_empty());
    sets.truncate(width);
    sets
}

/// Weighted-interval scheduling over candidates sorted by end
fn optimal(cands: &[Candidate], order: &[usize]) -> Vec<usize> {
    let n = order.len();
    let mut best = vec![0.0; n + 1];
    let mut taken = vec![false; n];
    let mut prev = vec![0usize; n];
    for j in 0..n {
        let c = &cands[order[j]];
        // candidates ending at or before `c.start` form a prefix of `order`
        let p = order[..j].partition_point(|&i| cands[i].end() <= c.start);
        prev[j] = p;
        let with = c.value() + best[p];
        if with > best[j] {
            best[j + 1] = with;
            taken[j] = true;
        } else {
            best[j + 1] = best[j];
        }
    }

    let mut picked = Vec::new();
    let mut j = n;
    while j > 0 {
        if taken[j - 1] {
            picked.push(order[j - 1]);
            j = prev[j - 1];
        } else {
            j -= 1;
        }
    }
    picked.reverse();
    picked
}

#[derive(Default)]
struct Partial {
    picked: Vec<usize>,
    end: usize,
    value: f64,
    covered: usize,
}

/// Skip/take beam over candidates sorted by end, keeping the `width` best
/// partial solutions (higher value, then more coverage).
fn beam(cands: &[Candidate], order: &[usize], width: usize) -> Vec<Vec<usize>> {
    let mut partials = vec![Partial::default()];
    for &i in order {
        let c = &cands[i];
        let mut next = Vec::with_capacity(partials.len() * 2);
        for p in &partials {
            if c.start >= p.end {
                let mut picked = p.picked.clone();
                picked.push(i);
                next.push(Partial {
                    picked,
                    end: c.end(),
                    value: p.value + c.value(),
                    covered: p.covered + c.len,
                });
            }
        }
        next.extend(partials);
        next.sort_by(|a, b| {
            b.value
                .total_cmp(&a.value)
                .then(b.covered.cmp(&a.covered))
        });
        next.truncate(width);
        partials = next;
    }
    partials.into_iter().map(|p| p.picked).collect()
}

// ============================================================
// COLLAPSE
// ============================================================

/// Node sequence of one search branch
#[derive(Debug, Clone)]
pub(crate) struct State {
    pub nodes: Vec<WaveNode>,
    /// Selection value each root earned when it was built, 0 for bare swings
    values: Vec<f64>,
    /// Root values per swing covered
    pub weight: f64,
}

impl State {
    fn new(nodes: Vec<WaveNode>, values: Vec<f64>) -> Self {
        let covered: usize = nodes.iter().map(WaveNode::span).sum();
        let weight = if covered == 0 {
            0.0
        } else {
            values.iter().sum::<f64>() / covered as f64
        };
        Self {
            nodes,
            values,
            weight,
        }
    }

    fn leaves(nodes: Vec<WaveNode>) -> Self {
        let values = vec![0.0; nodes.len()];
        Self::new(nodes, values)
    }
}

/// Replace each picked candidate's window by its parent node. The parent
/// takes the candidate's value; untouched roots keep theirs.
pub(crate) fn collapse(
    state: &State,
    cands: &[Candidate],
    picked: &[usize],
    tail: usize,
    ids: &mut IdGen,
) -> State {
    let nodes = &state.nodes;
    let mut out = Vec::with_capacity(nodes.len());
    let mut values = Vec::with_capacity(nodes.len());
    let mut next = picked.iter().map(|&k| &cands[k]).peekable();
    let mut i = 0;
    while i < nodes.len() {
        match next.peek() {
            Some(&c) if c.start == i => {
                out.push(pattern_node(ids, c.check.clone(), &nodes[i..c.end()], tail));
                values.push(c.value());
                i = c.end();
                next.next();
            }
            _ => {
                out.push(nodes[i].clone());
                values.push(state.values[i]);
                i += 1;
            }
        }
    }
    State::new(out, values)
}

/// Pre-order (start, end, kind) of every node, used to merge branches
/// that reached the same tree.
fn signature(nodes: &[WaveNode]) -> Vec<(usize, usize, PatternKind)> {
    nodes
        .iter()
        .flat_map(|n| n.flatten())
        .map(|n| (n.start_index, n.end_index, n.kind))
        .collect()
}

/// Collapse passes to a fixed point. Returns at most `beam_width` states,
/// best first.
pub(crate) fn reduce(
    leaves: Vec<WaveNode>,
    tail: usize,
    ids: &mut IdGen,
    ctx: &SearchContext<'_>,
) -> Vec<State> {
    let width = ctx.settings.beam_width.get();
    let mut states = vec![State::leaves(leaves)];
    let mut pass = 0;
    loop {
        pass += 1;
        let mut changed = false;
        let mut next = Vec::with_capacity(states.len() * width);
        for state in states {
            let cands = candidates(&state.nodes, ctx);
            let sets = select(&cands, width);
            if sets.is_empty() {
                next.push(state);
                continue;
            }
            changed = true;
            tracing::debug!(
                "pass {pass}: {} candidates over {} nodes, {} selections",
                cands.len(),
                state.nodes.len(),
                sets.len()
            );
            for picked in &sets {
                next.push(collapse(&state, &cands, picked, tail, ids));
            }
        }

        next.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        let mut seen = HashSet::new();
        next.retain(|s| seen.insert(signature(&s.nodes)));
        next.truncate(width);
        states = next;
        if !changed {
            break;
        }
    }
    states
}
