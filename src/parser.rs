//! Hierarchical bottom-up parser
//!
//! Greedy left-to-right reduction of a swing sequence into a pattern tree:
//!
//! 1. Scan the node list; at each position try a 5-node window (impulse,
//!    terminal impulse, triangle), else a 3-node window (zigzag, flat). The
//!    best valid candidate replaces the window with its parent node.
//! 2. Repeat scans until one makes no reduction or fewer than 3 nodes remain.
//! 3. Merge 7- and 11-node windows into double and triple threes, subject to
//!    the complexity cap.
//! 4. When nothing combined and 2-5 similar nodes of one degree remain,
//!    group them into a low-confidence composite.

use serde::{Deserialize, Serialize};

use crate::{
    patterns::{helpers::all_similar, PatternCheck, PatternKind, ValidatorSet},
    wave::{IdGen, Swing, WaveNode, WaveTree},
    Ratio,
};

/// Score given to composite groupings
pub const COMPOSITE_SCORE: f64 = 0.4;

const FIVE_WAVE: [PatternKind; 3] = [
    PatternKind::Impulse,
    PatternKind::TerminalImpulse,
    PatternKind::Triangle,
];
const THREE_WAVE: [PatternKind; 2] = [PatternKind::Zigzag, PatternKind::Flat];

/// Parser settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseSettings {
    /// Adjacent-pair similarity gate (price or time ratio)
    pub similarity_threshold: Ratio,
    /// 1 = simple patterns only, 2 adds double threes, 3 adds triple threes
    pub complexity_cap: u8,
}

impl Default for ParseSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: Ratio::new_const(0.33),
            complexity_cap: 3,
        }
    }
}

impl ParseSettings {
    #[inline]
    pub fn allows(&self, kind: PatternKind) -> bool {
        match kind {
            PatternKind::DoubleThree => self.complexity_cap >= 2,
            PatternKind::TripleThree => self.complexity_cap >= 3,
            _ => true,
        }
    }
}

/// Origin label from the dominant extremum: the global low or high,
/// whichever comes first.
pub fn anchor_label(swings: &[Swing]) -> String {
    let (Some(low), Some(high)) = (
        swings.iter().min_by(|a, b| a.low.total_cmp(&b.low)),
        swings.iter().max_by(|a, b| a.high.total_cmp(&b.high)),
    ) else {
        return String::new();
    };
    if low.start_time <= high.start_time {
        format!("GlobalMin@{:.2}", low.low)
    } else {
        format!("GlobalMax@{:.2}", high.high)
    }
}

/// Reduce `swings` bottom-up into a [`WaveTree`].
pub fn parse_wave_tree(
    swings: &[Swing],
    validators: &ValidatorSet,
    settings: &ParseSettings,
    ids: &mut IdGen,
) -> WaveTree {
    let anchor = anchor_label(swings);
    if swings.is_empty() {
        return WaveTree {
            roots: Vec::new(),
            anchor,
        };
    }

    let mut parser = Parser {
        validators,
        settings,
        tail: swings.len() - 1,
        ids,
    };
    let mut nodes: Vec<WaveNode> = swings
        .iter()
        .enumerate()
        .map(|(i, s)| WaveNode::leaf(parser.ids.node(), i, s))
        .collect();

    let mut passes = 0;
    while nodes.len() >= 3 {
        let (next, reduced) = parser.reduce_pass(nodes);
        nodes = next;
        passes += 1;
        if !reduced {
            break;
        }
    }

    let (next, combined) = parser.combine_pass(nodes);
    nodes = next;
    if !combined {
        if let Some(composite) = parser.composite(&nodes) {
            nodes = vec![composite];
        }
    }

    tracing::debug!(
        "parsed {} swings in {passes} passes into {} roots",
        swings.len(),
        nodes.len()
    );
    WaveTree {
        roots: nodes,
        anchor,
    }
}

/// Parent node for a validated `check` over `window`, incomplete when it
/// reaches swing `tail`.
///
/// Combination segments (W, Y, Z) become intermediate nodes; the single-leg
/// connectors between them stay as they are.
pub(crate) fn pattern_node(
    ids: &mut IdGen,
    check: PatternCheck,
    window: &[WaveNode],
    tail: usize,
) -> WaveNode {
    let children = if check.kind.is_combination() && !check.segments.is_empty() {
        let mut children = Vec::with_capacity(check.segments.len() * 2 - 1);
        for (k, fit) in check.segments.iter().enumerate() {
            let start = k * 4;
            if k > 0 {
                children.push(window[start - 1].clone());
            }
            let end = (start + fit.legs).min(window.len());
            let segment = window[start..end].to_vec();
            children.push(
                WaveNode::from_children(ids.node(), fit.kind, fit.subtype, fit.score, segment)
                    .with_tail(tail),
            );
        }
        children
    } else {
        window.to_vec()
    };
    WaveNode::from_children(ids.node(), check.kind, check.subtype, check.score, children)
        .with_evidence(check.checks)
        .with_tail(tail)
}

/// Same degree throughout and every adjacent pair similar
pub(crate) fn gate(window: &[WaveNode], tau: f64) -> bool {
    let uniform = window.windows(2).all(|w| w[0].degree == w[1].degree);
    uniform && all_similar(window, tau)
}

struct Parser<'a> {
    validators: &'a ValidatorSet,
    settings: &'a ParseSettings,
    /// Index of the last swing
    tail: usize,
    ids: &'a mut IdGen,
}

impl Parser<'_> {
    fn tau(&self) -> f64 {
        self.settings.similarity_threshold.get()
    }


    /// Best valid candidate among `kinds`; earlier kinds win ties.
    fn try_window(&mut self, window: &[WaveNode], kinds: &[PatternKind]) -> Option<WaveNode> {
        if !gate(window, self.tau()) {
            return None;
        }
        let mut best: Option<PatternCheck> = None;
        for &kind in kinds {
            let Some(check) = self.validators.check(kind, window) else {
                continue;
            };
            if check.is_valid && best.as_ref().map_or(true, |b| check.score > b.score) {
                best = Some(check);
            }
        }
        let check = best?;
        tracing::trace!(
            "reduced swings {}..={} to {} ({:.3})",
            window[0].start_index,
            window[window.len() - 1].end_index,
            check.kind,
            check.score
        );
        Some(pattern_node(self.ids, check, window, self.tail))
    }

    fn reduce_pass(&mut self, nodes: Vec<WaveNode>) -> (Vec<WaveNode>, bool) {
        let mut out = Vec::with_capacity(nodes.len());
        let mut reduced = false;
        let mut i = 0;
        while i < nodes.len() {
            let rest = &nodes[i..];
            let five = (rest.len() >= 5)
                .then(|| self.try_window(&rest[..5], &FIVE_WAVE))
                .flatten();
            if let Some(parent) = five {
                out.push(parent);
                i += 5;
                reduced = true;
                continue;
            }
            let three = (rest.len() >= 3)
                .then(|| self.try_window(&rest[..3], &THREE_WAVE))
                .flatten();
            if let Some(parent) = three {
                out.push(parent);
                i += 3;
                reduced = true;
                continue;
            }
            out.push(nodes[i].clone());
            i += 1;
        }
        (out, reduced)
    }

    /// Double or triple three over a 7- or 11-node window
    fn try_combination(&mut self, window: &[WaveNode]) -> Option<WaveNode> {
        let kind = match window.len() {
            7 => PatternKind::DoubleThree,
            11 => PatternKind::TripleThree,
            _ => return None,
        };
        if !self.settings.allows(kind) || !window.windows(2).all(|w| w[0].degree == w[1].degree) {
            return None;
        }
        let check = self.validators.check(kind, window)?;
        if !check.is_valid || check.segments.is_empty() {
            return None;
        }
        Some(pattern_node(self.ids, check, window, self.tail))
    }

    fn combine_pass(&mut self, nodes: Vec<WaveNode>) -> (Vec<WaveNode>, bool) {
        let mut out = Vec::with_capacity(nodes.len());
        let mut combined = false;
        let mut i = 0;
        while i < nodes.len() {
            let rest = &nodes[i..];
            let mut matched = None;
            for size in [7, 11] {
                if rest.len() >= size {
                    if let Some(parent) = self.try_combination(&rest[..size]) {
                        matched = Some((parent, size));
                        break;
                    }
                }
            }
            match matched {
                Some((parent, size)) => {
                    out.push(parent);
                    i += size;
                    combined = true;
                }
                None => {
                    out.push(nodes[i].clone());
                    i += 1;
                }
            }
        }
        (out, combined)
    }

    fn composite(&mut self, nodes: &[WaveNode]) -> Option<WaveNode> {
        if !(2..=5).contains(&nodes.len()) || !gate(nodes, self.tau()) {
            return None;
        }
        let mut node = WaveNode::from_children(
            self.ids.node(),
            PatternKind::Composite,
            None,
            COMPOSITE_SCORE,
            nodes.to_vec(),
        )
        .with_tail(self.tail);
        node.invalidation = None;
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{tests::legs, Subtype};

    fn parse(points: &[f64]) -> WaveTree {
        let mut ids = IdGen::new();
        parse_wave_tree(
            &legs(points, &[]),
            &ValidatorSet::default(),
            &ParseSettings::default(),
            &mut ids,
        )
    }

    #[test]
    fn test_impulse_reduces_to_single_root() {
        let tree = parse(&[100.0, 110.0, 104.0, 128.0, 120.0, 133.0]);
        assert!(tree.is_reduced());
        assert_eq!(tree.max_degree(), 1);
        let root = &tree.roots[0];
        assert_eq!(root.kind, PatternKind::Impulse);
        assert_eq!(root.subtype, Some(Subtype::Trending));
        assert_eq!(root.degree, 1);
        assert!(!root.complete);
        assert_eq!(root.invalidation, Some(100.0));
        let labels: Vec<_> = root.children.iter().filter_map(|c| c.label.as_deref()).collect();
        assert_eq!(labels, vec!["1", "2", "3", "4", "5"]);
        assert!(!root.evidence.is_empty());
        assert_eq!(tree.anchor, "GlobalMin@100.00");
    }

    #[test]
    fn test_zigzag_reduces() {
        let tree = parse(&[100.0, 90.0, 95.0, 82.0]);
        assert_eq!(tree.roots.len(), 1);
        assert_eq!(tree.roots[0].kind, PatternKind::Zigzag);
        assert_eq!(tree.anchor, "GlobalMax@100.00");
    }

    #[test]
    fn test_triangle_when_motive_rules_fail() {
        // b equals a: impulse and terminal reject, triangle keeps a soft miss
        let tree = parse(&[100.0, 90.0, 100.0, 93.0, 98.0, 95.0]);
        assert_eq!(tree.roots.len(), 1);
        assert_eq!(tree.roots[0].kind, PatternKind::Triangle);
        assert_eq!(tree.roots[0].subtype, Some(Subtype::Contracting));
    }

    #[test]
    fn test_two_fragments_become_composite() {
        let tree = parse(&[100.0, 110.0, 104.0]);
        assert_eq!(tree.roots.len(), 1);
        let root = &tree.roots[0];
        assert_eq!(root.kind, PatternKind::Composite);
        assert_eq!(root.score, COMPOSITE_SCORE);
        assert_eq!(root.invalidation, None);
        assert_eq!(root.children[1].label.as_deref(), Some("S2"));
    }

    #[test]
    fn test_empty_and_single_swing() {
        let tree = parse(&[]);
        assert!(tree.roots.is_empty());
        assert_eq!(tree.anchor, "");

        let tree = parse(&[100.0, 110.0]);
        assert_eq!(tree.roots.len(), 1);
        assert!(tree.roots[0].is_leaf());
    }

    #[test]
    fn test_double_three_window() {
        let validators = ValidatorSet::default();
        let settings = ParseSettings::default();
        let capped = ParseSettings {
            complexity_cap: 1,
            ..ParseSettings::default()
        };
        let mut ids = IdGen::new();
        let swings = legs(&[100.0, 90.0, 95.0, 85.0, 88.0, 80.0, 86.0, 78.0], &[]);
        let leaves: Vec<WaveNode> = swings
            .iter()
            .enumerate()
            .map(|(i, s)| WaveNode::leaf(ids.node(), i, s))
            .collect();
        let mut parser = Parser {
            validators: &validators,
            settings: &settings,
            tail: swings.len() - 1,
            ids: &mut ids,
        };
        let node = parser.try_combination(&leaves).unwrap();
        assert_eq!(node.kind, PatternKind::DoubleThree);
        let labels: Vec<_> = node.children.iter().filter_map(|c| c.label.as_deref()).collect();
        assert_eq!(labels, vec!["W", "X", "Y"]);
        assert_eq!(node.children[0].kind, PatternKind::Zigzag);
        assert!(node.children[1].is_leaf());
        assert_eq!(node.degree, 2);

        parser.settings = &capped;
        assert!(parser.try_combination(&leaves).is_none());
    }
}
