//! Wave data model: swings, pattern trees and scenarios.
//!
//! Everything here is built once per analysis request and never shared
//! across requests. Identifiers come from an explicit [`IdGen`] owned by the
//! computation that creates the nodes.

use serde::{Deserialize, Serialize};

use crate::{
    bar_time,
    patterns::{PatternKind, RuleCheck, Subtype},
    projection::Projection,
    Direction, OHLCVExt, OHLCV,
};

// ============================================================
// IDENTIFIERS
// ============================================================

pub type NodeId = u32;
pub type ScenarioId = u32;

/// Explicit identifier source passed through a computation.
#[derive(Debug, Clone, Default)]
pub struct IdGen {
    next_node: NodeId,
    next_scenario: ScenarioId,
}

impl IdGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator whose ids start at `offset`, for runs whose nodes must not
    /// collide with another run's.
    pub fn with_offset(offset: u32) -> Self {
        Self {
            next_node: offset,
            next_scenario: offset,
        }
    }

    #[inline]
    pub fn node(&mut self) -> NodeId {
        let id = self.next_node;
        self.next_node = self.next_node.wrapping_add(1);
        id
    }

    #[inline]
    pub fn scenario(&mut self) -> ScenarioId {
        let id = self.next_scenario;
        self.next_scenario = self.next_scenario.wrapping_add(1);
        id
    }
}

// ============================================================
// SWING
// ============================================================

/// Minimal directional price move (monowave).
///
/// Adjacent swings of one partition share their pivot bar:
/// `next.start_index == prev.end_index`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Swing {
    pub start_index: usize,
    pub end_index: usize,
    pub start_time: i64,
    pub end_time: i64,
    pub start_price: f64,
    pub end_price: f64,
    pub high: f64,
    pub low: f64,
    /// Volume of bars in `(start_index, end_index]`
    pub volume: f64,
}

impl Swing {
    /// Swing with high/low taken from its endpoints and no volume.
    pub fn new(
        start_index: usize,
        end_index: usize,
        start_time: i64,
        end_time: i64,
        start_price: f64,
        end_price: f64,
    ) -> Self {
        Self {
            start_index,
            end_index,
            start_time,
            end_time,
            start_price,
            end_price,
            high: start_price.max(end_price),
            low: start_price.min(end_price),
            volume: 0.0,
        }
    }

    /// Swing over `bars[start..=end]` using closes for endpoints.
    pub fn from_bars<T: OHLCV>(bars: &[T], start: usize, end: usize) -> Self {
        let span = &bars[start..=end];
        let high = span.iter().map(|b| b.upper()).fold(f64::MIN, f64::max);
        let low = span.iter().map(|b| b.lower()).fold(f64::MAX, f64::min);
        let volume = span
            .iter()
            .skip(1)
            .map(|b| b.volume())
            .filter(|v| v.is_finite())
            .sum();
        Self {
            start_index: start,
            end_index: end,
            start_time: bar_time(bars, start),
            end_time: bar_time(bars, end),
            start_price: bars[start].close(),
            end_price: bars[end].close(),
            high,
            low,
            volume,
        }
    }

    /// One swing spanning `parts` from the first start to the last end.
    pub fn span(parts: &[Swing]) -> Option<Swing> {
        let first = parts.first()?;
        let last = parts.last()?;
        Some(Swing {
            start_index: first.start_index,
            end_index: last.end_index,
            start_time: first.start_time,
            end_time: last.end_time,
            start_price: first.start_price,
            end_price: last.end_price,
            high: parts.iter().map(|s| s.high).fold(f64::MIN, f64::max),
            low: parts.iter().map(|s| s.low).fold(f64::MAX, f64::min),
            volume: parts.iter().map(|s| s.volume).sum(),
        })
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        Direction::from_prices(self.start_price, self.end_price)
    }

    #[inline]
    pub fn length(&self) -> f64 {
        (self.end_price - self.start_price).abs()
    }

    #[inline]
    pub fn duration(&self) -> f64 {
        (self.end_time - self.start_time) as f64
    }

    #[inline]
    pub fn bar_count(&self) -> usize {
        self.end_index - self.start_index + 1
    }
}

// ============================================================
// WAVE NODE
// ============================================================

/// Micro-scale consistency of a node, measured on the finer partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MicroCheck {
    /// 0.0..=1.0, higher is more consistent
    pub score: f64,
    /// Micro swings inside the node's time window
    pub legs: usize,
    pub alternating: bool,
    /// Pattern recognized when the micro swings are re-parsed on their own
    pub pattern: Option<PatternKind>,
    pub violations: Vec<String>,
}

/// Node of a pattern tree.
///
/// Leaves wrap one swing (`degree == 0`, kind `Monowave`). Internal nodes
/// derive every boundary field from their first and last child.
/// `start_index`/`end_index` address the swing sequence; `start_bar`/
/// `end_bar` address the bars.
#[derive(Debug, Clone, Serialize)]
pub struct WaveNode {
    pub id: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub kind: PatternKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<Subtype>,
    pub degree: u8,
    pub start_index: usize,
    pub end_index: usize,
    pub start_bar: usize,
    pub end_bar: usize,
    pub start_time: i64,
    pub end_time: i64,
    pub start_price: f64,
    pub end_price: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub score: f64,
    pub complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalidation: Option<f64>,
    /// Synthesized future leg
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub projected: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<RuleCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub micro: Option<MicroCheck>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<WaveNode>,
}

impl WaveNode {
    /// Leaf wrapping swing number `index`.
    pub fn leaf(id: NodeId, index: usize, swing: &Swing) -> Self {
        Self {
            id,
            label: None,
            kind: PatternKind::Monowave,
            subtype: None,
            degree: 0,
            start_index: index,
            end_index: index,
            start_bar: swing.start_index,
            end_bar: swing.end_index,
            start_time: swing.start_time,
            end_time: swing.end_time,
            start_price: swing.start_price,
            end_price: swing.end_price,
            high: swing.high,
            low: swing.low,
            volume: swing.volume,
            score: 1.0,
            complete: true,
            invalidation: None,
            projected: false,
            evidence: Vec::new(),
            micro: None,
            children: Vec::new(),
        }
    }

    /// Internal node over `children`, which must be non-empty.
    ///
    /// Children are relabeled with the roles of `kind`; the invalidation
    /// price is the pattern-start price.
    pub fn from_children(
        id: NodeId,
        kind: PatternKind,
        subtype: Option<Subtype>,
        score: f64,
        mut children: Vec<WaveNode>,
    ) -> Self {
        let n = children.len();
        for (child, label) in children.iter_mut().zip(kind.role_labels(n)) {
            child.label = Some(label);
        }
        let (first, last) = match (children.first(), children.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Self {
                    id,
                    label: None,
                    kind,
                    subtype,
                    degree: 1,
                    start_index: 0,
                    end_index: 0,
                    start_bar: 0,
                    end_bar: 0,
                    start_time: 0,
                    end_time: 0,
                    start_price: 0.0,
                    end_price: 0.0,
                    high: 0.0,
                    low: 0.0,
                    volume: 0.0,
                    score: 0.0,
                    complete: false,
                    invalidation: None,
                    projected: false,
                    evidence: Vec::new(),
                    micro: None,
                    children,
                }
            }
        };
        Self {
            id,
            label: None,
            kind,
            subtype,
            degree: children.iter().map(|c| c.degree).max().unwrap_or(0) + 1,
            start_index: first.start_index,
            end_index: last.end_index,
            start_bar: first.start_bar,
            end_bar: last.end_bar,
            start_time: first.start_time,
            end_time: last.end_time,
            start_price: first.start_price,
            end_price: last.end_price,
            high: children.iter().map(|c| c.high).fold(f64::MIN, f64::max),
            low: children.iter().map(|c| c.low).fold(f64::MAX, f64::min),
            volume: children.iter().map(|c| c.volume).sum(),
            score: score.clamp(0.0, 1.0),
            complete: true,
            invalidation: Some(first.start_price),
            projected: children.iter().any(|c| c.projected),
            evidence: Vec::new(),
            micro: None,
            children,
        }
    }

    pub fn with_evidence(mut self, evidence: Vec<RuleCheck>) -> Self {
        self.evidence = evidence;
        self
    }

    /// Mark incomplete when the node reaches the last swing index `tail`.
    pub fn with_tail(mut self, tail: usize) -> Self {
        self.complete = self.end_index < tail;
        self
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        Direction::from_prices(self.start_price, self.end_price)
    }

    #[inline]
    pub fn length(&self) -> f64 {
        (self.end_price - self.start_price).abs()
    }

    #[inline]
    pub fn duration(&self) -> f64 {
        (self.end_time - self.start_time) as f64
    }

    /// Number of swings covered
    #[inline]
    pub fn span(&self) -> usize {
        self.end_index - self.start_index + 1
    }

    /// Pre-order traversal
    pub fn flatten(&self) -> Vec<&WaveNode> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a WaveNode>) {
        out.push(self);
        for child in &self.children {
            child.collect(out);
        }
    }

    /// Nodes obtained by descending until degree `<= level`
    pub fn at_degree(&self, level: u8) -> Vec<&WaveNode> {
        if self.degree <= level || self.is_leaf() {
            return vec![self];
        }
        self.children.iter().flat_map(|c| c.at_degree(level)).collect()
    }
}

/// Flattened view of `roots` at the degree whose node count is closest to
/// `target`. Ties prefer the coarser degree.
pub fn view_nodes(roots: &[WaveNode], target: usize) -> (u8, Vec<&WaveNode>) {
    let top = roots.iter().map(|r| r.degree).max().unwrap_or(0);
    let mut best: Option<(usize, u8, Vec<&WaveNode>)> = None;
    for level in (0..=top).rev() {
        let nodes: Vec<&WaveNode> = roots.iter().flat_map(|r| r.at_degree(level)).collect();
        let diff = nodes.len().abs_diff(target);
        if best.as_ref().map_or(true, |(d, _, _)| diff < *d) {
            best = Some((diff, level, nodes));
        }
    }
    best.map(|(_, level, nodes)| (level, nodes))
        .unwrap_or((0, Vec::new()))
}

// ============================================================
// WAVE TREE
// ============================================================

/// Ordered roots covering a whole swing sequence.
#[derive(Debug, Clone, Serialize)]
pub struct WaveTree {
    pub roots: Vec<WaveNode>,
    /// Dominant extremum used as origin, e.g. `GlobalMin@100.00`
    pub anchor: String,
}

impl WaveTree {
    pub fn is_reduced(&self) -> bool {
        self.roots.len() == 1
    }

    pub fn max_degree(&self) -> u8 {
        self.roots.iter().map(|r| r.degree).max().unwrap_or(0)
    }

    pub fn flatten(&self) -> Vec<&WaveNode> {
        self.roots.iter().flat_map(|r| r.flatten()).collect()
    }

    pub fn view(&self, target: usize) -> (u8, Vec<&WaveNode>) {
        view_nodes(&self.roots, target)
    }
}

// ============================================================
// SCENARIO
// ============================================================

/// Scenario lifecycle. `Active` may move to either other state; both are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Active,
    Invalidated,
    Completed,
}

/// Side of the invalidation price that falsifies a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InvalidationLevel {
    pub price: f64,
    pub side: Side,
}

impl InvalidationLevel {
    /// Level for a pattern: its origin, on the side opposite its direction.
    pub fn for_node(node: &WaveNode) -> Self {
        let side = match node.direction() {
            Direction::Up => Side::Below,
            Direction::Down => Side::Above,
        };
        Self {
            price: node.invalidation.unwrap_or(node.start_price),
            side,
        }
    }

    #[inline]
    pub fn is_crossed_by(&self, price: f64) -> bool {
        match self.side {
            Side::Above => price > self.price,
            Side::Below => price < self.price,
        }
    }
}

/// Complete market-structure hypothesis.
#[derive(Debug, Clone, Serialize)]
pub struct Scenario {
    pub id: ScenarioId,
    pub anchor: String,
    pub roots: Vec<WaveNode>,
    /// 0.0..=1.0, higher is better
    pub score: f64,
    pub status: ScenarioStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
    /// Structural evidence gathered after the search
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<RuleCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalidation: Option<InvalidationLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<Projection>,
    pub summary: String,
}

impl Scenario {
    pub fn new(id: ScenarioId, anchor: impl Into<String>, roots: Vec<WaveNode>, score: f64) -> Self {
        let mut scenario = Self {
            id,
            anchor: anchor.into(),
            roots,
            score: score.clamp(0.0, 1.0),
            status: ScenarioStatus::Active,
            reasons: Vec::new(),
            checks: Vec::new(),
            invalidation: None,
            projection: None,
            summary: String::new(),
        };
        scenario.invalidation = scenario.latest_pattern().map(InvalidationLevel::for_node);
        scenario.summary = scenario.describe();
        scenario
    }

    /// `active -> invalidated`. Further reasons are still recorded.
    pub fn invalidate(&mut self, reason: impl Into<String>) {
        if self.status != ScenarioStatus::Completed {
            self.status = ScenarioStatus::Invalidated;
            self.reasons.push(reason.into());
        }
    }

    /// `active -> completed`; false when the scenario is not active.
    pub fn complete(&mut self) -> bool {
        if self.status == ScenarioStatus::Active {
            self.status = ScenarioStatus::Completed;
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == ScenarioStatus::Active
    }

    /// Internal root covering the most swings (earliest wins ties),
    /// else the last root.
    pub fn dominant(&self) -> Option<&WaveNode> {
        let mut best: Option<&WaveNode> = None;
        for root in self.roots.iter().filter(|r| !r.is_leaf()) {
            if best.map_or(true, |b| root.span() > b.span()) {
                best = Some(root);
            }
        }
        best.or_else(|| self.roots.last())
    }

    /// Most recent internal root
    pub fn latest_pattern(&self) -> Option<&WaveNode> {
        self.roots.iter().rev().find(|r| !r.is_leaf())
    }

    /// Inclusive swing spans of every internal node, outermost first
    pub fn pattern_spans(&self) -> Vec<(usize, usize)> {
        self.roots
            .iter()
            .flat_map(|r| r.flatten())
            .filter(|n| !n.is_leaf() && !n.projected)
            .map(|n| (n.start_index, n.end_index))
            .collect()
    }

    pub fn view(&self, target: usize) -> (u8, Vec<&WaveNode>) {
        view_nodes(&self.roots, target)
    }

    pub fn refresh_summary(&mut self) {
        self.summary = self.describe();
    }

    fn describe(&self) -> String {
        let Some(node) = self.dominant() else {
            return "No structure".to_string();
        };
        let mut text = match node.subtype {
            Some(subtype) => format!(
                "{} ({}) {} from {} to {}",
                node.kind, subtype, node.direction(), node.start_time, node.end_time
            ),
            None => format!(
                "{} {} from {} to {}",
                node.kind,
                node.direction(),
                node.start_time,
                node.end_time
            ),
        };
        if !node.complete {
            text.push_str(", in progress");
        }
        if self.roots.len() > 1 {
            text.push_str(&format!(", {} roots", self.roots.len()));
        }
        if let Some(level) = &self.invalidation {
            let side = match level.side {
                Side::Above => "above",
                Side::Below => "below",
            };
            text.push_str(&format!(", invalid {} {:.2}", side, level.price));
        }
        text
    }
}

// ============================================================
// TESTS
// ============================================================
