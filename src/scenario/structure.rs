//! Structural re-validation of finished scenarios
//!
//! Walks every internal node and checks the child layout its pattern class
//! expects, the energy balance between parent and children and the Rule of
//! Similarity among siblings. A wrong child count invalidates the scenario;
//! everything else costs score.

use super::SearchSettings;
use crate::{
    patterns::{
        helpers::{between, dissimilar_pairs, energy, ratio},
        PatternKind, RuleCheck,
    },
    wave::{Scenario, WaveNode},
};

const MOTIVE_SLOT_PENALTY: f64 = 0.2;
const CORRECTIVE_SLOT_PENALTY: f64 = 0.1;
const ZIGZAG_SLOT_PENALTY: f64 = 0.25;
const ENERGY_PENALTY: f64 = 0.1;
const SIMILARITY_PENALTY: f64 = 0.05;

/// Children a well-formed node of `kind` has; `None` when free-form
pub fn expected_children(kind: PatternKind) -> Option<usize> {
    match kind {
        PatternKind::Impulse | PatternKind::TerminalImpulse | PatternKind::Triangle => Some(5),
        PatternKind::Zigzag | PatternKind::Flat | PatternKind::DoubleThree => Some(3),
        PatternKind::TripleThree => Some(5),
        PatternKind::Composite | PatternKind::Monowave => None,
    }
}

#[inline]
fn motive_like(kind: PatternKind) -> bool {
    kind.is_motive() || kind == PatternKind::Monowave
}

#[inline]
fn corrective_like(kind: PatternKind) -> bool {
    kind.is_corrective() || kind == PatternKind::Monowave
}

fn failed(
    key: &'static str,
    description: &'static str,
    value: f64,
    expected: String,
    penalty: f64,
    critical: bool,
) -> RuleCheck {
    RuleCheck {
        key,
        description,
        value,
        expected,
        passed: false,
        penalty,
        critical,
    }
}

/// Re-validate every internal node of `scenario`, recording failures in
/// `scenario.checks`. Returns the summed score penalty.
pub fn revalidate(scenario: &mut Scenario, settings: &SearchSettings) -> f64 {
    let mut checks = Vec::new();
    let mut reasons = Vec::new();
    for root in &scenario.roots {
        for node in root.flatten() {
            if node.is_leaf() || node.projected {
                continue;
            }
            inspect(node, settings, &mut checks, &mut reasons);
        }
    }
    let penalty = checks.iter().filter(|c| !c.critical).map(|c| c.penalty).sum();
    for reason in reasons {
        scenario.invalidate(reason);
    }
    scenario.checks.extend(checks);
    penalty
}

fn inspect(
    node: &WaveNode,
    settings: &SearchSettings,
    checks: &mut Vec<RuleCheck>,
    reasons: &mut Vec<String>,
) {
    let found = node.children.len();
    if let Some(expected) = expected_children(node.kind) {
        if found != expected {
            reasons.push(format!(
                "{} must have {expected} subwaves, found {found}",
                node.kind
            ));
            checks.push(failed(
                "child_count",
                "Wrong number of subwaves",
                found as f64,
                expected.to_string(),
                0.0,
                true,
            ));
            return;
        }
    }

    match node.kind {
        PatternKind::Impulse => {
            for (slot, child) in node.children.iter().enumerate() {
                if slot % 2 == 0 && !motive_like(child.kind) {
                    checks.push(failed(
                        "motive_slot",
                        "Impulse wave 1, 3 or 5 is not motive",
                        slot as f64 + 1.0,
                        "motive".to_string(),
                        MOTIVE_SLOT_PENALTY,
                        false,
                    ));
                } else if slot % 2 == 1 && !corrective_like(child.kind) {
                    checks.push(failed(
                        "corrective_slot",
                        "Impulse wave 2 or 4 is not corrective",
                        slot as f64 + 1.0,
                        "corrective".to_string(),
                        CORRECTIVE_SLOT_PENALTY,
                        false,
                    ));
                }
            }
        }
        PatternKind::Zigzag => {
            for slot in [0, 2] {
                if !motive_like(node.children[slot].kind) {
                    checks.push(failed(
                        "zigzag_slot",
                        "Zigzag wave A or C is not motive",
                        slot as f64,
                        "motive".to_string(),
                        ZIGZAG_SLOT_PENALTY,
                        false,
                    ));
                }
            }
        }
        _ => {}
    }

    let (lo, hi) = settings.energy_band;
    let children: f64 = node.children.iter().map(energy).sum();
    if children > 0.0 {
        let balance = ratio(energy(node), children);
        if !(lo..=hi).contains(&balance) {
            checks.push(failed(
                "energy_balance",
                "Parent energy out of balance with its subwaves",
                balance,
                between(lo, hi),
                ENERGY_PENALTY,
                false,
            ));
        }
    }

    let dissimilar = dissimilar_pairs(&node.children, settings.similarity_threshold.get());
    if dissimilar > 0 {
        checks.push(failed(
            "sibling_similarity",
            "Adjacent subwaves are dissimilar in price and time",
            dissimilar as f64,
            "0".to_string(),
            SIMILARITY_PENALTY * dissimilar as f64,
            false,
        ));
    }
}
