//! Rule-book predicates evaluated on candidate windows.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{metrics::Metrics, predicate::Predicate, RuleBook, RuleEntry};
use crate::patterns::{Leg, PatternKind, Subtype};

#[derive(Debug, Clone)]
struct CompiledRule {
    id: String,
    predicate: Predicate,
    hard: bool,
    weight: f64,
}

/// Outcome of evaluating one subtype's rules on one window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validation {
    /// No hard rule failed
    pub hard_valid: bool,
    /// Summed weight of the failed soft rules
    pub soft_penalty: f64,
    pub satisfied: Vec<String>,
    pub violated_soft: Vec<String>,
    pub violated_hard: Vec<String>,
}

impl Default for Validation {
    fn default() -> Self {
        Self {
            hard_valid: true,
            soft_penalty: 0.0,
            satisfied: Vec::new(),
            violated_soft: Vec::new(),
            violated_hard: Vec::new(),
        }
    }
}

impl Validation {
    #[inline]
    pub fn soft_violations(&self) -> usize {
        self.violated_soft.len()
    }

    /// Rules evaluated
    pub fn rule_count(&self) -> usize {
        self.satisfied.len() + self.violated_soft.len() + self.violated_hard.len()
    }
}

/// Rule book compiled to typed predicates.
///
/// Expressions that do not parse are dropped with a warning at
/// construction, so evaluation itself never fails. Text entries carry no
/// predicates and pass.
#[derive(Debug, Clone, Default)]
pub struct RuleEvaluator {
    rules: BTreeMap<String, BTreeMap<String, Vec<CompiledRule>>>,
}

impl RuleEvaluator {
    pub fn new(book: &RuleBook) -> Self {
        let mut rules: BTreeMap<String, BTreeMap<String, Vec<CompiledRule>>> = BTreeMap::new();
        let mut compiled = 0usize;
        for pattern in book.patterns() {
            for (subtype, entry) in book.subtypes(pattern) {
                let list = match entry {
                    RuleEntry::Structured(set) => set
                        .iter()
                        .filter_map(|spec| match Predicate::parse(&spec.expr) {
                            Ok(predicate) => Some(CompiledRule {
                                id: spec.id.clone(),
                                predicate,
                                hard: spec.hard,
                                weight: spec.weight,
                            }),
                            Err(e) => {
                                tracing::warn!("{pattern}/{subtype} rule '{}' skipped: {e}", spec.id);
                                None
                            }
                        })
                        .collect(),
                    RuleEntry::Text(_) => Vec::new(),
                };
                compiled += list.len();
                rules
                    .entry(pattern.to_string())
                    .or_default()
                    .insert(subtype.to_string(), list);
            }
        }
        tracing::debug!("rule evaluator: {compiled} predicates compiled");
        Self { rules }
    }

    /// Book key of a pattern kind and subtype
    fn key(kind: PatternKind, subtype: Option<Subtype>) -> Option<(&'static str, &'static str)> {
        let key = match (kind, subtype) {
            (PatternKind::Impulse, Some(Subtype::Terminal)) => ("Impulse", "TerminalImpulse"),
            (PatternKind::Impulse, _) => ("Impulse", "TrendingImpulse"),
            (PatternKind::TerminalImpulse, _) => ("Impulse", "TerminalImpulse"),
            (PatternKind::Zigzag, _) => ("Zigzag", "Standard"),
            (PatternKind::Flat, Some(Subtype::Expanded)) => ("Flat", "Expanded"),
            (PatternKind::Flat, Some(Subtype::RunningFlat)) => ("Flat", "Running"),
            (PatternKind::Flat, _) => ("Flat", "Normal"),
            (PatternKind::Triangle, Some(Subtype::Expanding)) => ("Triangle", "Expanding"),
            (PatternKind::Triangle, Some(Subtype::Neutral)) => ("Triangle", "Neutral"),
            (PatternKind::Triangle, _) => ("Triangle", "Contracting"),
            _ => return None,
        };
        Some(key)
    }

    /// Rules for the subtype, else the pattern's first subtype in name order
    fn rules_for(&self, kind: PatternKind, subtype: Option<Subtype>) -> Option<&[CompiledRule]> {
        let (pattern, sub) = Self::key(kind, subtype)?;
        let subtypes = self.rules.get(pattern)?;
        subtypes
            .get(sub)
            .or_else(|| subtypes.values().next())
            .map(Vec::as_slice)
    }

    /// Evaluate `legs` as a `kind` pattern of `subtype`. Patterns the book
    /// does not cover pass with no rules.
    pub fn evaluate<L: Leg>(
        &self,
        kind: PatternKind,
        subtype: Option<Subtype>,
        legs: &[L],
    ) -> Validation {
        let mut validation = Validation::default();
        let Some(rules) = self.rules_for(kind, subtype) else {
            return validation;
        };
        let metrics = Metrics::compute(kind, legs);
        for rule in rules {
            if rule.predicate.eval(&metrics) {
                validation.satisfied.push(rule.id.clone());
            } else if rule.hard {
                validation.hard_valid = false;
                validation.violated_hard.push(rule.id.clone());
            } else {
                validation.soft_penalty += rule.weight;
                validation.violated_soft.push(rule.id.clone());
            }
        }
        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        patterns::tests::legs,
        rules::{RuleSet, RuleSpec},
    };

    #[test]
    fn test_textbook_impulse_passes_every_rule() {
        let eval = RuleEvaluator::new(&RuleBook::default());
        let window = legs(&[100.0, 110.0, 104.0, 128.0, 120.0, 133.0], &[]);
        let v = eval.evaluate(PatternKind::Impulse, Some(Subtype::Trending), &window);
        assert!(v.hard_valid);
        assert_eq!(v.soft_violations(), 0);
        assert_eq!(v.rule_count(), 6);
    }

    #[test]
    fn test_deep_zigzag_b_fails_hard() {
        let eval = RuleEvaluator::new(&RuleBook::default());
        let v = eval.evaluate(
            PatternKind::Zigzag,
            None,
            &legs(&[100.0, 90.0, 98.0, 82.0], &[]),
        );
        assert!(!v.hard_valid);
        assert_eq!(v.violated_hard, vec!["b_depth".to_string()]);
    }

    #[test]
    fn test_flat_subtype_selects_rules() {
        let eval = RuleEvaluator::new(&RuleBook::default());
        // B/A = 1.1, C/B = 13/11
        let window = legs(&[100.0, 90.0, 101.0, 88.0], &[]);
        let v = eval.evaluate(PatternKind::Flat, Some(Subtype::Expanded), &window);
        assert!(v.hard_valid);
        assert!(v.satisfied.contains(&"b_strong".to_string()));
        assert!(v.satisfied.contains(&"c_follow_through".to_string()));
    }

    #[test]
    fn test_soft_failure_accumulates_weight() {
        let eval = RuleEvaluator::new(&RuleBook::default());
        // e/c = 1.5 breaks the contracting e_vs_c band
        let window = legs(&[100.0, 90.0, 97.0, 91.0, 95.0, 86.0], &[]);
        let v = eval.evaluate(PatternKind::Triangle, Some(Subtype::Contracting), &window);
        assert!(v.hard_valid);
        assert!(v.violated_soft.contains(&"e_vs_c".to_string()));
        assert!(v.soft_penalty >= 0.1);
    }

    #[test]
    fn test_uncovered_patterns_pass() {
        let eval = RuleEvaluator::new(&RuleBook::default());
        let v = eval.evaluate(
            PatternKind::DoubleThree,
            None,
            &legs(&[100.0, 90.0, 95.0, 85.0, 88.0, 80.0, 86.0, 78.0], &[]),
        );
        assert!(v.hard_valid);
        assert_eq!(v.rule_count(), 0);
    }

    #[test]
    fn test_bad_expression_is_skipped() {
        let mut book = RuleBook::new();
        book.insert(
            "Zigzag",
            "Standard",
            RuleSet::price(vec![
                RuleSpec::hard("bad", "sqrt(B_over_A) < 1", 0.5, ""),
                RuleSpec::soft("c", "C_over_A >= 0.618", 0.15, ""),
            ]),
        );
        let eval = RuleEvaluator::new(&book);
        let v = eval.evaluate(PatternKind::Zigzag, None, &legs(&[100.0, 90.0, 95.0, 82.0], &[]));
        assert_eq!(v.rule_count(), 1);
        assert!(v.hard_valid);
    }
}
