//! Rule knowledge base
//!
//! A [`RuleBook`] maps pattern -> subtype -> rules. A subtype entry is either
//! structured (`price_rules`/`time_rules`/`volume_rules`, each rule carrying a
//! typed expression) or a free-text description from which numeric
//! thresholds are extracted.
//!
//! The book feeds two consumers:
//! - [`ValidatorSet::from_rule_book`](crate::patterns::ValidatorSet::from_rule_book)
//!   derives validator thresholds from it
//! - [`RuleEvaluator`] evaluates its predicates on candidate windows
//!
//! # Example
//!
//! ```rust
//! use yawc::rules::RuleBook;
//!
//! let book = RuleBook::from_json(r#"{"Zigzag": {"Standard": "Wave B <= 50% of A"}}"#);
//! assert!(book.get("Zigzag", "Standard").is_some());
//! assert!(book.get("Flat", "Normal").is_some());
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Result;

mod evaluator;
mod extract;
pub mod metrics;
pub mod predicate;
pub mod text;

pub use evaluator::{RuleEvaluator, Validation};
pub use metrics::{Metric, Metrics};
pub use predicate::{CmpOp, Operand, Predicate};

// ============================================================
// RULE MODEL
// ============================================================

fn default_weight() -> f64 {
    0.1
}

/// One rule of a structured entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub id: String,
    /// Predicate source, see [`Predicate::parse`]
    pub expr: String,
    #[serde(default)]
    pub hard: bool,
    /// Soft penalty when violated
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub description: String,
}

impl RuleSpec {
    pub fn hard(id: &str, expr: &str, weight: f64, description: &str) -> Self {
        Self {
            id: id.to_string(),
            expr: expr.to_string(),
            hard: true,
            weight,
            description: description.to_string(),
        }
    }

    pub fn soft(id: &str, expr: &str, weight: f64, description: &str) -> Self {
        Self {
            hard: false,
            ..Self::hard(id, expr, weight, description)
        }
    }
}

/// Structured rules of one pattern subtype
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub price_rules: Vec<RuleSpec>,
    pub time_rules: Vec<RuleSpec>,
    pub volume_rules: Vec<RuleSpec>,
}

impl RuleSet {
    pub fn price(rules: Vec<RuleSpec>) -> Self {
        Self {
            price_rules: rules,
            ..Self::default()
        }
    }

    pub fn with_time(mut self, rules: Vec<RuleSpec>) -> Self {
        self.time_rules = rules;
        self
    }

    /// Price, then time, then volume rules
    pub fn iter(&self) -> impl Iterator<Item = &RuleSpec> {
        self.price_rules
            .iter()
            .chain(&self.time_rules)
            .chain(&self.volume_rules)
    }
}

/// A subtype entry: structured rules or descriptive text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleEntry {
    Text(String),
    Structured(RuleSet),
}

impl From<RuleSet> for RuleEntry {
    fn from(set: RuleSet) -> Self {
        RuleEntry::Structured(set)
    }
}

impl From<&str> for RuleEntry {
    fn from(text: &str) -> Self {
        RuleEntry::Text(text.to_string())
    }
}

// ============================================================
// RULE BOOK
// ============================================================

/// Pattern -> subtype -> rule entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleBook {
    patterns: BTreeMap<String, BTreeMap<String, RuleEntry>>,
}

impl RuleBook {
    /// Empty book; every validator keeps its defaults.
    pub fn new() -> Self {
        Self {
            patterns: BTreeMap::new(),
        }
    }

    /// Strict parse of a JSON rule book without merging defaults
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Built-in book overlaid with the entries of `json`.
    ///
    /// Never fails: malformed input is logged and the built-in book returned.
    pub fn from_json(json: &str) -> Self {
        match Self::parse(json) {
            Ok(custom) => Self::default().merged(custom),
            Err(e) => {
                tracing::warn!("rule book rejected ({e}); using built-in rules");
                Self::default()
            }
        }
    }

    /// Subtype entries of `other` replace those of `self`
    pub fn merged(mut self, other: RuleBook) -> Self {
        for (pattern, subtypes) in other.patterns {
            self.patterns.entry(pattern).or_default().extend(subtypes);
        }
        self
    }

    pub fn insert(&mut self, pattern: &str, subtype: &str, entry: impl Into<RuleEntry>) {
        self.patterns
            .entry(pattern.to_string())
            .or_default()
            .insert(subtype.to_string(), entry.into());
    }

    pub fn get(&self, pattern: &str, subtype: &str) -> Option<&RuleEntry> {
        self.patterns.get(pattern)?.get(subtype)
    }

    /// Subtype entries of `pattern`, in name order
    pub fn subtypes(&self, pattern: &str) -> impl Iterator<Item = (&str, &RuleEntry)> {
        self.patterns
            .get(pattern)
            .into_iter()
            .flat_map(|subs| subs.iter().map(|(k, v)| (k.as_str(), v)))
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for RuleBook {
    /// Built-in knowledge base, consistent with the validator defaults
    fn default() -> Self {
        let mut book = RuleBook::new();

        book.insert(
            "Impulse",
            "TrendingImpulse",
            RuleSet::price(vec![
                RuleSpec::hard("wave2_lt_100", "wave2_ratio < 1.0", 0.4, "Wave 2 retraces less than 100% of wave 1"),
                RuleSpec::soft("wave2_min", "wave2_ratio >= 0.236", 0.1, "Wave 2 retraces at least 23.6%"),
                RuleSpec::hard("wave3_not_shortest", "wave3_not_shortest", 0.6, "Wave 3 is not the shortest motive wave"),
                RuleSpec::soft("extension_present", "extension_ratio >= 1.618", 0.1, "One of waves 1, 3, 5 is extended"),
                RuleSpec::soft("wave5_vs_wave4", "wave5_over_wave4 >= 0.382", 0.08, "Wave 5 reaches 38.2% of wave 4"),
            ])
            .with_time(vec![RuleSpec::soft(
                "corrective_time",
                "wave2_time >= 0.33 * wave1_time and wave4_time >= 0.33 * wave3_time",
                0.05,
                "Waves 2 and 4 take at least a third of the preceding wave's time",
            )]),
        );
        book.insert(
            "Impulse",
            "TerminalImpulse",
            RuleSet::price(vec![
                RuleSpec::hard("wave2_lt_100", "wave2_ratio < 1.0", 0.4, "Wave 2 retraces less than 100% of wave 1"),
                RuleSpec::hard("wave3_not_shortest", "wave3_not_shortest", 0.6, "Wave 3 is not the shortest motive wave"),
                RuleSpec::soft("diagonal_overlap", "true", 0.05, "Wave 4 may overlap wave 1"),
            ]),
        );

        book.insert(
            "Zigzag",
            "Standard",
            RuleSet::price(vec![
                RuleSpec::hard("b_depth", "B_over_A <= 0.618", 0.5, "Wave B retraces at most 61.8% of A"),
                RuleSpec::hard("c_min", "C_over_A >= 0.382", 0.2, "Wave C reaches 38.2% of A"),
            ]),
        );

        book.insert(
            "Flat",
            "Normal",
            RuleSet::price(vec![
                RuleSpec::hard("b_min", "B_over_A >= 0.618", 0.45, "Wave B retraces at least 61.8% of A"),
                RuleSpec::hard("c_min", "C_over_A >= 0.382", 0.2, "Wave C reaches 38.2% of A"),
                RuleSpec::soft("c_vs_b", "C_over_B >= 0.382", 0.12, "Wave C reaches 38.2% of B"),
            ]),
        );
        book.insert(
            "Flat",
            "Expanded",
            RuleSet::price(vec![
                RuleSpec::hard("b_strong", "B_over_A >= 1.0", 0.4, "Wave B exceeds the start of A"),
                RuleSpec::soft("c_follow_through", "C_over_B >= 0.618", 0.15, "Wave C carries through 61.8% of B"),
            ]),
        );
        book.insert(
            "Flat",
            "Running",
            RuleSet::price(vec![
                RuleSpec::hard("b_very_strong", "B_over_A >= 1.236", 0.4, "Wave B reaches 123.6% of A"),
                RuleSpec::soft("c_short", "C_over_A >= 0.382", 0.1, "Wave C reaches 38.2% of A"),
            ]),
        );

        book.insert(
            "Triangle",
            "Contracting",
            RuleSet::price(vec![
                RuleSpec::hard("alternation", "alternating", 0.4, "Legs alternate a-b-c-d-e"),
                RuleSpec::soft("c_vs_a", "C_over_A <= 0.9", 0.12, "Wave c is smaller than a"),
                RuleSpec::soft("e_vs_c", "E_over_C >= 0.382 and E_over_C <= 1.0", 0.1, "Wave e is 38.2-100% of c"),
            ])
            .with_time(vec![RuleSpec::soft(
                "time_balance",
                "time_balance >= 0.25",
                0.05,
                "Adjacent legs take comparable time",
            )]),
        );
        book.insert(
            "Triangle",
            "Expanding",
            RuleSet::price(vec![
                RuleSpec::hard("alternation", "alternating", 0.4, "Legs alternate a-b-c-d-e"),
                RuleSpec::soft("c_vs_a", "C_over_A >= 1.0", 0.12, "Wave c exceeds a"),
                RuleSpec::soft("e_vs_c", "E_over_C >= 1.0", 0.12, "Wave e exceeds c"),
            ]),
        );
        book.insert(
            "Triangle",
            "Neutral",
            RuleSet::price(vec![
                RuleSpec::hard("alternation", "alternating", 0.35, "Legs alternate a-b-c-d-e"),
                RuleSpec::soft("balance", "price_balance >= 0.33", 0.12, "Leg sizes are balanced"),
            ]),
        );

        book
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_book_expressions_parse() {
        let book = RuleBook::default();
        for pattern in book.patterns() {
            for (subtype, entry) in book.subtypes(pattern) {
                let RuleEntry::Structured(set) = entry else {
                    panic!("{pattern}/{subtype} is not structured");
                };
                for rule in set.iter() {
                    assert!(Predicate::parse(&rule.expr).is_ok(), "{}", rule.expr);
                }
            }
        }
    }

    #[test]
    fn test_from_json_overlays_defaults() {
        let book = RuleBook::from_json(r#"{"Zigzag": {"Standard": "Wave B <= 50% of A"}}"#);
        assert_eq!(
            book.get("Zigzag", "Standard"),
            Some(&RuleEntry::Text("Wave B <= 50% of A".to_string()))
        );
        assert!(matches!(
            book.get("Flat", "Expanded"),
            Some(RuleEntry::Structured(_))
        ));
    }

    #[test]
    fn test_from_json_falls_back_on_garbage() {
        assert_eq!(RuleBook::from_json("{not json"), RuleBook::default());
        assert!(RuleBook::parse("[1, 2]").is_err());
    }

    #[test]
    fn test_structured_entry_defaults() {
        let json = r#"{"Flat": {"Normal": {"price_rules": [{"id": "b", "expr": "B_over_A >= 0.7"}]}}}"#;
        let book = RuleBook::parse(json).unwrap();
        let Some(RuleEntry::Structured(set)) = book.get("Flat", "Normal") else {
            panic!("expected structured entry");
        };
        assert_eq!(set.price_rules[0].weight, 0.1);
        assert!(!set.price_rules[0].hard);
        assert!(set.time_rules.is_empty());
    }

    #[test]
    fn test_round_trip_through_json() {
        let book = RuleBook::default();
        let json = serde_json::to_string(&book).unwrap();
        assert_eq!(RuleBook::parse(&json).unwrap(), book);
    }
}
