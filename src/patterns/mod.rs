//! Wave pattern validators
//!
//! One validator per pattern class, each scoring an exact-size window of
//! alternating legs:
//!
//! - **Motive (5 legs)**: Impulse, Terminal Impulse
//! - **Corrective (3 legs)**: Zigzag, Flat
//! - **Corrective (5 legs)**: Triangle (contracting, expanding, neutral)
//! - **Combinations (7/11 legs)**: Double Three, Triple Three
//!
//! Rejection is a value: a window that fails a critical rule comes back as a
//! [`PatternCheck`] with `score == 0.0`, never as an error.

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple validator types.
macro_rules! impl_with_defaults {
  ($($validator:ty),* $(,)?) => {
    $(impl $validator {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

mod combination;
mod flat;
mod impulse;
mod terminal;
mod triangle;
mod zigzag;

pub use combination::{CorrectionSet, DoubleThreeValidator, TripleThreeValidator};
pub use flat::FlatValidator;
pub use helpers::Leg;
pub use impulse::ImpulseValidator;
pub use terminal::TerminalImpulseValidator;
pub use triangle::TriangleValidator;
pub use zigzag::ZigzagValidator;

use serde::{Deserialize, Serialize};

use crate::{Direction, Result};

// ============================================================
// PATTERN KIND
// ============================================================

/// Closed set of pattern classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Monowave,
    Impulse,
    TerminalImpulse,
    Zigzag,
    Flat,
    Triangle,
    DoubleThree,
    TripleThree,
    /// Similar fragments grouped at reduced confidence
    Composite,
}

impl PatternKind {
    pub const VALIDATED: [PatternKind; 7] = [
        PatternKind::Impulse,
        PatternKind::TerminalImpulse,
        PatternKind::Zigzag,
        PatternKind::Flat,
        PatternKind::Triangle,
        PatternKind::DoubleThree,
        PatternKind::TripleThree,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::Monowave => "Monowave",
            PatternKind::Impulse => "Impulse",
            PatternKind::TerminalImpulse => "TerminalImpulse",
            PatternKind::Zigzag => "Zigzag",
            PatternKind::Flat => "Flat",
            PatternKind::Triangle => "Triangle",
            PatternKind::DoubleThree => "DoubleThree",
            PatternKind::TripleThree => "TripleThree",
            PatternKind::Composite => "Composite",
        }
    }

    /// Exact leg count of the pattern; 0 for variable-size composites
    pub fn window_len(self) -> usize {
        match self {
            PatternKind::Monowave => 1,
            PatternKind::Zigzag | PatternKind::Flat => 3,
            PatternKind::Impulse | PatternKind::TerminalImpulse | PatternKind::Triangle => 5,
            PatternKind::DoubleThree => 7,
            PatternKind::TripleThree => 11,
            PatternKind::Composite => 0,
        }
    }

    /// Minimum score for `is_valid`
    pub fn validity_threshold(self) -> f64 {
        match self {
            PatternKind::Impulse => 0.55,
            PatternKind::TerminalImpulse | PatternKind::Zigzag | PatternKind::Flat => 0.5,
            PatternKind::Triangle => 0.45,
            PatternKind::DoubleThree | PatternKind::TripleThree | PatternKind::Composite => 0.4,
            PatternKind::Monowave => 0.0,
        }
    }

    #[inline]
    pub fn is_motive(self) -> bool {
        matches!(self, PatternKind::Impulse | PatternKind::TerminalImpulse)
    }

    #[inline]
    pub fn is_corrective(self) -> bool {
        matches!(
            self,
            PatternKind::Zigzag
                | PatternKind::Flat
                | PatternKind::Triangle
                | PatternKind::DoubleThree
                | PatternKind::TripleThree
        )
    }

    #[inline]
    pub fn is_combination(self) -> bool {
        matches!(self, PatternKind::DoubleThree | PatternKind::TripleThree)
    }

    /// Role labels for `n` children
    pub fn role_labels(self, n: usize) -> Vec<String> {
        let table: &[&str] = match self {
            PatternKind::Impulse | PatternKind::TerminalImpulse => &["1", "2", "3", "4", "5"],
            PatternKind::Zigzag | PatternKind::Flat => &["A", "B", "C"],
            PatternKind::Triangle => &["a", "b", "c", "d", "e"],
            PatternKind::DoubleThree => &["W", "X", "Y"],
            PatternKind::TripleThree => &["W", "X", "Y", "X2", "Z"],
            PatternKind::Composite | PatternKind::Monowave => &[],
        };
        if n == table.len() {
            table.iter().map(|s| s.to_string()).collect()
        } else {
            (1..=n).map(|i| format!("S{i}")).collect()
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pattern subtype, chosen as a side effect of scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subtype {
    Trending,
    Terminal,
    Normal,
    Truncated,
    Elongated,
    WeakB,
    Expanded,
    RunningFlat,
    Contracting,
    Expanding,
    Neutral,
    Projected,
}

impl Subtype {
    pub fn as_str(self) -> &'static str {
        match self {
            Subtype::Trending => "trending",
            Subtype::Terminal => "terminal",
            Subtype::Normal => "normal",
            Subtype::Truncated => "truncated",
            Subtype::Elongated => "elongated",
            Subtype::WeakB => "weak_b",
            Subtype::Expanded => "expanded",
            Subtype::RunningFlat => "running_flat",
            Subtype::Contracting => "contracting",
            Subtype::Expanding => "expanding",
            Subtype::Neutral => "neutral",
            Subtype::Projected => "projected",
        }
    }
}

impl std::fmt::Display for Subtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================
// EVIDENCE
// ============================================================

/// Outcome of one rule on one window. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleCheck {
    pub key: &'static str,
    pub description: &'static str,
    pub value: f64,
    pub expected: String,
    pub passed: bool,
    /// Score deduction applied when the rule failed
    pub penalty: f64,
    pub critical: bool,
}

/// Best simple correction found for one segment of a combination
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentFit {
    pub role: &'static str,
    pub kind: PatternKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<Subtype>,
    pub score: f64,
    pub valid: bool,
    pub legs: usize,
}

/// Result of a single validator call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternCheck {
    pub kind: PatternKind,
    /// No critical rule failed
    pub hard_valid: bool,
    /// `hard_valid && score >= kind.validity_threshold()`
    pub is_valid: bool,
    /// 0.0..=1.0, higher is better
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<Subtype>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    pub checks: Vec<RuleCheck>,
    pub violations: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<SegmentFit>,
}

impl PatternCheck {
    /// Immediate zero-score failure
    pub fn rejected(kind: PatternKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            hard_valid: false,
            is_valid: false,
            score: 0.0,
            subtype: None,
            direction: None,
            checks: Vec::new(),
            violations: vec![reason.into()],
            segments: Vec::new(),
        }
    }

    pub fn satisfied(&self) -> impl Iterator<Item = &RuleCheck> {
        self.checks.iter().filter(|c| c.passed)
    }

    pub fn violated(&self) -> impl Iterator<Item = &RuleCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }

    pub fn soft_violation_count(&self) -> usize {
        self.violated().filter(|c| !c.critical).count()
    }
}

/// Accumulates rule outcomes for one window.
#[derive(Debug)]
pub(crate) struct Scorecard {
    kind: PatternKind,
    checks: Vec<RuleCheck>,
}

impl Scorecard {
    pub(crate) fn new(kind: PatternKind) -> Self {
        Self {
            kind,
            checks: Vec::new(),
        }
    }

    /// Rule that deducts `weight` when it fails
    pub(crate) fn soft(
        &mut self,
        key: &'static str,
        description: &'static str,
        value: f64,
        expected: String,
        passed: bool,
        weight: f64,
    ) {
        self.checks.push(RuleCheck {
            key,
            description,
            value,
            expected,
            passed,
            penalty: if passed { 0.0 } else { weight },
            critical: false,
        });
    }

    /// Rule whose failure zeroes the score
    pub(crate) fn critical(
        &mut self,
        key: &'static str,
        description: &'static str,
        value: f64,
        expected: String,
        passed: bool,
    ) {
        self.checks.push(RuleCheck {
            key,
            description,
            value,
            expected,
            passed,
            penalty: if passed { 0.0 } else { 1.0 },
            critical: true,
        });
    }

    pub(crate) fn penalty(&self) -> f64 {
        self.checks
            .iter()
            .filter(|c| !c.passed && !c.critical)
            .map(|c| c.penalty)
            .sum()
    }

    fn critical_failed(&self) -> bool {
        self.checks.iter().any(|c| c.critical && !c.passed)
    }

    pub(crate) fn finish(
        self,
        base: f64,
        subtype: Option<Subtype>,
        direction: Option<Direction>,
        segments: Vec<SegmentFit>,
    ) -> PatternCheck {
        let hard_valid = !self.critical_failed();
        let raw = if hard_valid {
            (base - self.penalty()).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let score = if raw.is_finite() { raw } else { 0.0 };
        let violations = self
            .checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| format!("{} ({:.3}, expected {})", c.description, c.value, c.expected))
            .collect();
        PatternCheck {
            kind: self.kind,
            hard_valid,
            is_valid: hard_valid && score >= self.kind.validity_threshold(),
            score,
            subtype,
            direction,
            checks: self.checks,
            violations,
            segments,
        }
    }
}

// ============================================================
// VALIDATOR TRAIT
// ============================================================

/// Scores a fixed-size window of legs against one pattern class.
pub trait WaveValidator: Send + Sync {
    fn kind(&self) -> PatternKind;

    fn window_len(&self) -> usize {
        self.kind().window_len()
    }

    fn check<L: Leg>(&self, legs: &[L]) -> PatternCheck;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// BUILTIN VALIDATORS
// ============================================================

macro_rules! define_builtin_validators {
    (
        $(
            $variant:ident($validator:ty)
        ),* $(,)?
    ) => {
        /// All builtin validators - fast path via enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinValidator {
            $($variant($validator)),*
        }

        impl BuiltinValidator {
            #[inline]
            pub fn check<L: Leg>(&self, legs: &[L]) -> PatternCheck {
                match self {
                    $(Self::$variant(v) => WaveValidator::check(v, legs)),*
                }
            }

            #[inline]
            pub fn kind(&self) -> PatternKind {
                match self {
                    $(Self::$variant(v) => WaveValidator::kind(v)),*
                }
            }

            #[inline]
            pub fn window_len(&self) -> usize {
                match self {
                    $(Self::$variant(v) => WaveValidator::window_len(v)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(v) => WaveValidator::validate_config(v)),*
                }
            }
        }

        $(
            impl From<$validator> for BuiltinValidator {
                fn from(v: $validator) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

define_builtin_validators! {
    Impulse(ImpulseValidator),
    TerminalImpulse(TerminalImpulseValidator),
    Zigzag(ZigzagValidator),
    Flat(FlatValidator),
    Triangle(TriangleValidator),
    DoubleThree(DoubleThreeValidator),
    TripleThree(TripleThreeValidator),
}

/// One validator per validated pattern kind
#[derive(Debug, Clone)]
pub struct ValidatorSet {
    validators: Vec<BuiltinValidator>,
}

impl Default for ValidatorSet {
    fn default() -> Self {
        Self {
            validators: vec![
                ImpulseValidator::default().into(),
                TerminalImpulseValidator::default().into(),
                ZigzagValidator::default().into(),
                FlatValidator::default().into(),
                TriangleValidator::default().into(),
                DoubleThreeValidator::default().into(),
                TripleThreeValidator::default().into(),
            ],
        }
    }
}

impl ValidatorSet {
    pub fn get(&self, kind: PatternKind) -> Option<&BuiltinValidator> {
        self.validators.iter().find(|v| v.kind() == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuiltinValidator> {
        self.validators.iter()
    }

    /// Validators whose window is exactly `len` legs
    pub fn for_window(&self, len: usize) -> impl Iterator<Item = &BuiltinValidator> {
        self.validators.iter().filter(move |v| v.window_len() == len)
    }

    /// Run the validator for `kind`; `None` when the set has none
    pub fn check<L: Leg>(&self, kind: PatternKind, legs: &[L]) -> Option<PatternCheck> {
        self.get(kind).map(|v| v.check(legs))
    }

    /// Replace the validator of the same kind. Simple corrections are also
    /// propagated into the combination validators that reuse them.
    pub fn with(mut self, validator: impl Into<BuiltinValidator>) -> Self {
        let validator = validator.into();
        let kind = validator.kind();
        match self.validators.iter_mut().find(|v| v.kind() == kind) {
            Some(slot) => *slot = validator.clone(),
            None => self.validators.push(validator.clone()),
        }
        for slot in &mut self.validators {
            match slot {
                BuiltinValidator::DoubleThree(v) => v.corrections.update(&validator),
                BuiltinValidator::TripleThree(v) => v.corrections.update(&validator),
                _ => {}
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        for validator in &self.validators {
            validator.validate_config()?;
        }
        Ok(())
    }
}

// ============================================================
// TESTS
// ============================================================
