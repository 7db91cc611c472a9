//! Validator thresholds derived from a rule book.
//!
//! Structured entries are read through the literal bounds of their
//! predicates; text entries through numeric extraction on the clause that
//! names the quantity. Anything missing, malformed or out of range keeps the
//! validator default.

use std::collections::HashMap;

use super::{
    metrics::Metric,
    predicate::Predicate,
    text::{clause_with, first_number, first_range},
    RuleBook, RuleEntry,
};
use crate::{
    params::ParameterizedValidator,
    patterns::{
        FlatValidator, ImpulseValidator, TerminalImpulseValidator, TriangleValidator,
        ValidatorSet, WaveValidator, ZigzagValidator,
    },
};

#[derive(Clone, Copy)]
enum Bound {
    Lower,
    Upper,
}

/// Where one parameter is read from
struct Source<'a> {
    param: &'static str,
    /// Metric bounded by structured predicates; `None` reads text only
    metric: Option<Metric>,
    bound: Bound,
    /// Clause keys for text entries
    keys: &'a [&'a str],
    /// Text reading: first number, or low/high end of the first range
    text: TextRead,
}

#[derive(Clone, Copy)]
enum TextRead {
    Number,
    RangeLow,
    RangeHigh,
}

impl Source<'_> {
    fn read(&self, entry: &RuleEntry) -> Option<f64> {
        match entry {
            RuleEntry::Structured(set) => {
                let metric = self.metric?;
                set.iter()
                    .filter_map(|rule| Predicate::parse(&rule.expr).ok())
                    .flat_map(|p| p.literal_bounds(metric))
                    .find(|(op, _)| match self.bound {
                        Bound::Lower => op.is_lower_bound(),
                        Bound::Upper => op.is_upper_bound(),
                    })
                    .map(|(_, value)| value)
            }
            RuleEntry::Text(text) => {
                let clause = clause_with(text, self.keys)?;
                match self.text {
                    TextRead::Number => first_number(clause),
                    TextRead::RangeLow => first_range(clause).map(|(lo, _)| lo),
                    TextRead::RangeHigh => first_range(clause).map(|(_, hi)| hi),
                }
            }
        }
    }
}

const fn source<'a>(
    param: &'static str,
    metric: Option<Metric>,
    bound: Bound,
    keys: &'a [&'a str],
    text: TextRead,
) -> Source<'a> {
    Source {
        param,
        metric,
        bound,
        keys,
        text,
    }
}

/// Read `sources` from `book[pattern][subtype]` and build `V`.
fn derive<V>(book: &RuleBook, pattern: &str, subtype: &str, sources: &[Source<'_>]) -> V
where
    V: ParameterizedValidator + WaveValidator + Default,
{
    let Some(entry) = book.get(pattern, subtype) else {
        tracing::debug!("{pattern}/{subtype} not in rule book; {} keeps defaults", V::pattern_id_str());
        return V::default();
    };

    let mut params: HashMap<&str, f64> = HashMap::new();
    for src in sources {
        let Some(value) = src.read(entry) else {
            continue;
        };
        let meta = V::param_meta().iter().find(|m| m.name == src.param);
        match meta.map(|m| m.validate(value)) {
            Some(Ok(())) => {
                params.insert(src.param, value);
            }
            Some(Err(e)) => {
                tracing::warn!("{}: ignoring rule-book value: {e}", V::pattern_id_str())
            }
            None => {}
        }
    }
    if params.is_empty() {
        if matches!(entry, RuleEntry::Text(_)) {
            tracing::warn!(
                "{pattern}/{subtype}: no usable thresholds in text; {} keeps defaults",
                V::pattern_id_str()
            );
        }
        return V::default();
    }

    match V::with_params(&params).and_then(|v| v.validate_config().map(|()| v)) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("{}: {e}; using defaults", V::pattern_id_str());
            V::default()
        }
    }
}

impl ValidatorSet {
    /// Validators parameterized from `book`, falling back to defaults
    /// parameter by parameter.
    pub fn from_rule_book(book: &RuleBook) -> Self {
        use Bound::{Lower, Upper};
        use TextRead::{Number, RangeHigh, RangeLow};

        let impulse: ImpulseValidator = derive(
            book,
            "Impulse",
            "TrendingImpulse",
            &[
                source("wave2_min", Some(Metric::Wave2Ratio), Lower, &["wave2", "retrace"], RangeLow),
                source("wave2_max", Some(Metric::Wave2Ratio), Upper, &["wave2", "retrace"], RangeHigh),
                source("extension_ratio", Some(Metric::ExtensionRatio), Lower, &["extension"], Number),
                source("wave5_vs_wave4_min", Some(Metric::Wave5OverWave4), Lower, &["wave5"], Number),
            ],
        );
        let terminal: TerminalImpulseValidator = derive(
            book,
            "Impulse",
            "TerminalImpulse",
            &[source("wave2_max", Some(Metric::Wave2Ratio), Upper, &["wave2", "retrace"], RangeHigh)],
        );
        let zigzag: ZigzagValidator = derive(
            book,
            "Zigzag",
            "Standard",
            &[
                source("b_max", Some(Metric::BOverA), Upper, &["waveb"], Number),
                source("c_min", Some(Metric::COverA), Lower, &["wavec"], Number),
            ],
        );
        let flat: FlatValidator = derive(
            book,
            "Flat",
            "Normal",
            &[
                source("b_min", Some(Metric::BOverA), Lower, &["waveb"], Number),
                source("c_min", Some(Metric::COverA), Lower, &["wavec"], Number),
            ],
        );
        let triangle = triangle(book);

        ValidatorSet::default()
            .with(impulse)
            .with(terminal)
            .with(zigzag)
            .with(flat)
            .with(triangle)
    }
}

/// Triangle thresholds are spread over three subtype entries.
fn triangle(book: &RuleBook) -> TriangleValidator {
    use Bound::{Lower, Upper};
    use TextRead::{Number, RangeHigh, RangeLow};

    let contracting: TriangleValidator = derive(
        book,
        "Triangle",
        "Contracting",
        &[
            source("contracting_c_max", Some(Metric::COverA), Upper, &["wavec"], Number),
            source("contracting_e_min", Some(Metric::EOverC), Lower, &["wavee"], RangeLow),
            source("contracting_e_max", Some(Metric::EOverC), Upper, &["wavee"], RangeHigh),
        ],
    );
    let expanding: TriangleValidator = derive(
        book,
        "Triangle",
        "Expanding",
        &[
            source("expanding_c_min", Some(Metric::COverA), Lower, &["wavec"], Number),
            source("expanding_e_min", Some(Metric::EOverC), Lower, &["wavee"], Number),
        ],
    );
    let neutral: TriangleValidator = derive(
        book,
        "Triangle",
        "Neutral",
        &[source("similarity_tolerance", None, Lower, &["similar"], Number)],
    );
    let defaults = TriangleValidator::default();

    let merged = TriangleValidator {
        contracting_c_max: contracting.contracting_c_max,
        contracting_e_min: contracting.contracting_e_min,
        contracting_e_max: contracting.contracting_e_max,
        expanding_c_min: expanding.expanding_c_min,
        expanding_e_min: expanding.expanding_e_min,
        similarity_tolerance: neutral.similarity_tolerance,
        ..defaults.clone()
    };
    match merged.validate_config() {
        Ok(()) => merged,
        Err(e) => {
            tracing::warn!("TRIANGLE: {e}; using defaults");
            defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        patterns::{BuiltinValidator, PatternKind},
        rules::{RuleSet, RuleSpec},
    };

    fn impulse(set: &ValidatorSet) -> &ImpulseValidator {
        match set.get(PatternKind::Impulse) {
            Some(BuiltinValidator::Impulse(v)) => v,
            other => panic!("unexpected: {other:?}"),
        }
    }

    fn zigzag(set: &ValidatorSet) -> &ZigzagValidator {
        match set.get(PatternKind::Zigzag) {
            Some(BuiltinValidator::Zigzag(v)) => v,
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_default_book_matches_default_validators() {
        let set = ValidatorSet::from_rule_book(&RuleBook::default());
        let v = impulse(&set);
        assert_eq!(v.wave2_min.get(), 0.236);
        assert_eq!(v.wave2_max.get(), 1.0);
        assert_eq!(v.extension_ratio, 1.618);
        assert_eq!(v.wave5_vs_wave4_min, 0.382);
        assert_eq!(zigzag(&set).b_max.get(), 0.618);
        match set.get(PatternKind::Triangle) {
            Some(BuiltinValidator::Triangle(t)) => {
                assert_eq!(t.contracting_c_max, 0.9);
                assert_eq!(t.contracting_e_min, 0.382);
                assert_eq!(t.expanding_e_min, 1.0);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(set.validate().is_ok());
    }

    #[test]
    fn test_text_entry_thresholds() {
        let mut book = RuleBook::new();
        book.insert(
            "Impulse",
            "TrendingImpulse",
            "Wave 2 retraces 38.2% - 78.6% of wave 1; Extension of 2.0x [4]",
        );
        let set = ValidatorSet::from_rule_book(&book);
        let v = impulse(&set);
        assert!((v.wave2_min.get() - 0.382).abs() < 1e-12);
        assert!((v.wave2_max.get() - 0.786).abs() < 1e-12);
        assert_eq!(v.extension_ratio, 2.0);
        // not mentioned: default
        assert_eq!(v.wave5_vs_wave4_min, 0.382);
    }

    #[test]
    fn test_out_of_range_value_keeps_default() {
        let mut book = RuleBook::new();
        book.insert(
            "Zigzag",
            "Standard",
            RuleSet::price(vec![
                RuleSpec::hard("b", "B_over_A <= 0.95", 0.5, ""),
                RuleSpec::hard("c", "C_over_A >= 0.5", 0.2, ""),
            ]),
        );
        let set = ValidatorSet::from_rule_book(&book);
        let v = zigzag(&set);
        assert_eq!(v.b_max.get(), 0.618);
        assert_eq!(v.c_min, 0.5);
    }

    #[test]
    fn test_custom_zigzag_reaches_combinations() {
        let mut book = RuleBook::new();
        book.insert(
            "Zigzag",
            "Standard",
            RuleSet::price(vec![RuleSpec::hard("b", "B_over_A < 0.5", 0.5, "")]),
        );
        let set = ValidatorSet::from_rule_book(&book);
        match set.get(PatternKind::DoubleThree) {
            Some(BuiltinValidator::DoubleThree(v)) => {
                assert_eq!(v.corrections.zigzag.b_max.get(), 0.5)
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_empty_book_is_default_set() {
        let set = ValidatorSet::from_rule_book(&RuleBook::new());
        assert_eq!(impulse(&set).extension_ratio, 1.618);
        assert!(set.validate().is_ok());
    }
}
