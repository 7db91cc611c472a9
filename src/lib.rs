//! # YAWC - Yet Another Wave Counter
//!
//! Rule-driven Elliott/NEoWave wave counting: bars are segmented into
//! alternating monowaves, reduced bottom-up into pattern trees, and searched
//! for competing non-overlapping interpretations that are ranked, invalidated
//! and projected forward.
//!
//! ## Quick Start
//!
//! ```rust
//! use yawc::prelude::*;
//!
//! struct Candle { t: i64, c: f64 }
//!
//! impl OHLCV for Candle {
//!     fn open(&self) -> f64 { self.c }
//!     fn high(&self) -> f64 { self.c }
//!     fn low(&self) -> f64 { self.c }
//!     fn close(&self) -> f64 { self.c }
//!     fn volume(&self) -> f64 { 0.0 }
//!     fn timestamp(&self) -> Option<i64> { Some(self.t) }
//! }
//!
//! let engine = EngineBuilder::new().build().unwrap();
//!
//! let bars: Vec<Candle> = [100.0, 110.0, 104.0, 128.0, 120.0, 133.0]
//!     .iter()
//!     .enumerate()
//!     .map(|(i, &c)| Candle { t: i as i64 * 3600, c })
//!     .collect();
//! let analysis = engine.analyze(&bars).unwrap();
//! for scenario in &analysis.scenarios {
//!     println!("{:.2} {}", scenario.score, scenario.summary);
//! }
//! ```
//!
//! ## Scores
//!
//! Every score in the crate is higher-is-better and lies in `0.0..=1.0`.
//! The scenario search maximizes the coverage-weighted value of the
//! matches it selects (weight times swings covered); per-pattern biases and
//! complexity costs are subtracted from a match's validator score before it
//! enters the search.

use serde::{Deserialize, Serialize};

pub mod merge;
pub mod params;
pub mod parser;
pub mod patterns;
pub mod projection;
pub mod rules;
pub mod scenario;
pub mod segmenter;
pub mod wave;

pub mod prelude {
    pub use crate::{
        // Segmentation
        merge::merge_by_similarity,
        // Parameters
        params::{get_factor, get_ratio, ParamMeta, ParamType, ParameterizedValidator},
        // Parser
        parser::{parse_wave_tree, ParseSettings},
        // Validators
        patterns::{
            BuiltinValidator, DoubleThreeValidator, FlatValidator, ImpulseValidator, Leg,
            PatternCheck, PatternKind, RuleCheck, Subtype, TerminalImpulseValidator,
            TriangleValidator, TripleThreeValidator, ValidatorSet, WaveValidator,
            ZigzagValidator,
        },
        projection::{project_impulse, Projection},
        // Rules
        rules::{RuleBook, RuleEvaluator, Validation},
        // Search
        scenario::SearchSettings,
        segmenter::{
            detect_multi_scale, detect_swings, detect_swings_adaptive, macro_swings_adaptive,
            percentage_zigzag, AdaptiveTuning, MultiScaleSwings, ScaleParams, SegmenterParams,
        },
        // Parallel
        analyze_parallel,
        validate_bars,
        // Engine
        Analysis,
        AnalysisError,
        AnalysisResult,
        Bar,
        Count,
        Direction,
        EngineBuilder,
        EngineConfig,
        OHLCVExt,
        Ratio,
        Result,
        WaveEngine,
        // Errors
        WaveError,
        OHLCV,
        // Data model
        wave::{
            IdGen, InvalidationLevel, MicroCheck, Scenario, ScenarioStatus, Side, Swing,
            WaveNode, WaveTree,
        },
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, WaveError>;

/// Errors surfaced by the wave engine.
///
/// Only the data errors (`EmptyData`, `NonMonotonicTimestamp`, `InvalidBar`)
/// can come out of [`WaveEngine::analyze`]; the rest are raised while
/// building or configuring an engine.
#[derive(Debug, thiserror::Error)]
pub enum WaveError {
    #[error("No bars to analyze")]
    EmptyData,

    #[error("Timestamp at index {index} ({current}) does not follow {previous}")]
    NonMonotonicTimestamp {
        index: usize,
        previous: i64,
        current: i64,
    },

    #[error("Invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: &'static str },

    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WaveError {
    /// True for problems with the input bar sequence itself.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            WaveError::EmptyData
                | WaveError::NonMonotonicTimestamp { .. }
                | WaveError::InvalidBar { .. }
        )
    }
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(WaveError::InvalidValue("Ratio cannot be NaN or infinite"));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(WaveError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Positive count (must be > 0): beam widths, scenario limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Count(usize);

impl Count {
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(WaveError::InvalidValue("Count must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Serialize for Count {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Count {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Count::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    /// Bar time. When absent the bar index stands in for time.
    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    /// High that never sits below the close (bars fed with close-only data)
    #[inline]
    fn upper(&self) -> f64 {
        let high = self.high();
        if high.is_finite() {
            high.max(self.close())
        } else {
            self.close()
        }
    }

    #[inline]
    fn lower(&self) -> f64 {
        let low = self.low();
        if low.is_finite() {
            low.min(self.close())
        } else {
            self.close()
        }
    }

    /// Validate a single bar. Only the close is mandatory.
    fn validate(&self) -> Result<()> {
        if !self.close().is_finite() {
            return Err(WaveError::InvalidBar {
                index: 0,
                reason: "close must be finite",
            });
        }
        if self.high().is_finite() && self.low().is_finite() && self.high() < self.low() {
            return Err(WaveError::InvalidBar {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// Time of bar `index`, falling back to the index itself.
#[inline]
pub(crate) fn bar_time<T: OHLCV>(bars: &[T], index: usize) -> i64 {
    bars[index].timestamp().unwrap_or(index as i64)
}

/// Validate a whole bar sequence: non-empty, finite closes, strictly
/// ascending timestamps where present.
pub fn validate_bars<T: OHLCV>(bars: &[T]) -> Result<()> {
    if bars.is_empty() {
        return Err(WaveError::EmptyData);
    }
    let mut previous: Option<i64> = None;
    for (index, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            WaveError::InvalidBar { reason, .. } => WaveError::InvalidBar { index, reason },
            other => other,
        })?;
        if let Some(current) = bar.timestamp() {
            if let Some(previous) = previous {
                if current <= previous {
                    return Err(WaveError::NonMonotonicTimestamp {
                        index,
                        previous,
                        current,
                    });
                }
            }
            previous = Some(current);
        }
    }
    Ok(())
}

// ============================================================
// BAR
// ============================================================

/// Concrete bar record as supplied by a market-data collaborator.
///
/// Deserializes with `volume` defaulting to 0 and missing open/high/low
/// falling back to the close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawBar")]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Close-only bar
    pub fn from_close(timestamp: i64, close: f64) -> Self {
        Self::new(timestamp, close, close, close, close, 0.0)
    }
}

#[derive(Deserialize)]
struct RawBar {
    timestamp: i64,
    #[serde(default)]
    open: Option<f64>,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    low: Option<f64>,
    close: f64,
    #[serde(default)]
    volume: f64,
}

impl From<RawBar> for Bar {
    fn from(raw: RawBar) -> Self {
        Self {
            timestamp: raw.timestamp,
            open: raw.open.unwrap_or(raw.close),
            high: raw.high.unwrap_or(raw.close),
            low: raw.low.unwrap_or(raw.close),
            close: raw.close,
            volume: raw.volume,
        }
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

// ============================================================
// DIRECTION
// ============================================================

/// Direction of a swing or pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// `Up` iff `end >= start`
    #[inline]
    pub fn from_prices(start: f64, end: f64) -> Self {
        if end >= start {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    /// +1.0 for up, -1.0 for down
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
        }
    }

    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, Direction::Up)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Direction::Up => "up",
            Direction::Down => "down",
        })
    }
}

// ============================================================
// WAVE ENGINE
// ============================================================

use parser::ParseSettings;
use patterns::{BuiltinValidator, ValidatorSet};
use rules::{RuleBook, RuleEvaluator, Validation};
use scenario::SearchSettings;
use segmenter::{AdaptiveTuning, MultiScaleSwings, ScaleParams, SegmenterParams};
use wave::{IdGen, Scenario, Swing, WaveNode, WaveTree};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base-scale segmenter thresholds (starting point for adaptive tuning)
    pub segmenter: SegmenterParams,
    pub tuning: AdaptiveTuning,
    /// Macro/micro presets for the multi-scale partitions
    pub scales: ScaleParams,
    /// Rule of Similarity threshold used by the merger
    pub similarity_threshold: Ratio,
    pub parse: ParseSettings,
    pub search: SearchSettings,
    pub max_scenarios: Count,
    /// Major pivots re-analyzed as alternate origins (0 disables)
    pub max_anchors: usize,
    /// Fold micro-scale consistency into scenario scores
    pub cross_scale: bool,
    /// Emit a projected-impulse scenario when the tail allows it
    pub projection: bool,
    /// Check bars before analysis
    pub validate_data: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            segmenter: SegmenterParams::default(),
            tuning: AdaptiveTuning::default(),
            scales: ScaleParams::default(),
            similarity_threshold: Ratio::new_const(0.33),
            parse: ParseSettings::default(),
            search: SearchSettings::default(),
            max_scenarios: Count::new_const(5),
            max_anchors: 3,
            cross_scale: true,
            projection: true,
            validate_data: true,
        }
    }
}

/// Result of a full analysis request
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    /// Macro/base/micro partitions; the base partition drives the search
    pub swings: MultiScaleSwings,
    /// Greedy bottom-up reduction of the base partition
    pub tree: WaveTree,
    /// Ranked scenarios, best first
    pub scenarios: Vec<Scenario>,
}

impl Analysis {
    /// Highest-ranked scenario, if any
    pub fn best(&self) -> Option<&Scenario> {
        self.scenarios.first()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Main wave analysis engine
#[derive(Debug, Clone)]
pub struct WaveEngine {
    validators: ValidatorSet,
    evaluator: RuleEvaluator,
    config: EngineConfig,
}

impl WaveEngine {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn evaluator(&self) -> &RuleEvaluator {
        &self.evaluator
    }

    // ===========================================
    // LOW-LEVEL: Segmentation
    // ===========================================

    /// Adaptive base partition followed by the similarity merge.
    pub fn segment<T: OHLCV>(&self, bars: &[T]) -> Vec<Swing> {
        let (swings, used) =
            segmenter::detect_swings_adaptive(bars, &self.config.segmenter, &self.config.tuning);
        tracing::debug!(
            "base partition: {} swings (reversal {:.4}, retrace {:.3}, time {:.3})",
            swings.len(),
            used.reversal_pct,
            used.retrace_ratio,
            used.time_ratio
        );
        merge::merge_by_similarity(&swings, self.config.similarity_threshold.get())
    }

    /// All three partitions; the base one is adaptive.
    pub fn segment_multi_scale<T: OHLCV>(&self, bars: &[T]) -> MultiScaleSwings {
        let mut scales = segmenter::detect_multi_scale(bars, &self.config.scales);
        scales.base_swings = self.segment(bars);
        scales
    }

    // ===========================================
    // MID-LEVEL: Parsing
    // ===========================================

    /// Greedy hierarchical reduction of a swing sequence.
    pub fn parse(&self, swings: &[Swing]) -> WaveTree {
        let mut ids = IdGen::new();
        parser::parse_wave_tree(swings, &self.validators, &self.config.parse, &mut ids)
    }

    // ===========================================
    // HIGH-LEVEL: Full analysis
    // ===========================================

    /// Segment, parse and search `bars`, returning ranked scenarios.
    pub fn analyze<T: OHLCV>(&self, bars: &[T]) -> Result<Analysis> {
        if self.config.validate_data {
            validate_bars(bars)?;
        } else if bars.is_empty() {
            return Err(WaveError::EmptyData);
        }

        let swings = self.segment_multi_scale(bars);
        let tree = self.parse(&swings.base_swings);
        let micro = self
            .config
            .cross_scale
            .then_some(swings.micro_swings.as_slice());

        let ctx = scenario::SearchContext {
            validators: &self.validators,
            evaluator: &self.evaluator,
            settings: &self.config.search,
            micro,
        };
        let mut candidates = scenario::explore_anchors(
            &swings.base_swings,
            &tree.anchor,
            self.config.max_anchors,
            &ctx,
        );
        tracing::debug!("{} scenarios before filtering", candidates.len());

        let last_price = bars[bars.len() - 1].close();
        candidates = scenario::rank::filter_invalidated(candidates, last_price);
        let mut scenarios = scenario::rank::rank(
            candidates,
            self.config.max_scenarios.get(),
            self.config.search.duplicate_overlap,
        );

        if self.config.projection {
            let mut ids = IdGen::with_offset(u32::MAX / 2);
            if let Some(projected) =
                projection::projected_scenario(&scenarios, &swings.base_swings, &mut ids)
            {
                scenarios.push(projected);
            }
        }
        for (i, scenario) in scenarios.iter_mut().enumerate() {
            scenario.id = i as u32 + 1;
        }

        tracing::info!(
            "analyzed {} bars: {} swings, {} scenarios",
            bars.len(),
            swings.base_swings.len(),
            scenarios.len()
        );
        Ok(Analysis {
            swings,
            tree,
            scenarios,
        })
    }

    /// Percentage-ZigZag scan: every locally valid pattern becomes its own
    /// scenario, plus a projection of the tail when possible.
    pub fn macro_scan<T: OHLCV>(&self, bars: &[T], target_count: usize) -> Result<Vec<Scenario>> {
        if self.config.validate_data {
            validate_bars(bars)?;
        } else if bars.is_empty() {
            return Err(WaveError::EmptyData);
        }
        Ok(scenario::macro_scan::macro_scan(
            bars,
            target_count,
            &self.validators,
        ))
    }

    /// Re-run the scenario search on the micro swings inside `node` and
    /// report whether they reduce to a single pattern of the same kind.
    pub fn verify_pattern(&self, node: &WaveNode, micro: &[Swing]) -> Validation {
        let ctx = scenario::SearchContext {
            validators: &self.validators,
            evaluator: &self.evaluator,
            settings: &self.config.search,
            micro: None,
        };
        scenario::verify_pattern(node, micro, &ctx)
    }

    fn validate(&self) -> Result<()> {
        self.validators.validate()?;
        let threshold = self.config.similarity_threshold.get();
        if threshold <= 0.0 {
            return Err(WaveError::InvalidConfig(
                "similarity threshold must be > 0".to_string(),
            ));
        }
        let tuning = &self.config.tuning;
        if tuning.min_swings > tuning.max_swings {
            return Err(WaveError::InvalidConfig(format!(
                "tuning window [{}, {}] is empty",
                tuning.min_swings, tuning.max_swings
            )));
        }
        let (lo, hi) = self.config.search.energy_band;
        if !(lo > 0.0 && lo < hi) {
            return Err(WaveError::InvalidConfig(format!(
                "energy band [{lo}, {hi}] is invalid"
            )));
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating WaveEngine instances
pub struct EngineBuilder {
    rules: RuleBook,
    overrides: Vec<BuiltinValidator>,
    config: EngineConfig,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            rules: RuleBook::default(),
            overrides: Vec::new(),
            config: EngineConfig::default(),
        }
    }

    /// Rule knowledge base used to parameterize validators
    pub fn rules(mut self, rules: RuleBook) -> Self {
        self.rules = rules;
        self
    }

    /// Replace the validator of the same pattern kind
    pub fn validator(mut self, validator: BuiltinValidator) -> Self {
        self.overrides.push(validator);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn beam_width(mut self, width: usize) -> Result<Self> {
        self.config.search.beam_width = Count::new(width)?;
        Ok(self)
    }

    pub fn max_scenarios(mut self, max: usize) -> Result<Self> {
        self.config.max_scenarios = Count::new(max)?;
        Ok(self)
    }

    /// Rule of Similarity threshold for merger, parser and search
    pub fn similarity_threshold(mut self, threshold: f64) -> Result<Self> {
        let ratio = Ratio::new(threshold)?;
        self.config.similarity_threshold = ratio;
        self.config.parse.similarity_threshold = ratio;
        self.config.search.similarity_threshold = ratio;
        Ok(self)
    }

    /// 1 = simple patterns only, 2 adds double threes, 3 adds triple threes
    pub fn complexity_cap(mut self, cap: u8) -> Self {
        self.config.parse.complexity_cap = cap;
        self.config.search.complexity_cap = cap;
        self
    }

    pub fn max_anchors(mut self, anchors: usize) -> Self {
        self.config.max_anchors = anchors;
        self
    }

    pub fn cross_scale(mut self, enable: bool) -> Self {
        self.config.cross_scale = enable;
        self
    }

    pub fn projection(mut self, enable: bool) -> Self {
        self.config.projection = enable;
        self
    }

    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    pub fn segmenter(mut self, params: SegmenterParams) -> Self {
        self.config.segmenter = params;
        self
    }

    pub fn tuning(mut self, tuning: AdaptiveTuning) -> Self {
        self.config.tuning = tuning;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<WaveEngine> {
        let mut validators = ValidatorSet::from_rule_book(&self.rules);
        for validator in self.overrides {
            validators = validators.with(validator);
        }
        let engine = WaveEngine {
            evaluator: RuleEvaluator::new(&self.rules),
            validators,
            config: self.config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL ANALYSIS
// ============================================================

use rayon::prelude::*;

/// Result of analyzing a single instrument
#[derive(Debug)]
pub struct AnalysisResult {
    pub symbol: String,
    pub analysis: Analysis,
}

/// Error from analyzing a single instrument
#[derive(Debug)]
pub struct AnalysisError {
    pub symbol: String,
    pub error: WaveError,
}

/// Parallel analysis of multiple instruments
pub fn analyze_parallel<'a, T, I>(
    engine: &WaveEngine,
    instruments: I,
) -> (Vec<AnalysisResult>, Vec<AnalysisError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            engine
                .analyze(bars)
                .map(|analysis| AnalysisResult {
                    symbol: symbol.to_string(),
                    analysis,
                })
                .map_err(|error| AnalysisError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn hourly(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::from_close(i as i64 * 3600, c))
            .collect()
    }

    /// Linear legs between turning points, `steps` bars per leg
    fn path(points: &[f64], steps: usize) -> Vec<Bar> {
        let mut closes = vec![points[0]];
        for pair in points.windows(2) {
            for k in 1..=steps {
                closes.push(pair[0] + (pair[1] - pair[0]) * k as f64 / steps as f64);
            }
        }
        hourly(&closes)
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.5).is_ok());
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
    }

    #[test]
    fn test_count_validation() {
        assert!(Count::new(1).is_ok());
        assert!(Count::new(0).is_err());
        assert_eq!(Count::new(6).unwrap().get(), 6);
    }

    #[test]
    fn test_count_serde_rejects_zero() {
        assert!(serde_json::from_str::<Count>("0").is_err());
        assert_eq!(serde_json::from_str::<Count>("4").unwrap().get(), 4);
    }

    #[test]
    fn test_direction_from_prices() {
        assert_eq!(Direction::from_prices(100.0, 110.0), Direction::Up);
        assert_eq!(Direction::from_prices(100.0, 100.0), Direction::Up);
        assert_eq!(Direction::from_prices(100.0, 90.0), Direction::Down);
        assert_eq!(Direction::Up.opposite(), Direction::Down);
    }

    #[test]
    fn test_validate_bars_empty() {
        let bars: Vec<Bar> = Vec::new();
        assert!(matches!(validate_bars(&bars), Err(WaveError::EmptyData)));
    }

    #[test]
    fn test_validate_bars_non_monotonic() {
        let bars = vec![
            Bar::from_close(10, 1.0),
            Bar::from_close(20, 2.0),
            Bar::from_close(20, 3.0),
        ];
        match validate_bars(&bars) {
            Err(WaveError::NonMonotonicTimestamp { index, .. }) => assert_eq!(index, 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_validate_bars_nan_close() {
        let bars = vec![Bar::from_close(1, 1.0), Bar::from_close(2, f64::NAN)];
        match validate_bars(&bars) {
            Err(WaveError::InvalidBar { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_bar_deserialize_defaults() {
        let bar: Bar = serde_json::from_str(r#"{"timestamp": 5, "close": 12.5}"#).unwrap();
        assert_eq!(bar.volume, 0.0);
        assert_eq!(bar.open, 12.5);
        assert_eq!(bar.high, 12.5);
        assert_eq!(bar.low, 12.5);
    }

    #[test]
    fn test_builder_rejects_bad_config() {
        assert!(EngineBuilder::new().beam_width(0).is_err());
        assert!(EngineBuilder::new().max_scenarios(0).is_err());
        assert!(EngineBuilder::new().similarity_threshold(1.5).is_err());

        let mut config = EngineConfig::default();
        config.search.energy_band = (2.0, 1.0);
        assert!(EngineBuilder::new().config(config).build().is_err());
    }

    #[test]
    fn test_analyze_empty_is_data_error() {
        let engine = EngineBuilder::new().build().unwrap();
        let bars: Vec<Bar> = Vec::new();
        let err = engine.analyze(&bars).unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn test_analyze_single_bar() {
        let engine = EngineBuilder::new().build().unwrap();
        let analysis = engine.analyze(&hourly(&[100.0])).unwrap();
        assert_eq!(analysis.swings.base_swings.len(), 1);
        assert!(analysis.scenarios.iter().all(|s| s.score >= 0.0 && s.score <= 1.0));
    }

    #[test]
    fn test_analyze_impulse_path() {
        let engine = EngineBuilder::new().build().unwrap();
        let bars = path(&[100.0, 110.0, 104.0, 128.0, 120.0, 133.0], 4);
        let analysis = engine.analyze(&bars).unwrap();

        assert_eq!(analysis.swings.base_swings.len(), 5);
        let best = analysis.best().unwrap();
        let dominant = best.dominant().unwrap();
        assert_eq!(dominant.kind, patterns::PatternKind::Impulse);
        assert!(!dominant.complete);
    }

    #[test]
    fn test_analyze_ids_are_sequential() {
        let engine = EngineBuilder::new().build().unwrap();
        let bars = path(&[100.0, 110.0, 104.0, 128.0, 120.0, 133.0], 4);
        let analysis = engine.analyze(&bars).unwrap();
        for (i, s) in analysis.scenarios.iter().enumerate() {
            assert_eq!(s.id, i as u32 + 1);
        }
    }

    #[test]
    fn test_verify_pattern_without_micro_swings() {
        let engine = EngineBuilder::new().build().unwrap();
        let bars = path(&[100.0, 110.0, 104.0, 128.0, 120.0, 133.0], 4);
        let analysis = engine.analyze(&bars).unwrap();
        let node = analysis.best().unwrap().dominant().unwrap();
        let validation = engine.verify_pattern(node, &[]);
        assert!(!validation.hard_valid);
        assert_eq!(validation.violated_hard.len(), 1);
    }

    #[test]
    fn test_macro_scan_rejects_empty() {
        let engine = EngineBuilder::new().build().unwrap();
        let bars: Vec<Bar> = Vec::new();
        assert!(engine.macro_scan(&bars, 5).unwrap_err().is_data_error());
        let bars = path(&[100.0, 110.0, 104.0, 128.0, 120.0, 133.0], 4);
        assert!(!engine.macro_scan(&bars, 5).unwrap().is_empty());
    }

    #[test]
    fn test_analysis_to_json() {
        let engine = EngineBuilder::new().build().unwrap();
        let bars = path(&[100.0, 90.0, 95.0, 82.0], 3);
        let json = engine.analyze(&bars).unwrap().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["scenarios"].is_array());
        assert!(value["tree"]["roots"].is_array());
    }

    #[test]
    fn test_analyze_parallel_splits_errors() {
        let engine = EngineBuilder::new().build().unwrap();
        let good = path(&[100.0, 110.0, 104.0, 128.0], 3);
        let empty: Vec<Bar> = Vec::new();
        let instruments = vec![("GOOD", good.as_slice()), ("EMPTY", empty.as_slice())];
        let (ok, err) = analyze_parallel(&engine, instruments);
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].symbol, "GOOD");
        assert_eq!(err.len(), 1);
        assert_eq!(err[0].symbol, "EMPTY");
    }
}
