//! Monowave segmentation
//!
//! Converts bars into an alternating, contiguous sequence of [`Swing`]s.
//! Three flavours are provided:
//! - [`detect_swings`]: reversal floor plus retrace/time confirmation
//! - [`detect_swings_adaptive`]: the same, re-tuned until the swing count
//!   lands inside a target window
//! - [`percentage_zigzag`]: plain percentage ZigZag used by the macro scan

use serde::{Deserialize, Serialize};

use crate::{merge::merge_by_similarity, patterns::helpers::ratio, wave::Swing, OHLCV};

// ============================================================
// PARAMETERS
// ============================================================

/// Thresholds of the monowave segmenter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterParams {
    /// Minimum opposing move as a fraction of the running extreme price
    pub reversal_pct: f64,
    /// Opposing retrace, relative to the current swing's move, that confirms it
    pub retrace_ratio: f64,
    /// Opposing duration, relative to the current swing's duration, that confirms it
    pub time_ratio: f64,
}

impl Default for SegmenterParams {
    fn default() -> Self {
        Self {
            reversal_pct: 0.01,
            retrace_ratio: 0.236,
            time_ratio: 0.2,
        }
    }
}

impl SegmenterParams {
    pub const fn new(reversal_pct: f64, retrace_ratio: f64, time_ratio: f64) -> Self {
        Self {
            reversal_pct,
            retrace_ratio,
            time_ratio,
        }
    }

    /// Lower every threshold by one step (more swings)
    pub fn loosen(self, tuning: &AdaptiveTuning) -> Self {
        Self {
            reversal_pct: (self.reversal_pct - tuning.reversal_step).max(MIN_REVERSAL),
            retrace_ratio: (self.retrace_ratio - tuning.ratio_step).max(MIN_RATIO),
            time_ratio: (self.time_ratio - tuning.ratio_step).max(MIN_RATIO),
        }
    }

    /// Raise every threshold by one step (fewer swings)
    pub fn tighten(self, tuning: &AdaptiveTuning) -> Self {
        Self {
            reversal_pct: (self.reversal_pct + tuning.reversal_step).min(MAX_REVERSAL),
            retrace_ratio: (self.retrace_ratio + tuning.ratio_step).min(MAX_RETRACE),
            time_ratio: self.time_ratio + tuning.ratio_step,
        }
    }
}

const MIN_REVERSAL: f64 = 0.0005;
const MAX_REVERSAL: f64 = 0.5;
const MIN_RATIO: f64 = 0.05;
const MAX_RETRACE: f64 = 0.95;

/// Adaptive refinement of [`SegmenterParams`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveTuning {
    pub min_swings: usize,
    pub max_swings: usize,
    pub max_attempts: usize,
    pub reversal_step: f64,
    pub ratio_step: f64,
}

impl Default for AdaptiveTuning {
    fn default() -> Self {
        Self {
            min_swings: 15,
            max_swings: 80,
            max_attempts: 6,
            reversal_step: 0.0025,
            ratio_step: 0.05,
        }
    }
}

impl AdaptiveTuning {
    /// Distance of `count` from the target window (0 inside it)
    fn distance(&self, count: usize) -> usize {
        if count < self.min_swings {
            self.min_swings - count
        } else {
            count.saturating_sub(self.max_swings)
        }
    }
}

/// Presets for the three parallel partitions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleParams {
    pub macro_scale: SegmenterParams,
    pub base_scale: SegmenterParams,
    pub micro_scale: SegmenterParams,
    /// Merger threshold applied after each scale
    pub similarity_threshold: f64,
}

impl Default for ScaleParams {
    fn default() -> Self {
        Self {
            macro_scale: SegmenterParams::new(0.03, 0.382, 0.5),
            base_scale: SegmenterParams::default(),
            micro_scale: SegmenterParams::new(0.003, 0.146, 0.1),
            similarity_threshold: 0.33,
        }
    }
}

/// Three partitions of the same bars at different granularities
#[derive(Debug, Clone, Default, Serialize)]
pub struct MultiScaleSwings {
    pub macro_swings: Vec<Swing>,
    pub base_swings: Vec<Swing>,
    pub micro_swings: Vec<Swing>,
}

// ============================================================
// MONOWAVE SEGMENTER
// ============================================================

/// Size of a move relative to the price it started from. A move off a zero
/// price counts as unbounded.
#[inline]
fn relative_move(delta: f64, base: f64) -> f64 {
    if base == 0.0 && delta != 0.0 {
        f64::INFINITY
    } else {
        ratio(delta, base)
    }
}

/// Partition `bars` into alternating swings.
///
/// A swing is confirmed once the opposing move clears the reversal floor and
/// either its retrace ratio or its elapsed-time ratio crosses its threshold.
/// The last pivot always connects to the final bar.
pub fn detect_swings<T: OHLCV>(bars: &[T], params: &SegmenterParams) -> Vec<Swing> {
    let n = bars.len();
    if n == 0 {
        return Vec::new();
    }
    let close = |i: usize| bars[i].close();

    let mut swings = Vec::new();
    let mut rising: Option<bool> = None;
    let mut pivot = 0;
    let mut extreme = 0;

    for idx in 1..n {
        let price = close(idx);
        let Some(up) = rising else {
            if price != close(pivot) {
                rising = Some(price > close(pivot));
                extreme = idx;
            }
            continue;
        };

        let continues = if up {
            price >= close(extreme)
        } else {
            price <= close(extreme)
        };
        if continues {
            extreme = idx;
            continue;
        }

        let move_len = (close(extreme) - close(pivot)).abs();
        if move_len == 0.0 {
            continue;
        }
        let retrace = (price - close(extreme)).abs();
        let elapsed = (idx - extreme) as f64;
        let prev_duration = (extreme - pivot).max(1) as f64;

        let floor = relative_move(retrace, close(extreme).abs()) >= params.reversal_pct;
        let confirmed = retrace >= params.retrace_ratio * move_len
            || elapsed >= params.time_ratio * prev_duration;
        if floor && confirmed {
            swings.push(Swing::from_bars(bars, pivot, extreme));
            pivot = extreme;
            extreme = idx;
            rising = Some(!up);
        }
    }

    if swings.is_empty() || pivot != n - 1 {
        let last = Swing::from_bars(bars, pivot, n - 1);
        match swings.last_mut() {
            // a tail that never reversed extends the previous swing
            Some(prev) if last.length() == 0.0 || last.direction() == prev.direction() => {
                if let Some(joined) = Swing::span(&[*prev, last]) {
                    *prev = joined;
                }
            }
            _ => swings.push(last),
        }
    }
    swings
}

/// [`detect_swings`] re-run with loosened or tightened thresholds until the
/// count falls inside the tuning window. Returns the closest partition found
/// and the parameters that produced it.
pub fn detect_swings_adaptive<T: OHLCV>(
    bars: &[T],
    params: &SegmenterParams,
    tuning: &AdaptiveTuning,
) -> (Vec<Swing>, SegmenterParams) {
    let mut current = *params;
    let mut swings = detect_swings(bars, &current);
    let mut best = (tuning.distance(swings.len()), swings.clone(), current);

    for attempt in 0..tuning.max_attempts {
        let count = swings.len();
        if best.0 == 0 {
            break;
        }
        current = if count < tuning.min_swings {
            current.loosen(tuning)
        } else {
            current.tighten(tuning)
        };
        swings = detect_swings(bars, &current);
        let distance = tuning.distance(swings.len());
        tracing::trace!(
            "refinement {}: {} -> {} swings (reversal {:.4})",
            attempt + 1,
            count,
            swings.len(),
            current.reversal_pct
        );
        if distance < best.0 {
            best = (distance, swings.clone(), current);
        }
    }

    let (_, swings, used) = best;
    (swings, used)
}

/// Macro/base/micro partitions, each followed by the similarity merger.
pub fn detect_multi_scale<T: OHLCV>(bars: &[T], scales: &ScaleParams) -> MultiScaleSwings {
    let tau = scales.similarity_threshold;
    let result = MultiScaleSwings {
        macro_swings: merge_by_similarity(&detect_swings(bars, &scales.macro_scale), tau),
        base_swings: merge_by_similarity(&detect_swings(bars, &scales.base_scale), tau),
        micro_swings: merge_by_similarity(&detect_swings(bars, &scales.micro_scale), tau),
    };
    tracing::debug!(
        "multi-scale swings: macro {}, base {}, micro {}",
        result.macro_swings.len(),
        result.base_swings.len(),
        result.micro_swings.len()
    );
    result
}

// ============================================================
// PERCENTAGE ZIGZAG
// ============================================================

/// Sensitivities tried by [`macro_swings_adaptive`], most sensitive first
pub const ZIGZAG_SENSITIVITIES: [f64; 7] = [0.01, 0.03, 0.05, 0.08, 0.10, 0.15, 0.20];

/// ZigZag on closes with a fixed percentage reversal.
///
/// Returns no swings when no move ever reaches `pct`.
pub fn percentage_zigzag<T: OHLCV>(bars: &[T], pct: f64) -> Vec<Swing> {
    let n = bars.len();
    if n == 0 {
        return Vec::new();
    }
    let close = |i: usize| bars[i].close();

    let start = close(0);
    let Some(first) = (1..n).find(|&i| relative_move((close(i) - start).abs(), start.abs()) >= pct)
    else {
        return Vec::new();
    };

    let mut swings = Vec::new();
    let mut up = close(first) > start;
    let mut pivot = 0;
    let mut extreme = first;

    for idx in first + 1..n {
        let price = close(idx);
        let extends = if up {
            price > close(extreme)
        } else {
            price < close(extreme)
        };
        if extends {
            extreme = idx;
            continue;
        }
        let retrace = relative_move((price - close(extreme)).abs(), close(extreme).abs());
        if retrace >= pct {
            swings.push(Swing::from_bars(bars, pivot, extreme));
            pivot = extreme;
            extreme = idx;
            up = !up;
        }
    }

    if pivot != n - 1 {
        swings.push(Swing::from_bars(bars, pivot, n - 1));
    }
    swings
}

/// Percentage ZigZag whose sensitivity gives the swing count closest to
/// `target`. Sensitivities are tried in increasing order; the search stops
/// once the count drops below the target.
pub fn macro_swings_adaptive<T: OHLCV>(bars: &[T], target: usize) -> Vec<Swing> {
    let mut best: Vec<Swing> = Vec::new();
    let mut best_diff = usize::MAX;

    for &pct in &ZIGZAG_SENSITIVITIES {
        let swings = percentage_zigzag(bars, pct);
        let count = swings.len();
        let diff = count.abs_diff(target);
        if diff < best_diff {
            best_diff = diff;
            best = swings;
        }
        if count < target {
            break;
        }
    }
    tracing::debug!("macro zigzag: {} swings for target {}", best.len(), target);
    best
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bar, Direction};

    fn hourly(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::from_close(i as i64 * 3600, c))
            .collect()
    }

    fn assert_partition(swings: &[Swing], bars: usize) {
        assert_eq!(swings.first().unwrap().start_index, 0);
        assert_eq!(swings.last().unwrap().end_index, bars - 1);
        for pair in swings.windows(2) {
            assert_eq!(pair[0].end_index, pair[1].start_index);
            assert_ne!(pair[0].direction(), pair[1].direction());
        }
    }

    #[test]
    fn test_empty_input() {
        let bars: Vec<Bar> = Vec::new();
        assert!(detect_swings(&bars, &SegmenterParams::default()).is_empty());
        assert!(percentage_zigzag(&bars, 0.05).is_empty());
        assert!(macro_swings_adaptive(&bars, 3).is_empty());
    }

    #[test]
    fn test_reversal_off_zero_price_is_confirmed() {
        let bars = hourly(&[0.0, 1.0, 0.0, 1.0, 0.0]);
        let swings = detect_swings(&bars, &SegmenterParams::default());
        assert_eq!(swings.len(), 4);
        assert_partition(&swings, bars.len());
        assert_eq!(percentage_zigzag(&bars, 0.05).len(), 4);
    }

    #[test]
    fn test_single_bar_is_one_swing() {
        let swings = detect_swings(&hourly(&[100.0]), &SegmenterParams::default());
        assert_eq!(swings.len(), 1);
        assert_eq!(swings[0].length(), 0.0);
    }

    #[test]
    fn test_flat_series_is_one_swing() {
        let bars = hourly(&[50.0; 6]);
        let swings = detect_swings(&bars, &SegmenterParams::default());
        assert_eq!(swings.len(), 1);
        assert_partition(&swings, bars.len());
    }

    #[test]
    fn test_reversal_floor_filters_noise() {
        let bars = hourly(&[100.0, 110.0, 104.0, 124.0, 120.0, 133.0]);
        let params = SegmenterParams::new(0.05, 0.236, 0.2);
        let swings = detect_swings(&bars, &params);

        assert_eq!(swings.len(), 3);
        assert_eq!(swings[0].direction(), Direction::Up);
        assert_eq!(swings[2].direction(), Direction::Up);
        assert_eq!(swings[2].end_price, 133.0);
        assert_partition(&swings, bars.len());
    }

    #[test]
    fn test_every_turn_confirmed_with_defaults() {
        let bars = hourly(&[100.0, 110.0, 104.0, 124.0, 120.0, 133.0]);
        let swings = detect_swings(&bars, &SegmenterParams::default());
        assert_eq!(swings.len(), 5);
        assert_partition(&swings, bars.len());
    }

    #[test]
    fn test_unconfirmed_tail_stays_in_last_swing() {
        // 133 -> 132.5 never clears the 1% floor
        let bars = hourly(&[100.0, 110.0, 104.0, 133.0, 132.5]);
        let swings = detect_swings(&bars, &SegmenterParams::default());
        assert_eq!(swings.len(), 3);
        assert_eq!(swings[2].end_index, 4);
        assert_eq!(swings[2].direction(), Direction::Up);
        assert_partition(&swings, bars.len());
    }

    #[test]
    fn test_adaptive_loosens_toward_window() {
        let bars = hourly(&[100.0, 110.0, 104.0, 124.0, 120.0, 133.0]);
        let strict = SegmenterParams::new(0.04, 0.3, 1.0);
        let tuning = AdaptiveTuning {
            min_swings: 5,
            max_swings: 10,
            ..AdaptiveTuning::default()
        };
        let (swings, used) = detect_swings_adaptive(&bars, &strict, &tuning);
        assert_eq!(swings.len(), 5);
        assert!(used.reversal_pct < strict.reversal_pct);
    }

    #[test]
    fn test_adaptive_stays_when_inside_window() {
        let bars = hourly(&[100.0, 110.0, 104.0, 124.0, 120.0, 133.0]);
        let tuning = AdaptiveTuning {
            min_swings: 1,
            max_swings: 10,
            ..AdaptiveTuning::default()
        };
        let params = SegmenterParams::default();
        let (_, used) = detect_swings_adaptive(&bars, &params, &tuning);
        assert_eq!(used, params);
    }

    #[test]
    fn test_multi_scale_granularity() {
        let closes: Vec<f64> = (0..120)
            .map(|i| {
                let t = i as f64;
                100.0 + 20.0 * (t / 20.0).sin() + 1.5 * (t / 1.5).sin()
            })
            .collect();
        let bars = hourly(&closes);
        let scales = detect_multi_scale(&bars, &ScaleParams::default());
        for swings in [&scales.macro_swings, &scales.base_swings, &scales.micro_swings] {
            assert_partition(swings, bars.len());
        }
        assert!(scales.macro_swings.len() <= scales.micro_swings.len());
    }

    #[test]
    fn test_percentage_zigzag_threshold() {
        let bars = hourly(&[100.0, 102.0, 101.0, 110.0, 99.0, 105.0]);
        let swings = percentage_zigzag(&bars, 0.05);
        let ends: Vec<f64> = swings.iter().map(|s| s.end_price).collect();
        assert_eq!(ends, vec![110.0, 99.0, 105.0]);
        assert!(percentage_zigzag(&bars, 0.5).is_empty());
    }

    #[test]
    fn test_macro_adaptive_three_dominant_swings() {
        let bars = hourly(&[
            100.0, 110.0, 105.0, 120.0, 115.0, 150.0, 140.0, 200.0, 190.0, 195.0, 180.0, 220.0,
            210.0, 300.0,
        ]);
        let swings = macro_swings_adaptive(&bars, 3);
        let ends: Vec<f64> = swings.iter().map(|s| s.end_price).collect();
        assert_eq!(ends, vec![200.0, 180.0, 300.0]);
    }
}
