//! Similarity merger
//!
//! Folds noise swings into their neighbours so that adjacent swings respect
//! the Rule of Similarity. A swing is folded only when it is small against
//! *both* neighbours in *both* price and time.

use crate::wave::Swing;

/// True when `tiny` fails similarity against both neighbours on both axes.
#[inline]
fn is_noise(prev: &Swing, tiny: &Swing, next: &Swing, tau: f64) -> bool {
    prev.direction() == next.direction()
        && tiny.length() < tau * prev.length()
        && tiny.length() < tau * next.length()
        && tiny.duration() < tau * prev.duration()
        && tiny.duration() < tau * next.duration()
}

/// Repeatedly fold the leftmost `(prev, tiny, next)` triple whose middle
/// swing is noise into one swing from `prev.start` to `next.end`.
///
/// Runs to a fixed point or until fewer than 3 swings remain, so a second
/// pass over its own output changes nothing. `tau` is clamped to `0.0..=1.0`.
pub fn merge_by_similarity(swings: &[Swing], tau: f64) -> Vec<Swing> {
    let tau = if tau.is_finite() { tau.clamp(0.0, 1.0) } else { 0.0 };
    let mut merged = swings.to_vec();
    let mut folds = 0usize;

    while merged.len() >= 3 {
        let Some(i) = (1..merged.len() - 1)
            .find(|&i| is_noise(&merged[i - 1], &merged[i], &merged[i + 1], tau))
        else {
            break;
        };
        let Some(joined) = Swing::span(&merged[i - 1..=i + 1]) else {
            break;
        };
        merged.splice(i - 1..=i + 1, std::iter::once(joined));
        folds += 1;
    }

    if folds > 0 {
        tracing::trace!("similarity merge: {} -> {} swings", swings.len(), merged.len());
    }
    merged
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    const H: i64 = 3600;

    /// Swings through `points` with the given leg durations in hours
    fn swings(points: &[f64], hours: &[i64]) -> Vec<Swing> {
        let mut t = 0;
        let mut bar = 0;
        points
            .windows(2)
            .zip(hours)
            .map(|(w, &h)| {
                let s = Swing::new(bar, bar + h as usize, t, t + h * H, w[0], w[1]);
                t += h * H;
                bar += h as usize;
                s
            })
            .collect()
    }

    #[test]
    fn test_folds_noise_swing() {
        let input = swings(&[100.0, 110.0, 109.0, 130.0, 120.0], &[4, 1, 4, 4]);
        let merged = merge_by_similarity(&input, 0.33);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].start_price, 100.0);
        assert_eq!(merged[0].end_price, 130.0);
        assert_eq!(merged[0].end_index, merged[1].start_index);
    }

    #[test]
    fn test_single_dimension_failure_is_kept() {
        // small in price but as long as its neighbours
        let input = swings(&[100.0, 110.0, 109.0, 130.0], &[4, 4, 4]);
        assert_eq!(merge_by_similarity(&input, 0.33).len(), 3);
    }

    #[test]
    fn test_idempotent() {
        let input = swings(
            &[100.0, 110.0, 109.5, 125.0, 124.0, 140.0, 120.0, 121.0, 100.0],
            &[5, 1, 6, 1, 5, 6, 1, 6],
        );
        let once = merge_by_similarity(&input, 0.33);
        let twice = merge_by_similarity(&once, 0.33);
        assert_eq!(once, twice);
        assert!(once.len() < input.len());
    }

    #[test]
    fn test_short_input_untouched() {
        let input = swings(&[100.0, 110.0, 109.0], &[4, 1]);
        assert_eq!(merge_by_similarity(&input, 0.33), input);
    }

    #[test]
    fn test_zero_threshold_never_merges() {
        let input = swings(&[100.0, 110.0, 109.0, 130.0, 120.0], &[4, 1, 4, 4]);
        assert_eq!(merge_by_similarity(&input, 0.0).len(), 4);
        assert_eq!(merge_by_similarity(&input, f64::NAN).len(), 4);
    }
}
