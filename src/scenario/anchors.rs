//! Major pivot detection for alternate scenario origins

use crate::wave::Swing;

const PRICE_WEIGHT: f64 = 0.4;
const TIME_WEIGHT: f64 = 0.2;
const VOLUME_WEIGHT: f64 = 0.1;
const ENERGY_WEIGHT: f64 = 0.3;
/// Deduction for a swing far steeper or flatter than average
const ASPECT_PENALTY: f64 = 0.15;

fn mean_or_one(values: impl Iterator<Item = f64>, n: usize) -> f64 {
    let mean = values.sum::<f64>() / n as f64;
    if mean > 0.0 {
        mean
    } else {
        1.0
    }
}

/// Indices of the `max` most significant swings, strongest first.
///
/// Each swing is scored on its price, time and volume relative to the
/// sequence averages and on its price-time energy. Swings whose normalized
/// price/time aspect is extreme are marked down. Ties keep sequence order.
pub fn major_pivots(swings: &[Swing], max: usize) -> Vec<usize> {
    if swings.is_empty() || max == 0 {
        return Vec::new();
    }
    let n = swings.len();
    let price = mean_or_one(swings.iter().map(Swing::length), n);
    let time = mean_or_one(swings.iter().map(Swing::duration), n);
    let volume = swings.iter().map(|s| s.volume).sum::<f64>() / n as f64;

    let mut scored: Vec<(usize, f64)> = swings
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let p = s.length() / price;
            let t = s.duration() / time;
            let v = if volume > 0.0 { s.volume / volume } else { 0.0 };
            let e = p * t.max(1.0);
            let mut score = PRICE_WEIGHT * p + TIME_WEIGHT * t + VOLUME_WEIGHT * v + ENERGY_WEIGHT * e;
            let aspect = p / t.max(f64::EPSILON);
            if !(0.25..=4.0).contains(&aspect) {
                score -= ASPECT_PENALTY;
            }
            (i, score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(max);
    tracing::trace!("major pivots: {scored:?}");
    scored.into_iter().map(|(i, _)| i).collect()
}
