//! Common helper functions for wave pattern validation
//!
//! Ratio arithmetic with zero-denominator sentinels, the Rule of Similarity
//! and leg accessors shared by validators, parser and scenario search.

use super::{PatternCheck, PatternKind};
use crate::{
    wave::{Swing, WaveNode},
    Direction,
};

// ============================================================
// LEG
// ============================================================

/// Anything with a start and end in price and time: raw swings or nodes.
pub trait Leg {
    fn start_price(&self) -> f64;
    fn end_price(&self) -> f64;
    fn start_time(&self) -> i64;
    fn end_time(&self) -> i64;

    fn high(&self) -> f64 {
        self.start_price().max(self.end_price())
    }

    fn low(&self) -> f64 {
        self.start_price().min(self.end_price())
    }

    fn volume(&self) -> f64 {
        0.0
    }

    #[inline]
    fn direction(&self) -> Direction {
        Direction::from_prices(self.start_price(), self.end_price())
    }

    #[inline]
    fn length(&self) -> f64 {
        (self.end_price() - self.start_price()).abs()
    }

    #[inline]
    fn duration(&self) -> f64 {
        (self.end_time() - self.start_time()) as f64
    }
}

impl Leg for Swing {
    fn start_price(&self) -> f64 {
        self.start_price
    }
    fn end_price(&self) -> f64 {
        self.end_price
    }
    fn start_time(&self) -> i64 {
        self.start_time
    }
    fn end_time(&self) -> i64 {
        self.end_time
    }
    fn high(&self) -> f64 {
        self.high
    }
    fn low(&self) -> f64 {
        self.low
    }
    fn volume(&self) -> f64 {
        self.volume
    }
}

impl Leg for WaveNode {
    fn start_price(&self) -> f64 {
        self.start_price
    }
    fn end_price(&self) -> f64 {
        self.end_price
    }
    fn start_time(&self) -> i64 {
        self.start_time
    }
    fn end_time(&self) -> i64 {
        self.end_time
    }
    fn high(&self) -> f64 {
        self.high
    }
    fn low(&self) -> f64 {
        self.low
    }
    fn volume(&self) -> f64 {
        self.volume
    }
}

impl<L: Leg + ?Sized> Leg for &L {
    fn start_price(&self) -> f64 {
        (**self).start_price()
    }
    fn end_price(&self) -> f64 {
        (**self).end_price()
    }
    fn start_time(&self) -> i64 {
        (**self).start_time()
    }
    fn end_time(&self) -> i64 {
        (**self).end_time()
    }
    fn high(&self) -> f64 {
        (**self).high()
    }
    fn low(&self) -> f64 {
        (**self).low()
    }
    fn volume(&self) -> f64 {
        (**self).volume()
    }
}

// ============================================================
// RATIOS
// ============================================================

/// `|num| / |den|`, or 0.0 when the denominator is zero or not finite
#[inline]
pub fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 || !den.is_finite() || !num.is_finite() {
        return 0.0;
    }
    num.abs() / den.abs()
}

/// `min / max` of two magnitudes; 1.0 when both are zero
#[inline]
pub fn similarity(a: f64, b: f64) -> f64 {
    let (a, b) = (a.abs(), b.abs());
    let max = a.max(b);
    if max == 0.0 {
        return 1.0;
    }
    a.min(b) / max
}

/// Price range times duration (at least one time unit)
#[inline]
pub fn energy<L: Leg>(leg: &L) -> f64 {
    leg.length() * leg.duration().max(1.0)
}

// ============================================================
// SIMILARITY & ALTERNATION
// ============================================================

pub fn is_alternating<L: Leg>(legs: &[L]) -> bool {
    legs.windows(2)
        .all(|pair| pair[0].direction() != pair[1].direction())
}

/// Rule of Similarity: comparable in price OR in time
#[inline]
pub fn pair_similar<L: Leg>(a: &L, b: &L, tau: f64) -> bool {
    similarity(a.length(), b.length()) >= tau || similarity(a.duration(), b.duration()) >= tau
}

pub fn all_similar<L: Leg>(legs: &[L], tau: f64) -> bool {
    legs.windows(2).all(|pair| pair_similar(&pair[0], &pair[1], tau))
}

/// Adjacent pairs failing similarity on both axes
pub fn dissimilar_pairs<L: Leg>(legs: &[L], tau: f64) -> usize {
    legs.windows(2)
        .filter(|pair| !pair_similar(&pair[0], &pair[1], tau))
        .count()
}

/// Window-size and alternation precondition shared by every validator
pub fn shape_guard<L: Leg>(kind: PatternKind, legs: &[L]) -> Option<PatternCheck> {
    let expected = kind.window_len();
    if legs.len() != expected {
        return Some(PatternCheck::rejected(
            kind,
            format!("{kind} requires exactly {expected} legs, got {}", legs.len()),
        ));
    }
    if !is_alternating(legs) {
        return Some(PatternCheck::rejected(
            kind,
            format!("{kind} legs must alternate direction"),
        ));
    }
    None
}

// ============================================================
// EXPECTATION TEXT
// ============================================================

#[inline]
pub(crate) fn at_least(x: f64) -> String {
    format!(">= {x:.3}")
}

#[inline]
pub(crate) fn below(x: f64) -> String {
    format!("< {x:.3}")
}

#[inline]
pub(crate) fn at_most(x: f64) -> String {
    format!("<= {x:.3}")
}

#[inline]
pub(crate) fn between(lo: f64, hi: f64) -> String {
    format!("{lo:.3} - {hi:.3}")
}

#[inline]
pub(crate) fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

// ============================================================
// TESTS
// ============================================================
