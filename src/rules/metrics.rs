//! Named measurements of a leg window that rule predicates refer to.

use std::collections::HashMap;

use crate::patterns::{
    helpers::{is_alternating, ratio, similarity},
    Leg, PatternKind,
};

macro_rules! define_metrics {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Closed set of metrics a rule expression may reference
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Metric {
            $($variant),*
        }

        impl Metric {
            pub const ALL: &'static [Metric] = &[$(Metric::$variant),*];

            pub fn name(self) -> &'static str {
                match self {
                    $(Metric::$variant => $name),*
                }
            }

            /// Case-insensitive lookup by rule-expression name
            pub fn from_name(name: &str) -> Option<Metric> {
                Self::ALL.iter().copied().find(|m| m.name().eq_ignore_ascii_case(name))
            }
        }
    };
}

define_metrics! {
    Wave1Length => "wave1_length",
    Wave2Length => "wave2_length",
    Wave3Length => "wave3_length",
    Wave4Length => "wave4_length",
    Wave5Length => "wave5_length",
    Wave1Time => "wave1_time",
    Wave2Time => "wave2_time",
    Wave3Time => "wave3_time",
    Wave4Time => "wave4_time",
    Wave5Time => "wave5_time",
    Wave2Ratio => "wave2_ratio",
    Wave3NotShortest => "wave3_not_shortest",
    ExtensionRatio => "extension_ratio",
    ExtensionPresent => "extension_present",
    Wave5OverWave4 => "wave5_over_wave4",
    ALength => "A_length",
    BLength => "B_length",
    CLength => "C_length",
    BOverA => "B_over_A",
    COverA => "C_over_A",
    COverB => "C_over_B",
    EOverC => "E_over_C",
    BStrongerThanA => "B_stronger_than_A",
    PriceBalance => "price_balance",
    TimeBalance => "time_balance",
    PriceContraction => "price_contraction",
    Alternating => "alternating",
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Longest motive leg over the runner-up that counts as an extension
pub const EXTENSION_PRESENT_RATIO: f64 = 1.4;

/// Metric values for one window. Booleans are stored as 1.0 / 0.0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    values: HashMap<Metric, f64>,
}

impl Metrics {
    #[inline]
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values.get(&metric).copied()
    }

    #[inline]
    pub fn set(&mut self, metric: Metric, value: f64) {
        self.values.insert(metric, value);
    }

    fn flag(&mut self, metric: Metric, value: bool) {
        self.set(metric, if value { 1.0 } else { 0.0 });
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Metrics for `legs` interpreted as a `kind` pattern.
    pub fn compute<L: Leg>(kind: PatternKind, legs: &[L]) -> Self {
        let mut m = Metrics::default();
        m.flag(Metric::Alternating, is_alternating(legs));
        let len: Vec<f64> = legs.iter().map(|l| l.length()).collect();
        let dur: Vec<f64> = legs.iter().map(|l| l.duration()).collect();
        if len.is_empty() {
            return m;
        }
        m.balance(&len, &dur);

        match (kind, len.len()) {
            (PatternKind::Impulse | PatternKind::TerminalImpulse, 5) => m.impulse(&len, &dur),
            (PatternKind::Zigzag | PatternKind::Flat, 3) => m.three(&len),
            (PatternKind::Triangle, 5) => {
                m.set(Metric::COverA, ratio(len[2], len[0]));
                m.set(Metric::EOverC, ratio(len[4], len[2]));
                let contraction = if len[0] != 0.0 { len[4] / len[0] } else { 1.0 };
                m.set(Metric::PriceContraction, contraction);
            }
            _ => {}
        }
        m
    }

    fn balance(&mut self, len: &[f64], dur: &[f64]) {
        let max = len.iter().copied().fold(0.0, f64::max);
        let min = len.iter().copied().fold(f64::INFINITY, f64::min);
        self.set(Metric::PriceBalance, if max > 0.0 { min / max } else { 1.0 });
        let time_balance = dur
            .windows(2)
            .map(|w| similarity(w[0], w[1]))
            .fold(1.0, f64::min);
        self.set(Metric::TimeBalance, time_balance);
    }

    fn impulse(&mut self, len: &[f64], dur: &[f64]) {
        let lengths = [
            Metric::Wave1Length,
            Metric::Wave2Length,
            Metric::Wave3Length,
            Metric::Wave4Length,
            Metric::Wave5Length,
        ];
        let times = [
            Metric::Wave1Time,
            Metric::Wave2Time,
            Metric::Wave3Time,
            Metric::Wave4Time,
            Metric::Wave5Time,
        ];
        for i in 0..5 {
            self.set(lengths[i], len[i]);
            self.set(times[i], dur[i]);
        }
        self.set(Metric::Wave2Ratio, ratio(len[1], len[0]));
        self.flag(Metric::Wave3NotShortest, len[2] >= len[0].min(len[4]));
        self.set(Metric::Wave5OverWave4, ratio(len[4], len[3]));

        let mut motive = [len[0], len[2], len[4]];
        motive.sort_by(|a, b| a.total_cmp(b));
        let extension = ratio(motive[2], motive[1]);
        self.set(Metric::ExtensionRatio, extension);
        self.flag(
            Metric::ExtensionPresent,
            motive[1] > 0.0 && extension >= EXTENSION_PRESENT_RATIO,
        );
    }

    fn three(&mut self, len: &[f64]) {
        self.set(Metric::ALength, len[0]);
        self.set(Metric::BLength, len[1]);
        self.set(Metric::CLength, len[2]);
        let b_over_a = ratio(len[1], len[0]);
        self.set(Metric::BOverA, b_over_a);
        self.set(Metric::COverA, ratio(len[2], len[0]));
        self.set(Metric::COverB, ratio(len[2], len[1]));
        self.flag(Metric::BStrongerThanA, b_over_a >= 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wave::Swing;

    fn window(points: &[f64]) -> Vec<Swing> {
        points
            .windows(2)
            .enumerate()
            .map(|(i, w)| Swing::new(i, i + 1, i as i64 * 10, (i as i64 + 1) * 10, w[0], w[1]))
            .collect()
    }

    #[test]
    fn test_names_round_trip() {
        for &metric in Metric::ALL {
            assert_eq!(Metric::from_name(metric.name()), Some(metric));
        }
        assert_eq!(Metric::from_name("b_over_a"), Some(Metric::BOverA));
        assert_eq!(Metric::from_name("nope"), None);
    }

    #[test]
    fn test_impulse_metrics() {
        let m = Metrics::compute(
            PatternKind::Impulse,
            &window(&[100.0, 110.0, 104.0, 128.0, 120.0, 133.0]),
        );
        assert!((m.get(Metric::Wave2Ratio).unwrap() - 0.6).abs() < 1e-12);
        assert_eq!(m.get(Metric::Wave3NotShortest), Some(1.0));
        assert_eq!(m.get(Metric::ExtensionPresent), Some(1.0));
        assert!((m.get(Metric::ExtensionRatio).unwrap() - 24.0 / 13.0).abs() < 1e-12);
        assert_eq!(m.get(Metric::Wave1Time), Some(10.0));
        assert_eq!(m.get(Metric::Alternating), Some(1.0));
    }

    #[test]
    fn test_three_leg_metrics() {
        let m = Metrics::compute(PatternKind::Flat, &window(&[100.0, 90.0, 100.0, 92.0]));
        assert_eq!(m.get(Metric::BOverA), Some(1.0));
        assert_eq!(m.get(Metric::BStrongerThanA), Some(1.0));
        assert!((m.get(Metric::COverB).unwrap() - 0.8).abs() < 1e-12);
        assert_eq!(m.get(Metric::Wave2Ratio), None);
    }

    #[test]
    fn test_empty_window() {
        let m = Metrics::compute::<Swing>(PatternKind::Zigzag, &[]);
        assert_eq!(m.len(), 1);
        assert_eq!(m.get(Metric::Alternating), Some(1.0));
    }
}
