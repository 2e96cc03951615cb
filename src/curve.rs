//! Exponential forgetting curve used for every graded key.
//!
//! Recall probability after `t` seconds is `exp(-t / S)`, where `S` is the stability
//! coefficient stored as `lastS`. A half-life `h` corresponds to `S = h / ln 2`.
//! All durations and every `S` are in seconds.

use std::f64::consts::LN_2;

use chrono::{
    DateTime,
    Utc,
};

pub const INITIAL_TEST_S: f64 = 45.0 / LN_2; // First successful test: half-life 45s
pub const INITIAL_VIEW_S: f64 = 20.0 / LN_2; // Introduction views: half-life 20s
pub const MIN_S: f64 = 15.0 / LN_2; // Half-life 15s
pub const MAX_S: f64 = 30.0 * 24.0 * 3600.0 / LN_2; // Half-life 30 days

/// Review coefficient of a variant that was neither tested nor introduced.
pub const INITIAL_VIEW_COEFFICIENT: f64 = 0.8;

const FAILURE_FACTOR: f64 = 0.5;
const MIN_SUCCESS_DAMPING: f64 = 0.1;

// (half-life upper bound in seconds, multiplier on success)
const INDIVIDUAL_TIERS: &[(f64, f64)] =
    &[(60.0, 6.0), (600.0, 4.0), (3600.0, 3.0), (86_400.0, 2.5)];
const INDIVIDUAL_FLOOR: f64 = 2.0;
const GROUP_TIERS: &[(f64, f64)] = &[(60.0, 4.0), (600.0, 3.0), (3600.0, 2.2), (86_400.0, 1.8)];
const GROUP_FLOOR: f64 = 1.5;

pub fn half_life_coefficient(half_life_secs: f64) -> f64 {
    -half_life_secs / 0.5f64.ln()
}

pub fn half_life(s: f64) -> f64 {
    sanitize(s) * LN_2
}

/// Recall probability after `elapsed_secs`. Negative elapsed time counts as zero.
pub fn probability(elapsed_secs: f64, s: f64) -> f64 {
    let elapsed = elapsed_secs.max(0.0);
    (-elapsed / sanitize(s)).exp().max(f64::MIN_POSITIVE)
}

/// Seconds left until recall drops to 0.5; negative once the half-life has passed.
pub fn seconds_until_half(last_reviewed_at: DateTime<Utc>, now: DateTime<Utc>, s: f64) -> f64 {
    half_life(s) - elapsed_secs(last_reviewed_at, now)
}

pub fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

pub fn clamp_stability(s: f64) -> f64 {
    sanitize(s).clamp(MIN_S, MAX_S)
}

fn sanitize(s: f64) -> f64 {
    if s > 0.0 {
        s
    } else {
        MIN_S
    }
}

/// Shrinks the success boost when the answer came while recall was still likely.
pub fn success_double_coeff(probability: f64) -> f64 {
    (1.0 - (probability - 0.5).max(0.0) * 2.0).max(MIN_SUCCESS_DAMPING)
}

pub fn success_multiplier(half_life_secs: f64, grouped: bool) -> f64 {
    let (tiers, floor) =
        if grouped { (GROUP_TIERS, GROUP_FLOOR) } else { (INDIVIDUAL_TIERS, INDIVIDUAL_FLOOR) };

    tiers
        .iter()
        .find(|(upper_bound, _)| half_life_secs < *upper_bound)
        .map(|(_, multiplier)| *multiplier)
        .unwrap_or(floor)
}

/// New stability after a graded answer given `elapsed_secs` since the previous one.
pub fn next_stability(previous: Option<f64>, elapsed_secs: f64, success: bool, grouped: bool) -> f64 {
    let Some(previous) = previous.filter(|s| s.is_finite() && *s > 0.0) else {
        return if success { INITIAL_TEST_S } else { (INITIAL_TEST_S * FAILURE_FACTOR).max(MIN_S) };
    };
    let previous = clamp_stability(previous);

    if !success {
        return clamp_stability(previous * FAILURE_FACTOR);
    }

    let damping = success_double_coeff(probability(elapsed_secs, previous));
    let multiplier = success_multiplier(half_life(previous), grouped);
    let adjusted = 1.0 + (multiplier - 1.0) * damping;

    clamp_stability(previous * adjusted)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_half_life_round_trip() {
        let s = half_life_coefficient(60.0);
        assert!((probability(60.0, s) - 0.5).abs() < EPSILON);
        assert!((half_life(s) - 60.0).abs() < EPSILON);
        assert!((half_life(MAX_S) - 30.0 * 86_400.0).abs() < 1e-6);
        assert!((MIN_S - half_life_coefficient(15.0)).abs() < EPSILON);
    }

    #[test]
    fn test_probability_bounds_and_decrease() {
        for s in [MIN_S, INITIAL_TEST_S, half_life_coefficient(3600.0), MAX_S] {
            let mut previous = probability(0.0, s);
            assert_eq!(previous, 1.0);
            for step in 1..200 {
                let current = probability(step as f64 * 7.5, s);
                assert!(current > 0.0 && current <= 1.0);
                assert!(current < previous, "not decreasing at step {step} for s={s}");
                previous = current;
            }
        }
    }

    #[test]
    fn test_non_positive_s_is_treated_as_min() {
        assert_eq!(probability(10.0, 0.0), probability(10.0, MIN_S));
        assert_eq!(probability(10.0, -4.0), probability(10.0, MIN_S));
        assert_eq!(probability(-5.0, MIN_S), 1.0);
    }

    #[test]
    fn test_seconds_until_half() {
        let now = Utc::now();
        let s = half_life_coefficient(60.0);
        let remaining = seconds_until_half(now - Duration::seconds(20), now, s);
        assert!((remaining - 40.0).abs() < 1e-6);
        assert!(seconds_until_half(now - Duration::seconds(90), now, s) < 0.0);
    }

    #[test]
    fn test_first_answer() {
        assert_eq!(next_stability(None, 0.0, true, false), INITIAL_TEST_S);
        assert_eq!(next_stability(None, 0.0, false, false), INITIAL_TEST_S * 0.5);
        assert_eq!(next_stability(Some(0.0), 0.0, true, true), INITIAL_TEST_S);
    }

    #[test]
    fn test_late_success_grows_more_than_early_success() {
        let s = half_life_coefficient(120.0);
        let immediate = next_stability(Some(s), 1.0, true, false);
        let at_half_life = next_stability(Some(s), 120.0, true, false);
        assert!(immediate > s);
        assert!(at_half_life > immediate);
        // At the half-life the full tier multiplier applies.
        assert!((at_half_life - s * 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_grouped_variants_grow_slower() {
        let s = half_life_coefficient(300.0);
        assert!(next_stability(Some(s), 300.0, true, true) < next_stability(Some(s), 300.0, true, false));
    }

    #[test]
    fn test_failure_halves() {
        let s = half_life_coefficient(3600.0);
        assert!((next_stability(Some(s), 10.0, false, false) - s * 0.5).abs() < EPSILON);
        assert_eq!(next_stability(Some(MIN_S), 10.0, false, false), MIN_S);
    }

    #[test]
    fn test_stability_always_within_bounds() {
        let mut s = None;
        for round in 0..400 {
            let success = round % 7 != 3;
            let elapsed = (round as f64 * 997.0) % 5_000_000.0;
            let next = next_stability(s, elapsed, success, round % 2 == 0);
            assert!((MIN_S..=MAX_S).contains(&next), "out of bounds: {next}");
            s = Some(next);
        }
        assert_eq!(next_stability(Some(MAX_S), 3.0e6, true, false), MAX_S);
        assert_eq!(next_stability(Some(f64::INFINITY), 0.0, true, false), INITIAL_TEST_S);
    }
}
