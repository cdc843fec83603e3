//! Small numeric helpers shared by the scoring modules.
//!
//! Everything here is deterministic and NaN-free for finite inputs: empty
//! slices and zero denominators yield `0.0` rather than propagating NaN/Inf.

use ordered_float::OrderedFloat;
use statrs::statistics::Statistics;

/// Denominators at or below this magnitude are treated as zero.
pub const DEGENERATE_EPSILON: f64 = 1e-12;

/// Arithmetic mean, `0.0` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().mean()
    }
}

/// Population standard deviation, `0.0` for fewer than two values.
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        0.0
    } else {
        values.iter().population_std_dev()
    }
}

/// Root-mean-square of the negative values (downside deviation with a zero target).
pub fn downside_deviation(values: &[f64]) -> f64 {
    let downside: Vec<f64> = values.iter().filter(|r| **r < 0.0).map(|r| r * r).collect();
    if downside.is_empty() {
        0.0
    } else {
        (downside.iter().sum::<f64>() / downside.len() as f64).sqrt()
    }
}

/// Ascending copy of `values` under a total order.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out: Vec<OrderedFloat<f64>> = values.iter().copied().map(OrderedFloat).collect();
    out.sort();
    out.into_iter().map(|v| v.into_inner()).collect()
}

/// Percentile (`p` in [0, 1]) with linear interpolation between order statistics.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let s = sorted(values);
    let rank = p.clamp(0.0, 1.0) * (s.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        s[lo]
    } else {
        s[lo] + (s[hi] - s[lo]) * (rank - lo as f64)
    }
}

/// `numerator / denominator`, or `None` when the denominator is degenerate.
pub fn guarded_ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator.abs() <= DEGENERATE_EPSILON || !denominator.is_finite() {
        None
    } else {
        Some(numerator / denominator)
    }
}
