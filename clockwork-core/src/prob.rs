//! Log-space probability helpers for numerically stable computation.
//!
//! [`log_sum_exp`] and [`log_add`] combine log-weights without overflow.
//! Non-finite terms are excluded rather than propagated, so a single `-inf`
//! or NaN component never poisons a sum.

/// `ln(exp(a) + exp(b))`, treating non-finite arguments as `-inf`.
pub fn log_add(a: f64, b: f64) -> f64 {
    let a = if a.is_finite() { a } else { f64::NEG_INFINITY };
    let b = if b.is_finite() { b } else { f64::NEG_INFINITY };
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (max, min) = if a >= b { (a, b) } else { (b, a) };
    max + (min - max).exp().ln_1p()
}

/// `ln(Σ exp(xᵢ))` over the finite terms only.
///
/// Returns `-inf` when no term is finite or when the shifted sum underflows.
pub fn log_sum_exp(terms: &[f64]) -> f64 {
    let max = terms
        .iter()
        .copied()
        .filter(|t| t.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = terms
        .iter()
        .filter(|t| t.is_finite())
        .map(|&t| (t - max).exp())
        .sum();
    if sum > 0.0 {
        max + sum.ln()
    } else {
        f64::NEG_INFINITY
    }
}

/// Normalize log-weights into probabilities that sum to one.
///
/// Non-finite weights get probability 0. Returns `None` when no weight is
/// finite.
pub fn normalize_log_weights(log_weights: &[f64]) -> Option<Vec<f64>> {
    let den = log_sum_exp(log_weights);
    if !den.is_finite() {
        return None;
    }
    Some(
        log_weights
            .iter()
            .map(|&w| if w.is_finite() { (w - den).exp() } else { 0.0 })
            .collect(),
    )
}
