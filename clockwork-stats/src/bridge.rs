//! Expected rate along a Brownian-bridge log-rate path.
//!
//! On a branch of duration `t` the log-rate `V_s` is modelled as a Brownian
//! bridge from `ln r0` to `ln rt` with variance rate `phi`, so that
//! `E[V_s] = v0 + (vT − v0)·s/t` and `Var[V_s] = phi·s(t − s)/t`. The
//! branch rate is the time average `Z = (1/t)∫₀ᵗ exp(V_s) ds`.
//!
//! [`mean_z`] evaluates `E[Z]` with a truncated Taylor series of
//! `exp(A·s − B·s²)` integrated term by term, falling back to Simpson
//! quadrature and finally to the geometric mean of the endpoints when the
//! series is numerically implausible. [`var_z`] gives `Var[Z]` by 2-D
//! Simpson integration of the covariance kernel.

use clockwork_core::{ClockworkError, Result};
use tracing::debug;

/// Taylor order used by the auto-correlated clock unless configured.
pub const DEFAULT_TAYLOR_ORDER: usize = 10;

/// Number of Simpson intervals used by the fallback integrator.
pub const SIMPSON_STEPS: usize = 256;

/// Series results above this multiple of the larger endpoint are rejected.
pub const MAX_RATE_MULTIPLIER: f64 = 1.0e4;

fn check_endpoints(r0: f64, rt: f64, t: f64, phi: f64) -> Result<()> {
    if !(t > 0.0) || !t.is_finite() {
        return Err(ClockworkError::InvalidInput(format!(
            "bridge: t must be > 0, got {}",
            t
        )));
    }
    if !(r0 > 0.0 && rt > 0.0) || !r0.is_finite() || !rt.is_finite() {
        return Err(ClockworkError::InvalidInput(format!(
            "bridge: rates must be positive, got r0={}, rt={}",
            r0, rt
        )));
    }
    if !(phi >= 0.0) || !phi.is_finite() {
        return Err(ClockworkError::InvalidInput(format!(
            "bridge: phi must be >= 0, got {}",
            phi
        )));
    }
    Ok(())
}

/// Expected time-averaged rate `E[Z]` over a bridged branch.
///
/// # Errors
///
/// Returns an error if `t <= 0`, `order < 1`, either rate is not positive,
/// or `phi` is negative or non-finite.
pub fn mean_z(r0: f64, rt: f64, t: f64, phi: f64, order: usize) -> Result<f64> {
    check_endpoints(r0, rt, t, phi)?;
    if order < 1 {
        return Err(ClockworkError::InvalidInput(
            "bridge: Taylor order must be >= 1".into(),
        ));
    }

    if r0 == rt {
        return Ok(r0);
    }
    if phi == 0.0 {
        return Ok(log_mean(r0, rt));
    }

    let v0 = r0.ln();
    let v_t = rt.ln();
    let result = r0 * taylor_integral(v0, v_t, t, phi, order) / t;
    if plausible(result, r0, rt) {
        return Ok(result);
    }

    debug!(r0, rt, t, phi, order, series = result, "bridge series rejected, using Simpson");
    let result = simpson_mean_z(v0, v_t, t, phi, SIMPSON_STEPS);
    if result.is_finite() && result > 0.0 {
        return Ok(result);
    }

    debug!(r0, rt, t, phi, "bridge quadrature failed, using geometric mean");
    Ok((r0 * rt).sqrt())
}

/// Logarithmic mean `(rt − r0) / (ln rt − ln r0)`, the deterministic-path limit.
fn log_mean(r0: f64, rt: f64) -> f64 {
    let d = (rt / r0).ln();
    if d == 0.0 {
        return r0;
    }
    r0 * d.exp_m1() / d
}

fn plausible(result: f64, r0: f64, rt: f64) -> bool {
    result.is_finite() && result > 0.0 && result <= MAX_RATE_MULTIPLIER * r0.max(rt)
}

/// `∫₀ᵗ exp(A·s − B·s²) ds` truncated at `order` Taylor terms.
fn taylor_integral(v0: f64, v_t: f64, t: f64, phi: f64, order: usize) -> f64 {
    let a = (v_t - v0) / t;
    let b = phi / (2.0 * t);
    let big_a = a + b * t;
    let big_b = b;

    let mut sum = 0.0;
    let mut inv_fact = 1.0;
    for k in 0..order {
        if k > 0 {
            inv_fact /= k as f64;
        }
        let mut term = 0.0;
        let mut binom = 1.0;
        for m in 0..=k {
            if m > 0 {
                binom = binom * (k - m + 1) as f64 / m as f64;
            }
            let sign = if m % 2 == 0 { 1.0 } else { -1.0 };
            let p = (k + m) as i32;
            term += binom * sign * big_a.powi((k - m) as i32) * big_b.powi(m as i32)
                * t.powi(p + 1)
                / (p as f64 + 1.0);
        }
        sum += inv_fact * term;
    }
    sum
}

/// `E[exp(V_s)]` for the bridge at time `s`.
fn bridge_mgf(v0: f64, v_t: f64, s: f64, t: f64, phi: f64) -> f64 {
    let mean = v0 + (v_t - v0) * (s / t);
    let var = phi * (s * (t - s) / t);
    (mean + 0.5 * var).exp()
}

fn simpson_weight(i: usize, steps: usize) -> f64 {
    if i == 0 || i == steps {
        1.0
    } else if i % 2 == 1 {
        4.0
    } else {
        2.0
    }
}

/// Simpson-rule estimate of `E[Z]` on log-scale endpoints `v0`, `v_t`.
pub fn simpson_mean_z(v0: f64, v_t: f64, t: f64, phi: f64, steps: usize) -> f64 {
    let mut steps = steps.max(2);
    if steps % 2 == 1 {
        steps += 1;
    }
    let h = t / steps as f64;
    let sum: f64 = (0..=steps)
        .map(|i| simpson_weight(i, steps) * bridge_mgf(v0, v_t, i as f64 * h, t, phi))
        .sum();
    sum * (h / 3.0) / t
}

/// Variance `Var[Z]` of the time-averaged bridged rate.
///
/// Integrates `Cov(e^{V_a}, e^{V_b})` over `[0, t]²` with Simpson's rule on
/// a `steps × steps` grid.
///
/// # Errors
///
/// Returns an error for invalid endpoints (as in [`mean_z`]) or if `steps`
/// is odd or below 2.
pub fn var_z(r0: f64, rt: f64, t: f64, phi: f64, steps: usize) -> Result<f64> {
    check_endpoints(r0, rt, t, phi)?;
    if steps < 2 || steps % 2 != 0 {
        return Err(ClockworkError::InvalidInput(format!(
            "bridge: steps must be even and >= 2, got {}",
            steps
        )));
    }

    let v0 = r0.ln();
    let v_t = rt.ln();
    let h = t / steps as f64;

    let grid: Vec<(f64, f64, f64)> = (0..=steps)
        .map(|i| {
            let s = i as f64 * h;
            let mean = v0 + (v_t - v0) * (s / t);
            let var = phi * (s * (t - s) / t);
            (s, mean, var)
        })
        .collect();

    let mut sum = 0.0;
    for (i, &(a, mean_a, var_a)) in grid.iter().enumerate() {
        let w_i = simpson_weight(i, steps);
        let e_a = (mean_a + 0.5 * var_a).exp();
        for (j, &(b, mean_b, var_b)) in grid.iter().enumerate() {
            let w_j = simpson_weight(j, steps);
            let cov = phi * a.min(b) * (t - a.max(b)) / t;
            let e_b = (mean_b + 0.5 * var_b).exp();
            let e_ab = (mean_a + mean_b + 0.5 * (var_a + var_b + 2.0 * cov)).exp();
            sum += w_i * w_j * (e_ab - e_a * e_b);
        }
    }
    let integral = sum * (h / 3.0) * (h / 3.0);
    Ok(integral / (t * t))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(a: f64, b: f64) -> f64 {
        ((a - b) / b).abs()
    }

    #[test]
    fn deterministic_limit_every_order() {
        let expected = (2.0 - 0.5) / (2.0_f64.ln() - 0.5_f64.ln());
        for order in [1, 2, 5, 10, 30] {
            let m = mean_z(0.5, 2.0, 1.5, 0.0, order).unwrap();
            assert!(rel(m, expected) < 1e-9, "order {}: {} vs {}", order, m, expected);
        }
    }

    #[test]
    fn constant_path_is_exact() {
        for &phi in &[0.0, 0.1, 2.5] {
            for &t in &[0.01, 1.0, 40.0] {
                assert_eq!(mean_z(1.7, 1.7, t, phi, 10).unwrap(), 1.7);
            }
        }
    }

    #[test]
    fn series_agrees_with_simpson() {
        let (r0, rt, t, phi) = (0.5, 2.0, 1.5, 0.3);
        let series = mean_z(r0, rt, t, phi, 20).unwrap();
        let quad = simpson_mean_z(r0.ln(), rt.ln(), t, phi, SIMPSON_STEPS);
        assert!(rel(series, quad) < 1e-6, "{} vs {}", series, quad);
    }

    #[test]
    fn bridge_variance_raises_mean() {
        let det = mean_z(0.8, 1.3, 2.0, 0.0, 10).unwrap();
        let noisy = mean_z(0.8, 1.3, 2.0, 0.5, 10).unwrap();
        assert!(noisy > det);
    }

    #[test]
    fn implausible_series_falls_back() {
        // steep bridge, low order: the series is useless here
        let m = mean_z(1e-3, 1e3, 0.1, 50.0, 3).unwrap();
        assert!(m.is_finite() && m > 0.0);
        assert!(m <= MAX_RATE_MULTIPLIER * 1e3);
    }

    #[test]
    fn invalid_arguments_rejected() {
        assert!(mean_z(1.0, 1.0, 0.0, 0.1, 10).is_err());
        assert!(mean_z(1.0, 1.0, -1.0, 0.1, 10).is_err());
        assert!(mean_z(0.0, 1.0, 1.0, 0.1, 10).is_err());
        assert!(mean_z(1.0, -2.0, 1.0, 0.1, 10).is_err());
        assert!(mean_z(1.0, 2.0, 1.0, 0.1, 0).is_err());
        assert!(mean_z(1.0, 2.0, 1.0, -0.1, 10).is_err());
        assert!(mean_z(1.0, 2.0, 1.0, f64::NAN, 10).is_err());
    }

    #[test]
    fn var_z_zero_without_noise() {
        let v = var_z(2.0, 3.5, 1.0, 0.0, 40).unwrap();
        assert!(v.abs() < 1e-12);
    }

    #[test]
    fn var_z_positive_with_noise() {
        let v = var_z(2.0, 3.5, 1.0, 0.2, 40).unwrap();
        assert!(v > 0.0);
        let finer = var_z(2.0, 3.5, 1.0, 0.2, 200).unwrap();
        assert!(rel(v, finer) < 1e-2);
    }

    #[test]
    fn var_z_step_validation() {
        assert!(var_z(1.0, 1.0, 1.0, 0.1, 0).is_err());
        assert!(var_z(1.0, 1.0, 1.0, 0.1, 3).is_err());
        assert!(var_z(1.0, 1.0, 1.0, 0.1, 2).is_ok());
    }
}
