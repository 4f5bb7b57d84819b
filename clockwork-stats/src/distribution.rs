//! Probability distributions used by the relaxed-clock priors.
//!
//! Provides the [`Distribution`] trait and implementations for [`Normal`] and
//! [`LogNormal`], plus the [`Categorical`] model prior over indicator
//! categories. Densities are evaluated in log space; invalid arguments at
//! evaluation time give `f64::NEG_INFINITY` rather than an error.

use core::f64::consts::{PI, SQRT_2};

use clockwork_core::{ClockworkError, Result};
use rand::Rng;
use rand_distr::StandardNormal;

/// `0.5 * ln(2π)`.
pub const HALF_LN_2PI: f64 = 0.918_938_533_204_672_8;

// ── Numerical helpers ──────────────────────────────────────────────────────

/// Error function via Abramowitz & Stegun 7.1.26 (max error ~1.5e-7).
pub fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}

// ── Distribution trait ─────────────────────────────────────────────────────

/// A continuous probability distribution.
pub trait Distribution {
    /// Log density at `x`; `-inf` outside the support.
    fn ln_pdf(&self, x: f64) -> f64;

    /// Probability density at `x`.
    fn pdf(&self, x: f64) -> f64 {
        self.ln_pdf(x).exp()
    }

    /// Cumulative distribution function at `x`.
    fn cdf(&self, x: f64) -> f64;

    /// Distribution mean.
    fn mean(&self) -> f64;

    /// Distribution variance.
    fn variance(&self) -> f64;

    /// Distribution standard deviation (default: sqrt of variance).
    fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Draw one value.
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64;
}

// ── Normal distribution ────────────────────────────────────────────────────

/// Normal (Gaussian) distribution with parameters μ and σ.
#[derive(Debug, Clone, Copy)]
pub struct Normal {
    mu: f64,
    sigma: f64,
}

impl Normal {
    /// Create a new Normal distribution. `sigma` must be positive and finite.
    pub fn new(mu: f64, sigma: f64) -> Result<Self> {
        if !(sigma > 0.0 && sigma.is_finite()) || !mu.is_finite() {
            return Err(ClockworkError::InvalidInput(
                "Normal: sigma must be positive and mu finite".into(),
            ));
        }
        Ok(Self { mu, sigma })
    }

    /// Normal parameterized by its variance.
    pub fn from_variance(mu: f64, var: f64) -> Result<Self> {
        if !(var > 0.0) {
            return Err(ClockworkError::InvalidInput(
                "Normal: variance must be positive".into(),
            ));
        }
        Self::new(mu, var.sqrt())
    }

    /// Standard normal distribution N(0, 1).
    pub fn standard() -> Self {
        Self {
            mu: 0.0,
            sigma: 1.0,
        }
    }
}

impl Distribution for Normal {
    fn ln_pdf(&self, x: f64) -> f64 {
        let z = (x - self.mu) / self.sigma;
        -HALF_LN_2PI - self.sigma.ln() - 0.5 * z * z
    }

    fn cdf(&self, x: f64) -> f64 {
        let z = (x - self.mu) / self.sigma;
        0.5 * (1.0 + erf(z / SQRT_2))
    }

    fn mean(&self) -> f64 {
        self.mu
    }

    fn variance(&self) -> f64 {
        self.sigma * self.sigma
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let z: f64 = rng.sample(StandardNormal);
        self.mu + self.sigma * z
    }
}

// ── Log-normal distribution ────────────────────────────────────────────────

/// Log-normal distribution: `ln X ~ Normal(mu, sigma)`.
#[derive(Debug, Clone, Copy)]
pub struct LogNormal {
    mu: f64,
    sigma: f64,
}

impl LogNormal {
    /// Create a new log-normal distribution. `sigma` must be positive.
    pub fn new(mu: f64, sigma: f64) -> Result<Self> {
        if !(sigma > 0.0 && sigma.is_finite()) || !mu.is_finite() {
            return Err(ClockworkError::InvalidInput(
                "LogNormal: sigma must be positive and mu finite".into(),
            ));
        }
        Ok(Self { mu, sigma })
    }

    /// Log-normal with unit mean: `mu = -sigma² / 2`.
    pub fn mean_one(sigma: f64) -> Result<Self> {
        Self::new(-0.5 * sigma * sigma, sigma)
    }

    /// Location of the underlying normal.
    pub fn mu(&self) -> f64 {
        self.mu
    }

    /// Scale of the underlying normal.
    pub fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl Distribution for LogNormal {
    fn ln_pdf(&self, x: f64) -> f64 {
        if !(x > 0.0) || !x.is_finite() {
            return f64::NEG_INFINITY;
        }
        let lx = x.ln();
        let z = (lx - self.mu) / self.sigma;
        -lx - self.sigma.ln() - HALF_LN_2PI - 0.5 * z * z
    }

    fn cdf(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return 0.0;
        }
        let z = (x.ln() - self.mu) / self.sigma;
        0.5 * (1.0 + erf(z / SQRT_2))
    }

    fn mean(&self) -> f64 {
        (self.mu + 0.5 * self.sigma * self.sigma).exp()
    }

    fn variance(&self) -> f64 {
        let s2 = self.sigma * self.sigma;
        (s2.exp() - 1.0) * (2.0 * self.mu + s2).exp()
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let z: f64 = rng.sample(StandardNormal);
        (self.mu + self.sigma * z).exp()
    }
}

// ── Categorical distribution ───────────────────────────────────────────────

/// Tolerance on `Σp = 1` for a categorical probability vector.
pub const CATEGORICAL_SUM_TOL: f64 = 1e-8;

/// Categorical distribution over `K` categories.
///
/// The probability vector is only checked when a log-mass is requested, so a
/// sampler may move it freely; an invalid vector gives `-inf`.
#[derive(Debug, Clone)]
pub struct Categorical {
    probs: Vec<f64>,
    one_indexed: bool,
}

impl Categorical {
    /// Zero-indexed categorical. `probs` must be non-empty.
    pub fn new(probs: Vec<f64>) -> Result<Self> {
        if probs.is_empty() {
            return Err(ClockworkError::InvalidInput(
                "Categorical: need at least one category".into(),
            ));
        }
        Ok(Self {
            probs,
            one_indexed: false,
        })
    }

    /// Interpret categories as `1..=K` instead of `0..K`.
    pub fn one_indexed(mut self) -> Self {
        self.one_indexed = true;
        self
    }

    /// Two-category model prior with `P(1) = p_one`.
    pub fn bernoulli(p_one: f64) -> Self {
        Self {
            probs: vec![1.0 - p_one, p_one],
            one_indexed: false,
        }
    }

    /// Number of categories.
    pub fn categories(&self) -> usize {
        self.probs.len()
    }

    pub fn probs(&self) -> &[f64] {
        &self.probs
    }

    /// Replace the probability vector; the number of categories must not change.
    pub fn set_probs(&mut self, probs: &[f64]) -> Result<()> {
        if probs.len() != self.probs.len() {
            return Err(ClockworkError::dimension(
                "categorical probabilities",
                self.probs.len(),
                probs.len(),
            ));
        }
        self.probs.copy_from_slice(probs);
        Ok(())
    }

    /// True if every entry is finite and non-negative and the entries sum to 1.
    pub fn is_valid(&self) -> bool {
        let mut sum = 0.0;
        for &p in &self.probs {
            if !(p >= 0.0) || !p.is_finite() {
                return false;
            }
            sum += p;
        }
        (sum - 1.0).abs() <= CATEGORICAL_SUM_TOL
    }

    /// Log probability of category `x`.
    pub fn ln_pmf(&self, x: i64) -> f64 {
        if !self.is_valid() {
            return f64::NEG_INFINITY;
        }
        self.ln_pmf_unchecked(x)
    }

    /// Sum of log probabilities of independent draws `xs`.
    pub fn ln_pmf_all(&self, xs: &[i64]) -> f64 {
        if !self.is_valid() {
            return f64::NEG_INFINITY;
        }
        let mut total = 0.0;
        for &x in xs {
            let lp = self.ln_pmf_unchecked(x);
            if lp == f64::NEG_INFINITY {
                return lp;
            }
            total += lp;
        }
        total
    }

    fn ln_pmf_unchecked(&self, x: i64) -> f64 {
        let idx = if self.one_indexed { x - 1 } else { x };
        if idx < 0 || idx as usize >= self.probs.len() {
            return f64::NEG_INFINITY;
        }
        let p = self.probs[idx as usize];
        if p > 0.0 {
            p.ln()
        } else {
            f64::NEG_INFINITY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const TOL: f64 = 1e-10;

    #[test]
    fn erf_zero() {
        assert!(erf(0.0).abs() < 1e-7);
    }

    #[test]
    fn erf_negative_symmetry() {
        assert!((erf(-0.7) + erf(0.7)).abs() < 1e-7);
    }

    #[test]
    fn normal_standard_ln_pdf_at_zero() {
        let n = Normal::standard();
        assert!((n.ln_pdf(0.0) + HALF_LN_2PI).abs() < TOL);
        assert!((n.pdf(0.0) - 1.0 / (2.0 * PI).sqrt()).abs() < TOL);
    }

    #[test]
    fn normal_standard_cdf() {
        let n = Normal::standard();
        assert!((n.cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((n.cdf(1.96) - 0.975).abs() < 1e-3);
    }

    #[test]
    fn normal_invalid_sigma() {
        assert!(Normal::new(0.0, 0.0).is_err());
        assert!(Normal::new(0.0, -1.0).is_err());
        assert!(Normal::new(f64::NAN, 1.0).is_err());
        assert!(Normal::from_variance(0.0, 0.0).is_err());
    }

    #[test]
    fn normal_from_variance() {
        let n = Normal::from_variance(1.0, 4.0).unwrap();
        assert!((n.std_dev() - 2.0).abs() < TOL);
    }

    #[test]
    fn lognormal_mean_one() {
        let d = LogNormal::mean_one(0.8).unwrap();
        assert!((d.mean() - 1.0).abs() < TOL);
        assert!((d.mu() + 0.32).abs() < TOL);
    }

    #[test]
    fn lognormal_density_matches_change_of_variables() {
        let d = LogNormal::new(-0.1, 0.5).unwrap();
        let n = Normal::new(-0.1, 0.5).unwrap();
        let x: f64 = 1.7;
        assert!((d.ln_pdf(x) - (n.ln_pdf(x.ln()) - x.ln())).abs() < TOL);
    }

    #[test]
    fn lognormal_outside_support() {
        let d = LogNormal::mean_one(0.5).unwrap();
        assert_eq!(d.ln_pdf(0.0), f64::NEG_INFINITY);
        assert_eq!(d.ln_pdf(-1.0), f64::NEG_INFINITY);
        assert_eq!(d.cdf(0.0), 0.0);
    }

    #[test]
    fn lognormal_sample_mean() {
        let d = LogNormal::mean_one(0.3).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let m: f64 = (0..n).map(|_| d.sample(&mut rng)).sum::<f64>() / n as f64;
        assert!((m - 1.0).abs() < 0.02);
    }

    #[test]
    fn categorical_basic() {
        let c = Categorical::new(vec![0.2, 0.8]).unwrap();
        assert!((c.ln_pmf(0) - 0.2_f64.ln()).abs() < TOL);
        assert!((c.ln_pmf(1) - 0.8_f64.ln()).abs() < TOL);
        assert_eq!(c.ln_pmf(2), f64::NEG_INFINITY);
        assert_eq!(c.ln_pmf(-1), f64::NEG_INFINITY);
    }

    #[test]
    fn categorical_one_indexed() {
        let c = Categorical::new(vec![0.25, 0.75]).unwrap().one_indexed();
        assert_eq!(c.ln_pmf(0), f64::NEG_INFINITY);
        assert!((c.ln_pmf(2) - 0.75_f64.ln()).abs() < TOL);
    }

    #[test]
    fn categorical_invalid_vector_is_neg_inf() {
        let mut c = Categorical::new(vec![0.5, 0.4]).unwrap();
        assert!(!c.is_valid());
        assert_eq!(c.ln_pmf(0), f64::NEG_INFINITY);
        c.set_probs(&[-0.1, 1.1]).unwrap();
        assert_eq!(c.ln_pmf(1), f64::NEG_INFINITY);
        c.set_probs(&[f64::NAN, 1.0]).unwrap();
        assert_eq!(c.ln_pmf(1), f64::NEG_INFINITY);
        assert!(c.set_probs(&[1.0]).is_err());
    }

    #[test]
    fn categorical_zero_probability_category() {
        let c = Categorical::new(vec![0.0, 1.0]).unwrap();
        assert_eq!(c.ln_pmf(0), f64::NEG_INFINITY);
        assert_eq!(c.ln_pmf(1), 0.0);
    }

    #[test]
    fn categorical_independent_draws_add() {
        let c = Categorical::bernoulli(0.3);
        let lp = c.ln_pmf_all(&[0, 1, 1]);
        assert!((lp - (0.7_f64.ln() + 2.0 * 0.3_f64.ln())).abs() < TOL);
        assert_eq!(c.ln_pmf_all(&[0, 5]), f64::NEG_INFINITY);
    }

    #[test]
    fn categorical_empty_rejected() {
        assert!(Categorical::new(vec![]).is_err());
    }
}
