//! Rao-Blackwellized running estimators.
//!
//! Instead of averaging a quantity only over the samples where a model was
//! selected, each sample contributes its posterior model probability as a
//! weight: `E[θ | M] ≈ Σ wᵢ·θᵢ / Σ wᵢ`.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Ratio-of-sums estimator of a conditional posterior mean.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RaoBlackwellEstimator {
    num: f64,
    den: f64,
    count: u64,
    burnin: u64,
}

impl RaoBlackwellEstimator {
    /// Estimator that ignores samples with index `< burnin`.
    pub fn new(burnin: u64) -> Self {
        Self {
            burnin,
            ..Self::default()
        }
    }

    /// Add one sample. Non-finite weights or values are skipped.
    pub fn record(&mut self, sample: u64, weight: f64, value: f64) {
        if sample < self.burnin || !weight.is_finite() || !value.is_finite() {
            return;
        }
        self.num += weight * value;
        self.den += weight;
        self.count += 1;
    }

    /// `Σ w·θ / Σ w`, or `None` if no weight has been accumulated.
    pub fn estimate(&self) -> Option<f64> {
        if self.den > 0.0 {
            Some(self.num / self.den)
        } else {
            None
        }
    }

    /// Mean weight per recorded sample (a posterior model probability when
    /// the weights are responsibilities).
    pub fn mean_weight(&self) -> Option<f64> {
        if self.count > 0 {
            Some(self.den / self.count as f64)
        } else {
            None
        }
    }

    pub fn numerator(&self) -> f64 {
        self.num
    }

    pub fn denominator(&self) -> f64 {
        self.den
    }

    /// Number of samples that contributed.
    pub fn count(&self) -> u64 {
        self.count
    }
}
