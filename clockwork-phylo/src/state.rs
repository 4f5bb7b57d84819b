//! Mutable sampler state shared by priors, clocks, and operators.
//!
//! The host owns a [`SamplerState`] and lends it to each component at call
//! time: operators get `&mut`, densities and clocks get `&`. Components never
//! hold references into the state between calls; they remember change stamps
//! instead.

use crate::rate_index::RateFieldIndex;
use crate::tree::{NodeId, TimeTree};
use clockwork_core::{
    Checkpoint, ClockworkError, IntegerParameter, Parameter, RealParameter, Result,
};

/// All parameters the relaxed-clock core reads or writes.
#[derive(Debug, Clone)]
pub struct SamplerState {
    tree: TimeTree,
    /// Shared per-branch vector, one entry per non-root node.
    ///
    /// Positive rates for the SVS prior and the shared-rates clock; log-rates
    /// for the auto-correlated clock.
    pub rates: RealParameter,
    /// Log-rate of the root, if the configuration has one.
    pub root_log_rate: Option<RealParameter>,
    /// Rate-model indicator: 0 = uncorrelated, 1 = autocorrelated.
    pub indicator: IntegerParameter,
    /// Log-scale standard deviation of the uncorrelated lognormal.
    pub ucld_stdev: RealParameter,
    /// Brownian variance rate of the autocorrelated model.
    pub sigma2: RealParameter,
    /// Global rate multiplier (1.0 when absent).
    pub mean_rate: Option<RealParameter>,
    /// Mixture weights over likelihood components.
    pub weights: Option<RealParameter>,
    /// Coupling exponent of the mixture likelihood.
    pub alpha: Option<RealParameter>,
    index: RateFieldIndex,
}

fn check_scalar<T: Copy>(p: &Parameter<T>) -> Result<()> {
    if p.dimension() != 1 {
        return Err(ClockworkError::dimension(p.name().to_string(), 1, p.dimension()));
    }
    Ok(())
}

impl SamplerState {
    /// Create a state with the required parameters.
    pub fn new(
        tree: TimeTree,
        rates: Vec<f64>,
        indicator: i64,
        ucld_stdev: f64,
        sigma2: f64,
    ) -> Result<Self> {
        let index = RateFieldIndex::new(&tree)?;
        index.check_dimension("rates", rates.len())?;
        let rates = RealParameter::new("rates", rates)?;
        Ok(Self {
            tree,
            rates,
            root_log_rate: None,
            indicator: IntegerParameter::scalar("indicator", indicator),
            ucld_stdev: RealParameter::scalar("ucldStdev", ucld_stdev),
            sigma2: RealParameter::scalar("sigma2", sigma2),
            mean_rate: None,
            weights: None,
            alpha: None,
            index,
        })
    }

    /// Attach a root log-rate parameter (dimension 1).
    pub fn with_root_log_rate(mut self, p: RealParameter) -> Result<Self> {
        check_scalar(&p)?;
        self.root_log_rate = Some(p);
        Ok(self)
    }

    /// Attach a global mean-rate multiplier (dimension 1).
    pub fn with_mean_rate(mut self, p: RealParameter) -> Result<Self> {
        check_scalar(&p)?;
        self.mean_rate = Some(p);
        Ok(self)
    }

    /// Attach mixture weights.
    pub fn with_weights(mut self, p: RealParameter) -> Result<Self> {
        self.weights = Some(p);
        Ok(self)
    }

    /// Attach a coupling exponent (dimension 1).
    pub fn with_alpha(mut self, p: RealParameter) -> Result<Self> {
        check_scalar(&p)?;
        self.alpha = Some(p);
        Ok(self)
    }

    /// Time tree; only heights change during a run.
    pub fn tree(&self) -> &TimeTree {
        &self.tree
    }

    /// Set one node height. The topology, and so [`index`](Self::index), is untouched.
    pub fn set_height(&mut self, node: NodeId, height: f64) -> Result<()> {
        self.tree.set_height(node, height)
    }

    /// Multiply every node height by `factor`.
    pub fn scale_heights(&mut self, factor: f64) -> Result<()> {
        self.tree.scale_heights(factor)
    }

    /// Node ↔ slot mapping for [`rates`](Self::rates).
    pub fn index(&self) -> &RateFieldIndex {
        &self.index
    }

    /// Check every dimension constraint.
    pub fn validate(&self) -> Result<()> {
        self.index.check_dimension("rates", self.rates.dimension())?;
        check_scalar(&self.indicator)?;
        check_scalar(&self.ucld_stdev)?;
        check_scalar(&self.sigma2)?;
        for p in [&self.root_log_rate, &self.mean_rate, &self.alpha]
            .into_iter()
            .flatten()
        {
            check_scalar(p)?;
        }
        Ok(())
    }

    /// Value of the shared vector for `node`'s branch; `None` for the root.
    pub fn rate_of(&self, node: NodeId) -> Option<f64> {
        self.index.slot(node).map(|s| self.rates.get(s))
    }

    /// Root log-rate, or 0 when the configuration has none.
    pub fn root_log_rate_or_zero(&self) -> f64 {
        self.root_log_rate.as_ref().map_or(0.0, |p| p.value())
    }

    /// Mean-rate multiplier, or 1 when the configuration has none.
    pub fn mean_rate_or_one(&self) -> f64 {
        self.mean_rate.as_ref().map_or(1.0, |p| p.value())
    }
}

impl Checkpoint for SamplerState {
    fn store(&mut self) {
        self.tree.store();
        self.rates.store();
        self.indicator.store();
        self.ucld_stdev.store();
        self.sigma2.store();
        for p in [
            &mut self.root_log_rate,
            &mut self.mean_rate,
            &mut self.weights,
            &mut self.alpha,
        ]
        .into_iter()
        .flatten()
        {
            p.store();
        }
    }

    fn restore(&mut self) {
        self.tree.restore();
        self.rates.restore();
        self.indicator.restore();
        self.ucld_stdev.restore();
        self.sigma2.restore();
        for p in [
            &mut self.root_log_rate,
            &mut self.mean_rate,
            &mut self.weights,
            &mut self.alpha,
        ]
        .into_iter()
        .flatten()
        {
            p.restore();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> TimeTree {
        TimeTree::from_newick("((A:1,B:1):1,C:2);").unwrap()
    }

    #[test]
    fn rates_dimension_checked() {
        assert!(SamplerState::new(tree(), vec![1.0; 3], 0, 0.5, 0.1).is_err());
        assert!(SamplerState::new(tree(), vec![1.0; 4], 0, 0.5, 0.1).is_ok());
    }

    #[test]
    fn optional_scalars_checked() {
        let s = SamplerState::new(tree(), vec![1.0; 4], 0, 0.5, 0.1).unwrap();
        let bad = RealParameter::new("meanRate", vec![1.0, 2.0]).unwrap();
        assert!(s.clone().with_mean_rate(bad).is_err());
        let s = s.with_root_log_rate(RealParameter::scalar("rootLogRate", 0.3)).unwrap();
        assert_eq!(s.root_log_rate_or_zero(), 0.3);
        assert_eq!(s.mean_rate_or_one(), 1.0);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn rate_of_root_is_none() {
        let s = SamplerState::new(tree(), vec![1.0, 2.0, 3.0, 4.0], 0, 0.5, 0.1).unwrap();
        assert_eq!(s.rate_of(s.tree().root()), None);
        let leaf = s.tree().leaves()[0];
        assert!(s.rate_of(leaf).is_some());
    }

    #[test]
    fn store_restore_round_trip() {
        let mut s = SamplerState::new(tree(), vec![1.0; 4], 0, 0.5, 0.1).unwrap();
        s.store();
        s.rates.set(2, 9.0);
        s.indicator.set(0, 1);
        s.scale_heights(2.0).unwrap();
        s.restore();
        assert_eq!(s.rates.values(), &[1.0; 4]);
        assert_eq!(s.indicator.value(), 0);
        assert!((s.tree().height(s.tree().root()) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn height_edits_keep_slot_mapping() {
        let mut s = SamplerState::new(tree(), vec![1.0, 2.0, 3.0, 4.0], 0, 0.5, 0.1).unwrap();
        let slots: Vec<_> = (0..s.tree().node_count()).map(|n| s.index().slot(n)).collect();
        let stamp = s.tree().stamp();
        let leaf = s.tree().leaves()[0];

        s.set_height(leaf, 0.5).unwrap();
        assert!(s.set_height(s.tree().node_count(), 0.5).is_err());
        s.scale_heights(0.5).unwrap();
        assert_ne!(s.tree().stamp(), stamp);
        assert!((s.tree().height(leaf) - 0.25).abs() < 1e-12);
        for (n, &slot) in slots.iter().enumerate() {
            assert_eq!(s.index().slot(n), slot);
            assert_eq!(s.rate_of(n), slot.map(|i| s.rates.get(i)));
        }
    }
}
