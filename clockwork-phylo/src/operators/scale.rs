//! Multiplicative moves on positive branch rates.

use super::{symmetric_draw, Operator};
use crate::state::SamplerState;
use crate::tree::NodeId;
use clockwork_core::{ClockworkError, Result};
use rand::{Rng, RngCore};

/// Window of a multiplicative move on the log scale.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScaleConfig {
    /// `ε ~ Uniform(−window, window)`; the rate is multiplied by `exp(ε)`.
    pub window: f64,
}

impl ScaleConfig {
    /// Default for [`SingleRateScale`].
    pub const SINGLE: Self = Self { window: 0.3 };
    /// Default for [`SubtreeRateScale`].
    pub const SUBTREE: Self = Self { window: 0.5 };
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self::SINGLE
    }
}

fn check_rates(state: &SamplerState) -> Result<()> {
    state.validate()?;
    if state.index().is_empty() {
        return Err(ClockworkError::InvalidInput(
            "rate scale move needs at least one non-root branch".into(),
        ));
    }
    Ok(())
}

/// `r · exp(ε)` if that is a valid positive rate.
fn scaled(r: f64, eps: f64) -> Option<f64> {
    if !(r > 0.0) {
        return None;
    }
    let next = r * eps.exp();
    (next > 0.0 && next.is_finite()).then_some(next)
}

/// Scales one uniformly chosen rate.
#[derive(Debug, Clone)]
pub struct SingleRateScale {
    config: ScaleConfig,
}

impl SingleRateScale {
    pub fn new(config: ScaleConfig) -> Self {
        Self { config }
    }

    /// Scale entry `index` by `exp(eps)`.
    ///
    /// Returns `eps`, or `-inf` without touching the state if the window,
    /// index, or resulting rate is invalid.
    pub fn apply(&self, state: &mut SamplerState, index: usize, eps: f64) -> f64 {
        if !(self.config.window > 0.0) || index >= state.rates.dimension() {
            return f64::NEG_INFINITY;
        }
        match scaled(state.rates.get(index), eps) {
            Some(next) => {
                state.rates.set(index, next);
                eps
            }
            None => f64::NEG_INFINITY,
        }
    }
}

impl Default for SingleRateScale {
    fn default() -> Self {
        Self::new(ScaleConfig::SINGLE)
    }
}

impl Operator for SingleRateScale {
    fn name(&self) -> &str {
        "SingleRateScale"
    }

    fn init_and_validate(&mut self, state: &SamplerState) -> Result<()> {
        check_rates(state)
    }

    fn proposal(&mut self, state: &mut SamplerState, rng: &mut dyn RngCore) -> f64 {
        let n = state.rates.dimension();
        if n == 0 {
            return f64::NEG_INFINITY;
        }
        let index = rng.gen_range(0..n);
        let eps = symmetric_draw(rng, self.config.window);
        self.apply(state, index, eps)
    }
}

/// Scales every rate in the subtree below a uniformly chosen non-root node.
#[derive(Debug, Clone)]
pub struct SubtreeRateScale {
    config: ScaleConfig,
    scratch: Vec<(usize, f64)>,
}

impl SubtreeRateScale {
    pub fn new(config: ScaleConfig) -> Self {
        Self {
            config,
            scratch: Vec::new(),
        }
    }

    /// Scale all rates under `sub_root` (inclusive) by `exp(eps)`.
    ///
    /// Returns `count · eps`, or `-inf` if `sub_root` is the root or any
    /// scaled rate would be invalid. Nothing is written on rejection.
    pub fn apply(&mut self, state: &mut SamplerState, sub_root: NodeId, eps: f64) -> f64 {
        if !(self.config.window > 0.0) || state.index().slot(sub_root).is_none() {
            return f64::NEG_INFINITY;
        }
        self.scratch.clear();
        for node in state.tree().iter_subtree(sub_root) {
            let Some(slot) = state.index().slot(node) else {
                continue;
            };
            match scaled(state.rates.get(slot), eps) {
                Some(next) => self.scratch.push((slot, next)),
                None => return f64::NEG_INFINITY,
            }
        }
        let mut rates = state.rates.edit();
        for &(slot, next) in &self.scratch {
            rates[slot] = next;
        }
        self.scratch.len() as f64 * eps
    }
}

impl Default for SubtreeRateScale {
    fn default() -> Self {
        Self::new(ScaleConfig::SUBTREE)
    }
}

impl Operator for SubtreeRateScale {
    fn name(&self) -> &str {
        "SubtreeRateScale"
    }

    fn init_and_validate(&mut self, state: &SamplerState) -> Result<()> {
        check_rates(state)
    }

    fn proposal(&mut self, state: &mut SamplerState, rng: &mut dyn RngCore) -> f64 {
        let n = state.index().len();
        if n == 0 {
            return f64::NEG_INFINITY;
        }
        let sub_root = state.index().node(rng.gen_range(0..n));
        let eps = symmetric_draw(rng, self.config.window);
        self.apply(state, sub_root, eps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TimeTree;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const TOL: f64 = 1e-12;

    fn state() -> SamplerState {
        let tree = TimeTree::from_newick("((A:1,B:1):1,(C:0.5,D:0.5):1.5);").unwrap();
        SamplerState::new(tree, vec![0.5, 1.0, 1.5, 2.0, 2.5, 3.0], 0, 0.5, 0.1).unwrap()
    }

    #[test]
    fn single_scale_is_reversible() {
        let mut s = state();
        let before = s.rates.values().to_vec();
        let op = SingleRateScale::default();
        let forward = op.apply(&mut s, 3, 0.21);
        assert!((s.rates.get(3) - 2.0 * 0.21f64.exp()).abs() < TOL);
        let back = op.apply(&mut s, 3, -0.21);
        assert!((forward + back).abs() < TOL);
        for (a, b) in s.rates.values().iter().zip(&before) {
            assert!((a - b).abs() < TOL);
        }
    }

    #[test]
    fn single_scale_rejects_without_writing() {
        let mut s = state();
        s.rates.set(1, 0.0);
        let stamp = s.rates.stamp();
        let op = SingleRateScale::default();
        assert_eq!(op.apply(&mut s, 1, 0.1), f64::NEG_INFINITY);
        assert_eq!(op.apply(&mut s, 2, 1e4), f64::NEG_INFINITY);
        assert_eq!(op.apply(&mut s, 99, 0.1), f64::NEG_INFINITY);
        assert!(!s.rates.is_dirty_since(stamp));

        let zero = SingleRateScale::new(ScaleConfig { window: 0.0 });
        assert_eq!(zero.apply(&mut s, 2, 0.1), f64::NEG_INFINITY);
    }

    #[test]
    fn subtree_scale_counts_nodes() {
        let mut s = state();
        let leaf = s.tree().leaves()[0];
        let internal = s.tree().parent(leaf).unwrap();
        let mut op = SubtreeRateScale::default();
        let hr = op.apply(&mut s, internal, 0.1);
        assert!((hr - 3.0 * 0.1).abs() < TOL);

        let hr = op.apply(&mut s, leaf, -0.2);
        assert!((hr + 0.2).abs() < TOL);
    }

    #[test]
    fn subtree_scale_reversible() {
        let mut s = state();
        let before = s.rates.values().to_vec();
        let node = s.index().node(0);
        let mut op = SubtreeRateScale::default();
        let a = op.apply(&mut s, node, 0.37);
        let b = op.apply(&mut s, node, -0.37);
        assert!((a + b).abs() < TOL);
        for (x, y) in s.rates.values().iter().zip(&before) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn subtree_scale_is_all_or_nothing() {
        let mut s = state();
        let leaf = s.tree().leaves()[0];
        let internal = s.tree().parent(leaf).unwrap();
        let slot = s.index().slot(leaf).unwrap();
        s.rates.set(slot, -1.0);
        let before = s.rates.values().to_vec();
        let mut op = SubtreeRateScale::default();
        assert_eq!(op.apply(&mut s, internal, 0.1), f64::NEG_INFINITY);
        assert_eq!(s.rates.values(), before.as_slice());
        let root = s.tree().root();
        assert_eq!(op.apply(&mut s, root, 0.1), f64::NEG_INFINITY);
    }

    #[test]
    fn random_proposals_stay_positive() {
        let mut s = state();
        let mut rng = StdRng::seed_from_u64(17);
        let mut single = SingleRateScale::default();
        let mut subtree = SubtreeRateScale::default();
        single.init_and_validate(&s).unwrap();
        subtree.init_and_validate(&s).unwrap();
        for _ in 0..500 {
            let a = single.proposal(&mut s, &mut rng);
            let b = subtree.proposal(&mut s, &mut rng);
            assert!(a.abs() <= 0.3);
            assert!(b.is_finite());
        }
        assert!(s.rates.values().iter().all(|&r| r > 0.0 && r.is_finite()));
    }
}
