//! Additive shift of every log-rate, root included.

use super::{symmetric_draw, Operator};
use crate::state::SamplerState;
use clockwork_core::{ClockworkError, Result};
use rand::RngCore;

/// Window of [`GlobalLogRateShift`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShiftConfig {
    /// `δ ~ Uniform(−window, window)` (default: 0.1).
    pub window: f64,
}

impl Default for ShiftConfig {
    fn default() -> Self {
        Self { window: 0.1 }
    }
}

/// Adds one `δ` to the root log-rate and to every node log-rate.
///
/// Meant for the auto-correlated clock, where the shared vector holds
/// log-rates. The move is symmetric, so the Hastings ratio is zero.
#[derive(Debug, Clone)]
pub struct GlobalLogRateShift {
    config: ShiftConfig,
    scratch: Vec<f64>,
}

impl GlobalLogRateShift {
    pub fn new(config: ShiftConfig) -> Self {
        Self {
            config,
            scratch: Vec::new(),
        }
    }

    /// Shift by `delta`; `-inf` without writing if any implied rate is invalid.
    pub fn apply(&mut self, state: &mut SamplerState, delta: f64) -> f64 {
        if !(self.config.window > 0.0) || !delta.is_finite() {
            return f64::NEG_INFINITY;
        }
        let Some(root) = state.root_log_rate.as_ref() else {
            return f64::NEG_INFINITY;
        };
        let root_next = root.value() + delta;
        if !valid_log_rate(root_next) {
            return f64::NEG_INFINITY;
        }
        self.scratch.clear();
        for &v in state.rates.values() {
            let next = v + delta;
            if !valid_log_rate(next) {
                return f64::NEG_INFINITY;
            }
            self.scratch.push(next);
        }

        if let Some(root) = state.root_log_rate.as_mut() {
            root.set(0, root_next);
        }
        if state.rates.assign(&self.scratch).is_err() {
            return f64::NEG_INFINITY;
        }
        0.0
    }
}

/// Finite and exponentiates to a finite positive rate.
fn valid_log_rate(v: f64) -> bool {
    let r = v.exp();
    v.is_finite() && r > 0.0 && r.is_finite()
}

impl Default for GlobalLogRateShift {
    fn default() -> Self {
        Self::new(ShiftConfig::default())
    }
}

impl Operator for GlobalLogRateShift {
    fn name(&self) -> &str {
        "GlobalLogRateShift"
    }

    fn init_and_validate(&mut self, state: &SamplerState) -> Result<()> {
        state.validate()?;
        let root = state.root_log_rate.as_ref().ok_or_else(|| {
            ClockworkError::InvalidInput("global shift requires a root log-rate".into())
        })?;
        if !root.is_estimated() {
            return Err(ClockworkError::PinnedParameter(format!(
                "global shift would move fixed parameter {}",
                root.name()
            )));
        }
        Ok(())
    }

    fn proposal(&mut self, state: &mut SamplerState, rng: &mut dyn RngCore) -> f64 {
        let delta = symmetric_draw(rng, self.config.window);
        self.apply(state, delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TimeTree;
    use clockwork_core::RealParameter;

    const TOL: f64 = 1e-12;

    fn state(root: RealParameter) -> SamplerState {
        let tree = TimeTree::from_newick("((A:1,B:1):1,C:2);").unwrap();
        SamplerState::new(tree, vec![0.1, -0.3, 0.2, 0.0], 1, 0.5, 0.1)
            .unwrap()
            .with_root_log_rate(root)
            .unwrap()
    }

    #[test]
    fn shifts_root_and_nodes_together() {
        let mut s = state(RealParameter::scalar("rootLogRate", 0.5));
        let mut op = GlobalLogRateShift::default();
        op.init_and_validate(&s).unwrap();
        assert_eq!(op.apply(&mut s, 0.07), 0.0);
        assert!((s.root_log_rate_or_zero() - 0.57).abs() < TOL);
        let expected = [0.17, -0.23, 0.27, 0.07];
        for (a, b) in s.rates.values().iter().zip(expected) {
            assert!((a - b).abs() < TOL);
        }
    }

    #[test]
    fn pinned_root_refused() {
        let s = state(RealParameter::scalar("rootLogRate", 0.0).fixed());
        let mut op = GlobalLogRateShift::default();
        let err = op.init_and_validate(&s).unwrap_err();
        assert!(matches!(err, ClockworkError::PinnedParameter(_)));
    }

    #[test]
    fn overflow_rejected_without_writing() {
        let mut s = state(RealParameter::scalar("rootLogRate", 0.0));
        s.rates.set(0, 709.0);
        let before = s.rates.values().to_vec();
        let mut op = GlobalLogRateShift::default();
        assert_eq!(op.apply(&mut s, 5.0), f64::NEG_INFINITY);
        assert_eq!(s.rates.values(), before.as_slice());
        assert_eq!(s.root_log_rate_or_zero(), 0.0);

        let mut zero = GlobalLogRateShift::new(ShiftConfig { window: 0.0 });
        assert_eq!(zero.apply(&mut s, 0.01), f64::NEG_INFINITY);
    }
}
