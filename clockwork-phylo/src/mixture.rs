//! K-component mixture likelihood with an optional coupling exponent.
//!
//! ```text
//! logMix = logsumexp_k( ln w_k + logL_k )      over w_k > 0 and finite logL_k
//! total  = logMix + α · Σ_k logL_k              (α > 0: every logL_k must be finite)
//! ```
//!
//! The mixture term is weight-gated while the coupling term covers every
//! component; with `α > 0` a single non-finite component collapses the total
//! to `-inf` even if its weight is zero.

use crate::state::SamplerState;
use clockwork_core::prob::{log_sum_exp, normalize_log_weights};
use clockwork_core::{ClockworkError, LikelihoodComponent, Result};
use tracing::warn;

/// Weight sums further than this from one trigger a warning.
pub const WEIGHT_SUM_TOL: f64 = 1e-6;

/// Mixture log-density from explicit weights and component log-likelihoods.
///
/// Returns `-inf` when the slices differ in length, when no positive-weight
/// component is finite, or when `alpha > 0` and any component is non-finite.
pub fn mixture_log_density(weights: &[f64], log_ls: &[f64], alpha: f64) -> f64 {
    if weights.len() != log_ls.len() {
        return f64::NEG_INFINITY;
    }
    MixtureTerms::compute(weights, log_ls, alpha).total
}

/// `ln w + logL` if the component contributes to the mixture, else `-inf`.
fn log_term(w: f64, log_l: f64) -> f64 {
    if w > 0.0 && log_l.is_finite() {
        w.ln() + log_l
    } else {
        f64::NEG_INFINITY
    }
}

/// Full breakdown of one mixture evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct MixtureTerms {
    pub weights: Vec<f64>,
    /// Component log-likelihoods.
    pub log_l: Vec<f64>,
    /// `ln w_k + logL_k`, or `-inf` for excluded components.
    pub log_s: Vec<f64>,
    pub log_mix: f64,
    pub alpha: f64,
    /// `α · Σ logL_k`; 0 when `α == 0`, `-inf` when a component is non-finite.
    pub coupling: f64,
    pub total: f64,
    /// Posterior component probabilities; `None` when no component qualifies.
    pub responsibilities: Option<Vec<f64>>,
    /// Max logL over positive-weight, finite components.
    pub max_log_l: f64,
    /// Max logS over positive-weight, finite components.
    pub max_log_s: f64,
}

impl MixtureTerms {
    /// Evaluate every term. `weights` and `log_ls` must have equal length.
    pub fn compute(weights: &[f64], log_ls: &[f64], alpha: f64) -> Self {
        let log_s: Vec<f64> = weights
            .iter()
            .zip(log_ls)
            .map(|(&w, &l)| log_term(w, l))
            .collect();
        let log_mix = log_sum_exp(&log_s);

        let coupling = if alpha > 0.0 {
            if log_ls.iter().all(|l| l.is_finite()) {
                alpha * log_ls.iter().sum::<f64>()
            } else {
                f64::NEG_INFINITY
            }
        } else {
            0.0
        };
        let total = if log_mix.is_finite() && coupling.is_finite() {
            log_mix + coupling
        } else {
            f64::NEG_INFINITY
        };

        let mut max_log_l = f64::NEG_INFINITY;
        let mut max_log_s = f64::NEG_INFINITY;
        for ((&l, &s), &w) in log_ls.iter().zip(&log_s).zip(weights) {
            if w > 0.0 && l.is_finite() {
                max_log_l = max_log_l.max(l);
                max_log_s = max_log_s.max(s);
            }
        }

        let responsibilities = normalize_log_weights(&log_s);
        Self {
            weights: weights.to_vec(),
            log_l: log_ls.to_vec(),
            log_s,
            log_mix,
            alpha,
            coupling,
            total,
            responsibilities,
            max_log_l,
            max_log_s,
        }
    }

    pub fn k(&self) -> usize {
        self.log_l.len()
    }

    pub fn sum_weights(&self) -> f64 {
        self.weights.iter().sum()
    }
}

/// Mixture over owned likelihood components, reading weights and the
/// coupling exponent from the sampler state.
pub struct MixtureLikelihood {
    components: Vec<Box<dyn LikelihoodComponent>>,
}

impl std::fmt::Debug for MixtureLikelihood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixtureLikelihood")
            .field("components", &self.components.len())
            .finish()
    }
}

impl MixtureLikelihood {
    /// Validate the mixture configuration.
    ///
    /// Needs at least two components, a weights parameter of matching
    /// dimension with no negative entry, and (if present) a scalar alpha.
    pub fn new(
        state: &SamplerState,
        components: Vec<Box<dyn LikelihoodComponent>>,
    ) -> Result<Self> {
        let k = components.len();
        if k < 2 {
            return Err(ClockworkError::InvalidInput(format!(
                "mixture needs at least two components, found {}",
                k
            )));
        }
        let weights = state.weights.as_ref().ok_or_else(|| {
            ClockworkError::InvalidInput("mixture requires a weights parameter".into())
        })?;
        if weights.dimension() != k {
            return Err(ClockworkError::dimension("weights", k, weights.dimension()));
        }
        if let Some((i, w)) = weights.values().iter().enumerate().find(|&(_, &w)| w < 0.0) {
            return Err(ClockworkError::InvalidInput(format!(
                "negative mixture weight w[{}] = {}",
                i, w
            )));
        }
        if let Some(alpha) = state.alpha.as_ref() {
            if alpha.dimension() != 1 {
                return Err(ClockworkError::dimension("alpha", 1, alpha.dimension()));
            }
        }
        let sum: f64 = weights.values().iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOL {
            warn!(sum, "mixture weights do not sum to 1");
        }
        Ok(Self { components })
    }

    pub fn k(&self) -> usize {
        self.components.len()
    }

    fn alpha(state: &SamplerState) -> f64 {
        state.alpha.as_ref().map_or(0.0, |a| a.value())
    }

    fn weights(state: &SamplerState) -> &[f64] {
        state.weights.as_ref().map(|w| w.values()).unwrap_or(&[])
    }

    /// Mixture log-density, evaluating only the components it needs.
    pub fn calculate_log_p(&mut self, state: &SamplerState) -> f64 {
        let alpha = Self::alpha(state);
        let weights = Self::weights(state);
        let coupled = alpha > 0.0;

        let mut log_s = Vec::with_capacity(self.components.len());
        let mut sum_log_l = 0.0;
        for (i, component) in self.components.iter_mut().enumerate() {
            let w = weights.get(i).copied().unwrap_or(0.0);
            if !coupled && !(w > 0.0) {
                log_s.push(f64::NEG_INFINITY);
                continue;
            }
            let l = component.log_likelihood();
            if coupled {
                if !l.is_finite() {
                    warn!(component = i, log_l = l, "non-finite component with alpha > 0");
                    return f64::NEG_INFINITY;
                }
                sum_log_l += l;
            }
            log_s.push(log_term(w, l));
        }

        let log_mix = log_sum_exp(&log_s);
        if !log_mix.is_finite() {
            warn!("no positive-weight component is finite");
            return f64::NEG_INFINITY;
        }
        if coupled {
            log_mix + alpha * sum_log_l
        } else {
            log_mix
        }
    }

    /// Evaluate every component and return the full breakdown.
    pub fn terms(&mut self, state: &SamplerState) -> MixtureTerms {
        let log_ls: Vec<f64> = self
            .components
            .iter_mut()
            .map(|c| c.log_likelihood())
            .collect();
        let mut weights = Self::weights(state).to_vec();
        weights.resize(log_ls.len(), 0.0);
        MixtureTerms::compute(&weights, &log_ls, Self::alpha(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TimeTree;
    use clockwork_core::RealParameter;
    use std::cell::Cell;
    use std::rc::Rc;

    const TOL: f64 = 1e-6;

    fn state(weights: Vec<f64>, alpha: Option<f64>) -> SamplerState {
        let tree = TimeTree::from_newick("(A:1,B:1);").unwrap();
        let s = SamplerState::new(tree, vec![1.0, 1.0], 0, 0.5, 0.1)
            .unwrap()
            .with_weights(RealParameter::new("weights", weights).unwrap())
            .unwrap();
        match alpha {
            Some(a) => s.with_alpha(RealParameter::scalar("alpha", a)).unwrap(),
            None => s,
        }
    }

    fn counted(value: f64, calls: &Rc<Cell<usize>>) -> Box<dyn LikelihoodComponent> {
        let calls = Rc::clone(calls);
        Box::new(move || {
            calls.set(calls.get() + 1);
            value
        })
    }

    #[test]
    fn equal_components_add_ln_two() {
        let lp = mixture_log_density(&[0.5, 0.5], &[-10.0, -10.0], 0.0);
        assert!((lp - (-9.306853)).abs() < TOL);
    }

    #[test]
    fn coupling_requires_every_component_finite() {
        assert_eq!(
            mixture_log_density(&[0.0, 1.0], &[f64::NAN, -5.0], 0.3),
            f64::NEG_INFINITY
        );
        assert_eq!(
            mixture_log_density(&[0.0, 1.0], &[f64::NEG_INFINITY, -5.0], 0.3),
            f64::NEG_INFINITY
        );
        // without coupling the zero-weight component is simply excluded
        assert!((mixture_log_density(&[0.0, 1.0], &[f64::NAN, -5.0], 0.0) + 5.0).abs() < TOL);
    }

    #[test]
    fn coupling_term_added() {
        let lp = mixture_log_density(&[0.5, 0.5], &[-10.0, -12.0], 0.5);
        let mix = log_sum_exp(&[0.5f64.ln() - 10.0, 0.5f64.ln() - 12.0]);
        assert!((lp - (mix + 0.5 * -22.0)).abs() < TOL);
    }

    #[test]
    fn nothing_qualifies_is_neg_inf() {
        assert_eq!(
            mixture_log_density(&[0.0, 0.0], &[-1.0, -2.0], 0.0),
            f64::NEG_INFINITY
        );
        assert_eq!(
            mixture_log_density(&[0.5, 0.5], &[f64::NAN, f64::NEG_INFINITY], 0.0),
            f64::NEG_INFINITY
        );
        assert_eq!(mixture_log_density(&[1.0], &[-1.0, -2.0], 0.0), f64::NEG_INFINITY);
    }

    #[test]
    fn terms_breakdown() {
        let t = MixtureTerms::compute(&[0.25, 0.75, 0.0], &[-3.0, -4.0, -1.0], 0.0);
        assert_eq!(t.k(), 3);
        assert!((t.sum_weights() - 1.0).abs() < TOL);
        assert_eq!(t.log_s[2], f64::NEG_INFINITY);
        assert_eq!(t.max_log_l, -3.0);
        assert!((t.max_log_s - (0.75f64.ln() - 4.0)).abs() < TOL);
        let r = t.responsibilities.as_ref().unwrap();
        assert!((r.iter().sum::<f64>() - 1.0).abs() < TOL);
        assert_eq!(r[2], 0.0);
        assert!(t.log_mix <= t.max_log_l + 1e-10);
        assert!(t.log_mix >= t.max_log_s);
    }

    #[test]
    fn responsibilities_undefined_without_finite_terms() {
        let t = MixtureTerms::compute(&[0.0, 0.0], &[-1.0, -1.0], 0.0);
        assert!(t.responsibilities.is_none());
        assert_eq!(t.total, f64::NEG_INFINITY);
    }

    #[test]
    fn configuration_checked() {
        let ok = |v: f64| -> Box<dyn LikelihoodComponent> { Box::new(move || v) };
        let s = state(vec![0.5, 0.5], None);
        assert!(MixtureLikelihood::new(&s, vec![ok(-1.0)]).is_err());
        assert!(MixtureLikelihood::new(&s, vec![ok(-1.0), ok(-2.0), ok(-3.0)]).is_err());
        let neg = state(vec![-0.5, 1.5], None);
        assert!(MixtureLikelihood::new(&neg, vec![ok(-1.0), ok(-2.0)]).is_err());
        // weights not summing to one only warn
        let loose = state(vec![0.4, 0.4], None);
        assert!(MixtureLikelihood::new(&loose, vec![ok(-1.0), ok(-2.0)]).is_ok());
    }

    #[test]
    fn zero_weight_component_not_evaluated() {
        let calls = Rc::new(Cell::new(0));
        let other = Rc::new(Cell::new(0));
        let s = state(vec![0.0, 1.0], None);
        let mut mix =
            MixtureLikelihood::new(&s, vec![counted(-1.0, &calls), counted(-2.0, &other)]).unwrap();
        assert!((mix.calculate_log_p(&s) + 2.0).abs() < TOL);
        assert_eq!(calls.get(), 0);
        assert_eq!(other.get(), 1);
    }

    #[test]
    fn coupling_forces_evaluation_of_zero_weight() {
        let calls = Rc::new(Cell::new(0));
        let other = Rc::new(Cell::new(0));
        let s = state(vec![0.0, 1.0], Some(0.3));
        let mut mix = MixtureLikelihood::new(
            &s,
            vec![counted(f64::NAN, &calls), counted(-5.0, &other)],
        )
        .unwrap();
        assert_eq!(mix.calculate_log_p(&s), f64::NEG_INFINITY);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn lazy_and_full_evaluation_agree() {
        let s = state(vec![0.3, 0.7], Some(0.2));
        let ok = |v: f64| -> Box<dyn LikelihoodComponent> { Box::new(move || v) };
        let mut mix = MixtureLikelihood::new(&s, vec![ok(-8.0), ok(-9.5)]).unwrap();
        let lazy = mix.calculate_log_p(&s);
        let full = mix.terms(&s).total;
        assert!((lazy - full).abs() < 1e-12);
        assert!((lazy - mixture_log_density(&[0.3, 0.7], &[-8.0, -9.5], 0.2)).abs() < 1e-12);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn mix_bounded_by_component_extremes(
            w0 in 0.01f64..1.0,
            l0 in -500.0f64..0.0,
            l1 in -500.0f64..0.0,
        ) {
            let w = [w0, 1.0 - w0 + 1e-12];
            let t = MixtureTerms::compute(&w, &[l0, l1], 0.0);
            prop_assert!(t.log_mix <= t.max_log_l + 1e-9);
            prop_assert!(t.log_mix >= t.max_log_s - 1e-9);
        }
    }
}
