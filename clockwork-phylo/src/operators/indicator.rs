//! Moves on the UC/AC model indicator.

use super::Operator;
use crate::state::SamplerState;
use crate::svs::{RateDensityModel, AC, UC};
use clockwork_core::prob::log_add;
use clockwork_core::{ClockworkError, Result};
use clockwork_stats::Categorical;
use rand::{Rng, RngCore};

/// Prior on the indicator used by [`IndicatorGibbs`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GibbsConfig {
    /// `P(indicator = 1)`, strictly inside (0, 1) (default: 0.5).
    pub p_one: f64,
}

impl Default for GibbsConfig {
    fn default() -> Self {
        Self { p_one: 0.5 }
    }
}

/// Gibbs update of the indicator given the current rate vector.
///
/// Draws the indicator from
/// `P(k) ∝ P_prior(k) · p_k(rates)` and returns `ln P(old) − ln P(new)`,
/// which makes the move always accepted.
#[derive(Debug, Clone)]
pub struct IndicatorGibbs<P> {
    prior: P,
    model_prior: Categorical,
    config: GibbsConfig,
}

impl<P: RateDensityModel> IndicatorGibbs<P> {
    pub fn new(prior: P, config: GibbsConfig) -> Self {
        Self {
            prior,
            model_prior: Categorical::bernoulli(config.p_one),
            config,
        }
    }

    /// Unnormalized `(ln w0, ln w1)` for UC and AC.
    pub fn log_weights(&self, state: &SamplerState) -> (f64, f64) {
        (
            self.model_prior.ln_pmf(UC) + self.prior.log_density_uc(state),
            self.model_prior.ln_pmf(AC) + self.prior.log_density_ac(state),
        )
    }

    /// `P(indicator = 1 | rates)`, or `None` if neither model has support.
    pub fn prob_ac(&self, state: &SamplerState) -> Option<f64> {
        let (w0, w1) = self.log_weights(state);
        let den = log_add(w0, w1);
        den.is_finite().then(|| (w1 - den).exp())
    }

    /// Gibbs step using the uniform draw `u`.
    pub fn apply(&self, state: &mut SamplerState, u: f64) -> f64 {
        let old = state.indicator.value();
        if old != UC && old != AC {
            return f64::NEG_INFINITY;
        }
        let (w0, w1) = self.log_weights(state);
        if w0.is_infinite() && w1.is_infinite() {
            return f64::NEG_INFINITY;
        }
        let den = log_add(w0, w1);
        if !den.is_finite() {
            return f64::NEG_INFINITY;
        }
        let log_p = [w0 - den, w1 - den];
        let new = if u < log_p[1].exp() { AC } else { UC };
        if new != old {
            state.indicator.set(0, new);
        }
        log_p[old as usize] - log_p[new as usize]
    }
}

impl<P: RateDensityModel> Operator for IndicatorGibbs<P> {
    fn name(&self) -> &str {
        "IndicatorGibbs"
    }

    fn init_and_validate(&mut self, state: &SamplerState) -> Result<()> {
        if !(self.config.p_one > 0.0 && self.config.p_one < 1.0) {
            return Err(ClockworkError::InvalidInput(format!(
                "p_one must lie in (0, 1), found {}",
                self.config.p_one
            )));
        }
        state.validate()
    }

    fn proposal(&mut self, state: &mut SamplerState, rng: &mut dyn RngCore) -> f64 {
        let u: f64 = rng.gen();
        self.apply(state, u)
    }
}

/// Flips the indicator and redraws the whole rate vector from the target
/// model's generative prior.
///
/// The proposal density of the new vector is the target model's density,
/// so the log-Hastings ratio is `ln p_old(x) − ln p_new(x')`.
#[derive(Debug, Clone)]
pub struct IndicatorSwitchResample<P> {
    prior: P,
}

impl<P: RateDensityModel> IndicatorSwitchResample<P> {
    pub fn new(prior: P) -> Self {
        Self { prior }
    }

    /// Switch to the other model with `proposed` as the new rate vector.
    ///
    /// Returns `-inf` without writing if the current or proposed state has
    /// no support under its model.
    pub fn apply(&self, state: &mut SamplerState, proposed: &[f64]) -> f64 {
        let old = state.indicator.value();
        if old != UC && old != AC {
            return f64::NEG_INFINITY;
        }
        let new = 1 - old;
        let log_old = self.prior.log_density_for(state, state.rates.values(), old);
        if !log_old.is_finite() {
            return f64::NEG_INFINITY;
        }
        let log_new = self.prior.log_density_for(state, proposed, new);
        if !log_new.is_finite() {
            return f64::NEG_INFINITY;
        }
        if state.rates.assign(proposed).is_err() {
            return f64::NEG_INFINITY;
        }
        state.indicator.set(0, new);
        log_old - log_new
    }
}

impl<P: RateDensityModel> Operator for IndicatorSwitchResample<P> {
    fn name(&self) -> &str {
        "IndicatorSwitchResample"
    }

    fn init_and_validate(&mut self, state: &SamplerState) -> Result<()> {
        state.validate()
    }

    fn proposal(&mut self, state: &mut SamplerState, rng: &mut dyn RngCore) -> f64 {
        let old = state.indicator.value();
        if old != UC && old != AC {
            return f64::NEG_INFINITY;
        }
        match self.prior.sample_for(state, 1 - old, rng) {
            Some(proposed) => self.apply(state, &proposed),
            None => f64::NEG_INFINITY,
        }
    }
}
