//! Stochastic-variable-selection prior over the shared rate vector.
//!
//! One vector of positive branch rates is explained by either of two models,
//! chosen by a binary indicator:
//!
//! - **UC** (indicator 0): rates are i.i.d. `LogNormal(-s²/2, s)`, so `E[r] = 1`.
//! - **AC** (indicator 1): along every edge,
//!   `ln r_child | ln r_parent ~ Normal(ln r_parent - var/2, var)` with
//!   `var = σ²·dt`, plus the Jacobian `-ln r_child` because the parameter
//!   lives in rate space. The root's parent value is the root log-rate (or 0).
//!
//! Both densities are always computable, whichever model the indicator
//! currently selects.

use crate::state::SamplerState;
use clockwork_core::{ClockworkError, Result};
use clockwork_stats::{Categorical, Distribution, LogNormal, Normal};
use rand::{Rng, RngCore};
use rand_distr::StandardNormal;
use tracing::info;

/// Indicator value selecting the uncorrelated model.
pub const UC: i64 = 0;
/// Indicator value selecting the autocorrelated model.
pub const AC: i64 = 1;

/// Configuration of [`SvsPrior`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SvsConfig {
    /// Branches no longer than this make the AC density `-inf` (default: 1e-12).
    pub min_branch_length: f64,
}

impl Default for SvsConfig {
    fn default() -> Self {
        Self {
            min_branch_length: 1e-12,
        }
    }
}

/// Two competing densities over one rate vector, plus their generative samplers.
pub trait RateDensityModel {
    /// UC log-density of `rates` (not necessarily the state's own vector).
    fn log_density_uc_at(&self, state: &SamplerState, rates: &[f64]) -> f64;

    /// AC log-density of `rates`.
    fn log_density_ac_at(&self, state: &SamplerState, rates: &[f64]) -> f64;

    /// Fresh UC draw of the whole vector; `None` if the configuration can't be sampled.
    fn sample_uc(&self, state: &SamplerState, rng: &mut dyn RngCore) -> Option<Vec<f64>>;

    /// Fresh AC draw of the whole vector, top-down from the root.
    fn sample_ac(&self, state: &SamplerState, rng: &mut dyn RngCore) -> Option<Vec<f64>>;

    fn log_density_uc(&self, state: &SamplerState) -> f64 {
        self.log_density_uc_at(state, state.rates.values())
    }

    fn log_density_ac(&self, state: &SamplerState) -> f64 {
        self.log_density_ac_at(state, state.rates.values())
    }

    /// Density of `rates` under the model selected by `indicator`; `-inf`
    /// for an indicator outside {0, 1}.
    fn log_density_for(&self, state: &SamplerState, rates: &[f64], indicator: i64) -> f64 {
        match indicator {
            UC => self.log_density_uc_at(state, rates),
            AC => self.log_density_ac_at(state, rates),
            _ => f64::NEG_INFINITY,
        }
    }

    /// Draw from the model selected by `indicator`.
    fn sample_for(
        &self,
        state: &SamplerState,
        indicator: i64,
        rng: &mut dyn RngCore,
    ) -> Option<Vec<f64>> {
        match indicator {
            UC => self.sample_uc(state, rng),
            AC => self.sample_ac(state, rng),
            _ => None,
        }
    }

    /// Density of the current vector under the current indicator.
    fn calculate_log_p(&self, state: &SamplerState) -> f64 {
        self.log_density_for(state, state.rates.values(), state.indicator.value())
    }
}

/// The dual-density rate prior.
#[derive(Debug, Clone)]
pub struct SvsPrior {
    config: SvsConfig,
    model_prior: Option<Categorical>,
}

impl SvsPrior {
    /// Validate the configuration against `state`.
    pub fn new(state: &SamplerState, config: SvsConfig) -> Result<Self> {
        if !(config.min_branch_length > 0.0) || !config.min_branch_length.is_finite() {
            return Err(ClockworkError::InvalidInput(format!(
                "min_branch_length must be > 0, found {}",
                config.min_branch_length
            )));
        }
        state.validate()?;
        info!(
            node_count = state.tree().node_count(),
            rates = state.rates.dimension(),
            min_branch_length = config.min_branch_length,
            "SVS rate prior initialised"
        );
        Ok(Self {
            config,
            model_prior: None,
        })
    }

    /// Attach a prior over the indicator (two categories, zero-indexed).
    pub fn with_model_prior(mut self, prior: Categorical) -> Result<Self> {
        if prior.categories() != 2 {
            return Err(ClockworkError::dimension("model prior", 2, prior.categories()));
        }
        self.model_prior = Some(prior);
        Ok(self)
    }

    pub fn config(&self) -> &SvsConfig {
        &self.config
    }

    /// Log prior mass of the current indicator; 0 when no model prior is attached.
    pub fn log_model_prior(&self, state: &SamplerState) -> f64 {
        self.model_prior
            .as_ref()
            .map_or(0.0, |p| p.ln_pmf(state.indicator.value()))
    }

    /// Overwrite the shared vector with a draw from the current model.
    pub fn initialise(&self, state: &mut SamplerState, rng: &mut dyn RngCore) -> Result<()> {
        let indicator = state.indicator.value();
        let draw = self.sample_for(state, indicator, rng).ok_or_else(|| {
            ClockworkError::InvalidInput(format!(
                "cannot draw initial rates for indicator {}",
                indicator
            ))
        })?;
        state.rates.assign(&draw)
    }
}

impl RateDensityModel for SvsPrior {
    fn log_density_uc_at(&self, state: &SamplerState, rates: &[f64]) -> f64 {
        let Ok(dist) = LogNormal::mean_one(state.ucld_stdev.value()) else {
            return f64::NEG_INFINITY;
        };
        let mut lp = 0.0;
        for &r in rates {
            if !(r > 0.0) {
                return f64::NEG_INFINITY;
            }
            lp += dist.ln_pdf(r);
        }
        lp
    }

    fn log_density_ac_at(&self, state: &SamplerState, rates: &[f64]) -> f64 {
        let s2 = state.sigma2.value();
        if !(s2 > 0.0) || rates.len() != state.index().len() {
            return f64::NEG_INFINITY;
        }
        let tree = state.tree();
        let index = state.index();
        let root_log = state.root_log_rate_or_zero();
        let min_dt = self.config.min_branch_length;

        let mut lp = 0.0;
        for node in tree.iter_preorder() {
            let (Some(slot), Some(parent)) = (index.slot(node), tree.parent(node)) else {
                continue;
            };
            let dt = tree.branch_length(node);
            if !(dt > min_dt) {
                return f64::NEG_INFINITY;
            }
            let r_chi = rates[slot];
            if !(r_chi > 0.0) {
                return f64::NEG_INFINITY;
            }
            let log_par = match index.slot(parent) {
                None => root_log,
                Some(p) if rates[p] > 0.0 => rates[p].ln(),
                Some(_) => return f64::NEG_INFINITY,
            };
            let var = s2 * dt;
            let log_chi = r_chi.ln();
            let Ok(step) = Normal::from_variance(log_par - 0.5 * var, var) else {
                return f64::NEG_INFINITY;
            };
            lp += step.ln_pdf(log_chi) - log_chi;
        }
        lp
    }

    fn sample_uc(&self, state: &SamplerState, rng: &mut dyn RngCore) -> Option<Vec<f64>> {
        let dist = LogNormal::mean_one(state.ucld_stdev.value()).ok()?;
        Some((0..state.index().len()).map(|_| dist.sample(rng)).collect())
    }

    fn sample_ac(&self, state: &SamplerState, rng: &mut dyn RngCore) -> Option<Vec<f64>> {
        let s2 = state.sigma2.value();
        if !(s2 > 0.0) {
            return None;
        }
        let tree = state.tree();
        let index = state.index();
        let min_dt = self.config.min_branch_length;

        let mut log_rate = vec![0.0; tree.node_count()];
        log_rate[tree.root()] = state.root_log_rate_or_zero();
        let mut out = vec![0.0; index.len()];
        for node in tree.iter_preorder() {
            let (Some(slot), Some(parent)) = (index.slot(node), tree.parent(node)) else {
                continue;
            };
            let dt = tree.branch_length(node);
            if !(dt > min_dt) {
                return None;
            }
            let var = s2 * dt;
            let z: f64 = rng.sample(StandardNormal);
            let lc = log_rate[parent] - 0.5 * var + var.sqrt() * z;
            let r = lc.exp();
            if !(r > 0.0) || !r.is_finite() {
                return None;
            }
            log_rate[node] = lc;
            out[slot] = r;
        }
        Some(out)
    }
}
