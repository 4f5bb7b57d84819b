//! Branch-rate clock models reading the shared per-branch vector.
//!
//! Two variants share one cache:
//!
//! - **Auto-correlated** ([`RateSource::BridgedLogRates`]): the vector holds
//!   node log-rates and each branch rate is the bridge mean
//!   [`mean_z`](clockwork_stats::bridge::mean_z) between the parent's and the
//!   child's rate over the branch duration.
//! - **Shared rates** ([`RateSource::DirectRates`]): the vector already holds
//!   branch rates.
//!
//! With normalization on, rates are rescaled so that the time-weighted mean
//! rate across the tree is one; a separate mean-rate multiplier then sets the
//! absolute scale.
//!
//! The per-node rate cache is double-buffered. The first recompute after
//! [`store`](Checkpoint::store) writes into the spare buffer, so `store` and
//! `restore` are both O(1).

use crate::state::SamplerState;
use crate::tree::NodeId;
use clockwork_core::{ChangeStamp, Checkpoint, ClockworkError, Result};
use clockwork_stats::bridge::{mean_z, var_z, DEFAULT_TAYLOR_ORDER};
use tracing::info;

/// Tolerance for "root log-rate is pinned at zero".
pub const PINNED_ROOT_TOL: f64 = 1e-12;

/// Grid size used for [`ClockModel::branch_rate_variance`].
pub const VAR_Z_STEPS: usize = 40;

/// Configuration of the auto-correlated clock.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClockConfig {
    /// Taylor order for the bridge-mean series (default: 10).
    pub taylor_order: usize,
    /// Rescale the time-weighted mean rate to one (default: false).
    pub normalize: bool,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            taylor_order: DEFAULT_TAYLOR_ORDER,
            normalize: false,
        }
    }
}

/// How cached branch rates are derived from the shared vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSource {
    /// Vector holds node log-rates; branch rate is the bridge mean.
    BridgedLogRates { taylor_order: usize },
    /// Vector holds branch rates directly.
    DirectRates,
}

/// A model assigning a rate to every branch of the tree.
pub trait BranchRateModel: Checkpoint {
    /// Recompute caches if anything this model reads has changed.
    ///
    /// Returns `true` if the model's output may have changed.
    fn refresh(&mut self, state: &SamplerState) -> Result<bool>;

    /// Rate of the branch above `node` from the current cache; 1.0 for the root.
    fn rate_for_branch(&self, node: NodeId) -> f64;

    /// Current normalization factor (1.0 when normalization is off).
    fn scale_factor(&self) -> f64;

    /// Refresh, then read one branch rate.
    fn branch_rate(&mut self, state: &SamplerState, node: NodeId) -> Result<f64> {
        self.refresh(state)?;
        Ok(self.rate_for_branch(node))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Seen {
    tree: ChangeStamp,
    rates: ChangeStamp,
    root: Option<ChangeStamp>,
    sigma2: ChangeStamp,
    mean_rate: Option<ChangeStamp>,
}

impl Seen {
    fn of(state: &SamplerState) -> Self {
        Self {
            tree: state.tree().stamp(),
            rates: state.rates.stamp(),
            root: state.root_log_rate.as_ref().map(|p| p.stamp()),
            sigma2: state.sigma2.stamp(),
            mean_rate: state.mean_rate.as_ref().map(|p| p.stamp()),
        }
    }
}

/// Clock model with a checkpointed per-branch rate cache.
#[derive(Debug, Clone)]
pub struct ClockModel {
    source: RateSource,
    normalize: bool,
    root: NodeId,
    buffers: [Vec<f64>; 2],
    live: usize,
    swapped: bool,
    scale: f64,
    stored_scale: f64,
    multiplier: f64,
    stored_multiplier: f64,
    seen: Seen,
    stored_seen: Seen,
}

impl ClockModel {
    /// Auto-correlated clock over node log-rates.
    ///
    /// Requires a root log-rate. With `normalize`, the root log-rate must be
    /// 0 and not estimable.
    pub fn auto_correlated(state: &SamplerState, config: &ClockConfig) -> Result<Self> {
        if config.taylor_order < 1 {
            return Err(ClockworkError::InvalidInput(
                "taylor order must be >= 1".into(),
            ));
        }
        let root = state.root_log_rate.as_ref().ok_or_else(|| {
            ClockworkError::InvalidInput("auto-correlated clock requires a root log-rate".into())
        })?;
        if config.normalize {
            if root.value().abs() > PINNED_ROOT_TOL {
                return Err(ClockworkError::PinnedParameter(format!(
                    "normalize requires {} fixed at 0, found {}",
                    root.name(),
                    root.value()
                )));
            }
            if root.is_estimated() {
                return Err(ClockworkError::PinnedParameter(format!(
                    "normalize requires {} to be fixed, but it is estimated",
                    root.name()
                )));
            }
        }
        let model = Self::build(
            state,
            RateSource::BridgedLogRates {
                taylor_order: config.taylor_order,
            },
            config.normalize,
        )?;
        info!(
            node_count = state.tree().node_count(),
            normalize = config.normalize,
            taylor_order = config.taylor_order,
            "auto-correlated clock initialised"
        );
        Ok(model)
    }

    /// Clock reading branch rates straight from the shared vector.
    pub fn shared_rates(state: &SamplerState, normalize: bool) -> Result<Self> {
        let model = Self::build(state, RateSource::DirectRates, normalize)?;
        info!(
            node_count = state.tree().node_count(),
            normalize, "shared-rates clock initialised"
        );
        Ok(model)
    }

    fn build(state: &SamplerState, source: RateSource, normalize: bool) -> Result<Self> {
        state.validate()?;
        let n = state.tree().node_count();
        let seen = Seen::of(state);
        let mut model = Self {
            source,
            normalize,
            root: state.tree().root(),
            buffers: [vec![1.0; n], vec![1.0; n]],
            live: 0,
            swapped: false,
            scale: 1.0,
            stored_scale: 1.0,
            multiplier: state.mean_rate_or_one(),
            stored_multiplier: state.mean_rate_or_one(),
            seen,
            stored_seen: seen,
        };
        model.recompute(state)?;
        model.store();
        Ok(model)
    }

    pub fn source(&self) -> RateSource {
        self.source
    }

    pub fn normalize(&self) -> bool {
        self.normalize
    }

    /// Cached unscaled branch rates indexed by node id (root entry is 1.0).
    pub fn cached_rates(&self) -> &[f64] {
        &self.buffers[self.live]
    }

    fn write_buffer(&mut self) -> usize {
        if !self.swapped {
            self.live ^= 1;
            self.swapped = true;
        }
        self.live
    }

    fn recompute(&mut self, state: &SamplerState) -> Result<()> {
        let phi = state.sigma2.value();
        if matches!(self.source, RateSource::BridgedLogRates { .. })
            && !(phi > 0.0 && phi.is_finite())
        {
            return Err(ClockworkError::InvalidInput(format!(
                "sigma2 must be finite and > 0, found {}",
                phi
            )));
        }

        let tree = state.tree();
        let index = state.index();
        let live = self.write_buffer();
        let buf = &mut self.buffers[live];
        buf.fill(1.0);

        match self.source {
            RateSource::BridgedLogRates { taylor_order } => {
                let root_log = state.root_log_rate_or_zero();
                for slot in 0..index.len() {
                    let node = index.node(slot);
                    let Some(parent) = tree.parent(node) else {
                        continue;
                    };
                    let v_par = state.rate_of(parent).unwrap_or(root_log);
                    let rp = v_par.exp();
                    let rc = state.rates.get(slot).exp();
                    let dt = tree.branch_length(node);
                    buf[node] = if !(rp > 0.0 && rp.is_finite()) {
                        0.0
                    } else if dt <= 0.0 {
                        rp
                    } else if !(rc > 0.0 && rc.is_finite()) {
                        0.0
                    } else {
                        mean_z(rp, rc, dt, phi, taylor_order)?
                    };
                }
            }
            RateSource::DirectRates => {
                for slot in 0..index.len() {
                    buf[index.node(slot)] = state.rates.get(slot);
                }
            }
        }

        self.scale = if self.normalize {
            self.time_weighted_scale(state)
        } else {
            1.0
        };
        Ok(())
    }

    fn time_weighted_scale(&self, state: &SamplerState) -> f64 {
        let buf = &self.buffers[self.live];
        let mut sum_rate_time = 0.0;
        let mut sum_time = 0.0;
        for slot in 0..state.index().len() {
            let node = state.index().node(slot);
            let dt = state.tree().branch_length(node);
            let r = buf[node];
            if !(dt > 0.0) || !(r > 0.0) || !r.is_finite() {
                continue;
            }
            sum_rate_time += r * dt;
            sum_time += dt;
        }
        if sum_rate_time > 0.0 && sum_time > 0.0 {
            sum_time / sum_rate_time
        } else {
            1.0
        }
    }

    /// `Σ rate·dt / Σ dt` over branches with positive duration, from the cache.
    pub fn time_weighted_mean_rate(&self, state: &SamplerState) -> f64 {
        let mut num = 0.0;
        let mut den = 0.0;
        for slot in 0..state.index().len() {
            let node = state.index().node(slot);
            let dt = state.tree().branch_length(node);
            if dt > 0.0 {
                num += self.rate_for_branch(node) * dt;
                den += dt;
            }
        }
        if den > 0.0 {
            num / den
        } else {
            f64::NAN
        }
    }

    /// Variance of the bridged rate on the branch above `node`, on the same
    /// scale as [`rate_for_branch`](BranchRateModel::rate_for_branch).
    ///
    /// Zero for the root, for degenerate branches, and for the shared-rates
    /// variant.
    pub fn branch_rate_variance(&self, state: &SamplerState, node: NodeId) -> Result<f64> {
        if !matches!(self.source, RateSource::BridgedLogRates { .. }) {
            return Ok(0.0);
        }
        let (Some(slot), Some(parent)) = (state.index().slot(node), state.tree().parent(node)) else {
            return Ok(0.0);
        };
        let dt = state.tree().branch_length(node);
        let rp = state
            .rate_of(parent)
            .unwrap_or_else(|| state.root_log_rate_or_zero())
            .exp();
        let rc = state.rates.get(slot).exp();
        let phi = state.sigma2.value();
        if !(dt > 0.0) || !(rp > 0.0 && rp.is_finite()) || !(rc > 0.0 && rc.is_finite()) {
            return Ok(0.0);
        }
        let m = self.scale * self.multiplier.max(0.0);
        Ok(var_z(rp, rc, dt, phi, VAR_Z_STEPS)? * m * m)
    }
}

impl BranchRateModel for ClockModel {
    fn refresh(&mut self, state: &SamplerState) -> Result<bool> {
        let now = Seen::of(state);
        let mut rates_dirty = now.tree != self.seen.tree || now.rates != self.seen.rates;
        if let RateSource::BridgedLogRates { .. } = self.source {
            if now.root != self.seen.root {
                if self.normalize {
                    return Err(ClockworkError::PinnedParameter(
                        "normalize: root log-rate must stay fixed at 0 and must not be proposed"
                            .into(),
                    ));
                }
                rates_dirty = true;
            }
            rates_dirty |= now.sigma2 != self.seen.sigma2;
        }
        let mean_dirty = now.mean_rate != self.seen.mean_rate;

        if rates_dirty {
            self.recompute(state)?;
        }
        self.multiplier = state.mean_rate_or_one();
        self.seen = now;
        Ok(rates_dirty || mean_dirty)
    }

    fn rate_for_branch(&self, node: NodeId) -> f64 {
        if node == self.root {
            return 1.0;
        }
        if !(self.multiplier > 0.0) {
            return 0.0;
        }
        match self.buffers[self.live].get(node) {
            Some(&r) if r > 0.0 && r.is_finite() => r * self.scale * self.multiplier,
            _ => 0.0,
        }
    }

    fn scale_factor(&self) -> f64 {
        self.scale
    }
}

impl Checkpoint for ClockModel {
    fn store(&mut self) {
        self.swapped = false;
        self.stored_scale = self.scale;
        self.stored_multiplier = self.multiplier;
        self.stored_seen = self.seen;
    }

    fn restore(&mut self) {
        if self.swapped {
            self.live ^= 1;
            self.swapped = false;
        }
        self.scale = self.stored_scale;
        self.multiplier = self.stored_multiplier;
        self.seen = self.stored_seen;
    }
}
