//! Deterministic annealing of the mixture coupling exponent.
//!
//! Not a stochastic proposal: each call lowers alpha by a fixed step until
//! it reaches the end value. Runs that must target the exact stationary
//! posterior should leave this operator out.

use super::Operator;
use crate::state::SamplerState;
use clockwork_core::{ClockworkError, Result};
use rand::RngCore;
use tracing::warn;

/// Tolerance for "alpha starts where the schedule says it does".
pub const START_MISMATCH_TOL: f64 = 1e-8;

/// Linear annealing schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnnealingConfig {
    /// Nominal starting value (default: 1.0).
    pub start: f64,
    /// Final value (default: 0.0).
    pub end: f64,
    /// Number of steps from start to end; 0 disables annealing.
    pub steps: i64,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        Self {
            start: 1.0,
            end: 0.0,
            steps: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlphaAnnealing {
    config: AnnealingConfig,
    delta: f64,
}

impl AlphaAnnealing {
    pub fn new(config: AnnealingConfig) -> Self {
        Self { config, delta: 0.0 }
    }

    /// Step size computed by [`init_and_validate`](Operator::init_and_validate).
    pub fn delta(&self) -> f64 {
        self.delta
    }
}

impl Operator for AlphaAnnealing {
    fn name(&self) -> &str {
        "AlphaAnnealing"
    }

    fn init_and_validate(&mut self, state: &SamplerState) -> Result<()> {
        let alpha = state.alpha.as_ref().ok_or_else(|| {
            ClockworkError::InvalidInput("annealing requires an alpha parameter".into())
        })?;
        if alpha.dimension() != 1 {
            return Err(ClockworkError::dimension("alpha", 1, alpha.dimension()));
        }
        let AnnealingConfig { mut start, end, steps } = self.config;
        if steps < 0 {
            return Err(ClockworkError::InvalidInput(format!(
                "annealing steps must be >= 0, found {}",
                steps
            )));
        }
        if start < end {
            return Err(ClockworkError::InvalidInput(format!(
                "annealing start ({}) must be >= end ({})",
                start, end
            )));
        }
        let current = alpha.value();
        if (current - start).abs() > START_MISMATCH_TOL {
            warn!(current, start, "alpha does not match annealing start; using current");
            start = current;
        }
        self.delta = if steps == 0 || start == end || current <= end {
            0.0
        } else {
            (start - end) / steps as f64
        };
        Ok(())
    }

    fn proposal(&mut self, state: &mut SamplerState, _rng: &mut dyn RngCore) -> f64 {
        if !(self.delta > 0.0) {
            return 0.0;
        }
        let end = self.config.end;
        if let Some(alpha) = state.alpha.as_mut() {
            let a = alpha.value();
            if a > end {
                alpha.set(0, (a - self.delta).max(end));
            }
        }
        0.0
    }
}
