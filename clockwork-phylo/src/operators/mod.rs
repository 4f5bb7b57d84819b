//! Metropolis-Hastings proposal moves over the sampler state.
//!
//! Every operator returns a log-Hastings ratio, or `-inf` to force rejection.
//! A rejected proposal never writes to the state: moves build the candidate
//! in a scratch buffer and commit only once it has been validated.
//!
//! | Move                        | Hastings ratio             |
//! |-----------------------------|----------------------------|
//! | [`SingleRateScale`]         | `ε`                        |
//! | [`SubtreeRateScale`]        | `count · ε`                |
//! | [`GlobalLogRateShift`]      | `0`                        |
//! | [`IndicatorGibbs`]          | `ln P(old) − ln P(new)`    |
//! | [`IndicatorSwitchResample`] | `ln p_old(x) − ln p_new(x')` |
//! | [`AlphaAnnealing`]          | `0` (deterministic)        |

mod anneal;
mod indicator;
mod scale;
mod shift;

pub use anneal::{AlphaAnnealing, AnnealingConfig};
pub use indicator::{GibbsConfig, IndicatorGibbs, IndicatorSwitchResample};
pub use scale::{ScaleConfig, SingleRateScale, SubtreeRateScale};
pub use shift::{GlobalLogRateShift, ShiftConfig};

use crate::state::SamplerState;
use clockwork_core::{ClockworkError, Result};
use rand::{Rng, RngCore};
use std::collections::BTreeMap;

/// A proposal move.
pub trait Operator {
    /// Name used in acceptance reports.
    fn name(&self) -> &str;

    /// Check the configuration against the state. Fatal on malformed input.
    fn init_and_validate(&mut self, state: &SamplerState) -> Result<()>;

    /// Propose a move, returning the log-Hastings ratio.
    fn proposal(&mut self, state: &mut SamplerState, rng: &mut dyn RngCore) -> f64;
}

/// `(2u − 1) · window`, a uniform draw on `(−window, window)`.
pub(crate) fn symmetric_draw(rng: &mut dyn RngCore, window: f64) -> f64 {
    (rng.gen::<f64>() * 2.0 - 1.0) * window
}

/// Proposal/acceptance counts for one operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperatorStats {
    pub proposed: u64,
    pub accepted: u64,
    /// Proposals that returned `-inf` (rejected without evaluation).
    pub rejected_early: u64,
}

impl OperatorStats {
    pub fn acceptance_rate(&self) -> f64 {
        if self.proposed > 0 {
            self.accepted as f64 / self.proposed as f64
        } else {
            0.0
        }
    }
}

struct Entry {
    op: Box<dyn Operator>,
    weight: f64,
    stats: OperatorStats,
}

/// Weighted collection of operators; one is chosen per step in proportion
/// to its weight.
#[derive(Default)]
pub struct OperatorSchedule {
    entries: Vec<Entry>,
    total_weight: f64,
    last: Option<usize>,
}

impl std::fmt::Debug for OperatorSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorSchedule")
            .field(
                "operators",
                &self.entries.iter().map(|e| (e.op.name(), e.weight)).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl OperatorSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `op` against `state` and register it with a relative weight.
    pub fn add(
        &mut self,
        mut op: Box<dyn Operator>,
        weight: f64,
        state: &SamplerState,
    ) -> Result<()> {
        if !(weight > 0.0) || !weight.is_finite() {
            return Err(ClockworkError::InvalidInput(format!(
                "operator '{}' weight must be > 0, found {}",
                op.name(),
                weight
            )));
        }
        op.init_and_validate(state)?;
        self.total_weight += weight;
        self.entries.push(Entry {
            op,
            weight,
            stats: OperatorStats::default(),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pick an operator and run its proposal.
    ///
    /// Returns the operator's name and log-Hastings ratio, or `None` when
    /// the schedule is empty.
    pub fn step(
        &mut self,
        state: &mut SamplerState,
        rng: &mut dyn RngCore,
    ) -> Option<(&str, f64)> {
        if self.entries.is_empty() {
            return None;
        }
        let mut r = rng.gen::<f64>() * self.total_weight;
        let mut pick = self.entries.len() - 1;
        for (i, e) in self.entries.iter().enumerate() {
            if r < e.weight {
                pick = i;
                break;
            }
            r -= e.weight;
        }
        self.last = Some(pick);
        let entry = &mut self.entries[pick];
        let log_hr = entry.op.proposal(state, rng);
        entry.stats.proposed += 1;
        if log_hr == f64::NEG_INFINITY {
            entry.stats.rejected_early += 1;
        }
        Some((entry.op.name(), log_hr))
    }

    /// Record the driver's accept/reject decision for the last step.
    pub fn record(&mut self, accepted: bool) {
        if let Some(i) = self.last.take() {
            if accepted {
                self.entries[i].stats.accepted += 1;
            }
        }
    }

    pub fn stats(&self) -> impl Iterator<Item = (&str, &OperatorStats)> {
        self.entries.iter().map(|e| (e.op.name(), &e.stats))
    }

    /// Acceptance rate per operator name.
    pub fn acceptance_rates(&self) -> BTreeMap<String, f64> {
        self.entries
            .iter()
            .map(|e| (e.op.name().to_string(), e.stats.acceptance_rate()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TimeTree;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Counter {
        name: &'static str,
        calls: u64,
    }

    impl Operator for Counter {
        fn name(&self) -> &str {
            self.name
        }

        fn init_and_validate(&mut self, _state: &SamplerState) -> Result<()> {
            Ok(())
        }

        fn proposal(&mut self, _state: &mut SamplerState, _rng: &mut dyn RngCore) -> f64 {
            self.calls += 1;
            0.0
        }
    }

    fn state() -> SamplerState {
        let tree = TimeTree::from_newick("((A:1,B:1):1,C:2);").unwrap();
        SamplerState::new(tree, vec![1.0; 4], 0, 0.5, 0.1).unwrap()
    }

    #[test]
    fn symmetric_draw_in_window() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let d = symmetric_draw(&mut rng, 0.3);
            assert!(d > -0.3 && d < 0.3);
        }
    }

    #[test]
    fn rejects_bad_weight() {
        let s = state();
        let mut sched = OperatorSchedule::new();
        let op = Box::new(Counter { name: "a", calls: 0 });
        assert!(sched.add(op, 0.0, &s).is_err());
        assert!(sched.is_empty());
    }

    #[test]
    fn empty_schedule_steps_nothing() {
        let mut s = state();
        let mut rng = StdRng::seed_from_u64(1);
        let mut sched = OperatorSchedule::new();
        assert!(sched.step(&mut s, &mut rng).is_none());
    }

    #[test]
    fn selection_follows_weights() {
        let mut s = state();
        let mut rng = StdRng::seed_from_u64(9);
        let mut sched = OperatorSchedule::new();
        sched.add(Box::new(Counter { name: "light", calls: 0 }), 1.0, &s).unwrap();
        sched.add(Box::new(Counter { name: "heavy", calls: 0 }), 3.0, &s).unwrap();
        for i in 0..4000 {
            sched.step(&mut s, &mut rng).unwrap();
            sched.record(i % 2 == 0);
        }
        let counts: BTreeMap<&str, u64> = sched.stats().map(|(n, st)| (n, st.proposed)).collect();
        let heavy = counts["heavy"] as f64 / 4000.0;
        assert!((heavy - 0.75).abs() < 0.03, "heavy fraction {}", heavy);
        let rates = sched.acceptance_rates();
        assert!(rates.values().all(|&r| r > 0.3 && r < 0.7));
    }
}
