//! Trace loggers for the mixture likelihood and the SVS model choice.
//!
//! Both implement [`Loggable`] and are driven through
//! [`TraceWriter`](clockwork_core::format::TraceWriter). Column names follow
//! the BEAST-style `name[k]` convention with 1-based component indices and
//! an optional `<id>.` prefix.

use crate::mixture::{MixtureLikelihood, MixtureTerms};
use crate::state::SamplerState;
use crate::svs::RateDensityModel;
use clockwork_core::format::fmt_value;
use clockwork_core::prob::normalize_log_weights;
use clockwork_core::{ClockworkError, Loggable, Result};
use clockwork_stats::RaoBlackwellEstimator;

/// `logMix` above `maxLogL` by more than this is flagged as a violation.
pub const VIOLATION_EPS: f64 = 1e-10;

fn prefixed(id: &Option<String>, name: &str) -> String {
    match id {
        Some(id) => format!("{}.{}", id, name),
        None => name.to_string(),
    }
}

/// Column switches of [`MixtureLogger`]. Only responsibilities are on by default.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MixtureLoggerConfig {
    pub id: Option<String>,
    pub total_log_p: bool,
    pub log_mix: bool,
    pub alpha: bool,
    pub coupling_term: bool,
    pub sum_weights: bool,
    pub weights: bool,
    pub log_l: bool,
    pub log_s: bool,
    pub responsibilities: bool,
    pub max_log_l: bool,
    pub max_log_s: bool,
    pub mix_minus_max_log_l: bool,
    pub mix_minus_max_log_s: bool,
    pub violation_flag: bool,
}

impl Default for MixtureLoggerConfig {
    fn default() -> Self {
        Self {
            id: None,
            total_log_p: false,
            log_mix: false,
            alpha: false,
            coupling_term: false,
            sum_weights: false,
            weights: false,
            log_l: false,
            log_s: false,
            responsibilities: true,
            max_log_l: false,
            max_log_s: false,
            mix_minus_max_log_l: false,
            mix_minus_max_log_s: false,
            violation_flag: false,
        }
    }
}

impl MixtureLoggerConfig {
    /// Every column switched on.
    pub fn all() -> Self {
        Self {
            id: None,
            total_log_p: true,
            log_mix: true,
            alpha: true,
            coupling_term: true,
            sum_weights: true,
            weights: true,
            log_l: true,
            log_s: true,
            responsibilities: true,
            max_log_l: true,
            max_log_s: true,
            mix_minus_max_log_l: true,
            mix_minus_max_log_s: true,
            violation_flag: true,
        }
    }
}

/// Logs a [`MixtureTerms`] breakdown.
#[derive(Debug, Clone)]
pub struct MixtureLogger {
    config: MixtureLoggerConfig,
    k: usize,
}

impl MixtureLogger {
    pub fn new(config: MixtureLoggerConfig, k: usize) -> Result<Self> {
        if k < 2 {
            return Err(ClockworkError::InvalidInput(format!(
                "mixture logger needs K >= 2, found {}",
                k
            )));
        }
        Ok(Self { config, k })
    }

    /// Logger sized for `mixture`.
    pub fn for_mixture(config: MixtureLoggerConfig, mixture: &MixtureLikelihood) -> Result<Self> {
        Self::new(config, mixture.k())
    }
}

impl Loggable<MixtureTerms> for MixtureLogger {
    fn columns(&self) -> Vec<String> {
        let c = &self.config;
        let id = &c.id;
        let mut cols = Vec::new();
        let scalar = [
            (c.total_log_p, "totalLogP"),
            (c.log_mix, "logMix"),
            (c.alpha, "alpha"),
            (c.coupling_term, "couplingTerm"),
            (c.sum_weights, "sumW"),
        ];
        for (on, name) in scalar {
            if on {
                cols.push(prefixed(id, name));
            }
        }
        let vector = [
            (c.weights, "w"),
            (c.log_l, "logL"),
            (c.log_s, "logS"),
            (c.responsibilities, "r"),
        ];
        for (on, name) in vector {
            if on {
                cols.extend((1..=self.k).map(|k| prefixed(id, &format!("{}[{}]", name, k))));
            }
        }
        let tail = [
            (c.max_log_l, "maxLogL"),
            (c.max_log_s, "maxLogS"),
            (c.mix_minus_max_log_l, "logMixMinusMaxLogL"),
            (c.mix_minus_max_log_s, "logMixMinusMaxLogS"),
            (c.violation_flag, "violationMixGTMaxLogL"),
        ];
        for (on, name) in tail {
            if on {
                cols.push(prefixed(id, name));
            }
        }
        cols
    }

    fn row(&mut self, _sample: u64, t: &MixtureTerms) -> Vec<f64> {
        let c = &self.config;
        let k = self.k;
        let pad = |v: &[f64]| -> Vec<f64> {
            let mut v = v.to_vec();
            v.resize(k, f64::NAN);
            v
        };
        let diff = |a: f64, b: f64| {
            if a.is_finite() && b.is_finite() {
                a - b
            } else {
                f64::NAN
            }
        };

        let mut row = Vec::new();
        if c.total_log_p {
            row.push(t.total);
        }
        if c.log_mix {
            row.push(t.log_mix);
        }
        if c.alpha {
            row.push(t.alpha);
        }
        if c.coupling_term {
            row.push(t.coupling);
        }
        if c.sum_weights {
            row.push(t.sum_weights());
        }
        if c.weights {
            row.extend(pad(&t.weights));
        }
        if c.log_l {
            row.extend(pad(&t.log_l));
        }
        if c.log_s {
            row.extend(pad(&t.log_s));
        }
        if c.responsibilities {
            match &t.responsibilities {
                Some(r) => row.extend(pad(r)),
                None => row.extend(std::iter::repeat(f64::NAN).take(k)),
            }
        }
        if c.max_log_l {
            row.push(t.max_log_l);
        }
        if c.max_log_s {
            row.push(t.max_log_s);
        }
        if c.mix_minus_max_log_l {
            row.push(diff(t.log_mix, t.max_log_l));
        }
        if c.mix_minus_max_log_s {
            row.push(diff(t.log_mix, t.max_log_s));
        }
        if c.violation_flag {
            let violated = t.log_mix.is_finite()
                && t.max_log_l.is_finite()
                && t.log_mix > t.max_log_l + VIOLATION_EPS;
            row.push(if violated { 1.0 } else { 0.0 });
        }
        row
    }
}

/// Column blocks and Rao-Blackwell settings of [`SvsLogger`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SvsLoggerConfig {
    pub id: Option<String>,
    /// topWStrict, topWRelax, topLogLStrict, topLogLRelax, rStrict, rRelax.
    pub print_top: bool,
    /// logPUC, logPAC.
    pub print_inner: bool,
    /// pStrict, pRelaxUC, pRelaxAC.
    pub print_three: bool,
    /// Rao-Blackwell numerator/denominator columns.
    pub print_rb: bool,
    /// Prior weights of UC and AC inside the relaxed model.
    pub inner_weights: [f64; 2],
    /// Samples before this index are left out of the close-time summary.
    pub burnin: u64,
}

impl Default for SvsLoggerConfig {
    fn default() -> Self {
        Self {
            id: None,
            print_top: false,
            print_inner: false,
            print_three: true,
            print_rb: true,
            inner_weights: [0.5, 0.5],
            burnin: 0,
        }
    }
}

/// Everything [`SvsLogger`] reads for one sample.
///
/// `top` is the strict-vs-relaxed mixture (component 0 strict, 1 relaxed).
pub struct SvsSnapshot<'a> {
    pub state: &'a SamplerState,
    pub prior: &'a dyn RateDensityModel,
    pub top: &'a MixtureTerms,
}

/// Model probabilities for one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelProbabilities {
    pub r_strict: f64,
    pub r_relax: f64,
    pub r_uc: f64,
    pub r_ac: f64,
    pub p_relax_uc: f64,
    pub p_relax_ac: f64,
}

/// Two-way responsibilities from unnormalized log-weights; NaN if neither is finite.
fn two_way(t0: f64, t1: f64) -> (f64, f64) {
    match normalize_log_weights(&[t0, t1]) {
        Some(r) => (r[0], r[1]),
        None => (f64::NAN, f64::NAN),
    }
}

fn weighted(w: f64, log_p: f64) -> f64 {
    if w > 0.0 && log_p.is_finite() {
        w.ln() + log_p
    } else {
        f64::NEG_INFINITY
    }
}

fn product(a: f64, b: f64) -> f64 {
    if a.is_finite() && b.is_finite() {
        a * b
    } else {
        f64::NAN
    }
}

/// Logs strict / relaxed-UC / relaxed-AC model probabilities and accumulates
/// Rao-Blackwellized hyperparameter means.
#[derive(Debug, Clone)]
pub struct SvsLogger {
    config: SvsLoggerConfig,
    ucld_given_uc: RaoBlackwellEstimator,
    sigma2_given_ac: RaoBlackwellEstimator,
    ucld_given_relax_uc: RaoBlackwellEstimator,
    sigma2_given_relax_ac: RaoBlackwellEstimator,
}

impl SvsLogger {
    /// The top-level mixture must have exactly two components.
    pub fn new(config: SvsLoggerConfig, top: &MixtureLikelihood) -> Result<Self> {
        if top.k() != 2 {
            return Err(ClockworkError::dimension("top-level mixture", 2, top.k()));
        }
        if config.inner_weights.iter().any(|&w| !(w >= 0.0) || !w.is_finite()) {
            return Err(ClockworkError::InvalidInput(format!(
                "inner weights must be non-negative, found {:?}",
                config.inner_weights
            )));
        }
        let burnin = config.burnin;
        Ok(Self {
            config,
            ucld_given_uc: RaoBlackwellEstimator::new(burnin),
            sigma2_given_ac: RaoBlackwellEstimator::new(burnin),
            ucld_given_relax_uc: RaoBlackwellEstimator::new(burnin),
            sigma2_given_relax_ac: RaoBlackwellEstimator::new(burnin),
        })
    }

    /// Model probabilities implied by `snap`.
    pub fn probabilities(&self, snap: &SvsSnapshot<'_>) -> ModelProbabilities {
        let log_uc = snap.prior.log_density_uc(snap.state);
        let log_ac = snap.prior.log_density_ac(snap.state);
        self.probabilities_from(snap.top, log_uc, log_ac)
    }

    fn probabilities_from(
        &self,
        top: &MixtureTerms,
        log_uc: f64,
        log_ac: f64,
    ) -> ModelProbabilities {
        let w = |k: usize| top.weights.get(k).copied().unwrap_or(0.0);
        let l = |k: usize| top.log_l.get(k).copied().unwrap_or(f64::NAN);
        let (r_strict, r_relax) = two_way(weighted(w(0), l(0)), weighted(w(1), l(1)));

        let [wu, wa] = self.config.inner_weights;
        let (r_uc, r_ac) = two_way(weighted(wu, log_uc), weighted(wa, log_ac));
        ModelProbabilities {
            r_strict,
            r_relax,
            r_uc,
            r_ac,
            p_relax_uc: product(r_relax, r_uc),
            p_relax_ac: product(r_relax, r_ac),
        }
    }

    pub fn ucld_given_uc(&self) -> &RaoBlackwellEstimator {
        &self.ucld_given_uc
    }

    pub fn sigma2_given_ac(&self) -> &RaoBlackwellEstimator {
        &self.sigma2_given_ac
    }
}

impl<'a> Loggable<SvsSnapshot<'a>> for SvsLogger {
    fn columns(&self) -> Vec<String> {
        let c = &self.config;
        let mut names: Vec<&str> = Vec::new();
        if c.print_top {
            names.extend([
                "topWStrict",
                "topWRelax",
                "topLogLStrict",
                "topLogLRelax",
                "rStrict",
                "rRelax",
            ]);
        }
        if c.print_inner {
            names.extend(["logPUC", "logPAC"]);
        }
        if c.print_three {
            names.extend(["pStrict", "pRelaxUC", "pRelaxAC"]);
        }
        if c.print_rb {
            names.extend([
                "rb_ucld_num",
                "rb_ucld_den",
                "rb_sigma2_num",
                "rb_sigma2_den",
                "rb_relax_ucld_num",
                "rb_relax_ucld_den",
                "rb_relax_sigma2_num",
                "rb_relax_sigma2_den",
            ]);
        }
        names.into_iter().map(|n| prefixed(&c.id, n)).collect()
    }

    fn row(&mut self, sample: u64, snap: &SvsSnapshot<'a>) -> Vec<f64> {
        let log_uc = snap.prior.log_density_uc(snap.state);
        let log_ac = snap.prior.log_density_ac(snap.state);
        let p = self.probabilities_from(snap.top, log_uc, log_ac);
        let ucld = snap.state.ucld_stdev.value();
        let sigma2 = snap.state.sigma2.value();

        self.ucld_given_uc.record(sample, p.r_uc, ucld);
        self.sigma2_given_ac.record(sample, p.r_ac, sigma2);
        self.ucld_given_relax_uc.record(sample, p.p_relax_uc, ucld);
        self.sigma2_given_relax_ac.record(sample, p.p_relax_ac, sigma2);

        let c = &self.config;
        let mut row = Vec::new();
        if c.print_top {
            let w = |k: usize| snap.top.weights.get(k).copied().unwrap_or(f64::NAN);
            let l = |k: usize| snap.top.log_l.get(k).copied().unwrap_or(f64::NAN);
            row.extend([w(0), w(1), l(0), l(1), p.r_strict, p.r_relax]);
        }
        if c.print_inner {
            row.extend([log_uc, log_ac]);
        }
        if c.print_three {
            row.extend([p.r_strict, p.p_relax_uc, p.p_relax_ac]);
        }
        if c.print_rb {
            row.extend([
                product(p.r_uc, ucld),
                p.r_uc,
                product(p.r_ac, sigma2),
                p.r_ac,
                product(p.p_relax_uc, ucld),
                p.p_relax_uc,
                product(p.p_relax_ac, sigma2),
                p.p_relax_ac,
            ]);
        }
        row
    }

    fn close_summary(&self) -> Option<String> {
        let est = |e: &RaoBlackwellEstimator| fmt_value(e.estimate().unwrap_or(f64::NAN));
        let prob = |e: &RaoBlackwellEstimator| fmt_value(e.mean_weight().unwrap_or(f64::NAN));
        let lines = [
            format!(
                "Rao-Blackwell summary (burn-in {}, {} samples)",
                self.config.burnin,
                self.ucld_given_uc.count()
            ),
            format!("E[ucldStdev | UC] = {}", est(&self.ucld_given_uc)),
            format!("E[sigma2 | AC] = {}", est(&self.sigma2_given_ac)),
            format!("E[ucldStdev | relaxed UC] = {}", est(&self.ucld_given_relax_uc)),
            format!("E[sigma2 | relaxed AC] = {}", est(&self.sigma2_given_relax_ac)),
            format!("P(UC) = {}", prob(&self.ucld_given_uc)),
            format!("P(AC) = {}", prob(&self.sigma2_given_ac)),
        ];
        Some(lines.join("\n"))
    }
}
