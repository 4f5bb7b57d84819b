//! Relaxed molecular clocks for Bayesian phylogenetics.
//!
//! - **Time trees** — [`TimeTree`] with Newick input and change stamps
//! - **Sampler state** — [`SamplerState`], lent to every component at call time
//! - **Branch rates** — [`ClockModel`] for auto-correlated (Brownian-bridge)
//!   and shared-vector clocks, with optional normalization
//! - **SVS prior** — [`SvsPrior`], switching between uncorrelated lognormal
//!   and auto-correlated rate densities on a shared vector
//! - **Mixture likelihood** — [`MixtureLikelihood`] with a coupling exponent
//! - **Operators** — scale, shift, indicator and annealing moves
//! - **Loggers** — trace columns for mixtures and SVS model probabilities

pub mod clock;
pub mod logger;
pub mod mixture;
pub mod newick;
pub mod operators;
pub mod rate_index;
pub mod state;
pub mod svs;
pub mod tree;

pub use clock::{BranchRateModel, ClockConfig, ClockModel, RateSource};
pub use logger::{MixtureLogger, MixtureLoggerConfig, SvsLogger, SvsLoggerConfig, SvsSnapshot};
pub use mixture::{mixture_log_density, MixtureLikelihood, MixtureTerms};
pub use operators::{Operator, OperatorSchedule, OperatorStats};
pub use rate_index::RateFieldIndex;
pub use state::SamplerState;
pub use svs::{RateDensityModel, SvsConfig, SvsPrior, AC, UC};
pub use tree::{NodeId, TimeTree};
