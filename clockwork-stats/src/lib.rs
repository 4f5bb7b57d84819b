//! Statistical building blocks for the clockwork relaxed-clock crates.
//!
//! - **Distributions** — [`Normal`], [`LogNormal`], and the [`Categorical`] model prior
//! - **Bridge integrals** — expected rate ([`bridge::mean_z`]) and its variance
//!   ([`bridge::var_z`]) along a Brownian-bridge log-rate path
//! - **Rao-Blackwell estimators** — ratio-of-sums conditional posterior means

pub mod bridge;
pub mod distribution;
pub mod rao_blackwell;

pub use distribution::{Categorical, Distribution, LogNormal, Normal};
pub use rao_blackwell::RaoBlackwellEstimator;
