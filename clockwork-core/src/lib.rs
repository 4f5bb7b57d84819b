//! Shared primitives, traits, and utilities for the clockwork relaxed-clock crates.
//!
//! `clockwork-core` provides the foundation the other clockwork crates build on:
//!
//! - **Error types** — [`ClockworkError`] and [`Result`] for structured error handling
//! - **Traits** — Capability seams: [`Checkpoint`], [`LikelihoodComponent`], [`Loggable`]
//! - **Log-space arithmetic** — [`prob::log_sum_exp`] and friends
//! - **Parameters** — [`param::Parameter`] with change stamps and store/restore
//! - **Trace formatting** — tab-delimited numeric output via [`format::TraceWriter`]

pub mod error;
pub mod format;
pub mod param;
pub mod prob;
pub mod traits;

pub use error::{ClockworkError, Result};
pub use param::{ChangeStamp, IntegerParameter, Parameter, RealParameter};
pub use traits::*;
