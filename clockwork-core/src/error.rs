//! Structured error types for the clockwork crates.
//!
//! Only configuration problems are errors. Anything that can go wrong while a
//! sampler is running (a non-positive rate, a zero-length branch, an indicator
//! outside `{0, 1}`) is reported as a log-density of `f64::NEG_INFINITY`
//! instead, so the driver can reject the proposal and carry on.

use thiserror::Error;

/// Unified error type for all clockwork operations.
#[derive(Debug, Error)]
pub enum ClockworkError {
    /// I/O error while writing a trace or summary.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error (malformed Newick input, etc.)
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid input (bad arguments, out-of-range hyperparameters)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A vector does not have the dimension its owner requires.
    #[error("{what} must have dimension {expected}, found {found}")]
    Dimension {
        what: String,
        expected: usize,
        found: usize,
    },

    /// A parameter that must stay fixed was marked estimable or was changed.
    #[error("pinned parameter: {0}")]
    PinnedParameter(String),

    /// Catch-all for other errors
    #[error("{0}")]
    Other(String),
}

impl ClockworkError {
    /// Shorthand for a [`ClockworkError::Dimension`] error.
    pub fn dimension(what: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::Dimension {
            what: what.into(),
            expected,
            found,
        }
    }
}

/// Convenience alias used throughout the clockwork crates.
pub type Result<T> = std::result::Result<T, ClockworkError>;
