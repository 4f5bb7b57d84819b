//! Core trait definitions for the clockwork crates.
//!
//! These traits are the seams between the numerical core and the host
//! sampler: checkpointing, likelihood components, and trace logging.

/// Transactional checkpointing, driven by the host at the accept/reject
/// boundary.
///
/// `store` is called before a proposal is applied; `restore` undoes
/// everything since the last `store` when the proposal is rejected.
pub trait Checkpoint {
    /// Remember the current state.
    fn store(&mut self);

    /// Return to the state seen at the last [`store`](Checkpoint::store).
    fn restore(&mut self);
}

/// One component of a mixture likelihood (typically a tree likelihood).
///
/// Evaluation is lazy: the mixture only calls `log_likelihood` on
/// components it actually needs.
pub trait LikelihoodComponent {
    /// Log-likelihood of the data under this component. May be `-inf` or NaN.
    fn log_likelihood(&mut self) -> f64;
}

impl<F> LikelihoodComponent for F
where
    F: FnMut() -> f64,
{
    fn log_likelihood(&mut self) -> f64 {
        self()
    }
}

/// A source of numeric trace columns.
///
/// `Ctx` is whatever the logger needs to read at sample time.
pub trait Loggable<Ctx: ?Sized> {
    /// Column names, in output order.
    fn columns(&self) -> Vec<String>;

    /// One value per column for the given sample.
    fn row(&mut self, sample: u64, ctx: &Ctx) -> Vec<f64>;

    /// Optional free-text summary written when the trace is closed.
    fn close_summary(&self) -> Option<String> {
        None
    }
}
