//! Checkpointable parameter vectors with change tracking.
//!
//! A [`Parameter`] is the minimal host-side state object the clockwork
//! components read from and operators write to. Every mutation gives the
//! parameter a fresh, globally unique [`ChangeStamp`]; dependents remember
//! the stamp they last saw and recompute only when it differs. `restore`
//! brings back the stamp that was current at `store`, so a dependent that
//! restores its own cache in lock-step sees no change at all.

use core::fmt;
use core::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::traits::Checkpoint;
use crate::{ClockworkError, Result};

static NEXT_STAMP: AtomicU64 = AtomicU64::new(1);

/// Globally unique marker identifying one version of some mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeStamp(u64);

impl ChangeStamp {
    /// A stamp never handed out before.
    pub fn fresh() -> Self {
        Self(NEXT_STAMP.fetch_add(1, Ordering::Relaxed))
    }

    /// A stamp that no state ever carries; use as "never seen".
    pub const fn never() -> Self {
        Self(0)
    }
}

/// A named vector of values with store/restore and change tracking.
#[derive(Clone)]
pub struct Parameter<T> {
    name: String,
    values: Vec<T>,
    stored: Vec<T>,
    stamp: ChangeStamp,
    stored_stamp: ChangeStamp,
    estimated: bool,
}

/// Real-valued parameter (rates, hyperparameters, weights).
pub type RealParameter = Parameter<f64>;

/// Integer-valued parameter (model indicators).
pub type IntegerParameter = Parameter<i64>;

impl<T: Copy> Parameter<T> {
    /// Create an estimable parameter from a non-empty vector.
    pub fn new(name: impl Into<String>, values: Vec<T>) -> Result<Self> {
        let name = name.into();
        if values.is_empty() {
            return Err(ClockworkError::InvalidInput(format!(
                "parameter '{}' must have at least one value",
                name
            )));
        }
        let stamp = ChangeStamp::fresh();
        Ok(Self {
            name,
            stored: values.clone(),
            values,
            stamp,
            stored_stamp: stamp,
            estimated: true,
        })
    }

    /// Create an estimable one-dimensional parameter.
    pub fn scalar(name: impl Into<String>, value: T) -> Self {
        let stamp = ChangeStamp::fresh();
        Self {
            name: name.into(),
            values: vec![value],
            stored: vec![value],
            stamp,
            stored_stamp: stamp,
            estimated: true,
        }
    }

    /// Mark the parameter as fixed (not proposed by any operator).
    pub fn fixed(mut self) -> Self {
        self.estimated = false;
        self
    }

    /// Parameter name, used in error messages and log headers.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of entries.
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Whether the sampler is allowed to change this parameter.
    pub fn is_estimated(&self) -> bool {
        self.estimated
    }

    /// The first (for scalars: only) value.
    pub fn value(&self) -> T {
        self.values[0]
    }

    /// Value at index `i`. Panics if `i` is out of range.
    pub fn get(&self, i: usize) -> T {
        self.values[i]
    }

    /// All values.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Set one entry.
    pub fn set(&mut self, i: usize, value: T) {
        self.values[i] = value;
        self.stamp = ChangeStamp::fresh();
    }

    /// Replace every entry at once. The dimension must not change.
    pub fn assign(&mut self, values: &[T]) -> Result<()> {
        if values.len() != self.values.len() {
            return Err(ClockworkError::dimension(
                self.name.clone(),
                self.values.len(),
                values.len(),
            ));
        }
        self.values.copy_from_slice(values);
        self.stamp = ChangeStamp::fresh();
        Ok(())
    }

    /// Scoped mutable access; the parameter is marked changed when the guard
    /// is dropped.
    pub fn edit(&mut self) -> ParamEdit<'_, T> {
        ParamEdit { param: self }
    }

    /// Stamp of the current version.
    pub fn stamp(&self) -> ChangeStamp {
        self.stamp
    }

    /// True if the parameter changed since a dependent saw `seen`.
    pub fn is_dirty_since(&self, seen: ChangeStamp) -> bool {
        self.stamp != seen
    }
}

impl<T: Copy> Checkpoint for Parameter<T> {
    fn store(&mut self) {
        self.stored.copy_from_slice(&self.values);
        self.stored_stamp = self.stamp;
    }

    fn restore(&mut self) {
        self.values.copy_from_slice(&self.stored);
        self.stamp = self.stored_stamp;
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for Parameter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("values", &self.values)
            .field("estimated", &self.estimated)
            .finish()
    }
}

/// Mutable view of a parameter's values; marks the parameter changed on drop.
pub struct ParamEdit<'a, T: Copy> {
    param: &'a mut Parameter<T>,
}

impl<T: Copy> Deref for ParamEdit<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.param.values
    }
}

impl<T: Copy> DerefMut for ParamEdit<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.param.values
    }
}

impl<T: Copy> Drop for ParamEdit<'_, T> {
    fn drop(&mut self) {
        self.param.stamp = ChangeStamp::fresh();
    }
}
