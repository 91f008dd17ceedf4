//! Error types for the batching controller.
//!
//! Two families of errors exist:
//!
//! - [`ConfigError`]: raised once, while a [`Herd`] is being built. No
//!   controller is produced and no call is ever accepted.
//! - [`Error`]: delivered to individual calls through their [`CallResult`].
//!   A failing batch never affects other batches or the controller itself.
//!
//! [`Herd`]: crate::Herd
//! [`CallResult`]: crate::CallResult

/// A result type for fallible controller construction.
pub type Result<T, E = ConfigError> = core::result::Result<T, E>;

/// Rejected controller configuration.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// `min_concurrent` must be a positive integer.
    #[error("min_concurrent is not a positive integer")]
    MinConcurrentNotPositive,

    /// `max_concurrent`, when set, must be a positive integer.
    #[error("max_concurrent is not a positive integer")]
    MaxConcurrentNotPositive,

    /// `max_batch_size`, when set, must be a positive integer.
    #[error("max_batch_size is not a positive integer")]
    MaxBatchSizeNotPositive,

    /// The concurrency ceiling is below the floor.
    #[error("max_concurrent must be greater or equal to min_concurrent")]
    MaxBelowMin { min: usize, max: usize },

    /// A concurrency ceiling is meaningless without a batch size cap: nothing
    /// would ever decide that splitting the queue is worth it.
    #[error("max_concurrent is used without max_batch_size")]
    MaxConcurrentWithoutBatchSize,

    /// The controller was built outside of a Tokio runtime.
    #[error("no Tokio runtime available to spawn batch workers")]
    NoRuntime,
}

/// Failure delivered to a single call.
///
/// `E` is the error type of the batched operation. Whole-batch failures are
/// cloned into every call of the batch, hence the `Clone` derive.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error<E> {
    /// The operation returned a different number of elements than the number
    /// of argument sets it was given.
    #[error("the result's length ({actual}) is different from the arguments's length ({expected})")]
    ResultLength { expected: usize, actual: usize },

    /// The operation itself failed. The value is passed through unmodified.
    #[error("{0}")]
    Upstream(E),

    /// The element at this call's position failed.
    #[error("{0}")]
    Element(E),

    /// The operation, or this call's element, panicked.
    #[error("batched operation panicked: {0}")]
    Panicked(String),

    /// The call was dropped before its batch settled it, which only happens
    /// when the runtime driving the workers shuts down.
    #[error("call abandoned before its batch settled it")]
    Abandoned,
}

impl<E> Error<E> {
    /// Returns the operation's own error value, if this failure carries one.
    pub const fn source_value(&self) -> Option<&E> {
        match self {
            Self::Upstream(e) | Self::Element(e) => Some(e),
            _ => None,
        }
    }
}
