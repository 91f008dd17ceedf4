use crate::error::{ConfigError, Result};

/// Concurrency bounds of a [`Herd`].
///
/// A `Config` is validated once, when the controller is built, and is never
/// mutated afterwards.
///
/// - `min_concurrent`: the number of workers started as soon as there is work
///   (default `1`).
/// - `max_concurrent`: the ceiling the controller may grow to. Requires
///   `max_batch_size`.
/// - `max_batch_size`: the largest number of calls one invocation of the
///   batched operation receives.
///
/// With every field left at its default the controller runs exactly one
/// worker at a time, and each run claims the whole queue.
///
/// [`Herd`]: crate::Herd
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    pub min_concurrent: usize,
    pub max_concurrent: Option<usize>,
    pub max_batch_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_concurrent: 1,
            max_concurrent: None,
            max_batch_size: None,
        }
    }
}

impl Config {
    /// Checks every constraint on the configured bounds.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MinConcurrentNotPositive`],
    ///   [`ConfigError::MaxConcurrentNotPositive`] or
    ///   [`ConfigError::MaxBatchSizeNotPositive`] when a bound is zero.
    /// - [`ConfigError::MaxBelowMin`] when `max_concurrent < min_concurrent`.
    /// - [`ConfigError::MaxConcurrentWithoutBatchSize`] when `max_concurrent`
    ///   is set but `max_batch_size` is not.
    pub fn validate(&self) -> Result<()> {
        if self.min_concurrent == 0 {
            return Err(ConfigError::MinConcurrentNotPositive);
        }
        if self.max_batch_size == Some(0) {
            return Err(ConfigError::MaxBatchSizeNotPositive);
        }
        if let Some(max) = self.max_concurrent {
            if max == 0 {
                return Err(ConfigError::MaxConcurrentNotPositive);
            }
            if max < self.min_concurrent {
                return Err(ConfigError::MaxBelowMin {
                    min: self.min_concurrent,
                    max,
                });
            }
            if self.max_batch_size.is_none() {
                return Err(ConfigError::MaxConcurrentWithoutBatchSize);
            }
        }
        Ok(())
    }
}
