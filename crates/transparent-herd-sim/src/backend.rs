use core::{future::Future, num::NonZeroU64, time::Duration};
use futures::future::{Ready, ready};
use portable_atomic::{AtomicU64, Ordering};
use thiserror::Error;
use transparent_herd::BatchedFn;

// Keys congruent to this modulo `MISSING_MODULUS` have no record.
const MISSING_MODULUS: u64 = 101;
const MISSING_REMAINDER: u64 = 100;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend unavailable (invocation {0})")]
    Unavailable(u64),
    #[error("no record for key {0}")]
    NotFound(u64),
}

/// A key/value store answering many lookups per round trip.
///
/// One round trip costs `base_latency + per_item_latency * len`. Every
/// `fail_every`-th invocation fails as a whole, and a fixed share of keys is
/// missing so per-element failures show up too.
#[derive(Debug)]
pub struct Backend {
    base_latency: Duration,
    per_item_latency: Duration,
    fail_every: Option<NonZeroU64>,
    invocations: AtomicU64,
}

impl Backend {
    pub fn new(
        base_latency: Duration,
        per_item_latency: Duration,
        fail_every: Option<NonZeroU64>,
    ) -> Self {
        Self {
            base_latency,
            per_item_latency,
            fail_every,
            invocations: AtomicU64::new(0),
        }
    }

    fn latency(&self, len: usize) -> Duration {
        let per_item = u32::try_from(len)
            .ok()
            .and_then(|n| self.per_item_latency.checked_mul(n))
            .unwrap_or(Duration::MAX);
        self.base_latency.saturating_add(per_item)
    }

    fn fails(&self, invocation: u64) -> bool {
        match self.fail_every {
            Some(n) => invocation % n.get() == 0,
            None => false,
        }
    }
}

fn lookup(key: u64) -> Result<u64, BackendError> {
    if key % MISSING_MODULUS == MISSING_REMAINDER {
        Err(BackendError::NotFound(key))
    } else {
        Ok(key.wrapping_mul(2))
    }
}

impl BatchedFn<u64> for Backend {
    type Output = u64;
    type Error = BackendError;
    type Element = Ready<Result<u64, BackendError>>;

    fn call(
        &self,
        keys: Vec<u64>,
    ) -> impl Future<Output = Result<Vec<Self::Element>, Self::Error>> + Send {
        let invocation = self.invocations.fetch_add(1, Ordering::Relaxed) + 1;
        let latency = self.latency(keys.len());
        let fails = self.fails(invocation);

        async move {
            tokio::time::sleep(latency).await;
            if fails {
                tracing::warn!("Invocation {invocation} failed with {} keys", keys.len());
                return Err(BackendError::Unavailable(invocation));
            }
            Ok(keys.into_iter().map(|key| ready(lookup(key))).collect())
        }
    }
}
