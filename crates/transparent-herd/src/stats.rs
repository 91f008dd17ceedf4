use portable_atomic::{AtomicU64, Ordering};

/// Running totals kept by a [`Herd`](crate::Herd).
///
/// Counters are only ever incremented and use relaxed atomics; a
/// [`StatsSnapshot`] is therefore not a consistent cut across counters.
#[derive(Debug, Default)]
pub(crate) struct Stats {
    submitted: AtomicU64,
    batches: AtomicU64,
    batched_calls: AtomicU64,
    rejected_batches: AtomicU64,
    mitoses: AtomicU64,
    apoptoses: AtomicU64,
}

impl Stats {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch(&self, size: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.batched_calls.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected_batch(&self) {
        self.rejected_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_mitosis(&self) {
        self.mitoses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_apoptosis(&self) {
        self.apoptoses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            batched_calls: self.batched_calls.load(Ordering::Relaxed),
            rejected_batches: self.rejected_batches.load(Ordering::Relaxed),
            mitoses: self.mitoses.load(Ordering::Relaxed),
            apoptoses: self.apoptoses.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a [`Herd`](crate::Herd)'s counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Calls accepted by [`Herd::call`](crate::Herd::call).
    pub submitted: u64,
    /// Invocations of the batched operation.
    pub batches: u64,
    /// Calls claimed by those invocations.
    pub batched_calls: u64,
    /// Batches whose every call failed together (upstream failure, result
    /// length mismatch or panic).
    pub rejected_batches: u64,
    /// Times a finishing worker was replaced by two.
    pub mitoses: u64,
    /// Times a finishing worker was not replaced while work remained queued.
    pub apoptoses: u64,
}

impl StatsSnapshot {
    /// Mean number of calls per invocation of the batched operation.
    pub fn mean_batch_size(&self) -> f64 {
        if self.batches == 0 {
            0.0
        } else {
            self.batched_calls as f64 / self.batches as f64
        }
    }
}
