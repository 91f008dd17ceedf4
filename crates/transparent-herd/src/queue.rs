use crate::deferred::Deferred;
use std::collections::VecDeque;

/// One submitted call waiting for a worker: its arguments and the completion
/// side of its [`CallResult`](crate::CallResult).
#[derive(Debug)]
pub(crate) struct PendingCall<A, T, E> {
    pub(crate) args: A,
    pub(crate) deferred: Deferred<T, E>,
}

/// FIFO buffer of calls not yet claimed by any worker.
///
/// A call leaves the queue exactly once, through [`take_front`], so no call
/// can ever be claimed by two workers.
///
/// [`take_front`]: CallQueue::take_front
#[derive(Debug)]
pub(crate) struct CallQueue<A, T, E> {
    calls: VecDeque<PendingCall<A, T, E>>,
}

impl<A, T, E> Default for CallQueue<A, T, E> {
    fn default() -> Self {
        Self {
            calls: VecDeque::new(),
        }
    }
}

impl<A, T, E> CallQueue<A, T, E> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, call: PendingCall<A, T, E>) {
        self.calls.push_back(call);
    }

    /// Removes and returns the first `min(n, len)` calls in submission order.
    pub(crate) fn take_front(&mut self, n: usize) -> Vec<PendingCall<A, T, E>> {
        let n = n.min(self.calls.len());
        self.calls.drain(..n).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.calls.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
