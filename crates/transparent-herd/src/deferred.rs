use crate::error::Error;
use parking_lot::Mutex;
use pin_project_lite::pin_project;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::oneshot;

type Settlement<T, E> = Result<T, Error<E>>;

/// The completion side of a single call.
///
/// A `Deferred` is settled at most once: the first call to [`complete`] or
/// [`fail`] wins and every later attempt is silently ignored. This makes it
/// safe to hand to a batched operation that might report a result twice.
///
/// Settling never fails, even when nobody is awaiting the matching
/// [`CallResult`] anymore.
///
/// [`complete`]: Deferred::complete
/// [`fail`]: Deferred::fail
pub struct Deferred<T, E> {
    tx: Mutex<Option<oneshot::Sender<Settlement<T, E>>>>,
}

impl<T, E> Deferred<T, E> {
    /// Creates a linked completion side and awaitable.
    pub fn new() -> (Self, CallResult<T, E>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            CallResult { rx },
        )
    }

    /// Settles the call with a value. Returns `false` if it was already
    /// settled.
    pub fn complete(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settles the call with an error. Returns `false` if it was already
    /// settled.
    pub fn fail(&self, error: Error<E>) -> bool {
        self.settle(Err(error))
    }

    /// Whether [`complete`](Self::complete) or [`fail`](Self::fail) has
    /// already been called.
    pub fn is_settled(&self) -> bool {
        self.tx.lock().is_none()
    }

    fn settle(&self, outcome: Settlement<T, E>) -> bool {
        let Some(tx) = self.tx.lock().take() else {
            return false;
        };
        // The caller may have dropped its `CallResult`; the outcome is simply
        // discarded in that case.
        let _ = tx.send(outcome);
        true
    }
}

impl<T, E> core::fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Deferred")
            .field("settled", &self.is_settled())
            .finish()
    }
}

pin_project! {
    /// The caller-facing handle of a single call.
    ///
    /// Resolves with the batched operation's element at this call's position,
    /// or with the [`Error`] that settled the call. Dropping it without
    /// awaiting has no side effects.
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    #[derive(Debug)]
    pub struct CallResult<T, E> {
        #[pin]
        rx: oneshot::Receiver<Settlement<T, E>>,
    }
}

impl<T, E> Future for CallResult<T, E> {
    type Output = Settlement<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().rx.poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}
