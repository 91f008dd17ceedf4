//! One batch execution.
//!
//! A worker receives the calls it claimed from the queue, invokes the batched
//! operation once, and wires every element of the result to the call at the
//! same position. It does not wait for the elements themselves: a forwarding
//! task settles each call as soon as its own element settles, while the
//! worker hands control back to the controller.

use crate::{batched::BatchedFn, deferred::Deferred, error::Error, queue::PendingCall};
use core::fmt;
use futures::{FutureExt, StreamExt, stream::FuturesUnordered};
use std::{any::Any, panic::AssertUnwindSafe};
use tokio::runtime::Handle;

/// Identifier of one batch execution.
///
/// Ids are handed out by the controller in increasing order and are never
/// reused by the same [`Herd`](crate::Herd).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// How a batch left the worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BatchOutcome {
    /// Every call is wired to its element.
    Dispatched,
    /// Every call of the batch failed with the same error.
    Rejected,
}

/// Runs one batch to the point where every call is either failed or wired to
/// its element.
pub(crate) async fn run_batch<A, F>(
    id: WorkerId,
    batch: Vec<PendingCall<A, F::Output, F::Error>>,
    op: &F,
    runtime: &Handle,
) -> BatchOutcome
where
    F: BatchedFn<A>,
{
    let (args, deferreds): (Vec<A>, Vec<_>) = batch
        .into_iter()
        .map(|call| (call.args, call.deferred))
        .unzip();
    let expected = deferreds.len();

    #[cfg(feature = "tracing")]
    tracing::trace!("{id} started with {expected} calls");

    let elements = match invoke(op, args).await {
        Ok(elements) if elements.len() == expected => elements,
        Ok(elements) => {
            let actual = elements.len();
            return reject(id, deferreds, Error::ResultLength { expected, actual });
        }
        Err(err) => return reject(id, deferreds, err),
    };

    runtime.spawn(forward(elements, deferreds));

    #[cfg(feature = "tracing")]
    tracing::trace!("{id} dispatched {expected} calls");

    BatchOutcome::Dispatched
}

/// Calls the operation, turning panics raised while building or awaiting its
/// future into [`Error::Panicked`].
async fn invoke<A, F>(op: &F, args: Vec<A>) -> Result<Vec<F::Element>, Error<F::Error>>
where
    F: BatchedFn<A>,
{
    let fut = std::panic::catch_unwind(AssertUnwindSafe(|| op.call(args)))
        .map_err(|payload| Error::Panicked(panic_message(&*payload)))?;

    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(elements)) => Ok(elements),
        Ok(Err(err)) => Err(Error::Upstream(err)),
        Err(payload) => Err(Error::Panicked(panic_message(&*payload))),
    }
}

fn reject<T, E: Clone>(
    _id: WorkerId,
    deferreds: Vec<Deferred<T, E>>,
    err: Error<E>,
) -> BatchOutcome {
    #[cfg(feature = "tracing")]
    tracing::warn!("{_id} rejected its batch of {} calls", deferreds.len());

    for deferred in deferreds {
        deferred.fail(err.clone());
    }
    BatchOutcome::Rejected
}

/// Settles each call from the element at its position, independently of the
/// other elements.
async fn forward<T, E, El>(elements: Vec<El>, deferreds: Vec<Deferred<T, E>>)
where
    El: Future<Output = Result<T, E>>,
{
    let mut pending: FuturesUnordered<_> = elements
        .into_iter()
        .zip(deferreds)
        .map(|(element, deferred)| async move {
            match AssertUnwindSafe(element).catch_unwind().await {
                Ok(Ok(value)) => deferred.complete(value),
                Ok(Err(err)) => deferred.fail(Error::Element(err)),
                Err(payload) => deferred.fail(Error::Panicked(panic_message(&*payload))),
            };
        })
        .collect();

    while pending.next().await.is_some() {}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::{BoxFuture, ready};
    use std::time::Duration;

    type Batch = Vec<PendingCall<&'static str, String, String>>;
    type Results = Vec<crate::CallResult<String, String>>;

    fn batch_of(args: &[&'static str]) -> (Batch, Results) {
        args.iter()
            .map(|&args| {
                let (deferred, result) = Deferred::new();
                (PendingCall { args, deferred }, result)
            })
            .unzip()
    }

    async fn settle_all(results: Results) -> Vec<Result<String, Error<String>>> {
        futures::future::join_all(results).await
    }

    #[tokio::test]
    async fn results_follow_argument_positions() {
        let op = |args: Vec<&'static str>| async move {
            Ok::<_, String>(
                args.into_iter()
                    .enumerate()
                    .map(|(i, a)| ready(Ok::<_, String>(format!("{a}{i}"))))
                    .collect::<Vec<_>>(),
            )
        };
        let (batch, results) = batch_of(&["x", "y", "z"]);
        let outcome = run_batch(WorkerId::new(0), batch, &op, &Handle::current()).await;

        assert_eq!(outcome, BatchOutcome::Dispatched);
        assert_eq!(
            settle_all(results).await,
            vec![Ok("x0".into()), Ok("y1".into()), Ok("z2".into())]
        );
    }

    #[tokio::test]
    async fn short_result_rejects_the_whole_batch() {
        let op = |args: Vec<&'static str>| async move {
            Ok::<_, String>(
                args.into_iter()
                    .skip(1)
                    .map(|a| ready(Ok::<_, String>(a.to_string())))
                    .collect::<Vec<_>>(),
            )
        };
        let (batch, results) = batch_of(&["a", "b"]);
        let outcome = run_batch(WorkerId::new(0), batch, &op, &Handle::current()).await;

        assert_eq!(outcome, BatchOutcome::Rejected);
        let mismatch = Error::ResultLength {
            expected: 2,
            actual: 1,
        };
        assert_eq!(
            settle_all(results).await,
            vec![Err(mismatch.clone()), Err(mismatch)]
        );
    }

    #[tokio::test]
    async fn long_result_rejects_the_whole_batch() {
        let op = |args: Vec<&'static str>| async move {
            Ok::<_, String>(
                args.iter()
                    .chain(["extra"].iter())
                    .map(|a| ready(Ok::<_, String>(a.to_string())))
                    .collect::<Vec<_>>(),
            )
        };
        let (batch, results) = batch_of(&["a"]);
        let outcome = run_batch(WorkerId::new(0), batch, &op, &Handle::current()).await;

        assert_eq!(outcome, BatchOutcome::Rejected);
        assert_eq!(
            settle_all(results).await,
            vec![Err(Error::ResultLength {
                expected: 1,
                actual: 2
            })]
        );
    }

    #[tokio::test]
    async fn upstream_failure_reaches_every_call_verbatim() {
        let op = |_: Vec<&'static str>| async {
            Err::<Vec<futures::future::Ready<Result<String, String>>>, _>("timeout".to_string())
        };
        let (batch, results) = batch_of(&["a", "b", "c"]);
        let outcome = run_batch(WorkerId::new(0), batch, &op, &Handle::current()).await;

        assert_eq!(outcome, BatchOutcome::Rejected);
        for result in settle_all(results).await {
            assert_eq!(result, Err(Error::Upstream("timeout".into())));
        }
    }

    #[tokio::test]
    async fn element_failure_stays_with_its_call() {
        let op = |args: Vec<&'static str>| async move {
            Ok::<_, String>(
                args.into_iter()
                    .map(|a| {
                        if a == "bad" {
                            ready(Err(format!("{a} is invalid")))
                        } else {
                            ready(Ok::<_, String>(a.to_uppercase()))
                        }
                    })
                    .collect::<Vec<_>>(),
            )
        };
        let (batch, results) = batch_of(&["ok", "bad", "fine"]);
        run_batch(WorkerId::new(0), batch, &op, &Handle::current()).await;

        assert_eq!(
            settle_all(results).await,
            vec![
                Ok("OK".into()),
                Err(Error::Element("bad is invalid".into())),
                Ok("FINE".into()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn elements_settle_independently() {
        let op = |args: Vec<&'static str>| async move {
            Ok::<_, String>(
                args.into_iter()
                    .enumerate()
                    .map(|(i, a)| -> BoxFuture<'static, Result<String, String>> {
                        Box::pin(async move {
                            tokio::time::sleep(Duration::from_secs(10 - i as u64 * 9)).await;
                            Ok(a.to_string())
                        })
                    })
                    .collect::<Vec<_>>(),
            )
        };
        let (batch, mut results) = batch_of(&["slow", "fast"]);
        let start = tokio::time::Instant::now();
        run_batch(WorkerId::new(0), batch, &op, &Handle::current()).await;

        let slow = results.remove(0);
        let fast = results.remove(0);
        assert_eq!(fast.await, Ok("fast".into()));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(slow.await, Ok("slow".into()));
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test]
    async fn panicking_operation_fails_the_batch() {
        let op = |_: Vec<&'static str>| async {
            if true {
                panic!("backend exploded");
            }
            Ok::<Vec<futures::future::Ready<Result<String, String>>>, String>(vec![])
        };
        let (batch, results) = batch_of(&["a"]);
        let outcome = run_batch(WorkerId::new(0), batch, &op, &Handle::current()).await;

        assert_eq!(outcome, BatchOutcome::Rejected);
        assert_eq!(
            settle_all(results).await,
            vec![Err(Error::Panicked("backend exploded".into()))]
        );
    }

    #[test]
    fn worker_id_display() {
        assert_eq!(WorkerId::new(7).to_string(), "worker-7");
        assert_eq!(WorkerId::new(7).get(), 7);
    }
}
