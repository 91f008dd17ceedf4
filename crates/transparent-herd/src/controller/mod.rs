//! The adaptive concurrency controller.
//!
//! A [`Herd`] owns the queue of submitted calls and the set of running batch
//! workers. All of its state lives behind one [`Mutex`]; every decision
//! (claiming a slice of the queue, spawning, retiring) is taken while holding
//! it, so no call is claimed twice and the running count never drifts.
//!
//! Workers are spawned from exactly two places:
//!
//! - [`Herd::call`], when fewer than `min_concurrent` workers run.
//! - the completion of a worker, which either retires it (apoptosis),
//!   replaces it, or replaces it with two (mitosis). See [`policy`].

mod policy;

use crate::{
    batched::BatchedFn,
    config::Config,
    deferred::{CallResult, Deferred},
    error::{ConfigError, Result},
    queue::{CallQueue, PendingCall},
    stats::{Stats, StatsSnapshot},
    worker::{self, BatchOutcome, WorkerId},
};
use core::{fmt, marker::PhantomData};
use futures::FutureExt;
use parking_lot::Mutex;
use policy::Continuation;
use std::{collections::HashMap, panic::AssertUnwindSafe, sync::Arc};
use tokio::{runtime::Handle, sync::Notify, task::JoinHandle};

/// Turns a [`BatchedFn`] into a function called one argument set at a time.
///
/// Each [`call`](Herd::call) returns immediately with a [`CallResult`]; behind
/// the scenes calls are queued and coalesced into invocations of the batched
/// operation by a pool of workers whose size adapts to the backlog within the
/// bounds of the [`Config`].
///
/// `Herd` is a cheap handle: clones share the same queue and workers. Running
/// workers keep the controller alive, so every accepted call is eventually
/// settled even if all handles are dropped.
///
/// # Example
///
/// ```
/// use futures::future::ready;
/// use transparent_herd::Herd;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let herd = Herd::builder(|names: Vec<&'static str>| async move {
///     Ok::<_, String>(
///         names
///             .into_iter()
///             .map(|name| ready(Ok(name.len())))
///             .collect::<Vec<_>>(),
///     )
/// })
/// .max_concurrent(4)
/// .max_batch_size(64)
/// .build()?;
///
/// let (a, b) = (herd.call("herd"), herd.call("transparent"));
/// assert_eq!(a.await?, 4);
/// assert_eq!(b.await?, 11);
/// # Ok(())
/// # }
/// ```
pub struct Herd<A, F>
where
    F: BatchedFn<A>,
{
    inner: Arc<Inner<A, F>>,
}

struct Inner<A, F>
where
    F: BatchedFn<A>,
{
    op: F,
    config: Config,
    runtime: Handle,
    state: Mutex<State<A, F::Output, F::Error>>,
    stats: Stats,
    idle: Notify,
}

struct State<A, T, E> {
    queue: CallQueue<A, T, E>,
    running: HashMap<WorkerId, JoinHandle<()>>,
    next_worker: u64,
}

impl<A, F> Herd<A, F>
where
    A: Send + 'static,
    F: BatchedFn<A>,
{
    /// Starts configuring a controller around `op`.
    pub fn builder(op: F) -> HerdBuilder<A, F> {
        HerdBuilder::new(op)
    }

    /// Builds a controller with the default [`Config`]: one worker at a time,
    /// each claiming the whole queue.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoRuntime`] outside of a Tokio runtime.
    pub fn new(op: F) -> Result<Self> {
        Self::with_config(op, Config::default())
    }

    /// Builds a controller spawning its workers on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid (see [`Config::validate`]) or
    /// if called outside of a Tokio runtime.
    pub fn with_config(op: F, config: Config) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        Self::with_runtime(op, config, runtime)
    }

    /// Builds a controller spawning its workers on `runtime`. The controller
    /// can then be called from any thread, inside a runtime or not.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid (see [`Config::validate`]).
    pub fn with_runtime(op: F, config: Config, runtime: Handle) -> Result<Self> {
        config.validate()?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Starting herd with {config:?}");

        Ok(Self {
            inner: Arc::new(Inner {
                op,
                config,
                runtime,
                state: Mutex::new(State {
                    queue: CallQueue::new(),
                    running: HashMap::new(),
                    next_worker: 0,
                }),
                stats: Stats::default(),
                idle: Notify::new(),
            }),
        })
    }

    /// Submits one argument set.
    ///
    /// Never blocks and never refuses a call: the returned [`CallResult`]
    /// settles with the element of the batched result at this call's
    /// position, or with the error that failed its batch.
    pub fn call(&self, args: A) -> CallResult<F::Output, F::Error> {
        let (deferred, result) = Deferred::new();
        self.inner.stats.record_submitted();

        let mut state = self.inner.state.lock();
        state.queue.push(PendingCall { args, deferred });
        if state.running.len() < self.inner.config.min_concurrent {
            Inner::spawn_worker(&self.inner, &mut state);
        }
        result
    }

    /// Number of batch executions currently in flight.
    pub fn running(&self) -> usize {
        self.inner.state.lock().running.len()
    }

    /// Number of calls not yet claimed by any worker.
    pub fn queued(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Ids of the batch executions currently in flight, in start order.
    pub fn workers(&self) -> Vec<WorkerId> {
        let mut ids: Vec<_> = self.inner.state.lock().running.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The validated bounds this controller runs with.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Copy of the running totals. See [`StatsSnapshot`].
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Waits until no call is queued and no worker runs.
    ///
    /// Calls already handed to the batched operation may still be waiting on
    /// their own element when this returns.
    pub async fn idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            {
                let state = self.inner.state.lock();
                if state.running.is_empty() && state.queue.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }
}

impl<A, F> Inner<A, F>
where
    A: Send + 'static,
    F: BatchedFn<A>,
{
    /// Starts a worker on its share of the queue. The worker counts as running
    /// from this point on, before its batch is even invoked.
    fn spawn_worker(this: &Arc<Self>, state: &mut State<A, F::Output, F::Error>) {
        let running = state.running.len() + 1;
        let take = policy::slice_size(state.queue.len(), running, this.config.max_batch_size);
        let batch = state.queue.take_front(take);
        if batch.is_empty() {
            return;
        }

        let id = WorkerId::new(state.next_worker);
        state.next_worker += 1;
        this.stats.record_batch(batch.len());

        #[cfg(feature = "tracing")]
        tracing::trace!(
            "Spawning {id} with {} calls ({running} running, {} queued)",
            batch.len(),
            state.queue.len()
        );

        let inner = Arc::clone(this);
        let handle = this.runtime.spawn(async move {
            // Panics escaping the batch, e.g. from an element's `Drop`, still
            // release the worker's slot.
            let run = worker::run_batch(id, batch, &inner.op, &inner.runtime);
            let outcome = AssertUnwindSafe(run).catch_unwind().await;
            match outcome {
                Ok(BatchOutcome::Dispatched) => {}
                Ok(BatchOutcome::Rejected) => inner.stats.record_rejected_batch(),
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("{id} panicked while settling its batch");

                    inner.stats.record_rejected_batch();
                }
            }
            inner.finish_worker(id);
        });
        state.running.insert(id, handle);
    }

    /// Completion hook of a worker: the single place deciding whether the
    /// pool shrinks, stays steady or grows.
    fn finish_worker(self: &Arc<Self>, id: WorkerId) {
        let mut state = self.state.lock();
        let queued = state.queue.len();
        let step = policy::continuation(queued, state.running.len(), &self.config);
        state.running.remove(&id);

        match step {
            Continuation::Retire => {
                if queued > 0 {
                    self.stats.record_apoptosis();

                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        "{id} retired with {queued} queued ({} running)",
                        state.running.len()
                    );
                }
            }
            Continuation::Replace => Self::spawn_worker(self, &mut state),
            Continuation::Split => {
                self.stats.record_mitosis();

                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "{id} split with {queued} queued ({} running)",
                    state.running.len() + 1
                );

                Self::spawn_worker(self, &mut state);
                Self::spawn_worker(self, &mut state);
            }
        }

        if state.running.is_empty() && state.queue.is_empty() {
            self.idle.notify_waiters();
        }
    }
}

impl<A, F> Clone for Herd<A, F>
where
    F: BatchedFn<A>,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, F> fmt::Debug for Herd<A, F>
where
    F: BatchedFn<A>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Herd")
            .field("config", &self.inner.config)
            .field("running", &state.running.len())
            .field("queued", &state.queue.len())
            .finish()
    }
}

/// Builder for a [`Herd`]. Bounds are validated eagerly by
/// [`build`](HerdBuilder::build), before any call can be accepted.
pub struct HerdBuilder<A, F> {
    op: F,
    config: Config,
    runtime: Option<Handle>,
    _args: PhantomData<fn(A)>,
}

impl<A, F> HerdBuilder<A, F>
where
    A: Send + 'static,
    F: BatchedFn<A>,
{
    /// Starts from the default [`Config`] and the current runtime.
    pub fn new(op: F) -> Self {
        Self {
            op,
            config: Config::default(),
            runtime: None,
            _args: PhantomData,
        }
    }

    /// Workers started as soon as there is work. Defaults to `1`.
    pub fn min_concurrent(mut self, n: usize) -> Self {
        self.config.min_concurrent = n;
        self
    }

    /// Ceiling on concurrent batch executions. Requires
    /// [`max_batch_size`](Self::max_batch_size).
    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.config.max_concurrent = Some(n);
        self
    }

    /// Largest number of calls passed to one invocation of the operation.
    pub fn max_batch_size(mut self, n: usize) -> Self {
        self.config.max_batch_size = Some(n);
        self
    }

    /// Replaces every bound at once.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Runtime the workers are spawned on. Defaults to the current runtime.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// # Errors
    ///
    /// Returns an error if the bounds are invalid (see [`Config::validate`]),
    /// or if no runtime was given and none is current.
    pub fn build(self) -> Result<Herd<A, F>> {
        match self.runtime {
            Some(runtime) => Herd::with_runtime(self.op, self.config, runtime),
            None => Herd::with_config(self.op, self.config),
        }
    }
}
