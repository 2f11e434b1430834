//! The store: a single-writer runtime for one feature tree.
//!
//! A store owns its state exclusively. Every [`Store::send`] lands on one
//! queue consumed by a worker task; the worker reduces actions strictly one
//! at a time, hands each returned effect to the [`EffectRuntime`], and
//! publishes a state snapshot after every mutation. There is no lock to
//! take and no partially-reduced state to observe.
//!
//! Actions a reducer re-dispatches synchronously (`Effect::send`, including
//! delegate actions bubbling out of child features) are processed before the
//! worker returns to its queue, so a tap, its delegate, and the parent's
//! reaction all commit as one uninterrupted run of reductions.
//!
//! Handles are cheap clones. The last handle to drop tears the store down:
//! the worker stops and every in-flight effect is cancelled through the
//! token tree. [`Store::scope`] derives a handle onto a slice of state and
//! an embedded action type, backed by the same worker.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use crate::cancellation::CancelRegistry;
use crate::effect::ActionSender;
use crate::error::StoreError;
use crate::id::EffectId;
use crate::reducer::Reducer;
use crate::runtime::EffectRuntime;

type SendFn<A> = Arc<dyn Fn(A) -> Result<(), StoreError> + Send + Sync>;
type ReadFn<S> = Arc<dyn Fn() -> S + Send + Sync>;

/// A handle onto a running feature tree.
///
/// All handles derived from one root (clones and [scoped](Store::scope)
/// children alike) share a single worker and keep the store alive together.
pub struct Store<S, A> {
    send_action: SendFn<A>,
    read_state: ReadFn<S>,
    version: watch::Receiver<u64>,
    _guard: Arc<StoreGuard>,
}

impl<S, A> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            send_action: self.send_action.clone(),
            read_state: self.read_state.clone(),
            version: self.version.clone(),
            _guard: self._guard.clone(),
        }
    }
}

impl<S, A> fmt::Debug for Store<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl<S, A> Store<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    /// Builds and starts a store with default settings. Must be called from
    /// within a tokio runtime.
    pub fn new<R>(initial_state: S, reducer: R) -> Self
    where
        R: Reducer<State = S, Action = A>,
    {
        StoreBuilder::new(initial_state, reducer).build()
    }

    /// Enqueues an action for the worker. Never blocks; an action sent after
    /// the store closed is dropped.
    pub fn send(&self, action: A) {
        if (self.send_action)(action).is_err() {
            debug!("action dropped: store is closed");
        }
    }

    /// Like [`send`](Store::send), but reports a closed store instead of
    /// silently dropping the action.
    pub fn try_send(&self, action: A) -> Result<(), StoreError> {
        (self.send_action)(action)
    }

    /// A snapshot of the current state. Taken from the latest published
    /// snapshot; never observes a reduction in progress.
    pub fn state(&self) -> S {
        (self.read_state)()
    }

    /// Waits until the state has changed since this handle last looked.
    /// Intermediate snapshots may be skipped; [`state`](Store::state) always
    /// returns the newest one.
    pub async fn changed(&mut self) -> Result<(), StoreError> {
        self.version.changed().await.map_err(|_| StoreError::Closed)
    }

    /// Derives a handle focused on a slice of this store's state, accepting
    /// a child action type that embeds into the parent's.
    ///
    /// The child handle shares the parent's worker: its sends are reduced by
    /// the root reducer, its snapshots are projections of root snapshots.
    pub fn scope<CS, CA>(
        &self,
        state: impl Fn(&S) -> CS + Send + Sync + 'static,
        action: impl Fn(CA) -> A + Send + Sync + 'static,
    ) -> Store<CS, CA>
    where
        CS: Clone + Send + Sync + 'static,
        CA: Send + 'static,
    {
        let parent_read = self.read_state.clone();
        let parent_send = self.send_action.clone();
        Store {
            send_action: Arc::new(move |child_action| parent_send(action(child_action))),
            read_state: Arc::new(move || state(&parent_read())),
            version: self.version.clone(),
            _guard: self._guard.clone(),
        }
    }
}

// Cancels the root token once the last handle is gone. Effect tasks and the
// worker deliberately hold no guard, otherwise feedback senders would keep
// the store alive forever.
struct StoreGuard {
    root: CancellationToken,
}

impl Drop for StoreGuard {
    fn drop(&mut self) {
        debug!("last store handle dropped; tearing down");
        self.root.cancel();
    }
}

/// Configures and starts a [`Store`].
pub struct StoreBuilder<R: Reducer> {
    initial_state: R::State,
    reducer: R,
    label: String,
}

impl<R: Reducer> StoreBuilder<R> {
    pub fn new(initial_state: R::State, reducer: R) -> Self {
        Self {
            initial_state,
            reducer,
            label: "store".to_string(),
        }
    }

    /// Names the store in log output. Useful when several stores share a
    /// process.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Starts the worker and returns the first handle. Must be called from
    /// within a tokio runtime.
    pub fn build(self) -> Store<R::State, R::Action> {
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(self.initial_state.clone());
        let (version_tx, version_rx) = watch::channel(0u64);
        let root = CancellationToken::new();
        let registry = Arc::new(CancelRegistry::new());

        let effect_tx = action_tx.clone();
        let feedback = ActionSender::new(move |action| {
            if effect_tx.send(action).is_err() {
                debug!("effect action dropped: store worker is gone");
            }
        });
        let runtime = EffectRuntime::new(registry, root.clone(), EffectId::new(), feedback);

        let worker = Worker {
            state: self.initial_state,
            reducer: self.reducer,
            runtime,
            queue: action_rx,
            shutdown: root.clone(),
            state_tx,
            version_tx,
            version: 0,
        };
        let span = info_span!("store", label = %self.label);
        tokio::spawn(worker.run().instrument(span));

        Store {
            send_action: Arc::new(move |action| {
                action_tx.send(action).map_err(|_| StoreError::Closed)
            }),
            read_state: Arc::new(move || state_rx.borrow().clone()),
            version: version_rx,
            _guard: Arc::new(StoreGuard { root }),
        }
    }
}

// Held across the worker's whole run. A reducer panic unwinds the task
// without reaching the shutdown arm; dropping this still cancels the root
// token, so in-flight effects stop exactly as they do when the last handle
// drops.
struct WorkerGuard {
    root: CancellationToken,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

struct Worker<R: Reducer> {
    state: R::State,
    reducer: R,
    runtime: EffectRuntime<R::Action>,
    queue: mpsc::UnboundedReceiver<R::Action>,
    shutdown: CancellationToken,
    state_tx: watch::Sender<R::State>,
    version_tx: watch::Sender<u64>,
    version: u64,
}

impl<R: Reducer> Worker<R> {
    async fn run(mut self) {
        let _teardown = WorkerGuard {
            root: self.shutdown.clone(),
        };
        loop {
            let action = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                action = self.queue.recv() => match action {
                    Some(action) => action,
                    None => break,
                },
            };
            self.dispatch(action);
        }
        debug!("store worker stopped");
    }

    // One dispatch cycle: the triggering action plus every synchronous
    // re-dispatch it causes, in FIFO order, before the queue is consulted
    // again.
    fn dispatch(&mut self, action: R::Action) {
        let mut immediate = VecDeque::new();
        immediate.push_back(action);
        while let Some(next) = immediate.pop_front() {
            let effect = self.reducer.reduce(&mut self.state, next);
            self.runtime.launch(effect, &mut immediate);
            self.publish();
        }
    }

    fn publish(&mut self) {
        self.version += 1;
        self.state_tx.send_replace(self.state.clone());
        self.version_tx.send_replace(self.version);
    }
}
