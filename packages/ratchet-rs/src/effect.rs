//! Effect descriptions.
//!
//! A reducer never performs work; it returns an [`Effect`] *describing* work.
//! The store's effect runtime interprets the description after the state
//! mutation committed: async operations are spawned, produced actions feed
//! back into the dispatch queue, and identifiers let later actions cancel
//! work that is still in flight.
//!
//! Effects form a small algebra:
//!
//! | Constructor                 | Meaning                                          |
//! |-----------------------------|--------------------------------------------------|
//! | [`Effect::none`]            | nothing to do                                    |
//! | [`Effect::send`]            | feed one action straight back into dispatch      |
//! | [`Effect::run`]             | async operation yielding zero or more actions    |
//! | [`Effect::merge`]           | run parts concurrently                           |
//! | [`Effect::concatenate`]     | run parts in order, each after the previous ends |
//! | [`Effect::cancel`]          | stop everything registered under an identifier   |
//!
//! and two wrappers that tie work to an identifier:
//! [`cancellable`](Effect::cancellable) (starting it cancels in-flight work
//! under the same id) and
//! [`cancellable_concurrent`](Effect::cancellable_concurrent) (instances
//! under the id coexist).

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::id::EffectId;

/// Handle a [`run`](Effect::run) operation uses to feed actions back into the
/// dispatcher.
///
/// `send` is synchronous and never blocks: the action lands on the store's
/// queue and is reduced in arrival order. Actions sent from one operation are
/// delivered in the order they were sent.
pub struct ActionSender<A> {
    deliver: Arc<dyn Fn(A) + Send + Sync>,
}

impl<A> Clone for ActionSender<A> {
    fn clone(&self) -> Self {
        Self {
            deliver: self.deliver.clone(),
        }
    }
}

impl<A> ActionSender<A> {
    pub(crate) fn new(deliver: impl Fn(A) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Feeds one action back into the store's dispatch queue.
    pub fn send(&self, action: A) {
        (self.deliver)(action);
    }

    // Adapts the sender to accept a different action type, delivering `f(b)`.
    pub(crate) fn premap<B>(self, f: impl Fn(B) -> A + Send + Sync + 'static) -> ActionSender<B>
    where
        A: 'static,
    {
        let deliver = self.deliver;
        ActionSender {
            deliver: Arc::new(move |b| deliver(f(b))),
        }
    }
}

impl<A> fmt::Debug for ActionSender<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActionSender")
    }
}

type RunOperation<A> =
    Box<dyn FnOnce(ActionSender<A>) -> BoxFuture<'static, anyhow::Result<()>> + Send>;
type CatchHandler<A> =
    Box<dyn FnOnce(anyhow::Error, ActionSender<A>) -> BoxFuture<'static, ()> + Send>;

pub(crate) struct RunSpec<A> {
    pub(crate) operation: RunOperation<A>,
    pub(crate) catch: Option<CatchHandler<A>>,
}

impl<A: Send + 'static> RunSpec<A> {
    fn map<B: Send + 'static>(self, f: Arc<dyn Fn(A) -> B + Send + Sync>) -> RunSpec<B> {
        let RunSpec { operation, catch } = self;
        let op_map = f.clone();
        let mapped_operation: RunOperation<B> =
            Box::new(move |sender| -> BoxFuture<'static, anyhow::Result<()>> {
                let sender = sender.premap(move |a| op_map(a));
                operation(sender)
            });
        let mapped_catch = catch.map(|handler| -> CatchHandler<B> {
            Box::new(move |error, sender| -> BoxFuture<'static, ()> {
                let sender = sender.premap(move |a| f(a));
                handler(error, sender)
            })
        });
        RunSpec {
            operation: mapped_operation,
            catch: mapped_catch,
        }
    }
}

pub(crate) enum Kind<A> {
    None,
    Send(A),
    Run(RunSpec<A>),
    Cancellable {
        id: EffectId,
        cancel_in_flight: bool,
        inner: Box<Effect<A>>,
    },
    Scoped {
        scope: EffectId,
        inner: Box<Effect<A>>,
    },
    Merge(Vec<Effect<A>>),
    Concat(Vec<Effect<A>>),
    Cancel(EffectId),
}

/// A description of deferred work returned by a reducer.
///
/// Descriptions are inert values; nothing happens until the store's runtime
/// interprets them after the reducer's state mutation has been applied.
///
/// # Example
///
/// ```ignore
/// use ratchet::{Effect, EffectId};
/// use std::time::Duration;
///
/// const TICK: &str = "tick";
///
/// fn start_timer() -> Effect<Action> {
///     Effect::run(|sender| async move {
///         loop {
///             tokio::time::sleep(Duration::from_secs(1)).await;
///             sender.send(Action::Tick);
///         }
///     })
///     .cancellable(EffectId::named(TICK))
/// }
///
/// fn stop_timer() -> Effect<Action> {
///     Effect::cancel(EffectId::named(TICK))
/// }
/// ```
pub struct Effect<A> {
    pub(crate) kind: Kind<A>,
}

impl<A> Effect<A> {
    /// No work.
    pub fn none() -> Self {
        Self { kind: Kind::None }
    }

    /// Feeds a single action back into dispatch, ahead of any actions that
    /// arrive from concurrently running effects.
    ///
    /// Prefer plain sequential logic inside the reducer when possible;
    /// `send` exists for composition, most prominently for child reducers
    /// signalling their parent via delegate actions.
    pub fn send(action: A) -> Self {
        Self {
            kind: Kind::Send(action),
        }
    }

    /// An asynchronous operation that may yield any number of actions through
    /// the provided [`ActionSender`].
    ///
    /// The operation result is `anyhow::Result<()>`: domain failures the
    /// caller wants to observe must be converted into actions *inside* the
    /// operation. An `Err` escaping the operation is treated as a programming
    /// error and logged; the runtime performs no recovery. Use
    /// [`run_catching`](Effect::run_catching) to turn escaped errors into
    /// actions instead.
    ///
    /// Cancellation is cooperative: when the effect's identifier (or its
    /// surrounding lifetime scope) is cancelled, the operation is dropped at
    /// its next suspension point. Actions already sent remain in the queue.
    pub fn run<F, Fut>(operation: F) -> Self
    where
        A: Send + 'static,
        F: FnOnce(ActionSender<A>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            kind: Kind::Run(RunSpec {
                operation: Box::new(move |sender| -> BoxFuture<'static, anyhow::Result<()>> {
                    Box::pin(operation(sender))
                }),
                catch: None,
            }),
        }
    }

    /// Like [`run`](Effect::run), but an error escaping the operation is
    /// handed to `catch`, which may translate it into actions.
    pub fn run_catching<F, Fut, C, CFut>(operation: F, catch: C) -> Self
    where
        A: Send + 'static,
        F: FnOnce(ActionSender<A>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
        C: FnOnce(anyhow::Error, ActionSender<A>) -> CFut + Send + 'static,
        CFut: Future<Output = ()> + Send + 'static,
    {
        Self {
            kind: Kind::Run(RunSpec {
                operation: Box::new(move |sender| -> BoxFuture<'static, anyhow::Result<()>> {
                    Box::pin(operation(sender))
                }),
                catch: Some(Box::new(move |error, sender| -> BoxFuture<'static, ()> {
                    Box::pin(catch(error, sender))
                })),
            }),
        }
    }

    /// Runs all parts concurrently. Completion order between parts is
    /// unspecified; actions from different parts interleave as produced.
    pub fn merge(effects: impl IntoIterator<Item = Effect<A>>) -> Self {
        let mut parts: Vec<Effect<A>> = effects.into_iter().filter(|e| !e.is_none()).collect();
        if parts.is_empty() {
            return Self::none();
        }
        if parts.len() == 1 {
            return parts.remove(0);
        }
        Self {
            kind: Kind::Merge(parts),
        }
    }

    /// Runs parts strictly in order: a later part starts only after every
    /// earlier part has completed (or was cancelled).
    pub fn concatenate(effects: impl IntoIterator<Item = Effect<A>>) -> Self {
        let mut parts: Vec<Effect<A>> = effects.into_iter().filter(|e| !e.is_none()).collect();
        if parts.is_empty() {
            return Self::none();
        }
        if parts.len() == 1 {
            return parts.remove(0);
        }
        Self {
            kind: Kind::Concat(parts),
        }
    }

    /// Cancels every in-flight unit registered under `id`. A no-op when
    /// nothing is registered.
    pub fn cancel(id: EffectId) -> Self {
        Self {
            kind: Kind::Cancel(id),
        }
    }

    /// Registers this effect under `id` when it starts, cancelling any work
    /// already in flight under the same id (last-writer-wins).
    ///
    /// The whole wrapped effect counts as one unit: `Effect::cancel(id)`
    /// stops all of it, and natural completion deregisters it.
    pub fn cancellable(self, id: EffectId) -> Self {
        Self {
            kind: Kind::Cancellable {
                id,
                cancel_in_flight: true,
                inner: Box::new(self),
            },
        }
    }

    /// Registers this effect under `id` without disturbing work already in
    /// flight under the same id; instances coexist and a single
    /// `Effect::cancel(id)` stops them all.
    pub fn cancellable_concurrent(self, id: EffectId) -> Self {
        Self {
            kind: Kind::Cancellable {
                id,
                cancel_in_flight: false,
                inner: Box::new(self),
            },
        }
    }

    // Ties the effect to a lifetime scope: units inside run under the scope's
    // token and die with it. Unlike `cancellable`, scope registration is
    // persistent (no completion-deregistration) and never evicts siblings.
    pub(crate) fn scoped(self, scope: EffectId) -> Self {
        if self.is_none() {
            return self;
        }
        Self {
            kind: Kind::Scoped {
                scope,
                inner: Box::new(self),
            },
        }
    }

    /// Whether this is the empty effect.
    pub fn is_none(&self) -> bool {
        matches!(self.kind, Kind::None)
    }

    /// Rewrites every action this effect produces or embeds, for lifting a
    /// child effect into a parent action type.
    pub fn map<B, F>(self, f: F) -> Effect<B>
    where
        A: Send + 'static,
        B: Send + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        self.map_shared(Arc::new(f))
    }

    fn map_shared<B>(self, f: Arc<dyn Fn(A) -> B + Send + Sync>) -> Effect<B>
    where
        A: Send + 'static,
        B: Send + 'static,
    {
        let kind = match self.kind {
            Kind::None => Kind::None,
            Kind::Send(action) => Kind::Send(f(action)),
            Kind::Run(spec) => Kind::Run(spec.map(f)),
            Kind::Cancellable {
                id,
                cancel_in_flight,
                inner,
            } => Kind::Cancellable {
                id,
                cancel_in_flight,
                inner: Box::new(inner.map_shared(f)),
            },
            Kind::Scoped { scope, inner } => Kind::Scoped {
                scope,
                inner: Box::new(inner.map_shared(f)),
            },
            Kind::Merge(parts) => Kind::Merge(
                parts
                    .into_iter()
                    .map(|part| part.map_shared(f.clone()))
                    .collect(),
            ),
            Kind::Concat(parts) => Kind::Concat(
                parts
                    .into_iter()
                    .map(|part| part.map_shared(f.clone()))
                    .collect(),
            ),
            Kind::Cancel(id) => Kind::Cancel(id),
        };
        Effect { kind }
    }
}

// Shape-only Debug: actions are opaque, operations are futures.
impl<A> fmt::Debug for Effect<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::None => f.write_str("none"),
            Kind::Send(_) => f.write_str("send(..)"),
            Kind::Run(spec) => {
                if spec.catch.is_some() {
                    f.write_str("run(.., catch)")
                } else {
                    f.write_str("run(..)")
                }
            }
            Kind::Cancellable {
                id,
                cancel_in_flight,
                inner,
            } => f
                .debug_struct("cancellable")
                .field("id", id)
                .field("cancel_in_flight", cancel_in_flight)
                .field("inner", inner)
                .finish(),
            Kind::Scoped { scope, inner } => f
                .debug_struct("scoped")
                .field("scope", scope)
                .field("inner", inner)
                .finish(),
            Kind::Merge(parts) => f.debug_list().entries(parts).finish(),
            Kind::Concat(parts) => {
                f.write_str("concat")?;
                f.debug_list().entries(parts).finish()
            }
            Kind::Cancel(id) => write!(f, "cancel({id})"),
        }
    }
}
