//! The effect runtime: interprets effect descriptions into running work.
//!
//! After every reduction the store hands the returned [`Effect`] to
//! [`EffectRuntime::launch`]. The launch walk is synchronous: `send` actions
//! go straight into the store's immediate queue, cancellations take hold
//! before the dispatch cycle ends, and cancellable units are registered
//! before any of their work is polled. Only the asynchronous leaves
//! (`run` operations, concatenations) are handed to spawned tasks.
//!
//! Identifiers are resolved relative to the chain of lifetime scopes an
//! effect was returned under. Two collection rows running the same feature
//! can both use the feature's timer id without trampling each other, and a
//! feature cancelling an id only reaches work that was started in its own
//! scope. Cancellation tokens are created as children of the governing
//! scope's token, so tearing down a scope (or the store itself) propagates
//! to every unit underneath without bookkeeping.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::cancellation::CancelRegistry;
use crate::effect::{ActionSender, Effect, Kind, RunSpec};
use crate::id::EffectId;

pub(crate) struct EffectRuntime<A> {
    registry: Arc<CancelRegistry>,
    root: CancellationToken,
    namespace: EffectId,
    sender: ActionSender<A>,
}

impl<A: Send + 'static> EffectRuntime<A> {
    pub(crate) fn new(
        registry: Arc<CancelRegistry>,
        root: CancellationToken,
        namespace: EffectId,
        sender: ActionSender<A>,
    ) -> Self {
        Self {
            registry,
            root,
            namespace,
            sender,
        }
    }

    /// Interprets one effect description. Synchronous `send` actions are
    /// pushed onto `immediate` in walk order; everything asynchronous is
    /// spawned.
    pub(crate) fn launch(&self, effect: Effect<A>, immediate: &mut VecDeque<A>) {
        self.walk(effect, &self.root, self.namespace, immediate);
    }

    fn ctx(&self) -> DriveCtx<A> {
        DriveCtx {
            registry: self.registry.clone(),
            sender: self.sender.clone(),
        }
    }

    fn walk(
        &self,
        effect: Effect<A>,
        parent: &CancellationToken,
        namespace: EffectId,
        immediate: &mut VecDeque<A>,
    ) {
        match effect.kind {
            Kind::None => {}
            Kind::Send(action) => immediate.push_back(action),
            Kind::Run(spec) => {
                tokio::spawn(run_unit(spec, parent.child_token(), self.sender.clone()));
            }
            Kind::Cancellable {
                id,
                cancel_in_flight,
                inner,
            } => {
                let key = namespace.derived(&id);
                let registration = self.registry.register(key, parent, cancel_in_flight);
                let ctx = self.ctx();
                tokio::spawn(async move {
                    drive(*inner, registration.token.clone(), namespace, ctx.clone()).await;
                    ctx.registry.deregister(key, &registration);
                });
            }
            Kind::Scoped { scope, inner } => {
                let key = namespace.derived(&scope);
                let token = self.registry.scope_token(key, parent);
                self.walk(*inner, &token, key, immediate);
            }
            Kind::Merge(parts) => {
                for part in parts {
                    self.walk(part, parent, namespace, immediate);
                }
            }
            Kind::Concat(parts) => {
                let token = parent.child_token();
                let ctx = self.ctx();
                tokio::spawn(drive_sequence(parts, token, namespace, ctx));
            }
            Kind::Cancel(id) => {
                debug!(%id, "explicit cancellation");
                self.registry.cancel(namespace.derived(&id));
            }
        }
    }
}

struct DriveCtx<A> {
    registry: Arc<CancelRegistry>,
    sender: ActionSender<A>,
}

impl<A> Clone for DriveCtx<A> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            sender: self.sender.clone(),
        }
    }
}

// The asynchronous interpreter for effect trees that were handed to a task.
// Mirrors the launch walk, except `send` goes through the store's channel
// (the dispatch cycle that produced the effect is long over).
fn drive<A: Send + 'static>(
    effect: Effect<A>,
    token: CancellationToken,
    namespace: EffectId,
    ctx: DriveCtx<A>,
) -> BoxFuture<'static, ()> {
    async move {
        match effect.kind {
            Kind::None => {}
            Kind::Send(action) => ctx.sender.send(action),
            Kind::Run(spec) => run_unit(spec, token, ctx.sender.clone()).await,
            Kind::Cancellable {
                id,
                cancel_in_flight,
                inner,
            } => {
                let key = namespace.derived(&id);
                let registration = ctx.registry.register(key, &token, cancel_in_flight);
                drive(*inner, registration.token.clone(), namespace, ctx.clone()).await;
                ctx.registry.deregister(key, &registration);
            }
            Kind::Scoped { scope, inner } => {
                let key = namespace.derived(&scope);
                let scope_token = ctx.registry.scope_token(key, &token);
                drive(*inner, scope_token, key, ctx).await;
            }
            Kind::Merge(parts) => {
                let mut branches = Vec::with_capacity(parts.len());
                for part in parts {
                    branches.push(tokio::spawn(drive(part, token.clone(), namespace, ctx.clone())));
                }
                for branch in branches {
                    if let Err(join_error) = branch.await {
                        if join_error.is_panic() {
                            let payload = join_error.into_panic();
                            let panic_msg = extract_panic_message(&payload);
                            error!(panic = %panic_msg, "merged effect branch panicked");
                        }
                    }
                }
            }
            Kind::Concat(parts) => {
                for part in parts {
                    if token.is_cancelled() {
                        break;
                    }
                    drive(part, token.clone(), namespace, ctx.clone()).await;
                }
            }
            Kind::Cancel(id) => ctx.registry.cancel(namespace.derived(&id)),
        }
    }
    .boxed()
}

async fn drive_sequence<A: Send + 'static>(
    parts: Vec<Effect<A>>,
    token: CancellationToken,
    namespace: EffectId,
    ctx: DriveCtx<A>,
) {
    for part in parts {
        if token.is_cancelled() {
            break;
        }
        drive(part, token.clone(), namespace, ctx.clone()).await;
    }
}

/// Runs one `run` operation to completion, cancellation, or panic.
///
/// Cancellation is checked first, so a unit whose token was cancelled before
/// its task ever polled never executes. A panic is contained to the unit and
/// logged; sibling units and the store keep going.
async fn run_unit<A: Send + 'static>(
    spec: RunSpec<A>,
    token: CancellationToken,
    sender: ActionSender<A>,
) {
    let RunSpec { operation, catch } = spec;
    let catch_sender = sender.clone();
    let work = async move {
        match operation(sender).await {
            Ok(()) => {}
            Err(error) => match catch {
                Some(handler) => handler(error, catch_sender).await,
                None => error!(error = ?error, "effect operation failed with no catch handler"),
            },
        }
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => {
            debug!("effect unit stopped by cancellation");
        }
        outcome = AssertUnwindSafe(work).catch_unwind() => {
            if let Err(panic_info) = outcome {
                let panic_msg = extract_panic_message(&panic_info);
                error!(panic = %panic_msg, "effect operation panicked");
            }
        }
    }
}

/// Extract a human-readable message from a panic payload.
fn extract_panic_message(panic_info: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
