//! Registry of in-flight cancellable work.
//!
//! Every unit the effect runtime starts under an [`EffectId`] owns a
//! [`CancellationToken`] recorded here. Tokens are created as children of the
//! governing scope's token, so cancelling a scope (presentation dismissed,
//! element removed, store torn down) reaches every unit underneath without
//! the registry walking anything.
//!
//! Two kinds of entry share the id space:
//!
//! - **units**: one registration per started `cancellable` effect,
//!   deregistered on natural completion, evicted by last-writer-wins
//!   re-registration;
//! - **scopes**: persistent per-lifetime tokens (a presented child, a
//!   collection element), created on first use and removed only by
//!   cancellation.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use smallvec::{smallvec, SmallVec};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::id::EffectId;

struct Unit {
    generation: u64,
    token: CancellationToken,
}

type UnitList = SmallVec<[Unit; 2]>;

/// Receipt for one registered unit. Holds the unit's token and the generation
/// needed to deregister exactly this unit later.
pub(crate) struct Registration {
    pub(crate) token: CancellationToken,
    generation: u64,
}

pub(crate) struct CancelRegistry {
    units: DashMap<EffectId, UnitList>,
    scopes: DashMap<EffectId, CancellationToken>,
    generations: AtomicU64,
}

impl CancelRegistry {
    pub(crate) fn new() -> Self {
        Self {
            units: DashMap::new(),
            scopes: DashMap::new(),
            generations: AtomicU64::new(0),
        }
    }

    /// Registers a unit under `id`, deriving its token from `parent`.
    ///
    /// With `cancel_in_flight`, every unit currently registered under `id` is
    /// cancelled and evicted first (last-writer-wins). Without it, the new
    /// unit coexists with the old ones.
    pub(crate) fn register(
        &self,
        id: EffectId,
        parent: &CancellationToken,
        cancel_in_flight: bool,
    ) -> Registration {
        let token = parent.child_token();
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let unit = Unit {
            generation,
            token: token.clone(),
        };
        match self.units.entry(id) {
            Entry::Occupied(mut occupied) => {
                let units = occupied.get_mut();
                if cancel_in_flight {
                    debug!(%id, evicted = units.len(), "re-registration cancels in-flight units");
                    for evicted in units.drain(..) {
                        evicted.token.cancel();
                    }
                }
                units.push(unit);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(smallvec![unit]);
            }
        }
        Registration { token, generation }
    }

    /// Removes a completed unit's registration. Successors that re-registered
    /// the same id are untouched; a unit already evicted is a no-op.
    pub(crate) fn deregister(&self, id: EffectId, registration: &Registration) {
        if let Entry::Occupied(mut occupied) = self.units.entry(id) {
            let units = occupied.get_mut();
            units.retain(|unit| unit.generation != registration.generation);
            if units.is_empty() {
                occupied.remove();
            }
        }
    }

    /// The persistent token of a lifetime scope, created as a child of
    /// `parent` on first use. The first creation binds the parent; later
    /// calls return the existing token regardless of `parent`.
    ///
    /// A scope can die through an ancestor without `cancel` ever seeing its
    /// id. When that happened, the next use starts a fresh lifetime under
    /// the current parent.
    pub(crate) fn scope_token(
        &self,
        scope: EffectId,
        parent: &CancellationToken,
    ) -> CancellationToken {
        match self.scopes.entry(scope) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_cancelled() {
                    let fresh = parent.child_token();
                    occupied.insert(fresh.clone());
                    fresh
                } else {
                    occupied.get().clone()
                }
            }
            Entry::Vacant(vacant) => {
                let token = parent.child_token();
                vacant.insert(token.clone());
                token
            }
        }
    }

    /// Cancels everything registered under `id`, units and scope alike.
    /// Idempotent: cancelling an id with no registrations does nothing.
    pub(crate) fn cancel(&self, id: EffectId) {
        if let Some((_, units)) = self.units.remove(&id) {
            debug!(%id, count = units.len(), "cancelling in-flight units");
            for unit in units {
                unit.token.cancel();
            }
        }
        if let Some((_, token)) = self.scopes.remove(&id) {
            debug!(%id, "cancelling lifetime scope");
            token.cancel();
        }
    }

    #[cfg(test)]
    pub(crate) fn unit_count(&self, id: EffectId) -> usize {
        self.units.get(&id).map(|units| units.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn registered_ids(&self) -> usize {
        self.units.len()
    }
}
