//! Stable identifiers for cancellable work.
//!
//! An [`EffectId`] names a unit (or family) of in-flight effects so it can be
//! cancelled later. Ids come in three flavors:
//!
//! - [`EffectId::new`]: random, for combinators that mint a fresh scope.
//! - [`EffectId::named`]: deterministic from a string, so "the search
//!   debounce" is the same id in every process that ever runs.
//! - [`EffectId::derived`] / [`EffectId::for_element`]: deterministic from an
//!   existing id plus a hashable value, for per-entity keys such as "the timer
//!   belonging to row `k`".

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for [`EffectId::named`] ids.
const NAMED_NS: Uuid = Uuid::from_u128(0x9e6c_7a1f_4b2d_4f7e_9a3d_51c0_8b3f_6a19);

/// Namespace for [`EffectId::for_element`] ids.
const ELEMENT_NS: Uuid = Uuid::from_u128(0x2f81_d0ce_63a4_49b1_b0d7_8faa_1c52_93e4);

/// Identifier for a cancellable unit of effect work, or for a lifetime scope
/// that many units hang off.
///
/// `EffectId` is a plain value: creating one registers nothing. Registration
/// happens when an effect carrying the id starts executing.
///
/// # Example
///
/// ```ignore
/// use ratchet::EffectId;
///
/// const DEBOUNCE: &str = "search-debounce";
///
/// // The same name always produces the same id.
/// assert_eq!(EffectId::named(DEBOUNCE), EffectId::named(DEBOUNCE));
///
/// // Per-entity keys derive from a base id and a hashable value.
/// let row_timer = EffectId::named("row-timer").derived(&row_id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EffectId(Uuid);

impl EffectId {
    /// A fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// A deterministic identifier derived from a name.
    ///
    /// Equal names yield equal ids across calls, threads, and processes,
    /// which makes named ids the natural choice for app-defined cancellation
    /// keys ("timer", "search-debounce", ...).
    pub fn named(name: &str) -> Self {
        Self(Uuid::new_v5(&NAMED_NS, name.as_bytes()))
    }

    /// A deterministic identifier derived from this one plus a hashable value.
    ///
    /// Use this to fan a single logical key out across entities:
    /// `EffectId::named("poll").derived(&device_id)`.
    pub fn derived<T: Hash + ?Sized>(self, value: &T) -> Self {
        Self(Uuid::new_v5(&self.0, &stable_hash(value).to_be_bytes()))
    }

    /// The lifetime-scope identifier of an identified-collection element.
    ///
    /// Every effect started by an element's reducer is registered under this
    /// scope, and removing the element from its collection cancels the scope.
    /// Cancelling it by hand (`Effect::cancel(EffectId::for_element(&id))`)
    /// stops that element's in-flight work without removing the element.
    pub fn for_element<T: Hash + ?Sized>(element_id: &T) -> Self {
        Self(Uuid::new_v5(&ELEMENT_NS, &stable_hash(element_id).to_be_bytes()))
    }

    /// Raw UUID form, for collaborators that persist or transmit ids.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EffectId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// Derived ids only have to agree with other ids derived in the same process;
// DefaultHasher with default keys is stable within one build.
fn stable_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_ids_are_stable() {
        assert_eq!(EffectId::named("timer"), EffectId::named("timer"));
        assert_ne!(EffectId::named("timer"), EffectId::named("debounce"));
    }

    #[test]
    fn test_random_ids_are_distinct() {
        assert_ne!(EffectId::new(), EffectId::new());
    }

    #[test]
    fn test_derived_ids_depend_on_base_and_value() {
        let base = EffectId::named("poll");
        let other = EffectId::named("refresh");

        assert_eq!(base.derived(&7u64), base.derived(&7u64));
        assert_ne!(base.derived(&7u64), base.derived(&8u64));
        assert_ne!(base.derived(&7u64), other.derived(&7u64));
    }

    #[test]
    fn test_element_scope_is_stable_per_id() {
        let row = Uuid::new_v4();
        assert_eq!(EffectId::for_element(&row), EffectId::for_element(&row));
        assert_ne!(
            EffectId::for_element(&row),
            EffectId::for_element(&Uuid::new_v4())
        );
    }

    #[test]
    fn test_display_matches_uuid() {
        let id = EffectId::new();
        assert_eq!(id.to_string(), id.as_uuid().to_string());
    }

    #[test]
    fn test_serde_round_trip() {
        let id = EffectId::named("serde");
        let json = serde_json::to_string(&id).unwrap();
        let back: EffectId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
