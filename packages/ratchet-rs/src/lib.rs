//! # Ratchet
//!
//! A unidirectional state-flow runtime where reducers decide, effects
//! execute, and the store serializes every mutation.
//!
//! ## Core Concepts
//!
//! Ratchet separates **deciding** from **doing**:
//! - [`Reducer`] = Decisions (mutate state, describe follow-up work)
//! - [`Effect`] = Deferred work (async operations, re-dispatch, cancellation)
//!
//! The key principle: **every state mutation flows through one queue**.
//! A reducer runs against exclusively-owned state, one action at a time,
//! and whatever it cannot do synchronously it returns as an effect
//! description for the runtime to execute.
//!
//! ## Architecture
//!
//! ```text
//! Store handle(s)
//!     │
//!     ▼ send(Action)
//! Action queue (FIFO)
//!     │
//!     ▼ one at a time
//! Worker ──► Reducer.reduce(&mut State, Action) ──► Effect
//!     │                                               │
//!     ▼ publish snapshot                              ▼ launch
//! Observers                                  Effect runtime
//! (state / changed)                                  │
//!                          ┌─────────────────────────┼────────────────┐
//!                          ▼                         ▼                ▼
//!                    send(action)              run(operation)    cancel(id)
//!                          │                         │
//!                          └── actions feed back ────┘
//! ```
//!
//! ## Key Invariants
//!
//! 1. **State is owned** - Only the worker mutates it; observers get snapshots
//! 2. **Reducers are pure** - No IO, no async; effects are descriptions
//! 3. **Dispatch is serialized** - Actions are reduced strictly in arrival order
//! 4. **Children run first** - Scoped child reducers see their action before
//!    the parent does, so delegate flows resolve within one dispatch
//! 5. **Identity governs lifetime** - Cancelling an identifier (or tearing
//!    down the scope it lives in) cooperatively stops the work registered
//!    under it
//!
//! ## Guarantees
//!
//! - **No torn reads**: a snapshot is always a state some reduction committed
//! - **Coalesced observation**: slow observers may skip intermediate
//!   snapshots but always see the newest
//! - **Cooperative cancellation**: cancelled work stops at its next
//!   suspension point; actions it already produced are not rolled back
//!
//! ## Example
//!
//! ```ignore
//! use ratchet::{Effect, EffectId, Reduce, Store};
//!
//! #[derive(Clone, Default)]
//! struct Search {
//!     query: String,
//!     results: Vec<String>,
//! }
//!
//! #[derive(Clone)]
//! enum SearchAction {
//!     QueryChanged(String),
//!     ResultsArrived(Vec<String>),
//! }
//!
//! let reducer = Reduce::new(|state: &mut Search, action| match action {
//!     SearchAction::QueryChanged(query) => {
//!         state.query = query.clone();
//!         // Re-typing cancels the previous lookup: last writer wins.
//!         Effect::run(move |sender| async move {
//!             let results = fetch_results(&query).await?;
//!             sender.send(SearchAction::ResultsArrived(results));
//!             Ok(())
//!         })
//!         .cancellable(EffectId::named("search"))
//!     }
//!     SearchAction::ResultsArrived(results) => {
//!         state.results = results;
//!         Effect::none()
//!     }
//! });
//!
//! let store = Store::new(Search::default(), reducer);
//! store.send(SearchAction::QueryChanged("tea".into()));
//! ```
//!
//! ## What This Is Not
//!
//! Ratchet is **not**:
//! - A UI toolkit (it has no views; bind observers to whatever renders)
//! - An actor framework
//! - A persistence layer
//! - A global app-state singleton
//!
//! Ratchet **is**:
//! > A unidirectional state-flow runtime where reducers decide, effects
//! > execute, and the store serializes every mutation.

// Core modules
mod cancellation;
mod capability;
mod effect;
mod elements;
mod error;
mod id;
mod identified;
mod optional;
mod reducer;
mod runtime;
mod scope;
mod store;


// Stress tests (test-only)
#[cfg(test)]
mod stress_tests;

// Re-export identity types
pub use id::EffectId;
pub use identified::{Identifiable, IdentifiedArray};

// Re-export effect types
pub use effect::{ActionSender, Effect};

// Re-export reducer types and composition
pub use elements::ForEach;
pub use optional::IfLet;
pub use reducer::{EmptyReducer, Reduce, Reducer};
pub use scope::{CasePath, Scope};

// Re-export store types
pub use store::{Store, StoreBuilder};

// Re-export error types
pub use error::StoreError;

// Re-export injectable capabilities
pub use capability::{Clock, ImmediateClock, SystemClock, UuidGenerator};

// Re-export commonly used external types
pub use async_trait::async_trait;
