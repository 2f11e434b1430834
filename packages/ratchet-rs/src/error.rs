//! Error types surfaced by store handles.

use thiserror::Error;

/// Why an interaction with a [`Store`](crate::store::Store) handle failed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// The store's worker is no longer running. Either every handle was
    /// dropped and the store tore itself down, or the worker stopped after a
    /// reducer panic.
    #[error("store is closed")]
    Closed,
}
