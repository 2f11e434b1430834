//! Injected capabilities.
//!
//! Reducers stay deterministic by never reaching for ambient facilities
//! directly. Anything non-deterministic a feature needs (time, fresh
//! identifiers) is handed to it as a capability value that tests can swap
//! for a controlled implementation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

/// A source of fresh identifiers.
///
/// Production code injects [`system`](UuidGenerator::system); tests inject
/// [`incrementing`](UuidGenerator::incrementing) so generated ids are stable
/// across runs and assertable by value.
#[derive(Clone)]
pub struct UuidGenerator {
    next: Arc<dyn Fn() -> Uuid + Send + Sync>,
}

impl UuidGenerator {
    /// Random version 4 identifiers.
    pub fn system() -> Self {
        Self {
            next: Arc::new(Uuid::new_v4),
        }
    }

    /// Deterministic identifiers counting up from
    /// `00000000-0000-0000-0000-000000000000`.
    pub fn incrementing() -> Self {
        let counter = Arc::new(AtomicU64::new(0));
        Self {
            next: Arc::new(move || {
                Uuid::from_u128(counter.fetch_add(1, Ordering::Relaxed) as u128)
            }),
        }
    }

    /// Always the same identifier.
    pub fn constant(value: Uuid) -> Self {
        Self {
            next: Arc::new(move || value),
        }
    }

    pub fn generate(&self) -> Uuid {
        (self.next)()
    }
}

impl fmt::Debug for UuidGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UuidGenerator")
    }
}

/// A source of time for effect operations.
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock time.
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock whose sleeps return immediately. Each sleep still yields once,
/// so cancellation keeps a suspension point to take hold at.
pub struct ImmediateClock;

#[async_trait]
impl Clock for ImmediateClock {
    async fn sleep(&self, _duration: Duration) {
        tokio::task::yield_now().await;
    }
}
