//! ==============================================================================
//! arbiter.rs - store access arbiter
//! ==============================================================================
//!
//! purpose:
//!     the history store can only serve one operation at a time. every insert
//!     and every query goes through this gate first.
//!
//! contract:
//!     - acquire(caller, budget) waits until the store is free or the budget
//!       runs out
//!     - Ok(StoreGuard): the caller owns the store until the guard is dropped
//!     - Err(TimedOut): nothing changed; the caller degrades (serve the cache,
//!       skip the tick) instead of failing
//!     - release happens on drop, so error paths and panics inside the
//!       guarded operation always free the store
//!     - no fairness/ordering promise between waiters
//!
//! relationships:
//!     - guards: store.rs (HistoryStore)
//!     - used by: scheduler.rs (inserts), facade.rs (queries)
//!
//! ==============================================================================

use crate::error::StoreResult;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::debug;

/// standard wait budget for store access
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(60);

/// the store stayed busy for the whole budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedOut {
    pub budget: Duration,
}

impl std::fmt::Display for TimedOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Device was blocked for more than {} seconds", self.budget.as_secs())
    }
}

/// single-holder gate in front of a resource
///
/// Clone-able handle; every clone arbitrates the same resource.
pub struct StoreArbiter<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for StoreArbiter<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: Send + 'static> StoreArbiter<T> {
    pub fn new(resource: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(resource)),
        }
    }

    /// wait at most `budget` for exclusive access
    ///
    /// `caller` only labels the wait in the logs.
    pub async fn acquire(&self, caller: &'static str, budget: Duration) -> Result<StoreGuard<T>, TimedOut> {
        let started = Instant::now();
        match tokio::time::timeout(budget, self.inner.clone().lock_owned()).await {
            Ok(guard) => {
                debug!(caller, waited_ms = waited_ms(started), "store acquired");
                Ok(StoreGuard { guard })
            }
            Err(_) => {
                debug!(caller, waited_ms = waited_ms(started), "store still busy, giving up");
                Err(TimedOut { budget })
            }
        }
    }

    /// take the store only if nobody holds it right now
    pub fn try_acquire(&self) -> Option<StoreGuard<T>> {
        self.inner
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| StoreGuard { guard })
    }

    /// true while some caller holds the store
    pub fn is_busy(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

fn waited_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// exclusive access to the arbitrated resource; dropping it releases the store
pub struct StoreGuard<T> {
    guard: OwnedMutexGuard<T>,
}

impl<T: Send + 'static> StoreGuard<T> {
    /// release the store explicitly (same as dropping the guard)
    pub fn release(self) {}

    /// run a blocking operation on the blocking pool while holding the store
    ///
    /// the guard moves into the blocking task and is dropped there, after the
    /// operation finished, whether it returned an error or panicked.
    pub async fn run_blocking<R, F>(self, op: F) -> StoreResult<R>
    where
        F: FnOnce(&mut T) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let mut guard = self.guard;
        tokio::task::spawn_blocking(move || op(&mut *guard)).await?
    }
}

impl<T> Deref for StoreGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for StoreGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
