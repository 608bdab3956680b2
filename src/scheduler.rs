//! ==============================================================================
//! scheduler.rs - periodic persistence of the cached reading
//! ==============================================================================
//!
//! purpose:
//!     every `interval` (30s nominal) copy the last-reading cache into the
//!     history store. runs independently of the serial cadence.
//!
//! tick:
//!     1. snapshot the cache
//!     2. wait on the arbiter for at most the budget
//!     3. acquired -> insert, release; timed out -> skip and log
//!
//! skipped ticks are dropped, never queued. a slow store therefore costs
//! history rows, not memory, and the next tick is a fresh attempt.
//!
//! relationships:
//!     - reads: cache.rs
//!     - writes: store.rs through arbiter.rs
//!     - spawned by: main.rs
//!
//! ==============================================================================

use crate::cache::SensorCache;
use crate::facade::SharedStore;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// default persistence period
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// what one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// snapshot stored under this id
    Persisted(i64),
    /// store stayed busy for the whole budget
    Skipped,
    /// the store rejected the insert
    Failed,
}

pub struct PersistenceScheduler {
    cache: SensorCache,
    store: SharedStore,
    interval: Duration,
    budget: Duration,
}

impl PersistenceScheduler {
    pub fn new(cache: SensorCache, store: SharedStore, interval: Duration, budget: Duration) -> Self {
        Self { cache, store, interval, budget }
    }

    /// persist the current snapshot once
    pub async fn tick(&self) -> TickOutcome {
        let snapshot = self.cache.read();
        debug!(temperature = snapshot.temperature, humidity = snapshot.humidity, "persistence tick");

        let guard = match self.store.acquire("persist", self.budget).await {
            Ok(guard) => guard,
            Err(timed_out) => {
                warn!(budget_s = timed_out.budget.as_secs(), "[XBEE] store busy, skipping this tick");
                return TickOutcome::Skipped;
            }
        };

        match guard.run_blocking(move |store| store.insert(&snapshot)).await {
            Ok(id) => {
                info!(id, temperature = snapshot.temperature, humidity = snapshot.humidity, "[XBEE] reading recorded");
                TickOutcome::Persisted(id)
            }
            Err(e) => {
                error!("[XBEE] failed to record reading: {}", e);
                TickOutcome::Failed
            }
        }
    }

    /// tick forever; the first tick fires one interval after start
    pub async fn run(self) {
        info!(interval_s = self.interval.as_secs(), "[XBEE] starting persistence cycle");
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::StoreArbiter;
    use crate::domain::{from_millis, Reading};
    use crate::store::HistoryStore;

    fn setup(budget: Duration) -> (PersistenceScheduler, SharedStore, SensorCache) {
        let store = StoreArbiter::new(HistoryStore::open_in_memory().unwrap());
        let cache = SensorCache::new();
        let scheduler = PersistenceScheduler::new(cache.clone(), store.clone(), DEFAULT_INTERVAL, budget);
        (scheduler, store, cache)
    }

    #[tokio::test]
    async fn test_tick_persists_snapshot() {
        let (scheduler, store, cache) = setup(Duration::from_secs(1));
        let r = Reading::at(21.5, 40.0, from_millis(1_700_000_000_000));
        cache.update(&r);

        assert_eq!(scheduler.tick().await, TickOutcome::Persisted(1));

        let guard = store.acquire("test", Duration::from_secs(1)).await.unwrap();
        let stored = guard.get_by_id(1).unwrap().unwrap();
        assert!(stored.same_sample(&r));
    }

    #[tokio::test]
    async fn test_ticks_append_in_order() {
        let (scheduler, store, cache) = setup(Duration::from_secs(1));
        cache.update(&Reading::now(1.0, 1.0));
        assert_eq!(scheduler.tick().await, TickOutcome::Persisted(1));
        cache.update(&Reading::now(2.0, 2.0));
        assert_eq!(scheduler.tick().await, TickOutcome::Persisted(2));

        let guard = store.acquire("test", Duration::from_secs(1)).await.unwrap();
        assert_eq!(guard.count().unwrap(), 2);
        assert_eq!(guard.last().unwrap().unwrap().temperature, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_skipped_while_store_busy() {
        let (scheduler, store, _) = setup(Duration::from_secs(1));
        let held = store.acquire("test", Duration::from_secs(1)).await.unwrap();

        let started = Instant::now();
        assert_eq!(scheduler.tick().await, TickOutcome::Skipped);
        assert!(started.elapsed() >= Duration::from_secs(1));

        assert_eq!(held.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_insert_releases_store() {
        let (scheduler, store, _) = setup(Duration::from_secs(1));
        {
            let mut guard = store.acquire("test", Duration::from_secs(1)).await.unwrap();
            guard.break_for_test();
        }
        assert_eq!(scheduler.tick().await, TickOutcome::Failed);
        assert!(!store.is_busy());
    }

    #[tokio::test]
    async fn test_run_records_periodically() {
        let store = StoreArbiter::new(HistoryStore::open_in_memory().unwrap());
        let cache = SensorCache::new();
        cache.update(&Reading::now(20.0, 50.0));
        let scheduler = PersistenceScheduler::new(
            cache,
            store.clone(),
            Duration::from_millis(20),
            Duration::from_secs(1),
        );

        let task = tokio::spawn(scheduler.run());
        tokio::time::sleep(Duration::from_millis(150)).await;
        task.abort();

        let guard = store.acquire("test", Duration::from_secs(1)).await.unwrap();
        assert!(guard.count().unwrap() >= 2);
    }
}
