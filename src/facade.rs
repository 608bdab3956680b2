//! ==============================================================================
//! facade.rs - query facade (boundary to the transport layer)
//! ==============================================================================
//!
//! purpose:
//!     the one entry point external callers (the http layer) use to reach
//!     sensor data. cache reads never block; store queries wait on the
//!     arbiter for at most the budget and report TimedOut instead of hanging.
//!
//! fallback rules:
//!     - last / by-id: on timeout or empty result, serve the cached reading
//!     - count / text: on timeout, the "device busy" message
//!     - list: on timeout, an empty list
//!
//! relationships:
//!     - reads: cache.rs (SensorCache)
//!     - waits on: arbiter.rs, then runs store.rs queries on the blocking pool
//!     - used by: server.rs
//!
//! ==============================================================================

use crate::arbiter::{StoreArbiter, TimedOut};
use crate::cache::SensorCache;
use crate::domain::Reading;
use crate::error::StoreResult;
use crate::store::HistoryStore;
use std::time::Duration;
use tracing::{debug, warn};

/// the history store behind its access arbiter
pub type SharedStore = StoreArbiter<HistoryStore>;

/// a read-only store operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    GetById(i64),
    Last,
    Count,
    Range { limit: usize, start_ms: i64, end_ms: i64 },
}

impl StoreOp {
    fn label(&self) -> &'static str {
        match self {
            StoreOp::GetById(_) => "Id",
            StoreOp::Last => "Last",
            StoreOp::Count => "Count",
            StoreOp::Range { .. } => "List",
        }
    }

    fn run(self, store: &HistoryStore) -> StoreResult<QueryResult> {
        Ok(match self {
            StoreOp::GetById(id) => QueryResult::Reading(store.get_by_id(id)?),
            StoreOp::Last => QueryResult::Reading(store.last()?),
            StoreOp::Count => QueryResult::Count(store.count()?),
            StoreOp::Range { limit, start_ms, end_ms } => {
                QueryResult::Readings(store.range(limit, start_ms, end_ms)?)
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// GetById / Last; None when no such row exists
    Reading(Option<Reading>),
    Count(u64),
    Readings(Vec<Reading>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Done(QueryResult),
    TimedOut(TimedOut),
}

#[derive(Clone)]
pub struct QueryFacade {
    cache: SensorCache,
    store: SharedStore,
    budget: Duration,
}

impl QueryFacade {
    pub fn new(cache: SensorCache, store: SharedStore, budget: Duration) -> Self {
        Self { cache, store, budget }
    }

    /// latest reading from the cache; never blocks, never fails
    pub fn cache_read(&self) -> Reading {
        self.cache.read()
    }

    /// configured wait budget
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// run `op` against the store, waiting at most `budget` for access
    pub async fn store_query(&self, op: StoreOp, budget: Duration) -> StoreResult<QueryOutcome> {
        Ok(match self.with_store(op.label(), budget, move |store| op.run(store)).await? {
            Ok(result) => QueryOutcome::Done(result),
            Err(timed_out) => QueryOutcome::TimedOut(timed_out),
        })
    }

    /// last recorded reading, or the cached one
    pub async fn latest_or_cached(&self) -> StoreResult<Reading> {
        let found = self.with_store(StoreOp::Last.label(), self.budget, |store| store.last()).await?;
        Ok(self.or_cache(found))
    }

    /// recorded reading `id`, or the cached one when unknown or busy
    pub async fn reading_or_cached(&self, id: i64) -> StoreResult<Reading> {
        let op = StoreOp::GetById(id);
        let found = self.with_store(op.label(), self.budget, move |store| store.get_by_id(id)).await?;
        Ok(self.or_cache(found))
    }

    /// number of recorded readings as text, or the busy message
    pub async fn count_or_busy(&self) -> StoreResult<String> {
        Ok(match self.with_store(StoreOp::Count.label(), self.budget, |store| store.count()).await? {
            Ok(n) => n.to_string(),
            Err(timed_out) => timed_out.to_string(),
        })
    }

    /// downsampled history, or nothing when busy
    pub async fn list_or_empty(&self, limit: usize, start_ms: i64, end_ms: i64) -> StoreResult<Vec<Reading>> {
        let op = StoreOp::Range { limit, start_ms, end_ms };
        match self.with_store(op.label(), self.budget, move |store| store.range(limit, start_ms, end_ms)).await? {
            Ok(rows) => {
                debug!(returned = rows.len(), "range query done");
                Ok(rows)
            }
            Err(_) => Ok(Vec::new()),
        }
    }

    /// text form of the last reading, or the busy message
    pub async fn latest_text(&self) -> StoreResult<String> {
        Ok(match self.with_store(StoreOp::Last.label(), self.budget, |store| store.last()).await? {
            Ok(found) => found.unwrap_or_else(|| self.cache.read()).to_string(),
            Err(timed_out) => timed_out.to_string(),
        })
    }

    /// wait for the store, then run `op` on the blocking pool
    ///
    /// the outer error is a backend failure, the inner one a timeout.
    async fn with_store<R, F>(
        &self,
        label: &'static str,
        budget: Duration,
        op: F,
    ) -> StoreResult<Result<R, TimedOut>>
    where
        F: FnOnce(&HistoryStore) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let guard = match self.store.acquire(label, budget).await {
            Ok(guard) => guard,
            Err(timed_out) => {
                warn!(query = label, budget_s = budget.as_secs(), "store busy, query not served");
                return Ok(Err(timed_out));
            }
        };
        debug!(query = label, "running store query");
        let result = guard.run_blocking(move |store| op(store)).await?;
        Ok(Ok(result))
    }

    fn or_cache(&self, found: Result<Option<Reading>, TimedOut>) -> Reading {
        match found {
            Ok(Some(reading)) => reading,
            _ => self.cache.read(),
        }
    }
}
