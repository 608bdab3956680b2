//! ==============================================================================
//! store.rs - history store / query engine
//! ==============================================================================
//!
//! purpose:
//!     append-only history of readings in an embedded sqlite database.
//!     insert assigns sequential ids; queries are point lookup, last, count
//!     and a downsampled time-range scan.
//!
//! access rule:
//!     HistoryStore is not shared directly. it lives inside the StoreArbiter
//!     and every method below is called by whoever currently holds the guard.
//!     all methods are blocking and run on the blocking pool.
//!
//! table:
//!     history(id INTEGER PK AUTOINCREMENT, time INTEGER ms, temp REAL, hum REAL)
//!
//! ==============================================================================

use crate::domain::{from_millis, Reading};
use crate::error::StoreResult;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info};

/// range queries return at most this many points when no limit is given
pub const DEFAULT_RANGE_LIMIT: usize = 100;

/// default range start, 2012-01-01T00:00:00 local (epoch ms)
pub const DEFAULT_RANGE_START_MS: i64 = 1_325_286_000_603;

/// default range end, 2020-01-01T00:00:00 local (epoch ms)
pub const DEFAULT_RANGE_END_MS: i64 = 1_577_746_800_603;

const HISTORY_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS history (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    time    INTEGER NOT NULL,
    temp    REAL NOT NULL,
    hum     REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS history_time ON history (time);
";

const SELECT_COLUMNS: &str = "SELECT id, time, temp, hum FROM history";

pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    /// open (or create) the history database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(HISTORY_SCHEMA)?;
        info!(path = %path.as_ref().display(), "history store ready");
        Ok(Self { conn })
    }

    /// in-memory store (tests, dry runs)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(HISTORY_SCHEMA)?;
        Ok(Self { conn })
    }

    /// append a reading, returning the id it was given
    pub fn insert(&mut self, reading: &Reading) -> StoreResult<i64> {
        self.conn.execute(
            "INSERT INTO history (time, temp, hum) VALUES (?1, ?2, ?3)",
            params![reading.timestamp_ms(), reading.temperature, reading.humidity],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, "reading recorded");
        Ok(id)
    }

    pub fn get_by_id(&self, id: i64) -> StoreResult<Option<Reading>> {
        let reading = self
            .conn
            .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], row_to_reading)
            .optional()?;
        Ok(reading)
    }

    /// highest-id row
    pub fn last(&self) -> StoreResult<Option<Reading>> {
        let reading = self
            .conn
            .query_row(&format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT 1"), [], row_to_reading)
            .optional()?;
        Ok(reading)
    }

    pub fn count(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// rows with time in [start_ms, end_ms], downsampled to roughly `limit` points
    ///
    /// step = max(1, matching / limit); the n-th matching row (0-based, time
    /// order) is kept when n % step == 0. `limit == 0` means the default of 100.
    /// an inverted window yields an empty list.
    pub fn range(&self, limit: usize, start_ms: i64, end_ms: i64) -> StoreResult<Vec<Reading>> {
        if end_ms < start_ms {
            return Ok(Vec::new());
        }
        let limit = if limit == 0 { DEFAULT_RANGE_LIMIT } else { limit };

        let matching: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM history WHERE time >= ?1 AND time <= ?2",
            params![start_ms, end_ms],
            |row| row.get(0),
        )?;
        let step = (matching as usize / limit).max(1);
        debug!(matching, step, "range scan");

        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE time >= ?1 AND time <= ?2 ORDER BY time, id"
        ))?;
        let rows = stmt.query_map(params![start_ms, end_ms], row_to_reading)?;

        let mut result = Vec::with_capacity((matching as usize).min(limit));
        for (seen, row) in rows.enumerate() {
            let reading = row?;
            if seen % step == 0 {
                result.push(reading);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
impl HistoryStore {
    /// drop the history table so every later operation fails
    pub(crate) fn break_for_test(&mut self) {
        let _ = self.conn.execute_batch("DROP TABLE history");
    }
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore").finish_non_exhaustive()
    }
}

fn row_to_reading(row: &Row<'_>) -> rusqlite::Result<Reading> {
    Ok(Reading {
        id: row.get(0)?,
        timestamp: from_millis(row.get(1)?),
        temperature: row.get(2)?,
        humidity: row.get(3)?,
    })
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    fn store_with(n: i64, spacing_ms: i64) -> HistoryStore {
        let mut store = HistoryStore::open_in_memory().unwrap();
        for i in 0..n {
            let r = Reading::at(i as f64, 50.0, from_millis(T0 + i * spacing_ms));
            store.insert(&r).unwrap();
        }
        store
    }

    #[test]
    fn test_insert_then_get_by_id() {
        let mut store = HistoryStore::open_in_memory().unwrap();
        let r = Reading::now(21.5, 40.0);
        let id = store.insert(&r).unwrap();
        let back = store.get_by_id(id).unwrap().unwrap();
        assert_eq!(back.id, id);
        assert!(back.same_sample(&r));
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut store = HistoryStore::open_in_memory().unwrap();
        let a = store.insert(&Reading::now(1.0, 1.0)).unwrap();
        let b = store.insert(&Reading::now(2.0, 2.0)).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn test_unknown_id_is_none() {
        let store = store_with(3, 1_000);
        assert!(store.get_by_id(99).unwrap().is_none());
        assert!(store.get_by_id(0).unwrap().is_none());
    }

    #[test]
    fn test_last_and_count() {
        let mut store = HistoryStore::open_in_memory().unwrap();
        assert!(store.last().unwrap().is_none());
        assert_eq!(store.count().unwrap(), 0);

        let t0 = Reading::at(21.5, 40.0, from_millis(T0));
        let t1 = Reading::at(22.0, 41.0, from_millis(T0 + 30_000));
        store.insert(&t0).unwrap();
        store.insert(&t1).unwrap();

        let last = store.last().unwrap().unwrap();
        assert!(last.same_sample(&t1));
        assert_eq!(last.id, 2);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_last_follows_id_not_time() {
        let mut store = HistoryStore::open_in_memory().unwrap();
        store.insert(&Reading::at(1.0, 1.0, from_millis(T0 + 10_000))).unwrap();
        store.insert(&Reading::at(2.0, 2.0, from_millis(T0))).unwrap();
        assert_eq!(store.last().unwrap().unwrap().temperature, 2.0);
    }

    #[test]
    fn test_range_downsamples_evenly() {
        let store = store_with(1000, 30_000);
        let rows = store.range(100, T0, T0 + 1000 * 30_000).unwrap();
        assert_eq!(rows.len(), 100);
        for (i, r) in rows.iter().enumerate() {
            assert_eq!(r.temperature, (i * 10) as f64);
        }
    }

    #[test]
    fn test_range_is_deterministic() {
        let store = store_with(537, 1_000);
        let a = store.range(50, T0, T0 + 600_000).unwrap();
        let b = store.range(50, T0, T0 + 600_000).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_range_zero_limit_uses_default() {
        let store = store_with(1000, 1_000);
        let rows = store.range(0, T0, T0 + 1_000_000).unwrap();
        assert_eq!(rows.len(), 100);
    }

    #[test]
    fn test_range_huge_limit_returns_matching_rows() {
        let store = store_with(1, 1_000);
        assert_eq!(store.range(usize::MAX, 0, i64::MAX).unwrap().len(), 1);
        assert_eq!(store.range(1usize << 44, 0, i64::MAX).unwrap().len(), 1);
    }

    #[test]
    fn test_range_smaller_than_limit_returns_all() {
        let store = store_with(7, 1_000);
        let rows = store.range(100, T0, T0 + 10_000).unwrap();
        assert_eq!(rows.len(), 7);
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let store = store_with(10, 1_000);
        let rows = store.range(100, T0 + 2_000, T0 + 4_000).unwrap();
        let temps: Vec<f64> = rows.iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_range_inverted_window_is_empty() {
        let store = store_with(10, 1_000);
        assert!(store.range(100, T0 + 5_000, T0).unwrap().is_empty());
    }

    #[test]
    fn test_range_orders_by_timestamp() {
        let mut store = HistoryStore::open_in_memory().unwrap();
        store.insert(&Reading::at(3.0, 0.0, from_millis(T0 + 3_000))).unwrap();
        store.insert(&Reading::at(1.0, 0.0, from_millis(T0 + 1_000))).unwrap();
        store.insert(&Reading::at(2.0, 0.0, from_millis(T0 + 2_000))).unwrap();
        let temps: Vec<f64> = store
            .range(10, T0, T0 + 10_000)
            .unwrap()
            .iter()
            .map(|r| r.temperature)
            .collect();
        assert_eq!(temps, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_reopen_keeps_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        {
            let mut store = HistoryStore::open(&path).unwrap();
            store.insert(&Reading::now(20.0, 30.0)).unwrap();
        }
        let mut store = HistoryStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.insert(&Reading::now(21.0, 31.0)).unwrap(), 2);
    }

    #[test]
    fn test_backend_failure_is_reported() {
        let mut store = store_with(2, 1_000);
        store.break_for_test();
        assert!(store.insert(&Reading::now(1.0, 1.0)).is_err());
        assert!(store.count().is_err());
    }
}
