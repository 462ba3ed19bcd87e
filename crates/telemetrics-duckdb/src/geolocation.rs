use anyhow::Result;
use chrono::{Duration, Utc};

use crate::DuckDbBackend;

/// How long a cache entry stays fresh. Staleness is purely time-based at
/// read time; nothing expires entries in the background.
pub const CACHE_TTL_HOURS: i64 = 48;

impl DuckDbBackend {
    /// Fresh cached payload for `ip`, or `None` when the entry is missing or
    /// older than [`CACHE_TTL_HOURS`].
    ///
    /// Absence is not an error — callers use it to decide whether to refresh,
    /// and a storage failure surfaces separately as `Err`.
    pub async fn cached_location(&self, ip: &str) -> Result<Option<String>> {
        let cutoff = (Utc::now() - Duration::hours(CACHE_TTL_HOURS)).to_rfc3339();
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT payload FROM geolocation \
             WHERE ip = ?1 AND fetched_at >= CAST(?2 AS TIMESTAMP)",
        )?;
        let mut rows = stmt.query(duckdb::params![ip, cutoff])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Insert-or-replace the cached payload for `ip`, always stamping the
    /// current time.
    ///
    /// Last writer wins under concurrent refreshes of the same IP: the
    /// payload is monotonically replaced by a fresher fetch, never merged,
    /// so the storage-level atomic upsert is the only synchronization
    /// required.
    pub async fn upsert_location(&self, ip: &str, payload: &str) -> Result<bool> {
        let fetched_at = Utc::now().to_rfc3339();
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "INSERT INTO geolocation (ip, payload, fetched_at) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT (ip) DO UPDATE SET \
                 payload = excluded.payload, fetched_at = excluded.fetched_at",
            duckdb::params![ip, payload, fetched_at],
        )?;
        Ok(changed != 0)
    }
}
