use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use telemetrics_duckdb::DuckDbBackend;

use super::{GeoClient, GeoError};

/// Upper bound on the post-ingestion enrichment trigger. The task is
/// detached from the request that spawned it, so this is the only thing
/// keeping it from running unbounded.
pub const BACKFILL_TRIGGER_TIMEOUT: Duration = Duration::from_secs(10);

/// One IP the bulk backfill could not resolve.
#[derive(Debug, Clone, Serialize)]
pub struct FailedIp {
    pub ip: String,
    pub reason: String,
}

/// Outcome of a bulk backfill run. Every resolvable IP is updated even when
/// others fail; the run counts as failed iff `failed` is non-empty.
#[derive(Debug, Clone, Serialize)]
pub struct BackfillOutcome {
    pub attempted: usize,
    pub rows_updated: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<FailedIp>,
}

/// Orchestrates cache-or-fetch for a single IP and the backfill of stored
/// metric rows. Composes the cache store with the rate-limited client.
pub struct Enricher {
    db: Arc<DuckDbBackend>,
    client: GeoClient,
}

impl Enricher {
    pub fn new(db: Arc<DuckDbBackend>, client: GeoClient) -> Self {
        Self { db, client }
    }

    /// Location payload for `ip`: the fresh cache entry if one exists,
    /// otherwise a refresh through the provider.
    pub async fn get(&self, ip: &str) -> Result<String, GeoError> {
        if let Some(payload) = self.db.cached_location(ip).await? {
            return Ok(payload);
        }
        self.refresh(ip).await
    }

    /// Fetch from the provider and replace the cache entry.
    ///
    /// No per-IP mutual exclusion is taken: two concurrent refreshes for the
    /// same IP may both hit the provider, and the storage upsert resolves
    /// the race last-writer-wins.
    pub async fn refresh(&self, ip: &str) -> Result<String, GeoError> {
        let payload = self.client.fetch(ip).await?;
        self.db.upsert_location(ip, &payload).await?;
        Ok(payload)
    }

    /// Resolve a location for `ip` (cache or provider) and copy it into
    /// every stored metric row of that IP still lacking one. Returns the
    /// number of rows updated.
    pub async fn backfill_ip(&self, ip: &str) -> Result<usize, GeoError> {
        self.get(ip).await?;
        let updated = self.db.assign_location_from_cache(ip).await?;
        Ok(updated)
    }

    /// Backfill every IP that still has metric rows without a location.
    ///
    /// IPs are processed sequentially; a failure on one IP is recorded and
    /// processing continues with the next. `Err` is reserved for failing to
    /// enumerate the IPs at all.
    pub async fn backfill_all_missing(&self) -> anyhow::Result<BackfillOutcome> {
        let ips = self.db.ips_missing_location().await?;
        let mut outcome = BackfillOutcome {
            attempted: ips.len(),
            rows_updated: 0,
            failed: Vec::new(),
        };

        for ip in ips {
            match self.backfill_ip(&ip).await {
                Ok(updated) => {
                    debug!(ip = %ip, updated, "geolocation backfill updated rows");
                    outcome.rows_updated += updated;
                }
                Err(e) => {
                    warn!(ip = %ip, error = %e, "geolocation backfill failed for IP");
                    outcome.failed.push(FailedIp {
                        ip,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(outcome)
    }

    /// Fire-and-forget enrichment for one IP.
    ///
    /// Spawned detached from the caller's scope — the HTTP response that
    /// triggered it has usually been sent before this runs — and bounded by
    /// [`BACKFILL_TRIGGER_TIMEOUT`]. Failures are logged and dropped.
    pub fn spawn_backfill(self: Arc<Self>, ip: String) {
        let enricher = self;
        tokio::spawn(async move {
            debug!(ip = %ip, "triggering geolocation backfill");
            match tokio::time::timeout(BACKFILL_TRIGGER_TIMEOUT, enricher.backfill_ip(&ip)).await {
                Ok(Ok(updated)) => debug!(ip = %ip, updated, "geolocation backfill finished"),
                Ok(Err(e)) => warn!(ip = %ip, error = %e, "geolocation backfill failed"),
                Err(_) => warn!(ip = %ip, "geolocation backfill timed out"),
            }
        });
    }
}
