/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// All statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup (idempotent).
///
/// `memory_limit` is passed at runtime from `Config.duckdb_memory_limit`
/// (env `TELEMETRICS_DUCKDB_MEMORY`, default `"1GB"`). Always set an explicit
/// limit — the DuckDB default is 80% of system RAM. `SET threads = 2` bounds
/// the background thread pool for single-writer embedded use.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- METRICS (main telemetry table)
-- ===========================================
CREATE TABLE IF NOT EXISTS metrics (
    -- Identity: canonical lowercase UUID v4. The primary key doubles as the
    -- dedup key for at-least-once client retries.
    id              VARCHAR PRIMARY KEY,

    -- Event data ("text" and "timestamp" are type keywords, hence the quotes)
    event_type      VARCHAR NOT NULL,
    "text"          VARCHAR,
    tags            VARCHAR NOT NULL,              -- JSON array of strings
    extra           VARCHAR NOT NULL,              -- JSON string->string object
    pid             VARCHAR,
    sid             VARCHAR,

    -- Client timestamp: verbatim wire string plus the parsed instant (UTC)
    "timestamp"     VARCHAR NOT NULL,
    timestamp_db    TIMESTAMP NOT NULL,

    -- Client build info
    version         VARCHAR,
    os              VARCHAR,
    arch            VARCHAR,

    -- Stamped at ingestion
    sync_time       TIMESTAMP NOT NULL,
    request_id      VARCHAR NOT NULL,
    sync_ip         VARCHAR NOT NULL,

    -- Geolocation payload, NULL until the enrichment backfill fills it in
    sync_location   VARCHAR
);
CREATE INDEX IF NOT EXISTS idx_metrics_sync_time  ON metrics(sync_time DESC);
CREATE INDEX IF NOT EXISTS idx_metrics_event_type ON metrics(event_type);
-- Optimised for the backfill update ("rows for this IP lacking a location")
CREATE INDEX IF NOT EXISTS idx_metrics_sync_ip    ON metrics(sync_ip);

-- ===========================================
-- GEOLOCATION CACHE
-- ===========================================
-- One entry per IP. payload is the provider JSON with the injected 'cached'
-- field; fetched_at drives the 48-hour freshness window at read time.
-- Entries are replaced by refreshes, never deleted.
CREATE TABLE IF NOT EXISTS geolocation (
    ip              VARCHAR PRIMARY KEY,
    payload         VARCHAR NOT NULL,
    fetched_at      TIMESTAMP NOT NULL
);
"#
    )
}
