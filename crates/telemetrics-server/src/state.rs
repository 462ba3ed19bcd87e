use std::sync::Arc;

use anyhow::Result;

use telemetrics_core::config::Config;
use telemetrics_duckdb::DuckDbBackend;

use crate::geolocation::{Enricher, GeoClient, RateLimiter};

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
///
/// All fields are safe to clone cheaply — heavy resources live behind `Arc`.
pub struct AppState {
    /// The DuckDB backend. Internally uses `Arc<tokio::sync::Mutex<Connection>>`
    /// so it is already cheap to clone and async-safe.
    pub db: Arc<DuckDbBackend>,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    /// Geolocation orchestration: the cache-or-fetch service, the provider
    /// client and the shared 429 cooldown. One instance per process — the
    /// cooldown deadline is global by contract, so every handler must go
    /// through this same enricher.
    pub enricher: Arc<Enricher>,
}

impl AppState {
    /// Construct a new `AppState` wrapping the given backend and config.
    pub fn new(db: DuckDbBackend, config: Config) -> Result<Self> {
        let db = Arc::new(db);
        let limiter = Arc::new(RateLimiter::new());
        let client = GeoClient::new(&config.geo_base_url, limiter)?;
        Ok(Self {
            enricher: Arc::new(Enricher::new(Arc::clone(&db), client)),
            db,
            config: Arc::new(config),
        })
    }
}
