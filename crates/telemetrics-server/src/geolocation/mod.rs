//! IP-geolocation enrichment: the rate-limited provider client, the shared
//! cooldown, and the service that composes them with the cache store.

pub mod client;
pub mod limiter;
pub mod service;

pub use client::GeoClient;
pub use limiter::RateLimiter;
pub use service::Enricher;

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeoError {
    /// The shared cooldown is active, or the provider just answered 429.
    #[error("geolocation provider rate limited; retry in {}s", retry_in.as_secs())]
    RateLimited { retry_in: Duration },

    #[error("geolocation provider responded with status {0}")]
    Status(u16),

    #[error("geolocation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("geolocation payload is not a JSON object: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
