use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use chrono::Utc;
use reqwest::{header, StatusCode};
use serde_json::Value;
use url::Url;

use super::{GeoError, RateLimiter};

/// Sent on every provider request so rate-limit operators can identify us.
const USER_AGENT: &str = concat!("telemetrics/", env!("CARGO_PKG_VERSION"));
const ACCEPT: &str = "application/json; charset=utf-8";

/// Per-request network timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the geolocation provider, gated by the shared
/// [`RateLimiter`].
///
/// Stateless apart from the limiter: only a 429 response mutates shared
/// state.
pub struct GeoClient {
    http: reqwest::Client,
    base_url: Url,
    limiter: Arc<RateLimiter>,
}

impl GeoClient {
    pub fn new(base_url: &str, limiter: Arc<RateLimiter>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("invalid geolocation base URL: {base_url}"))?;
        ensure!(
            !base_url.cannot_be_a_base(),
            "geolocation base URL must accept path segments: {base_url}"
        );
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building geolocation HTTP client")?;
        Ok(Self {
            http,
            base_url,
            limiter,
        })
    }

    /// Fetch the provider record for `ip`.
    ///
    /// Checks the shared cooldown first and performs no network call while it
    /// is active. A 429 response extends the cooldown — for every IP, not
    /// just this one — and surfaces as [`GeoError::RateLimited`] with no
    /// retry. On success the JSON body is re-encoded with an added `cached`
    /// timestamp field; that form, not the raw response, is what gets cached
    /// and stored.
    pub async fn fetch(&self, ip: &str) -> Result<String, GeoError> {
        self.limiter.check().await?;

        let response = self
            .http
            .get(self.lookup_url(ip))
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, ACCEPT)
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            // Could also honor a Retry-After header.
            self.limiter.trip().await;
            self.limiter.check().await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(GeoError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let mut record: serde_json::Map<String, Value> = serde_json::from_slice(&body)?;
        record.insert("cached".to_string(), Value::String(Utc::now().to_rfc3339()));
        Ok(Value::Object(record).to_string())
    }

    /// `<base>/<escaped-ip>/json`; the constructor guarantees the base URL
    /// accepts path segments.
    fn lookup_url(&self, ip: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(ip).push("json");
        }
        url
    }
}
