use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use super::GeoError;

/// Cooldown applied after the provider answers 429 (Too Many Requests).
pub const COOLDOWN_429: Duration = Duration::from_secs(3 * 60 * 60);

/// Shared cooldown gate in front of the geolocation provider.
///
/// A single deadline guards every outbound fetch regardless of the IP being
/// looked up: one 429 pushes it three hours out and every caller fails fast
/// until the window passes. Reads take the shared lock before each fetch;
/// the sole writer is [`trip`](RateLimiter::trip), on 429.
///
/// Starts open — the initial deadline is "now".
pub struct RateLimiter {
    deadline: RwLock<Instant>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            deadline: RwLock::new(Instant::now()),
        }
    }

    /// Fail while the deadline is still in the future.
    pub async fn check(&self) -> Result<(), GeoError> {
        let deadline = *self.deadline.read().await;
        let now = Instant::now();
        if now < deadline {
            return Err(GeoError::RateLimited {
                retry_in: deadline - now,
            });
        }
        Ok(())
    }

    /// Push the deadline out to now + [`COOLDOWN_429`].
    pub async fn trip(&self) {
        let mut deadline = self.deadline.write().await;
        *deadline = Instant::now() + COOLDOWN_429;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
