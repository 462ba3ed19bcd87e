use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{error::AppError, state::AppState};

/// `POST /api/geolocation/backfill` — resolve a location for every IP that
/// still has metric rows without one.
///
/// Responds 200 with the outcome when every IP resolved, 502 with the same
/// body when at least one failed — the resolvable IPs are still updated
/// either way. Expect this to take a while with a cold cache: IPs are
/// resolved sequentially through the rate-limited provider client.
#[tracing::instrument(skip(state))]
pub async fn backfill(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let outcome = state.enricher.backfill_all_missing().await?;
    let status = if outcome.failed.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(outcome)))
}
