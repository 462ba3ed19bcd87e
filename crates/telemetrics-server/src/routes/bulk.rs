use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use futures::TryStreamExt;
use serde::Serialize;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

use telemetrics_core::metric::{Metric, MetricPayload};

use crate::{error::AppError, state::AppState};

/// Per-batch summary returned to the client. `broken_lines` holds 1-based
/// numbers of the lines that failed and is omitted when none did.
#[derive(Debug, Default, Serialize)]
pub struct BulkSummary {
    pub request_id: String,
    pub added: u64,
    pub noop: u64,
    pub error: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub broken_lines: Vec<u64>,
}

/// `POST /api/metrics/bulk` — ingest newline-delimited JSON metrics, one per
/// line.
///
/// ## Partial-failure tolerance
/// No line's failure aborts the rest: undecodable lines and rejected metrics
/// are counted and listed in `broken_lines`, valid lines around them are
/// persisted. Duplicate identifiers (client retries) count as `noop`. Only a
/// read error on the request stream itself fails the batch, with a 500
/// distinct from any per-line count.
///
/// ## Streaming
/// The body is scanned line-at-a-time and never buffered wholesale, so
/// arbitrarily large batches are fine as long as single lines stay sane.
///
/// ## Enrichment
/// After the scan a detached task resolves the submitter IP's geolocation and
/// backfills stored rows — bounded, outside the request scope, invisible in
/// the response.
#[tracing::instrument(skip(state, headers, body))]
pub async fn bulk(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let sync_ip = client_ip(&headers, peer);

    let mut summary = BulkSummary {
        request_id: request_id.clone(),
        ..BulkSummary::default()
    };

    let stream = body.into_data_stream().map_err(io::Error::other);
    let mut lines = StreamReader::new(stream).lines();
    let mut line_number: u64 = 0;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "failed reading bulk request body");
                return Err(AppError::Internal(e.into()));
            }
        };
        line_number += 1;

        let payload = match serde_json::from_str::<MetricPayload>(&line) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(request_id = %request_id, line = line_number, error = %e, "can't decode metric line");
                summary.error += 1;
                summary.broken_lines.push(line_number);
                continue;
            }
        };

        let metric = Metric::from_payload(payload, &request_id, &sync_ip, Utc::now());
        match state.db.create_metric(&metric).await {
            Ok(true) => summary.added += 1,
            Ok(false) => summary.noop += 1,
            Err(e) => {
                tracing::debug!(request_id = %request_id, line = line_number, error = %e, "can't create metric");
                summary.error += 1;
                summary.broken_lines.push(line_number);
            }
        }
    }

    Arc::clone(&state.enricher).spawn_backfill(sync_ip);

    Ok(Json(summary))
}

/// The submitter's IP: first `X-Forwarded-For` entry when present, otherwise
/// the socket peer address.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}
