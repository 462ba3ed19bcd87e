use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use telemetrics_duckdb::metrics::MetricFilter;

use crate::{error::AppError, state::AppState};

const PER_PAGE: usize = 100;

/// Query parameters of `GET /api/metrics`.
///
/// `not-version` works by presence: on its own it selects metrics without a
/// version, combined with `version=x` it negates the match.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    page: Option<usize>,
    #[serde(rename = "type", default)]
    event_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(rename = "not-version", default)]
    not_version: Option<String>,
}

/// `GET /api/metrics` — filtered, paginated listing, newest sync first.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = MetricFilter {
        event_type: query.event_type.filter(|s| !s.is_empty()),
        text: query.text.filter(|s| !s.is_empty()),
        version: query.version.filter(|s| !s.is_empty()),
        not_version: query.not_version.is_some(),
        page: query.page.unwrap_or(1).max(1),
        per_page: PER_PAGE,
    };

    let total = state.db.count_metrics(&filter).await?;
    let metrics = state.db.list_metrics(&filter).await?;
    let max_page = (total as usize).div_ceil(PER_PAGE);

    Ok(Json(json!({
        "metrics": metrics,
        "pagination": {
            "total": total,
            "page": filter.page,
            "per_page": PER_PAGE,
            "max_page": max_page,
        }
    })))
}

/// `GET /api/metrics/{id}` — single metric by canonical identifier.
#[tracing::instrument(skip(state))]
pub async fn read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    match state.db.get_metric(&id).await? {
        Some(metric) => Ok(Json(metric)),
        None => Err(AppError::NotFound(format!("no metric with id {id}"))),
    }
}

/// `GET /api/metrics/types` — distinct event types with row counts.
#[tracing::instrument(skip(state))]
pub async fn types(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let types = state.db.event_types().await?;
    Ok(Json(json!({ "types": types })))
}

/// `GET /api/metrics/versions` — distinct client versions, newest first.
#[tracing::instrument(skip(state))]
pub async fn versions(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let versions = state.db.versions().await?;
    Ok(Json(json!({ "versions": versions })))
}
