use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use telemetrics_core::config::Config;
use telemetrics_duckdb::DuckDbBackend;
use telemetrics_server::app::build_app;
use telemetrics_server::state::AppState;

const WIRE_TS: &str = "Thu Sep 27 00:32:23 +0200 2018";

/// Build a test Config with sensible defaults for integration tests.
///
/// The geolocation base URL points at a dead local port: the post-ingestion
/// enrichment trigger is detached and its failure only gets logged, so the
/// ingestion paths under test never notice.
fn test_config() -> Config {
    Config {
        port: 0,
        data_dir: "/tmp/telemetrics-test".to_string(),
        geo_base_url: "http://127.0.0.1:9".to_string(),
        cors_origins: vec![],
        duckdb_memory_limit: "1GB".to_string(),
    }
}

/// Create a fresh in-memory backend + state + app for each test.
fn setup() -> (Arc<AppState>, axum::Router) {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let state = Arc::new(AppState::new(db, test_config()).expect("app state"));
    let app = build_app(Arc::clone(&state)).layer(MockConnectInfo(SocketAddr::from((
        [10, 0, 0, 1],
        40000,
    ))));
    (state, app)
}

/// Helper: send a POST /api/metrics/bulk with the given newline-delimited body.
fn bulk_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/metrics/bulk")
        .header("x-forwarded-for", "1.2.3.4")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

/// Helper: extract JSON body from a response.
async fn json_body(response: axum::http::Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}

/// Helper: one well-formed metric line with a fresh identifier.
fn metric_line(id: &str) -> String {
    json!({
        "id": id,
        "type": "cmd",
        "text": "deploy --project demo",
        "tags": ["ci", "linux"],
        "extra": {"exit_code": "0"},
        "timestamp": WIRE_TS,
        "version": "1.0.0",
        "os": "linux",
        "arch": "amd64"
    })
    .to_string()
}

fn fresh_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[tokio::test]
async fn test_bulk_mixed_batch_reports_broken_lines_and_keeps_going() {
    let (state, app) = setup();

    // 10 lines; lines 2, 5 and 9 are not valid metric JSON.
    let mut lines = Vec::new();
    for n in 1..=10 {
        if [2, 5, 9].contains(&n) {
            lines.push("{not json".to_string());
        } else {
            lines.push(metric_line(&fresh_id()));
        }
    }
    let response = app
        .oneshot(bulk_request(&lines.join("\n")))
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::OK);
    let summary = json_body(response).await;
    assert_eq!(summary["added"], 7);
    assert_eq!(summary["noop"], 0);
    assert_eq!(summary["error"], 3);
    assert_eq!(summary["broken_lines"], json!([2, 5, 9]));

    // Every valid line made it to storage despite the broken ones.
    let count = state
        .db
        .count_metrics(&Default::default())
        .await
        .expect("count");
    assert_eq!(count, 7);
}

#[tokio::test]
async fn test_bulk_counts_invalid_metrics_not_just_bad_json() {
    let (_state, app) = setup();

    let lines = [
        metric_line(&fresh_id()),
        // Well-formed JSON, but a version-1 identifier.
        json!({"id": "f47ac10b-58cc-11e4-8ed6-0800200c9a66", "type": "cmd", "timestamp": WIRE_TS})
            .to_string(),
        // Well-formed JSON, but the timestamp is not in the wire format.
        json!({"id": fresh_id(), "type": "cmd", "timestamp": "2018-09-27T00:32:23Z"}).to_string(),
        // A urn-prefixed identifier is rejected as well.
        json!({"id": format!("urn:uuid:{}", fresh_id()), "type": "cmd", "timestamp": WIRE_TS})
            .to_string(),
    ];
    let response = app
        .oneshot(bulk_request(&lines.join("\n")))
        .await
        .expect("request");

    let summary = json_body(response).await;
    assert_eq!(summary["added"], 1);
    assert_eq!(summary["error"], 3);
    assert_eq!(summary["broken_lines"], json!([2, 3, 4]));
}

#[tokio::test]
async fn test_bulk_resubmission_is_a_noop() {
    let (_state, app) = setup();
    let line = metric_line(&fresh_id());

    let response = app
        .clone()
        .oneshot(bulk_request(&line))
        .await
        .expect("first request");
    let summary = json_body(response).await;
    assert_eq!(summary["added"], 1);
    assert_eq!(summary["noop"], 0);

    // The identical line again: deduplicated, not an error.
    let response = app
        .oneshot(bulk_request(&line))
        .await
        .expect("second request");
    let summary = json_body(response).await;
    assert_eq!(summary["added"], 0);
    assert_eq!(summary["noop"], 1);
    assert_eq!(summary["error"], 0);
}

#[tokio::test]
async fn test_bulk_dedups_within_one_batch() {
    let (_state, app) = setup();
    let line = metric_line(&fresh_id());

    let body = format!("{line}\n{line}");
    let response = app.oneshot(bulk_request(&body)).await.expect("request");
    let summary = json_body(response).await;
    assert_eq!(summary["added"], 1);
    assert_eq!(summary["noop"], 1);
}

#[tokio::test]
async fn test_bulk_canonicalizes_alias_and_identifier_case() {
    let (state, app) = setup();
    let id = fresh_id();

    let line = json!({
        "id": id.to_uppercase(),
        "type": "command_exec",
        "timestamp": WIRE_TS
    })
    .to_string();
    let response = app
        .clone()
        .oneshot(bulk_request(&line))
        .await
        .expect("request");
    let summary = json_body(response).await;
    assert_eq!(summary["added"], 1);

    let stored = state
        .db
        .get_metric(&id)
        .await
        .expect("get")
        .expect("stored under the lowercase identifier");
    assert_eq!(stored.event_type, "cmd");
    assert_eq!(stored.id, id);
    assert_eq!(stored.sync_ip, "1.2.3.4");

    // Resubmitting the same line is a noop, not a second row.
    let response = app.oneshot(bulk_request(&line)).await.expect("request");
    let summary = json_body(response).await;
    assert_eq!(summary["added"], 0);
    assert_eq!(summary["noop"], 1);
}

#[tokio::test]
async fn test_bulk_empty_body_yields_empty_summary() {
    let (_state, app) = setup();

    let response = app.oneshot(bulk_request("")).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let summary = json_body(response).await;
    assert_eq!(summary["added"], 0);
    assert_eq!(summary["noop"], 0);
    assert_eq!(summary["error"], 0);
    // broken_lines is omitted entirely when no line failed.
    assert!(summary.get("broken_lines").is_none());
    // The batch still gets a request id.
    let request_id = summary["request_id"].as_str().expect("request_id");
    assert!(uuid::Uuid::parse_str(request_id).is_ok());
}

#[tokio::test]
async fn test_bulk_stamps_shared_request_id() {
    let (state, app) = setup();
    let first = fresh_id();
    let second = fresh_id();

    let body = format!("{}\n{}", metric_line(&first), metric_line(&second));
    let response = app.oneshot(bulk_request(&body)).await.expect("request");
    let summary = json_body(response).await;
    let request_id = summary["request_id"].as_str().expect("request_id");

    for id in [&first, &second] {
        let stored = state
            .db
            .get_metric(id)
            .await
            .expect("get")
            .expect("stored row");
        assert_eq!(stored.request_id, request_id);
    }
}

#[tokio::test]
async fn test_list_read_types_and_versions_endpoints() {
    let (_state, app) = setup();
    let id = fresh_id();

    let body = format!(
        "{}\n{}",
        metric_line(&id),
        json!({"id": fresh_id(), "type": "install", "timestamp": WIRE_TS, "version": "2.0.0"})
    );
    let response = app
        .clone()
        .oneshot(bulk_request(&body))
        .await
        .expect("ingest");
    assert_eq!(response.status(), StatusCode::OK);

    // Filtered listing.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/metrics?type=cmd")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("list");
    assert_eq!(response.status(), StatusCode::OK);
    let listing = json_body(response).await;
    assert_eq!(listing["pagination"]["total"], 1);
    assert_eq!(listing["metrics"][0]["id"], id.as_str());

    // Single read.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/metrics/{id}"))
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("read");
    assert_eq!(response.status(), StatusCode::OK);
    let metric = json_body(response).await;
    assert_eq!(metric["event_type"], "cmd");
    assert_eq!(metric["timestamp"], WIRE_TS);

    // Unknown identifier is a 404.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/metrics/{}", fresh_id()))
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("read missing");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/metrics/types")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("types");
    let types = json_body(response).await;
    assert_eq!(types["types"].as_array().expect("array").len(), 2);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/metrics/versions")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("versions");
    let versions = json_body(response).await;
    assert_eq!(versions["versions"], json!(["2.0.0", "1.0.0"]));
}

#[tokio::test]
async fn test_health_reports_ok() {
    let (_state, app) = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("health");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
}
