use telemetrics_duckdb::DuckDbBackend;

#[tokio::test]
async fn test_cached_returns_payload_right_after_upsert() {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let payload = r#"{"ip":"8.8.8.8","city":"Mountain View","cached":"2026-08-06T10:00:00Z"}"#;

    db.upsert_location("8.8.8.8", payload)
        .await
        .expect("upsert");

    let cached = db.cached_location("8.8.8.8").await.expect("cached lookup");
    assert_eq!(cached.as_deref(), Some(payload));
}

#[tokio::test]
async fn test_cached_reports_absence_for_unknown_ip() {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");

    let cached = db.cached_location("203.0.113.7").await.expect("lookup");
    assert_eq!(cached, None);
}

#[tokio::test]
async fn test_upsert_replaces_previous_payload() {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");

    db.upsert_location("8.8.8.8", r#"{"city":"Old"}"#)
        .await
        .expect("first upsert");
    db.upsert_location("8.8.8.8", r#"{"city":"New"}"#)
        .await
        .expect("second upsert");

    let cached = db.cached_location("8.8.8.8").await.expect("lookup");
    assert_eq!(cached.as_deref(), Some(r#"{"city":"New"}"#));
}

#[tokio::test]
async fn test_entries_older_than_ttl_are_stale() {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");

    db.upsert_location("8.8.8.8", r#"{"city":"Mountain View"}"#)
        .await
        .expect("upsert");

    // Backdate the entry just past the 48-hour window.
    {
        let conn = db.conn_for_test().await;
        conn.execute(
            "UPDATE geolocation SET fetched_at = CAST(NOW() AS TIMESTAMP) - INTERVAL 49 HOUR WHERE ip = ?1",
            telemetrics_duckdb::duckdb::params!["8.8.8.8"],
        )
        .expect("backdate");
    }

    let cached = db.cached_location("8.8.8.8").await.expect("lookup");
    assert_eq!(cached, None, "stale entries must read as absent");

    // A refresh-style upsert makes it fresh again.
    db.upsert_location("8.8.8.8", r#"{"city":"Mountain View"}"#)
        .await
        .expect("re-upsert");
    let cached = db.cached_location("8.8.8.8").await.expect("lookup");
    assert!(cached.is_some());
}
