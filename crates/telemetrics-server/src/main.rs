use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use telemetrics_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Structured JSON logging. Level controlled via the RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("telemetrics_server=info".parse()?)
                .add_directive("telemetrics_duckdb=info".parse()?),
        )
        .json()
        .init();

    let cfg = telemetrics_core::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    // Ensure the data directory exists before opening DuckDB.
    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/telemetrics.db", cfg.data_dir);
    let db = telemetrics_duckdb::DuckDbBackend::open(&db_path, &cfg.duckdb_memory_limit)?;

    let state = Arc::new(AppState::new(db, cfg.clone())?);
    let app = telemetrics_server::app::build_app(Arc::clone(&state));

    let addr = format!("0.0.0.0:{}", cfg.port);
    info!(port = cfg.port, "telemetrics listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        tokio::signal::ctrl_c().await.ok();
    })
    .await?;

    Ok(())
}
