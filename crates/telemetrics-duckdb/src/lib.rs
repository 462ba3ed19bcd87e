pub mod backend;
pub mod geolocation;
pub mod metrics;
pub mod schema;

pub use backend::DuckDbBackend;

/// Re-export the `duckdb` crate so consumers (especially tests) can use
/// `telemetrics_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
