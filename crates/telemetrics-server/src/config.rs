/// Re-export `Config` from `telemetrics-core` for use within this crate.
///
/// All environment-variable parsing lives in `telemetrics-core` so it can be
/// shared with integration tests without depending on the full server.
pub use telemetrics_core::config::Config;
