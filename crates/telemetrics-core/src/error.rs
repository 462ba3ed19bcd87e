use thiserror::Error;

/// Validation failures for a submitted metric.
///
/// All of these are raised before any storage I/O, so a rejected metric never
/// leaves a partial row behind.
#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
    #[error("expected no urn: prefix on metric id")]
    UrnPrefix,

    #[error("metric id is not an RFC 4122 version 4 UUID")]
    InvalidId,

    #[error("invalid metric timestamp: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),
}
