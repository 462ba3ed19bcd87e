//! The fixed textual timestamp format used on the metric wire.

use chrono::{DateTime, FixedOffset};

/// Format of the `timestamp` field submitted by clients,
/// e.g. `"Thu Sep 27 00:32:23 +0200 2018"`.
pub const WIRE_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Parse a wire timestamp, keeping the client's UTC offset.
///
/// The weekday must be consistent with the date; chrono rejects mismatches.
pub fn parse_wire_timestamp(s: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    DateTime::parse_from_str(s, WIRE_FORMAT)
}
