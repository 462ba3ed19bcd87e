use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::{Uuid, Variant, Version};

use crate::error::MetricError;

/// The payload a client submits as one line of a bulk upload.
///
/// Wire field "type" maps to event_type in the database. Everything except
/// `id`, `type` and `timestamp` is optional; unknown fields are ignored so
/// newer clients can submit more than this server understands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricPayload {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

/// A stored metric — the wire payload plus the fields stamped server-side
/// (`request_id`, `sync_ip`, `sync_time`) and the location added later by the
/// enrichment backfill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    pub event_type: String,
    pub text: Option<String>,
    pub tags: Vec<String>,
    pub extra: BTreeMap<String, String>,
    pub pid: Option<String>,
    pub sid: Option<String>,
    /// The client's submission timestamp, verbatim wire string.
    pub timestamp: String,
    pub version: Option<String>,
    pub os: Option<String>,
    pub arch: Option<String>,
    /// Server-side receive time.
    pub sync_time: DateTime<Utc>,
    /// Shared identifier of the bulk request this line arrived in.
    pub request_id: String,
    /// Submitter's IP as seen by the server.
    pub sync_ip: String,
    /// Resolved location, absent until the enrichment backfill fills it in.
    pub sync_location: Option<Location>,
}

impl Metric {
    /// Assemble a stored metric from a wire payload and the batch context.
    ///
    /// No validation happens here — the repository validates and normalizes
    /// before touching storage.
    pub fn from_payload(
        payload: MetricPayload,
        request_id: &str,
        sync_ip: &str,
        sync_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: payload.id,
            event_type: payload.event_type,
            text: payload.text,
            tags: payload.tags,
            extra: payload.extra,
            pid: payload.pid,
            sid: payload.sid,
            timestamp: payload.timestamp,
            version: payload.version,
            os: payload.os,
            arch: payload.arch,
            sync_time,
            request_id: request_id.to_string(),
            sync_ip: sync_ip.to_string(),
            sync_location: None,
        }
    }
}

/// Resolved geolocation for a metric, decoded from the provider payload
/// stored alongside the row.
///
/// Every field is optional: the provider omits what it does not know, and
/// bogon addresses carry almost nothing. Unknown provider fields are ignored
/// on decode; the raw payload in storage keeps them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Coordinates as "lat,lon".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bogon: Option<bool>,
    /// When the payload was fetched from the provider (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached: Option<String>,
}

/// Canonicalize the two legacy event type aliases older clients still send.
pub fn canonical_event_type(raw: &str) -> &str {
    match raw {
        "command_exec" => "cmd",
        "required_auth_cmd_precondition_failure" => "required_auth",
        other => other,
    }
}

/// Validate a metric identifier and return its canonical lowercase form.
///
/// Only RFC 4122 version-4 UUIDs are accepted, and never with a `urn:`
/// prefix.
pub fn canonical_metric_id(raw: &str) -> Result<String, MetricError> {
    if raw.starts_with("urn:") {
        return Err(MetricError::UrnPrefix);
    }

    let id = Uuid::parse_str(raw).map_err(|_| MetricError::InvalidId)?;

    if id.get_version() != Some(Version::Random) || id.get_variant() != Variant::RFC4122 {
        return Err(MetricError::InvalidId);
    }

    Ok(id.hyphenated().to_string())
}
