use anyhow::Result;
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;

use telemetrics_core::{
    error::MetricError,
    metric::{canonical_event_type, canonical_metric_id, Metric},
    timefmt::parse_wire_timestamp,
};

use crate::DuckDbBackend;

const METRIC_COLUMNS: &str = "id, event_type, \"text\", tags, extra, pid, sid, \
     \"timestamp\", version, os, arch, CAST(sync_time AS VARCHAR), \
     request_id, sync_ip, sync_location";

/// Listing filter; mirrors the query parameters of `GET /api/metrics`.
#[derive(Debug, Clone, Default)]
pub struct MetricFilter {
    /// Exact match on the canonical event type.
    pub event_type: Option<String>,
    /// Case-insensitive substring match on the text payload.
    pub text: Option<String>,
    pub version: Option<String>,
    /// Negates the version match; combined with no version value it selects
    /// rows where version IS NULL.
    pub not_version: bool,

    /// 1-based page; 0 is treated as 1.
    pub page: usize,
    pub per_page: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventTypeCount {
    pub event_type: String,
    pub count: i64,
}

/// Raw column values of one metrics row, before the JSON columns are decoded.
struct MetricRow {
    id: String,
    event_type: String,
    text: Option<String>,
    tags: String,
    extra: String,
    pid: Option<String>,
    sid: Option<String>,
    timestamp: String,
    version: Option<String>,
    os: Option<String>,
    arch: Option<String>,
    sync_time: String,
    request_id: String,
    sync_ip: String,
    sync_location: Option<String>,
}

fn read_metric_row(row: &duckdb::Row<'_>) -> duckdb::Result<MetricRow> {
    Ok(MetricRow {
        id: row.get(0)?,
        event_type: row.get(1)?,
        text: row.get(2)?,
        tags: row.get(3)?,
        extra: row.get(4)?,
        pid: row.get(5)?,
        sid: row.get(6)?,
        timestamp: row.get(7)?,
        version: row.get(8)?,
        os: row.get(9)?,
        arch: row.get(10)?,
        sync_time: row.get(11)?,
        request_id: row.get(12)?,
        sync_ip: row.get(13)?,
        sync_location: row.get(14)?,
    })
}

impl MetricRow {
    fn into_metric(self) -> Result<Metric> {
        Ok(Metric {
            id: self.id,
            event_type: self.event_type,
            text: self.text,
            tags: serde_json::from_str(&self.tags)?,
            extra: serde_json::from_str(&self.extra)?,
            pid: self.pid,
            sid: self.sid,
            timestamp: self.timestamp,
            version: self.version,
            os: self.os,
            arch: self.arch,
            sync_time: NaiveDateTime::parse_from_str(&self.sync_time, "%Y-%m-%d %H:%M:%S%.f")?
                .and_utc(),
            request_id: self.request_id,
            sync_ip: self.sync_ip,
            sync_location: self
                .sync_location
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
        })
    }
}

/// Sort key for client versions: numeric dot-separated components, with
/// everything that is not a digit or a dot stripped first. Pre-release
/// suffixes are invisible to the key and fall back to plain string order.
fn version_sort_key(version: &str) -> Vec<i64> {
    let digits: String = version
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits
        .split('.')
        .filter(|part| !part.is_empty())
        .map(|part| part.parse().unwrap_or(0))
        .collect()
}

fn filter_where(filter: &MetricFilter) -> (String, Vec<Box<dyn duckdb::types::ToSql + Send>>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn duckdb::types::ToSql + Send>> = Vec::new();

    if let Some(ref event_type) = filter.event_type {
        clauses.push(format!("event_type = ?{}", params.len() + 1));
        params.push(Box::new(event_type.clone()));
    }
    if let Some(ref text) = filter.text {
        clauses.push(format!("\"text\" ILIKE ?{}", params.len() + 1));
        params.push(Box::new(format!("%{text}%")));
    }
    match (&filter.version, filter.not_version) {
        (None, false) => {}
        (None, true) => clauses.push("version IS NULL".to_string()),
        (Some(version), negated) => {
            let op = if negated { "!=" } else { "=" };
            clauses.push(format!("version {op} ?{}", params.len() + 1));
            params.push(Box::new(version.clone()));
        }
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (where_sql, params)
}

impl DuckDbBackend {
    /// Validate, normalize and persist one metric.
    ///
    /// Returns `Ok(true)` iff a new row was written; `Ok(false)` signals a
    /// duplicate submission (same identifier already stored), which is the
    /// sole deduplication mechanism — safe for at-least-once client retries.
    /// Validation failures surface before any statement runs.
    pub async fn create_metric(&self, metric: &Metric) -> Result<bool> {
        let id = canonical_metric_id(&metric.id)?;
        let event_type = canonical_event_type(&metric.event_type).to_string();
        let timestamp_db = parse_wire_timestamp(&metric.timestamp)
            .map_err(MetricError::from)?
            .with_timezone(&Utc);

        let tags = serde_json::to_string(&metric.tags)?;
        let extra = serde_json::to_string(&metric.extra)?;
        let location = metric
            .sync_location
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "INSERT INTO metrics (
                id, event_type, \"text\", tags, extra, pid, sid,
                \"timestamp\", timestamp_db, version, os, arch,
                sync_time, request_id, sync_ip, sync_location
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16
            )
            ON CONFLICT DO NOTHING",
            duckdb::params![
                id,
                event_type,
                metric.text,
                tags,
                extra,
                metric.pid,
                metric.sid,
                metric.timestamp,
                timestamp_db.to_rfc3339(),
                metric.version,
                metric.os,
                metric.arch,
                metric.sync_time.to_rfc3339(),
                metric.request_id,
                metric.sync_ip,
                location,
            ],
        )?;
        Ok(changed != 0)
    }

    /// Single-row lookup by canonical identifier.
    pub async fn get_metric(&self, id: &str) -> Result<Option<Metric>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {METRIC_COLUMNS} FROM metrics WHERE id = ?1"
        ))?;
        let mut rows = stmt.query(duckdb::params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(read_metric_row(row)?.into_metric()?)),
            None => Ok(None),
        }
    }

    /// List metrics matching `filter`, newest sync first.
    pub async fn list_metrics(&self, filter: &MetricFilter) -> Result<Vec<Metric>> {
        let (where_sql, mut params) = filter_where(filter);
        let page = filter.page.max(1);
        let limit_pos = params.len() + 1;
        let sql = format!(
            "SELECT {METRIC_COLUMNS} FROM metrics{where_sql} \
             ORDER BY sync_time DESC LIMIT ?{limit_pos} OFFSET ?{}",
            limit_pos + 1
        );
        params.push(Box::new(filter.per_page as i64));
        params.push(Box::new(((page - 1) * filter.per_page) as i64));

        let conn = self.conn.lock().await;
        let param_refs: Vec<&dyn duckdb::types::ToSql> =
            params.iter().map(|p| p.as_ref() as &dyn duckdb::types::ToSql).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), read_metric_row)?;

        let mut metrics = Vec::new();
        for row in rows {
            metrics.push(row?.into_metric()?);
        }
        Ok(metrics)
    }

    /// Count metrics matching `filter` (ignores pagination).
    pub async fn count_metrics(&self, filter: &MetricFilter) -> Result<i64> {
        let (where_sql, params) = filter_where(filter);
        let conn = self.conn.lock().await;
        let param_refs: Vec<&dyn duckdb::types::ToSql> =
            params.iter().map(|p| p.as_ref() as &dyn duckdb::types::ToSql).collect();
        let count: i64 = conn
            .prepare(&format!("SELECT COUNT(id) FROM metrics{where_sql}"))?
            .query_row(param_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    /// Distinct event types with their row counts, most frequent first.
    pub async fn event_types(&self) -> Result<Vec<EventTypeCount>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT event_type, COUNT(event_type) AS number FROM metrics \
             GROUP BY event_type ORDER BY COUNT(event_type) DESC, event_type",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(EventTypeCount {
                event_type: row.get(0)?,
                count: row.get(1)?,
            })
        })?;

        let mut types = Vec::new();
        for row in rows {
            types.push(row?);
        }
        Ok(types)
    }

    /// Distinct client versions, newest first by numeric components.
    pub async fn versions(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT DISTINCT version FROM metrics WHERE version IS NOT NULL")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut versions = Vec::new();
        for row in rows {
            versions.push(row?);
        }
        versions.sort_by(|a, b| {
            version_sort_key(b)
                .cmp(&version_sort_key(a))
                .then_with(|| a.cmp(b))
        });
        Ok(versions)
    }

    /// Distinct IPs that still have metric rows without a resolved location.
    pub async fn ips_missing_location(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT sync_ip FROM metrics WHERE sync_location IS NULL \
             GROUP BY sync_ip ORDER BY sync_ip",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut ips = Vec::new();
        for row in rows {
            ips.push(row?);
        }
        Ok(ips)
    }

    /// Copy the cached geolocation payload for `ip` into every metric row of
    /// that IP still lacking a location. Returns the number of rows changed.
    ///
    /// Callers must make sure the cache holds an entry for `ip` first; the
    /// enrichment service resolves one before invoking this.
    pub async fn assign_location_from_cache(&self, ip: &str) -> Result<usize> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE metrics \
             SET sync_location = (SELECT payload FROM geolocation WHERE ip = ?1) \
             WHERE sync_ip = ?2 AND sync_location IS NULL",
            duckdb::params![ip, ip],
        )?;
        Ok(changed)
    }
}
