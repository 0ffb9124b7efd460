//! Queue entry record and entry ids.
//!
//! Each pending alert is one file `<id>.json`:
//!
//! ```json
//! {
//!   "severity": "critical",
//!   "message": "disk full",
//!   "host": "web01",
//!   "details": null,
//!   "timestamp": 1772366400.0,
//!   "datetime": "2026-03-01T12:00:00+00:00",
//!   "failure_reason": "http_503",
//!   "retry_count": 2
//! }
//! ```
//!
//! The id is not stored in the file; it is the file stem.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::{Alert, Severity};
use crate::error::{QueueError, QueueResult};

/// Max host chars kept in an id
const MAX_HOST_IN_ID: usize = 48;

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Unique, sortable id of a queue entry.
///
/// Format: `<unix micros, 20 digits>-<severity>-<host>-<pid>-<seq>`. The zero-padded
/// timestamp prefix makes lexical order equal to submission order; pid and a
/// process-local sequence keep concurrent enqueuers from colliding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(String);

impl EntryId {
    /// Generate a fresh id for a submission at `now`
    pub fn generate(severity: Severity, host: &str, now: DateTime<Utc>) -> Self {
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let micros = now.timestamp_micros().max(0);
        Self(format!(
            "{:020}-{}-{}-{}-{}",
            micros,
            severity.as_str(),
            sanitize_host(host),
            std::process::id(),
            seq
        ))
    }

    /// Wrap an existing id read from disk
    pub fn parse(raw: &str) -> QueueResult<Self> {
        validate_id(raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Submission time encoded in the id prefix
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        let prefix = self.0.split('-').next()?;
        let micros: i64 = prefix.parse().ok()?;
        DateTime::from_timestamp(
            micros.div_euclid(1_000_000),
            (micros.rem_euclid(1_000_000) * 1_000) as u32,
        )
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn sanitize_host(host: &str) -> String {
    let cleaned: String = host
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_HOST_IN_ID)
        .collect();

    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// Rejects ids that are unsafe as file names
fn validate_id(id: &str) -> QueueResult<()> {
    if id.is_empty()
        || id.starts_with('.')
        || id.contains('/')
        || id.contains('\\')
        || id.contains('\0')
    {
        return Err(QueueError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// On-disk schema of an entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EntryRecord {
    pub severity: Severity,
    pub message: String,
    pub host: String,
    #[serde(default)]
    pub details: Option<String>,
    pub timestamp: f64,
    pub datetime: String,
    pub failure_reason: String,
    pub retry_count: u32,
}

/// One undelivered alert
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub id: EntryId,
    pub alert: Alert,
    /// Enqueue time (unix seconds)
    pub timestamp: f64,
    /// Enqueue time, human readable
    pub datetime: String,
    /// Why the last attempt failed
    pub failure_reason: String,
    /// Delivery attempts made by drain so far
    pub retry_count: u32,
}

impl QueueEntry {
    /// New entry with `retry_count = 0`
    pub fn new(alert: Alert, failure_reason: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: EntryId::generate(alert.severity, &alert.host, now),
            alert,
            timestamp: now.timestamp_micros() as f64 / 1_000_000.0,
            datetime: now.to_rfc3339(),
            failure_reason: failure_reason.into(),
            retry_count: 0,
        }
    }

    pub(crate) fn to_record(&self) -> EntryRecord {
        EntryRecord {
            severity: self.alert.severity,
            message: self.alert.message.clone(),
            host: self.alert.host.clone(),
            details: self.alert.details.clone(),
            timestamp: self.timestamp,
            datetime: self.datetime.clone(),
            failure_reason: self.failure_reason.clone(),
            retry_count: self.retry_count,
        }
    }

    pub(crate) fn from_record(id: EntryId, record: EntryRecord) -> Self {
        Self {
            id,
            alert: Alert {
                severity: record.severity,
                message: record.message,
                host: record.host,
                details: record.details,
            },
            timestamp: record.timestamp,
            datetime: record.datetime,
            failure_reason: record.failure_reason,
            retry_count: record.retry_count,
        }
    }

    /// Parse file contents for `id`; a schema mismatch is corruption
    pub fn from_json(id: EntryId, content: &str) -> QueueResult<Self> {
        let record: EntryRecord =
            serde_json::from_str(content).map_err(|source| QueueError::Corrupt {
                id: id.to_string(),
                source,
            })?;
        Ok(Self::from_record(id, record))
    }

    pub fn to_json(&self) -> QueueResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_record())?)
    }
}
