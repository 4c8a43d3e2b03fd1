//! Activity records handed to the audit trail.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{info, warn};

/// What kind of operation an activity record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    CreateDatabase,
    ConfigureOptions,
    CreateAccounts,
    CloneSchema,
    CloneExtendedProperties,
    CloneIndexes,
    CopyBaselineData,
    CreateAdminAccount,
    Rollback,
    Provision,
    Sync,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::CreateDatabase => "create_database",
            ActivityKind::ConfigureOptions => "configure_options",
            ActivityKind::CreateAccounts => "create_accounts",
            ActivityKind::CloneSchema => "clone_schema",
            ActivityKind::CloneExtendedProperties => "clone_extended_properties",
            ActivityKind::CloneIndexes => "clone_indexes",
            ActivityKind::CopyBaselineData => "copy_baseline_data",
            ActivityKind::CreateAdminAccount => "create_admin_account",
            ActivityKind::Rollback => "rollback",
            ActivityKind::Provision => "provision",
            ActivityKind::Sync => "sync",
        }
    }
}

/// One entry of the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Unix timestamp (milliseconds).
    pub timestamp: i64,
    pub kind: ActivityKind,
    /// Server and database the action targeted, e.g. `SRV2/CORP1001`.
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_excerpt: Option<String>,
    pub success: bool,
}

impl ActivityRecord {
    pub fn new(kind: ActivityKind, target: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            kind,
            target: target.into(),
            detail: None,
            sql_excerpt: None,
            success: true,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attaches the executed SQL, truncated to `max_chars`.
    pub fn with_sql(mut self, sql: &str, max_chars: usize) -> Self {
        self.sql_excerpt = Some(sql_excerpt(sql, max_chars));
        self
    }

    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }
}

/// Truncates `sql` to at most `max_chars` characters, appending `...` when cut.
pub fn sql_excerpt(sql: &str, max_chars: usize) -> String {
    let trimmed = sql.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &trimmed[..byte_idx]),
        None => trimmed.to_string(),
    }
}

/// Receives activity records. Recording must never block or fail the caller.
pub trait ActivitySink: Send + Sync {
    fn record(&self, record: ActivityRecord);
}

/// Writes records to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActivitySink;

impl ActivitySink for TracingActivitySink {
    fn record(&self, record: ActivityRecord) {
        let detail = record.detail.as_deref().unwrap_or("");
        if record.success {
            info!(
                target: "corpdb::activity",
                kind = record.kind.as_str(),
                target_db = %record.target,
                sql = record.sql_excerpt.as_deref().unwrap_or(""),
                "{}",
                detail
            );
        } else {
            warn!(
                target: "corpdb::activity",
                kind = record.kind.as_str(),
                target_db = %record.target,
                sql = record.sql_excerpt.as_deref().unwrap_or(""),
                "{}",
                detail
            );
        }
    }
}

/// Keeps records in memory; used by tests and by the CLI summary.
#[derive(Debug, Default)]
pub struct MemoryActivitySink {
    records: Mutex<Vec<ActivityRecord>>,
}

impl MemoryActivitySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ActivityRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: ActivityKind) -> usize {
        self.records().iter().filter(|r| r.kind == kind).count()
    }
}

impl ActivitySink for MemoryActivitySink {
    fn record(&self, record: ActivityRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}
