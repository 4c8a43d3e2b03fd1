use crate::adapter::TableName;
use crate::corp_code::CorpCodeRewrite;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How table data travels from the source to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Rows are read into the application and inserted in batches.
    RowCopy,
    /// The target pulls rows through a server-to-server link.
    RemoteDirect,
    /// Each table goes through an intermediate file.
    ExportImport,
}

impl SyncStrategy {
    pub const ALL: [SyncStrategy; 3] = [
        SyncStrategy::RowCopy,
        SyncStrategy::RemoteDirect,
        SyncStrategy::ExportImport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStrategy::RowCopy => "row_copy",
            SyncStrategy::RemoteDirect => "remote_direct",
            SyncStrategy::ExportImport => "export_import",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "row_copy" => Some(SyncStrategy::RowCopy),
            "remote_direct" => Some(SyncStrategy::RemoteDirect),
            "export_import" => Some(SyncStrategy::ExportImport),
            _ => None,
        }
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    /// Cancellation requested, the current table is still finishing.
    Cancelling,
    Cancelled,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Cancelling => "cancelling",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Cancelled | JobStatus::Completed | JobStatus::Failed
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl TableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Pending => "pending",
            TableStatus::Running => "running",
            TableStatus::Success => "success",
            TableStatus::Failed => "failed",
            TableStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TableStatus::Success | TableStatus::Failed | TableStatus::Skipped
        )
    }
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableAction {
    #[default]
    Insert,
    /// Remove the target rows of the corp code, or all rows without one.
    Delete,
}

impl TableAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableAction::Insert => "insert",
            TableAction::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub table: TableName,
    #[serde(default)]
    pub action: TableAction,
}

impl TableSpec {
    pub fn insert(table: TableName) -> Self {
        Self {
            table,
            action: TableAction::Insert,
        }
    }

    pub fn delete(table: TableName) -> Self {
        Self {
            table,
            action: TableAction::Delete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    pub truncate_before_insert: bool,
    /// Copy identity column values instead of letting the target assign them.
    pub preserve_identity: bool,
    /// Corp code found in source rows.
    pub source_corp_code: Option<String>,
    /// Corp code written to the target. Also scopes `Delete` actions.
    pub target_corp_code: Option<String>,
    /// Column used to scope `Delete` actions.
    pub corp_code_column: String,
    /// Overrides the configured batch size for row inserts.
    pub batch_size: Option<usize>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            truncate_before_insert: true,
            preserve_identity: true,
            source_corp_code: None,
            target_corp_code: None,
            corp_code_column: "CORP_CD".to_string(),
            batch_size: None,
        }
    }
}

impl SyncOptions {
    /// Substitution to apply to copied rows, when both codes are set and differ.
    pub fn corp_code_rewrite(&self, columns: &[String]) -> Option<CorpCodeRewrite> {
        match (&self.source_corp_code, &self.target_corp_code) {
            (Some(from), Some(to)) if !from.is_empty() && from != to => {
                Some(CorpCodeRewrite::new(from, to, columns.to_vec()))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub source_server_id: String,
    pub source_database: String,
    pub target_server_id: String,
    pub target_database: String,
    pub strategy: SyncStrategy,
    /// Processed in this order.
    pub tables: Vec<TableSpec>,
    #[serde(default)]
    pub options: SyncOptions,
    /// Link on the target server pointing at the source. Required by
    /// [`SyncStrategy::RemoteDirect`].
    #[serde(default)]
    pub link_name: Option<String>,
}

impl SyncRequest {
    pub fn new(
        source_server_id: impl Into<String>,
        source_database: impl Into<String>,
        target_server_id: impl Into<String>,
        target_database: impl Into<String>,
        strategy: SyncStrategy,
    ) -> Self {
        Self {
            source_server_id: source_server_id.into(),
            source_database: source_database.into(),
            target_server_id: target_server_id.into(),
            target_database: target_database.into(),
            strategy,
            tables: Vec::new(),
            options: SyncOptions::default(),
            link_name: None,
        }
    }

    pub fn with_tables(mut self, tables: Vec<TableSpec>) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_link(mut self, link_name: impl Into<String>) -> Self {
        self.link_name = Some(link_name.into());
        self
    }

    pub fn source_label(&self) -> String {
        format!("{}/{}", self.source_server_id, self.source_database)
    }

    pub fn target_label(&self) -> String {
        format!("{}/{}", self.target_server_id, self.target_database)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSyncResult {
    pub table_name: String,
    pub action: TableAction,
    pub source_row_count: Option<u64>,
    pub target_row_count: Option<u64>,
    pub rows_copied: u64,
    /// Rows whose corp code was substituted.
    pub rows_replaced: u64,
    pub rows_deleted: u64,
    pub elapsed_ms: u64,
    pub status: TableStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TableSyncResult {
    pub fn pending(spec: &TableSpec) -> Self {
        Self {
            table_name: spec.table.to_string(),
            action: spec.action,
            source_row_count: None,
            target_row_count: None,
            rows_copied: 0,
            rows_replaced: 0,
            rows_deleted: 0,
            elapsed_ms: 0,
            status: TableStatus::Pending,
            error_message: None,
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = TableStatus::Failed;
        self.error_message = Some(message.into());
    }
}

/// Snapshot of a sync job as held by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub job_id: String,
    pub strategy: SyncStrategy,
    pub source: String,
    pub target: String,
    pub status: JobStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub tables: Vec<TableSyncResult>,
    pub cancel_requested: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Informational messages about the run, e.g. features a strategy skips.
    pub notices: Vec<String>,
}

impl SyncJob {
    pub fn new(job_id: impl Into<String>, request: &SyncRequest) -> Self {
        Self {
            job_id: job_id.into(),
            strategy: request.strategy,
            source: request.source_label(),
            target: request.target_label(),
            status: JobStatus::Pending,
            created_at: chrono::Utc::now(),
            started_at: None,
            finished_at: None,
            tables: request.tables.iter().map(TableSyncResult::pending).collect(),
            cancel_requested: false,
            error_message: None,
            notices: Vec::new(),
        }
    }

    pub fn success_count(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| t.status == TableStatus::Success)
            .count()
    }

    pub fn fail_count(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| t.status == TableStatus::Failed)
            .count()
    }

    /// Tables that reached a terminal status.
    pub fn finished_tables(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| t.status.is_terminal())
            .count()
    }

    /// Percentage of tables finished, 0..=100.
    pub fn progress_percent(&self) -> u8 {
        if self.tables.is_empty() {
            return if self.status.is_terminal() { 100 } else { 0 };
        }
        (self.finished_tables() * 100 / self.tables.len()) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SyncRequest {
        SyncRequest::new("SRV1", "CORP1001", "SRV2", "CORP1001", SyncStrategy::RowCopy)
            .with_tables(vec![
                TableSpec::insert(TableName::parse("dbo.TB_DEPT")),
                TableSpec::delete(TableName::parse("dbo.TB_LOG")),
            ])
    }

    #[test]
    fn test_new_job_lists_tables_pending() {
        let job = SyncJob::new("job-1", &request());
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.tables.len(), 2);
        assert!(job.tables.iter().all(|t| t.status == TableStatus::Pending));
        assert_eq!(job.tables[1].action, TableAction::Delete);
        assert_eq!(job.progress_percent(), 0);
    }

    #[test]
    fn test_counts_and_progress() {
        let mut job = SyncJob::new("job-1", &request());
        job.tables[0].status = TableStatus::Success;
        job.tables[1].fail("Row count mismatch");
        assert_eq!(job.success_count(), 1);
        assert_eq!(job.fail_count(), 1);
        assert_eq!(job.progress_percent(), 100);
    }

    #[test]
    fn test_rewrite_only_when_codes_differ() {
        let columns = vec!["CORP_CD".to_string()];
        let mut options = SyncOptions::default();
        assert!(options.corp_code_rewrite(&columns).is_none());

        options.source_corp_code = Some("1001".to_string());
        options.target_corp_code = Some("1001".to_string());
        assert!(options.corp_code_rewrite(&columns).is_none());

        options.target_corp_code = Some("2002".to_string());
        let rewrite = options.corp_code_rewrite(&columns).unwrap();
        assert_eq!(rewrite.from, "1001");
        assert_eq!(rewrite.to, "2002");
    }

    #[test]
    fn test_strategy_from_str_accepts_dashes() {
        assert_eq!(
            SyncStrategy::from_str("export-import"),
            Some(SyncStrategy::ExportImport)
        );
        for strategy in SyncStrategy::ALL {
            assert_eq!(SyncStrategy::from_str(strategy.as_str()), Some(strategy));
        }
        assert_eq!(SyncStrategy::from_str("bcp"), None);
    }
}
