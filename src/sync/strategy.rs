use super::error::SyncError;
use super::models::{SyncRequest, SyncStrategy, TableAction, TableSpec, TableStatus, TableSyncResult};
use crate::adapter::{DatabaseAdapter, RowFilter, TableName};
use crate::config::SyncSettings;
use crate::external::ConnectionResolver;
use async_trait::async_trait;
use std::time::Instant;
use tracing::{info, warn};

/// Everything a transport needs while a job runs.
pub struct SyncContext<'a> {
    pub job_id: &'a str,
    pub request: &'a SyncRequest,
    /// `None` for transports that never talk to the source directly.
    pub source: Option<&'a dyn DatabaseAdapter>,
    pub target: &'a dyn DatabaseAdapter,
    pub resolver: &'a dyn ConnectionResolver,
    pub settings: &'a SyncSettings,
    pub corp_code_columns: &'a [String],
}

impl SyncContext<'_> {
    pub fn source(&self) -> Result<&dyn DatabaseAdapter, SyncError> {
        self.source.ok_or_else(|| {
            SyncError::InvalidRequest(format!(
                "{} does not open a source connection",
                self.request.strategy
            ))
        })
    }

    pub fn batch_size(&self) -> usize {
        self.request
            .options
            .batch_size
            .unwrap_or(self.settings.batch_size)
            .max(1)
    }
}

/// One way of moving table data. A job calls `begin_batch` once, then
/// `sync_table` per table in order, then `finish_batch` on every exit path.
#[async_trait]
pub trait TableTransport: Send + Sync {
    fn strategy(&self) -> SyncStrategy;

    /// Whether the job has to open a connection to the source database.
    fn needs_source(&self) -> bool {
        true
    }

    /// Prepares the batch. Returned strings become job notices.
    async fn begin_batch(&mut self, _ctx: &SyncContext<'_>) -> Result<Vec<String>, SyncError> {
        Ok(Vec::new())
    }

    /// Moves one table, filling in counts on `result` as it goes.
    async fn transfer(
        &self,
        ctx: &SyncContext<'_>,
        spec: &TableSpec,
        result: &mut TableSyncResult,
    ) -> Result<(), SyncError>;

    async fn finish_batch(&mut self, _ctx: &SyncContext<'_>) -> Result<(), SyncError> {
        Ok(())
    }

    /// Runs [`TableTransport::transfer`] and turns the outcome into a
    /// terminal result.
    async fn sync_table(&self, ctx: &SyncContext<'_>, spec: &TableSpec) -> TableSyncResult {
        let started = Instant::now();
        let mut result = TableSyncResult::pending(spec);
        result.status = TableStatus::Running;

        let outcome = match spec.action {
            TableAction::Insert => self.transfer(ctx, spec, &mut result).await,
            TableAction::Delete => delete_target_rows(ctx, &spec.table, &mut result).await,
        };
        match outcome {
            Ok(()) => {
                result.status = TableStatus::Success;
                info!(
                    "[{}] {} {}: {} copied, {} deleted",
                    ctx.job_id,
                    spec.action.as_str(),
                    spec.table,
                    result.rows_copied,
                    result.rows_deleted
                );
            }
            Err(e) => {
                warn!("[{}] {} failed: {}", ctx.job_id, spec.table, e);
                result.fail(e.table_message());
            }
        }
        result.elapsed_ms = started.elapsed().as_millis() as u64;
        result
    }
}

/// Builds the transport for `strategy`.
pub fn transport_for(strategy: SyncStrategy) -> Box<dyn TableTransport> {
    match strategy {
        SyncStrategy::RowCopy => Box::new(super::row_copy::RowCopy),
        SyncStrategy::RemoteDirect => Box::new(super::remote_direct::RemoteDirect::default()),
        SyncStrategy::ExportImport => Box::new(super::export_import::ExportImport::default()),
    }
}

// =============================================================================
// Helpers shared by the transports
// =============================================================================

/// Target columns to write and whether explicit identity values go with them.
/// Identity columns are left out unless identity values are preserved.
pub(crate) async fn writable_columns(
    ctx: &SyncContext<'_>,
    table: &TableName,
) -> Result<(Vec<String>, bool), SyncError> {
    let columns = ctx
        .target
        .list_columns(&ctx.request.target_database, table)
        .await?;
    let preserve = ctx.request.options.preserve_identity;
    let has_identity = columns.iter().any(|c| c.is_identity);
    let names = columns
        .into_iter()
        .filter(|c| preserve || !c.is_identity)
        .map(|c| c.name)
        .collect();
    Ok((names, preserve && has_identity))
}

/// Empties a target table, falling back to `DELETE` when `TRUNCATE` is refused
/// (foreign keys, missing permission).
pub(crate) async fn clear_table(
    target: &dyn DatabaseAdapter,
    table: &TableName,
) -> Result<(), SyncError> {
    if let Err(e) = target.truncate_table(table).await {
        warn!("Truncate of {} failed, deleting instead: {}", table, e);
        target.delete_rows(table, None).await?;
    }
    Ok(())
}

/// Compares source and target row counts and records both on `result`.
pub(crate) async fn verify_counts(
    ctx: &SyncContext<'_>,
    table: &TableName,
    result: &mut TableSyncResult,
) -> Result<(), SyncError> {
    let source_rows = ctx.source()?.count_rows(table, None).await?;
    let target_rows = ctx.target.count_rows(table, None).await?;
    result.source_row_count = Some(source_rows);
    result.target_row_count = Some(target_rows);
    if source_rows != target_rows {
        return Err(SyncError::RowCountMismatch {
            source_rows,
            target_rows,
        });
    }
    Ok(())
}

/// The `Delete` action: removes the target rows of the target corp code, or
/// every row when the request has none.
async fn delete_target_rows(
    ctx: &SyncContext<'_>,
    table: &TableName,
    result: &mut TableSyncResult,
) -> Result<(), SyncError> {
    let options = &ctx.request.options;
    let filter = options
        .target_corp_code
        .as_deref()
        .filter(|code| !code.is_empty())
        .map(|code| RowFilter::equals(options.corp_code_column.as_str(), code));
    result.rows_deleted = ctx.target.delete_rows(table, filter.as_ref()).await?;
    result.target_row_count = Some(ctx.target.count_rows(table, None).await?);
    Ok(())
}
