//! Rows read into the application and inserted into the target in batches.

use super::error::SyncError;
use super::models::{SyncStrategy, TableSpec, TableSyncResult};
use super::strategy::{clear_table, verify_counts, writable_columns, SyncContext, TableTransport};
use async_trait::async_trait;
use tracing::debug;

pub struct RowCopy;

#[async_trait]
impl TableTransport for RowCopy {
    fn strategy(&self) -> SyncStrategy {
        SyncStrategy::RowCopy
    }

    async fn transfer(
        &self,
        ctx: &SyncContext<'_>,
        spec: &TableSpec,
        result: &mut TableSyncResult,
    ) -> Result<(), SyncError> {
        let source = ctx.source()?;
        let table = &spec.table;
        let (columns, keep_identity) = writable_columns(ctx, table).await?;

        if ctx.request.options.truncate_before_insert {
            clear_table(ctx.target, table).await?;
        }

        let mut rows = source.select_rows(table, &columns).await?;
        if let Some(rewrite) = ctx.request.options.corp_code_rewrite(ctx.corp_code_columns) {
            result.rows_replaced = rewrite.apply(&mut rows);
        }

        for chunk in rows.rows.chunks(ctx.batch_size()) {
            result.rows_copied += ctx
                .target
                .insert_rows(table, &rows.columns, chunk, keep_identity)
                .await?;
            debug!("[{}] {}: {} rows so far", ctx.job_id, table, result.rows_copied);
        }

        verify_counts(ctx, table, result).await
    }
}
