//! Table by table through an intermediate file.
//!
//! Target constraints and triggers are switched off for the whole batch so
//! that tables can be loaded in any order, and switched back on in
//! `finish_batch`. Files are JSON lines written by the adapters, or native
//! `bcp` files when both ends are SQL Server and the tool is available.

use super::bulk_tool::{BulkCopyTool, Direction};
use super::error::SyncError;
use super::models::{SyncStrategy, TableAction, TableSpec, TableSyncResult};
use super::strategy::{clear_table, verify_counts, writable_columns, SyncContext, TableTransport};
use crate::adapter::{DbKind, TableName};
use crate::external::ServerConnection;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

struct BulkRoute {
    tool: BulkCopyTool,
    source: ServerConnection,
    target: ServerConnection,
}

#[derive(Default)]
pub struct ExportImport {
    disabled: Vec<TableName>,
    bulk: Option<BulkRoute>,
}

impl ExportImport {
    fn file_for(&self, ctx: &SyncContext<'_>, table: &TableName) -> PathBuf {
        let extension = if self.bulk.is_some() { "bcp" } else { "jsonl" };
        ctx.settings
            .work_dir
            .join(format!("{}_{}.{}", ctx.job_id, table.file_stem(), extension))
    }

    async fn bulk_route(ctx: &SyncContext<'_>) -> Result<Option<BulkRoute>, SyncError> {
        let source = ctx.source()?;
        if !ctx.settings.use_bcp
            || source.kind() != DbKind::Mssql
            || ctx.target.kind() != DbKind::Mssql
        {
            return Ok(None);
        }
        let Some(path) = BulkCopyTool::locate(ctx.settings.bcp_path.as_deref()) else {
            info!("bcp not found, using JSON line files");
            return Ok(None);
        };
        info!("Using bcp at {}", path.display());
        Ok(Some(BulkRoute {
            tool: BulkCopyTool::new(path, ctx.settings.bcp_batch_size),
            source: ctx.resolver.resolve(&ctx.request.source_server_id).await?,
            target: ctx.resolver.resolve(&ctx.request.target_server_id).await?,
        }))
    }

    async fn copy_through_file(
        &self,
        ctx: &SyncContext<'_>,
        table: &TableName,
        file: &Path,
        result: &mut TableSyncResult,
    ) -> Result<(), SyncError> {
        let source = ctx.source()?;
        let request = ctx.request;

        match &self.bulk {
            Some(route) => {
                let keep_identity = request.options.preserve_identity;
                route
                    .tool
                    .run(
                        Direction::Out,
                        &route.source,
                        &request.source_database,
                        table,
                        file,
                        keep_identity,
                    )
                    .await?;
                clear_table(ctx.target, table).await?;
                route
                    .tool
                    .run(
                        Direction::In,
                        &route.target,
                        &request.target_database,
                        table,
                        file,
                        keep_identity,
                    )
                    .await?;
                result.rows_copied = ctx.target.count_rows(table, None).await?;
            }
            None => {
                let (columns, keep_identity) = writable_columns(ctx, table).await?;
                let exported = source.export_table(table, &columns, file).await?;
                info!("[{}] Exported {} rows of {}", ctx.job_id, exported, table);
                clear_table(ctx.target, table).await?;
                result.rows_copied = ctx
                    .target
                    .import_table(table, &columns, file, ctx.batch_size(), keep_identity)
                    .await?;
            }
        }

        verify_counts(ctx, table, result).await
    }
}

#[async_trait]
impl TableTransport for ExportImport {
    fn strategy(&self) -> SyncStrategy {
        SyncStrategy::ExportImport
    }

    async fn begin_batch(&mut self, ctx: &SyncContext<'_>) -> Result<Vec<String>, SyncError> {
        tokio::fs::create_dir_all(&ctx.settings.work_dir).await?;
        self.bulk = Self::bulk_route(ctx).await?;

        let tables: Vec<TableName> = ctx
            .request
            .tables
            .iter()
            .filter(|spec| spec.action == TableAction::Insert)
            .map(|spec| spec.table.clone())
            .collect();
        if !tables.is_empty() {
            ctx.target.set_constraints_enabled(&tables, false).await?;
            self.disabled = tables;
        }

        let mut notices = Vec::new();
        if ctx
            .request
            .options
            .corp_code_rewrite(ctx.corp_code_columns)
            .is_some()
        {
            notices.push(
                "Export/import copies rows unchanged: corp codes are not substituted.".to_string(),
            );
        }
        if self.bulk.is_some() {
            notices.push("Tables are transferred with bcp.".to_string());
        }
        Ok(notices)
    }

    async fn transfer(
        &self,
        ctx: &SyncContext<'_>,
        spec: &TableSpec,
        result: &mut TableSyncResult,
    ) -> Result<(), SyncError> {
        let file = self.file_for(ctx, &spec.table);
        let outcome = self.copy_through_file(ctx, &spec.table, &file, result).await;
        if let Err(e) = tokio::fs::remove_file(&file).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", file.display(), e);
            }
        }
        outcome
    }

    async fn finish_batch(&mut self, ctx: &SyncContext<'_>) -> Result<(), SyncError> {
        if self.disabled.is_empty() {
            return Ok(());
        }
        let tables = std::mem::take(&mut self.disabled);
        ctx.target.set_constraints_enabled(&tables, true).await?;
        info!(
            "[{}] Constraints and triggers re-enabled on {} tables",
            ctx.job_id,
            tables.len()
        );
        Ok(())
    }
}
