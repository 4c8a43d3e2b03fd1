//! Copies through a server-to-server link: the target runs one
//! `INSERT ... SELECT` per table against the linked source.

use super::error::SyncError;
use super::models::{SyncStrategy, TableSpec, TableSyncResult};
use super::strategy::{clear_table, writable_columns, SyncContext, TableTransport};
use crate::adapter::{RemoteInsert, TableInfo};
use async_trait::async_trait;
use tracing::info;

pub const NO_SUBSTITUTION_NOTICE: &str =
    "Remote direct copy moves rows unchanged: corp codes are not substituted.";

#[derive(Default)]
pub struct RemoteDirect {
    /// Source catalog as seen through the link, with row counts.
    remote_tables: Vec<TableInfo>,
}

impl RemoteDirect {
    fn link<'a>(ctx: &'a SyncContext<'_>) -> Result<&'a str, SyncError> {
        ctx.request
            .link_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| {
                SyncError::InvalidRequest("remote direct copy needs a link name".to_string())
            })
    }
}

#[async_trait]
impl TableTransport for RemoteDirect {
    fn strategy(&self) -> SyncStrategy {
        SyncStrategy::RemoteDirect
    }

    fn needs_source(&self) -> bool {
        false
    }

    async fn begin_batch(&mut self, ctx: &SyncContext<'_>) -> Result<Vec<String>, SyncError> {
        let link = Self::link(ctx)?;
        // Listing through a dead link reports a generic error.
        ctx.target.test_remote_link(link).await?;
        self.remote_tables = ctx
            .target
            .list_remote_tables(link, &ctx.request.source_database)
            .await?;
        info!(
            "[{}] Link {} reachable, {} remote tables",
            ctx.job_id,
            link,
            self.remote_tables.len()
        );
        Ok(vec![NO_SUBSTITUTION_NOTICE.to_string()])
    }

    async fn transfer(
        &self,
        ctx: &SyncContext<'_>,
        spec: &TableSpec,
        result: &mut TableSyncResult,
    ) -> Result<(), SyncError> {
        let link = Self::link(ctx)?;
        result.source_row_count = self
            .remote_tables
            .iter()
            .find(|t| t.table.matches(&spec.table))
            .and_then(|t| t.row_count);

        let (columns, keep_identity) = writable_columns(ctx, &spec.table).await?;
        if ctx.request.options.truncate_before_insert {
            clear_table(ctx.target, &spec.table).await?;
        }

        result.rows_copied = ctx
            .target
            .insert_from_remote(&RemoteInsert {
                link_name: link.to_string(),
                remote_database: ctx.request.source_database.clone(),
                table: spec.table.clone(),
                columns,
                keep_identity,
            })
            .await?;
        Ok(())
    }
}
