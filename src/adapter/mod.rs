//! Uniform access to the four supported server kinds.
//!
//! [`DatabaseAdapter`] is the capability set the orchestrator and the sync
//! engine program against. Driver-backed adapters are a [`SqlAdapter`]: a
//! per-kind [`dialect::Dialect`] that renders SQL paired with a
//! [`session::SqlSession`] that ships it to the server. [`MemoryCluster`]
//! implements the same capabilities without a server and backs the tests and
//! dry runs.

pub mod dialect;
mod error;
mod factory;
mod memory;
mod models;
pub mod session;
mod sql_adapter;

pub use error::AdapterError;
pub use factory::{AdapterFactory, DriverFactory};
pub use memory::{MemoryAdapter, MemoryCluster};
pub use models::{
    ColumnDef, DbKind, Description, IndexDef, LoginSpec, RemoteInsert, RowFilter, RowSet,
    SqlValue, TableDef, TableInfo, TableName,
};
pub use sql_adapter::SqlAdapter;

use async_trait::async_trait;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Capabilities every server kind exposes.
///
/// An adapter is bound to one server and, optionally, one database. It is
/// opened for a single logical operation and closed on every exit path.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    fn kind(&self) -> DbKind;

    /// Database the adapter is connected to, if any.
    fn database(&self) -> Option<&str>;

    async fn close(&self) -> Result<(), AdapterError>;

    // =========================================================================
    // Raw SQL
    // =========================================================================

    /// Runs a statement, returning the affected row count when known.
    async fn execute(&self, sql: &str) -> Result<u64, AdapterError>;

    async fn query(&self, sql: &str) -> Result<RowSet, AdapterError>;

    async fn execute_scalar(&self, sql: &str) -> Result<Option<SqlValue>, AdapterError> {
        let rows = self.query(sql).await?;
        Ok(rows.first_value().cloned())
    }

    // =========================================================================
    // Server catalog
    // =========================================================================

    async fn list_databases(&self) -> Result<Vec<String>, AdapterError>;

    async fn database_exists(&self, name: &str) -> Result<bool, AdapterError>;

    async fn drop_database(&self, name: &str) -> Result<(), AdapterError>;

    async fn create_login(&self, spec: &LoginSpec) -> Result<(), AdapterError>;

    async fn drop_login(&self, login_name: &str) -> Result<(), AdapterError>;

    // =========================================================================
    // Schema
    // =========================================================================

    async fn list_tables(&self, database: &str) -> Result<Vec<TableInfo>, AdapterError>;

    async fn list_columns(
        &self,
        database: &str,
        table: &TableName,
    ) -> Result<Vec<ColumnDef>, AdapterError>;

    async fn create_table(&self, def: &TableDef) -> Result<(), AdapterError>;

    async fn list_indexes(&self, table: &TableName) -> Result<Vec<IndexDef>, AdapterError>;

    async fn create_index(&self, index: &IndexDef) -> Result<(), AdapterError>;

    async fn list_descriptions(&self, table: &TableName)
        -> Result<Vec<Description>, AdapterError>;

    async fn apply_description(&self, description: &Description) -> Result<(), AdapterError>;

    // =========================================================================
    // Data
    // =========================================================================

    async fn select_rows(
        &self,
        table: &TableName,
        columns: &[String],
    ) -> Result<RowSet, AdapterError>;

    /// Inserts rows in one round trip per dialect-sized chunk. With
    /// `keep_identity` explicit identity values are written.
    async fn insert_rows(
        &self,
        table: &TableName,
        columns: &[String],
        rows: &[Vec<SqlValue>],
        keep_identity: bool,
    ) -> Result<u64, AdapterError>;

    async fn count_rows(
        &self,
        table: &TableName,
        filter: Option<&RowFilter>,
    ) -> Result<u64, AdapterError>;

    async fn truncate_table(&self, table: &TableName) -> Result<(), AdapterError>;

    async fn delete_rows(
        &self,
        table: &TableName,
        filter: Option<&RowFilter>,
    ) -> Result<u64, AdapterError>;

    /// Disables or re-enables constraint checking and triggers on `tables`.
    async fn set_constraints_enabled(
        &self,
        tables: &[TableName],
        enabled: bool,
    ) -> Result<(), AdapterError>;

    // =========================================================================
    // Server-to-server links
    // =========================================================================

    async fn list_remote_links(&self) -> Result<Vec<String>, AdapterError>;

    async fn test_remote_link(&self, link_name: &str) -> Result<(), AdapterError>;

    async fn list_remote_databases(&self, link_name: &str) -> Result<Vec<String>, AdapterError>;

    /// Tables of a remote database with row counts taken from the remote catalog.
    async fn list_remote_tables(
        &self,
        link_name: &str,
        database: &str,
    ) -> Result<Vec<TableInfo>, AdapterError>;

    /// Single `INSERT ... SELECT` issued from this server. Identity insert is
    /// switched off again even when the statement fails.
    async fn insert_from_remote(&self, insert: &RemoteInsert) -> Result<u64, AdapterError>;

    // =========================================================================
    // Intermediate files
    // =========================================================================

    /// Writes `table` to `path` as JSON lines, one array of values per row.
    async fn export_table(
        &self,
        table: &TableName,
        columns: &[String],
        path: &Path,
    ) -> Result<u64, AdapterError> {
        let rows = self.select_rows(table, columns).await?;
        let mut file = tokio::fs::File::create(path).await?;
        for row in &rows.rows {
            let mut line = serde_json::to_vec(row)?;
            line.push(b'\n');
            file.write_all(&line).await?;
        }
        file.flush().await?;
        Ok(rows.len() as u64)
    }

    /// Reads a file produced by [`DatabaseAdapter::export_table`] into `table`.
    async fn import_table(
        &self,
        table: &TableName,
        columns: &[String],
        path: &Path,
        batch_size: usize,
        keep_identity: bool,
    ) -> Result<u64, AdapterError> {
        let file = tokio::fs::File::open(path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut batch = Vec::with_capacity(batch_size.max(1));
        let mut imported = 0;
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            batch.push(serde_json::from_str::<Vec<SqlValue>>(&line)?);
            if batch.len() >= batch_size.max(1) {
                imported += self
                    .insert_rows(table, columns, &batch, keep_identity)
                    .await?;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            imported += self
                .insert_rows(table, columns, &batch, keep_identity)
                .await?;
        }
        Ok(imported)
    }
}
