//! Driver transports. A session ships SQL text to one server connection and
//! decodes results into [`RowSet`]s; all SQL generation lives in the dialects.

#[cfg(feature = "mssql")]
mod mssql;
#[cfg(feature = "mysql")]
mod mysql;
#[cfg(feature = "oracle")]
mod oracle;
#[cfg(feature = "postgres")]
mod postgres;

use super::error::AdapterError;
use super::models::{DbKind, RowSet};
use crate::external::ServerConnection;
use async_trait::async_trait;

#[async_trait]
pub trait SqlSession: Send + Sync {
    /// Runs one statement or batch; returns the affected row count when the
    /// driver reports one.
    async fn execute(&self, sql: &str) -> Result<u64, AdapterError>;

    async fn query(&self, sql: &str) -> Result<RowSet, AdapterError>;

    async fn close(&self) -> Result<(), AdapterError>;
}

/// Opens a driver session for `server`, connected to `database` when given,
/// otherwise to the server's default database.
pub async fn connect(
    server: &ServerConnection,
    database: Option<&str>,
) -> Result<Box<dyn SqlSession>, AdapterError> {
    let database = database.or(server.default_database.as_deref());
    match server.kind {
        #[cfg(feature = "mssql")]
        DbKind::Mssql => Ok(Box::new(mssql::MssqlSession::connect(server, database).await?)),
        #[cfg(feature = "postgres")]
        DbKind::Postgres => Ok(Box::new(
            postgres::PostgresSession::connect(server, database).await?,
        )),
        #[cfg(feature = "mysql")]
        DbKind::Mysql => Ok(Box::new(mysql::MysqlSession::connect(server, database).await?)),
        #[cfg(feature = "oracle")]
        DbKind::Oracle => Ok(Box::new(oracle::OracleSession::connect(server, database).await?)),
        #[allow(unreachable_patterns)]
        kind => Err(AdapterError::Unsupported {
            kind,
            capability: "driver sessions (built without this driver feature)",
        }),
    }
}
