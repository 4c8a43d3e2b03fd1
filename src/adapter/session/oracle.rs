use super::SqlSession;
use crate::adapter::error::AdapterError;
use crate::adapter::models::{RowSet, SqlValue};
use crate::external::ServerConnection;
use async_trait::async_trait;
use oracle::Connection;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// The `oracle` driver is blocking; every call runs on the blocking pool.
///
/// Values are read back as text.
pub struct OracleSession {
    conn: Arc<Mutex<Option<Connection>>>,
}

fn query_error(err: oracle::Error) -> AdapterError {
    AdapterError::Query(err.to_string())
}

impl OracleSession {
    pub async fn connect(
        server: &ServerConnection,
        database: Option<&str>,
    ) -> Result<Self, AdapterError> {
        let connect_string = format!(
            "//{}:{}/{}",
            server.host,
            server.port,
            database.unwrap_or("ORCLCDB")
        );
        let username = server.username.clone();
        let password = server.password.clone();
        let conn = tokio::task::spawn_blocking(move || {
            Connection::connect(&username, &password, &connect_string)
        })
        .await
        .map_err(|e| AdapterError::Connection(e.to_string()))?
        .map_err(|e| AdapterError::Connection(e.to_string()))?;
        debug!("Connected to Oracle {} ({:?})", server.id, database);
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T, AdapterError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, AdapterError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| AdapterError::Connection("session lock poisoned".to_string()))?;
            let conn = guard
                .as_ref()
                .ok_or_else(|| AdapterError::Connection("session is closed".to_string()))?;
            f(conn)
        })
        .await
        .map_err(|e| AdapterError::Connection(e.to_string()))?
    }
}

#[async_trait]
impl SqlSession for OracleSession {
    async fn execute(&self, sql: &str) -> Result<u64, AdapterError> {
        let sql = sql.to_string();
        self.with_connection(move |conn| {
            let stmt = conn.execute(&sql, &[]).map_err(query_error)?;
            let affected = stmt.row_count().map_err(query_error)?;
            conn.commit().map_err(query_error)?;
            Ok(affected)
        })
        .await
    }

    async fn query(&self, sql: &str) -> Result<RowSet, AdapterError> {
        let sql = sql.to_string();
        self.with_connection(move |conn| {
            let rows = conn.query(&sql, &[]).map_err(query_error)?;
            let columns: Vec<String> = rows
                .column_info()
                .iter()
                .map(|c| c.name().to_string())
                .collect();
            let mut result = RowSet::new(columns, Vec::new());
            for row in rows {
                let row = row.map_err(query_error)?;
                let mut values = Vec::with_capacity(result.columns.len());
                for idx in 0..result.columns.len() {
                    let value: Option<String> = row.get(idx).map_err(query_error)?;
                    values.push(value.map(SqlValue::Text).unwrap_or(SqlValue::Null));
                }
                result.rows.push(values);
            }
            Ok(result)
        })
        .await
    }

    async fn close(&self) -> Result<(), AdapterError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let taken = conn.lock().ok().and_then(|mut guard| guard.take());
            match taken {
                Some(conn) => conn.close().map_err(query_error),
                None => Ok(()),
            }
        })
        .await
        .map_err(|e| AdapterError::Connection(e.to_string()))?
    }
}
