use super::SqlSession;
use crate::adapter::error::AdapterError;
use crate::adapter::models::{RowSet, SqlValue};
use crate::external::ServerConnection;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};
use tracing::{debug, warn};

/// Uses the simple query protocol: values come back as text and are written
/// back as literals, which PostgreSQL coerces to the column type.
pub struct PostgresSession {
    client: Mutex<Option<Client>>,
}

fn map_error(err: tokio_postgres::Error) -> AdapterError {
    if let Some(db_error) = err.as_db_error() {
        return AdapterError::Query(db_error.message().to_string());
    }
    if err.is_closed() {
        return AdapterError::Connection(err.to_string());
    }
    AdapterError::Query(err.to_string())
}

impl PostgresSession {
    pub async fn connect(
        server: &ServerConnection,
        database: Option<&str>,
    ) -> Result<Self, AdapterError> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&server.host)
            .port(server.port)
            .user(&server.username)
            .password(&server.password)
            .dbname(database.unwrap_or("postgres"))
            .application_name("corpdb-manager");

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| AdapterError::Connection(e.to_string()))?;

        let server_id = server.id.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("PostgreSQL connection to {} ended with error: {}", server_id, e);
            }
        });

        debug!("Connected to PostgreSQL {} ({:?})", server.id, database);
        Ok(Self {
            client: Mutex::new(Some(client)),
        })
    }
}

#[async_trait]
impl SqlSession for PostgresSession {
    async fn execute(&self, sql: &str) -> Result<u64, AdapterError> {
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| AdapterError::Connection("session is closed".to_string()))?;
        let messages = client.simple_query(sql).await.map_err(map_error)?;
        Ok(messages
            .iter()
            .map(|m| match m {
                SimpleQueryMessage::CommandComplete(n) => *n,
                _ => 0,
            })
            .sum())
    }

    async fn query(&self, sql: &str) -> Result<RowSet, AdapterError> {
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| AdapterError::Connection("session is closed".to_string()))?;
        let messages = client.simple_query(sql).await.map_err(map_error)?;

        let mut result = RowSet::default();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                if result.columns.is_empty() {
                    result.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }
                let values = (0..row.len())
                    .map(|i| match row.get(i) {
                        Some(text) => SqlValue::Text(text.to_string()),
                        None => SqlValue::Null,
                    })
                    .collect();
                result.rows.push(values);
            }
        }
        Ok(result)
    }

    async fn close(&self) -> Result<(), AdapterError> {
        // Dropping the client ends the spawned connection task.
        self.client.lock().await.take();
        Ok(())
    }
}
