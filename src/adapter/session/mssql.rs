use super::SqlSession;
use crate::adapter::error::AdapterError;
use crate::adapter::models::{RowSet, SqlValue};
use crate::external::ServerConnection;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

type TdsClient = Client<Compat<TcpStream>>;

pub struct MssqlSession {
    client: Mutex<Option<TdsClient>>,
}

fn map_error(err: tiberius::error::Error) -> AdapterError {
    match err {
        tiberius::error::Error::Server(token) => AdapterError::Query(token.message().to_string()),
        tiberius::error::Error::Io { message, .. } => AdapterError::Connection(message),
        other => AdapterError::Query(other.to_string()),
    }
}

fn convert(data: ColumnData<'static>) -> SqlValue {
    let value = match &data {
        ColumnData::U8(v) => v.map(|v| SqlValue::Int(v as i64)),
        ColumnData::I16(v) => v.map(|v| SqlValue::Int(v as i64)),
        ColumnData::I32(v) => v.map(|v| SqlValue::Int(v as i64)),
        ColumnData::I64(v) => v.map(SqlValue::Int),
        ColumnData::F32(v) => v.map(|v| SqlValue::Float(v as f64)),
        ColumnData::F64(v) => v.map(SqlValue::Float),
        ColumnData::Bit(v) => v.map(SqlValue::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| SqlValue::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(|g| SqlValue::Text(g.to_string().to_uppercase())),
        ColumnData::Binary(v) => v.as_ref().map(|b| SqlValue::Bytes(b.to_vec())),
        ColumnData::Numeric(v) => v.map(|n| SqlValue::Text(n.to_string())),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| SqlValue::Text((**x).clone().into_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(&data)
                .ok()
                .flatten()
                .map(SqlValue::DateTime)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(&data)
            .ok()
            .flatten()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(SqlValue::DateTime),
        ColumnData::Time(_) => NaiveTime::from_sql(&data)
            .ok()
            .flatten()
            .map(|t| SqlValue::Text(t.format("%H:%M:%S%.f").to_string())),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(&data)
            .ok()
            .flatten()
            .map(|dt| SqlValue::Text(dt.to_rfc3339())),
        #[allow(unreachable_patterns)]
        _ => None,
    };
    value.unwrap_or(SqlValue::Null)
}

impl MssqlSession {
    pub async fn connect(
        server: &ServerConnection,
        database: Option<&str>,
    ) -> Result<Self, AdapterError> {
        let mut config = Config::new();
        config.host(&server.host);
        config.port(server.port);
        config.authentication(AuthMethod::sql_server(&server.username, &server.password));
        config.application_name("corpdb-manager");
        config.trust_cert();
        if let Some(db) = database {
            config.database(db);
        }

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| AdapterError::Connection(e.to_string()))?;
        tcp.set_nodelay(true)
            .map_err(|e| AdapterError::Connection(e.to_string()))?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| AdapterError::Connection(e.to_string()))?;
        debug!("Connected to SQL Server {} ({:?})", server.id, database);
        Ok(Self {
            client: Mutex::new(Some(client)),
        })
    }
}

#[async_trait]
impl SqlSession for MssqlSession {
    async fn execute(&self, sql: &str) -> Result<u64, AdapterError> {
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| AdapterError::Connection("session is closed".to_string()))?;
        let result = client.execute(sql, &[]).await.map_err(map_error)?;
        Ok(result.total())
    }

    async fn query(&self, sql: &str) -> Result<RowSet, AdapterError> {
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| AdapterError::Connection("session is closed".to_string()))?;
        let mut stream = client.simple_query(sql).await.map_err(map_error)?;
        let columns: Vec<String> = stream
            .columns()
            .await
            .map_err(map_error)?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = stream.into_first_result().await.map_err(map_error)?;
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(convert).collect())
            .collect();
        Ok(RowSet::new(columns, rows))
    }

    async fn close(&self) -> Result<(), AdapterError> {
        if let Some(client) = self.client.lock().await.take() {
            client.close().await.map_err(map_error)?;
        }
        Ok(())
    }
}
