use super::SqlSession;
use crate::adapter::error::AdapterError;
use crate::adapter::models::{RowSet, SqlValue};
use crate::external::ServerConnection;
use async_trait::async_trait;
use chrono::NaiveDate;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder, Row, Value};
use tokio::sync::Mutex;
use tracing::debug;

pub struct MysqlSession {
    conn: Mutex<Option<Conn>>,
}

fn map_error(err: mysql_async::Error) -> AdapterError {
    match err {
        mysql_async::Error::Server(server) => AdapterError::Query(server.message),
        mysql_async::Error::Io(io) => AdapterError::Connection(io.to_string()),
        other => AdapterError::Query(other.to_string()),
    }
}

fn convert(value: Value) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => SqlValue::Text(text),
            Err(e) => SqlValue::Bytes(e.into_bytes()),
        },
        Value::Int(v) => SqlValue::Int(v),
        Value::UInt(v) => match i64::try_from(v) {
            Ok(v) => SqlValue::Int(v),
            Err(_) => SqlValue::Text(v.to_string()),
        },
        Value::Float(v) => SqlValue::Float(v as f64),
        Value::Double(v) => SqlValue::Float(v),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                .and_then(|d| {
                    d.and_hms_micro_opt(hour as u32, minute as u32, second as u32, micros)
                })
                .map(SqlValue::DateTime)
                .unwrap_or(SqlValue::Null)
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => SqlValue::Text(format!(
            "{}{:02}:{:02}:{:02}.{:06}",
            if negative { "-" } else { "" },
            days * 24 + hours as u32,
            minutes,
            seconds,
            micros
        )),
    }
}

impl MysqlSession {
    pub async fn connect(
        server: &ServerConnection,
        database: Option<&str>,
    ) -> Result<Self, AdapterError> {
        let opts = OptsBuilder::default()
            .ip_or_hostname(server.host.clone())
            .tcp_port(server.port)
            .user(Some(server.username.clone()))
            .pass(Some(server.password.clone()))
            .db_name(database.map(str::to_string));
        let conn = Conn::new(opts)
            .await
            .map_err(|e| AdapterError::Connection(e.to_string()))?;
        debug!("Connected to MySQL {} ({:?})", server.id, database);
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }
}

#[async_trait]
impl SqlSession for MysqlSession {
    async fn execute(&self, sql: &str) -> Result<u64, AdapterError> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| AdapterError::Connection("session is closed".to_string()))?;
        conn.query_drop(sql).await.map_err(map_error)?;
        Ok(conn.affected_rows())
    }

    async fn query(&self, sql: &str) -> Result<RowSet, AdapterError> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| AdapterError::Connection("session is closed".to_string()))?;
        let rows: Vec<Row> = conn.query(sql).await.map_err(map_error)?;

        let mut result = RowSet::default();
        if let Some(first) = rows.first() {
            result.columns = first
                .columns_ref()
                .iter()
                .map(|c| c.name_str().into_owned())
                .collect();
        }
        result.rows = rows
            .into_iter()
            .map(|row| Row::unwrap(row).into_iter().map(convert).collect())
            .collect();
        Ok(result)
    }

    async fn close(&self) -> Result<(), AdapterError> {
        if let Some(conn) = self.conn.lock().await.take() {
            conn.disconnect().await.map_err(map_error)?;
        }
        Ok(())
    }
}
