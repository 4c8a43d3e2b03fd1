use super::dialect::Dialect;
use super::error::AdapterError;
use super::models::{
    ColumnDef, DbKind, Description, IndexDef, LoginSpec, RemoteInsert, RowFilter, RowSet,
    SqlValue, TableDef, TableInfo, TableName,
};
use super::session::SqlSession;
use super::DatabaseAdapter;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Driver-backed adapter: SQL from a [`Dialect`], shipped over a [`SqlSession`].
pub struct SqlAdapter {
    dialect: Box<dyn Dialect>,
    session: Box<dyn SqlSession>,
    database: Option<String>,
}

impl SqlAdapter {
    pub fn new(
        dialect: Box<dyn Dialect>,
        session: Box<dyn SqlSession>,
        database: Option<String>,
    ) -> Self {
        Self {
            dialect,
            session,
            database,
        }
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    async fn execute_all(&self, statements: &[String]) -> Result<u64, AdapterError> {
        let mut affected = 0;
        for sql in statements {
            debug!("[{}] {}", self.dialect.kind(), sql);
            affected += self.session.execute(sql).await?;
        }
        Ok(affected)
    }

    fn unsupported(&self, capability: &'static str) -> AdapterError {
        AdapterError::Unsupported {
            kind: self.dialect.kind(),
            capability,
        }
    }

    fn check_catalog_database(&self, database: &str) -> Result<(), AdapterError> {
        if self.dialect.cross_database_catalog() {
            return Ok(());
        }
        match &self.database {
            Some(current) if current.eq_ignore_ascii_case(database) => Ok(()),
            _ => Err(self.unsupported("cross-database catalog access")),
        }
    }

    /// Wraps `sql` in identity insert on/off inside a single batch so the
    /// setting cannot outlive the statement, even when it fails.
    fn with_identity_insert(&self, table: &TableName, sql: String, keep_identity: bool) -> String {
        if !keep_identity {
            return sql;
        }
        match (
            self.dialect.identity_insert_sql(table, true),
            self.dialect.identity_insert_sql(table, false),
        ) {
            (Some(on), Some(off)) => format!("{};\n{};\n{}", on, sql, off),
            _ => sql,
        }
    }

    async fn query_names(&self, sql: &str) -> Result<Vec<String>, AdapterError> {
        let rows = self.session.query(sql).await?;
        Ok(rows
            .rows
            .iter()
            .filter_map(|row| row.first())
            .filter(|v| !v.is_null())
            .map(|v| v.display_string())
            .collect())
    }
}

fn decode_tables(rows: &RowSet) -> Vec<TableInfo> {
    (0..rows.len())
        .filter_map(|i| {
            let name = rows.text(i, "table_name")?;
            let table = match rows.text(i, "schema_name") {
                Some(schema) => TableName::with_schema(schema, name),
                None => TableName::new(name),
            };
            Some(TableInfo {
                table,
                row_count: rows
                    .value(i, "row_count")
                    .and_then(|v| v.as_i64())
                    .map(|n| n.max(0) as u64),
                has_identity: rows
                    .value(i, "has_identity")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
                description: rows.text(i, "description"),
            })
        })
        .collect()
}

fn decode_columns(rows: &RowSet) -> Vec<ColumnDef> {
    (0..rows.len())
        .filter_map(|i| {
            Some(ColumnDef {
                name: rows.text(i, "column_name")?,
                data_type: rows.text(i, "data_type")?,
                nullable: rows
                    .value(i, "is_nullable")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(true),
                is_identity: rows
                    .value(i, "is_identity")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
                default_value: rows.text(i, "column_default"),
            })
        })
        .collect()
}

/// Folds one row per (index, column) into index definitions, keeping key order.
fn decode_indexes(table: &TableName, rows: &RowSet) -> Vec<IndexDef> {
    let mut indexes: Vec<IndexDef> = Vec::new();
    for i in 0..rows.len() {
        let (Some(name), Some(column)) = (rows.text(i, "index_name"), rows.text(i, "column_name"))
        else {
            continue;
        };
        let flag = |col: &str| {
            rows.value(i, col)
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
        };
        match indexes.iter_mut().find(|idx| idx.name == name) {
            Some(index) => index.columns.push(column),
            None => indexes.push(IndexDef {
                table: table.clone(),
                name,
                columns: vec![column],
                unique: flag("is_unique"),
                primary: flag("is_primary"),
            }),
        }
    }
    indexes
}

fn decode_descriptions(table: &TableName, rows: &RowSet) -> Vec<Description> {
    (0..rows.len())
        .filter_map(|i| {
            Some(Description {
                table: table.clone(),
                column: rows.text(i, "column_name"),
                text: rows.text(i, "description")?,
            })
        })
        .collect()
}

#[async_trait]
impl DatabaseAdapter for SqlAdapter {
    fn kind(&self) -> DbKind {
        self.dialect.kind()
    }

    fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    async fn close(&self) -> Result<(), AdapterError> {
        self.session.close().await
    }

    async fn execute(&self, sql: &str) -> Result<u64, AdapterError> {
        debug!("[{}] {}", self.dialect.kind(), sql);
        self.session.execute(sql).await
    }

    async fn query(&self, sql: &str) -> Result<RowSet, AdapterError> {
        self.session.query(sql).await
    }

    async fn list_databases(&self) -> Result<Vec<String>, AdapterError> {
        self.query_names(&self.dialect.list_databases_sql()).await
    }

    async fn database_exists(&self, name: &str) -> Result<bool, AdapterError> {
        let count = self
            .execute_scalar(&self.dialect.database_exists_sql(name))
            .await?
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        Ok(count > 0)
    }

    async fn drop_database(&self, name: &str) -> Result<(), AdapterError> {
        self.execute_all(&self.dialect.drop_database_sql(name))
            .await
            .map(|_| ())
    }

    async fn create_login(&self, spec: &LoginSpec) -> Result<(), AdapterError> {
        for (i, sql) in self.dialect.create_login_sql(spec).iter().enumerate() {
            // Passwords stay out of the logs.
            if let Err(e) = self.session.execute(sql).await {
                if i > 0 {
                    // The login itself exists by now; leave nothing behind.
                    let cleanup = self.dialect.drop_login_sql(&spec.login_name);
                    if let Err(drop_err) = self.execute_all(&cleanup).await {
                        warn!(
                            "Dropping partially created login {} failed: {}",
                            spec.login_name, drop_err
                        );
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    async fn drop_login(&self, login_name: &str) -> Result<(), AdapterError> {
        self.execute_all(&self.dialect.drop_login_sql(login_name))
            .await
            .map(|_| ())
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<TableInfo>, AdapterError> {
        self.check_catalog_database(database)?;
        let rows = self
            .session
            .query(&self.dialect.list_tables_sql(database))
            .await?;
        Ok(decode_tables(&rows))
    }

    async fn list_columns(
        &self,
        database: &str,
        table: &TableName,
    ) -> Result<Vec<ColumnDef>, AdapterError> {
        self.check_catalog_database(database)?;
        let rows = self
            .session
            .query(&self.dialect.list_columns_sql(database, table))
            .await?;
        Ok(decode_columns(&rows))
    }

    async fn create_table(&self, def: &TableDef) -> Result<(), AdapterError> {
        self.execute_all(&self.dialect.create_table_sql(def))
            .await
            .map(|_| ())
    }

    async fn list_indexes(&self, table: &TableName) -> Result<Vec<IndexDef>, AdapterError> {
        let rows = self
            .session
            .query(&self.dialect.list_indexes_sql(table))
            .await?;
        Ok(decode_indexes(table, &rows))
    }

    async fn create_index(&self, index: &IndexDef) -> Result<(), AdapterError> {
        self.execute(&self.dialect.create_index_sql(index))
            .await
            .map(|_| ())
    }

    async fn list_descriptions(
        &self,
        table: &TableName,
    ) -> Result<Vec<Description>, AdapterError> {
        let rows = self
            .session
            .query(&self.dialect.list_descriptions_sql(table))
            .await?;
        Ok(decode_descriptions(table, &rows))
    }

    async fn apply_description(&self, description: &Description) -> Result<(), AdapterError> {
        match self.dialect.apply_description_sql(description) {
            Some(sql) => self.execute(&sql).await.map(|_| ()),
            None => {
                debug!(
                    "Skipping description on {} {:?}: not expressible for {}",
                    description.table,
                    description.column,
                    self.dialect.kind()
                );
                Ok(())
            }
        }
    }

    async fn select_rows(
        &self,
        table: &TableName,
        columns: &[String],
    ) -> Result<RowSet, AdapterError> {
        self.session
            .query(&self.dialect.select_sql(table, columns))
            .await
    }

    async fn insert_rows(
        &self,
        table: &TableName,
        columns: &[String],
        rows: &[Vec<SqlValue>],
        keep_identity: bool,
    ) -> Result<u64, AdapterError> {
        let mut inserted = 0;
        for chunk in rows.chunks(self.dialect.max_rows_per_insert().max(1)) {
            let sql = self.dialect.insert_sql(table, columns, chunk);
            let sql = self.with_identity_insert(table, sql, keep_identity);
            let affected = self.session.execute(&sql).await?;
            // Some drivers report nothing for multi-statement batches.
            inserted += if affected == 0 {
                chunk.len() as u64
            } else {
                affected
            };
        }
        Ok(inserted)
    }

    async fn count_rows(
        &self,
        table: &TableName,
        filter: Option<&RowFilter>,
    ) -> Result<u64, AdapterError> {
        let count = self
            .execute_scalar(&self.dialect.count_sql(table, filter))
            .await?
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    async fn truncate_table(&self, table: &TableName) -> Result<(), AdapterError> {
        self.execute(&self.dialect.truncate_sql(table))
            .await
            .map(|_| ())
    }

    async fn delete_rows(
        &self,
        table: &TableName,
        filter: Option<&RowFilter>,
    ) -> Result<u64, AdapterError> {
        self.execute(&self.dialect.delete_sql(table, filter)).await
    }

    async fn set_constraints_enabled(
        &self,
        tables: &[TableName],
        enabled: bool,
    ) -> Result<(), AdapterError> {
        let mut statements = Vec::new();
        if let Some(sql) = self.dialect.session_constraints_sql(enabled) {
            statements.push(sql);
        }
        for table in tables {
            statements.extend(self.dialect.constraints_sql(table, enabled));
        }
        self.execute_all(&statements).await.map(|_| ())
    }

    async fn list_remote_links(&self) -> Result<Vec<String>, AdapterError> {
        let sql = self
            .dialect
            .list_remote_links_sql()
            .ok_or_else(|| self.unsupported("server links"))?;
        self.query_names(&sql).await
    }

    async fn test_remote_link(&self, link_name: &str) -> Result<(), AdapterError> {
        let sql = self
            .dialect
            .test_remote_link_sql(link_name)
            .ok_or_else(|| self.unsupported("server links"))?;
        self.execute(&sql).await.map(|_| ())
    }

    async fn list_remote_databases(&self, link_name: &str) -> Result<Vec<String>, AdapterError> {
        let sql = self
            .dialect
            .list_remote_databases_sql(link_name)
            .ok_or_else(|| self.unsupported("server links"))?;
        self.query_names(&sql).await
    }

    async fn list_remote_tables(
        &self,
        link_name: &str,
        database: &str,
    ) -> Result<Vec<TableInfo>, AdapterError> {
        let sql = self
            .dialect
            .list_remote_tables_sql(link_name, database)
            .ok_or_else(|| self.unsupported("server links"))?;
        let rows = self.session.query(&sql).await?;
        Ok(decode_tables(&rows))
    }

    async fn insert_from_remote(&self, insert: &RemoteInsert) -> Result<u64, AdapterError> {
        let sql = self
            .dialect
            .remote_insert_sql(insert)
            .ok_or_else(|| self.unsupported("server links"))?;
        let sql = self.with_identity_insert(&insert.table, sql, insert.keep_identity);
        self.execute(&sql).await
    }
}
