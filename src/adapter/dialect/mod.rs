//! Per-kind SQL rendering.
//!
//! A dialect is pure: it turns adapter requests into SQL text and never talks
//! to a server. Catalog queries return a fixed set of column aliases so that
//! [`crate::adapter::SqlAdapter`] can decode them the same way for every kind:
//!
//! - tables: `schema_name, table_name, row_count, has_identity, description`
//! - columns: `column_name, data_type, is_nullable, is_identity, column_default`
//! - indexes: `index_name, column_name, is_unique, is_primary` (key order)
//! - descriptions: `column_name, description`

mod mssql;
mod mysql;
mod oracle;
mod postgres;

pub use mssql::MssqlDialect;
pub use mysql::MysqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;

use super::models::{
    ColumnDef, DbKind, Description, IndexDef, LoginSpec, RemoteInsert, RowFilter, SqlValue,
    TableDef, TableName,
};

/// Returns the dialect for `kind`.
pub fn dialect_for(kind: DbKind) -> Box<dyn Dialect> {
    match kind {
        DbKind::Mssql => Box::new(MssqlDialect),
        DbKind::Postgres => Box::new(PostgresDialect),
        DbKind::Mysql => Box::new(MysqlDialect),
        DbKind::Oracle => Box::new(OracleDialect),
    }
}

/// Doubles single quotes for use inside a string literal.
pub fn escape_string(s: &str) -> String {
    s.replace('\'', "''")
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

pub trait Dialect: Send + Sync {
    fn kind(&self) -> DbKind;

    fn quote_ident(&self, name: &str) -> String;

    fn qualify(&self, table: &TableName) -> String {
        match &table.schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_ident(schema),
                self.quote_ident(&table.name)
            ),
            None => self.quote_ident(&table.name),
        }
    }

    fn string_literal(&self, s: &str) -> String {
        format!("'{}'", escape_string(s))
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        format!("X'{}'", hex(bytes))
    }

    fn datetime_literal(&self, value: &chrono::NaiveDateTime) -> String {
        format!("'{}'", value.format("%Y-%m-%d %H:%M:%S%.6f"))
    }

    fn bool_literal(&self, value: bool) -> String {
        let literal = if value { "1" } else { "0" };
        literal.to_string()
    }

    fn literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => self.bool_literal(*b),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::Float(f) if f.is_finite() => f.to_string(),
            SqlValue::Float(_) => "NULL".to_string(),
            SqlValue::Text(s) => self.string_literal(s),
            SqlValue::Bytes(b) => self.bytes_literal(b),
            SqlValue::DateTime(dt) => self.datetime_literal(dt),
        }
    }

    /// Upper bound on rows per multi-row `INSERT`.
    fn max_rows_per_insert(&self) -> usize {
        1000
    }

    /// Whether catalog queries can target a database other than the connected one.
    fn cross_database_catalog(&self) -> bool {
        false
    }

    // =========================================================================
    // Server catalog
    // =========================================================================

    fn list_databases_sql(&self) -> String;

    /// Query returning a single count.
    fn database_exists_sql(&self, name: &str) -> String;

    fn drop_database_sql(&self, name: &str) -> Vec<String>;

    fn create_login_sql(&self, spec: &LoginSpec) -> Vec<String>;

    fn drop_login_sql(&self, login_name: &str) -> Vec<String>;

    // =========================================================================
    // Schema catalog
    // =========================================================================

    fn list_tables_sql(&self, database: &str) -> String;

    fn list_columns_sql(&self, database: &str, table: &TableName) -> String;

    fn list_indexes_sql(&self, table: &TableName) -> String;

    fn list_descriptions_sql(&self, table: &TableName) -> String;

    /// `None` when the kind cannot attach this description without more
    /// information than the description carries.
    fn apply_description_sql(&self, description: &Description) -> Option<String>;

    // =========================================================================
    // DDL
    // =========================================================================

    fn identity_clause(&self) -> &'static str;

    fn ensure_schema_sql(&self, _schema: &str) -> Option<String> {
        None
    }

    fn column_sql(&self, column: &ColumnDef) -> String {
        let mut sql = format!("{} {}", self.quote_ident(&column.name), column.data_type);
        if column.is_identity {
            sql.push(' ');
            sql.push_str(self.identity_clause());
        } else if let Some(default) = &column.default_value {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        sql
    }

    /// Extra table elements appended after the column list.
    fn table_constraints_sql(&self, _def: &TableDef) -> Vec<String> {
        Vec::new()
    }

    fn create_table_sql(&self, def: &TableDef) -> Vec<String> {
        let mut statements = Vec::new();
        if let Some(schema) = &def.table.schema {
            if let Some(sql) = self.ensure_schema_sql(schema) {
                statements.push(sql);
            }
        }
        let mut elements: Vec<String> = def.columns.iter().map(|c| self.column_sql(c)).collect();
        elements.extend(self.table_constraints_sql(def));
        statements.push(format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.qualify(&def.table),
            elements.join(",\n    ")
        ));
        statements
    }

    fn create_index_sql(&self, index: &IndexDef) -> String {
        let columns = index
            .columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        if index.primary {
            format!(
                "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
                self.qualify(&index.table),
                self.quote_ident(&index.name),
                columns
            )
        } else {
            format!(
                "CREATE {}INDEX {} ON {} ({})",
                if index.unique { "UNIQUE " } else { "" },
                self.quote_ident(&index.name),
                self.qualify(&index.table),
                columns
            )
        }
    }

    // =========================================================================
    // DML
    // =========================================================================

    fn column_list(&self, columns: &[String]) -> String {
        if columns.is_empty() {
            return "*".to_string();
        }
        columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn where_clause(&self, filter: Option<&RowFilter>) -> String {
        match filter {
            Some(f) if f.value.is_null() => {
                format!(" WHERE {} IS NULL", self.quote_ident(&f.column))
            }
            Some(f) => format!(
                " WHERE {} = {}",
                self.quote_ident(&f.column),
                self.literal(&f.value)
            ),
            None => String::new(),
        }
    }

    fn select_sql(&self, table: &TableName, columns: &[String]) -> String {
        format!(
            "SELECT {} FROM {}",
            self.column_list(columns),
            self.qualify(table)
        )
    }

    fn count_sql(&self, table: &TableName, filter: Option<&RowFilter>) -> String {
        format!(
            "SELECT COUNT(*) FROM {}{}",
            self.qualify(table),
            self.where_clause(filter)
        )
    }

    fn delete_sql(&self, table: &TableName, filter: Option<&RowFilter>) -> String {
        format!(
            "DELETE FROM {}{}",
            self.qualify(table),
            self.where_clause(filter)
        )
    }

    fn truncate_sql(&self, table: &TableName) -> String {
        format!("TRUNCATE TABLE {}", self.qualify(table))
    }

    fn insert_sql(&self, table: &TableName, columns: &[String], rows: &[Vec<SqlValue>]) -> String {
        let values = rows
            .iter()
            .map(|row| {
                let cells = row
                    .iter()
                    .map(|v| self.literal(v))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({})", cells)
            })
            .collect::<Vec<_>>()
            .join(",\n");
        format!(
            "INSERT INTO {} ({}) VALUES\n{}",
            self.qualify(table),
            self.column_list(columns),
            values
        )
    }

    /// Statement switching explicit identity values on or off, if the kind needs one.
    fn identity_insert_sql(&self, _table: &TableName, _on: bool) -> Option<String> {
        None
    }

    /// Per-table statements disabling or enabling constraints and triggers.
    fn constraints_sql(&self, _table: &TableName, _enabled: bool) -> Vec<String> {
        Vec::new()
    }

    /// Session-wide switch for constraint checking, for kinds without a per-table one.
    fn session_constraints_sql(&self, _enabled: bool) -> Option<String> {
        None
    }

    // =========================================================================
    // Server-to-server links
    // =========================================================================

    fn list_remote_links_sql(&self) -> Option<String> {
        None
    }

    fn test_remote_link_sql(&self, _link_name: &str) -> Option<String> {
        None
    }

    fn list_remote_databases_sql(&self, _link_name: &str) -> Option<String> {
        None
    }

    fn list_remote_tables_sql(&self, _link_name: &str, _database: &str) -> Option<String> {
        None
    }

    fn remote_insert_sql(&self, _insert: &RemoteInsert) -> Option<String> {
        None
    }
}
