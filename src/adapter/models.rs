//! Value and catalog types shared by every adapter kind.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of server kinds an adapter can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbKind {
    Mssql,
    Postgres,
    Mysql,
    Oracle,
}

impl DbKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbKind::Mssql => "mssql",
            DbKind::Postgres => "postgres",
            DbKind::Mysql => "mysql",
            DbKind::Oracle => "oracle",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mssql" | "sqlserver" => Some(DbKind::Mssql),
            "postgres" | "postgresql" => Some(DbKind::Postgres),
            "mysql" | "mariadb" => Some(DbKind::Mysql),
            "oracle" => Some(DbKind::Oracle),
            _ => None,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            DbKind::Mssql => 1433,
            DbKind::Postgres => 5432,
            DbKind::Mysql => 3306,
            DbKind::Oracle => 1521,
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single cell value moved between servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Best effort conversion used for counts and flags read from catalogs.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Bool(b) => Some(*b as i64),
            SqlValue::Float(f) => Some(*f as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::Int(v) => Some(*v != 0),
            SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "t" | "true" | "y" | "yes" => Some(true),
                "0" | "f" | "false" | "n" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Renders the value for reports. Not a SQL literal; see `Dialect::literal`.
    pub fn display_string(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => b.to_string(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Text(s) => s.clone(),
            SqlValue::Bytes(b) => format!("<{} bytes>", b.len()),
            SqlValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

/// Result of a query: column names plus rows of values in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Case-insensitive column lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn first_value(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Value of `column` in row `row`, `None` when either is out of range.
    pub fn value(&self, row: usize, column: &str) -> Option<&SqlValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn text(&self, row: usize, column: &str) -> Option<String> {
        match self.value(row, column)? {
            SqlValue::Null => None,
            other => Some(other.display_string()),
        }
    }
}

/// Optionally schema-qualified table name, e.g. `dbo.TB_COM_CODE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn with_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Parses `schema.table` or a bare `table`. Brackets and quotes are stripped.
    pub fn parse(s: &str) -> Self {
        let strip = |part: &str| {
            part.trim()
                .trim_matches(|c| c == '[' || c == ']' || c == '"' || c == '`')
                .to_string()
        };
        match s.rsplit_once('.') {
            Some((schema, name)) if !schema.trim().is_empty() => {
                Self::with_schema(strip(schema), strip(name))
            }
            _ => Self::new(strip(s)),
        }
    }

    /// Compares names ignoring case and, when either side has no schema, the schema.
    pub fn matches(&self, other: &TableName) -> bool {
        if !self.name.eq_ignore_ascii_case(&other.name) {
            return false;
        }
        match (&self.schema, &other.schema) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => true,
        }
    }

    /// File-system friendly form used for intermediate file names.
    pub fn file_stem(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}_{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Catalog entry for a table, as reported by `list_tables`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub table: TableName,
    pub row_count: Option<u64>,
    pub has_identity: bool,
    pub description: Option<String>,
}

/// Column definition with the type rendered in the server's own syntax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub is_identity: bool,
    pub default_value: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            is_identity: false,
            default_value: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self.nullable = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub table: TableName,
    pub columns: Vec<ColumnDef>,
}

/// Index or primary key on a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub table: TableName,
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub primary: bool,
}

/// Free-text description of a table (`column == None`) or of one of its columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub table: TableName,
    pub column: Option<String>,
    pub text: String,
}

/// Equality filter used by counts and deletes.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFilter {
    pub column: String,
    pub value: SqlValue,
}

impl RowFilter {
    pub fn equals(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// Login to create for a tenant database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSpec {
    pub login_name: String,
    pub password: String,
    pub database: String,
    pub role: String,
}

/// `INSERT ... SELECT` through a server-to-server link.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteInsert {
    pub link_name: String,
    pub remote_database: String,
    pub table: TableName,
    pub columns: Vec<String>,
    pub keep_identity: bool,
}
