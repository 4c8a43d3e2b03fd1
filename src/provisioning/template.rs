//! Copying structure and reference data from a template database.

use crate::adapter::dialect::dialect_for;
use crate::adapter::{
    AdapterError, DatabaseAdapter, RowFilter, SqlValue, TableDef, TableInfo, TableName,
};
use crate::config::ProvisioningSettings;
use crate::corp_code::CorpCodeRewrite;
use tracing::{debug, info};

/// Creates every template table in the target, columns included. The DDL
/// of each table is pushed to `executed` before it runs.
pub async fn clone_tables(
    source: &dyn DatabaseAdapter,
    target: &dyn DatabaseAdapter,
    source_database: &str,
    tables: &[TableInfo],
    executed: &mut Vec<String>,
) -> Result<usize, AdapterError> {
    let dialect = dialect_for(target.kind());
    for info in tables {
        let columns = source.list_columns(source_database, &info.table).await?;
        debug!("Creating {} ({} columns)", info.table, columns.len());
        let def = TableDef {
            table: info.table.clone(),
            columns,
        };
        executed.push(dialect.create_table_sql(&def).join(";\n"));
        target.create_table(&def).await?;
    }
    Ok(tables.len())
}

/// Copies table and column descriptions. Returns how many were applied.
pub async fn clone_descriptions(
    source: &dyn DatabaseAdapter,
    target: &dyn DatabaseAdapter,
    tables: &[TableInfo],
    executed: &mut Vec<String>,
) -> Result<usize, AdapterError> {
    let dialect = dialect_for(target.kind());
    let mut applied = 0;
    for info in tables {
        for description in source.list_descriptions(&info.table).await? {
            if let Some(sql) = dialect.apply_description_sql(&description) {
                executed.push(sql);
            }
            target.apply_description(&description).await?;
            applied += 1;
        }
    }
    Ok(applied)
}

/// Copies primary keys, then the remaining indexes, table by table.
pub async fn clone_indexes(
    source: &dyn DatabaseAdapter,
    target: &dyn DatabaseAdapter,
    tables: &[TableInfo],
    executed: &mut Vec<String>,
) -> Result<usize, AdapterError> {
    let dialect = dialect_for(target.kind());
    let mut created = 0;
    for info in tables {
        let mut indexes = source.list_indexes(&info.table).await?;
        indexes.sort_by_key(|index| !index.primary);
        for index in &indexes {
            executed.push(dialect.create_index_sql(index));
            target.create_index(index).await?;
            created += 1;
        }
    }
    Ok(created)
}

/// Copies the configured baseline tables that exist in the template,
/// rewriting corp codes on the way. Returns `(table, rows)` per copied table.
/// `executed` gets the first row's INSERT of each table.
pub async fn copy_baseline(
    source: &dyn DatabaseAdapter,
    target: &dyn DatabaseAdapter,
    tables: &[TableInfo],
    settings: &ProvisioningSettings,
    rewrite: Option<&CorpCodeRewrite>,
    executed: &mut Vec<String>,
) -> Result<Vec<(String, u64)>, AdapterError> {
    let dialect = dialect_for(target.kind());
    let mut copied = Vec::new();
    for info in tables
        .iter()
        .filter(|t| settings.is_baseline_table(&t.table.name))
    {
        let mut rows = source.select_rows(&info.table, &[]).await?;
        if rows.is_empty() {
            copied.push((info.table.to_string(), 0));
            continue;
        }
        let replaced = rewrite.map(|r| r.apply(&mut rows)).unwrap_or(0);
        executed.push(dialect.insert_sql(&info.table, &rows.columns, &rows.rows[..1]));
        let inserted = target
            .insert_rows(&info.table, &rows.columns, &rows.rows, info.has_identity)
            .await?;
        info!(
            "Baseline {}: {} rows ({} with corp code replaced)",
            info.table, inserted, replaced
        );
        copied.push((info.table.to_string(), inserted));
    }
    Ok(copied)
}

/// What happened to the application admin account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminOutcome {
    Created,
    AlreadyExists,
    /// The user table is missing from the tenant schema.
    NoUserTable,
}

const ADMIN_ID_COLUMN: &str = "USER_ID";

/// Inserts the admin row into the tenant's user table. Only the columns the
/// table actually has are written.
pub async fn create_admin(
    target: &dyn DatabaseAdapter,
    database: &str,
    user_table: &str,
    user_id: &str,
    display_name: &str,
    password_hash: &str,
    role: &str,
) -> Result<AdminOutcome, AdapterError> {
    let wanted = TableName::parse(user_table);
    let tables = target.list_tables(database).await?;
    let Some(table) = tables
        .into_iter()
        .map(|t| t.table)
        .find(|t| t.matches(&wanted))
    else {
        return Ok(AdminOutcome::NoUserTable);
    };

    let columns = target.list_columns(database, &table).await?;
    let has = |name: &str| columns.iter().any(|c| c.name.eq_ignore_ascii_case(name));
    if !has(ADMIN_ID_COLUMN) {
        return Ok(AdminOutcome::NoUserTable);
    }

    let existing = target
        .count_rows(&table, Some(&RowFilter::equals(ADMIN_ID_COLUMN, user_id)))
        .await?;
    if existing > 0 {
        return Ok(AdminOutcome::AlreadyExists);
    }

    let candidates: [(&str, SqlValue); 6] = [
        (ADMIN_ID_COLUMN, SqlValue::from(user_id)),
        ("USER_NM", SqlValue::from(display_name)),
        ("USER_PWD", SqlValue::from(password_hash)),
        ("ROLE_CD", SqlValue::from(role)),
        ("USE_YN", SqlValue::from("Y")),
        (
            "REG_DT",
            SqlValue::DateTime(chrono::Local::now().naive_local()),
        ),
    ];
    let (names, values): (Vec<String>, Vec<SqlValue>) = candidates
        .into_iter()
        .filter(|(name, _)| has(*name))
        .map(|(name, value)| (name.to_string(), value))
        .unzip();

    target
        .insert_rows(&table, &names, &[values], false)
        .await?;
    Ok(AdminOutcome::Created)
}
