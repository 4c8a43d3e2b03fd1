use super::sections::SectionName;
use crate::adapter::dialect::{dialect_for, escape_string};
use crate::adapter::{DatabaseAdapter, DbKind, SqlValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// How one option section fared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionOutcome {
    pub name: SectionName,
    /// Statements that ran successfully before the section stopped.
    pub executed: usize,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_statement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SectionOutcome {
    pub fn applied(name: SectionName, total: usize) -> Self {
        Self {
            name,
            executed: total,
            total,
            failed_statement: None,
            error: None,
        }
    }

    pub fn failed(
        name: SectionName,
        executed: usize,
        total: usize,
        statement: &str,
        error: impl Into<String>,
    ) -> Self {
        Self {
            name,
            executed,
            total,
            failed_statement: Some(statement.to_string()),
            error: Some(error.into()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Snapshot of a freshly configured database, attached to the provisioning
/// result for audit. Never a reason to fail provisioning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub database_name: String,
    pub database_exists: bool,
    /// Effective options and file sizes as reported by the catalog.
    pub properties: BTreeMap<String, String>,
    pub sections: Vec<SectionOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_error: Option<String>,
}

impl VerificationReport {
    pub fn failed_sections(&self) -> Vec<SectionName> {
        self.sections
            .iter()
            .filter(|s| !s.succeeded())
            .map(|s| s.name)
            .collect()
    }

    pub fn section(&self, name: SectionName) -> Option<&SectionOutcome> {
        self.sections.iter().find(|s| s.name == name)
    }
}

/// Catalog query reporting existence, file layout and effective options.
pub fn verification_sql(kind: DbKind, database: &str) -> String {
    let name = escape_string(database);
    match kind {
        DbKind::Mssql => format!(
            "SELECT d.name AS db_name, \
             d.create_date AS created_at, \
             d.recovery_model_desc AS recovery_model, \
             d.page_verify_option_desc AS page_verify, \
             d.is_query_store_on AS query_store, \
             d.is_broker_enabled AS broker_enabled, \
             d.is_read_committed_snapshot_on AS rcsi, \
             d.snapshot_isolation_state_desc AS snapshot_isolation, \
             d.is_fulltext_enabled AS fulltext_enabled, \
             d.collation_name AS collation, \
             mf_data.size * 8 AS data_size_kb, \
             mf_log.size * 8 AS log_size_kb \
             FROM sys.databases d \
             LEFT JOIN sys.master_files mf_data ON mf_data.database_id = d.database_id AND mf_data.type = 0 \
             LEFT JOIN sys.master_files mf_log ON mf_log.database_id = d.database_id AND mf_log.type = 1 \
             WHERE d.name = N'{}'",
            name
        ),
        DbKind::Postgres => format!(
            "SELECT d.datname AS db_name, \
             pg_encoding_to_char(d.encoding) AS encoding, \
             d.datcollate AS collation, \
             d.datallowconn AS allow_connections, \
             d.datconnlimit AS connection_limit, \
             pg_database_size(d.datname) / 1024 AS data_size_kb \
             FROM pg_database d WHERE d.datname = '{}'",
            name
        ),
        DbKind::Mysql => format!(
            "SELECT s.SCHEMA_NAME AS db_name, \
             s.DEFAULT_CHARACTER_SET_NAME AS charset, \
             s.DEFAULT_COLLATION_NAME AS collation, \
             (SELECT COALESCE(SUM(t.DATA_LENGTH + t.INDEX_LENGTH), 0) / 1024 \
              FROM information_schema.TABLES t WHERE t.TABLE_SCHEMA = s.SCHEMA_NAME) AS data_size_kb \
             FROM information_schema.SCHEMATA s WHERE s.SCHEMA_NAME = {}",
            dialect_for(kind).string_literal(database)
        ),
        DbKind::Oracle => format!(
            "SELECT p.name AS db_name, p.open_mode AS open_mode, \
             p.restricted AS restricted, p.total_size / 1024 AS data_size_kb \
             FROM v$pdbs p WHERE UPPER(p.name) = UPPER('{}')",
            name
        ),
    }
}

/// Reads back the state of `database` and folds in the section outcomes.
///
/// Query failures end up in [`VerificationReport::query_error`].
pub async fn verify(
    adapter: &dyn DatabaseAdapter,
    database: &str,
    sections: Vec<SectionOutcome>,
) -> VerificationReport {
    let mut report = VerificationReport {
        database_name: database.to_string(),
        sections,
        ..Default::default()
    };

    match adapter.database_exists(database).await {
        Ok(exists) => report.database_exists = exists,
        Err(e) => {
            warn!("Verification could not check {}: {}", database, e);
            report.query_error = Some(e.raw_message());
            return report;
        }
    }

    match adapter
        .query(&verification_sql(adapter.kind(), database))
        .await
    {
        Ok(rows) => {
            if let Some(first) = rows.rows.first() {
                for (column, value) in rows.columns.iter().zip(first) {
                    if !matches!(value, SqlValue::Null) {
                        report
                            .properties
                            .insert(column.to_ascii_lowercase(), value.display_string());
                    }
                }
            }
        }
        Err(e) => {
            warn!("Verification query failed for {}: {}", database, e);
            report.query_error = Some(e.raw_message());
        }
    }
    report
}
