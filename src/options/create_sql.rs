use crate::adapter::dialect::{dialect_for, escape_string};
use crate::adapter::DbKind;
use crate::config::ProvisioningSettings;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Stands in for the generated admin password in scripts that need one
/// (Oracle PDB creation). Replaced right before execution so previews never
/// contain a secret.
pub const PASSWORD_PLACEHOLDER: &str = "{{ADMIN_PASSWORD}}";

/// Inputs of the CREATE DATABASE script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDatabaseParams {
    pub database_name: String,
    pub corp_code: String,
    pub corp_name: String,
    pub biz_no: Option<String>,
    pub source_database: Option<String>,
    /// Directory for data files. Server default when `None`.
    pub data_path: Option<String>,
    /// Directory for log files. Falls back to `data_path`.
    pub log_path: Option<String>,
}

/// Header values are free text from the request. Control characters would
/// end the `--` comment line, so they become spaces.
fn header_value(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn join_path(dir: &str, file: &str) -> String {
    let dir = dir.trim_end_matches(['/', '\\']);
    let sep = if dir.contains('/') { '/' } else { '\\' };
    format!("{}{}{}", dir, sep, file)
}

/// Renders the CREATE DATABASE script shown to the operator before
/// provisioning. The output is a pure function of its inputs.
pub fn generate_create_database_sql(
    kind: DbKind,
    params: &CreateDatabaseParams,
    settings: &ProvisioningSettings,
) -> String {
    let db = &params.database_name;
    let quoted = dialect_for(kind).quote_ident(db);
    let rule = "-- ============================================================";

    let mut sql = String::new();
    let _ = writeln!(sql, "{}", rule);
    let _ = writeln!(sql, "-- Tenant database creation script ({})", kind);
    let _ = writeln!(sql, "{}", rule);
    let _ = writeln!(sql, "-- Corp code    : {}", header_value(&params.corp_code));
    let _ = writeln!(sql, "-- Corp name    : {}", header_value(&params.corp_name));
    let _ = writeln!(
        sql,
        "-- Business no. : {}",
        header_value(params.biz_no.as_deref().unwrap_or("-"))
    );
    let _ = writeln!(
        sql,
        "-- Template     : {}",
        header_value(params.source_database.as_deref().unwrap_or("-"))
    );
    let _ = writeln!(sql, "{}", rule);
    let _ = writeln!(
        sql,
        "-- Database options are applied automatically after creation."
    );
    let _ = writeln!(sql, "{}", rule);
    sql.push('\n');

    match kind {
        DbKind::Mssql => {
            let _ = writeln!(sql, "CREATE DATABASE {}", quoted);
            if let Some(data_dir) = params.data_path.as_deref() {
                let log_dir = params.log_path.as_deref().unwrap_or(data_dir);
                let data_file = join_path(data_dir, &format!("{}.mdf", db));
                let log_file = join_path(log_dir, &format!("{}_log.ldf", db));
                let _ = writeln!(sql, "ON PRIMARY (");
                let _ = writeln!(sql, "    NAME       = N'{}_data',", escape_string(db));
                let _ = writeln!(sql, "    FILENAME   = N'{}',", escape_string(&data_file));
                let _ = writeln!(sql, "    SIZE       = {}MB,", settings.initial_db_size_mb);
                let _ = writeln!(sql, "    FILEGROWTH = {}MB", settings.file_growth_mb);
                let _ = writeln!(sql, ")");
                let _ = writeln!(sql, "LOG ON (");
                let _ = writeln!(sql, "    NAME       = N'{}_log',", escape_string(db));
                let _ = writeln!(sql, "    FILENAME   = N'{}',", escape_string(&log_file));
                let _ = writeln!(sql, "    SIZE       = {}MB,", settings.initial_log_size_mb);
                let _ = writeln!(sql, "    FILEGROWTH = {}MB", settings.log_growth_mb);
                let _ = writeln!(sql, ")");
            }
            let _ = writeln!(sql, "COLLATE {};", settings.collation);
            let _ = writeln!(sql, "GO");
        }
        DbKind::Postgres => {
            let _ = writeln!(
                sql,
                "CREATE DATABASE {} ENCODING 'UTF8' TEMPLATE template0;",
                quoted
            );
            let _ = writeln!(sql, "GO");
        }
        DbKind::Mysql => {
            let _ = writeln!(
                sql,
                "CREATE DATABASE {} CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci;",
                quoted
            );
            let _ = writeln!(sql, "GO");
        }
        DbKind::Oracle => {
            let _ = writeln!(sql, "CREATE PLUGGABLE DATABASE {}", quoted);
            let _ = writeln!(
                sql,
                "    ADMIN USER {} IDENTIFIED BY \"{}\"",
                dialect_for(kind).quote_ident(&format!("{}_ADMIN", db)),
                PASSWORD_PLACEHOLDER
            );
            if let Some(data_dir) = params.data_path.as_deref() {
                let _ = writeln!(
                    sql,
                    "    CREATE_FILE_DEST = '{}'",
                    escape_string(data_dir.trim_end_matches(['/', '\\']))
                );
            }
            let _ = writeln!(sql, "    STORAGE UNLIMITED;");
            let _ = writeln!(sql, "GO");
        }
    }

    sql.push('\n');
    let _ = writeln!(sql, "{}", rule);
    let _ = writeln!(sql, "-- Database   : {}", db);
    if kind == DbKind::Mssql {
        let _ = writeln!(
            sql,
            "-- Sizes      : data {}MB (+{}MB) / log {}MB (+{}MB)",
            settings.initial_db_size_mb,
            settings.file_growth_mb,
            settings.initial_log_size_mb,
            settings.log_growth_mb
        );
        let _ = writeln!(sql, "-- Collation  : {}", settings.collation);
    }
    let _ = writeln!(sql, "{}", rule);
    sql
}
