use crate::adapter::dialect::{dialect_for, escape_string};
use crate::adapter::DbKind;
use crate::config::ProvisioningSettings;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Option sections in execution order. `Finalize` is always last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionName {
    Fulltext,
    Ansi,
    Performance,
    Security,
    Recovery,
    Storage,
    QueryStore,
    Finalize,
}

impl SectionName {
    pub const ALL: [SectionName; 8] = [
        SectionName::Fulltext,
        SectionName::Ansi,
        SectionName::Performance,
        SectionName::Security,
        SectionName::Recovery,
        SectionName::Storage,
        SectionName::QueryStore,
        SectionName::Finalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionName::Fulltext => "fulltext",
            SectionName::Ansi => "ansi",
            SectionName::Performance => "performance",
            SectionName::Security => "security",
            SectionName::Recovery => "recovery",
            SectionName::Storage => "storage",
            SectionName::QueryStore => "query_store",
            SectionName::Finalize => "finalize",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|n| n.as_str() == s)
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named group of option statements, executed as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSection {
    pub name: SectionName,
    pub statements: Vec<String>,
}

/// Option statements for a new database, in execution order.
///
/// Sections the engine has nothing to say about are left out; `finalize` is
/// always present and always last.
pub fn generate_sections(
    kind: DbKind,
    database: &str,
    settings: &ProvisioningSettings,
) -> Vec<ConfigurationSection> {
    let raw: Vec<(SectionName, Vec<String>)> = match kind {
        DbKind::Mssql => mssql_sections(database, settings),
        DbKind::Postgres => postgres_sections(database),
        DbKind::Mysql => mysql_sections(database),
        DbKind::Oracle => oracle_sections(database),
    };

    let mut sections: Vec<ConfigurationSection> = raw
        .into_iter()
        .filter(|(name, statements)| *name != SectionName::Finalize && !statements.is_empty())
        .map(|(name, statements)| ConfigurationSection { name, statements })
        .collect();
    sections.push(ConfigurationSection {
        name: SectionName::Finalize,
        statements: finalize_statements(kind, database),
    });
    sections
}

fn alter_all(prefix: &str, options: &[&str]) -> Vec<String> {
    options
        .iter()
        .map(|option| format!("{} SET {}", prefix, option))
        .collect()
}

fn mssql_sections(
    database: &str,
    settings: &ProvisioningSettings,
) -> Vec<(SectionName, Vec<String>)> {
    let db = dialect_for(DbKind::Mssql).quote_ident(database);
    let alter = format!("ALTER DATABASE {}", db);

    let fulltext = format!(
        "IF CONVERT(int, FULLTEXTSERVICEPROPERTY('IsFullTextInstalled')) = 1\n\
         BEGIN\n\
         \x20   DECLARE @ftsql nvarchar(max) = N'USE {}; EXEC dbo.sp_fulltext_database @action = ''disable'';';\n\
         \x20   EXEC sys.sp_executesql @ftsql;\n\
         END",
        escape_string(&db)
    );

    let query_store = format!(
        "{} SET QUERY_STORE = ON (\n\
         \x20   OPERATION_MODE = READ_WRITE,\n\
         \x20   CLEANUP_POLICY = (STALE_QUERY_THRESHOLD_DAYS = {}),\n\
         \x20   DATA_FLUSH_INTERVAL_SECONDS = 900,\n\
         \x20   INTERVAL_LENGTH_MINUTES = 60,\n\
         \x20   MAX_STORAGE_SIZE_MB = {},\n\
         \x20   QUERY_CAPTURE_MODE = AUTO,\n\
         \x20   SIZE_BASED_CLEANUP_MODE = AUTO,\n\
         \x20   MAX_PLANS_PER_QUERY = 200,\n\
         \x20   WAIT_STATS_CAPTURE_MODE = ON\n\
         )",
        alter, settings.query_store_stale_days, settings.query_store_max_storage_mb
    );

    let target_recovery = format!(
        "TARGET_RECOVERY_TIME = {} SECONDS",
        settings.target_recovery_time_secs
    );

    vec![
        (SectionName::Fulltext, vec![fulltext]),
        (
            SectionName::Ansi,
            alter_all(
                &alter,
                &[
                    "ANSI_NULL_DEFAULT OFF",
                    "ANSI_NULLS OFF",
                    "ANSI_PADDING OFF",
                    "ANSI_WARNINGS OFF",
                    "ARITHABORT OFF",
                    "CONCAT_NULL_YIELDS_NULL OFF",
                    "NUMERIC_ROUNDABORT OFF",
                    "QUOTED_IDENTIFIER OFF",
                    "RECURSIVE_TRIGGERS OFF",
                ],
            ),
        ),
        (
            SectionName::Performance,
            alter_all(
                &alter,
                &[
                    "AUTO_CLOSE OFF",
                    "AUTO_SHRINK OFF",
                    "AUTO_UPDATE_STATISTICS ON",
                    "AUTO_UPDATE_STATISTICS_ASYNC OFF",
                    "CURSOR_CLOSE_ON_COMMIT OFF",
                    "CURSOR_DEFAULT GLOBAL",
                    "PARAMETERIZATION SIMPLE",
                    "DATE_CORRELATION_OPTIMIZATION OFF",
                ],
            ),
        ),
        (
            SectionName::Security,
            alter_all(
                &alter,
                &[
                    "TRUSTWORTHY OFF",
                    "DB_CHAINING OFF",
                    "ALLOW_SNAPSHOT_ISOLATION OFF",
                    "READ_COMMITTED_SNAPSHOT OFF",
                ],
            ),
        ),
        (
            SectionName::Recovery,
            alter_all(
                &alter,
                &[
                    "DISABLE_BROKER",
                    "HONOR_BROKER_PRIORITY OFF",
                    "RECOVERY SIMPLE",
                    "MULTI_USER",
                ],
            ),
        ),
        (
            SectionName::Storage,
            alter_all(
                &alter,
                &[
                    "PAGE_VERIFY CHECKSUM",
                    "FILESTREAM( NON_TRANSACTED_ACCESS = OFF )",
                    target_recovery.as_str(),
                    "DELAYED_DURABILITY = DISABLED",
                    "ACCELERATED_DATABASE_RECOVERY = OFF",
                ],
            ),
        ),
        (SectionName::QueryStore, vec![query_store]),
    ]
}

fn postgres_sections(database: &str) -> Vec<(SectionName, Vec<String>)> {
    let alter = format!(
        "ALTER DATABASE {}",
        dialect_for(DbKind::Postgres).quote_ident(database)
    );
    vec![
        (
            SectionName::Ansi,
            alter_all(
                &alter,
                &[
                    "client_encoding = 'UTF8'",
                    "standard_conforming_strings = on",
                    "DateStyle = 'ISO, YMD'",
                ],
            ),
        ),
        (
            SectionName::Performance,
            alter_all(
                &alter,
                &["default_statistics_target = 100", "statement_timeout = 0"],
            ),
        ),
        (
            SectionName::Security,
            vec![format!(
                "REVOKE ALL ON DATABASE {} FROM PUBLIC",
                dialect_for(DbKind::Postgres).quote_ident(database)
            )],
        ),
        (
            SectionName::Recovery,
            alter_all(&alter, &["idle_in_transaction_session_timeout = 0"]),
        ),
    ]
}

fn mysql_sections(database: &str) -> Vec<(SectionName, Vec<String>)> {
    let db = dialect_for(DbKind::Mysql).quote_ident(database);
    vec![(
        SectionName::Ansi,
        vec![format!(
            "ALTER DATABASE {} CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci",
            db
        )],
    )]
}

fn oracle_sections(database: &str) -> Vec<(SectionName, Vec<String>)> {
    let pdb = dialect_for(DbKind::Oracle).quote_ident(database);
    vec![(
        SectionName::Recovery,
        vec![format!("ALTER PLUGGABLE DATABASE {} SAVE STATE", pdb)],
    )]
}

fn finalize_statements(kind: DbKind, database: &str) -> Vec<String> {
    let db = dialect_for(kind).quote_ident(database);
    match kind {
        DbKind::Mssql => vec![format!("ALTER DATABASE {} SET READ_WRITE", db)],
        DbKind::Postgres => vec![
            format!("ALTER DATABASE {} SET default_transaction_read_only = off", db),
            format!("ALTER DATABASE {} ALLOW_CONNECTIONS true", db),
        ],
        DbKind::Mysql => vec![format!("ALTER DATABASE {} READ ONLY = 0", db)],
        DbKind::Oracle => vec![format!("ALTER PLUGGABLE DATABASE {} OPEN READ WRITE", db)],
    }
}
