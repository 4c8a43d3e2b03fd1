mod file_config;

pub use file_config::{
    CorpDirectoryConfig, CorpEntryConfig, FileConfig, ProvisioningConfig, ServerConfig,
    SyncConfig,
};

use crate::adapter::DbKind;
use crate::external::{CorpInfo, ServerConnection};
use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub work_dir: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub data_path: Option<String>,
    pub log_path: Option<String>,
    pub db_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub servers: Vec<ServerConnection>,

    // Feature configs (with defaults)
    pub provisioning: ProvisioningSettings,
    pub sync: SyncSettings,
    pub corp_directory: CorpDirectorySettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let servers = resolve_servers(&file.servers)?;

        let defaults = ProvisioningSettings::default();
        let pv = file.provisioning.unwrap_or_default();
        let provisioning = ProvisioningSettings {
            db_prefix: pv
                .db_prefix
                .or_else(|| cli.db_prefix.clone())
                .unwrap_or(defaults.db_prefix),
            data_path: pv.data_path.or_else(|| cli.data_path.clone()),
            log_path: pv.log_path.or_else(|| cli.log_path.clone()),
            initial_db_size_mb: pv.initial_db_size_mb.unwrap_or(defaults.initial_db_size_mb),
            initial_log_size_mb: pv
                .initial_log_size_mb
                .unwrap_or(defaults.initial_log_size_mb),
            file_growth_mb: pv.file_growth_mb.unwrap_or(defaults.file_growth_mb),
            log_growth_mb: pv.log_growth_mb.unwrap_or(defaults.log_growth_mb),
            collation: pv.collation.unwrap_or(defaults.collation),
            target_recovery_time_secs: pv
                .target_recovery_time_secs
                .unwrap_or(defaults.target_recovery_time_secs),
            query_store_stale_days: pv
                .query_store_stale_days
                .unwrap_or(defaults.query_store_stale_days),
            query_store_max_storage_mb: pv
                .query_store_max_storage_mb
                .unwrap_or(defaults.query_store_max_storage_mb),
            create_timeout_secs: pv
                .create_timeout_secs
                .unwrap_or(defaults.create_timeout_secs),
            password_length: pv.password_length.unwrap_or(defaults.password_length),
            baseline_tables: pv.baseline_tables.unwrap_or(defaults.baseline_tables),
            corp_code_columns: pv.corp_code_columns.unwrap_or(defaults.corp_code_columns),
            template_corp_code: pv.template_corp_code.or(defaults.template_corp_code),
            admin_user_table: pv.admin_user_table.unwrap_or(defaults.admin_user_table),
            sql_excerpt_len: pv.sql_excerpt_len.unwrap_or(defaults.sql_excerpt_len),
        };
        if provisioning.password_length < 8 {
            bail!(
                "provisioning.password_length must be at least 8, got {}",
                provisioning.password_length
            );
        }

        let sync_defaults = SyncSettings::default();
        let sf = file.sync.unwrap_or_default();
        let work_dir = file
            .work_dir
            .map(PathBuf::from)
            .or_else(|| cli.work_dir.clone())
            .unwrap_or(sync_defaults.work_dir);
        let sync = SyncSettings {
            batch_size: sf
                .batch_size
                .or(cli.batch_size)
                .unwrap_or(sync_defaults.batch_size),
            work_dir,
            bcp_path: sf.bcp_path.map(PathBuf::from),
            bcp_batch_size: sf.bcp_batch_size.unwrap_or(sync_defaults.bcp_batch_size),
            use_bcp: sf.use_bcp.unwrap_or(sync_defaults.use_bcp),
        };
        if sync.batch_size == 0 {
            bail!("sync.batch_size must be greater than zero");
        }

        let dir_defaults = CorpDirectorySettings::default();
        let cd = file.corp_directory.unwrap_or_default();
        if let Some(main) = &cd.main_server_id {
            if !servers.iter().any(|s| &s.id == main) {
                bail!("corp_directory.main_server_id refers to unknown server: {}", main);
            }
        }
        let corp_directory = CorpDirectorySettings {
            main_server_id: cd.main_server_id,
            main_database: cd.main_database,
            table: cd.table.unwrap_or(dir_defaults.table),
            code_column: cd.code_column.unwrap_or(dir_defaults.code_column),
            name_column: cd.name_column.unwrap_or(dir_defaults.name_column),
            biz_no_column: cd.biz_no_column.unwrap_or(dir_defaults.biz_no_column),
            database_column: cd.database_column.unwrap_or(dir_defaults.database_column),
            entries: cd
                .entries
                .into_iter()
                .map(|e| CorpInfo {
                    corp_code: e.corp_code,
                    corp_name: e.corp_name,
                    biz_no: e.biz_no,
                    database_name: e.database_name,
                })
                .collect(),
        };

        Ok(Self {
            servers,
            provisioning,
            sync,
            corp_directory,
        })
    }
}

fn resolve_servers(configs: &[ServerConfig]) -> Result<Vec<ServerConnection>> {
    let mut seen = HashSet::new();
    let mut servers = Vec::with_capacity(configs.len());
    for cfg in configs {
        if cfg.id.is_empty() {
            bail!("Every [[servers]] entry needs an id");
        }
        if !seen.insert(cfg.id.clone()) {
            bail!("Duplicate server id: {}", cfg.id);
        }
        let kind = DbKind::from_str(&cfg.kind)
            .with_context(|| format!("Unknown kind '{}' for server {}", cfg.kind, cfg.id))?;
        let password = match (&cfg.password, &cfg.password_env) {
            (Some(password), _) => password.clone(),
            (None, Some(var)) => std::env::var(var).with_context(|| {
                format!("Password variable {} for server {} is not set", var, cfg.id)
            })?,
            (None, None) => String::new(),
        };
        servers.push(ServerConnection {
            id: cfg.id.clone(),
            name: cfg.name.clone().unwrap_or_else(|| cfg.id.clone()),
            kind,
            host: cfg.host.clone(),
            port: cfg.port.unwrap_or_else(|| kind.default_port()),
            username: cfg.username.clone(),
            password,
            default_database: cfg.default_database.clone(),
            data_path: cfg.data_path.clone(),
            log_path: cfg.log_path.clone(),
        });
    }
    Ok(servers)
}

#[derive(Debug, Clone)]
pub struct ProvisioningSettings {
    /// Prepended to the corp code when no database name is given.
    pub db_prefix: String,
    pub data_path: Option<String>,
    pub log_path: Option<String>,
    pub initial_db_size_mb: u32,
    pub initial_log_size_mb: u32,
    pub file_growth_mb: u32,
    pub log_growth_mb: u32,
    pub collation: String,
    pub target_recovery_time_secs: u32,
    pub query_store_stale_days: u32,
    pub query_store_max_storage_mb: u32,
    pub create_timeout_secs: u64,
    pub password_length: usize,
    pub baseline_tables: Vec<String>,
    pub corp_code_columns: Vec<String>,
    pub template_corp_code: Option<String>,
    pub admin_user_table: String,
    pub sql_excerpt_len: usize,
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            db_prefix: String::new(),
            data_path: None,
            log_path: None,
            initial_db_size_mb: 100,
            initial_log_size_mb: 64,
            file_growth_mb: 100,
            log_growth_mb: 1024,
            collation: "Korean_Wansung_CI_AS".to_string(),
            target_recovery_time_secs: 60,
            query_store_stale_days: 30,
            query_store_max_storage_mb: 1000,
            create_timeout_secs: 30,
            password_length: 16,
            baseline_tables: [
                "TB_COM_CODE",
                "TB_COM_CODE_GRP",
                "TB_MENU",
                "TB_ROLE",
                "TB_ROLE_MENU",
                "TB_CONFIG",
                "TB_ACCT_CD",
                "TB_DEPT",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            corp_code_columns: ["CORP_CD", "COMPANY_CD", "CO_CD", "CMPNY_CD", "CORP_CODE"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            template_corp_code: None,
            admin_user_table: "TB_USER".to_string(),
            sql_excerpt_len: 500,
        }
    }
}

impl ProvisioningSettings {
    pub fn is_corp_code_column(&self, column: &str) -> bool {
        self.corp_code_columns
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }

    pub fn is_baseline_table(&self, table: &str) -> bool {
        self.baseline_tables
            .iter()
            .any(|t| t.eq_ignore_ascii_case(table))
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub batch_size: usize,
    /// Directory for export/import intermediate files.
    pub work_dir: PathBuf,
    pub bcp_path: Option<PathBuf>,
    pub bcp_batch_size: u32,
    /// Allows the native bulk copy tool when both ends are MSSQL.
    pub use_bcp: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            work_dir: std::env::temp_dir().join("corpdb"),
            bcp_path: None,
            bcp_batch_size: 50000,
            use_bcp: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorpDirectorySettings {
    pub main_server_id: Option<String>,
    pub main_database: Option<String>,
    pub table: String,
    pub code_column: String,
    pub name_column: String,
    pub biz_no_column: String,
    pub database_column: String,
    pub entries: Vec<CorpInfo>,
}

impl Default for CorpDirectorySettings {
    fn default() -> Self {
        Self {
            main_server_id: None,
            main_database: None,
            table: "dbo.COMS_CMPNY".to_string(),
            code_column: "CORP_CD".to_string(),
            name_column: "CORP_NM".to_string(),
            biz_no_column: "SAUPNO".to_string(),
            database_column: "ACC_DB_NAME".to_string(),
            entries: Vec::new(),
        }
    }
}
