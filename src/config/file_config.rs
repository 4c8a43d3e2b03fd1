use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub work_dir: Option<String>,

    pub servers: Vec<ServerConfig>,

    // Feature configs
    pub provisioning: Option<ProvisioningConfig>,
    pub sync: Option<SyncConfig>,
    pub corp_directory: Option<CorpDirectoryConfig>,
}

/// One `[[servers]]` entry.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub id: String,
    pub name: Option<String>,
    /// "mssql", "postgres", "mysql" or "oracle"
    pub kind: String,
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: Option<String>,
    /// Name of an environment variable holding the password.
    pub password_env: Option<String>,
    pub default_database: Option<String>,
    pub data_path: Option<String>,
    pub log_path: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub db_prefix: Option<String>,
    pub data_path: Option<String>,
    pub log_path: Option<String>,
    pub initial_db_size_mb: Option<u32>,
    pub initial_log_size_mb: Option<u32>,
    pub file_growth_mb: Option<u32>,
    pub log_growth_mb: Option<u32>,
    pub collation: Option<String>,
    pub target_recovery_time_secs: Option<u32>,
    pub query_store_stale_days: Option<u32>,
    pub query_store_max_storage_mb: Option<u32>,
    pub create_timeout_secs: Option<u64>,
    pub password_length: Option<usize>,
    pub baseline_tables: Option<Vec<String>>,
    pub corp_code_columns: Option<Vec<String>>,
    pub template_corp_code: Option<String>,
    pub admin_user_table: Option<String>,
    pub sql_excerpt_len: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub batch_size: Option<usize>,
    pub bcp_path: Option<String>,
    pub bcp_batch_size: Option<u32>,
    pub use_bcp: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CorpDirectoryConfig {
    pub main_server_id: Option<String>,
    pub main_database: Option<String>,
    pub table: Option<String>,
    pub code_column: Option<String>,
    pub name_column: Option<String>,
    pub biz_no_column: Option<String>,
    pub database_column: Option<String>,
    pub entries: Vec<CorpEntryConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CorpEntryConfig {
    pub corp_code: String,
    pub corp_name: String,
    pub biz_no: Option<String>,
    pub database_name: String,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
