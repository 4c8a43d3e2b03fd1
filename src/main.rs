use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use corpdb_manager::adapter::{DriverFactory, TableName};
use corpdb_manager::config::{AppConfig, CliConfig, FileConfig};
use corpdb_manager::external::ServerRegistry;
use corpdb_manager::provisioning::{AdminAccount, ProvisioningRequest};
use corpdb_manager::sync::{
    JobStatus, SyncOptions, SyncRequest, SyncStrategy, TableSpec, TableStatus,
};
use corpdb_manager::CorpDbService;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

fn parse_strategy(s: &str) -> Result<SyncStrategy, String> {
    SyncStrategy::from_str(s).ok_or_else(|| {
        format!(
            "unknown strategy '{}', expected one of: row-copy, remote-direct, export-import",
            s
        )
    })
}

#[derive(Parser, Debug)]
#[clap(name = "corpdb", version = VERSION)]
struct CliArgs {
    /// Path to the TOML config file.
    #[clap(short, long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory for export/import intermediate files.
    #[clap(long, value_parser = parse_path)]
    pub work_dir: Option<PathBuf>,

    /// Rows per insert batch for row copies.
    #[clap(long)]
    pub batch_size: Option<usize>,

    /// Directory for data files of new databases.
    #[clap(long)]
    pub data_path: Option<String>,

    /// Directory for log files of new databases.
    #[clap(long)]
    pub log_path: Option<String>,

    /// Prefix of generated database names.
    #[clap(long)]
    pub db_prefix: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
struct ProvisionArgs {
    /// Server holding the template database.
    #[clap(long)]
    pub source_server: String,

    /// Template database.
    #[clap(long)]
    pub template: String,

    /// Server on which the new database is created.
    #[clap(long)]
    pub target_server: String,

    #[clap(long)]
    pub corp_code: String,

    #[clap(long)]
    pub corp_name: String,

    /// Database name. Defaults to the configured prefix followed by the corp code.
    #[clap(long)]
    pub database: Option<String>,

    #[clap(long)]
    pub biz_no: Option<String>,

    /// Corp code used in the template's baseline rows.
    #[clap(long)]
    pub template_corp_code: Option<String>,

    /// Application admin user id.
    #[clap(long, default_value = "admin")]
    pub admin_id: String,
}

impl ProvisionArgs {
    fn into_request(self) -> ProvisioningRequest {
        let mut request = ProvisioningRequest::new(
            self.source_server,
            self.template,
            self.target_server,
            self.corp_code,
            self.corp_name,
        )
        .with_admin(AdminAccount {
            user_id: self.admin_id,
            ..Default::default()
        });
        if let Some(database) = self.database {
            request = request.with_database_name(database);
        }
        if let Some(biz_no) = self.biz_no {
            request = request.with_biz_no(biz_no);
        }
        if let Some(code) = self.template_corp_code {
            request = request.with_template_corp_code(code);
        }
        request
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the CREATE script a provisioning request would run.
    Preview {
        #[clap(flatten)]
        args: ProvisionArgs,
    },

    /// Create and populate a tenant database.
    Provision {
        #[clap(flatten)]
        args: ProvisionArgs,

        /// Run this script, usually an edited preview, instead of the generated one.
        #[clap(long, value_parser = parse_path)]
        sql_file: Option<PathBuf>,

        /// Print the result as JSON.
        #[clap(long)]
        json: bool,
    },

    /// Check whether a database name is taken on a server.
    CheckDuplicate { server: String, database: String },

    /// Check a SQL file against the keyword denylist.
    ValidateSql {
        #[clap(value_parser = parse_path)]
        file: PathBuf,
    },

    /// List the tables of a database with row counts.
    Tables { server: String, database: String },

    /// List the server-to-server links of a server.
    Links {
        server: String,

        /// Test this link instead of listing.
        #[clap(long)]
        test: Option<String>,
    },

    /// Copy table data between two databases.
    Sync {
        source_server: String,
        source_database: String,
        target_server: String,
        target_database: String,

        #[clap(long, default_value = "row-copy", value_parser = parse_strategy)]
        strategy: SyncStrategy,

        /// Table to copy, `schema.table` or `table`. Repeatable.
        #[clap(long = "table")]
        tables: Vec<String>,

        /// Table whose target rows are deleted. Repeatable.
        #[clap(long = "delete")]
        deletes: Vec<String>,

        /// Link on the target server pointing at the source (remote-direct).
        #[clap(long)]
        link: Option<String>,

        /// Keep existing target rows instead of truncating first.
        #[clap(long)]
        no_truncate: bool,

        /// Let the target assign identity values.
        #[clap(long)]
        no_identity: bool,

        #[clap(long)]
        source_corp_code: Option<String>,

        #[clap(long)]
        target_corp_code: Option<String>,

        /// Print the final job as JSON.
        #[clap(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let cli_config = CliConfig {
        work_dir: cli_args.work_dir.clone(),
        batch_size: cli_args.batch_size,
        data_path: cli_args.data_path.clone(),
        log_path: cli_args.log_path.clone(),
        db_prefix: cli_args.db_prefix.clone(),
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;
    info!(
        "corpdb {} with {} configured servers",
        VERSION,
        config.servers.len()
    );

    let resolver = Arc::new(ServerRegistry::new(config.servers.clone()));
    let factory = Arc::new(DriverFactory::new(resolver.clone()));
    let service = Arc::new(CorpDbService::new(factory, resolver, &config));

    match cli_args.command {
        Command::Preview { args } => {
            let preview = service.preview(&args.into_request()).await?;
            println!(
                "-- {} on {}\n{}",
                preview.database_name, preview.server_id, preview.script
            );
        }
        Command::Provision {
            args,
            sql_file,
            json,
        } => {
            let mut request = args.into_request();
            if let Some(path) = sql_file {
                let script = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read SQL file: {:?}", path))?;
                request = request
                    .with_generated_sql(corpdb_manager::options::parse_sql_statements(&script));
            }
            let result = service.provision(&request).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                for step in &result.steps {
                    println!(
                        "{:<28} {:>4} {:>8}ms",
                        step.step.as_str(),
                        if step.success { "ok" } else { "FAIL" },
                        step.elapsed_ms
                    );
                }
                for warning in &result.warnings {
                    println!("warning: {}", warning);
                }
            }
            if !result.success {
                bail!(
                    "Provisioning {} failed: {}",
                    result.database_name,
                    result.error_message.unwrap_or_default()
                );
            }
            println!(
                "Created {} on {} ({} tables, {}ms)",
                result.database_name, result.server_id, result.table_count, result.elapsed_ms
            );
            if let (Some(login), Some(password)) = (&result.login_name, &result.login_password) {
                println!("Login: {} / {}", login, password);
            }
            if let (Some(admin), Some(password)) = (&result.admin_user_id, &result.admin_password)
            {
                println!("Admin: {} / {}", admin, password);
            }
        }
        Command::CheckDuplicate { server, database } => {
            if service.check_duplicate(&server, &database).await? {
                println!("{} already exists on {}", database, server);
                std::process::exit(1);
            }
            println!("{} is available on {}", database, server);
        }
        Command::ValidateSql { file } => {
            let sql = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read SQL file: {:?}", file))?;
            service.validate_sql(&sql)?;
            println!("No forbidden keywords found");
        }
        Command::Tables { server, database } => {
            for table in service.list_tables(&server, &database).await? {
                println!(
                    "{:<40} {:>12}{}",
                    table.table.to_string(),
                    table
                        .row_count
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    if table.has_identity { "  identity" } else { "" }
                );
            }
        }
        Command::Links { server, test } => match test {
            Some(link) => {
                service.test_remote_link(&server, &link).await?;
                println!("Link {} on {} is reachable", link, server);
            }
            None => {
                for link in service.list_remote_links(&server).await? {
                    println!("{}", link);
                }
            }
        },
        Command::Sync {
            source_server,
            source_database,
            target_server,
            target_database,
            strategy,
            tables,
            deletes,
            link,
            no_truncate,
            no_identity,
            source_corp_code,
            target_corp_code,
            json,
        } => {
            let specs = tables
                .iter()
                .map(|t| TableSpec::insert(TableName::parse(t)))
                .chain(deletes.iter().map(|t| TableSpec::delete(TableName::parse(t))))
                .collect();
            let options = SyncOptions {
                truncate_before_insert: !no_truncate,
                preserve_identity: !no_identity,
                source_corp_code,
                target_corp_code,
                batch_size: cli_args.batch_size,
                ..Default::default()
            };
            let mut request = SyncRequest::new(
                source_server,
                source_database,
                target_server,
                target_database,
                strategy,
            )
            .with_tables(specs)
            .with_options(options);
            if let Some(link) = link {
                request = request.with_link(link);
            }
            run_sync(service, request, json).await?;
        }
    }

    Ok(())
}

async fn run_sync(service: Arc<CorpDbService>, request: SyncRequest, json: bool) -> Result<()> {
    let total = request.tables.len() as u64;
    let job_id = service.start_sync(request)?;

    {
        let service = service.clone();
        let job_id = job_id.clone();
        ctrlc::set_handler(move || {
            if service.cancel_job(&job_id) {
                warn!("Cancelling after the current table...");
            }
        })
        .context("Failed to install Ctrl-C handler")?;
    }

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:30}] {pos}/{len} {msg}")
            .context("Invalid progress template")?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let job = loop {
        let Some(job) = service.job_status(&job_id) else {
            bail!("Sync job {} is no longer registered", job_id);
        };
        pb.set_position(job.finished_tables() as u64);
        let current = job
            .tables
            .iter()
            .find(|t| t.status == TableStatus::Running)
            .map(|t| t.table_name.clone())
            .unwrap_or_default();
        pb.set_message(format!("{} {}", job.status, current));
        if job.status.is_terminal() {
            break job;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    };
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        for table in &job.tables {
            println!(
                "{:<40} {:<8} {:>10} {:>10} {:>8}ms {}",
                table.table_name,
                table.status.as_str(),
                table.rows_copied,
                table
                    .target_row_count
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                table.elapsed_ms,
                table.error_message.as_deref().unwrap_or("")
            );
        }
        for notice in &job.notices {
            println!("note: {}", notice);
        }
        println!(
            "Job {} {}: {} succeeded, {} failed",
            job.job_id,
            job.status,
            job.success_count(),
            job.fail_count()
        );
    }

    if job.status != JobStatus::Completed {
        bail!("Sync job {} ended {}", job.job_id, job.status);
    }
    Ok(())
}
