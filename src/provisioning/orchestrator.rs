use super::credentials::{generate_password, hash_password};
use super::error::ProvisionError;
use super::models::{
    ProvisionStep, ProvisioningOutcome, ProvisioningPreview, ProvisioningRequest,
    ProvisioningResult, StepRecord,
};
use super::rollback::roll_back;
use super::template::{self, AdminOutcome};
use crate::adapter::dialect::dialect_for;
use crate::adapter::{AdapterFactory, DatabaseAdapter, LoginSpec};
use crate::config::ProvisioningSettings;
use crate::corp_code::CorpCodeRewrite;
use crate::external::{
    ActivityKind, ActivityRecord, ActivitySink, ConnectionResolver, CorpDirectory,
    ServerConnection, StaticCorpDirectory, TracingActivitySink,
};
use crate::options::{
    self, extract_database_name, generate_create_database_sql, generate_sections,
    parse_sql_statements, ConfigurationSection, CreateDatabaseParams, SectionOutcome,
    VerificationReport, PASSWORD_PLACEHOLDER,
};
use crate::safety::validate_statements;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

lazy_static! {
    static ref DATABASE_NAME: Regex = Regex::new(r"^[A-Za-z0-9_]{1,128}$").unwrap();
    static ref CORP_CODE: Regex = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
}

const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);
const TENANT_ROLE: &str = "db_owner";

/// Drives a provisioning request through the state machine, rolling back on
/// failure.
pub struct Orchestrator {
    factory: Arc<dyn AdapterFactory>,
    resolver: Arc<dyn ConnectionResolver>,
    corp_directory: Arc<dyn CorpDirectory>,
    activity: Arc<dyn ActivitySink>,
    settings: ProvisioningSettings,
    poll_interval: Duration,
}

impl Orchestrator {
    pub fn new(
        factory: Arc<dyn AdapterFactory>,
        resolver: Arc<dyn ConnectionResolver>,
        settings: ProvisioningSettings,
    ) -> Self {
        Self {
            factory,
            resolver,
            corp_directory: Arc::new(StaticCorpDirectory::new(Vec::new())),
            activity: Arc::new(TracingActivitySink),
            settings,
            poll_interval: READY_POLL_INTERVAL,
        }
    }

    pub fn with_corp_directory(mut self, directory: Arc<dyn CorpDirectory>) -> Self {
        self.corp_directory = directory;
        self
    }

    pub fn with_activity_sink(mut self, sink: Arc<dyn ActivitySink>) -> Self {
        self.activity = sink;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn settings(&self) -> &ProvisioningSettings {
        &self.settings
    }

    /// The CREATE script `request` would run. Touches no server.
    pub async fn preview(
        &self,
        request: &ProvisioningRequest,
    ) -> Result<ProvisioningPreview, ProvisionError> {
        let database = request.database_name(&self.settings);
        validate_request(request, &database)?;
        let server = self.resolve(&request.target_server_id).await?;
        Ok(self.render(request, &server, &database))
    }

    fn render(
        &self,
        request: &ProvisioningRequest,
        server: &ServerConnection,
        database: &str,
    ) -> ProvisioningPreview {
        let params = CreateDatabaseParams {
            database_name: database.to_string(),
            corp_code: request.corp_code.clone(),
            corp_name: request.corp_name.clone(),
            biz_no: request.biz_no.clone(),
            source_database: Some(request.source_database.clone()),
            data_path: server
                .data_path
                .clone()
                .or_else(|| self.settings.data_path.clone()),
            log_path: server
                .log_path
                .clone()
                .or_else(|| self.settings.log_path.clone()),
        };
        let script = generate_create_database_sql(server.kind, &params, &self.settings);
        let statements = parse_sql_statements(&script);
        ProvisioningPreview {
            database_name: database.to_string(),
            server_id: server.id.clone(),
            script,
            statements,
        }
    }

    async fn resolve(&self, server_id: &str) -> Result<ServerConnection, ProvisionError> {
        self.resolver
            .resolve(server_id)
            .await
            .map_err(|e| ProvisionError::InvalidRequest {
                reason: e.raw_message(),
            })
    }

    /// Runs `request` to completion or rollback. Never panics on server
    /// errors; every failure is described in the result.
    pub async fn provision(&self, request: &ProvisioningRequest) -> ProvisioningResult {
        let database = request.database_name(&self.settings);
        let admin_password = request
            .admin
            .password
            .clone()
            .unwrap_or_else(|| generate_password(self.settings.password_length));
        let mut run = Run::new(
            &request.target_server_id,
            &database,
            generate_password(self.settings.password_length),
            admin_password,
        );
        info!(
            "Provisioning {} on {} from template {}/{}",
            database, request.target_server_id, request.source_server_id, request.source_database
        );

        match self.run_steps(request, &mut run).await {
            Ok(()) => {
                info!(
                    "Provisioned {} on {} in {}ms ({} tables, {} warnings)",
                    database,
                    request.target_server_id,
                    run.started.elapsed().as_millis(),
                    run.table_count,
                    run.warnings.len()
                );
                self.activity.record(
                    ActivityRecord::new(ActivityKind::Provision, run.target_label())
                        .with_detail(format!("{} ({})", request.corp_name, request.corp_code)),
                );
                run.into_result(None, None)
            }
            Err(err) => {
                error!("Provisioning {} failed: {}", database, err);
                run.fail_current(&err);
                let rollback = match err.step() {
                    Some(step) if run.mutated && step.requires_rollback() => {
                        let log = roll_back(
                            self.factory.as_ref(),
                            &request.target_server_id,
                            &database,
                            run.database_created,
                            run.login_name.as_deref(),
                            step,
                            &err.to_string(),
                        )
                        .await;
                        let mut record =
                            ActivityRecord::new(ActivityKind::Rollback, run.target_label())
                                .with_detail(format!(
                                    "{} action(s) after {} failed",
                                    log.actions.len(),
                                    step
                                ));
                        if !log.is_complete() {
                            record = record.failed();
                        }
                        self.activity.record(record);
                        Some(log)
                    }
                    _ => None,
                };
                self.activity.record(
                    ActivityRecord::new(ActivityKind::Provision, run.target_label())
                        .with_detail(err.to_string())
                        .failed(),
                );
                run.into_result(Some(err), rollback)
            }
        }
    }

    async fn run_steps(
        &self,
        request: &ProvisioningRequest,
        run: &mut Run,
    ) -> Result<(), ProvisionError> {
        validate_request(request, &run.database)?;
        let server = self.resolve(&request.target_server_id).await?;

        run.begin(ProvisionStep::DuplicateCheck);
        let target = self
            .factory
            .open(&request.target_server_id, None)
            .await
            .map_err(|e| ProvisionError::from_adapter(ProvisionStep::DuplicateCheck, e))?;
        let result = self
            .run_on_server(request, run, &server, target.as_ref())
            .await;
        close_quietly(target.as_ref()).await;
        result
    }

    async fn run_on_server(
        &self,
        request: &ProvisioningRequest,
        run: &mut Run,
        server: &ServerConnection,
        target: &dyn DatabaseAdapter,
    ) -> Result<(), ProvisionError> {
        let exists = target
            .database_exists(&run.database)
            .await
            .map_err(|e| ProvisionError::from_adapter(ProvisionStep::DuplicateCheck, e))?;
        if exists {
            return Err(ProvisionError::DuplicateDatabase {
                server_id: request.target_server_id.clone(),
                database: run.database.clone(),
            });
        }
        run.complete(None);

        run.begin(ProvisionStep::KeywordValidation);
        let statements = match &request.generated_sql {
            Some(edited) => edited
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => self.render(request, server, &run.database).statements,
        };
        validate_statements(&statements).map_err(|e| ProvisionError::UnsafeSql {
            keyword: e.keyword.to_string(),
        })?;
        let created: Vec<String> = statements
            .iter()
            .filter_map(|s| extract_database_name(s))
            .collect();
        if let Some(other) = created
            .iter()
            .find(|name| !name.eq_ignore_ascii_case(&run.database))
        {
            return Err(ProvisionError::InvalidRequest {
                reason: format!(
                    "the SQL creates database '{}', only '{}' is allowed",
                    other, run.database
                ),
            });
        }
        if created.is_empty() {
            return Err(ProvisionError::InvalidRequest {
                reason: format!("the SQL does not create database '{}'", run.database),
            });
        }
        run.complete(Some(format!("{} statement(s)", statements.len())));

        run.begin(ProvisionStep::CreateDatabase);
        run.mutated = true;
        self.create_database(target, run, &statements).await?;
        run.complete(None);

        run.begin(ProvisionStep::ConfigureOptions);
        let sections = generate_sections(target.kind(), &run.database, &self.settings);
        for section in &sections {
            let outcome = self.apply_section(target, run, section).await;
            if let Some(err) = &outcome.error {
                warn!(
                    "Option section {} failed on {}: {}",
                    section.name, run.database, err
                );
                run.warnings
                    .push(format!("Option section '{}' failed: {}", section.name, err));
            }
            run.sections.push(outcome);
        }
        let applied = run.sections.iter().filter(|s| s.succeeded()).count();
        run.complete(Some(format!("{}/{} sections applied", applied, sections.len())));

        run.begin(ProvisionStep::CreateAccounts);
        let login = LoginSpec {
            login_name: format!("{}_user", run.database),
            password: run.login_password.clone(),
            database: run.database.clone(),
            role: TENANT_ROLE.to_string(),
        };
        let created = target.create_login(&login).await;
        let masked = LoginSpec {
            password: "********".to_string(),
            ..login.clone()
        };
        self.record_statements(
            ActivityRecord::new(ActivityKind::CreateAccounts, run.target_label())
                .with_detail(format!("{} ({})", login.login_name, login.role)),
            &dialect_for(target.kind()).create_login_sql(&masked),
            created.is_ok(),
        );
        created.map_err(|e| ProvisionError::from_adapter(ProvisionStep::CreateAccounts, e))?;
        run.login_name = Some(login.login_name.clone());
        run.complete(Some(login.login_name));

        run.begin(ProvisionStep::CloneSchema);
        let source = self
            .factory
            .open(&request.source_server_id, Some(&request.source_database))
            .await
            .map_err(|e| ProvisionError::from_adapter(ProvisionStep::CloneSchema, e))?;
        let tenant = match self
            .factory
            .open(&request.target_server_id, Some(&run.database))
            .await
        {
            Ok(tenant) => tenant,
            Err(e) => {
                close_quietly(source.as_ref()).await;
                return Err(ProvisionError::from_adapter(ProvisionStep::CloneSchema, e));
            }
        };
        let result = self
            .populate(request, run, source.as_ref(), tenant.as_ref())
            .await;
        close_quietly(source.as_ref()).await;
        close_quietly(tenant.as_ref()).await;
        result?;

        run.begin(ProvisionStep::Verify);
        let verified = self.verify(request, run, target).await;
        run.finish(verified, None);
        Ok(())
    }

    async fn create_database(
        &self,
        target: &dyn DatabaseAdapter,
        run: &mut Run,
        statements: &[String],
    ) -> Result<(), ProvisionError> {
        let step = ProvisionStep::CreateDatabase;
        for statement in statements {
            let creates = extract_database_name(statement).is_some();
            // The excerpt keeps the placeholder so secrets never reach the audit trail.
            let executable = statement.replace(PASSWORD_PLACEHOLDER, &run.login_password);
            debug!("Executing: {}", statement);
            let result = target.execute(&executable).await;
            self.record(
                ActivityRecord::new(ActivityKind::CreateDatabase, run.target_label())
                    .with_sql(statement, self.settings.sql_excerpt_len),
                result.is_ok(),
            );
            match result {
                Ok(_) if creates => run.database_created = true,
                Ok(_) => {}
                Err(e) => {
                    // A concurrent request may own a database created between
                    // the duplicate check and this statement.
                    if creates && !e.raw_message().to_lowercase().contains("already exists") {
                        run.database_created = true;
                    }
                    return Err(ProvisionError::from_adapter(step, e));
                }
            }
        }
        self.wait_until_ready(target, &run.database).await
    }

    async fn wait_until_ready(
        &self,
        target: &dyn DatabaseAdapter,
        database: &str,
    ) -> Result<(), ProvisionError> {
        let timeout = Duration::from_secs(self.settings.create_timeout_secs);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match target.database_exists(database).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) if e.is_connection() => {
                    return Err(ProvisionError::from_adapter(ProvisionStep::CreateDatabase, e))
                }
                Err(e) => debug!("Waiting for {}: {}", database, e),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ProvisionError::Timeout {
                    database: database.to_string(),
                    timeout_secs: self.settings.create_timeout_secs,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Runs one option section. The first failing statement stops the section.
    async fn apply_section(
        &self,
        target: &dyn DatabaseAdapter,
        run: &Run,
        section: &ConfigurationSection,
    ) -> SectionOutcome {
        let total = section.statements.len();
        for (executed, statement) in section.statements.iter().enumerate() {
            if let Err(e) = target.execute(statement).await {
                self.record(
                    ActivityRecord::new(ActivityKind::ConfigureOptions, run.target_label())
                        .with_detail(format!("section {}", section.name))
                        .with_sql(statement, self.settings.sql_excerpt_len),
                    false,
                );
                return SectionOutcome::failed(
                    section.name,
                    executed,
                    total,
                    statement,
                    e.raw_message(),
                );
            }
        }
        self.record(
            ActivityRecord::new(ActivityKind::ConfigureOptions, run.target_label())
                .with_detail(format!("section {}", section.name))
                .with_sql(&section.statements.join("\n"), self.settings.sql_excerpt_len),
            true,
        );
        SectionOutcome::applied(section.name, total)
    }

    /// CloneSchema (already begun) through CreateAdminAccount.
    async fn populate(
        &self,
        request: &ProvisioningRequest,
        run: &mut Run,
        source: &dyn DatabaseAdapter,
        tenant: &dyn DatabaseAdapter,
    ) -> Result<(), ProvisionError> {
        let tables = source
            .list_tables(&request.source_database)
            .await
            .map_err(|e| ProvisionError::from_adapter(ProvisionStep::CloneSchema, e))?;
        let mut executed = Vec::new();
        let cloned =
            template::clone_tables(source, tenant, &request.source_database, &tables, &mut executed)
                .await;
        self.record_statements(
            ActivityRecord::new(ActivityKind::CloneSchema, run.target_label()).with_detail(
                format!("{} table(s) from {}", tables.len(), request.source_database),
            ),
            &executed,
            cloned.is_ok(),
        );
        run.table_count =
            cloned.map_err(|e| ProvisionError::from_adapter(ProvisionStep::CloneSchema, e))?;
        run.complete(Some(format!("{} table(s)", run.table_count)));

        run.begin(ProvisionStep::CloneExtendedProperties);
        let mut executed = Vec::new();
        let descriptions = template::clone_descriptions(source, tenant, &tables, &mut executed).await;
        self.record_statements(
            ActivityRecord::new(ActivityKind::CloneExtendedProperties, run.target_label())
                .with_detail(match &descriptions {
                    Ok(count) => format!("{} description(s)", count),
                    Err(e) => e.raw_message(),
                }),
            &executed,
            descriptions.is_ok(),
        );
        let descriptions = descriptions.map_err(|e| {
            ProvisionError::from_adapter(ProvisionStep::CloneExtendedProperties, e)
        })?;
        run.complete(Some(format!("{} description(s)", descriptions)));

        run.begin(ProvisionStep::CloneIndexes);
        let mut executed = Vec::new();
        let indexes = template::clone_indexes(source, tenant, &tables, &mut executed).await;
        self.record_statements(
            ActivityRecord::new(ActivityKind::CloneIndexes, run.target_label())
                .with_detail(match &indexes {
                    Ok(count) => format!("{} index(es)", count),
                    Err(e) => e.raw_message(),
                }),
            &executed,
            indexes.is_ok(),
        );
        let indexes =
            indexes.map_err(|e| ProvisionError::from_adapter(ProvisionStep::CloneIndexes, e))?;
        run.complete(Some(format!("{} index(es)", indexes)));

        run.begin(ProvisionStep::CopyBaselineData);
        let rewrite = self
            .template_corp_code(request, run)
            .await
            .map(|from| {
                CorpCodeRewrite::new(
                    from,
                    request.corp_code.clone(),
                    self.settings.corp_code_columns.clone(),
                )
            });
        let mut executed = Vec::new();
        let copied = template::copy_baseline(
            source,
            tenant,
            &tables,
            &self.settings,
            rewrite.as_ref(),
            &mut executed,
        )
        .await;
        self.record_statements(
            ActivityRecord::new(ActivityKind::CopyBaselineData, run.target_label()).with_detail(
                match &copied {
                    Ok(tables) => format!("{} baseline table(s)", tables.len()),
                    Err(e) => e.raw_message(),
                },
            ),
            &executed,
            copied.is_ok(),
        );
        run.baseline_tables =
            copied.map_err(|e| ProvisionError::from_adapter(ProvisionStep::CopyBaselineData, e))?;
        run.complete(Some(format!("{} table(s)", run.baseline_tables.len())));

        run.begin(ProvisionStep::CreateAdminAccount);
        let admin = &request.admin;
        let outcome = template::create_admin(
            tenant,
            &run.database,
            &self.settings.admin_user_table,
            &admin.user_id,
            &admin.display_name,
            &hash_password(&run.admin_password),
            &admin.role,
        )
        .await
        .map_err(|e| ProvisionError::from_adapter(ProvisionStep::CreateAdminAccount, e))?;
        let detail = match outcome {
            AdminOutcome::Created => {
                run.admin_user_id = Some(admin.user_id.clone());
                format!("{} created", admin.user_id)
            }
            AdminOutcome::AlreadyExists => format!("{} already present", admin.user_id),
            AdminOutcome::NoUserTable => {
                let warning = format!(
                    "User table {} not found, admin account not created",
                    self.settings.admin_user_table
                );
                warn!("{}", warning);
                run.warnings.push(warning.clone());
                warning
            }
        };
        self.record(
            ActivityRecord::new(ActivityKind::CreateAdminAccount, run.target_label())
                .with_detail(detail.clone()),
            true,
        );
        run.complete(Some(detail));
        Ok(())
    }

    /// Placeholder corp code of the template: request, then corp directory,
    /// then configuration.
    async fn template_corp_code(
        &self,
        request: &ProvisioningRequest,
        run: &mut Run,
    ) -> Option<String> {
        if let Some(code) = request
            .template_corp_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            return Some(code.to_string());
        }
        match self
            .corp_directory
            .lookup_corp_by_database_name(&request.source_database)
            .await
        {
            Ok(Some(info)) => return Some(info.corp_code),
            Ok(None) => {}
            Err(e) => {
                warn!("Corp directory lookup for {} failed: {}", request.source_database, e);
                run.warnings
                    .push(format!("Corp directory lookup failed: {}", e.raw_message()));
            }
        }
        if self.settings.template_corp_code.is_none() {
            run.warnings.push(format!(
                "No corp code known for template {}, baseline rows copied unchanged",
                request.source_database
            ));
        }
        self.settings.template_corp_code.clone()
    }

    /// Smoke test on a fresh connection plus the catalog report. Returns
    /// whether everything checked out; problems become warnings.
    async fn verify(
        &self,
        request: &ProvisioningRequest,
        run: &mut Run,
        target: &dyn DatabaseAdapter,
    ) -> bool {
        let mut ok = true;
        match self
            .factory
            .open(&request.target_server_id, Some(&run.database))
            .await
        {
            Ok(fresh) => {
                match fresh.list_tables(&run.database).await {
                    Ok(tables) if tables.len() == run.table_count => {}
                    Ok(tables) => {
                        ok = false;
                        run.warnings.push(format!(
                            "Verification found {} table(s), expected {}",
                            tables.len(),
                            run.table_count
                        ));
                    }
                    Err(e) => {
                        ok = false;
                        run.warnings
                            .push(format!("Verification could not list tables: {}", e.raw_message()));
                    }
                }
                close_quietly(fresh.as_ref()).await;
            }
            Err(e) => {
                ok = false;
                run.warnings.push(format!(
                    "Verification could not connect to {}: {}",
                    run.database,
                    e.raw_message()
                ));
            }
        }

        let report = options::verify(target, &run.database, run.sections.clone()).await;
        if let Some(e) = &report.query_error {
            ok = false;
            run.warnings
                .push(format!("Verification query failed: {}", e));
        }
        if !ok {
            warn!("Verification of {} reported problems", run.database);
        }
        run.verification = Some(report);
        ok
    }

    fn record(&self, record: ActivityRecord, success: bool) {
        self.activity
            .record(if success { record } else { record.failed() });
    }

    /// Records a step that ran `executed`. A failed step shows the statement
    /// it stopped at, a successful one the start of everything it ran.
    fn record_statements(&self, record: ActivityRecord, executed: &[String], success: bool) {
        let excerpt = if success {
            Some(executed.join(";\n"))
        } else {
            executed.last().cloned()
        };
        let record = match excerpt.filter(|sql| !sql.is_empty()) {
            Some(sql) => record.with_sql(&sql, self.settings.sql_excerpt_len),
            None => record,
        };
        self.record(record, success);
    }
}

fn validate_request(request: &ProvisioningRequest, database: &str) -> Result<(), ProvisionError> {
    let invalid = |reason: &str| -> Result<(), ProvisionError> {
        Err(ProvisionError::InvalidRequest {
            reason: reason.to_string(),
        })
    };
    if request.corp_code.trim().is_empty() {
        return invalid("corp code is required");
    }
    if !CORP_CODE.is_match(request.corp_code.trim()) {
        return invalid("corp code may only contain letters, digits and underscores");
    }
    if request.corp_name.chars().any(char::is_control) {
        return invalid("corp name must not contain control characters");
    }
    if request
        .biz_no
        .as_deref()
        .is_some_and(|b| b.chars().any(char::is_control))
    {
        return invalid("business number must not contain control characters");
    }
    if request.source_database.trim().is_empty() {
        return invalid("template database is required");
    }
    if !DATABASE_NAME.is_match(database) {
        return Err(ProvisionError::InvalidRequest {
            reason: format!(
                "database name '{}' must be 1-128 letters, digits or underscores",
                database
            ),
        });
    }
    Ok(())
}

async fn close_quietly(adapter: &dyn DatabaseAdapter) {
    if let Err(e) = adapter.close().await {
        debug!("Closing connection failed: {}", e);
    }
}

/// Mutable state of one provisioning run.
struct Run {
    server_id: String,
    database: String,
    started: Instant,
    current: Option<(ProvisionStep, Instant)>,
    steps: Vec<StepRecord>,
    warnings: Vec<String>,
    mutated: bool,
    database_created: bool,
    login_name: Option<String>,
    login_password: String,
    admin_password: String,
    admin_user_id: Option<String>,
    table_count: usize,
    baseline_tables: Vec<(String, u64)>,
    sections: Vec<SectionOutcome>,
    verification: Option<VerificationReport>,
}

impl Run {
    fn new(server_id: &str, database: &str, login_password: String, admin_password: String) -> Self {
        Self {
            server_id: server_id.to_string(),
            database: database.to_string(),
            started: Instant::now(),
            current: None,
            steps: Vec::new(),
            warnings: Vec::new(),
            mutated: false,
            database_created: false,
            login_name: None,
            login_password,
            admin_password,
            admin_user_id: None,
            table_count: 0,
            baseline_tables: Vec::new(),
            sections: Vec::new(),
            verification: None,
        }
    }

    fn target_label(&self) -> String {
        format!("{}/{}", self.server_id, self.database)
    }

    fn begin(&mut self, step: ProvisionStep) {
        info!("[{}] {}", self.database, step);
        self.current = Some((step, Instant::now()));
    }

    fn finish(&mut self, success: bool, detail: Option<String>) {
        if let Some((step, started)) = self.current.take() {
            self.steps.push(StepRecord {
                step,
                success,
                elapsed_ms: started.elapsed().as_millis() as u64,
                detail,
            });
        }
    }

    fn complete(&mut self, detail: Option<String>) {
        self.finish(true, detail);
    }

    fn fail_current(&mut self, err: &ProvisionError) {
        self.finish(false, Some(err.to_string()));
    }

    fn into_result(
        self,
        error: Option<ProvisionError>,
        rollback: Option<super::rollback::RollbackLog>,
    ) -> ProvisioningResult {
        let success = error.is_none();
        let outcome = match (&error, self.mutated) {
            (None, _) => ProvisioningOutcome::Created,
            (Some(_), true) => ProvisioningOutcome::RolledBack,
            (Some(_), false) => ProvisioningOutcome::NothingCreated,
        };
        let admin_created = self.admin_user_id.is_some();
        ProvisioningResult {
            success,
            database_name: self.database,
            server_id: self.server_id,
            table_count: if success { self.table_count } else { 0 },
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            outcome,
            error_message: error.as_ref().map(ProvisionError::user_message),
            error,
            login_name: if success { self.login_name } else { None },
            login_password: success.then_some(self.login_password),
            admin_user_id: if success { self.admin_user_id } else { None },
            admin_password: (success && admin_created).then_some(self.admin_password),
            baseline_tables: self.baseline_tables,
            warnings: self.warnings,
            verification: self.verification,
            rollback,
            steps: self.steps,
        }
    }
}
