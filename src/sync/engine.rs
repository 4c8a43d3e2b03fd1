use super::error::SyncError;
use super::models::{JobStatus, SyncJob, SyncRequest, SyncStrategy, TableStatus};
use super::registry::JobRegistry;
use super::strategy::{transport_for, SyncContext, TableTransport};
use crate::adapter::{AdapterFactory, DatabaseAdapter};
use crate::config::SyncSettings;
use crate::external::{ActivityKind, ActivityRecord, ActivitySink, ConnectionResolver, TracingActivitySink};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs sync jobs as background tasks and tracks them in a [`JobRegistry`].
#[derive(Clone)]
pub struct SyncEngine {
    factory: Arc<dyn AdapterFactory>,
    resolver: Arc<dyn ConnectionResolver>,
    registry: Arc<JobRegistry>,
    activity: Arc<dyn ActivitySink>,
    settings: SyncSettings,
    corp_code_columns: Vec<String>,
}

impl SyncEngine {
    pub fn new(
        factory: Arc<dyn AdapterFactory>,
        resolver: Arc<dyn ConnectionResolver>,
        registry: Arc<JobRegistry>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            factory,
            resolver,
            registry,
            activity: Arc::new(TracingActivitySink),
            settings,
            corp_code_columns: vec!["CORP_CD".to_string()],
        }
    }

    pub fn with_activity_sink(mut self, activity: Arc<dyn ActivitySink>) -> Self {
        self.activity = activity;
        self
    }

    /// Columns in which corp codes are substituted by row copies.
    pub fn with_corp_code_columns(mut self, columns: Vec<String>) -> Self {
        self.corp_code_columns = columns;
        self
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Validates `request`, registers a job and starts it in the background.
    pub fn start(&self, request: SyncRequest) -> Result<String, SyncError> {
        validate_request(&request)?;
        let (job_id, token) = self.registry.register(&request);
        info!(
            "Starting sync job {} ({}, {} tables) {} -> {}",
            job_id,
            request.strategy,
            request.tables.len(),
            request.source_label(),
            request.target_label()
        );

        let engine = self.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            let worker = engine.clone();
            let worker_id = id.clone();
            let worker_request = request.clone();
            let result = tokio::spawn(async move {
                worker.run_job(&worker_id, &worker_request, token).await;
            })
            .await;
            if let Err(e) = result {
                error!("Sync job {} panicked: {}", id, e);
                engine.abandon(&id, &request, format!("Task panic: {}", e));
            }
        });
        Ok(job_id)
    }

    /// Ends a job whose task died without reaching a final status.
    fn abandon(&self, job_id: &str, request: &SyncRequest, message: String) {
        let finished = self
            .registry
            .get(job_id)
            .map_or(true, |job| job.status.is_terminal());
        if finished {
            return;
        }
        self.registry.update(job_id, |job| {
            for table in job.tables.iter_mut() {
                match table.status {
                    TableStatus::Running => {
                        table.status = TableStatus::Failed;
                        table.error_message = Some(message.clone());
                    }
                    status if !status.is_terminal() => table.status = TableStatus::Skipped,
                    _ => {}
                }
            }
        });
        self.complete(job_id, request, JobStatus::Failed, Some(message));
    }

    /// Starts a job and waits for it to finish.
    pub async fn run(&self, request: SyncRequest) -> Result<SyncJob, SyncError> {
        let job_id = self.start(request)?;
        self.registry.wait(&job_id).await.ok_or_else(|| {
            SyncError::InvalidRequest(format!("job {} disappeared from the registry", job_id))
        })
    }

    async fn run_job(&self, job_id: &str, request: &SyncRequest, token: CancellationToken) {
        self.registry.update(job_id, |job| {
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Running;
            }
            job.started_at = Some(chrono::Utc::now());
        });

        let mut transport = transport_for(request.strategy);
        let (source, target) = match self.connect(request, transport.as_ref()).await {
            Ok(adapters) => adapters,
            Err(e) => {
                error!("Sync job {} could not connect: {}", job_id, e);
                self.skip_remaining(job_id, 0);
                self.complete(job_id, request, JobStatus::Failed, Some(e.table_message()));
                return;
            }
        };

        let ctx = SyncContext {
            job_id,
            request,
            source: source.as_deref(),
            target: target.as_ref(),
            resolver: self.resolver.as_ref(),
            settings: &self.settings,
            corp_code_columns: &self.corp_code_columns,
        };

        let (status, error_message) =
            self.run_tables(job_id, &ctx, transport.as_mut(), &token).await;

        if let Some(source) = &source {
            if let Err(e) = source.close().await {
                warn!("Closing source connection of job {} failed: {}", job_id, e);
            }
        }
        if let Err(e) = target.close().await {
            warn!("Closing target connection of job {} failed: {}", job_id, e);
        }

        self.complete(job_id, request, status, error_message);
    }

    async fn connect(
        &self,
        request: &SyncRequest,
        transport: &dyn TableTransport,
    ) -> Result<(Option<Box<dyn DatabaseAdapter>>, Box<dyn DatabaseAdapter>), SyncError> {
        let source = if transport.needs_source() {
            Some(
                self.factory
                    .open(&request.source_server_id, Some(&request.source_database))
                    .await?,
            )
        } else {
            None
        };
        let target = self
            .factory
            .open(&request.target_server_id, Some(&request.target_database))
            .await?;
        Ok((source, target))
    }

    /// Batch hooks and the table loop. `finish_batch` runs whenever
    /// `begin_batch` was attempted.
    async fn run_tables(
        &self,
        job_id: &str,
        ctx: &SyncContext<'_>,
        transport: &mut dyn TableTransport,
        token: &CancellationToken,
    ) -> (JobStatus, Option<String>) {
        let mut error_message = None;
        let mut cancelled = false;

        match transport.begin_batch(ctx).await {
            Ok(notices) => {
                self.registry
                    .update(job_id, |job| job.notices.extend(notices));

                for (index, spec) in ctx.request.tables.iter().enumerate() {
                    if token.is_cancelled() {
                        info!("Sync job {} cancelled before {}", job_id, spec.table);
                        self.skip_remaining(job_id, index);
                        cancelled = true;
                        break;
                    }
                    self.registry.update(job_id, |job| {
                        job.tables[index].status = TableStatus::Running;
                    });
                    let result = transport.sync_table(ctx, spec).await;
                    self.registry.update(job_id, |job| job.tables[index] = result);
                }
            }
            Err(e) => {
                error!("Sync job {} could not start its batch: {}", job_id, e);
                self.skip_remaining(job_id, 0);
                error_message = Some(e.table_message());
            }
        }

        if let Err(e) = transport.finish_batch(ctx).await {
            error!("Sync job {} could not finish its batch: {}", job_id, e);
            let message = format!("Finishing the batch failed: {}", e.table_message());
            self.registry
                .update(job_id, |job| job.notices.push(message.clone()));
            error_message.get_or_insert(message);
        }

        let failed = self
            .registry
            .get(job_id)
            .map(|job| job.fail_count() > 0)
            .unwrap_or(true);
        // A job reported as cancelling never ends up completed.
        let status = if cancelled || token.is_cancelled() {
            JobStatus::Cancelled
        } else if failed || error_message.is_some() {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        (status, error_message)
    }

    fn skip_remaining(&self, job_id: &str, from: usize) {
        self.registry.update(job_id, |job| {
            for table in job.tables.iter_mut().skip(from) {
                if !table.status.is_terminal() {
                    table.status = TableStatus::Skipped;
                }
            }
        });
    }

    fn complete(
        &self,
        job_id: &str,
        request: &SyncRequest,
        status: JobStatus,
        error_message: Option<String>,
    ) {
        self.registry.finish(job_id, status, error_message);
        let Some(job) = self.registry.get(job_id) else {
            return;
        };
        info!(
            "Sync job {} {}: {} succeeded, {} failed, {} skipped",
            job_id,
            status,
            job.success_count(),
            job.fail_count(),
            job.tables
                .iter()
                .filter(|t| t.status == TableStatus::Skipped)
                .count()
        );

        let mut record = ActivityRecord::new(ActivityKind::Sync, request.target_label()).with_detail(
            format!(
                "{} from {}: {} ({} succeeded, {} failed)",
                request.strategy,
                request.source_label(),
                status,
                job.success_count(),
                job.fail_count()
            ),
        );
        if status != JobStatus::Completed {
            record = record.failed();
        }
        self.activity.record(record);
    }
}

fn validate_request(request: &SyncRequest) -> Result<(), SyncError> {
    let required = [
        ("source server", &request.source_server_id),
        ("source database", &request.source_database),
        ("target server", &request.target_server_id),
        ("target database", &request.target_database),
    ];
    for (label, value) in required {
        if value.trim().is_empty() {
            return Err(SyncError::InvalidRequest(format!("{} is required", label)));
        }
    }
    if request.tables.is_empty() {
        return Err(SyncError::InvalidRequest("no tables selected".to_string()));
    }
    if request.strategy == SyncStrategy::RemoteDirect
        && request
            .link_name
            .as_deref()
            .map_or(true, |l| l.trim().is_empty())
    {
        return Err(SyncError::InvalidRequest(
            "remote direct copy needs a link name".to_string(),
        ));
    }
    if request.source_server_id == request.target_server_id
        && request.source_database.eq_ignore_ascii_case(&request.target_database)
    {
        return Err(SyncError::InvalidRequest(
            "source and target are the same database".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::TableName;
    use crate::adapter::{AdapterError, DbKind, MemoryCluster};
    use crate::sync::models::TableSpec;
    use async_trait::async_trait;

    struct PanickingFactory;

    #[async_trait]
    impl AdapterFactory for PanickingFactory {
        async fn open(
            &self,
            _server_id: &str,
            _database: Option<&str>,
        ) -> Result<Box<dyn DatabaseAdapter>, AdapterError> {
            panic!("driver bug");
        }
    }

    fn request(strategy: SyncStrategy) -> SyncRequest {
        SyncRequest::new("SRV1", "CORP1001", "SRV2", "CORP1001", strategy)
            .with_tables(vec![TableSpec::insert(TableName::new("TB_DEPT"))])
    }

    #[test]
    fn test_validate_request() {
        assert!(validate_request(&request(SyncStrategy::RowCopy)).is_ok());

        let no_tables = request(SyncStrategy::RowCopy).with_tables(Vec::new());
        assert!(matches!(
            validate_request(&no_tables),
            Err(SyncError::InvalidRequest(_))
        ));

        let no_link = request(SyncStrategy::RemoteDirect);
        assert!(validate_request(&no_link).is_err());
        assert!(validate_request(&no_link.with_link("SRC_LINK")).is_ok());

        let mut same = request(SyncStrategy::ExportImport);
        same.target_server_id = "SRV1".to_string();
        assert!(validate_request(&same).is_err());
    }

    #[tokio::test]
    async fn test_panicking_job_ends_failed() {
        let cluster = MemoryCluster::new();
        cluster.add_server("SRV1", DbKind::Mssql);
        cluster.add_server("SRV2", DbKind::Mssql);
        let engine = SyncEngine::new(
            Arc::new(PanickingFactory),
            Arc::new(cluster),
            Arc::new(JobRegistry::new()),
            SyncSettings::default(),
        );

        let job = engine.run(request(SyncStrategy::RowCopy)).await.unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.finished_at.is_some());
        assert!(job.error_message.unwrap().contains("panic"));
        assert_eq!(job.tables[0].status, TableStatus::Skipped);
    }
}
