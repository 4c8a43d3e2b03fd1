//! Entry point over provisioning, sync jobs and the catalog helpers.

use crate::adapter::{AdapterError, AdapterFactory, TableInfo};
use crate::config::AppConfig;
use crate::external::{
    ActivitySink, ConnectionResolver, CorpDirectory, MainDbCorpDirectory, StaticCorpDirectory,
};
use crate::provisioning::{
    Orchestrator, ProvisionError, ProvisioningPreview, ProvisioningRequest, ProvisioningResult,
};
use crate::safety::{self, UnsafeSqlError};
use crate::sync::{JobRegistry, SyncEngine, SyncError, SyncJob, SyncRequest};
use std::sync::Arc;
use tracing::warn;

pub struct CorpDbService {
    factory: Arc<dyn AdapterFactory>,
    orchestrator: Orchestrator,
    sync: SyncEngine,
}

impl CorpDbService {
    /// Wires the orchestrator and the sync engine from the resolved config.
    /// The corp directory queries the main database when one is configured
    /// and falls back to the static entries otherwise.
    pub fn new(
        factory: Arc<dyn AdapterFactory>,
        resolver: Arc<dyn ConnectionResolver>,
        config: &AppConfig,
    ) -> Self {
        let directory: Arc<dyn CorpDirectory> = match (
            &config.corp_directory.main_server_id,
            &config.corp_directory.main_database,
        ) {
            (Some(_), Some(_)) => Arc::new(MainDbCorpDirectory::new(
                factory.clone(),
                config.corp_directory.clone(),
            )),
            _ => Arc::new(StaticCorpDirectory::new(
                config.corp_directory.entries.clone(),
            )),
        };
        let orchestrator =
            Orchestrator::new(factory.clone(), resolver.clone(), config.provisioning.clone())
                .with_corp_directory(directory);
        let sync = SyncEngine::new(
            factory.clone(),
            resolver,
            Arc::new(JobRegistry::new()),
            config.sync.clone(),
        )
        .with_corp_code_columns(config.provisioning.corp_code_columns.clone());
        Self::from_parts(factory, orchestrator, sync)
    }

    pub fn from_parts(
        factory: Arc<dyn AdapterFactory>,
        orchestrator: Orchestrator,
        sync: SyncEngine,
    ) -> Self {
        Self {
            factory,
            orchestrator,
            sync,
        }
    }

    pub fn with_activity_sink(mut self, sink: Arc<dyn ActivitySink>) -> Self {
        self.orchestrator = self.orchestrator.with_activity_sink(sink.clone());
        self.sync = self.sync.with_activity_sink(sink);
        self
    }

    // =========================================================================
    // Provisioning
    // =========================================================================

    pub async fn provision(&self, request: &ProvisioningRequest) -> ProvisioningResult {
        self.orchestrator.provision(request).await
    }

    pub async fn preview(
        &self,
        request: &ProvisioningRequest,
    ) -> Result<ProvisioningPreview, ProvisionError> {
        self.orchestrator.preview(request).await
    }

    /// Whether `database_name` already exists on the server.
    pub async fn check_duplicate(
        &self,
        server_id: &str,
        database_name: &str,
    ) -> Result<bool, AdapterError> {
        let adapter = self.factory.open(server_id, None).await?;
        let exists = adapter.database_exists(database_name).await;
        close(adapter.as_ref(), server_id).await;
        exists
    }

    pub fn validate_sql(&self, sql: &str) -> Result<(), UnsafeSqlError> {
        safety::validate_sql(sql)
    }

    // =========================================================================
    // Sync jobs
    // =========================================================================

    pub fn start_sync(&self, request: SyncRequest) -> Result<String, SyncError> {
        self.sync.start(request)
    }

    pub fn job_status(&self, job_id: &str) -> Option<SyncJob> {
        self.sync.registry().get(job_id)
    }

    pub fn list_jobs(&self) -> Vec<SyncJob> {
        self.sync.registry().list()
    }

    pub fn cancel_job(&self, job_id: &str) -> bool {
        self.sync.registry().request_cancel(job_id)
    }

    pub async fn wait_for_job(&self, job_id: &str) -> Option<SyncJob> {
        self.sync.registry().wait(job_id).await
    }

    pub fn purge_finished_jobs(&self) -> usize {
        self.sync.registry().purge_finished()
    }

    // =========================================================================
    // Catalog helpers
    // =========================================================================

    pub async fn list_databases(&self, server_id: &str) -> Result<Vec<String>, AdapterError> {
        let adapter = self.factory.open(server_id, None).await?;
        let result = adapter.list_databases().await;
        close(adapter.as_ref(), server_id).await;
        result
    }

    pub async fn list_tables(
        &self,
        server_id: &str,
        database: &str,
    ) -> Result<Vec<TableInfo>, AdapterError> {
        let adapter = self.factory.open(server_id, Some(database)).await?;
        let result = adapter.list_tables(database).await;
        close(adapter.as_ref(), server_id).await;
        result
    }

    pub async fn list_remote_links(&self, server_id: &str) -> Result<Vec<String>, AdapterError> {
        let adapter = self.factory.open(server_id, None).await?;
        let result = adapter.list_remote_links().await;
        close(adapter.as_ref(), server_id).await;
        result
    }

    pub async fn test_remote_link(
        &self,
        server_id: &str,
        link_name: &str,
    ) -> Result<(), AdapterError> {
        let adapter = self.factory.open(server_id, None).await?;
        let result = adapter.test_remote_link(link_name).await;
        close(adapter.as_ref(), server_id).await;
        result
    }

    pub async fn list_remote_databases(
        &self,
        server_id: &str,
        link_name: &str,
    ) -> Result<Vec<String>, AdapterError> {
        let adapter = self.factory.open(server_id, None).await?;
        let result = adapter.list_remote_databases(link_name).await;
        close(adapter.as_ref(), server_id).await;
        result
    }
}

async fn close(adapter: &dyn crate::adapter::DatabaseAdapter, server_id: &str) {
    if let Err(e) = adapter.close().await {
        warn!("Closing connection to {} failed: {}", server_id, e);
    }
}
