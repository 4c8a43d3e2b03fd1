//! In-memory store of sync jobs.

use super::models::{JobStatus, SyncJob, SyncRequest};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct JobEntry {
    job: Mutex<SyncJob>,
    cancellation_token: CancellationToken,
    finished: Notify,
}

impl JobEntry {
    fn lock(&self) -> MutexGuard<'_, SyncJob> {
        self.job.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Jobs by id. Each job has its own lock; callers only ever see snapshots.
///
/// Jobs are kept until [`JobRegistry::purge_finished`] drops the terminal ones.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<JobEntry>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, job_id: &str) -> Option<Arc<JobEntry>> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(job_id)
            .cloned()
    }

    /// Creates a pending job for `request` and returns its id with the token
    /// the runner polls for cancellation.
    pub fn register(&self, request: &SyncRequest) -> (String, CancellationToken) {
        let job_id = uuid::Uuid::new_v4().to_string();
        let token = CancellationToken::new();
        let entry = Arc::new(JobEntry {
            job: Mutex::new(SyncJob::new(job_id.clone(), request)),
            cancellation_token: token.clone(),
            finished: Notify::new(),
        });
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id.clone(), entry);
        debug!("Registered sync job {}", job_id);
        (job_id, token)
    }

    pub fn get(&self, job_id: &str) -> Option<SyncJob> {
        self.entry(job_id).map(|entry| entry.lock().clone())
    }

    /// Snapshots of every job, oldest first.
    pub fn list(&self) -> Vec<SyncJob> {
        let entries: Vec<Arc<JobEntry>> = self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        let mut jobs: Vec<SyncJob> = entries.iter().map(|e| e.lock().clone()).collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    /// Applies `f` to the job under its lock.
    pub fn update<R>(&self, job_id: &str, f: impl FnOnce(&mut SyncJob) -> R) -> Option<R> {
        let entry = self.entry(job_id)?;
        let mut job = entry.lock();
        Some(f(&mut job))
    }

    /// Asks a job to stop at the next table boundary.
    ///
    /// Returns `false` for unknown jobs and for jobs that already finished.
    pub fn request_cancel(&self, job_id: &str) -> bool {
        let Some(entry) = self.entry(job_id) else {
            return false;
        };
        let mut job = entry.lock();
        if job.status.is_terminal() {
            return false;
        }
        job.cancel_requested = true;
        job.status = JobStatus::Cancelling;
        entry.cancellation_token.cancel();
        info!("Cancellation requested for sync job {}", job_id);
        true
    }

    /// Stores the final status and wakes everyone waiting on the job.
    pub fn finish(&self, job_id: &str, status: JobStatus, error_message: Option<String>) {
        let Some(entry) = self.entry(job_id) else {
            return;
        };
        {
            let mut job = entry.lock();
            job.status = status;
            job.finished_at = Some(chrono::Utc::now());
            if error_message.is_some() {
                job.error_message = error_message;
            }
        }
        entry.finished.notify_waiters();
    }

    /// Waits until the job reaches a terminal status and returns it.
    pub async fn wait(&self, job_id: &str) -> Option<SyncJob> {
        let entry = self.entry(job_id)?;
        loop {
            let notified = entry.finished.notified();
            {
                let job = entry.lock();
                if job.status.is_terminal() {
                    return Some(job.clone());
                }
            }
            notified.await;
        }
    }

    /// Drops terminal jobs. Returns how many were removed.
    pub fn purge_finished(&self) -> usize {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let before = jobs.len();
        jobs.retain(|_, entry| !entry.lock().status.is_terminal());
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::TableName;
    use crate::sync::models::{SyncStrategy, TableSpec};
    use std::time::Duration;

    fn request() -> SyncRequest {
        SyncRequest::new("SRV1", "CORP1001", "SRV2", "CORP1001", SyncStrategy::RowCopy)
            .with_tables(vec![TableSpec::insert(TableName::new("TB_DEPT"))])
    }

    #[test]
    fn test_register_and_snapshot() {
        let registry = JobRegistry::new();
        let (id, _) = registry.register(&request());

        let job = registry.get(&id).unwrap();
        assert_eq!(job.job_id, id);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(uuid::Uuid::parse_str(&id).is_ok());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_cancel_sets_flag_and_token() {
        let registry = JobRegistry::new();
        let (id, token) = registry.register(&request());

        assert!(registry.request_cancel(&id));
        assert!(token.is_cancelled());
        let job = registry.get(&id).unwrap();
        assert!(job.cancel_requested);
        assert_eq!(job.status, JobStatus::Cancelling);

        assert!(!registry.request_cancel("missing"));
    }

    #[test]
    fn test_cancel_after_finish_is_refused() {
        let registry = JobRegistry::new();
        let (id, token) = registry.register(&request());
        registry.finish(&id, JobStatus::Completed, None);

        assert!(!registry.request_cancel(&id));
        assert!(!token.is_cancelled());
        assert_eq!(registry.get(&id).unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn test_purge_keeps_running_jobs() {
        let registry = JobRegistry::new();
        let (done, _) = registry.register(&request());
        let (running, _) = registry.register(&request());
        registry.finish(&done, JobStatus::Failed, Some("boom".to_string()));
        registry.update(&running, |job| job.status = JobStatus::Running);

        assert_eq!(registry.purge_finished(), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&running).is_some());
    }

    #[tokio::test]
    async fn test_wait_returns_when_finished() {
        let registry = Arc::new(JobRegistry::new());
        let (id, _) = registry.register(&request());

        let waiter = {
            let registry = registry.clone();
            let id = id.clone();
            tokio::spawn(async move { registry.wait(&id).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.finish(&id, JobStatus::Completed, None);

        let job = waiter.await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.finished_at.is_some());
    }
}
