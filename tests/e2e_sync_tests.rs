//! End-to-end tests for the sync engine
//!
//! Each strategy is run as a background job between two in-memory servers,
//! then the job record and the target tables are checked.

mod common;

use common::*;
use corpdb_manager::adapter::{SqlValue, TableName};
use corpdb_manager::external::ActivityKind;
use corpdb_manager::sync::{
    JobStatus, SyncError, SyncOptions, SyncRequest, SyncStrategy, TableSpec, TableStatus,
    NO_SUBSTITUTION_NOTICE,
};
use std::time::Duration;
use tempfile::TempDir;

fn request(strategy: SyncStrategy) -> SyncRequest {
    SyncRequest::new(TEMPLATE_SERVER, SOURCE_DB, TENANT_SERVER, TARGET_DB, strategy)
        .with_tables(sync_tables().into_iter().map(TableSpec::insert).collect())
}

fn with_corp_codes(request: SyncRequest) -> SyncRequest {
    request.with_options(SyncOptions {
        source_corp_code: Some(CORP_CODE.to_string()),
        target_corp_code: Some(TARGET_CORP_CODE.to_string()),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_row_copy_replaces_target_and_substitutes_corp_code() {
    let cluster = sync_cluster();
    let work_dir = TempDir::new().unwrap();
    let (engine, activity) = sync_engine(&cluster, work_dir.path());

    let job = engine
        .run(with_corp_codes(request(SyncStrategy::RowCopy)))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.tables);
    assert_eq!(job.success_count(), 3);
    assert_eq!(job.progress_percent(), 100);
    assert!(job.finished_at.is_some());

    let dept = &job.tables[0];
    assert_eq!(dept.rows_copied, 3);
    assert_eq!(dept.rows_replaced, 3);
    assert_eq!(dept.source_row_count, Some(3));
    assert_eq!(dept.target_row_count, Some(3));
    assert_eq!(job.tables[2].rows_copied, 5);

    // The stale target row is gone and identity values came over
    let rows = cluster.rows(TENANT_SERVER, TARGET_DB, "TB_DEPT");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.value(0, "SEQ"), Some(&SqlValue::Int(1)));
    for row in 0..rows.len() {
        assert_eq!(rows.text(row, "CORP_CD").as_deref(), Some(TARGET_CORP_CODE));
    }

    // Source rows are untouched
    let source = cluster.rows(TEMPLATE_SERVER, SOURCE_DB, "TB_COM_CODE");
    assert_eq!(source.text(0, "CORP_CD").as_deref(), Some(CORP_CODE));

    // Five slips in batches of two
    let writes = cluster.writes(TENANT_SERVER);
    assert_eq!(
        writes
            .iter()
            .filter(|w| w.starts_with("insert_rows dbo.TB_SLIP"))
            .count(),
        3
    );
    assert!(cluster.writes(TEMPLATE_SERVER).is_empty());
    assert_eq!(activity.count(ActivityKind::Sync), 1);
}

#[tokio::test]
async fn test_row_count_mismatch_fails_only_that_table() {
    let cluster = sync_cluster();
    cluster.skew_count(
        TENANT_SERVER,
        TableName::with_schema("dbo", "TB_COM_CODE"),
        1,
    );
    let work_dir = TempDir::new().unwrap();
    let (engine, activity) = sync_engine(&cluster, work_dir.path());

    let job = engine.run(request(SyncStrategy::RowCopy)).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.tables[0].status, TableStatus::Success);
    assert_eq!(job.tables[2].status, TableStatus::Success);

    let codes = &job.tables[1];
    assert_eq!(codes.status, TableStatus::Failed);
    assert_eq!(codes.source_row_count, Some(4));
    assert_eq!(codes.target_row_count, Some(5));
    assert_eq!(
        codes.error_message.as_deref(),
        Some("Row count mismatch: source 4, target 5")
    );

    let records = activity.records();
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
}

#[tokio::test]
async fn test_export_import_moves_tables_through_files() {
    let cluster = sync_cluster();
    let work_dir = TempDir::new().unwrap();
    let (engine, _activity) = sync_engine(&cluster, work_dir.path());

    let job = engine
        .run(with_corp_codes(request(SyncStrategy::ExportImport)))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.tables);
    assert_eq!(job.tables[2].rows_copied, 5);
    assert!(job
        .notices
        .iter()
        .any(|n| n.contains("corp codes are not substituted")));

    // Rows arrive unchanged
    let rows = cluster.rows(TENANT_SERVER, TARGET_DB, "TB_DEPT");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.text(0, "CORP_CD").as_deref(), Some(CORP_CODE));

    for table in ["TB_DEPT", "TB_COM_CODE", "TB_SLIP"] {
        assert!(cluster.constraints_enabled(TENANT_SERVER, TARGET_DB, table));
    }
    assert_eq!(std::fs::read_dir(work_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_cancel_export_import_finishes_current_table() {
    let cluster = sync_cluster();
    cluster.delay_on("select_rows dbo.TB_DEPT", Duration::from_millis(300));
    let work_dir = TempDir::new().unwrap();
    let (engine, _activity) = sync_engine(&cluster, work_dir.path());
    let registry = engine.registry().clone();

    let job_id = engine.start(request(SyncStrategy::ExportImport)).unwrap();

    let mut started = false;
    for _ in 0..100 {
        let job = registry.get(&job_id).unwrap();
        if job.tables[0].status == TableStatus::Running {
            started = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(started);
    assert!(!cluster.constraints_enabled(TENANT_SERVER, TARGET_DB, "TB_DEPT"));

    assert!(registry.request_cancel(&job_id));
    assert_eq!(
        registry.get(&job_id).unwrap().status,
        JobStatus::Cancelling
    );

    let job = registry.wait(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.cancel_requested);
    assert_eq!(job.tables[0].status, TableStatus::Success);
    assert_eq!(job.tables[1].status, TableStatus::Skipped);
    assert_eq!(job.tables[2].status, TableStatus::Skipped);
    assert!(cluster.rows(TENANT_SERVER, TARGET_DB, "TB_SLIP").is_empty());

    // Constraints are restored on every disabled table
    for table in ["TB_DEPT", "TB_COM_CODE", "TB_SLIP"] {
        assert!(cluster.constraints_enabled(TENANT_SERVER, TARGET_DB, table));
    }
    assert!(!registry.request_cancel(&job_id));
}

#[tokio::test]
async fn test_remote_direct_copies_through_link() {
    let cluster = sync_cluster();
    let work_dir = TempDir::new().unwrap();
    let (engine, _activity) = sync_engine(&cluster, work_dir.path());

    let job = engine
        .run(with_corp_codes(request(SyncStrategy::RemoteDirect)).with_link(SOURCE_LINK))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.tables);
    assert_eq!(job.notices, vec![NO_SUBSTITUTION_NOTICE.to_string()]);

    let dept = &job.tables[0];
    assert_eq!(dept.rows_copied, 3);
    assert_eq!(dept.source_row_count, Some(3));
    assert_eq!(dept.target_row_count, None);
    assert_eq!(dept.rows_replaced, 0);

    let rows = cluster.rows(TENANT_SERVER, TARGET_DB, "TB_DEPT");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.text(0, "CORP_CD").as_deref(), Some(CORP_CODE));

    // The source is only ever reached through the link
    assert!(cluster.statements(TEMPLATE_SERVER).is_empty());
    assert!(cluster
        .writes(TENANT_SERVER)
        .iter()
        .any(|w| w.starts_with("insert_from_remote dbo.TB_SLIP FROM SRC_LINK")));
}

#[tokio::test]
async fn test_remote_direct_with_unknown_link_fails_every_table() {
    let cluster = sync_cluster();
    let work_dir = TempDir::new().unwrap();
    let (engine, _activity) = sync_engine(&cluster, work_dir.path());

    let job = engine
        .run(request(SyncStrategy::RemoteDirect).with_link("NO_SUCH_LINK"))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.unwrap().contains("NO_SUCH_LINK"));
    assert!(job
        .tables
        .iter()
        .all(|t| t.status == TableStatus::Skipped));
}

#[tokio::test]
async fn test_remote_direct_requires_link() {
    let cluster = sync_cluster();
    let work_dir = TempDir::new().unwrap();
    let (engine, _activity) = sync_engine(&cluster, work_dir.path());

    let result = engine.start(request(SyncStrategy::RemoteDirect));

    assert!(matches!(result, Err(SyncError::InvalidRequest(_))));
    assert!(engine.registry().is_empty());
}

#[tokio::test]
async fn test_delete_action_removes_target_corp_rows() {
    let cluster = sync_cluster();
    let work_dir = TempDir::new().unwrap();
    let (engine, _activity) = sync_engine(&cluster, work_dir.path());
    let request = with_corp_codes(
        SyncRequest::new(
            TEMPLATE_SERVER,
            SOURCE_DB,
            TENANT_SERVER,
            TARGET_DB,
            SyncStrategy::RowCopy,
        )
        .with_tables(vec![TableSpec::delete(TableName::with_schema(
            "dbo", "TB_DEPT",
        ))]),
    );

    let job = engine.run(request).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.tables[0].rows_deleted, 1);
    assert_eq!(job.tables[0].target_row_count, Some(0));
    assert!(cluster.rows(TENANT_SERVER, TARGET_DB, "TB_DEPT").is_empty());
    assert_eq!(cluster.rows(TEMPLATE_SERVER, SOURCE_DB, "TB_DEPT").len(), 3);
}

#[tokio::test]
async fn test_jobs_are_listed_and_purged() {
    let cluster = sync_cluster();
    let work_dir = TempDir::new().unwrap();
    let (engine, _activity) = sync_engine(&cluster, work_dir.path());

    let first = engine.run(request(SyncStrategy::RowCopy)).await.unwrap();
    let second = engine.run(request(SyncStrategy::ExportImport)).await.unwrap();

    let jobs = engine.registry().list();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].job_id, first.job_id);
    assert_eq!(jobs[1].job_id, second.job_id);

    assert_eq!(engine.registry().purge_finished(), 2);
    assert!(engine.registry().is_empty());
}
