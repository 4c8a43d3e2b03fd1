//! End-to-end tests for tenant provisioning
//!
//! Runs the full state machine against an in-memory template server and
//! checks what is left on the target server afterwards.

mod common;

use common::*;
use corpdb_manager::adapter::{AdapterError, SqlValue};
use corpdb_manager::config::ProvisioningSettings;
use corpdb_manager::external::{ActivityKind, ActivityRecord};
use corpdb_manager::options::SectionName;
use corpdb_manager::provisioning::{
    hash_password, ProvisionError, ProvisionStep, ProvisioningOutcome, ProvisioningRequest,
};

#[tokio::test]
async fn test_provision_creates_tenant_from_template() {
    let cluster = template_cluster();
    let (orchestrator, activity) = orchestrator(&cluster);

    let result = orchestrator.provision(&provisioning_request()).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.outcome, ProvisioningOutcome::Created);
    assert_eq!(result.database_name, TENANT_DB);
    assert_eq!(result.table_count, TEMPLATE_TABLE_COUNT);
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    assert_eq!(
        cluster.table_names(TENANT_SERVER, TENANT_DB).len(),
        TEMPLATE_TABLE_COUNT
    );

    // Baseline rows carry the new corp code
    let codes = cluster.rows(TENANT_SERVER, TENANT_DB, "TB_COM_CODE");
    assert_eq!(codes.len(), 4);
    for row in 0..codes.len() {
        assert_eq!(codes.text(row, "CORP_CD").as_deref(), Some(CORP_CODE));
    }
    let depts = cluster.rows(TENANT_SERVER, TENANT_DB, "TB_DEPT");
    assert_eq!(depts.len(), 3);
    assert_eq!(depts.value(0, "SEQ"), Some(&SqlValue::Int(1)));
    assert_eq!(depts.text(2, "CORP_CD").as_deref(), Some(CORP_CODE));
    assert_eq!(cluster.rows(TENANT_SERVER, TENANT_DB, "TB_MENU").len(), 2);

    // Transactional tables come over empty
    assert!(cluster.rows(TENANT_SERVER, TENANT_DB, "TB_SLIP").is_empty());
    assert!(result
        .baseline_tables
        .iter()
        .all(|(table, _)| !table.contains("TB_SLIP")));

    // Indexes and descriptions
    let indexes = cluster.indexes(TENANT_SERVER, TENANT_DB, "TB_DEPT");
    assert_eq!(indexes.len(), 2);
    assert!(indexes[0].primary);
    assert_eq!(
        cluster
            .descriptions(TENANT_SERVER, TENANT_DB, "TB_COM_CODE")
            .len(),
        2
    );

    // Accounts
    let login = result.login_name.clone().unwrap();
    assert!(cluster.login_exists(TENANT_SERVER, &login));
    assert!(result.login_password.is_some());
    assert_eq!(result.admin_user_id.as_deref(), Some("admin"));
    let admin_password = result.admin_password.clone().unwrap();
    let users = cluster.rows(TENANT_SERVER, TENANT_DB, "TB_USER");
    assert_eq!(users.len(), 1);
    assert_eq!(users.text(0, "USER_ID").as_deref(), Some("admin"));
    assert_eq!(
        users.text(0, "USER_PWD"),
        Some(hash_password(&admin_password))
    );
    assert_eq!(users.text(0, "USE_YN").as_deref(), Some("Y"));

    // Nothing was written to the template
    assert!(cluster.writes(TEMPLATE_SERVER).is_empty());

    let verification = result.verification.unwrap();
    assert!(verification.database_exists);
    assert!(verification.failed_sections().is_empty());
    assert_eq!(activity.count(ActivityKind::Provision), 1);
    assert_eq!(activity.count(ActivityKind::Rollback), 0);
}

#[tokio::test]
async fn test_provision_rejects_existing_database_without_writing() {
    let cluster = template_cluster();
    cluster.create_database(TENANT_SERVER, TENANT_DB);
    let (orchestrator, activity) = orchestrator(&cluster);

    let result = orchestrator.provision(&provisioning_request()).await;

    assert!(!result.success);
    assert_eq!(result.outcome, ProvisioningOutcome::NothingCreated);
    assert!(matches!(
        result.error,
        Some(ProvisionError::DuplicateDatabase { .. })
    ));
    assert!(result.rollback.is_none());
    assert!(cluster.writes(TENANT_SERVER).is_empty());
    assert!(cluster.writes(TEMPLATE_SERVER).is_empty());
    assert_eq!(activity.count(ActivityKind::Rollback), 0);
}

#[tokio::test]
async fn test_provision_rejects_unsafe_edited_sql() {
    let cluster = template_cluster();
    let (orchestrator, _activity) = orchestrator(&cluster);
    let request = provisioning_request().with_generated_sql(vec![
        format!("CREATE DATABASE [{}]", TENANT_DB),
        "EXEC master..xp_cmdshell 'dir'".to_string(),
    ]);

    let result = orchestrator.provision(&request).await;

    assert!(!result.success);
    assert_eq!(result.outcome, ProvisioningOutcome::NothingCreated);
    assert_eq!(
        result.error,
        Some(ProvisionError::UnsafeSql {
            keyword: "xp_cmdshell".to_string()
        })
    );
    assert!(cluster.writes(TENANT_SERVER).is_empty());
    assert!(!cluster.database_exists(TENANT_SERVER, TENANT_DB));
}

#[tokio::test]
async fn test_provision_rejects_edited_sql_creating_another_database() {
    let cluster = template_cluster();
    let (orchestrator, _activity) = orchestrator(&cluster);
    let request =
        provisioning_request().with_generated_sql(vec!["CREATE DATABASE [OTHER01]".to_string()]);

    let result = orchestrator.provision(&request).await;

    assert!(matches!(
        result.error,
        Some(ProvisionError::InvalidRequest { .. })
    ));
    assert!(cluster.writes(TENANT_SERVER).is_empty());
    assert!(!cluster.database_exists(TENANT_SERVER, "OTHER01"));
}

#[tokio::test]
async fn test_preview_touches_no_server() {
    let cluster = template_cluster();
    let (orchestrator, _activity) = orchestrator(&cluster);

    let first = orchestrator.preview(&provisioning_request()).await.unwrap();
    let second = orchestrator.preview(&provisioning_request()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.database_name, TENANT_DB);
    assert!(first.script.contains("CREATE DATABASE [CORP1001]"));
    assert!(first.script.contains(CORP_NAME));
    assert!(!first.statements.is_empty());
    assert!(cluster.statements(TENANT_SERVER).is_empty());
    assert!(cluster.statements(TEMPLATE_SERVER).is_empty());
}

#[tokio::test]
async fn test_failed_baseline_copy_rolls_back_database_and_login() {
    let cluster = template_cluster();
    cluster.fail_on(
        "insert_rows dbo.TB_DEPT",
        AdapterError::Query("Arithmetic overflow error".to_string()),
    );
    let (orchestrator, activity) = orchestrator(&cluster);

    let result = orchestrator.provision(&provisioning_request()).await;

    assert!(!result.success);
    assert_eq!(result.outcome, ProvisioningOutcome::RolledBack);
    assert_eq!(
        result.error.as_ref().and_then(|e| e.step()),
        Some(ProvisionStep::CopyBaselineData)
    );
    assert!(result.login_password.is_none());
    assert!(result.admin_password.is_none());

    let rollback = result.rollback.unwrap();
    assert_eq!(rollback.trigger_step, ProvisionStep::CopyBaselineData);
    assert!(rollback.is_complete());
    assert_eq!(rollback.actions.len(), 2);

    assert!(!cluster.database_exists(TENANT_SERVER, TENANT_DB));
    assert!(!cluster.login_exists(TENANT_SERVER, &format!("{}_user", TENANT_DB)));
    assert_eq!(activity.count(ActivityKind::Rollback), 1);
}

#[tokio::test]
async fn test_failed_option_section_is_a_warning() {
    let cluster = template_cluster();
    cluster.fail_on(
        "QUERY_STORE = ON",
        AdapterError::Query("Query Store is not supported on this edition".to_string()),
    );
    let (orchestrator, _activity) = orchestrator(&cluster);

    let result = orchestrator.provision(&provisioning_request()).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.outcome, ProvisioningOutcome::Created);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("query_store"));

    let verification = result.verification.unwrap();
    assert_eq!(verification.failed_sections(), vec![SectionName::QueryStore]);
    let query_store = verification.section(SectionName::QueryStore).unwrap();
    assert!(!query_store.succeeded());
    assert!(query_store.error.as_deref().unwrap().contains("not supported"));
    assert!(verification
        .section(SectionName::Finalize)
        .unwrap()
        .succeeded());
    assert!(cluster.database_exists(TENANT_SERVER, TENANT_DB));
}

fn records_of(records: &[ActivityRecord], kind: ActivityKind) -> Vec<ActivityRecord> {
    records.iter().filter(|r| r.kind == kind).cloned().collect()
}

#[tokio::test]
async fn test_provision_rejects_corp_name_that_ends_the_header_comment() {
    let cluster = template_cluster();
    let (orchestrator, _activity) = orchestrator(&cluster);
    let request = ProvisioningRequest::new(
        TEMPLATE_SERVER,
        TEMPLATE_DB,
        TENANT_SERVER,
        CORP_CODE,
        "Acme\nALTER LOGIN [sa] WITH PASSWORD = 'pwned'",
    );

    let preview = orchestrator.preview(&request).await;
    assert!(matches!(preview, Err(ProvisionError::InvalidRequest { .. })));

    let result = orchestrator.provision(&request).await;
    assert!(!result.success);
    assert_eq!(result.outcome, ProvisioningOutcome::NothingCreated);
    assert!(matches!(
        result.error,
        Some(ProvisionError::InvalidRequest { .. })
    ));
    assert!(cluster
        .statements(TENANT_SERVER)
        .iter()
        .all(|s| !s.contains("ALTER LOGIN")));
    assert!(cluster.writes(TENANT_SERVER).is_empty());
    assert!(!cluster.database_exists(TENANT_SERVER, TENANT_DB));
}

#[tokio::test]
async fn test_provision_rejects_corp_code_with_symbols() {
    let cluster = template_cluster();
    let (orchestrator, _activity) = orchestrator(&cluster);
    let request = ProvisioningRequest::new(
        TEMPLATE_SERVER,
        TEMPLATE_DB,
        TENANT_SERVER,
        "10'01",
        CORP_NAME,
    );

    assert!(orchestrator.preview(&request).await.is_err());
    let result = orchestrator.provision(&request).await;
    assert!(matches!(
        result.error,
        Some(ProvisionError::InvalidRequest { .. })
    ));
    assert!(cluster.writes(TENANT_SERVER).is_empty());
}

#[tokio::test]
async fn test_provision_rejects_edited_sql_creating_an_extra_database() {
    let cluster = template_cluster();
    let (orchestrator, _activity) = orchestrator(&cluster);
    let request = provisioning_request().with_generated_sql(vec![
        format!("CREATE DATABASE [{}]", TENANT_DB),
        "CREATE DATABASE [OTHER01]".to_string(),
    ]);

    let result = orchestrator.provision(&request).await;

    assert_eq!(result.outcome, ProvisioningOutcome::NothingCreated);
    match result.error {
        Some(ProvisionError::InvalidRequest { reason }) => assert!(reason.contains("OTHER01")),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(cluster.writes(TENANT_SERVER).is_empty());
    assert!(!cluster.database_exists(TENANT_SERVER, TENANT_DB));
    assert!(!cluster.database_exists(TENANT_SERVER, "OTHER01"));
}

#[tokio::test]
async fn test_sql_steps_record_statement_excerpts() {
    let cluster = template_cluster();
    let (orchestrator, activity) = orchestrator(&cluster);

    let result = orchestrator.provision(&provisioning_request()).await;
    assert!(result.success, "{:?}", result.error);

    let records = activity.records();
    let expected = [
        (ActivityKind::CreateDatabase, "CREATE DATABASE"),
        (ActivityKind::ConfigureOptions, "ALTER DATABASE"),
        (ActivityKind::CreateAccounts, "CREATE LOGIN"),
        (ActivityKind::CloneSchema, "CREATE TABLE"),
        (ActivityKind::CloneExtendedProperties, "sp_addextendedproperty"),
        (ActivityKind::CloneIndexes, "PRIMARY KEY"),
        (ActivityKind::CopyBaselineData, "INSERT INTO"),
    ];
    for (kind, fragment) in expected {
        let found = records_of(&records, kind);
        assert!(!found.is_empty(), "no {:?} record", kind);
        let excerpts: Vec<String> = found
            .iter()
            .map(|r| {
                r.sql_excerpt
                    .clone()
                    .unwrap_or_else(|| panic!("{:?} has no excerpt", kind))
            })
            .collect();
        assert!(excerpts.iter().any(|e| e.contains(fragment)), "{:?}", kind);
        assert!(excerpts.iter().all(|e| e.chars().count() <= 503), "{:?}", kind);
    }

    // The login password never reaches the audit trail
    let password = result.login_password.unwrap();
    assert!(records
        .iter()
        .filter_map(|r| r.sql_excerpt.as_deref())
        .all(|sql| !sql.contains(&password)));
}

#[tokio::test]
async fn test_failed_create_statement_rolls_back_nothing_left() {
    let cluster = template_cluster();
    cluster.fail_on(
        "CREATE DATABASE [CORP1001]",
        AdapterError::Query("CREATE DATABASE permission denied in database 'master'.".to_string()),
    );
    let (orchestrator, activity) = orchestrator(&cluster);

    let result = orchestrator.provision(&provisioning_request()).await;

    assert_eq!(result.outcome, ProvisioningOutcome::RolledBack);
    assert_eq!(
        result.error.as_ref().and_then(|e| e.step()),
        Some(ProvisionStep::CreateDatabase)
    );
    let rollback = result.rollback.unwrap();
    assert!(rollback.is_complete());
    assert!(rollback.actions.is_empty());
    assert!(!cluster.database_exists(TENANT_SERVER, TENANT_DB));
    assert!(!cluster.login_exists(TENANT_SERVER, &format!("{}_user", TENANT_DB)));

    let create = records_of(&activity.records(), ActivityKind::CreateDatabase);
    assert_eq!(create.len(), 1);
    assert!(!create[0].success);
    assert!(create[0].sql_excerpt.is_some());
}

#[tokio::test]
async fn test_database_that_never_comes_online_is_dropped() {
    let cluster = template_cluster();
    // The duplicate check passes, the readiness poll does not.
    cluster.fail_after(
        "database_exists CORP1001",
        AdapterError::Query("Database 'CORP1001' is in transition.".to_string()),
        1,
        1,
    );
    let settings = ProvisioningSettings {
        create_timeout_secs: 0,
        ..provisioning_settings()
    };
    let (orchestrator, _activity) = orchestrator_with(&cluster, settings);

    let result = orchestrator.provision(&provisioning_request()).await;

    assert_eq!(result.outcome, ProvisioningOutcome::RolledBack);
    assert!(matches!(result.error, Some(ProvisionError::Timeout { .. })));
    let rollback = result.rollback.unwrap();
    assert_eq!(rollback.trigger_step, ProvisionStep::CreateDatabase);
    assert!(rollback.is_complete());
    assert_eq!(rollback.actions.len(), 1);
    assert!(!cluster.database_exists(TENANT_SERVER, TENANT_DB));
}

#[tokio::test]
async fn test_failed_user_mapping_leaves_no_login() {
    let cluster = template_cluster();
    cluster.fail_on(
        "create_user",
        AdapterError::Query(
            "User, group, or role 'CORP1001_user' already exists in the current database."
                .to_string(),
        ),
    );
    let (orchestrator, activity) = orchestrator(&cluster);

    let result = orchestrator.provision(&provisioning_request()).await;

    assert_eq!(result.outcome, ProvisioningOutcome::RolledBack);
    assert_eq!(
        result.error.as_ref().and_then(|e| e.step()),
        Some(ProvisionStep::CreateAccounts)
    );
    assert!(result.rollback.unwrap().is_complete());
    assert!(!cluster.database_exists(TENANT_SERVER, TENANT_DB));
    assert!(!cluster.login_exists(TENANT_SERVER, &format!("{}_user", TENANT_DB)));
    assert_eq!(activity.count(ActivityKind::Rollback), 1);
}

#[tokio::test]
async fn test_failed_schema_clone_rolls_back_database_and_login() {
    let cluster = template_cluster();
    cluster.fail_on(
        "create_table dbo.TB_MENU",
        AdapterError::Query("There is already an object named 'TB_MENU' in the database.".to_string()),
    );
    let (orchestrator, activity) = orchestrator(&cluster);

    let result = orchestrator.provision(&provisioning_request()).await;

    assert_eq!(result.outcome, ProvisioningOutcome::RolledBack);
    let rollback = result.rollback.unwrap();
    assert_eq!(rollback.trigger_step, ProvisionStep::CloneSchema);
    assert!(rollback.is_complete());
    assert_eq!(rollback.actions.len(), 2);
    assert!(!cluster.database_exists(TENANT_SERVER, TENANT_DB));
    assert!(!cluster.login_exists(TENANT_SERVER, &format!("{}_user", TENANT_DB)));

    let clone = records_of(&activity.records(), ActivityKind::CloneSchema);
    assert_eq!(clone.len(), 1);
    assert!(!clone[0].success);
    assert!(clone[0].sql_excerpt.as_deref().unwrap().contains("TB_MENU"));
}

#[tokio::test]
async fn test_failed_verification_is_only_a_warning() {
    let cluster = template_cluster();
    // The admin account step lists tables first; the verification pass is second.
    cluster.fail_after(
        "list_tables CORP1001",
        AdapterError::Query("Login timeout expired".to_string()),
        1,
        1,
    );
    let (orchestrator, activity) = orchestrator(&cluster);

    let result = orchestrator.provision(&provisioning_request()).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.outcome, ProvisioningOutcome::Created);
    assert!(result.rollback.is_none());
    assert!(result
        .warnings
        .iter()
        .any(|w| w.starts_with("Verification could not list tables")));
    let verify = result.steps.last().unwrap();
    assert_eq!(verify.step, ProvisionStep::Verify);
    assert!(!verify.success);
    assert!(cluster.database_exists(TENANT_SERVER, TENANT_DB));
    assert_eq!(activity.count(ActivityKind::Rollback), 0);
}
