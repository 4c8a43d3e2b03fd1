#![allow(dead_code)]

use super::constants::*;
use corpdb_manager::adapter::{
    ColumnDef, DbKind, Description, IndexDef, MemoryCluster, SqlValue, TableDef, TableName,
};
use corpdb_manager::config::{ProvisioningSettings, SyncSettings};
use corpdb_manager::external::{CorpInfo, MemoryActivitySink, StaticCorpDirectory};
use corpdb_manager::provisioning::{Orchestrator, ProvisioningRequest};
use corpdb_manager::sync::{JobRegistry, SyncEngine};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn text(s: &str) -> SqlValue {
    SqlValue::from(s)
}

pub fn com_code_table() -> TableDef {
    TableDef {
        table: TableName::with_schema("dbo", "TB_COM_CODE"),
        columns: vec![
            ColumnDef::new("CORP_CD", "varchar(10)").not_null(),
            ColumnDef::new("CODE_GRP", "varchar(20)").not_null(),
            ColumnDef::new("CODE", "varchar(20)").not_null(),
            ColumnDef::new("CODE_NM", "nvarchar(100)"),
        ],
    }
}

pub fn dept_table() -> TableDef {
    TableDef {
        table: TableName::with_schema("dbo", "TB_DEPT"),
        columns: vec![
            ColumnDef::new("SEQ", "int").identity(),
            ColumnDef::new("CORP_CD", "varchar(10)").not_null(),
            ColumnDef::new("DEPT_CD", "varchar(20)").not_null(),
            ColumnDef::new("DEPT_NM", "nvarchar(50)"),
        ],
    }
}

pub fn menu_table() -> TableDef {
    TableDef {
        table: TableName::with_schema("dbo", "TB_MENU"),
        columns: vec![
            ColumnDef::new("MENU_ID", "varchar(20)").not_null(),
            ColumnDef::new("MENU_NM", "nvarchar(50)"),
            ColumnDef::new("SORT_NO", "int"),
        ],
    }
}

pub fn user_table() -> TableDef {
    TableDef {
        table: TableName::with_schema("dbo", "TB_USER"),
        columns: vec![
            ColumnDef::new("USER_ID", "varchar(20)").not_null(),
            ColumnDef::new("USER_NM", "nvarchar(50)"),
            ColumnDef::new("USER_PWD", "varchar(256)"),
            ColumnDef::new("ROLE_CD", "varchar(10)"),
            ColumnDef::new("USE_YN", "char(1)"),
            ColumnDef::new("REG_DT", "datetime"),
        ],
    }
}

pub fn slip_table() -> TableDef {
    TableDef {
        table: TableName::with_schema("dbo", "TB_SLIP"),
        columns: vec![
            ColumnDef::new("SLIP_NO", "varchar(20)").not_null(),
            ColumnDef::new("CORP_CD", "varchar(10)").not_null(),
            ColumnDef::new("AMOUNT", "decimal(18,2)"),
        ],
    }
}

fn com_code_rows(corp: &str) -> Vec<Vec<SqlValue>> {
    [
        ("ACCT", "100", "Cash"),
        ("ACCT", "200", "Receivables"),
        ("SLIP", "N", "Normal"),
        ("SLIP", "R", "Reversal"),
    ]
    .iter()
    .map(|(grp, code, name)| vec![text(corp), text(grp), text(code), text(name)])
    .collect()
}

fn dept_rows(corp: &str) -> Vec<Vec<SqlValue>> {
    [(1, "D100", "Finance"), (2, "D200", "Sales"), (3, "D300", "R&D")]
        .iter()
        .map(|(seq, code, name)| {
            vec![SqlValue::Int(*seq), text(corp), text(code), text(name)]
        })
        .collect()
}

fn menu_rows() -> Vec<Vec<SqlValue>> {
    vec![
        vec![text("M01"), text("Ledger"), SqlValue::Int(1)],
        vec![text("M02"), text("Reports"), SqlValue::Int(2)],
    ]
}

fn slip_rows(corp: &str, count: usize) -> Vec<Vec<SqlValue>> {
    (1..=count)
        .map(|i| {
            vec![
                text(&format!("S{:04}", i)),
                text(corp),
                SqlValue::Float(i as f64 * 1000.0),
            ]
        })
        .collect()
}

// =============================================================================
// Provisioning
// =============================================================================

/// `TPL01` on `SRV1` with five tables whose reference rows carry corp code
/// `0000`, and an empty `SRV2`.
pub fn template_cluster() -> MemoryCluster {
    let cluster = MemoryCluster::new();
    cluster.add_server(TEMPLATE_SERVER, DbKind::Mssql);
    cluster.add_server(TENANT_SERVER, DbKind::Mssql);
    cluster.create_database(TEMPLATE_SERVER, TEMPLATE_DB);

    cluster.add_table(
        TEMPLATE_SERVER,
        TEMPLATE_DB,
        com_code_table(),
        com_code_rows(TEMPLATE_CORP_CODE),
    );
    cluster.add_table(
        TEMPLATE_SERVER,
        TEMPLATE_DB,
        dept_table(),
        dept_rows(TEMPLATE_CORP_CODE),
    );
    cluster.add_table(TEMPLATE_SERVER, TEMPLATE_DB, menu_table(), menu_rows());
    cluster.add_table(TEMPLATE_SERVER, TEMPLATE_DB, user_table(), Vec::new());
    cluster.add_table(
        TEMPLATE_SERVER,
        TEMPLATE_DB,
        slip_table(),
        slip_rows(TEMPLATE_CORP_CODE, 3),
    );

    cluster.add_index(
        TEMPLATE_SERVER,
        TEMPLATE_DB,
        IndexDef {
            table: dept_table().table,
            name: "PK_TB_DEPT".to_string(),
            columns: vec!["SEQ".to_string()],
            unique: true,
            primary: true,
        },
    );
    cluster.add_index(
        TEMPLATE_SERVER,
        TEMPLATE_DB,
        IndexDef {
            table: dept_table().table,
            name: "IX_TB_DEPT_CODE".to_string(),
            columns: vec!["CORP_CD".to_string(), "DEPT_CD".to_string()],
            unique: true,
            primary: false,
        },
    );
    cluster.add_description(
        TEMPLATE_SERVER,
        TEMPLATE_DB,
        Description {
            table: com_code_table().table,
            column: None,
            text: "Common codes".to_string(),
        },
    );
    cluster.add_description(
        TEMPLATE_SERVER,
        TEMPLATE_DB,
        Description {
            table: com_code_table().table,
            column: Some("CODE_NM".to_string()),
            text: "Code name".to_string(),
        },
    );
    cluster
}

pub fn provisioning_settings() -> ProvisioningSettings {
    ProvisioningSettings {
        db_prefix: "CORP".to_string(),
        create_timeout_secs: 2,
        ..Default::default()
    }
}

/// Orchestrator over `cluster` whose corp directory knows `TPL01` as corp
/// `0000`. Activity is collected in the returned sink.
pub fn orchestrator(cluster: &MemoryCluster) -> (Orchestrator, Arc<MemoryActivitySink>) {
    orchestrator_with(cluster, provisioning_settings())
}

pub fn orchestrator_with(
    cluster: &MemoryCluster,
    settings: ProvisioningSettings,
) -> (Orchestrator, Arc<MemoryActivitySink>) {
    let activity = Arc::new(MemoryActivitySink::new());
    let directory = StaticCorpDirectory::new(vec![CorpInfo {
        corp_code: TEMPLATE_CORP_CODE.to_string(),
        corp_name: "Template".to_string(),
        biz_no: None,
        database_name: TEMPLATE_DB.to_string(),
    }]);
    let orchestrator = Orchestrator::new(
        Arc::new(cluster.clone()),
        Arc::new(cluster.clone()),
        settings,
    )
    .with_corp_directory(Arc::new(directory))
    .with_activity_sink(activity.clone())
    .with_poll_interval(Duration::from_millis(10));
    (orchestrator, activity)
}

pub fn provisioning_request() -> ProvisioningRequest {
    ProvisioningRequest::new(
        TEMPLATE_SERVER,
        TEMPLATE_DB,
        TENANT_SERVER,
        CORP_CODE,
        CORP_NAME,
    )
    .with_biz_no("123-45-67890")
}

// =============================================================================
// Sync
// =============================================================================

/// Tenant `CORP1001` on `SRV1` with data, and the same schema as `CORP2002`
/// on `SRV2`. The target `TB_DEPT` holds one stale row. `SRV2` reaches
/// `SRV1` through the link `SRC_LINK`.
pub fn sync_cluster() -> MemoryCluster {
    let cluster = MemoryCluster::new();
    cluster.add_server(TEMPLATE_SERVER, DbKind::Mssql);
    cluster.add_server(TENANT_SERVER, DbKind::Mssql);
    cluster.create_database(TEMPLATE_SERVER, SOURCE_DB);
    cluster.create_database(TENANT_SERVER, TARGET_DB);

    cluster.add_table(TEMPLATE_SERVER, SOURCE_DB, dept_table(), dept_rows(CORP_CODE));
    cluster.add_table(
        TEMPLATE_SERVER,
        SOURCE_DB,
        com_code_table(),
        com_code_rows(CORP_CODE),
    );
    cluster.add_table(TEMPLATE_SERVER, SOURCE_DB, slip_table(), slip_rows(CORP_CODE, 5));

    cluster.add_table(
        TENANT_SERVER,
        TARGET_DB,
        dept_table(),
        vec![vec![
            SqlValue::Int(99),
            text(TARGET_CORP_CODE),
            text("OLD"),
            text("Stale"),
        ]],
    );
    cluster.add_table(TENANT_SERVER, TARGET_DB, com_code_table(), Vec::new());
    cluster.add_table(TENANT_SERVER, TARGET_DB, slip_table(), Vec::new());

    cluster.add_link(TENANT_SERVER, SOURCE_LINK, TEMPLATE_SERVER);
    cluster
}

pub fn sync_tables() -> Vec<TableName> {
    vec![
        dept_table().table,
        com_code_table().table,
        slip_table().table,
    ]
}

pub fn sync_settings(work_dir: &Path) -> SyncSettings {
    SyncSettings {
        batch_size: 2,
        work_dir: work_dir.to_path_buf(),
        use_bcp: false,
        ..Default::default()
    }
}

pub fn sync_engine(
    cluster: &MemoryCluster,
    work_dir: &Path,
) -> (SyncEngine, Arc<MemoryActivitySink>) {
    let activity = Arc::new(MemoryActivitySink::new());
    let engine = SyncEngine::new(
        Arc::new(cluster.clone()),
        Arc::new(cluster.clone()),
        Arc::new(JobRegistry::new()),
        sync_settings(work_dir),
    )
    .with_activity_sink(activity.clone())
    .with_corp_code_columns(vec!["CORP_CD".to_string()]);
    (engine, activity)
}
