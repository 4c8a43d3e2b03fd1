//! Corp-code directory: which corp owns which accounting database.

use crate::adapter::dialect::dialect_for;
use crate::adapter::{AdapterError, AdapterFactory, RowFilter, TableName};
use crate::config::CorpDirectorySettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpInfo {
    pub corp_code: String,
    pub corp_name: String,
    #[serde(default)]
    pub biz_no: Option<String>,
    pub database_name: String,
}

#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait CorpDirectory: Send + Sync {
    async fn lookup_corp_by_database_name(
        &self,
        database_name: &str,
    ) -> Result<Option<CorpInfo>, AdapterError>;
}

/// Directory over a fixed list of corps.
#[derive(Debug, Clone, Default)]
pub struct StaticCorpDirectory {
    entries: Vec<CorpInfo>,
}

impl StaticCorpDirectory {
    pub fn new(entries: Vec<CorpInfo>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl CorpDirectory for StaticCorpDirectory {
    async fn lookup_corp_by_database_name(
        &self,
        database_name: &str,
    ) -> Result<Option<CorpInfo>, AdapterError> {
        Ok(self
            .entries
            .iter()
            .find(|e| e.database_name.eq_ignore_ascii_case(database_name))
            .cloned())
    }
}

/// Directory backed by the corp table of the main database.
pub struct MainDbCorpDirectory {
    factory: Arc<dyn AdapterFactory>,
    settings: CorpDirectorySettings,
}

impl MainDbCorpDirectory {
    pub fn new(factory: Arc<dyn AdapterFactory>, settings: CorpDirectorySettings) -> Self {
        Self { factory, settings }
    }
}

#[async_trait]
impl CorpDirectory for MainDbCorpDirectory {
    async fn lookup_corp_by_database_name(
        &self,
        database_name: &str,
    ) -> Result<Option<CorpInfo>, AdapterError> {
        let (server_id, main_database) = match (
            self.settings.main_server_id.as_deref(),
            self.settings.main_database.as_deref(),
        ) {
            (Some(server), Some(database)) => (server, database),
            _ => {
                warn!("Corp directory has no main database configured");
                return Ok(None);
            }
        };

        let adapter = self.factory.open(server_id, Some(main_database)).await?;
        let dialect = dialect_for(adapter.kind());
        let s = &self.settings;
        let columns = vec![
            s.code_column.clone(),
            s.name_column.clone(),
            s.biz_no_column.clone(),
            s.database_column.clone(),
        ];
        let filter = RowFilter::equals(s.database_column.clone(), database_name);
        let sql = format!(
            "{}{}",
            dialect.select_sql(&TableName::parse(&s.table), &columns),
            dialect.where_clause(Some(&filter))
        );
        debug!("Corp lookup: {}", sql);

        let result = adapter.query(&sql).await;
        let _ = adapter.close().await;
        let rows = result?;
        if rows.is_empty() {
            return Ok(None);
        }

        Ok(Some(CorpInfo {
            corp_code: rows.text(0, &s.code_column).unwrap_or_default(),
            corp_name: rows.text(0, &s.name_column).unwrap_or_default(),
            biz_no: rows.text(0, &s.biz_no_column),
            database_name: rows
                .text(0, &s.database_column)
                .unwrap_or_else(|| database_name.to_string()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{DbKind, MemoryCluster, RowSet, SqlValue};

    fn corp(code: &str, db: &str) -> CorpInfo {
        CorpInfo {
            corp_code: code.to_string(),
            corp_name: format!("Corp {}", code),
            biz_no: None,
            database_name: db.to_string(),
        }
    }

    #[tokio::test]
    async fn test_static_lookup_ignores_case() {
        let directory = StaticCorpDirectory::new(vec![corp("0000", "TPL01"), corp("1001", "CORP1001")]);
        let found = directory.lookup_corp_by_database_name("tpl01").await.unwrap();
        assert_eq!(found.map(|c| c.corp_code), Some("0000".to_string()));
        assert!(directory
            .lookup_corp_by_database_name("OTHER")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_main_db_lookup_without_settings_returns_none() {
        let cluster = Arc::new(MemoryCluster::new());
        let directory = MainDbCorpDirectory::new(cluster, CorpDirectorySettings::default());
        assert!(directory
            .lookup_corp_by_database_name("TPL01")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_main_db_lookup_reads_corp_row() {
        let cluster = Arc::new(MemoryCluster::new());
        cluster.add_server("main", DbKind::Mssql);
        cluster.create_database("main", "MAINDB");
        cluster.stub_query(
            "COMS_CMPNY",
            RowSet::new(
                vec![
                    "CORP_CD".to_string(),
                    "CORP_NM".to_string(),
                    "SAUPNO".to_string(),
                    "ACC_DB_NAME".to_string(),
                ],
                vec![vec![
                    SqlValue::from("0000"),
                    SqlValue::from("Template Corp"),
                    SqlValue::Null,
                    SqlValue::from("TPL01"),
                ]],
            ),
        );
        let settings = CorpDirectorySettings {
            main_server_id: Some("main".to_string()),
            main_database: Some("MAINDB".to_string()),
            ..Default::default()
        };
        let directory = MainDbCorpDirectory::new(cluster.clone(), settings);

        let found = directory
            .lookup_corp_by_database_name("TPL01")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.corp_code, "0000");
        assert_eq!(found.corp_name, "Template Corp");
        assert_eq!(found.biz_no, None);

        let log = cluster.statements("main");
        assert!(log
            .iter()
            .any(|sql| sql.contains("[ACC_DB_NAME] = N'TPL01'")));
    }
}
