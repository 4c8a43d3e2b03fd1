use super::{escape_string, Dialect};
use crate::adapter::models::{DbKind, Description, LoginSpec, RemoteInsert, TableName};

/// Databases that are never offered as sync sources over a link.
const SYSTEM_DATABASES: [&str; 4] = ["master", "tempdb", "model", "msdb"];

pub struct MssqlDialect;

impl MssqlDialect {
    fn n(&self, s: &str) -> String {
        format!("N'{}'", escape_string(s))
    }

    fn object_id(&self, table: &TableName) -> String {
        format!("OBJECT_ID({})", self.n(&self.qualify(table)))
    }

    /// Catalog query over `prefix` (`[db].` or `[link].[db].`).
    fn tables_from_catalog(&self, prefix: &str) -> String {
        format!(
            "SELECT s.name AS schema_name, t.name AS table_name, \
                    SUM(p.rows) AS row_count, \
                    CASE WHEN EXISTS (SELECT 1 FROM {p}sys.identity_columns ic WHERE ic.object_id = t.object_id) THEN 1 ELSE 0 END AS has_identity, \
                    CAST(ep.value AS NVARCHAR(4000)) AS description \
             FROM {p}sys.tables t \
             JOIN {p}sys.schemas s ON s.schema_id = t.schema_id \
             JOIN {p}sys.partitions p ON p.object_id = t.object_id AND p.index_id IN (0, 1) \
             LEFT JOIN {p}sys.extended_properties ep ON ep.major_id = t.object_id AND ep.minor_id = 0 \
                    AND ep.class = 1 AND ep.name = 'MS_Description' \
             WHERE t.is_ms_shipped = 0 \
             GROUP BY s.name, t.name, t.object_id, ep.value \
             ORDER BY s.name, t.name",
            p = prefix
        )
    }

    fn schema_filter(&self, table: &TableName) -> String {
        match &table.schema {
            Some(schema) => format!(" AND s.name = {}", self.n(schema)),
            None => String::new(),
        }
    }
}

impl Dialect for MssqlDialect {
    fn kind(&self) -> DbKind {
        DbKind::Mssql
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn string_literal(&self, s: &str) -> String {
        self.n(s)
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        if bytes.is_empty() {
            return "0x".to_string();
        }
        format!("0x{}", super::hex(bytes))
    }

    fn datetime_literal(&self, value: &chrono::NaiveDateTime) -> String {
        format!("'{}'", value.format("%Y-%m-%dT%H:%M:%S%.3f"))
    }

    fn cross_database_catalog(&self) -> bool {
        true
    }

    fn list_databases_sql(&self) -> String {
        "SELECT name FROM sys.databases WHERE database_id > 4 ORDER BY name".to_string()
    }

    fn database_exists_sql(&self, name: &str) -> String {
        format!("SELECT COUNT(*) FROM sys.databases WHERE name = {}", self.n(name))
    }

    fn drop_database_sql(&self, name: &str) -> Vec<String> {
        let db = self.quote_ident(name);
        vec![
            format!(
                "IF DB_ID({}) IS NOT NULL ALTER DATABASE {} SET SINGLE_USER WITH ROLLBACK IMMEDIATE",
                self.n(name),
                db
            ),
            format!("IF DB_ID({}) IS NOT NULL DROP DATABASE {}", self.n(name), db),
        ]
    }

    fn create_login_sql(&self, spec: &LoginSpec) -> Vec<String> {
        let login = self.quote_ident(&spec.login_name);
        let db = self.quote_ident(&spec.database);
        let create_user = format!("CREATE USER {} FOR LOGIN {}", login, login);
        vec![
            format!(
                "CREATE LOGIN {} WITH PASSWORD = {}, DEFAULT_DATABASE = {}, CHECK_POLICY = OFF",
                login,
                self.n(&spec.password),
                db
            ),
            format!("EXEC {}.sys.sp_executesql {}", db, self.n(&create_user)),
            format!(
                "EXEC {}.sys.sp_addrolemember {}, {}",
                db,
                self.n(&spec.role),
                self.n(&spec.login_name)
            ),
        ]
    }

    fn drop_login_sql(&self, login_name: &str) -> Vec<String> {
        vec![format!(
            "IF EXISTS (SELECT 1 FROM sys.server_principals WHERE name = {}) DROP LOGIN {}",
            self.n(login_name),
            self.quote_ident(login_name)
        )]
    }

    fn list_tables_sql(&self, database: &str) -> String {
        self.tables_from_catalog(&format!("{}.", self.quote_ident(database)))
    }

    fn list_columns_sql(&self, database: &str, table: &TableName) -> String {
        format!(
            "SELECT c.name AS column_name, \
                    CASE \
                      WHEN ty.name IN ('varchar', 'char', 'varbinary', 'binary') \
                        THEN ty.name + '(' + CASE WHEN c.max_length = -1 THEN 'max' ELSE CAST(c.max_length AS VARCHAR(10)) END + ')' \
                      WHEN ty.name IN ('nvarchar', 'nchar') \
                        THEN ty.name + '(' + CASE WHEN c.max_length = -1 THEN 'max' ELSE CAST(c.max_length / 2 AS VARCHAR(10)) END + ')' \
                      WHEN ty.name IN ('decimal', 'numeric') \
                        THEN ty.name + '(' + CAST(c.precision AS VARCHAR(10)) + ',' + CAST(c.scale AS VARCHAR(10)) + ')' \
                      WHEN ty.name IN ('datetime2', 'time', 'datetimeoffset') \
                        THEN ty.name + '(' + CAST(c.scale AS VARCHAR(10)) + ')' \
                      ELSE ty.name \
                    END AS data_type, \
                    CAST(c.is_nullable AS INT) AS is_nullable, \
                    CAST(c.is_identity AS INT) AS is_identity, \
                    dc.definition AS column_default \
             FROM {db}.sys.columns c \
             JOIN {db}.sys.tables t ON t.object_id = c.object_id \
             JOIN {db}.sys.schemas s ON s.schema_id = t.schema_id \
             JOIN {db}.sys.types ty ON ty.user_type_id = c.user_type_id \
             LEFT JOIN {db}.sys.default_constraints dc ON dc.object_id = c.default_object_id \
             WHERE t.name = {name}{schema} \
             ORDER BY c.column_id",
            db = self.quote_ident(database),
            name = self.n(&table.name),
            schema = self.schema_filter(table)
        )
    }

    fn list_indexes_sql(&self, table: &TableName) -> String {
        format!(
            "SELECT i.name AS index_name, c.name AS column_name, \
                    CAST(i.is_unique AS INT) AS is_unique, CAST(i.is_primary_key AS INT) AS is_primary \
             FROM sys.indexes i \
             JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
             JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id \
             WHERE i.object_id = {} AND i.type > 0 AND ic.is_included_column = 0 \
             ORDER BY i.index_id, ic.key_ordinal",
            self.object_id(table)
        )
    }

    fn list_descriptions_sql(&self, table: &TableName) -> String {
        format!(
            "SELECT c.name AS column_name, CAST(ep.value AS NVARCHAR(4000)) AS description \
             FROM sys.extended_properties ep \
             LEFT JOIN sys.columns c ON c.object_id = ep.major_id AND c.column_id = ep.minor_id \
             WHERE ep.class = 1 AND ep.name = 'MS_Description' AND ep.major_id = {} \
             ORDER BY ep.minor_id",
            self.object_id(table)
        )
    }

    fn apply_description_sql(&self, description: &Description) -> Option<String> {
        let schema = description.table.schema.as_deref().unwrap_or("dbo");
        let mut sql = format!(
            "EXEC sys.sp_addextendedproperty @name = N'MS_Description', @value = {}, \
             @level0type = N'SCHEMA', @level0name = {}, \
             @level1type = N'TABLE', @level1name = {}",
            self.n(&description.text),
            self.n(schema),
            self.n(&description.table.name)
        );
        if let Some(column) = &description.column {
            sql.push_str(&format!(
                ", @level2type = N'COLUMN', @level2name = {}",
                self.n(column)
            ));
        }
        Some(sql)
    }

    fn identity_clause(&self) -> &'static str {
        "IDENTITY(1,1)"
    }

    fn ensure_schema_sql(&self, schema: &str) -> Option<String> {
        if schema.eq_ignore_ascii_case("dbo") {
            return None;
        }
        let create = format!("CREATE SCHEMA {}", self.quote_ident(schema));
        Some(format!(
            "IF SCHEMA_ID({}) IS NULL EXEC({})",
            self.n(schema),
            self.n(&create)
        ))
    }

    fn identity_insert_sql(&self, table: &TableName, on: bool) -> Option<String> {
        Some(format!(
            "SET IDENTITY_INSERT {} {}",
            self.qualify(table),
            if on { "ON" } else { "OFF" }
        ))
    }

    fn constraints_sql(&self, table: &TableName, enabled: bool) -> Vec<String> {
        let t = self.qualify(table);
        if enabled {
            vec![
                format!("ALTER TABLE {} WITH CHECK CHECK CONSTRAINT ALL", t),
                format!("ALTER TABLE {} ENABLE TRIGGER ALL", t),
            ]
        } else {
            vec![
                format!("ALTER TABLE {} NOCHECK CONSTRAINT ALL", t),
                format!("ALTER TABLE {} DISABLE TRIGGER ALL", t),
            ]
        }
    }

    fn list_remote_links_sql(&self) -> Option<String> {
        Some("SELECT name FROM sys.servers WHERE is_linked = 1 ORDER BY name".to_string())
    }

    fn test_remote_link_sql(&self, link_name: &str) -> Option<String> {
        Some(format!("EXEC sp_testlinkedserver {}", self.n(link_name)))
    }

    fn list_remote_databases_sql(&self, link_name: &str) -> Option<String> {
        let excluded = SYSTEM_DATABASES
            .iter()
            .map(|db| format!("'{}'", db))
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!(
            "SELECT name FROM {}.master.sys.databases WHERE name NOT IN ({}) ORDER BY name",
            self.quote_ident(link_name),
            excluded
        ))
    }

    fn list_remote_tables_sql(&self, link_name: &str, database: &str) -> Option<String> {
        Some(self.tables_from_catalog(&format!(
            "{}.{}.",
            self.quote_ident(link_name),
            self.quote_ident(database)
        )))
    }

    fn remote_insert_sql(&self, insert: &RemoteInsert) -> Option<String> {
        let columns = self.column_list(&insert.columns);
        let schema = insert.table.schema.as_deref().unwrap_or("dbo");
        Some(format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}.{}.{}.{}",
            self.qualify(&insert.table),
            columns,
            columns,
            self.quote_ident(&insert.link_name),
            self.quote_ident(&insert.remote_database),
            self.quote_ident(schema),
            self.quote_ident(&insert.table.name)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::models::SqlValue;

    #[test]
    fn test_quote_ident_escapes_brackets() {
        assert_eq!(MssqlDialect.quote_ident("a]b"), "[a]]b]");
    }

    #[test]
    fn test_unicode_string_literal() {
        assert_eq!(MssqlDialect.literal(&SqlValue::from("법인")), "N'법인'");
        assert_eq!(
            MssqlDialect.literal(&SqlValue::Bytes(vec![0xAB, 0x01])),
            "0xAB01"
        );
    }

    #[test]
    fn test_drop_database_forces_single_user() {
        let sql = MssqlDialect.drop_database_sql("CORP1001");
        assert_eq!(sql.len(), 2);
        assert!(sql[0].contains("SET SINGLE_USER WITH ROLLBACK IMMEDIATE"));
        assert!(sql[1].ends_with("DROP DATABASE [CORP1001]"));
    }

    #[test]
    fn test_create_login_grants_role_in_target_database() {
        let spec = LoginSpec {
            login_name: "CORP1001_user".to_string(),
            password: "pa'ss".to_string(),
            database: "CORP1001".to_string(),
            role: "db_owner".to_string(),
        };
        let sql = MssqlDialect.create_login_sql(&spec);
        assert_eq!(sql.len(), 3);
        assert!(sql[0].contains("PASSWORD = N'pa''ss'"));
        assert!(sql[1].starts_with("EXEC [CORP1001].sys.sp_executesql"));
        assert_eq!(
            sql[2],
            "EXEC [CORP1001].sys.sp_addrolemember N'db_owner', N'CORP1001_user'"
        );
    }

    #[test]
    fn test_constraint_toggle_statements() {
        let table = TableName::with_schema("dbo", "TB_DEPT");
        let off = MssqlDialect.constraints_sql(&table, false);
        assert_eq!(off[0], "ALTER TABLE [dbo].[TB_DEPT] NOCHECK CONSTRAINT ALL");
        assert_eq!(off[1], "ALTER TABLE [dbo].[TB_DEPT] DISABLE TRIGGER ALL");
        let on = MssqlDialect.constraints_sql(&table, true);
        assert_eq!(
            on[0],
            "ALTER TABLE [dbo].[TB_DEPT] WITH CHECK CHECK CONSTRAINT ALL"
        );
    }

    #[test]
    fn test_remote_insert_defaults_to_dbo() {
        let insert = RemoteInsert {
            link_name: "SRC".to_string(),
            remote_database: "TPL01".to_string(),
            table: TableName::new("TB_MENU"),
            columns: vec!["MENU_ID".to_string(), "MENU_NM".to_string()],
            keep_identity: false,
        };
        assert_eq!(
            MssqlDialect.remote_insert_sql(&insert).unwrap(),
            "INSERT INTO [TB_MENU] ([MENU_ID], [MENU_NM]) SELECT [MENU_ID], [MENU_NM] FROM [SRC].[TPL01].[dbo].[TB_MENU]"
        );
    }

    #[test]
    fn test_remote_database_listing_excludes_system_databases() {
        let sql = MssqlDialect.list_remote_databases_sql("SRC").unwrap();
        assert!(sql.contains("[SRC].master.sys.databases"));
        assert!(sql.contains("'tempdb'"));
    }
}
