use super::{escape_string, Dialect};
use crate::adapter::models::{DbKind, Description, LoginSpec, TableDef, TableName};

const SYSTEM_SCHEMAS: &str = "'mysql', 'information_schema', 'performance_schema', 'sys'";

pub struct MysqlDialect;

impl MysqlDialect {
    fn account(&self, login_name: &str) -> String {
        format!("'{}'@'%'", escape_string(login_name))
    }

    fn schema_expr(&self, table: &TableName) -> String {
        match &table.schema {
            Some(schema) => format!("'{}'", escape_string(schema)),
            None => "DATABASE()".to_string(),
        }
    }
}

impl Dialect for MysqlDialect {
    fn kind(&self) -> DbKind {
        DbKind::Mysql
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn string_literal(&self, s: &str) -> String {
        format!("'{}'", escape_string(s).replace('\\', "\\\\"))
    }

    fn cross_database_catalog(&self) -> bool {
        true
    }

    fn list_databases_sql(&self) -> String {
        format!(
            "SELECT schema_name AS name FROM information_schema.schemata \
             WHERE schema_name NOT IN ({}) ORDER BY schema_name",
            SYSTEM_SCHEMAS
        )
    }

    fn database_exists_sql(&self, name: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM information_schema.schemata WHERE schema_name = '{}'",
            escape_string(name)
        )
    }

    fn drop_database_sql(&self, name: &str) -> Vec<String> {
        vec![format!("DROP DATABASE IF EXISTS {}", self.quote_ident(name))]
    }

    fn create_login_sql(&self, spec: &LoginSpec) -> Vec<String> {
        let account = self.account(&spec.login_name);
        vec![
            format!(
                "CREATE USER {} IDENTIFIED BY '{}'",
                account,
                escape_string(&spec.password)
            ),
            format!(
                "GRANT ALL PRIVILEGES ON {}.* TO {}",
                self.quote_ident(&spec.database),
                account
            ),
        ]
    }

    fn drop_login_sql(&self, login_name: &str) -> Vec<String> {
        vec![format!("DROP USER IF EXISTS {}", self.account(login_name))]
    }

    // MySQL databases are schemas: tables are reported unqualified so they can be
    // recreated in another database as-is.
    fn list_tables_sql(&self, database: &str) -> String {
        format!(
            "SELECT NULL AS schema_name, table_name AS table_name, table_rows AS row_count, \
                    CASE WHEN auto_increment IS NULL THEN 0 ELSE 1 END AS has_identity, \
                    NULLIF(table_comment, '') AS description \
             FROM information_schema.tables \
             WHERE table_schema = '{}' AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
            escape_string(database)
        )
    }

    fn list_columns_sql(&self, database: &str, table: &TableName) -> String {
        format!(
            "SELECT column_name AS column_name, column_type AS data_type, \
                    CASE WHEN is_nullable = 'YES' THEN 1 ELSE 0 END AS is_nullable, \
                    CASE WHEN extra LIKE '%auto_increment%' THEN 1 ELSE 0 END AS is_identity, \
                    CASE WHEN column_default IS NULL THEN NULL \
                         WHEN column_default REGEXP '^-?[0-9.]+$' OR column_default LIKE 'CURRENT_TIMESTAMP%' \
                           THEN column_default \
                         ELSE CONCAT('''', REPLACE(column_default, '''', ''''''), '''') END AS column_default \
             FROM information_schema.columns \
             WHERE table_schema = '{}' AND table_name = '{}' \
             ORDER BY ordinal_position",
            escape_string(database),
            escape_string(&table.name)
        )
    }

    fn list_indexes_sql(&self, table: &TableName) -> String {
        format!(
            "SELECT index_name AS index_name, column_name AS column_name, \
                    CASE WHEN non_unique = 0 THEN 1 ELSE 0 END AS is_unique, \
                    CASE WHEN index_name = 'PRIMARY' THEN 1 ELSE 0 END AS is_primary \
             FROM information_schema.statistics \
             WHERE table_schema = {} AND table_name = '{}' \
             ORDER BY index_name, seq_in_index",
            self.schema_expr(table),
            escape_string(&table.name)
        )
    }

    fn list_descriptions_sql(&self, table: &TableName) -> String {
        let schema = self.schema_expr(table);
        let name = escape_string(&table.name);
        format!(
            "SELECT NULL AS column_name, table_comment AS description \
             FROM information_schema.tables \
             WHERE table_schema = {schema} AND table_name = '{name}' AND table_comment <> '' \
             UNION ALL \
             SELECT column_name, column_comment \
             FROM information_schema.columns \
             WHERE table_schema = {schema} AND table_name = '{name}' AND column_comment <> ''"
        )
    }

    // Column comments need the full column definition to be restated.
    fn apply_description_sql(&self, description: &Description) -> Option<String> {
        if description.column.is_some() {
            return None;
        }
        Some(format!(
            "ALTER TABLE {} COMMENT = '{}'",
            self.qualify(&description.table),
            escape_string(&description.text)
        ))
    }

    fn identity_clause(&self) -> &'static str {
        "AUTO_INCREMENT"
    }

    // An AUTO_INCREMENT column must be indexed at creation time.
    fn table_constraints_sql(&self, def: &TableDef) -> Vec<String> {
        def.columns
            .iter()
            .filter(|c| c.is_identity)
            .map(|c| format!("KEY ({})", self.quote_ident(&c.name)))
            .collect()
    }

    fn create_index_sql(&self, index: &crate::adapter::models::IndexDef) -> String {
        let columns = self.column_list(&index.columns);
        if index.primary {
            format!(
                "ALTER TABLE {} ADD PRIMARY KEY ({})",
                self.qualify(&index.table),
                columns
            )
        } else {
            format!(
                "CREATE {}INDEX {} ON {} ({})",
                if index.unique { "UNIQUE " } else { "" },
                self.quote_ident(&index.name),
                self.qualify(&index.table),
                columns
            )
        }
    }

    fn session_constraints_sql(&self, enabled: bool) -> Option<String> {
        Some(format!(
            "SET FOREIGN_KEY_CHECKS = {}",
            if enabled { 1 } else { 0 }
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::models::{ColumnDef, IndexDef, SqlValue};

    #[test]
    fn test_string_literal_escapes_backslash() {
        assert_eq!(
            MysqlDialect.literal(&SqlValue::from("a\\b'c")),
            "'a\\\\b''c'"
        );
    }

    #[test]
    fn test_auto_increment_column_gets_key() {
        let def = TableDef {
            table: TableName::new("TB_MENU"),
            columns: vec![
                ColumnDef::new("MENU_ID", "int").identity(),
                ColumnDef::new("MENU_NM", "varchar(100)"),
            ],
        };
        let sql = MysqlDialect.create_table_sql(&def);
        assert_eq!(sql.len(), 1);
        assert!(sql[0].contains("`MENU_ID` int AUTO_INCREMENT NOT NULL"));
        assert!(sql[0].contains("KEY (`MENU_ID`)"));
    }

    #[test]
    fn test_primary_key_uses_unnamed_constraint() {
        let index = IndexDef {
            table: TableName::new("TB_MENU"),
            name: "PRIMARY".to_string(),
            columns: vec!["MENU_ID".to_string()],
            unique: true,
            primary: true,
        };
        assert_eq!(
            MysqlDialect.create_index_sql(&index),
            "ALTER TABLE `TB_MENU` ADD PRIMARY KEY (`MENU_ID`)"
        );
    }

    #[test]
    fn test_column_description_is_not_applied() {
        let description = Description {
            table: TableName::new("TB_MENU"),
            column: Some("MENU_NM".to_string()),
            text: "menu".to_string(),
        };
        assert!(MysqlDialect.apply_description_sql(&description).is_none());
    }
}
