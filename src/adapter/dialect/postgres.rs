use super::{escape_string, Dialect};
use crate::adapter::models::{DbKind, Description, LoginSpec, TableName};

pub struct PostgresDialect;

impl PostgresDialect {
    fn schema_of<'a>(&self, table: &'a TableName) -> &'a str {
        table.schema.as_deref().unwrap_or("public")
    }
}

impl Dialect for PostgresDialect {
    fn kind(&self) -> DbKind {
        DbKind::Postgres
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        format!("'\\x{}'::bytea", super::hex(bytes))
    }

    fn bool_literal(&self, value: bool) -> String {
        let literal = if value { "TRUE" } else { "FALSE" };
        literal.to_string()
    }

    fn list_databases_sql(&self) -> String {
        "SELECT datname AS name FROM pg_database \
         WHERE NOT datistemplate AND datname <> 'postgres' ORDER BY datname"
            .to_string()
    }

    fn database_exists_sql(&self, name: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM pg_database WHERE datname = '{}'",
            escape_string(name)
        )
    }

    fn drop_database_sql(&self, name: &str) -> Vec<String> {
        vec![
            format!(
                "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
                 WHERE datname = '{}' AND pid <> pg_backend_pid()",
                escape_string(name)
            ),
            format!("DROP DATABASE IF EXISTS {}", self.quote_ident(name)),
        ]
    }

    fn create_login_sql(&self, spec: &LoginSpec) -> Vec<String> {
        let role = self.quote_ident(&spec.login_name);
        let db = self.quote_ident(&spec.database);
        vec![
            format!(
                "CREATE ROLE {} LOGIN PASSWORD '{}'",
                role,
                escape_string(&spec.password)
            ),
            format!("GRANT ALL PRIVILEGES ON DATABASE {} TO {}", db, role),
            format!("ALTER DATABASE {} OWNER TO {}", db, role),
        ]
    }

    fn drop_login_sql(&self, login_name: &str) -> Vec<String> {
        vec![format!("DROP ROLE IF EXISTS {}", self.quote_ident(login_name))]
    }

    fn list_tables_sql(&self, _database: &str) -> String {
        "SELECT n.nspname AS schema_name, c.relname AS table_name, \
                GREATEST(c.reltuples, 0)::bigint AS row_count, \
                EXISTS (SELECT 1 FROM pg_attribute a WHERE a.attrelid = c.oid \
                        AND a.attidentity <> '' AND NOT a.attisdropped) AS has_identity, \
                obj_description(c.oid, 'pg_class') AS description \
         FROM pg_class c \
         JOIN pg_namespace n ON n.oid = c.relnamespace \
         WHERE c.relkind = 'r' \
           AND n.nspname NOT IN ('pg_catalog', 'information_schema') \
           AND n.nspname NOT LIKE 'pg_toast%' \
         ORDER BY n.nspname, c.relname"
            .to_string()
    }

    fn list_columns_sql(&self, _database: &str, table: &TableName) -> String {
        format!(
            "SELECT a.attname AS column_name, \
                    format_type(a.atttypid, a.atttypmod) AS data_type, \
                    NOT a.attnotnull AS is_nullable, \
                    (a.attidentity <> '' OR COALESCE(pg_get_expr(d.adbin, d.adrelid), '') LIKE 'nextval(%') AS is_identity, \
                    CASE WHEN pg_get_expr(d.adbin, d.adrelid) LIKE 'nextval(%' THEN NULL \
                         ELSE pg_get_expr(d.adbin, d.adrelid) END AS column_default \
             FROM pg_attribute a \
             JOIN pg_class c ON c.oid = a.attrelid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum \
             WHERE c.relname = '{}' AND n.nspname = '{}' AND a.attnum > 0 AND NOT a.attisdropped \
             ORDER BY a.attnum",
            escape_string(&table.name),
            escape_string(self.schema_of(table))
        )
    }

    fn list_indexes_sql(&self, table: &TableName) -> String {
        format!(
            "SELECT i.relname AS index_name, a.attname AS column_name, \
                    ix.indisunique AS is_unique, ix.indisprimary AS is_primary \
             FROM pg_index ix \
             JOIN pg_class t ON t.oid = ix.indrelid \
             JOIN pg_class i ON i.oid = ix.indexrelid \
             JOIN pg_namespace n ON n.oid = t.relnamespace \
             JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord) ON true \
             JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
             WHERE t.relname = '{}' AND n.nspname = '{}' \
             ORDER BY i.relname, k.ord",
            escape_string(&table.name),
            escape_string(self.schema_of(table))
        )
    }

    fn list_descriptions_sql(&self, table: &TableName) -> String {
        format!(
            "SELECT a.attname AS column_name, d.description \
             FROM pg_description d \
             JOIN pg_class c ON c.oid = d.objoid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             LEFT JOIN pg_attribute a ON a.attrelid = d.objoid AND a.attnum = d.objsubid AND d.objsubid > 0 \
             WHERE d.classoid = 'pg_class'::regclass AND c.relname = '{}' AND n.nspname = '{}' \
             ORDER BY d.objsubid",
            escape_string(&table.name),
            escape_string(self.schema_of(table))
        )
    }

    fn apply_description_sql(&self, description: &Description) -> Option<String> {
        let target = match &description.column {
            Some(column) => format!(
                "COLUMN {}.{}",
                self.qualify(&description.table),
                self.quote_ident(column)
            ),
            None => format!("TABLE {}", self.qualify(&description.table)),
        };
        Some(format!(
            "COMMENT ON {} IS '{}'",
            target,
            escape_string(&description.text)
        ))
    }

    fn identity_clause(&self) -> &'static str {
        "GENERATED BY DEFAULT AS IDENTITY"
    }

    fn ensure_schema_sql(&self, schema: &str) -> Option<String> {
        if schema == "public" {
            return None;
        }
        Some(format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            self.quote_ident(schema)
        ))
    }

    fn constraints_sql(&self, table: &TableName, enabled: bool) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} {} TRIGGER ALL",
            self.qualify(table),
            if enabled { "ENABLE" } else { "DISABLE" }
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::models::SqlValue;

    #[test]
    fn test_bool_and_bytes_literals() {
        assert_eq!(PostgresDialect.literal(&SqlValue::Bool(true)), "TRUE");
        assert_eq!(
            PostgresDialect.literal(&SqlValue::Bytes(vec![0x0f])),
            "'\\x0F'::bytea"
        );
    }

    #[test]
    fn test_comment_on_column() {
        let description = Description {
            table: TableName::new("TB_DEPT"),
            column: Some("DEPT_NM".to_string()),
            text: "Department's name".to_string(),
        };
        assert_eq!(
            PostgresDialect.apply_description_sql(&description).unwrap(),
            "COMMENT ON COLUMN \"TB_DEPT\".\"DEPT_NM\" IS 'Department''s name'"
        );
    }

    #[test]
    fn test_catalog_queries_default_to_public_schema() {
        let sql = PostgresDialect.list_columns_sql("app", &TableName::new("TB_MENU"));
        assert!(sql.contains("n.nspname = 'public'"));
    }
}
