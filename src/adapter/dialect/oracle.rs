use super::{escape_string, Dialect};
use crate::adapter::models::{DbKind, Description, LoginSpec, SqlValue, TableName};

/// Tenant databases on Oracle are pluggable databases; catalog queries run
/// against the container the session is attached to.
pub struct OracleDialect;

impl OracleDialect {
    fn owner_filter(&self, table: &TableName, alias: &str) -> String {
        match &table.schema {
            Some(owner) => format!("{}.owner = '{}'", alias, escape_string(owner)),
            None => format!("{}.owner = USER", alias),
        }
    }
}

impl Dialect for OracleDialect {
    fn kind(&self) -> DbKind {
        DbKind::Oracle
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        format!("HEXTORAW('{}')", super::hex(bytes))
    }

    fn datetime_literal(&self, value: &chrono::NaiveDateTime) -> String {
        format!("TIMESTAMP '{}'", value.format("%Y-%m-%d %H:%M:%S%.6f"))
    }

    fn max_rows_per_insert(&self) -> usize {
        500
    }

    fn list_databases_sql(&self) -> String {
        "SELECT name FROM v$pdbs WHERE name <> 'PDB$SEED' ORDER BY name".to_string()
    }

    fn database_exists_sql(&self, name: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM v$pdbs WHERE UPPER(name) = UPPER('{}')",
            escape_string(name)
        )
    }

    fn drop_database_sql(&self, name: &str) -> Vec<String> {
        let pdb = self.quote_ident(name);
        vec![
            format!("ALTER PLUGGABLE DATABASE {} CLOSE IMMEDIATE", pdb),
            format!("DROP PLUGGABLE DATABASE {} INCLUDING DATAFILES", pdb),
        ]
    }

    fn create_login_sql(&self, spec: &LoginSpec) -> Vec<String> {
        let user = self.quote_ident(&spec.login_name);
        vec![
            format!(
                "ALTER SESSION SET CONTAINER = {}",
                self.quote_ident(&spec.database)
            ),
            format!(
                "CREATE USER {} IDENTIFIED BY \"{}\"",
                user,
                spec.password.replace('"', "")
            ),
            format!("GRANT CONNECT, RESOURCE TO {}", user),
            format!("ALTER USER {} QUOTA UNLIMITED ON USERS", user),
            "ALTER SESSION SET CONTAINER = CDB$ROOT".to_string(),
        ]
    }

    fn drop_login_sql(&self, login_name: &str) -> Vec<String> {
        vec![format!("DROP USER {} CASCADE", self.quote_ident(login_name))]
    }

    fn list_tables_sql(&self, _database: &str) -> String {
        "SELECT NULL AS schema_name, t.table_name AS table_name, t.num_rows AS row_count, \
                (SELECT COUNT(*) FROM user_tab_identity_cols ic WHERE ic.table_name = t.table_name) AS has_identity, \
                (SELECT tc.comments FROM user_tab_comments tc WHERE tc.table_name = t.table_name) AS description \
         FROM user_tables t \
         ORDER BY t.table_name"
            .to_string()
    }

    fn list_columns_sql(&self, _database: &str, table: &TableName) -> String {
        format!(
            "SELECT c.column_name AS column_name, \
                    CASE \
                      WHEN c.data_type IN ('VARCHAR2', 'NVARCHAR2', 'CHAR', 'NCHAR') \
                        THEN c.data_type || '(' || c.char_length || ')' \
                      WHEN c.data_type = 'RAW' THEN 'RAW(' || c.data_length || ')' \
                      WHEN c.data_type = 'NUMBER' AND c.data_precision IS NOT NULL \
                        THEN 'NUMBER(' || c.data_precision || ',' || NVL(c.data_scale, 0) || ')' \
                      ELSE c.data_type \
                    END AS data_type, \
                    CASE WHEN c.nullable = 'Y' THEN 1 ELSE 0 END AS is_nullable, \
                    CASE WHEN c.identity_column = 'YES' THEN 1 ELSE 0 END AS is_identity, \
                    NULL AS column_default \
             FROM all_tab_columns c \
             WHERE c.table_name = '{}' AND {} \
             ORDER BY c.column_id",
            escape_string(&table.name),
            self.owner_filter(table, "c")
        )
    }

    fn list_indexes_sql(&self, table: &TableName) -> String {
        format!(
            "SELECT i.index_name AS index_name, ic.column_name AS column_name, \
                    CASE WHEN i.uniqueness = 'UNIQUE' THEN 1 ELSE 0 END AS is_unique, \
                    CASE WHEN con.constraint_type = 'P' THEN 1 ELSE 0 END AS is_primary \
             FROM all_indexes i \
             JOIN all_ind_columns ic ON ic.index_owner = i.owner AND ic.index_name = i.index_name \
             LEFT JOIN all_constraints con ON con.owner = i.owner AND con.index_name = i.index_name \
                    AND con.constraint_type = 'P' \
             WHERE i.table_name = '{}' AND {} \
             ORDER BY i.index_name, ic.column_position",
            escape_string(&table.name),
            self.owner_filter(table, "i")
        )
    }

    fn list_descriptions_sql(&self, table: &TableName) -> String {
        let name = escape_string(&table.name);
        format!(
            "SELECT NULL AS column_name, tc.comments AS description FROM all_tab_comments tc \
             WHERE tc.table_name = '{name}' AND {} AND tc.comments IS NOT NULL \
             UNION ALL \
             SELECT cc.column_name, cc.comments FROM all_col_comments cc \
             WHERE cc.table_name = '{name}' AND {} AND cc.comments IS NOT NULL",
            self.owner_filter(table, "tc"),
            self.owner_filter(table, "cc")
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

    fn insert_sql(&self, table: &TableName, columns: &[String], rows: &[Vec<SqlValue>]) -> String {
        let target = format!("{} ({})", self.qualify(table), self.column_list(columns));
        let mut sql = String::from("INSERT ALL");
        for row in rows {
            let cells = row
                .iter()
                .map(|v| self.literal(v))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!("\n  INTO {} VALUES ({})", target, cells));
        }
        sql.push_str("\nSELECT 1 FROM DUAL");
        sql
    }

    fn constraints_sql(&self, table: &TableName, enabled: bool) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} {} ALL TRIGGERS",
            self.qualify(table),
            if enabled { "ENABLE" } else { "DISABLE" }
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_all_form() {
        let sql = OracleDialect.insert_sql(
            &TableName::new("TB_ROLE"),
            &["ROLE_CD".to_string()],
            &[vec![SqlValue::from("A")], vec![SqlValue::from("B")]],
        );
        assert_eq!(
            sql,
            "INSERT ALL\n  INTO \"TB_ROLE\" (\"ROLE_CD\") VALUES ('A')\n  INTO \"TB_ROLE\" (\"ROLE_CD\") VALUES ('B')\nSELECT 1 FROM DUAL"
        );
    }

    #[test]
    fn test_timestamp_literal() {
        let dt = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(
            OracleDialect.literal(&SqlValue::DateTime(dt)),
            "TIMESTAMP '2024-01-02 03:04:05.000000'"
        );
    }
}
