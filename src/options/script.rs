use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref GO_LINE: Regex = Regex::new(r"(?im)^\s*GO\s*$").unwrap();
    static ref CREATE_DATABASE: Regex = Regex::new(
        r#"(?i)CREATE\s+(?:PLUGGABLE\s+)?DATABASE\s+(?:IF\s+NOT\s+EXISTS\s+)?(?:\[([^\]]+)\]|"([^"]+)"|`([^`]+)`|([A-Za-z0-9_$#@]+))"#
    )
    .unwrap();
}

/// Splits a script into executable statements.
///
/// Batches are separated by `GO` lines. Comment-only lines and blank lines are
/// dropped, as are `USE` statements since every statement runs on the
/// connection the caller chose. A single trailing `;` is removed except after
/// `END`, so that drivers which reject terminators accept the text.
pub fn parse_sql_statements(script: &str) -> Vec<String> {
    GO_LINE
        .split(script)
        .filter_map(|block| {
            let lines: Vec<&str> = block
                .lines()
                .filter(|line| {
                    let trimmed = line.trim();
                    !trimmed.is_empty() && !trimmed.starts_with("--")
                })
                .collect();
            let clean = lines.join("\n").trim().to_string();
            if clean.is_empty() || clean.to_ascii_uppercase().starts_with("USE ") {
                return None;
            }
            Some(strip_terminator(clean))
        })
        .collect()
}

fn strip_terminator(statement: String) -> String {
    let upper = statement.to_ascii_uppercase();
    if upper.ends_with(';') && !upper.trim_end_matches(';').trim_end().ends_with("END") {
        statement.trim_end_matches(';').trim_end().to_string()
    } else {
        statement
    }
}

/// Name of the database a `CREATE DATABASE` statement creates, if any.
pub fn extract_database_name(sql: &str) -> Option<String> {
    let caps = CREATE_DATABASE.captures(sql)?;
    (1..=4)
        .find_map(|i| caps.get(i))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_on_go_and_drops_comments() {
        let script = "-- header\n\
                      CREATE DATABASE [CORP1001]\nCOLLATE Korean_Wansung_CI_AS;\n\
                      GO\n\
                      \n\
                      -- summary only\n\
                      go  \n\
                      ALTER DATABASE [CORP1001] SET RECOVERY SIMPLE\n";
        let statements = parse_sql_statements(script);
        assert_eq!(
            statements,
            vec![
                "CREATE DATABASE [CORP1001]\nCOLLATE Korean_Wansung_CI_AS".to_string(),
                "ALTER DATABASE [CORP1001] SET RECOVERY SIMPLE".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_drops_use_statements() {
        let statements = parse_sql_statements("USE master\nGO\nSELECT 1\nGO");
        assert_eq!(statements, vec!["SELECT 1".to_string()]);
    }

    #[test]
    fn test_parse_keeps_terminator_after_end() {
        let statements = parse_sql_statements("BEGIN\n  NULL;\nEND;");
        assert_eq!(statements, vec!["BEGIN\n  NULL;\nEND;".to_string()]);
    }

    #[test]
    fn test_go_inside_identifier_is_not_a_separator() {
        let statements = parse_sql_statements("SELECT GOAL FROM T\nGO");
        assert_eq!(statements, vec!["SELECT GOAL FROM T".to_string()]);
    }

    #[test]
    fn test_extract_database_name() {
        assert_eq!(
            extract_database_name("create database [CORP 1001] ON PRIMARY"),
            Some("CORP 1001".to_string())
        );
        assert_eq!(
            extract_database_name("CREATE DATABASE \"corp1001\" ENCODING 'UTF8'"),
            Some("corp1001".to_string())
        );
        assert_eq!(
            extract_database_name("CREATE DATABASE `corp1001` CHARACTER SET utf8mb4"),
            Some("corp1001".to_string())
        );
        assert_eq!(
            extract_database_name("CREATE PLUGGABLE DATABASE CORP1001 ADMIN USER x"),
            Some("CORP1001".to_string())
        );
        assert_eq!(extract_database_name("ALTER DATABASE [X] SET READ_WRITE"), None);
    }
}
