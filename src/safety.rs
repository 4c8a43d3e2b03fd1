//! Keyword denylist for SQL that is about to be executed against a server.
//!
//! The validator is a guard rail for operator-edited provisioning scripts, not a
//! SQL parser: it looks for whole-token matches of a fixed set of destructive
//! keywords anywhere in the text, including inside string literals.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

/// Keywords that are never allowed in operator supplied SQL.
pub const FORBIDDEN_KEYWORDS: [&str; 10] = [
    "DROP DATABASE",
    "DROP TABLE",
    "DROP SCHEMA",
    "TRUNCATE",
    "xp_cmdshell",
    "sp_configure",
    "SHUTDOWN",
    "RECONFIGURE",
    "OPENROWSET",
    "OPENDATASOURCE",
];

/// Whitespace or inline comments that may separate the words of a keyword.
const WORD_GAP: &str = r"(?:\s|/\*.*?\*/|--[^\n]*(?:\n|$))+";

lazy_static! {
    static ref KEYWORD_PATTERNS: Vec<(&'static str, Regex)> = FORBIDDEN_KEYWORDS
        .iter()
        .map(|keyword| (*keyword, build_pattern(keyword)))
        .collect();
}

fn build_pattern(keyword: &str) -> Regex {
    let body = keyword
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(WORD_GAP);
    // Patterns are assembled from constant keywords, so compilation cannot fail.
    Regex::new(&format!(r"(?is)\b{}\b", body)).unwrap()
}

/// SQL text contained a forbidden keyword.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("SQL contains forbidden keyword: {keyword}")]
pub struct UnsafeSqlError {
    /// The keyword, as listed in [`FORBIDDEN_KEYWORDS`], that matched first.
    pub keyword: &'static str,
}

/// Checks SQL text against [`FORBIDDEN_KEYWORDS`].
///
/// Matching is case-insensitive and token based: `TRUNCATE TABLE x` is
/// rejected while `TRUNCATE_LOG` or `MY_SHUTDOWN_FLAG` are accepted. Multi-word
/// keywords match across any amount of whitespace and inline comments.
pub fn validate_sql(sql: &str) -> Result<(), UnsafeSqlError> {
    for (keyword, pattern) in KEYWORD_PATTERNS.iter() {
        if pattern.is_match(sql) {
            return Err(UnsafeSqlError { keyword });
        }
    }
    Ok(())
}

/// Validates a list of statements as one block of text.
pub fn validate_statements<S: AsRef<str>>(statements: &[S]) -> Result<(), UnsafeSqlError> {
    statements
        .iter()
        .try_for_each(|statement| validate_sql(statement.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_ddl() {
        let sql = "CREATE DATABASE [CORP1001]\nALTER DATABASE [CORP1001] SET RECOVERY SIMPLE";
        assert!(validate_sql(sql).is_ok());
    }

    #[test]
    fn test_rejects_every_keyword_case_insensitively() {
        for keyword in FORBIDDEN_KEYWORDS {
            let sql = format!("SELECT 1; {} foo", keyword.to_lowercase());
            let err = validate_sql(&sql).unwrap_err();
            assert_eq!(err.keyword, keyword);
        }
    }

    #[test]
    fn test_names_the_keyword() {
        let err = validate_sql("EXEC master..xp_cmdshell 'dir'").unwrap_err();
        assert_eq!(err.keyword, "xp_cmdshell");
        assert_eq!(
            err.to_string(),
            "SQL contains forbidden keyword: xp_cmdshell"
        );
    }

    #[test]
    fn test_accepts_keyword_inside_identifier() {
        assert!(validate_sql("SELECT TRUNCATE_LOG FROM t").is_ok());
        assert!(validate_sql("UPDATE t SET MY_SHUTDOWN_FLAG = 1").is_ok());
        assert!(validate_sql("SELECT RECONFIGURED FROM t").is_ok());
        assert!(validate_sql("SELECT * FROM DROP_TABLES").is_ok());
    }

    #[test]
    fn test_rejects_multi_word_keyword_split_by_whitespace() {
        let err = validate_sql("drop\n\t  table dbo.TB_USER").unwrap_err();
        assert_eq!(err.keyword, "DROP TABLE");
    }

    #[test]
    fn test_rejects_multi_word_keyword_split_by_comments() {
        let err = validate_sql("DROP /* sneaky */ DATABASE x").unwrap_err();
        assert_eq!(err.keyword, "DROP DATABASE");

        let err = validate_sql("DROP -- line comment\nSCHEMA s").unwrap_err();
        assert_eq!(err.keyword, "DROP SCHEMA");
    }

    #[test]
    fn test_does_not_join_separate_words() {
        assert!(validate_sql("SELECT DROPTABLE FROM t").is_ok());
        assert!(validate_sql("DROP INDEX ix ON t").is_ok());
    }

    #[test]
    fn test_validate_statements_checks_each() {
        let statements = vec!["SELECT 1".to_string(), "SHUTDOWN WITH NOWAIT".to_string()];
        let err = validate_statements(&statements).unwrap_err();
        assert_eq!(err.keyword, "SHUTDOWN");
    }
}
