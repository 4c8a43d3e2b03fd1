//! Corp-code substitution for rows copied from a template or another tenant.

use crate::adapter::{RowSet, SqlValue};

/// Replaces one corp code with another in the corp-code columns of a row set.
///
/// Matching of column names is case-insensitive. Inside a matching column the
/// source code is replaced wherever it occurs in a text value, so composite
/// keys such as `0000-ADMIN` become `1001-ADMIN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpCodeRewrite {
    pub from: String,
    pub to: String,
    pub columns: Vec<String>,
}

impl CorpCodeRewrite {
    pub fn new(from: impl Into<String>, to: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            columns,
        }
    }

    /// Indexes of the columns of `rows` this rewrite applies to.
    pub fn column_positions(&self, rows: &RowSet) -> Vec<usize> {
        rows.columns
            .iter()
            .enumerate()
            .filter(|(_, name)| self.columns.iter().any(|c| c.eq_ignore_ascii_case(name)))
            .map(|(i, _)| i)
            .collect()
    }

    /// Rewrites `rows` in place and returns how many rows changed.
    pub fn apply(&self, rows: &mut RowSet) -> u64 {
        if self.from.is_empty() || self.from == self.to {
            return 0;
        }
        let positions = self.column_positions(rows);
        if positions.is_empty() {
            return 0;
        }
        let mut changed = 0;
        for row in rows.rows.iter_mut() {
            let mut row_changed = false;
            for &pos in &positions {
                if let Some(SqlValue::Text(text)) = row.get_mut(pos) {
                    if text.contains(&self.from) {
                        *text = text.replace(&self.from, &self.to);
                        row_changed = true;
                    }
                }
            }
            if row_changed {
                changed += 1;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        vec!["CORP_CD".to_string(), "CO_CD".to_string()]
    }

    #[test]
    fn test_rewrites_only_corp_code_columns() {
        let mut rows = RowSet::new(
            vec!["corp_cd".to_string(), "NAME".to_string()],
            vec![
                vec![SqlValue::from("0000"), SqlValue::from("0000 team")],
                vec![SqlValue::from("9999"), SqlValue::from("other")],
                vec![SqlValue::Null, SqlValue::from("no code")],
            ],
        );
        let changed = CorpCodeRewrite::new("0000", "1001", columns()).apply(&mut rows);

        assert_eq!(changed, 1);
        assert_eq!(rows.text(0, "CORP_CD").as_deref(), Some("1001"));
        assert_eq!(rows.text(0, "NAME").as_deref(), Some("0000 team"));
        assert_eq!(rows.text(1, "CORP_CD").as_deref(), Some("9999"));
    }

    #[test]
    fn test_replaces_inside_composite_values() {
        let mut rows = RowSet::new(
            vec!["CO_CD".to_string()],
            vec![vec![SqlValue::from("0000-ADMIN")]],
        );
        CorpCodeRewrite::new("0000", "1001", columns()).apply(&mut rows);
        assert_eq!(rows.text(0, "CO_CD").as_deref(), Some("1001-ADMIN"));
    }

    #[test]
    fn test_noop_without_matching_columns_or_codes() {
        let mut rows = RowSet::new(
            vec!["DEPT_NM".to_string()],
            vec![vec![SqlValue::from("0000")]],
        );
        assert_eq!(CorpCodeRewrite::new("0000", "1001", columns()).apply(&mut rows), 0);
        assert_eq!(CorpCodeRewrite::new("", "1001", columns()).apply(&mut rows), 0);
        assert_eq!(CorpCodeRewrite::new("1001", "1001", columns()).apply(&mut rows), 0);
    }
}
