//! Pre-validation
//!
//! Cheap syntactic fixes applied before a draft ever reaches the engine:
//! missing or wrong FROM, missing GROUP BY when aggregates are mixed with
//! plain columns, and column names that only differ by case or accents.
//! Unknown columns that cannot be fixed are flagged without executing.

use crate::error::QueryError;
use crate::ingestion::normalize_header;
use crate::query::{
    parse_query, AggregateArg, SelectItem, SelectStatement, TABLE_NAME,
};
use std::collections::HashMap;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct PreValidation {
    /// Text to execute: canonical rendering when a fix was applied, else the input.
    pub query_text: String,
    pub statement: Option<SelectStatement>,
    pub fixes: Vec<String>,
    /// Problem found before execution; the query should not be run.
    pub issue: Option<QueryError>,
}

impl PreValidation {
    pub fn auto_fixed(&self) -> bool {
        !self.fixes.is_empty()
    }
}

fn rename(name: &mut String, renames: &HashMap<String, String>) {
    if let Some(new) = renames.get(name.as_str()) {
        *name = new.clone();
    }
}

fn apply_renames(stmt: &mut SelectStatement, renames: &HashMap<String, String>) {
    for item in &mut stmt.projections {
        match item {
            SelectItem::Column { name, .. } => rename(name, renames),
            SelectItem::Aggregate { arg: AggregateArg::Column(col), .. } => rename(col, renames),
            _ => {}
        }
    }
    if let Some(filter) = &mut stmt.filter {
        rename(&mut filter.first.column, renames);
        for (_, cond) in &mut filter.rest {
            rename(&mut cond.column, renames);
        }
    }
    for col in &mut stmt.group_by {
        rename(col, renames);
    }
    for key in &mut stmt.order_by {
        rename(&mut key.column, renames);
    }
}

pub fn prevalidate(query: &str, columns: &[String]) -> PreValidation {
    let mut stmt = match parse_query(query) {
        Ok(stmt) => stmt,
        Err(e) => {
            return PreValidation {
                query_text: query.to_string(),
                statement: None,
                fixes: Vec::new(),
                issue: Some(e),
            }
        }
    };
    let mut fixes = Vec::new();

    match &stmt.from {
        None => {
            stmt.from = Some(TABLE_NAME.to_string());
            fixes.push(format!("added FROM {}", TABLE_NAME));
        }
        Some(table) if !table.eq_ignore_ascii_case(TABLE_NAME) => {
            fixes.push(format!("replaced table '{}' with {}", table, TABLE_NAME));
            stmt.from = Some(TABLE_NAME.to_string());
        }
        Some(_) => {}
    }

    // Column names that normalize to a known column.
    let mut renames = HashMap::new();
    for col in stmt.referenced_columns() {
        if columns.contains(&col) || renames.contains_key(&col) {
            continue;
        }
        let normalized = normalize_header(&col);
        if columns.contains(&normalized) {
            fixes.push(format!("renamed column '{}' to '{}'", col, normalized));
            renames.insert(col, normalized);
        }
    }
    if !renames.is_empty() {
        apply_renames(&mut stmt, &renames);
    }

    if stmt.has_aggregates() && stmt.group_by.is_empty() && !stmt.is_purely_aggregate() {
        let plain = stmt.plain_columns();
        fixes.push(format!("added GROUP BY {}", plain.join(", ")));
        stmt.group_by = plain;
    }

    let issue = stmt
        .referenced_columns()
        .into_iter()
        .find(|c| !columns.contains(c))
        .map(|column| QueryError::InvalidColumn {
            column,
            available: columns.to_vec(),
        });

    let query_text = if fixes.is_empty() {
        query.to_string()
    } else {
        stmt.to_string()
    };
    if !fixes.is_empty() {
        debug!(fixes = ?fixes, "query auto-fixed: {}", query_text);
    }

    PreValidation {
        query_text,
        statement: Some(stmt),
        fixes,
        issue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        vec!["categoria".to_string(), "total".to_string(), "preco_medio".to_string()]
    }

    #[test]
    fn test_adds_missing_from() {
        let pre = prevalidate("SELECT COUNT(*)", &columns());
        assert!(pre.issue.is_none());
        assert_eq!(pre.query_text, "SELECT COUNT(*) FROM data");
        assert!(pre.auto_fixed());
    }

    #[test]
    fn test_inserts_group_by_for_mixed_select() {
        let pre = prevalidate("SELECT categoria, SUM(total) FROM data ORDER BY categoria", &columns());
        assert_eq!(
            pre.query_text,
            "SELECT categoria, SUM(total) FROM data GROUP BY categoria ORDER BY categoria ASC"
        );
        assert_eq!(pre.fixes, vec!["added GROUP BY categoria"]);
    }

    #[test]
    fn test_purely_aggregate_select_is_left_alone() {
        let pre = prevalidate("SELECT COUNT(*), SUM(total) FROM data", &columns());
        assert!(!pre.auto_fixed());
        assert_eq!(pre.query_text, "SELECT COUNT(*), SUM(total) FROM data");
    }

    #[test]
    fn test_renames_columns_that_normalize_to_known_ones() {
        let pre = prevalidate("SELECT `Preço Médio` FROM vendas", &columns());
        assert!(pre.issue.is_none());
        assert_eq!(pre.query_text, "SELECT preco_medio FROM data");
        assert_eq!(pre.fixes.len(), 2);
    }

    #[test]
    fn test_flags_unknown_columns() {
        let pre = prevalidate("SELECT cidade FROM data", &columns());
        assert!(matches!(pre.issue, Some(QueryError::InvalidColumn { ref column, .. }) if column == "cidade"));
    }

    #[test]
    fn test_parse_errors_are_reported_not_fixed() {
        let pre = prevalidate("SELEC categoria FROM data", &columns());
        assert!(matches!(pre.issue, Some(QueryError::Syntax(_))));
        assert!(pre.statement.is_none());
    }
}
