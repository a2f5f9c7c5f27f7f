//! Error Recovery
//!
//! Builds the context handed to the query-repair service and renders it as
//! a prompt for chat-based repairers.

use crate::ingestion::ColumnProfile;
use crate::value::Row;
use serde::{Deserialize, Serialize};

/// Grammar the repaired query must follow.
pub const GRAMMAR_RULES: &[&str] = &[
    "SELECT <column | SUM/AVG/COUNT/MIN/MAX(column) | COUNT(*)> [AS alias], ... FROM data",
    "Optional clauses, in this order: WHERE, GROUP BY, ORDER BY, LIMIT",
    "WHERE conditions use = != <> > < >= <= or IS [NOT] NULL, joined by AND/OR evaluated left to right",
    "Text values in single quotes; numbers unquoted",
    "Every non-aggregated SELECT column must appear in GROUP BY when aggregates are selected",
    "The only table is data; no JOIN, subqueries, DISTINCT, HAVING or other functions",
    "Wrap column names in backticks when they start with a digit or are keywords, e.g. `1o_trimestre`, `count`",
    "Every output column needs a distinct name; SUM(total) is named sum_total unless aliased",
];

/// Everything the repair service gets to see about one failed attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepairContext {
    pub purpose: String,
    pub failed_query: String,
    pub failure_reason: String,
    pub error_class: String,
    pub error_hint: String,
    pub columns: Vec<ColumnProfile>,
    pub sample_rows: Vec<Row>,
    pub grammar_rules: Vec<String>,
    /// Query shapes that already succeeded in this batch.
    pub successful_patterns: Vec<String>,
    pub attempt: u8,
    pub max_attempts: u8,
}

impl RepairContext {
    /// Build a repair prompt from the context
    pub fn to_prompt(&self) -> String {
        let mut prompt_parts = Vec::new();

        prompt_parts.push(format!(
            "⚠️ REPAIR ATTEMPT {} of {}: this query failed.",
            self.attempt, self.max_attempts
        ));
        prompt_parts.push(format!("Purpose: {}", self.purpose));
        prompt_parts.push(format!("Query: {}", self.failed_query));
        prompt_parts.push(format!("Error ({}): {}", self.error_class, self.failure_reason));
        prompt_parts.push(format!("Hint: {}", self.error_hint));

        prompt_parts.push("\nCOLUMNS:".to_string());
        for col in &self.columns {
            prompt_parts.push(format!(
                "- {} ({}, {} distinct, {} null)",
                col.name, col.column_type, col.cardinality, col.null_count
            ));
        }

        if !self.sample_rows.is_empty() {
            prompt_parts.push("\nSAMPLE ROWS:".to_string());
            for row in &self.sample_rows {
                prompt_parts.push(serde_json::to_string(row).unwrap_or_default());
            }
        }

        prompt_parts.push("\nGRAMMAR:".to_string());
        for rule in &self.grammar_rules {
            prompt_parts.push(format!("- {}", rule));
        }

        if !self.successful_patterns.is_empty() {
            prompt_parts.push("\nQUERIES THAT ALREADY WORKED ON THIS DATA:".to_string());
            for pattern in &self.successful_patterns {
                prompt_parts.push(format!("- {}", pattern));
            }
        }

        prompt_parts.push("\nReply with the corrected query only, no explanation.".to_string());
        prompt_parts.join("\n")
    }
}

/// Strips markdown fences, a leading `sql` tag and trailing semicolons.
pub fn clean_repair_output(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest;
        if let Some(end) = text.rfind("```") {
            text = &text[..end];
        }
        let trimmed = text.trim_start();
        if trimmed.get(..3).map_or(false, |tag| tag.eq_ignore_ascii_case("sql")) {
            text = &trimmed[3..];
        }
    }
    text.trim().trim_end_matches(';').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ColumnType;

    #[test]
    fn test_clean_repair_output() {
        assert_eq!(clean_repair_output("```sql\nSELECT a FROM data;\n```"), "SELECT a FROM data");
        assert_eq!(clean_repair_output("  SELECT a FROM data ;; "), "SELECT a FROM data");
        assert_eq!(clean_repair_output("```\nSELECT 1\n```"), "SELECT 1");
    }

    #[test]
    fn test_prompt_carries_schema_and_patterns() {
        let ctx = RepairContext {
            purpose: "sales by city".into(),
            failed_query: "SELECT cidad FROM data".into(),
            failure_reason: "Unknown column 'cidad'".into(),
            error_class: "ColumnNotFound".into(),
            error_hint: "did you mean 'cidade'?".into(),
            columns: vec![ColumnProfile {
                name: "cidade".into(),
                column_type: ColumnType::Text,
                cardinality: 3,
                null_count: 0,
            }],
            sample_rows: Vec::new(),
            grammar_rules: GRAMMAR_RULES.iter().map(|r| r.to_string()).collect(),
            successful_patterns: vec!["SELECT COUNT(*) FROM data".into()],
            attempt: 1,
            max_attempts: 2,
        };
        let prompt = ctx.to_prompt();
        assert!(prompt.contains("REPAIR ATTEMPT 1 of 2"));
        assert!(prompt.contains("- cidade (text, 3 distinct, 0 null)"));
        assert!(prompt.contains("SELECT COUNT(*) FROM data"));
    }
}
