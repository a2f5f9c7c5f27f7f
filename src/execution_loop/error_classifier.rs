//! Error Classifier
//!
//! Maps query failures onto a small table of known causes, each with a
//! repair hint for the query-repair service.

use crate::query::{FailureKind, QueryFailure};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Query failure classification taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryErrorClass {
    ColumnNotFound,
    MissingGroupBy,
    MissingFrom,
    TableNotFound,
    TypeMismatch,
    UnsupportedSyntax,
    SyntaxError(String),
    ExecutionError(String),
}

impl fmt::Display for QueryErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryErrorClass::ColumnNotFound => write!(f, "ColumnNotFound"),
            QueryErrorClass::MissingGroupBy => write!(f, "MissingGroupBy"),
            QueryErrorClass::MissingFrom => write!(f, "MissingFrom"),
            QueryErrorClass::TableNotFound => write!(f, "TableNotFound"),
            QueryErrorClass::TypeMismatch => write!(f, "TypeMismatch"),
            QueryErrorClass::UnsupportedSyntax => write!(f, "UnsupportedSyntax"),
            QueryErrorClass::SyntaxError(msg) => write!(f, "SyntaxError({})", msg),
            QueryErrorClass::ExecutionError(msg) => write!(f, "ExecutionError({})", msg),
        }
    }
}

/// Known-cause table: lowercase message patterns (all must match) to class.
const KNOWN_CAUSES: &[(&[&str], QueryErrorClass)] = &[
    (&["unknown column"], QueryErrorClass::ColumnNotFound),
    (&["must appear in group by"], QueryErrorClass::MissingGroupBy),
    (&["missing from"], QueryErrorClass::MissingFrom),
    (&["unknown table"], QueryErrorClass::TableNotFound),
    (&["needs a number"], QueryErrorClass::TypeMismatch),
    (&["needs a numeric column"], QueryErrorClass::TypeMismatch),
    (&["is not supported"], QueryErrorClass::UnsupportedSyntax),
    (&["cannot be combined"], QueryErrorClass::UnsupportedSyntax),
];

/// Error classifier
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a failure into the taxonomy
    pub fn classify(&self, failure: &QueryFailure) -> QueryErrorClass {
        let message = failure.message.to_lowercase();

        for (patterns, class) in KNOWN_CAUSES {
            if patterns.iter().all(|p| message.contains(p)) {
                return class.clone();
            }
        }

        match failure.kind {
            FailureKind::InvalidColumn => QueryErrorClass::ColumnNotFound,
            FailureKind::MissingGroupBy => QueryErrorClass::MissingGroupBy,
            FailureKind::Syntax => QueryErrorClass::SyntaxError(failure.message.clone()),
            FailureKind::Execution => QueryErrorClass::ExecutionError(failure.message.clone()),
        }
    }

    /// Repair hint for a class. `columns` are the dataset's column names.
    pub fn hint(&self, class: &QueryErrorClass, failure: &QueryFailure, columns: &[String]) -> String {
        match class {
            QueryErrorClass::ColumnNotFound => {
                let unknown = failure.columns.first().map(String::as_str).unwrap_or("");
                match closest_column(unknown, columns) {
                    Some(best) => format!(
                        "Column '{}' does not exist; did you mean '{}'? Use only these columns: {}",
                        unknown,
                        best,
                        columns.join(", ")
                    ),
                    None => format!(
                        "Column '{}' does not exist. Use only these columns: {}",
                        unknown,
                        columns.join(", ")
                    ),
                }
            }
            QueryErrorClass::MissingGroupBy => format!(
                "Add GROUP BY {} or remove the non-aggregated columns from SELECT",
                failure.columns.join(", ")
            ),
            QueryErrorClass::MissingFrom => "Every query must include FROM data".to_string(),
            QueryErrorClass::TableNotFound => "The only table is named data; use FROM data".to_string(),
            QueryErrorClass::TypeMismatch => {
                "Compare numeric columns against plain numbers and only SUM/AVG numeric columns; use = with quoted text for text columns"
                    .to_string()
            }
            QueryErrorClass::UnsupportedSyntax => {
                "Use a single SELECT over data with optional WHERE, GROUP BY, ORDER BY and LIMIT; no JOIN, DISTINCT, HAVING, subqueries or functions other than SUM, AVG, COUNT, MIN, MAX"
                    .to_string()
            }
            QueryErrorClass::SyntaxError(_) => {
                "Rewrite the query to follow the grammar exactly; quote text values with single quotes".to_string()
            }
            QueryErrorClass::ExecutionError(msg) => format!("The query ran but failed: {}", msg),
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Most similar known column, if any is reasonably close.
pub fn closest_column(unknown: &str, columns: &[String]) -> Option<String> {
    let target = unknown.to_lowercase();
    columns
        .iter()
        .map(|c| (c, strsim::jaro_winkler(&target, &c.to_lowercase())))
        .filter(|(_, score)| *score >= 0.8)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(c, _)| c.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;

    fn failure(err: QueryError) -> QueryFailure {
        QueryFailure::from(&err)
    }

    #[test]
    fn test_classify_column_not_found_with_suggestion() {
        let classifier = ErrorClassifier::new();
        let columns = vec!["valor_total".to_string(), "cidade".to_string()];
        let f = failure(QueryError::InvalidColumn {
            column: "valor_totl".to_string(),
            available: columns.clone(),
        });
        let class = classifier.classify(&f);
        assert_eq!(class, QueryErrorClass::ColumnNotFound);
        assert!(classifier.hint(&class, &f, &columns).contains("did you mean 'valor_total'"));
    }

    #[test]
    fn test_classify_known_causes() {
        let classifier = ErrorClassifier::new();
        let f = failure(QueryError::MissingGroupBy { columns: vec!["uf".to_string()] });
        assert_eq!(classifier.classify(&f), QueryErrorClass::MissingGroupBy);

        let f = failure(QueryError::Syntax("missing FROM data; every query must read FROM data".into()));
        assert_eq!(classifier.classify(&f), QueryErrorClass::MissingFrom);

        let f = failure(QueryError::Execution("operator > needs a number but 'x' is not numeric".into()));
        assert_eq!(classifier.classify(&f), QueryErrorClass::TypeMismatch);

        let f = failure(QueryError::Syntax("JOIN is not supported; only single-table SELECT".into()));
        assert_eq!(classifier.classify(&f), QueryErrorClass::UnsupportedSyntax);

        let f = failure(QueryError::Syntax("expected end of query, found 'x'".into()));
        assert!(matches!(classifier.classify(&f), QueryErrorClass::SyntaxError(_)));
    }

    #[test]
    fn test_no_suggestion_for_unrelated_names() {
        assert_eq!(closest_column("zzz", &["cidade".to_string()]), None);
    }
}
