//! Session pattern memory
//!
//! Query shapes that succeeded earlier in a batch, with literals replaced
//! by `?`. Owned by one retry-loop run and dropped with it.

use crate::query::{parse_query, Literal, Predicate};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref STRING_LITERAL: Regex = Regex::new(r"'(?:[^']|'')*'").unwrap();
    static ref NUMBER_LITERAL: Regex = Regex::new(r"\b\d+(?:\.\d+)?\b").unwrap();
}

/// Literal-free form of a query. Parsed queries are rendered canonically;
/// text that does not parse is scrubbed with regexes instead.
pub fn normalize_pattern(query: &str) -> String {
    match parse_query(query) {
        Ok(mut stmt) => {
            if let Some(filter) = &mut stmt.filter {
                let conditions = std::iter::once(&mut filter.first)
                    .chain(filter.rest.iter_mut().map(|(_, c)| c));
                for cond in conditions {
                    if let Predicate::Compare { value, .. } = &mut cond.predicate {
                        *value = Literal::Number("?".to_string());
                    }
                }
            }
            let limited = stmt.limit.take().is_some();
            let mut text = stmt.to_string();
            if limited {
                text.push_str(" LIMIT ?");
            }
            text
        }
        Err(_) => {
            let text = STRING_LITERAL.replace_all(query.trim(), "?");
            NUMBER_LITERAL.replace_all(&text, "?").into_owned()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatternMemory {
    patterns: Vec<String>,
}

impl PatternMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the normalized shape of `query`; repeats are ignored.
    pub fn record(&mut self, query: &str) {
        let pattern = normalize_pattern(query);
        if !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals_become_placeholders() {
        assert_eq!(
            normalize_pattern("select uf, sum(valor) from data where cidade = 'Recife' and valor > 10 group by uf limit 5"),
            "SELECT uf, SUM(valor) FROM data WHERE cidade = ? AND valor > ? GROUP BY uf LIMIT ?"
        );
    }

    #[test]
    fn test_unparseable_text_is_scrubbed() {
        assert_eq!(normalize_pattern("SELECT a FROM data WHERE b = 'x' HAVING 3"), "SELECT a FROM data WHERE b = ? HAVING ?");
    }

    #[test]
    fn test_record_dedupes_by_shape() {
        let mut memory = PatternMemory::new();
        memory.record("SELECT nome FROM data WHERE valor > 10");
        memory.record("SELECT nome FROM data WHERE valor > 99");
        memory.record("SELECT COUNT(*) FROM data");
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.patterns()[0], "SELECT nome FROM data WHERE valor > ?");
    }
}
