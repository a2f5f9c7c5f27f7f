//! Schema Inference - Majority-vote column typing over a capped row sample

use crate::config::InferenceConfig;
use crate::value::{parse_date, CellValue, ColumnType, ColumnTypeMap, Dataset};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Per-column summary handed to the repair service and printed by the CLI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub column_type: ColumnType,
    /// Distinct non-null values in the sample.
    pub cardinality: usize,
    pub null_count: usize,
}

#[derive(Debug, Default)]
struct TypeVotes {
    non_null: usize,
    boolean: usize,
    integer: usize,
    numeric: usize,
    date: usize,
}

impl TypeVotes {
    fn record(&mut self, cell: &CellValue) {
        if cell.is_null() {
            return;
        }
        self.non_null += 1;
        match cell {
            CellValue::Null => {}
            CellValue::Bool(_) => self.boolean += 1,
            CellValue::Number(n) => self.count_number(*n),
            CellValue::Text(s) => {
                let t = s.trim();
                if is_bool_token(t) {
                    self.boolean += 1;
                } else if let Some(n) = t.parse::<f64>().ok().filter(|n| n.is_finite()) {
                    self.count_number(n);
                } else if parse_date(t).is_some() {
                    self.date += 1;
                }
            }
        }
    }

    // Integers also count toward numeric so a mixed column still reaches the threshold.
    fn count_number(&mut self, n: f64) {
        self.numeric += 1;
        if n.fract() == 0.0 {
            self.integer += 1;
        }
    }

    fn decide(&self, threshold: f64) -> ColumnType {
        if self.non_null == 0 {
            return ColumnType::Empty;
        }
        let total = self.non_null as f64;
        let passes = |count: usize| count as f64 / total > threshold;

        if passes(self.boolean) {
            ColumnType::Boolean
        } else if passes(self.integer) {
            ColumnType::Integer
        } else if passes(self.numeric) {
            ColumnType::Numeric
        } else if passes(self.date) {
            ColumnType::Date
        } else {
            ColumnType::Text
        }
    }
}

fn is_bool_token(t: &str) -> bool {
    ["true", "false", "yes", "no"]
        .iter()
        .any(|b| t.eq_ignore_ascii_case(b))
}

/// Schema Inference Engine
pub struct SchemaInference {
    config: InferenceConfig,
}

impl SchemaInference {
    pub fn new(config: InferenceConfig) -> Self {
        Self { config }
    }

    /// Assigns exactly one type to every column of the dataset.
    pub fn infer_column_types(&self, dataset: &Dataset) -> ColumnTypeMap {
        dataset
            .columns
            .iter()
            .map(|col| {
                let mut votes = TypeVotes::default();
                for row in dataset.rows.iter().take(self.config.sample_cap) {
                    votes.record(row.get(col).unwrap_or(&CellValue::Null));
                }
                (col.clone(), votes.decide(self.config.majority_threshold))
            })
            .collect()
    }

    pub fn profile_columns(&self, dataset: &Dataset, types: &ColumnTypeMap) -> Vec<ColumnProfile> {
        dataset
            .columns
            .iter()
            .map(|col| {
                let mut distinct = HashSet::new();
                let mut null_count = 0;
                for row in dataset.rows.iter().take(self.config.sample_cap) {
                    match row.get(col) {
                        None | Some(CellValue::Null) => null_count += 1,
                        Some(cell) => {
                            distinct.insert(cell.to_key_string());
                        }
                    }
                }
                ColumnProfile {
                    name: col.clone(),
                    column_type: types.get(col).copied().unwrap_or(ColumnType::Text),
                    cardinality: distinct.len(),
                    null_count,
                }
            })
            .collect()
    }
}

impl Default for SchemaInference {
    fn default() -> Self {
        Self::new(InferenceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Row;

    fn dataset(columns: &[&str], rows: Vec<Vec<CellValue>>) -> Dataset {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let rows = rows
            .into_iter()
            .map(|cells| columns.iter().cloned().zip(cells).collect::<Row>())
            .collect();
        Dataset::new(columns, rows)
    }

    #[test]
    fn test_every_column_gets_one_type() {
        let ds = dataset(
            &["id", "price", "when", "flag", "name", "blank"],
            vec![
                vec![1.0.into(), 2.5.into(), "2024-01-02".into(), true.into(), "a".into(), CellValue::Null],
                vec![2.0.into(), 3.0.into(), "2024-02-03".into(), "no".into(), "b".into(), CellValue::Null],
                vec![3.0.into(), 4.25.into(), "03/04/2024".into(), false.into(), "c".into(), CellValue::Null],
            ],
        );
        let types = SchemaInference::default().infer_column_types(&ds);
        assert_eq!(types.len(), ds.column_count());
        assert_eq!(types["id"], ColumnType::Integer);
        assert_eq!(types["price"], ColumnType::Numeric);
        assert_eq!(types["when"], ColumnType::Date);
        assert_eq!(types["flag"], ColumnType::Boolean);
        assert_eq!(types["name"], ColumnType::Text);
        assert_eq!(types["blank"], ColumnType::Empty);
    }

    #[test]
    fn test_threshold_is_strict_majority_of_non_null() {
        // 7 of 10 numbers is exactly 70% and does not pass.
        let mut rows: Vec<Vec<CellValue>> = (0..7).map(|i| vec![CellValue::Number(i as f64 + 0.5)]).collect();
        rows.extend((0..3).map(|_| vec![CellValue::from("x")]));
        rows.push(vec![CellValue::Null]);
        let types = SchemaInference::default().infer_column_types(&dataset(&["v"], rows.clone()));
        assert_eq!(types["v"], ColumnType::Text);

        rows.push(vec![CellValue::Number(1.5)]);
        let types = SchemaInference::default().infer_column_types(&dataset(&["v"], rows));
        assert_eq!(types["v"], ColumnType::Numeric);
    }

    #[test]
    fn test_sample_cap_limits_votes() {
        let mut rows: Vec<Vec<CellValue>> = (0..5).map(|i| vec![CellValue::Number(i as f64)]).collect();
        rows.extend((0..20).map(|_| vec![CellValue::from("word")]));
        let inference = SchemaInference::new(InferenceConfig {
            sample_cap: 5,
            ..InferenceConfig::default()
        });
        assert_eq!(inference.infer_column_types(&dataset(&["v"], rows))["v"], ColumnType::Integer);
    }

    #[test]
    fn test_profiles_count_distinct_and_nulls() {
        let ds = dataset(
            &["uf"],
            vec![vec!["SP".into()], vec!["RJ".into()], vec!["SP".into()], vec![CellValue::Null]],
        );
        let inference = SchemaInference::default();
        let types = inference.infer_column_types(&ds);
        let profiles = inference.profile_columns(&ds, &types);
        assert_eq!(profiles[0].cardinality, 2);
        assert_eq!(profiles[0].null_count, 1);
        assert_eq!(profiles[0].column_type, ColumnType::Text);
    }
}
