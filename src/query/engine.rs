//! Query Engine - Validates and evaluates SELECT statements over in-memory rows
//!
//! Query-level problems never escape as `Err`; they come back inside
//! [`ExecutionResult`] so the retry loop can classify and repair them.

use crate::error::QueryError;
use crate::query::ast::{
    AggregateArg, AggregateFunc, CompareOp, Condition, Connective, Literal, Predicate, SelectItem,
    SelectStatement, TABLE_NAME,
};
use crate::query::parser::parse_query;
use crate::value::{compare_cells, CellValue, ColumnType, ColumnTypeMap, Row};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Instant;
use tracing::debug;

/// Separator between group-key values; cannot appear in cell text typed by users.
const GROUP_KEY_SEPARATOR: char = '\u{1f}';

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Syntax,
    MissingGroupBy,
    InvalidColumn,
    Execution,
}

/// Structured failure carried by an unsuccessful [`ExecutionResult`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Columns the failure is about (missing GROUP BY columns, the unknown column).
    pub columns: Vec<String>,
}

impl From<&QueryError> for QueryFailure {
    fn from(err: &QueryError) -> Self {
        let (kind, columns) = match err {
            QueryError::Syntax(_) => (FailureKind::Syntax, Vec::new()),
            QueryError::MissingGroupBy { columns } => (FailureKind::MissingGroupBy, columns.clone()),
            QueryError::InvalidColumn { column, .. } => (FailureKind::InvalidColumn, vec![column.clone()]),
            QueryError::Execution(_) => (FailureKind::Execution, Vec::new()),
        };
        Self {
            kind,
            message: err.to_string(),
            columns,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub data: Vec<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<QueryFailure>,
    pub row_count: usize,
    pub duration_ms: u64,
}

impl ExecutionResult {
    fn success(data: Vec<Row>, started: Instant) -> Self {
        Self {
            success: true,
            row_count: data.len(),
            data,
            error: None,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn failure(err: &QueryError, started: Instant) -> Self {
        Self {
            success: false,
            data: Vec::new(),
            error: Some(QueryFailure::from(err)),
            row_count: 0,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Rows on success, the structured failure otherwise.
    pub fn into_result(self) -> Result<Vec<Row>, QueryFailure> {
        match self.error {
            None => Ok(self.data),
            Some(failure) => Err(failure),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}

/// Column names of the dataset, from the type map or (if that is empty) the first row.
pub fn schema_columns(rows: &[Row], column_types: &ColumnTypeMap) -> Vec<String> {
    if column_types.is_empty() {
        rows.first()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default()
    } else {
        column_types.keys().cloned().collect()
    }
}

/// Checks table name, column references and aggregate/GROUP BY mixing.
pub fn validate_statement(stmt: &SelectStatement, columns: &[String]) -> Result<(), QueryError> {
    match &stmt.from {
        None => {
            return Err(QueryError::Syntax(format!(
                "missing FROM {}; every query must read FROM {}",
                TABLE_NAME, TABLE_NAME
            )))
        }
        Some(table) if !table.eq_ignore_ascii_case(TABLE_NAME) => {
            return Err(QueryError::Syntax(format!(
                "unknown table '{}'; the only table is {}",
                table, TABLE_NAME
            )))
        }
        Some(_) => {}
    }

    let has_wildcard = stmt.projections.iter().any(|p| matches!(p, SelectItem::Wildcard));
    if has_wildcard && (stmt.has_aggregates() || !stmt.group_by.is_empty()) {
        return Err(QueryError::Syntax(
            "SELECT * cannot be combined with aggregates or GROUP BY; list the columns instead".to_string(),
        ));
    }

    let mut seen: Vec<String> = Vec::new();
    for name in stmt.output_names() {
        if seen.contains(&name) {
            return Err(QueryError::Syntax(format!(
                "duplicate output column '{}'; give each selected column a distinct alias",
                name
            )));
        }
        seen.push(name);
    }

    for column in stmt.referenced_columns() {
        if !columns.contains(&column) {
            return Err(QueryError::InvalidColumn {
                column,
                available: columns.to_vec(),
            });
        }
    }

    let output_names = stmt.output_names();
    for key in &stmt.order_by {
        if !columns.contains(&key.column) && !output_names.contains(&key.column) {
            let mut available = columns.to_vec();
            available.extend(output_names.iter().filter(|n| !columns.contains(n)).cloned());
            return Err(QueryError::InvalidColumn {
                column: key.column.clone(),
                available,
            });
        }
    }

    if stmt.has_aggregates() && stmt.group_by.is_empty() {
        let plain = stmt.plain_columns();
        if !plain.is_empty() {
            return Err(QueryError::MissingGroupBy { columns: plain });
        }
    }

    Ok(())
}

fn column_type(types: &ColumnTypeMap, column: &str) -> ColumnType {
    types.get(column).copied().unwrap_or(ColumnType::Text)
}

fn evaluate_condition(cond: &Condition, row: &Row, types: &ColumnTypeMap) -> Result<bool, QueryError> {
    let cell = row.get(&cond.column).unwrap_or(&CellValue::Null);
    let (op, literal) = match &cond.predicate {
        Predicate::IsNull => return Ok(cell.is_null()),
        Predicate::IsNotNull => return Ok(!cell.is_null()),
        Predicate::Compare { op, value } => (*op, value),
    };
    if cell.is_null() {
        return Ok(false);
    }

    let ctype = column_type(types, &cond.column);

    if ctype == ColumnType::Date {
        if let (Some(a), Some(b)) = (cell.as_date(), crate::value::parse_date(literal.text())) {
            return Ok(apply(op, a.cmp(&b)));
        }
    }

    if op.is_range() {
        let rhs = literal.as_f64().ok_or_else(|| {
            QueryError::Execution(format!(
                "operator {} needs a number but '{}' is not numeric (column '{}')",
                op.symbol(),
                literal.text(),
                cond.column
            ))
        })?;
        return Ok(match cell.as_f64() {
            Some(lhs) => apply(op, lhs.partial_cmp(&rhs).unwrap_or(Ordering::Equal)),
            None => false,
        });
    }

    let equal = literal_equals(cell, literal);
    Ok(if op == CompareOp::Eq { equal } else { !equal })
}

fn literal_equals(cell: &CellValue, literal: &Literal) -> bool {
    if let (Some(a), Some(b)) = (cell.as_f64(), literal.as_f64()) {
        return a == b;
    }
    match cell {
        CellValue::Bool(b) => literal.text().eq_ignore_ascii_case(&b.to_string()),
        other => other.to_key_string() == literal.text(),
    }
}

fn apply(op: CompareOp, ordering: Ordering) -> bool {
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::NotEq => ordering != Ordering::Equal,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::GtEq => ordering != Ordering::Less,
        CompareOp::LtEq => ordering != Ordering::Greater,
    }
}

fn row_matches(stmt: &SelectStatement, row: &Row, types: &ColumnTypeMap) -> Result<bool, QueryError> {
    let filter = match &stmt.filter {
        Some(filter) => filter,
        None => return Ok(true),
    };
    let mut result = evaluate_condition(&filter.first, row, types)?;
    for (connective, cond) in &filter.rest {
        let next = evaluate_condition(cond, row, types)?;
        result = match connective {
            Connective::And => result && next,
            Connective::Or => result || next,
        };
    }
    Ok(result)
}

fn aggregate(
    func: AggregateFunc,
    arg: &AggregateArg,
    rows: &[&Row],
    types: &ColumnTypeMap,
) -> Result<CellValue, QueryError> {
    let column = match arg {
        AggregateArg::Star => return Ok(CellValue::Number(rows.len() as f64)),
        AggregateArg::Column(column) => column,
    };
    let values: Vec<&CellValue> = rows
        .iter()
        .filter_map(|r| r.get(column))
        .filter(|v| !v.is_null())
        .collect();
    let ctype = column_type(types, column);

    match func {
        AggregateFunc::Count => Ok(CellValue::Number(values.len() as f64)),
        AggregateFunc::Sum | AggregateFunc::Avg => {
            if !ctype.is_numeric() && ctype != ColumnType::Empty {
                return Err(QueryError::Execution(format!(
                    "{} needs a numeric column but '{}' is {}",
                    func.as_str(),
                    column,
                    ctype
                )));
            }
            let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
            if numbers.is_empty() {
                return Ok(CellValue::Null);
            }
            let sum: f64 = numbers.iter().sum();
            Ok(CellValue::Number(match func {
                AggregateFunc::Avg => sum / numbers.len() as f64,
                _ => sum,
            }))
        }
        AggregateFunc::Min | AggregateFunc::Max => {
            let best = values.into_iter().reduce(|best, v| {
                let ord = compare_cells(v, best, ctype);
                let better = match func {
                    AggregateFunc::Min => ord == Ordering::Less,
                    _ => ord == Ordering::Greater,
                };
                if better {
                    v
                } else {
                    best
                }
            });
            Ok(best.cloned().unwrap_or(CellValue::Null))
        }
    }
}

/// Types of the result columns, used to sort them.
fn output_types(stmt: &SelectStatement, types: &ColumnTypeMap) -> ColumnTypeMap {
    let mut out = ColumnTypeMap::new();
    for item in &stmt.projections {
        match item {
            SelectItem::Wildcard => out.extend(types.iter().map(|(k, v)| (k.clone(), *v))),
            SelectItem::Column { name, .. } => {
                out.insert(item.output_name(), column_type(types, name));
            }
            SelectItem::Aggregate { func, arg, .. } => {
                let t = match (func, arg) {
                    (AggregateFunc::Count, _) => ColumnType::Integer,
                    (AggregateFunc::Sum | AggregateFunc::Avg, _) => ColumnType::Numeric,
                    (_, AggregateArg::Column(col)) => column_type(types, col),
                    (_, AggregateArg::Star) => ColumnType::Numeric,
                };
                out.insert(item.output_name(), t);
            }
        }
    }
    out
}

fn project(stmt: &SelectStatement, row: &Row) -> Row {
    let mut out = Row::new();
    for item in &stmt.projections {
        match item {
            SelectItem::Wildcard => out.extend(row.iter().map(|(k, v)| (k.clone(), v.clone()))),
            SelectItem::Column { name, .. } => {
                out.insert(item.output_name(), row.get(name).cloned().unwrap_or_default());
            }
            SelectItem::Aggregate { .. } => {}
        }
    }
    out
}

fn aggregate_bucket(
    stmt: &SelectStatement,
    bucket: &[&Row],
    types: &ColumnTypeMap,
) -> Result<Row, QueryError> {
    let mut out = Row::new();
    for item in &stmt.projections {
        match item {
            SelectItem::Aggregate { func, arg, .. } => {
                out.insert(item.output_name(), aggregate(*func, arg, bucket, types)?);
            }
            // First row wins for non-aggregated columns.
            SelectItem::Column { name, .. } => {
                let value = bucket
                    .first()
                    .and_then(|r| r.get(name))
                    .cloned()
                    .unwrap_or_default();
                out.insert(item.output_name(), value);
            }
            SelectItem::Wildcard => {}
        }
    }
    Ok(out)
}

/// Query Engine
#[derive(Clone, Debug, Default)]
pub struct QueryEngine;

impl QueryEngine {
    pub fn new() -> Self {
        Self
    }

    /// Parse, validate and run `query` against `rows`.
    pub fn execute(&self, rows: &[Row], column_types: &ColumnTypeMap, query: &str) -> ExecutionResult {
        let started = Instant::now();
        let stmt = match parse_query(query) {
            Ok(stmt) => stmt,
            Err(e) => {
                debug!("query rejected by parser: {}", e);
                return ExecutionResult::failure(&e, started);
            }
        };
        match self.run(rows, column_types, &stmt) {
            Ok(data) => ExecutionResult::success(data, started),
            Err(e) => {
                debug!("query failed: {}", e);
                ExecutionResult::failure(&e, started)
            }
        }
    }

    /// Run an already-parsed statement.
    pub fn execute_statement(
        &self,
        rows: &[Row],
        column_types: &ColumnTypeMap,
        stmt: &SelectStatement,
    ) -> ExecutionResult {
        let started = Instant::now();
        match self.run(rows, column_types, stmt) {
            Ok(data) => ExecutionResult::success(data, started),
            Err(e) => ExecutionResult::failure(&e, started),
        }
    }

    fn run(
        &self,
        rows: &[Row],
        column_types: &ColumnTypeMap,
        stmt: &SelectStatement,
    ) -> Result<Vec<Row>, QueryError> {
        let columns = schema_columns(rows, column_types);
        validate_statement(stmt, &columns)?;

        let mut filtered: Vec<&Row> = Vec::new();
        for row in rows {
            if row_matches(stmt, row, column_types)? {
                filtered.push(row);
            }
        }

        // Each output row keeps the source row it came from so ORDER BY can
        // use source columns that were not selected.
        let mut output: Vec<(Row, Option<&Row>)> = if !stmt.group_by.is_empty() {
            let mut buckets: IndexMap<String, Vec<&Row>> = IndexMap::new();
            for row in &filtered {
                let key = stmt
                    .group_by
                    .iter()
                    .map(|c| row.get(c).map(CellValue::to_key_string).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(&GROUP_KEY_SEPARATOR.to_string());
                buckets.entry(key).or_default().push(row);
            }
            let mut grouped = Vec::with_capacity(buckets.len());
            for bucket in buckets.values() {
                grouped.push((aggregate_bucket(stmt, bucket, column_types)?, bucket.first().copied()));
            }
            grouped
        } else if stmt.has_aggregates() {
            vec![(aggregate_bucket(stmt, &filtered, column_types)?, None)]
        } else {
            filtered.iter().map(|r| (project(stmt, r), Some(*r))).collect()
        };

        if !stmt.order_by.is_empty() {
            let out_types = output_types(stmt, column_types);
            output.sort_by(|(a, a_src), (b, b_src)| {
                for key in &stmt.order_by {
                    let (x, y, t) = if out_types.contains_key(&key.column) {
                        (a.get(&key.column), b.get(&key.column), out_types[&key.column])
                    } else {
                        (
                            a_src.and_then(|r| r.get(&key.column)),
                            b_src.and_then(|r| r.get(&key.column)),
                            column_type(column_types, &key.column),
                        )
                    };
                    let null = CellValue::Null;
                    let (x, y) = (x.unwrap_or(&null), y.unwrap_or(&null));
                    let ord = compare_cells(x, y, t);
                    // Nulls lead in both directions.
                    let ord = if key.descending && !x.is_null() && !y.is_null() {
                        ord.reverse()
                    } else {
                        ord
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let mut data: Vec<Row> = output.into_iter().map(|(row, _)| row).collect();
        if let Some(limit) = stmt.limit {
            data.truncate(limit);
        }
        debug!(rows_in = rows.len(), rows_out = data.len(), "query executed");
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(columns: &[&str], data: Vec<Vec<CellValue>>) -> Vec<Row> {
        data.into_iter()
            .map(|cells| columns.iter().map(|c| c.to_string()).zip(cells).collect())
            .collect()
    }

    fn types(pairs: &[(&str, ColumnType)]) -> ColumnTypeMap {
        pairs.iter().map(|(c, t)| (c.to_string(), *t)).collect()
    }

    fn sales() -> (Vec<Row>, ColumnTypeMap) {
        (
            rows(
                &["categoria", "total"],
                vec![
                    vec!["x".into(), 5.0.into()],
                    vec!["x".into(), 7.0.into()],
                    vec!["y".into(), 2.0.into()],
                ],
            ),
            types(&[("categoria", ColumnType::Text), ("total", ColumnType::Integer)]),
        )
    }

    #[test]
    fn test_grouped_sum() {
        let (data, t) = sales();
        let result = QueryEngine::new().execute(&data, &t, "SELECT categoria, SUM(total) FROM data GROUP BY categoria");
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.row_count, 2);
        assert_eq!(result.data[0]["categoria"], CellValue::from("x"));
        assert_eq!(result.data[0]["sum_total"], CellValue::Number(12.0));
        assert_eq!(result.data[1]["sum_total"], CellValue::Number(2.0));
        let json = serde_json::to_value(&result.data).unwrap();
        assert_eq!(json, serde_json::json!([{"categoria": "x", "sum_total": 12}, {"categoria": "y", "sum_total": 2}]));
    }

    #[test]
    fn test_missing_group_by_names_columns_then_succeeds_when_added() {
        let (data, t) = sales();
        let engine = QueryEngine::new();
        let result = engine.execute(&data, &t, "SELECT categoria, SUM(total) FROM data");
        assert!(!result.success);
        let failure = result.error.unwrap();
        assert_eq!(failure.kind, FailureKind::MissingGroupBy);
        assert_eq!(failure.columns, vec!["categoria"]);
        assert!(failure.message.contains("categoria"));

        let fixed = engine.execute(&data, &t, "SELECT categoria, SUM(total) FROM data GROUP BY categoria");
        assert!(fixed.success);
    }

    #[test]
    fn test_count_star_on_whole_dataset() {
        let (data, t) = sales();
        let result = QueryEngine::new().execute(&data, &t, "SELECT COUNT(*) FROM data");
        assert!(result.success);
        assert_eq!(result.data, vec![Row::from_iter([("count".to_string(), CellValue::Number(3.0))])]);

        let empty = QueryEngine::new().execute(&data, &t, "SELECT COUNT(*), MAX(total) FROM data WHERE total > 100");
        assert_eq!(empty.data[0]["count"], CellValue::Number(0.0));
        assert_eq!(empty.data[0]["max_total"], CellValue::Null);
    }

    #[test]
    fn test_order_by_is_stable() {
        let data = rows(
            &["id", "grupo"],
            vec![
                vec![1.0.into(), "b".into()],
                vec![2.0.into(), "a".into()],
                vec![3.0.into(), "b".into()],
                vec![4.0.into(), "a".into()],
                vec![5.0.into(), "b".into()],
            ],
        );
        let t = types(&[("id", ColumnType::Integer), ("grupo", ColumnType::Text)]);
        let result = QueryEngine::new().execute(&data, &t, "SELECT id FROM data ORDER BY grupo");
        let ids: Vec<CellValue> = result.data.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![2.0.into(), 4.0.into(), 1.0.into(), 3.0.into(), 5.0.into()]);

        let desc = QueryEngine::new().execute(&data, &t, "SELECT id, grupo FROM data ORDER BY grupo DESC LIMIT 2");
        let ids: Vec<CellValue> = desc.data.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![1.0.into(), 3.0.into()]);
    }

    #[test]
    fn test_order_by_uses_column_type() {
        let data = rows(
            &["n", "d"],
            vec![
                vec!["10".into(), "02/01/2024".into()],
                vec!["9".into(), "2023-12-31".into()],
                vec![CellValue::Null, "2024-01-15".into()],
            ],
        );
        let t = types(&[("n", ColumnType::Numeric), ("d", ColumnType::Date)]);
        let engine = QueryEngine::new();
        let by_n = engine.execute(&data, &t, "SELECT n FROM data ORDER BY n");
        assert_eq!(by_n.data[0]["n"], CellValue::Null);
        assert_eq!(by_n.data[1]["n"], CellValue::from("9"));

        let by_d = engine.execute(&data, &t, "SELECT d FROM data ORDER BY d DESC");
        assert_eq!(by_d.data[0]["d"], CellValue::from("2024-01-15"));
        assert_eq!(by_d.data[2]["d"], CellValue::from("2023-12-31"));
    }

    #[test]
    fn test_where_left_to_right_without_precedence() {
        let (data, t) = sales();
        // (categoria = 'y' OR total = 5) AND total > 3  -> only the row with total 5
        let result = QueryEngine::new().execute(
            &data,
            &t,
            "SELECT total FROM data WHERE categoria = 'y' OR total = 5 AND total > 3",
        );
        assert_eq!(result.row_count, 1);
        assert_eq!(result.data[0]["total"], CellValue::Number(5.0));
    }

    #[test]
    fn test_where_operators_and_failures() {
        let (data, t) = sales();
        let engine = QueryEngine::new();
        assert_eq!(engine.execute(&data, &t, "SELECT * FROM data WHERE total >= 5").row_count, 2);
        assert_eq!(engine.execute(&data, &t, "SELECT * FROM data WHERE total <> '7'").row_count, 2);
        assert_eq!(engine.execute(&data, &t, "SELECT * FROM data WHERE categoria = x").row_count, 2);
        assert_eq!(engine.execute(&data, &t, "SELECT * FROM data WHERE categoria IS NOT NULL").row_count, 3);

        let bad = engine.execute(&data, &t, "SELECT * FROM data WHERE total > 'abc'");
        assert_eq!(bad.error.unwrap().kind, FailureKind::Execution);
    }

    #[test]
    fn test_invalid_column_and_table() {
        let (data, t) = sales();
        let engine = QueryEngine::new();
        let result = engine.execute(&data, &t, "SELECT preco FROM data");
        let failure = result.error.unwrap();
        assert_eq!(failure.kind, FailureKind::InvalidColumn);
        assert_eq!(failure.columns, vec!["preco"]);
        assert!(failure.message.contains("categoria"));

        let result = engine.execute(&data, &t, "SELECT total FROM vendas");
        assert_eq!(result.error.unwrap().kind, FailureKind::Syntax);
        let result = engine.execute(&data, &t, "SELECT total");
        assert!(result.error.unwrap().message.contains("missing FROM data"));
    }

    #[test]
    fn test_first_row_wins_for_ungrouped_columns() {
        let data = rows(
            &["uf", "cidade", "v"],
            vec![
                vec!["SP".into(), "Campinas".into(), 1.0.into()],
                vec!["SP".into(), "Santos".into(), 2.0.into()],
            ],
        );
        let t = types(&[("uf", ColumnType::Text), ("cidade", ColumnType::Text), ("v", ColumnType::Integer)]);
        let result = QueryEngine::new().execute(&data, &t, "SELECT uf, cidade, AVG(v) AS media FROM data GROUP BY uf");
        assert_eq!(result.data[0]["cidade"], CellValue::from("Campinas"));
        assert_eq!(result.data[0]["media"], CellValue::Number(1.5));
    }

    #[test]
    fn test_sum_of_text_column_fails() {
        let (data, t) = sales();
        let result = QueryEngine::new().execute(&data, &t, "SELECT SUM(categoria) FROM data");
        assert_eq!(result.error.unwrap().kind, FailureKind::Execution);
    }

    #[test]
    fn test_order_by_alias_and_min_max() {
        let (data, t) = sales();
        let result = QueryEngine::new().execute(
            &data,
            &t,
            "SELECT categoria, COUNT(*) AS n, MIN(total), MAX(total) FROM data GROUP BY categoria ORDER BY n ASC",
        );
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.data[0]["categoria"], CellValue::from("y"));
        assert_eq!(result.data[1]["min_total"], CellValue::Number(5.0));
        assert_eq!(result.data[1]["max_total"], CellValue::Number(7.0));
    }

    #[test]
    fn test_nulls_lead_in_both_directions() {
        let data = rows(
            &["n"],
            vec![vec![3.0.into()], vec![CellValue::Null], vec![7.0.into()]],
        );
        let t = types(&[("n", ColumnType::Numeric)]);
        let engine = QueryEngine::new();

        let desc = engine.execute(&data, &t, "SELECT n FROM data ORDER BY n DESC");
        assert_eq!(desc.data[0]["n"], CellValue::Null);
        assert_eq!(desc.data[1]["n"], CellValue::Number(7.0));
        assert_eq!(desc.data[2]["n"], CellValue::Number(3.0));

        let top = engine.execute(&data, &t, "SELECT n FROM data ORDER BY n DESC LIMIT 1");
        assert_eq!(top.data[0]["n"], CellValue::Null);
    }

    #[test]
    fn test_duplicate_output_names_are_rejected() {
        let (data, t) = sales();
        let engine = QueryEngine::new();
        let result = engine.execute(&data, &t, "SELECT total AS sum_total, SUM(total) FROM data");
        let failure = result.error.unwrap();
        assert_eq!(failure.kind, FailureKind::Syntax);
        assert!(failure.message.contains("duplicate output column 'sum_total'"));

        let result = engine.execute(&data, &t, "SELECT categoria, categoria FROM data");
        assert!(!result.success);

        let aliased = engine.execute(&data, &t, "SELECT categoria, SUM(total) AS soma FROM data GROUP BY categoria");
        assert!(aliased.success, "{:?}", aliased.error);
    }
}
