//! Row Model - Closed cell values, rows, datasets and column types
//!
//! Every adapter produces the same shape: an ordered column list and rows
//! keyed by those columns. Cells are a closed enum so the query engine has
//! to handle each case explicitly.

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Null,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Numeric view of the cell. Text is parsed; booleans are not numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            CellValue::Bool(_) | CellValue::Null => None,
        }
    }

    /// Date view of the cell (text only).
    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::Text(s) => parse_date(s),
            _ => None,
        }
    }

    /// Text used for grouping keys, equality against literals and lexical sorting.
    pub fn to_key_string(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.clone(),
            CellValue::Bool(b) => b.to_string(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "null"),
            other => write!(f, "{}", other.to_key_string()),
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

fn is_integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER
}

/// Integral numbers print without a trailing `.0`.
pub fn format_number(n: f64) -> String {
    if is_integral(n) {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_none(),
            CellValue::Number(n) if is_integral(*n) => serializer.serialize_i64(*n as i64),
            CellValue::Number(n) => serializer.serialize_f64(*n),
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

impl<'de> Deserialize<'de> for CellValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::Null => CellValue::Null,
            serde_json::Value::Bool(b) => CellValue::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or_default(),
            serde_json::Value::String(s) => CellValue::Text(s),
            other => CellValue::Text(other.to_string()),
        })
    }
}

/// One row: normalized column name to cell, in source column order.
pub type Row = IndexMap<String, CellValue>;

/// Rows sharing one column set. Never mutated after adaptation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Inferred logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Numeric,
    Integer,
    Date,
    Boolean,
    Text,
    Empty,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Integer => "integer",
            ColumnType::Date => "date",
            ColumnType::Boolean => "boolean",
            ColumnType::Text => "text",
            ColumnType::Empty => "empty",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Numeric | ColumnType::Integer)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column name to inferred type, in column order.
pub type ColumnTypeMap = IndexMap<String, ColumnType>;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Parses the date shapes uploads commonly carry.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.len() < 8 || s.len() > 32 {
        return None;
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Ordering used by ORDER BY and MIN/MAX for a declared column type.
///
/// Nulls sort first. Values that cannot be read as the declared type fall
/// back to lexical comparison.
pub fn compare_cells(a: &CellValue, b: &CellValue, column_type: ColumnType) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }

    match column_type {
        ColumnType::Numeric | ColumnType::Integer => {
            if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            }
        }
        ColumnType::Date => {
            if let (Some(x), Some(y)) = (a.as_date(), b.as_date()) {
                return x.cmp(&y);
            }
        }
        ColumnType::Boolean => {
            if let (CellValue::Bool(x), CellValue::Bool(y)) = (a, b) {
                return x.cmp(y);
            }
        }
        ColumnType::Text | ColumnType::Empty => {}
    }

    if let (CellValue::Number(x), CellValue::Number(y)) = (a, b) {
        return x.partial_cmp(y).unwrap_or(Ordering::Equal);
    }
    a.to_key_string().cmp(&b.to_key_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integral_numbers_serialize_as_integers() {
        let json = serde_json::to_string(&CellValue::Number(10.0)).unwrap();
        assert_eq!(json, "10");
        let json = serde_json::to_string(&CellValue::Number(2.5)).unwrap();
        assert_eq!(json, "2.5");
        let json = serde_json::to_string(&CellValue::Null).unwrap();
        assert_eq!(json, "null");
    }

    #[test]
    fn test_parse_date_shapes() {
        assert!(parse_date("2024-03-01").is_some());
        assert!(parse_date("01/03/2024").is_some());
        assert!(parse_date("2024-03-01 10:15:00").is_some());
        assert!(parse_date("2024-03-01T10:15:00Z").is_some());
        assert!(parse_date("hello").is_none());
        assert!(parse_date("12345").is_none());
    }

    #[test]
    fn test_compare_cells_nulls_first_and_typed() {
        let null = CellValue::Null;
        let two = CellValue::Text("2".to_string());
        let ten = CellValue::Text("10".to_string());
        assert_eq!(compare_cells(&null, &two, ColumnType::Numeric), Ordering::Less);
        assert_eq!(compare_cells(&two, &ten, ColumnType::Numeric), Ordering::Less);
        assert_eq!(compare_cells(&two, &ten, ColumnType::Text), Ordering::Greater);

        let early = CellValue::Text("02/01/2024".to_string());
        let late = CellValue::Text("01/02/2024".to_string());
        assert_eq!(compare_cells(&early, &late, ColumnType::Date), Ordering::Less);
    }
}
