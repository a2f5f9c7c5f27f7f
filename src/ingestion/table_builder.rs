//! Table Builder - Turns raw header and record cells into a normalized Dataset
//!
//! Shared by every adapter so null handling, ragged rows and header
//! normalization behave the same regardless of the source format.

use crate::error::AdapterError;
use crate::ingestion::adapter::DecimalLocale;
use crate::ingestion::headers::normalize_headers;
use crate::value::{CellValue, Dataset, Row};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PLAIN_NUMBER: Regex = Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").unwrap();
    static ref DOT_THOUSANDS: Regex = Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d+)?$").unwrap();
    static ref COMMA_DECIMAL: Regex = Regex::new(r"^[+-]?\d+,\d+$").unwrap();
    static ref COMMA_THOUSANDS: Regex = Regex::new(r"^[+-]?\d{1,3}(\.\d{3})+(,\d+)?$").unwrap();
    static ref LEADING_ZERO: Regex = Regex::new(r"^[+-]?0\d").unwrap();
    static ref COMMA_VOTE: Regex = Regex::new(r"^[+-]?(\d{1,3}(\.\d{3})+|\d+),\d+$").unwrap();
    static ref DOT_VOTE: Regex = Regex::new(r"^[+-]?(\d{1,3}(,\d{3})+|\d+)\.\d+$").unwrap();
}

const NULL_TOKENS: &[&str] = &["", "na", "n/a", "null"];

/// True for the null-token vocabulary (case-insensitive, surrounding whitespace ignored).
pub fn is_null_token(raw: &str) -> bool {
    let trimmed = raw.trim();
    NULL_TOKENS.iter().any(|t| trimmed.eq_ignore_ascii_case(t))
}

/// Guesses the decimal convention from numeric-looking tokens.
///
/// Comma decimals are only considered when the delimiter is not a comma.
pub fn detect_decimal_locale<'a>(
    tokens: impl IntoIterator<Item = &'a str>,
    delimiter_is_comma: bool,
) -> DecimalLocale {
    if delimiter_is_comma {
        return DecimalLocale::Dot;
    }
    let mut comma_votes = 0usize;
    let mut dot_votes = 0usize;
    for token in tokens.into_iter().take(500) {
        let t = token.trim();
        if COMMA_VOTE.is_match(t) {
            comma_votes += 1;
        } else if DOT_VOTE.is_match(t) {
            dot_votes += 1;
        }
    }
    if comma_votes > dot_votes {
        DecimalLocale::Comma
    } else {
        DecimalLocale::Dot
    }
}

fn parse_number(t: &str, locale: DecimalLocale) -> Option<f64> {
    if LEADING_ZERO.is_match(t) && !t.contains(['.', ',']) {
        return None;
    }
    let canonical = match locale {
        DecimalLocale::Dot => {
            if PLAIN_NUMBER.is_match(t) {
                t.to_string()
            } else if DOT_THOUSANDS.is_match(t) {
                t.replace(',', "")
            } else {
                return None;
            }
        }
        DecimalLocale::Comma => {
            if COMMA_THOUSANDS.is_match(t) {
                t.replace('.', "").replace(',', ".")
            } else if COMMA_DECIMAL.is_match(t) {
                t.replace(',', ".")
            } else if PLAIN_NUMBER.is_match(t) && !t.contains('.') {
                t.to_string()
            } else {
                return None;
            }
        }
    };
    canonical.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Converts a text cell: null tokens, booleans, locale-aware numbers, else trimmed text.
pub fn coerce_text_cell(raw: &str, locale: DecimalLocale) -> CellValue {
    if is_null_token(raw) {
        return CellValue::Null;
    }
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        return CellValue::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return CellValue::Bool(false);
    }
    match parse_number(trimmed, locale) {
        Some(n) => CellValue::Number(n),
        None => CellValue::Text(trimmed.to_string()),
    }
}

/// Result of assembling one table.
#[derive(Clone, Debug)]
pub struct BuiltTable {
    pub dataset: Dataset,
    pub headers_original: Vec<String>,
    pub headers_normalized: Vec<String>,
    pub discarded_rows: usize,
    pub truncated_rows: usize,
}

/// Table Builder - header normalization, padding/truncation and discard rules
pub struct TableBuilder;

impl TableBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Builds a dataset from a header row and already-typed record cells.
    ///
    /// Short rows are padded with nulls, long rows are truncated (with one
    /// aggregated warning), and rows that are entirely null are discarded
    /// and counted separately.
    pub fn build<I>(
        &self,
        raw_headers: Vec<String>,
        records: I,
        warnings: &mut Vec<String>,
        limitations: &mut Vec<String>,
    ) -> Result<BuiltTable, AdapterError>
    where
        I: IntoIterator<Item = Vec<CellValue>>,
    {
        if raw_headers.is_empty() || raw_headers.iter().all(|h| h.trim().is_empty()) {
            return Err(AdapterError::Structural(
                "no header row was found; the first row must name the columns".to_string(),
            ));
        }

        let headers_original: Vec<String> = raw_headers.iter().map(|h| h.trim().to_string()).collect();
        let headers_normalized = normalize_headers(&headers_original);
        let width = headers_normalized.len();

        let mut rows = Vec::new();
        let mut discarded_rows = 0usize;
        let mut truncated_rows = 0usize;
        let mut padded_rows = 0usize;

        for mut cells in records {
            if cells.len() > width {
                truncated_rows += 1;
                cells.truncate(width);
            } else if cells.len() < width {
                padded_rows += 1;
                cells.resize(width, CellValue::Null);
            }

            if cells.iter().all(CellValue::is_null) {
                discarded_rows += 1;
                continue;
            }

            let row: Row = headers_normalized.iter().cloned().zip(cells).collect();
            rows.push(row);
        }

        if truncated_rows > 0 {
            warnings.push(format!(
                "{} row(s) had more fields than the {} header columns; extra fields were dropped",
                truncated_rows, width
            ));
            limitations.push("Fields beyond the header width were discarded".to_string());
        }
        if padded_rows > 0 {
            warnings.push(format!(
                "{} row(s) had fewer fields than the header; missing fields were set to null",
                padded_rows
            ));
        }
        if discarded_rows > 0 {
            warnings.push(format!("{} empty row(s) were discarded", discarded_rows));
        }

        if rows.is_empty() {
            return Err(AdapterError::Structural(
                "the file has a header but no data rows".to_string(),
            ));
        }

        Ok(BuiltTable {
            dataset: Dataset::new(headers_normalized.clone(), rows),
            headers_original,
            headers_normalized,
            discarded_rows,
            truncated_rows,
        })
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}
