//! Format Adapter Trait - Abstract interface for upload families

use crate::error::AdapterError;
use crate::ingestion::detector::FileFamily;
use crate::ingestion::dialect::Delimiter;
use crate::value::Dataset;
use serde::{Deserialize, Serialize};

/// Raw upload as handed to an adapter. Not retained after the call.
#[derive(Clone, Copy, Debug)]
pub struct RawInput<'a> {
    pub bytes: &'a [u8],
    pub filename: &'a str,
}

impl<'a> RawInput<'a> {
    pub fn new(bytes: &'a [u8], filename: &'a str) -> Self {
        Self { bytes, filename }
    }
}

/// Decimal separator convention of numeric text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecimalLocale {
    Dot,
    Comma,
}

/// Top-level shape of a JSON upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonShape {
    /// `[ {...}, {...} ]`
    Array,
    /// `{ "data": [ {...} ] }`
    DataField,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextStrategy {
    Delimited,
    FixedWidth,
}

/// Facts only one family can report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum FamilyDetails {
    Delimited {
        dialect: Delimiter,
        encoding: String,
        decimal_locale: DecimalLocale,
    },
    Spreadsheet {
        sheet_name: String,
        total_sheets: usize,
        merged_regions: usize,
    },
    Json {
        format: JsonShape,
        encoding: String,
    },
    FreeText {
        strategy: TextStrategy,
        encoding: String,
        dialect: Option<Delimiter>,
        decimal_locale: Option<DecimalLocale>,
        /// Start character offset of each fixed-width column.
        column_boundaries: Vec<usize>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdapterMetadata {
    pub row_count: usize,
    pub discarded_rows: usize,
    pub headers_original: Vec<String>,
    pub headers_normalized: Vec<String>,
    pub warnings: Vec<String>,
    /// Known caveats of how this file was read.
    pub limitations: Vec<String>,
    pub details: FamilyDetails,
}

#[derive(Clone, Debug)]
pub struct AdapterOutput {
    pub dataset: Dataset,
    pub metadata: AdapterMetadata,
}

/// Format Adapter Trait
///
/// Implementations:
/// - DelimitedAdapter: CSV/TSV/semicolon/pipe text
/// - SpreadsheetAdapter: XLSX/XLS/ODS workbooks (first sheet)
/// - JsonAdapter: arrays of objects
/// - FreeTextAdapter: delimited-or-fixed-width fallback chain
/// - DocumentAdapter: Word/PDF/PowerPoint stubs that always refuse
pub trait FormatAdapter: Send + Sync {
    fn family(&self) -> FileFamily;

    fn adapt(&self, raw: &RawInput<'_>) -> Result<AdapterOutput, AdapterError>;
}
