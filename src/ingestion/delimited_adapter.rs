//! Delimited Adapter - CSV, TSV, semicolon and pipe separated text

use crate::config::SniffConfig;
use crate::error::AdapterError;
use crate::ingestion::adapter::{
    AdapterMetadata, AdapterOutput, DecimalLocale, FamilyDetails, FormatAdapter, RawInput,
};
use crate::ingestion::detector::FileFamily;
use crate::ingestion::dialect::{sniff_dialect, Delimiter};
use crate::ingestion::encoding::decode_text;
use crate::ingestion::table_builder::{coerce_text_cell, detect_decimal_locale, BuiltTable, TableBuilder};
use crate::value::CellValue;
use csv::ReaderBuilder;
use tracing::debug;

const LOCALE_SAMPLE_ROWS: usize = 200;

/// A parsed delimited table plus the conventions used to read it.
pub struct DelimitedParse {
    pub table: BuiltTable,
    pub decimal_locale: DecimalLocale,
}

/// Splits `text` into string records, honoring quotes and both doubled and
/// backslash-escaped quote characters.
fn read_records(text: &str, delimiter: Delimiter) -> Result<Vec<Vec<String>>, AdapterError> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter.as_byte())
        .has_headers(false)
        .flexible(true)
        .double_quote(true)
        .escape(Some(b'\\'))
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| {
            AdapterError::Structural(format!(
                "line {} could not be parsed ({}); check for unbalanced quotes",
                idx + 1,
                e
            ))
        })?;
        records.push(record.iter().map(|f| f.to_string()).collect());
    }
    Ok(records)
}

/// Parses already-decoded delimited text into a normalized table.
pub fn parse_delimited_text(
    text: &str,
    delimiter: Delimiter,
    warnings: &mut Vec<String>,
    limitations: &mut Vec<String>,
) -> Result<DelimitedParse, AdapterError> {
    let mut records = read_records(text, delimiter)?.into_iter();
    let headers = records.next().ok_or_else(|| {
        AdapterError::Structural("the file is empty; upload a file with a header row and data".to_string())
    })?;
    let data: Vec<Vec<String>> = records.collect();

    let decimal_locale = detect_decimal_locale(
        data.iter()
            .take(LOCALE_SAMPLE_ROWS)
            .flat_map(|r| r.iter().map(|s| s.as_str())),
        delimiter == Delimiter::Comma,
    );

    let typed = data.into_iter().map(|record| {
        record
            .iter()
            .map(|cell| coerce_text_cell(cell, decimal_locale))
            .collect::<Vec<CellValue>>()
    });
    let table = TableBuilder::new().build(headers, typed, warnings, limitations)?;

    Ok(DelimitedParse {
        table,
        decimal_locale,
    })
}

/// Delimited Adapter
pub struct DelimitedAdapter {
    sniff: SniffConfig,
}

impl DelimitedAdapter {
    pub fn new(sniff: SniffConfig) -> Self {
        Self { sniff }
    }
}

impl Default for DelimitedAdapter {
    fn default() -> Self {
        Self::new(SniffConfig::default())
    }
}

impl FormatAdapter for DelimitedAdapter {
    fn family(&self) -> FileFamily {
        FileFamily::Delimited
    }

    fn adapt(&self, raw: &RawInput<'_>) -> Result<AdapterOutput, AdapterError> {
        let decoded = decode_text(raw.bytes)?;
        let mut warnings = decoded.warnings;
        let mut limitations = Vec::new();

        if decoded.text.trim().is_empty() {
            return Err(AdapterError::Structural(
                "the file is empty; upload a file with a header row and data".to_string(),
            ));
        }

        let delimiter = match sniff_dialect(&decoded.text, self.sniff.sniff_lines) {
            Some(dialect) => dialect.delimiter,
            None => {
                let fallback = if raw.filename.to_lowercase().ends_with(".tsv") {
                    Delimiter::Tab
                } else {
                    Delimiter::Comma
                };
                warnings.push(format!(
                    "No consistent delimiter found; reading as {}-separated with a single column likely",
                    fallback.name()
                ));
                fallback
            }
        };

        let parsed = parse_delimited_text(&decoded.text, delimiter, &mut warnings, &mut limitations)?;
        debug!(
            delimiter = delimiter.name(),
            rows = parsed.table.dataset.row_count(),
            encoding = %decoded.encoding,
            "delimited file parsed"
        );

        let metadata = AdapterMetadata {
            row_count: parsed.table.dataset.row_count(),
            discarded_rows: parsed.table.discarded_rows,
            headers_original: parsed.table.headers_original.clone(),
            headers_normalized: parsed.table.headers_normalized.clone(),
            warnings,
            limitations,
            details: FamilyDetails::Delimited {
                dialect: delimiter,
                encoding: decoded.encoding,
                decimal_locale: parsed.decimal_locale,
            },
        };

        Ok(AdapterOutput {
            dataset: parsed.table.dataset,
            metadata,
        })
    }
}
