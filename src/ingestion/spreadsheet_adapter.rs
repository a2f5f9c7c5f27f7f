//! Spreadsheet Adapter - First sheet of an XLSX/XLS/XLSB/ODS workbook

use crate::error::AdapterError;
use crate::ingestion::adapter::{AdapterMetadata, AdapterOutput, FamilyDetails, FormatAdapter, RawInput};
use crate::ingestion::detector::FileFamily;
use crate::ingestion::table_builder::{is_null_token, TableBuilder};
use crate::value::{format_number, CellValue};
use calamine::{open_workbook_auto_from_rs, Data, Reader, Sheets};
use chrono::{NaiveDateTime, Timelike};
use std::io::Cursor;
use tracing::debug;

#[derive(Debug, Default)]
struct CellStats {
    formula_errors: usize,
    dates_converted: usize,
}

fn format_datetime(dt: NaiveDateTime) -> String {
    if dt.time().num_seconds_from_midnight() == 0 {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Converts one workbook cell.
///
/// Serial numbers only become dates when the cell's number format marks
/// them as dates (calamine reports those as `Data::DateTime`); other
/// numbers stay numbers.
fn convert_cell(cell: &Data, stats: &mut CellStats) -> CellValue {
    match cell {
        Data::Empty => CellValue::Null,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) if is_null_token(s) => CellValue::Null,
        Data::String(s) => CellValue::Text(s.trim().to_string()),
        Data::DateTime(dt) if dt.is_datetime() => match dt.as_datetime() {
            Some(parsed) => {
                stats.dates_converted += 1;
                CellValue::Text(format_datetime(parsed))
            }
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) => {
            stats.formula_errors += 1;
            CellValue::Null
        }
    }
}

fn header_text(cell: &Data) -> String {
    match convert_cell(cell, &mut CellStats::default()) {
        CellValue::Null => String::new(),
        CellValue::Number(n) => format_number(n),
        CellValue::Text(s) => s,
        CellValue::Bool(b) => b.to_string(),
    }
}

fn count_merged_regions<RS>(workbook: &mut Sheets<RS>, sheet: &str) -> usize
where
    RS: std::io::Read + std::io::Seek,
{
    match workbook {
        Sheets::Xlsx(xlsx) => match xlsx.load_merged_regions() {
            Ok(()) => xlsx.merged_regions_by_sheet(sheet).len(),
            Err(e) => {
                debug!("could not load merged regions: {}", e);
                0
            }
        },
        _ => 0,
    }
}

/// Spreadsheet Adapter
pub struct SpreadsheetAdapter;

impl SpreadsheetAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SpreadsheetAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatAdapter for SpreadsheetAdapter {
    fn family(&self) -> FileFamily {
        FileFamily::Spreadsheet
    }

    fn adapt(&self, raw: &RawInput<'_>) -> Result<AdapterOutput, AdapterError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(raw.bytes)).map_err(|e| {
            AdapterError::Decode(format!(
                "the workbook could not be opened ({}); re-save it as .xlsx or export the sheet to CSV",
                e
            ))
        })?;

        let sheet_names = workbook.sheet_names();
        let sheet_name = sheet_names.first().cloned().ok_or_else(|| {
            AdapterError::Structural("the workbook contains no sheets".to_string())
        })?;

        let mut warnings = Vec::new();
        let mut limitations = Vec::new();
        if sheet_names.len() > 1 {
            warnings.push(format!(
                "Workbook has {} sheets ({}); only the first sheet '{}' was read",
                sheet_names.len(),
                sheet_names.join(", "),
                sheet_name
            ));
            limitations.push("Only the first sheet of the workbook is analyzed".to_string());
        }

        let range = workbook.worksheet_range(&sheet_name).map_err(|e| {
            AdapterError::Decode(format!("sheet '{}' could not be read: {}", sheet_name, e))
        })?;

        let merged_regions = count_merged_regions(&mut workbook, &sheet_name);
        if merged_regions > 0 {
            warnings.push(format!(
                "Sheet '{}' has {} merged region(s); only the top-left cell of each keeps its value",
                sheet_name, merged_regions
            ));
            limitations.push("Merged cells are read from their anchor cell only".to_string());
        }

        let mut rows = range
            .rows()
            .skip_while(|row| row.iter().all(|c| matches!(c, Data::Empty)));
        let headers: Vec<String> = rows
            .next()
            .map(|row| row.iter().map(header_text).collect())
            .ok_or_else(|| AdapterError::Structural(format!("sheet '{}' is empty", sheet_name)))?;

        let mut stats = CellStats::default();
        let records: Vec<Vec<CellValue>> = rows
            .map(|row| row.iter().map(|c| convert_cell(c, &mut stats)).collect())
            .collect();

        if stats.formula_errors > 0 {
            warnings.push(format!(
                "{} cell(s) contained formula errors and were treated as empty",
                stats.formula_errors
            ));
        }

        let table = TableBuilder::new().build(headers, records, &mut warnings, &mut limitations)?;
        debug!(
            sheet = %sheet_name,
            rows = table.dataset.row_count(),
            dates = stats.dates_converted,
            "spreadsheet parsed"
        );

        let metadata = AdapterMetadata {
            row_count: table.dataset.row_count(),
            discarded_rows: table.discarded_rows,
            headers_original: table.headers_original.clone(),
            headers_normalized: table.headers_normalized.clone(),
            warnings,
            limitations,
            details: FamilyDetails::Spreadsheet {
                sheet_name,
                total_sheets: sheet_names.len(),
                merged_regions,
            },
        };

        Ok(AdapterOutput {
            dataset: table.dataset,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{ExcelDateTime, ExcelDateTimeType};

    #[test]
    fn test_date_formatted_serial_becomes_date() {
        let mut stats = CellStats::default();
        let cell = Data::DateTime(ExcelDateTime::new(45292.0, ExcelDateTimeType::DateTime, false));
        assert_eq!(convert_cell(&cell, &mut stats), CellValue::from("2024-01-01"));
        assert_eq!(stats.dates_converted, 1);
    }

    #[test]
    fn test_plain_serial_stays_number() {
        let mut stats = CellStats::default();
        assert_eq!(convert_cell(&Data::Float(45292.0), &mut stats), CellValue::Number(45292.0));
        assert_eq!(convert_cell(&Data::Int(7), &mut stats), CellValue::Number(7.0));
        assert_eq!(stats.dates_converted, 0);
    }

    #[test]
    fn test_null_tokens_and_errors() {
        let mut stats = CellStats::default();
        assert_eq!(convert_cell(&Data::String("N/A".into()), &mut stats), CellValue::Null);
        assert_eq!(convert_cell(&Data::Empty, &mut stats), CellValue::Null);
        assert_eq!(
            convert_cell(&Data::Error(calamine::CellErrorType::Div0), &mut stats),
            CellValue::Null
        );
        assert_eq!(stats.formula_errors, 1);
    }

    #[test]
    fn test_header_text() {
        assert_eq!(header_text(&Data::String(" Região ".into())), "Região");
        assert_eq!(header_text(&Data::Float(2024.0)), "2024");
        assert_eq!(header_text(&Data::Empty), "");
    }

    const THREE_SHEETS: &[u8] = include_bytes!("../../tests/data/vendas_tres_abas.xlsx");

    #[test]
    fn test_workbook_reads_first_sheet_only() {
        let raw = RawInput::new(THREE_SHEETS, "vendas_tres_abas.xlsx");
        let output = SpreadsheetAdapter::new().adapt(&raw).unwrap();

        assert_eq!(output.dataset.columns, vec!["cidade", "total"]);
        assert_eq!(output.dataset.row_count(), 3);
        assert_eq!(output.dataset.rows[0]["cidade"], CellValue::from("Recife"));
        assert_eq!(output.dataset.rows[0]["total"], CellValue::Number(10.0));
        assert_eq!(output.dataset.rows[2]["total"], CellValue::Null);

        let warnings = &output.metadata.warnings;
        assert!(warnings
            .iter()
            .any(|w| w.contains("3 sheets") && w.contains("Resumo") && w.contains("Notas")));
        assert!(warnings.iter().any(|w| w.contains("1 merged region")));
        assert!(output.metadata.limitations.iter().any(|l| l.contains("first sheet")));

        match output.metadata.details {
            FamilyDetails::Spreadsheet {
                sheet_name,
                total_sheets,
                merged_regions,
            } => {
                assert_eq!(sheet_name, "Vendas");
                assert_eq!(total_sheets, 3);
                assert_eq!(merged_regions, 1);
            }
            other => panic!("unexpected details {:?}", other),
        }
    }

    #[test]
    fn test_garbage_bytes_are_decode_errors() {
        let raw = RawInput::new(b"PK\x03\x04not really a zip", "broken.xlsx");
        let err = SpreadsheetAdapter::new().adapt(&raw).unwrap_err();
        assert!(matches!(err, AdapterError::Decode(_)));
    }
}
