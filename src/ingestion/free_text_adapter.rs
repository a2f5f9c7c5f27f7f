//! Free Text Adapter - Delimited sniffing first, then fixed-width column guessing
//!
//! Never guesses silently: when neither strategy finds a table the upload is
//! rejected with instructions to convert it.

use crate::config::SniffConfig;
use crate::error::AdapterError;
use crate::ingestion::adapter::{
    AdapterMetadata, AdapterOutput, DecimalLocale, FamilyDetails, FormatAdapter, RawInput,
    TextStrategy,
};
use crate::ingestion::delimited_adapter::parse_delimited_text;
use crate::ingestion::detector::FileFamily;
use crate::ingestion::dialect::sniff_dialect;
use crate::ingestion::encoding::decode_text;
use crate::ingestion::table_builder::{coerce_text_cell, TableBuilder};
use crate::value::CellValue;
use tracing::{debug, info};

const CONVERT_HINT: &str =
    "convert it to CSV (comma- or semicolon-delimited) and upload again";

/// A run of character columns holding data in at least one sampled line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Segment {
    start: usize,
    end: usize,
}

/// Finds data segments separated by columns that are blank in every sampled line.
fn detect_segments(lines: &[Vec<char>]) -> Vec<Segment> {
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0);
    let occupied: Vec<bool> = (0..width)
        .map(|col| {
            lines
                .iter()
                .any(|line| line.get(col).map(|c| !c.is_whitespace()).unwrap_or(false))
        })
        .collect();

    let mut segments = Vec::new();
    let mut start: Option<usize> = None;
    for (col, used) in occupied.iter().enumerate() {
        match (start, used) {
            (None, true) => start = Some(col),
            (Some(s), false) => {
                segments.push(Segment { start: s, end: col });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        segments.push(Segment { start: s, end: width });
    }
    segments
}

/// Slices a line at the segment starts; the last field runs to end of line.
fn split_fixed(line: &[char], boundaries: &[usize]) -> Vec<String> {
    boundaries
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = boundaries.get(i + 1).copied().unwrap_or(line.len()).min(line.len());
            if start >= end {
                String::new()
            } else {
                line[start..end].iter().collect::<String>().trim().to_string()
            }
        })
        .collect()
}

struct FixedWidthParse {
    headers: Vec<String>,
    records: Vec<Vec<CellValue>>,
    boundaries: Vec<usize>,
}

fn parse_fixed_width(text: &str, sample_lines: usize) -> Option<FixedWidthParse> {
    let lines: Vec<Vec<char>> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.replace('\t', "    ").trim_end().chars().collect())
        .collect();
    if lines.len() < 2 {
        return None;
    }

    let sample = &lines[..lines.len().min(sample_lines)];
    let segments = detect_segments(sample);
    if segments.len() < 2 {
        return None;
    }
    let boundaries: Vec<usize> = segments.iter().map(|s| s.start).collect();

    let headers = split_fixed(&lines[0], &boundaries);
    let records = lines[1..]
        .iter()
        .map(|line| {
            split_fixed(line, &boundaries)
                .iter()
                .map(|cell| coerce_text_cell(cell, DecimalLocale::Dot))
                .collect()
        })
        .collect();

    Some(FixedWidthParse {
        headers,
        records,
        boundaries,
    })
}

/// Free Text Adapter
pub struct FreeTextAdapter {
    sniff: SniffConfig,
}

impl FreeTextAdapter {
    pub fn new(sniff: SniffConfig) -> Self {
        Self { sniff }
    }
}

impl Default for FreeTextAdapter {
    fn default() -> Self {
        Self::new(SniffConfig::default())
    }
}

impl FormatAdapter for FreeTextAdapter {
    fn family(&self) -> FileFamily {
        FileFamily::FreeText
    }

    fn adapt(&self, raw: &RawInput<'_>) -> Result<AdapterOutput, AdapterError> {
        let decoded = decode_text(raw.bytes)?;
        let encoding = decoded.encoding;
        let mut warnings = decoded.warnings;
        let mut limitations = Vec::new();
        let text = decoded.text;

        if text.trim().is_empty() {
            return Err(AdapterError::Structural(format!(
                "the text file is empty; {}",
                CONVERT_HINT
            )));
        }

        // Strategy 1: a confident delimiter.
        if let Some(dialect) = sniff_dialect(&text, self.sniff.sniff_lines)
            .filter(|d| d.confidence >= self.sniff.free_text_min_confidence)
        {
            let mut attempt_warnings = warnings.clone();
            let mut attempt_limitations = Vec::new();
            match parse_delimited_text(&text, dialect.delimiter, &mut attempt_warnings, &mut attempt_limitations) {
                Ok(parsed) => {
                    info!(
                        "Free text read as {}-delimited (confidence {})",
                        dialect.delimiter.name(),
                        dialect.confidence
                    );
                    let metadata = AdapterMetadata {
                        row_count: parsed.table.dataset.row_count(),
                        discarded_rows: parsed.table.discarded_rows,
                        headers_original: parsed.table.headers_original.clone(),
                        headers_normalized: parsed.table.headers_normalized.clone(),
                        warnings: attempt_warnings,
                        limitations: attempt_limitations,
                        details: FamilyDetails::FreeText {
                            strategy: TextStrategy::Delimited,
                            encoding,
                            dialect: Some(dialect.delimiter),
                            decimal_locale: Some(parsed.decimal_locale),
                            column_boundaries: Vec::new(),
                        },
                    };
                    return Ok(AdapterOutput {
                        dataset: parsed.table.dataset,
                        metadata,
                    });
                }
                Err(e) => debug!("delimited attempt on free text failed: {}", e),
            }
        }

        // Strategy 2: fixed-width columns.
        let parsed = parse_fixed_width(&text, self.sniff.fixed_width_sample_lines).ok_or_else(|| {
            AdapterError::Structural(format!(
                "no table structure was found in this text (no consistent delimiter and no aligned columns); {}",
                CONVERT_HINT
            ))
        })?;

        warnings.push(format!(
            "Columns were inferred from text alignment at character positions {:?}; check the column split",
            parsed.boundaries
        ));
        limitations.push("Fixed-width columns were guessed from blank character columns".to_string());

        let table = TableBuilder::new()
            .build(parsed.headers, parsed.records, &mut warnings, &mut limitations)
            .map_err(|e| match e {
                AdapterError::Structural(msg) => {
                    AdapterError::Structural(format!("{}; {}", msg, CONVERT_HINT))
                }
                other => other,
            })?;
        info!(
            "Free text read as fixed-width with {} columns",
            parsed.boundaries.len()
        );

        let metadata = AdapterMetadata {
            row_count: table.dataset.row_count(),
            discarded_rows: table.discarded_rows,
            headers_original: table.headers_original.clone(),
            headers_normalized: table.headers_normalized.clone(),
            warnings,
            limitations,
            details: FamilyDetails::FreeText {
                strategy: TextStrategy::FixedWidth,
                encoding,
                dialect: None,
                decimal_locale: None,
                column_boundaries: parsed.boundaries,
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
    use crate::ingestion::dialect::Delimiter;

    fn adapt(text: &str) -> Result<AdapterOutput, AdapterError> {
        FreeTextAdapter::default().adapt(&RawInput::new(text.as_bytes(), "notes.txt"))
    }

    #[test]
    fn test_delimited_text_wins_when_confident() {
        let out = adapt("cidade|total\nRio|10\nSP|20\nBH|5\n").unwrap();
        assert_eq!(out.dataset.columns, vec!["cidade", "total"]);
        match out.metadata.details {
            FamilyDetails::FreeText { strategy, dialect, .. } => {
                assert_eq!(strategy, TextStrategy::Delimited);
                assert_eq!(dialect, Some(Delimiter::Pipe));
            }
            other => panic!("unexpected details {:?}", other),
        }
    }

    #[test]
    fn test_fixed_width_columns() {
        let text = "\
Name      City        Amount
Alice     Lisbon      10.5
Bob       Porto       7
Carla     Faro        12
";
        let out = adapt(text).unwrap();
        assert_eq!(out.dataset.columns, vec!["name", "city", "amount"]);
        assert_eq!(out.dataset.row_count(), 3);
        assert_eq!(out.dataset.rows[0]["city"], CellValue::from("Lisbon"));
        assert_eq!(out.dataset.rows[1]["amount"], CellValue::Number(7.0));
        match out.metadata.details {
            FamilyDetails::FreeText { strategy, ref column_boundaries, .. } => {
                assert_eq!(strategy, TextStrategy::FixedWidth);
                assert_eq!(column_boundaries, &vec![0, 10, 22]);
            }
            other => panic!("unexpected details {:?}", other),
        }
        assert!(!out.metadata.limitations.is_empty());
    }

    #[test]
    fn test_prose_is_rejected_with_guidance() {
        let err = adapt("This is a paragraph of prose that\nwraps over several lines without any\nreal table in it at all.\n")
            .unwrap_err();
        match err {
            AdapterError::Structural(msg) => assert!(msg.contains("convert it to CSV")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_segments_split_on_common_blank_columns() {
        let lines: Vec<Vec<char>> = ["ab  cd", "a   c"].iter().map(|l| l.chars().collect()).collect();
        assert_eq!(
            detect_segments(&lines),
            vec![Segment { start: 0, end: 2 }, Segment { start: 4, end: 6 }]
        );
    }
}
