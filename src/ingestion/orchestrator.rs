//! Ingestion Orchestrator - Detect, dispatch, infer types, assemble telemetry
//!
//! The only way callers reach an adapter.

use crate::config::{megabytes_to_bytes, EngineConfig};
use crate::error::IngestError;
use crate::ingestion::adapter::{
    AdapterMetadata, DecimalLocale, FamilyDetails, FormatAdapter, JsonShape, RawInput,
    TextStrategy,
};
use crate::ingestion::delimited_adapter::DelimitedAdapter;
use crate::ingestion::detector::{DetectionResult, FileFamily, FileTypeDetector};
use crate::ingestion::dialect::Delimiter;
use crate::ingestion::document_adapter::DocumentAdapter;
use crate::ingestion::free_text_adapter::FreeTextAdapter;
use crate::ingestion::json_adapter::JsonAdapter;
use crate::ingestion::schema_inference::{ColumnProfile, SchemaInference};
use crate::ingestion::spreadsheet_adapter::SpreadsheetAdapter;
use crate::value::{ColumnTypeMap, Dataset};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// How one ingestion call resolved.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestTelemetry {
    pub ingest_id: Uuid,
    pub ingested_at: DateTime<Utc>,
    pub family: FileFamily,
    pub row_count: usize,
    pub column_count: usize,
    pub discarded_rows: usize,
    pub file_size_bytes: u64,
    pub detection_confidence: u8,
    pub headers_original: Vec<String>,
    pub headers_normalized: Vec<String>,
    pub ingest_warnings: Vec<String>,
    pub limitations: Vec<String>,
    pub column_types: ColumnTypeMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialect: Option<Delimiter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimal_locale: Option<DecimalLocale>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_sheets: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<JsonShape>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_strategy: Option<TextStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_boundaries: Option<Vec<usize>>,
}

impl IngestTelemetry {
    fn assemble(
        detection: &DetectionResult,
        metadata: AdapterMetadata,
        dataset: &Dataset,
        column_types: ColumnTypeMap,
    ) -> Self {
        let mut ingest_warnings = detection.warnings.clone();
        ingest_warnings.extend(metadata.warnings);

        let mut telemetry = Self {
            ingest_id: Uuid::new_v4(),
            ingested_at: Utc::now(),
            family: detection.family,
            row_count: dataset.row_count(),
            column_count: dataset.column_count(),
            discarded_rows: metadata.discarded_rows,
            file_size_bytes: detection.size_bytes,
            detection_confidence: detection.confidence,
            headers_original: metadata.headers_original,
            headers_normalized: metadata.headers_normalized,
            ingest_warnings,
            limitations: metadata.limitations,
            column_types,
            dialect: None,
            decimal_locale: None,
            encoding: None,
            sheet_name: None,
            total_sheets: None,
            format: None,
            text_strategy: None,
            column_boundaries: None,
        };

        match metadata.details {
            FamilyDetails::Delimited {
                dialect,
                encoding,
                decimal_locale,
            } => {
                telemetry.dialect = Some(dialect);
                telemetry.encoding = Some(encoding);
                telemetry.decimal_locale = Some(decimal_locale);
            }
            FamilyDetails::Spreadsheet {
                sheet_name,
                total_sheets,
                ..
            } => {
                telemetry.sheet_name = Some(sheet_name);
                telemetry.total_sheets = Some(total_sheets);
            }
            FamilyDetails::Json { format, encoding } => {
                telemetry.format = Some(format);
                telemetry.encoding = Some(encoding);
            }
            FamilyDetails::FreeText {
                strategy,
                encoding,
                dialect,
                decimal_locale,
                column_boundaries,
            } => {
                telemetry.text_strategy = Some(strategy);
                telemetry.encoding = Some(encoding);
                telemetry.dialect = dialect;
                telemetry.decimal_locale = decimal_locale;
                if strategy == TextStrategy::FixedWidth {
                    telemetry.column_boundaries = Some(column_boundaries);
                }
            }
        }
        telemetry
    }
}

/// Rows, their inferred types and the telemetry describing how they were read.
#[derive(Clone, Debug)]
pub struct IngestOutcome {
    pub dataset: Dataset,
    pub column_types: ColumnTypeMap,
    pub profiles: Vec<ColumnProfile>,
    pub telemetry: IngestTelemetry,
}

/// Ingestion Orchestrator - Coordinates detection, adaptation and inference
pub struct IngestionOrchestrator {
    config: EngineConfig,
    detector: FileTypeDetector,
    schema_inference: SchemaInference,
    adapters: Vec<Box<dyn FormatAdapter>>,
}

impl IngestionOrchestrator {
    pub fn new(config: EngineConfig) -> Self {
        let adapters: Vec<Box<dyn FormatAdapter>> = vec![
            Box::new(DelimitedAdapter::new(config.sniff.clone())),
            Box::new(SpreadsheetAdapter::new()),
            Box::new(JsonAdapter::new()),
            Box::new(FreeTextAdapter::new(config.sniff.clone())),
            Box::new(DocumentAdapter::new()),
        ];
        Self {
            detector: FileTypeDetector::new(config.size_limits.clone(), config.sniff.clone()),
            schema_inference: SchemaInference::new(config.inference.clone()),
            adapters,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ingest base64 content, rejecting it before decoding when the
    /// approximate decoded size is above every family ceiling.
    pub fn ingest_encoded(&self, encoded: &str, filename: &str) -> Result<IngestOutcome, IngestError> {
        let payload = match encoded.find(";base64,") {
            Some(idx) if encoded.starts_with("data:") => &encoded[idx + ";base64,".len()..],
            _ => encoded,
        };
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();

        let approx_bytes = (compact.len() as u64 / 4) * 3;
        let largest_mb = self.config.size_limits.largest_mb();
        if approx_bytes > megabytes_to_bytes(largest_mb) {
            let family = FileFamily::from_extension(
                &filename.rsplit('.').next().unwrap_or_default().to_lowercase(),
            );
            warn!("Encoded upload {} rejected before decoding ({} bytes)", filename, approx_bytes);
            return Err(IngestError::SizeLimit {
                family,
                size_mb: approx_bytes as f64 / (1024.0 * 1024.0),
                limit_mb: self.config.size_limits.limit_mb(family).unwrap_or(largest_mb),
            });
        }

        let bytes = STANDARD.decode(compact.as_bytes()).map_err(|e| {
            IngestError::Decode(format!(
                "the upload is not valid base64 ({}); send the file content base64-encoded",
                e
            ))
        })?;
        self.ingest(&bytes, filename)
    }

    /// Ingest raw file bytes.
    pub fn ingest(&self, bytes: &[u8], filename: &str) -> Result<IngestOutcome, IngestError> {
        let detection = self.detector.detect(bytes, filename);
        info!(
            "Detected {} as {} (confidence {})",
            filename, detection.family, detection.confidence
        );

        if detection.family == FileFamily::Unknown {
            return Err(IngestError::UnsupportedFormat(format!(
                "'{}' is not a recognized tabular file; upload CSV, TSV, XLSX, JSON or plain text",
                filename
            )));
        }
        if !detection.within_limits {
            let limit_bytes = detection.size_limit.unwrap_or(0);
            return Err(IngestError::SizeLimit {
                family: detection.family,
                size_mb: detection.size_bytes as f64 / (1024.0 * 1024.0),
                limit_mb: limit_bytes / (1024 * 1024),
            });
        }

        let adapter = self
            .adapters
            .iter()
            .find(|a| a.family() == detection.family)
            .ok_or_else(|| {
                IngestError::UnsupportedFormat(format!("no reader is available for {} files", detection.family))
            })?;

        let output = adapter
            .adapt(&RawInput::new(bytes, filename))
            .map_err(|source| IngestError::Adapter {
                family: detection.family,
                source,
            })?;

        let column_types = self.schema_inference.infer_column_types(&output.dataset);
        let profiles = self.schema_inference.profile_columns(&output.dataset, &column_types);
        let telemetry = IngestTelemetry::assemble(&detection, output.metadata, &output.dataset, column_types.clone());

        info!(
            "✅ Ingested {}: {} rows, {} columns, {} discarded, {} warnings",
            filename,
            telemetry.row_count,
            telemetry.column_count,
            telemetry.discarded_rows,
            telemetry.ingest_warnings.len()
        );

        Ok(IngestOutcome {
            dataset: output.dataset,
            column_types,
            profiles,
            telemetry,
        })
    }
}

impl Default for IngestionOrchestrator {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizeLimits;
    use crate::error::AdapterError;
    use crate::value::{CellValue, ColumnType};

    #[test]
    fn test_semicolon_example_end_to_end() {
        let outcome = IngestionOrchestrator::default()
            .ingest(b"nome;valor\nA;10\nB;20\n", "dados.csv")
            .unwrap();
        assert_eq!(outcome.dataset.row_count(), 2);
        assert_eq!(outcome.dataset.columns, vec!["nome", "valor"]);
        assert!(outcome.column_types["valor"].is_numeric());
        assert_eq!(outcome.dataset.rows[1]["valor"], CellValue::Number(20.0));

        let t = &outcome.telemetry;
        assert_eq!(t.family, FileFamily::Delimited);
        assert_eq!(t.detection_confidence, 100);
        assert_eq!(t.dialect, Some(Delimiter::Semicolon));
        assert_eq!(t.decimal_locale, Some(DecimalLocale::Dot));
        assert_eq!(t.encoding.as_deref(), Some("utf-8"));
        assert!(t.sheet_name.is_none());
        assert_eq!(t.column_types["nome"], ColumnType::Text);
    }

    #[test]
    fn test_telemetry_serializes_only_applicable_fields() {
        let outcome = IngestionOrchestrator::default()
            .ingest(br#"{"data": [{"a": 1}], "total": 1}"#, "x.json")
            .unwrap();
        let json = serde_json::to_value(&outcome.telemetry).unwrap();
        assert_eq!(json["format"], "data_field");
        assert!(json.get("sheet_name").is_none());
        assert!(json.get("dialect").is_none());
        assert!(json["ingest_warnings"].as_array().unwrap().iter().any(|w| w.as_str().unwrap().contains("total")));
    }

    #[test]
    fn test_adapter_errors_are_wrapped_with_family() {
        let err = IngestionOrchestrator::default()
            .ingest(b"a;b\n", "header_only.csv")
            .unwrap_err();
        match err {
            IngestError::Adapter { family, ref source } => {
                assert_eq!(family, FileFamily::Delimited);
                assert!(matches!(source, AdapterError::Structural(_)));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_documents_and_unknown_binaries_are_rejected() {
        let orchestrator = IngestionOrchestrator::default();
        let err = orchestrator.ingest(b"%PDF-1.4 ...", "report.pdf").unwrap_err();
        assert!(matches!(
            err.adapter_error(),
            Some(AdapterError::UnsupportedFormat(_))
        ));

        let binary = [0u8, 1, 2, 3, 4, 5, 6, 7, 0, 0, 0, 1];
        let err = orchestrator.ingest(&binary, "blob.bin").unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_oversized_files_are_rejected_not_truncated() {
        let config = EngineConfig {
            size_limits: SizeLimits {
                delimited_mb: 1,
                ..SizeLimits::default()
            },
            ..EngineConfig::default()
        };
        let mut content = String::from("a;b\n");
        while content.len() <= 1024 * 1024 {
            content.push_str("1;2\n");
        }
        let err = IngestionOrchestrator::new(config)
            .ingest(content.as_bytes(), "big.csv")
            .unwrap_err();
        assert!(matches!(err, IngestError::SizeLimit { family: FileFamily::Delimited, limit_mb: 1, .. }));
    }

    #[test]
    fn test_encoded_entrypoint() {
        let encoded = STANDARD.encode("nome;valor\nA;10\n");
        let outcome = IngestionOrchestrator::default()
            .ingest_encoded(&encoded, "dados.csv")
            .unwrap();
        assert_eq!(outcome.telemetry.row_count, 1);

        let err = IngestionOrchestrator::default()
            .ingest_encoded("%%% not base64 %%%", "dados.csv")
            .unwrap_err();
        assert!(matches!(err, IngestError::Decode(_)));
    }

    #[test]
    fn test_encoded_size_precheck() {
        let config = EngineConfig {
            size_limits: SizeLimits {
                delimited_mb: 1,
                spreadsheet_mb: 1,
                free_text_mb: 1,
                json_mb: 1,
                document_mb: 1,
            },
            ..EngineConfig::default()
        };
        let encoded = "A".repeat(2 * 1024 * 1024);
        let err = IngestionOrchestrator::new(config)
            .ingest_encoded(&encoded, "big.csv")
            .unwrap_err();
        assert!(matches!(err, IngestError::SizeLimit { .. }));
    }
}
