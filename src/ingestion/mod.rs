//! Ingestion Module - Heterogeneous uploads in, one normalized row set out
//!
//! - File type detection with per-family size ceilings
//! - One adapter per family (delimited, spreadsheet, JSON, free text, documents)
//! - Header normalization, null tokens and discard rules shared by all adapters
//! - Column type inference and ingestion telemetry

pub mod adapter;
pub mod delimited_adapter;
pub mod detector;
pub mod dialect;
pub mod document_adapter;
pub mod encoding;
pub mod free_text_adapter;
pub mod headers;
pub mod json_adapter;
pub mod orchestrator;
pub mod schema_inference;
pub mod spreadsheet_adapter;
pub mod table_builder;

pub use adapter::{AdapterMetadata, AdapterOutput, DecimalLocale, FamilyDetails, FormatAdapter, JsonShape, RawInput, TextStrategy};
pub use detector::{DetectionResult, FileFamily, FileTypeDetector};
pub use dialect::{sniff_dialect, Delimiter, Dialect};
pub use headers::{normalize_header, normalize_headers};
pub use orchestrator::{IngestOutcome, IngestTelemetry, IngestionOrchestrator};
pub use schema_inference::{ColumnProfile, SchemaInference};
