pub mod config;
pub mod error;
pub mod execution_loop;
pub mod ingestion;
pub mod llm;
pub mod query;
pub mod value;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use execution_loop::{DraftOutcome, QueryDraft, RetryLoop, RetryReport};
pub use ingestion::{IngestOutcome, IngestionOrchestrator};
pub use query::{ExecutionResult, QueryEngine};
pub use value::{CellValue, ColumnType, ColumnTypeMap, Dataset, Row};
