use crate::ingestion::detector::FileFamily;
use thiserror::Error;

/// Failures raised by a single format adapter.
///
/// Messages are written for the person who uploaded the file, not for us.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Terminal failures of one ingestion call.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Size limit exceeded: file is {size_mb:.1} MB but {family} files are limited to {limit_mb} MB; split the file or remove unused columns")]
    SizeLimit {
        family: FileFamily,
        size_mb: f64,
        limit_mb: u64,
    },

    #[error("Could not read {family} file: {source}")]
    Adapter {
        family: FileFamily,
        #[source]
        source: AdapterError,
    },
}

impl IngestError {
    /// The adapter-level cause, when the failure came from an adapter.
    pub fn adapter_error(&self) -> Option<&AdapterError> {
        match self {
            IngestError::Adapter { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Query-level problems. The engine reports these inside an
/// [`ExecutionResult`](crate::query::ExecutionResult) instead of returning them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Missing GROUP BY: column(s) {} must appear in GROUP BY when aggregates are selected", columns.join(", "))]
    MissingGroupBy { columns: Vec<String> },

    #[error("Unknown column '{column}'. Available columns: {}", available.join(", "))]
    InvalidColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("Execution error: {0}")]
    Execution(String),
}

/// Preconditions of the retry loop. Nothing else escapes it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetryLoopError {
    #[error("Dataset is empty; there is nothing to query")]
    EmptyDataset,

    #[error("Query repair service unavailable: {0}")]
    RepairServiceUnavailable(String),
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM not configured: {0}")]
    NotConfigured(String),

    #[error("LLM API call failed: {0}")]
    Transport(String),

    #[error("LLM API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse LLM response: {0}")]
    Parse(String),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    RetryLoop(#[from] RetryLoopError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
