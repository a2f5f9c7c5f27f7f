//! Document Adapter - Word, PowerPoint, PDF and RTF uploads
//!
//! Table extraction from office documents is not supported; the adapter
//! only turns these uploads into a clear instruction for the user.

use crate::error::AdapterError;
use crate::ingestion::adapter::{AdapterOutput, FormatAdapter, RawInput};
use crate::ingestion::detector::FileFamily;
use tracing::warn;

pub struct DocumentAdapter;

impl DocumentAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocumentAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatAdapter for DocumentAdapter {
    fn family(&self) -> FileFamily {
        FileFamily::Document
    }

    fn adapt(&self, raw: &RawInput<'_>) -> Result<AdapterOutput, AdapterError> {
        warn!("Document upload rejected: {}", raw.filename);
        Err(AdapterError::UnsupportedFormat(format!(
            "'{}' is a document, and tables inside documents cannot be read yet; \
             copy the table into a spreadsheet and save it as .xlsx or .csv, then upload that file",
            raw.filename
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_are_rejected_with_guidance() {
        let err = DocumentAdapter::new()
            .adapt(&RawInput::new(b"%PDF-1.7", "report.pdf"))
            .unwrap_err();
        match err {
            AdapterError::UnsupportedFormat(msg) => {
                assert!(msg.contains("report.pdf"));
                assert!(msg.contains(".csv"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
