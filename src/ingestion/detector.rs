//! File Type Detector - Classifies uploads by extension, signature and content
//!
//! Detection never fails: size overruns and doubtful classifications are
//! reported through `within_limits` and `warnings`, and the orchestrator
//! decides what to do with them.

use crate::config::{megabytes_to_bytes, SizeLimits, SniffConfig};
use crate::ingestion::dialect::sniff_dialect;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Upload family. Each supported family has exactly one adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFamily {
    Delimited,
    Spreadsheet,
    Json,
    FreeText,
    /// Word, PDF, PowerPoint and similar non-tabular containers.
    Document,
    Unknown,
}

impl FileFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFamily::Delimited => "delimited",
            FileFamily::Spreadsheet => "spreadsheet",
            FileFamily::Json => "json",
            FileFamily::FreeText => "free_text",
            FileFamily::Document => "document",
            FileFamily::Unknown => "unknown",
        }
    }

    pub fn from_extension(ext: &str) -> FileFamily {
        match ext {
            "csv" | "tsv" | "psv" => FileFamily::Delimited,
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => FileFamily::Spreadsheet,
            "json" => FileFamily::Json,
            "txt" | "text" | "dat" | "log" | "prn" => FileFamily::FreeText,
            "pdf" | "doc" | "docx" | "ppt" | "pptx" | "odt" | "rtf" => FileFamily::Document,
            _ => FileFamily::Unknown,
        }
    }
}

impl fmt::Display for FileFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub family: FileFamily,
    /// 0..=100
    pub confidence: u8,
    pub extension: String,
    pub size_bytes: u64,
    pub within_limits: bool,
    /// Ceiling for the detected family in bytes; `None` for unknown families.
    pub size_limit: Option<u64>,
    pub warnings: Vec<String>,
}

/// What the leading bytes say about the container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Signature {
    ZipSpreadsheet,
    ZipDocument,
    Zip,
    Ole,
    Pdf,
    Rtf,
    JsonMarker,
    Text,
    Binary,
}

const SIGNATURE_PREFIX: usize = 512;
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xEF, 0xBB, 0xBF][..]).unwrap_or(bytes)
}

fn parses_as_json(bytes: &[u8]) -> bool {
    serde_json::from_slice::<serde::de::IgnoredAny>(strip_bom(bytes)).is_ok()
}

fn read_signature(bytes: &[u8]) -> Signature {
    if bytes.starts_with(ZIP_MAGIC) {
        // Part names are stored uncompressed in local and central headers.
        if contains(bytes, b"xl/") || contains(bytes, b"opendocument.spreadsheet") {
            return Signature::ZipSpreadsheet;
        }
        if contains(bytes, b"word/") || contains(bytes, b"ppt/") || contains(bytes, b"opendocument.text") {
            return Signature::ZipDocument;
        }
        return Signature::Zip;
    }
    if bytes.starts_with(OLE_MAGIC) {
        return Signature::Ole;
    }

    let prefix = &bytes[..bytes.len().min(SIGNATURE_PREFIX)];
    if prefix.starts_with(b"%PDF") {
        return Signature::Pdf;
    }
    if prefix.starts_with(b"{\\rtf") {
        return Signature::Rtf;
    }
    let trimmed = strip_bom(prefix);
    match trimmed.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'[') | Some(b'{') => return Signature::JsonMarker,
        _ => {}
    }
    let control = prefix
        .iter()
        .filter(|b| **b < 0x09 || (**b > 0x0D && **b < 0x20))
        .count();
    if !prefix.is_empty() && control * 10 > prefix.len() {
        Signature::Binary
    } else {
        Signature::Text
    }
}

/// Family the signature alone implies, where it implies one.
fn family_for_signature(signature: Signature, extension_family: FileFamily) -> Option<FileFamily> {
    match signature {
        Signature::ZipSpreadsheet => Some(FileFamily::Spreadsheet),
        Signature::ZipDocument | Signature::Pdf | Signature::Rtf => Some(FileFamily::Document),
        // Bare ZIP/OLE: both families use these containers.
        Signature::Zip | Signature::Ole => match extension_family {
            FileFamily::Document => Some(FileFamily::Document),
            _ => Some(FileFamily::Spreadsheet),
        },
        Signature::JsonMarker => Some(FileFamily::Json),
        Signature::Text | Signature::Binary => None,
    }
}

fn extension_of(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// File Type Detector
pub struct FileTypeDetector {
    limits: SizeLimits,
    sniff: SniffConfig,
}

impl FileTypeDetector {
    pub fn new(limits: SizeLimits, sniff: SniffConfig) -> Self {
        Self { limits, sniff }
    }

    pub fn detect(&self, bytes: &[u8], filename: &str) -> DetectionResult {
        let extension = extension_of(filename);
        let extension_family = FileFamily::from_extension(&extension);
        let signature = read_signature(bytes);
        let mut warnings = Vec::new();

        let (family, confidence) = self.classify(bytes, extension_family, signature, &mut warnings);
        debug!(?family, confidence, ?signature, extension = %extension, "file type detected");

        let size_bytes = bytes.len() as u64;
        let size_limit = self.limits.limit_mb(family).map(megabytes_to_bytes);
        let within_limits = size_limit.map(|limit| size_bytes <= limit).unwrap_or(true);
        if let (false, Some(limit)) = (within_limits, size_limit) {
            warnings.push(format!(
                "File is {:.1} MB, above the {} MB limit for {} files",
                size_bytes as f64 / (1024.0 * 1024.0),
                limit / (1024 * 1024),
                family
            ));
        }

        DetectionResult {
            family,
            confidence,
            extension,
            size_bytes,
            within_limits,
            size_limit,
            warnings,
        }
    }

    fn classify(
        &self,
        bytes: &[u8],
        extension_family: FileFamily,
        signature: Signature,
        warnings: &mut Vec<String>,
    ) -> (FileFamily, u8) {
        if signature == Signature::Binary && extension_family == FileFamily::Unknown {
            warnings.push("Content looks binary and the extension is not recognized".to_string());
            return (FileFamily::Unknown, 0);
        }

        // Bracketed CSV headers also open with `[`; only a full parse confirms JSON.
        let signature = if signature == Signature::JsonMarker
            && extension_family != FileFamily::Json
            && !parses_as_json(bytes)
        {
            Signature::Text
        } else {
            signature
        };
        let signature_family = family_for_signature(signature, extension_family);

        match (extension_family, signature_family) {
            (FileFamily::Unknown, Some(family)) => {
                warnings.push(format!("No recognized extension; treating content as {}", family));
                (family, 75)
            }
            (ext, Some(sig)) if ext == sig => (ext, 100),
            (ext, Some(sig)) if ext == FileFamily::FreeText && sig == FileFamily::Json => {
                // Text files may legitimately hold JSON.
                (FileFamily::Json, 90)
            }
            (ext, Some(sig)) => {
                warnings.push(format!(
                    "Extension suggests {} but the content looks like {}; using {}",
                    ext, sig, sig
                ));
                (sig, 60)
            }
            (ext @ (FileFamily::Delimited | FileFamily::FreeText), None) => self.confirm_text(bytes, ext, warnings),
            (FileFamily::Unknown, None) => self.sniff_content(bytes, warnings),
            (ext, None) => {
                warnings.push(format!(
                    "Extension suggests {} but no matching file signature was found",
                    ext
                ));
                (ext, 70)
            }
        }
    }

    /// Text families have no magic bytes; the delimiter pattern plays that role.
    fn confirm_text(&self, bytes: &[u8], ext: FileFamily, warnings: &mut Vec<String>) -> (FileFamily, u8) {
        let text = String::from_utf8_lossy(&bytes[..bytes.len().min(64 * 1024)]);
        let dialect = sniff_dialect(&text, self.sniff.sniff_lines);
        match (ext, dialect) {
            (FileFamily::Delimited, Some(_)) => (FileFamily::Delimited, 100),
            (FileFamily::Delimited, None) => {
                warnings.push("Extension suggests delimited text but no consistent delimiter was found".to_string());
                (FileFamily::Delimited, 80)
            }
            (_, Some(d)) if d.confidence >= self.sniff.free_text_min_confidence => (FileFamily::FreeText, 90),
            _ => (FileFamily::FreeText, 85),
        }
    }

    fn sniff_content(&self, bytes: &[u8], warnings: &mut Vec<String>) -> (FileFamily, u8) {
        let text = String::from_utf8_lossy(&bytes[..bytes.len().min(64 * 1024)]);
        if let Some(dialect) = sniff_dialect(&text, self.sniff.sniff_lines) {
            warnings.push(format!(
                "No recognized extension; detected {}-delimited text",
                dialect.delimiter.name()
            ));
            return (FileFamily::Delimited, dialect.confidence);
        }
        warnings.push("No recognized extension or delimiter; treating as free text".to_string());
        (FileFamily::FreeText, 30)
    }
}

impl Default for FileTypeDetector {
    fn default() -> Self {
        Self::new(SizeLimits::default(), SniffConfig::default())
    }
}
