//! Byte encoding probe: BOM first, then strict UTF-8, then a Windows-1252 fallback.

use crate::error::AdapterError;
use encoding_rs::{Encoding, WINDOWS_1252};

#[derive(Clone, Debug, PartialEq)]
pub struct DecodedText {
    pub text: String,
    /// Label reported in telemetry, e.g. `utf-8`, `utf-8-sig`, `windows-1252`.
    pub encoding: String,
    pub warnings: Vec<String>,
}

pub fn decode_text(bytes: &[u8]) -> Result<DecodedText, AdapterError> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        if had_errors {
            return Err(AdapterError::Decode(format!(
                "the file declares {} but contains invalid byte sequences; re-save it as UTF-8",
                encoding.name()
            )));
        }
        let label = if encoding == encoding_rs::UTF_8 {
            "utf-8-sig".to_string()
        } else {
            encoding.name().to_lowercase()
        };
        return Ok(DecodedText {
            text: text.into_owned(),
            encoding: label,
            warnings: Vec::new(),
        });
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(DecodedText {
            text: text.to_string(),
            encoding: "utf-8".to_string(),
            warnings: Vec::new(),
        }),
        Err(_) => {
            let (text, _, had_errors) = WINDOWS_1252.decode(bytes);
            if had_errors {
                return Err(AdapterError::Decode(
                    "the file is neither UTF-8 nor Windows-1252 text; re-save it as UTF-8".to_string(),
                ));
            }
            Ok(DecodedText {
                text: text.into_owned(),
                encoding: "windows-1252".to_string(),
                warnings: vec![
                    "File is not valid UTF-8; decoded as Windows-1252 (Latin-1). Check accented characters".to_string(),
                ],
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_utf8() {
        let decoded = decode_text("nome;preço\n".as_bytes()).unwrap();
        assert_eq!(decoded.encoding, "utf-8");
        assert!(decoded.text.contains("preço"));
        assert!(decoded.warnings.is_empty());
    }

    #[test]
    fn test_utf8_bom_is_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"a,b\n");
        let decoded = decode_text(&bytes).unwrap();
        assert_eq!(decoded.encoding, "utf-8-sig");
        assert_eq!(decoded.text, "a,b\n");
    }

    #[test]
    fn test_latin1_fallback() {
        // "preço" in Latin-1
        let bytes = [b'p', b'r', b'e', 0xE7, b'o'];
        let decoded = decode_text(&bytes).unwrap();
        assert_eq!(decoded.encoding, "windows-1252");
        assert_eq!(decoded.text, "preço");
        assert_eq!(decoded.warnings.len(), 1);
    }

    #[test]
    fn test_utf16_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "a;b".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let decoded = decode_text(&bytes).unwrap();
        assert_eq!(decoded.encoding, "utf-16le");
        assert_eq!(decoded.text, "a;b");
    }
}
