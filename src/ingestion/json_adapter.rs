//! JSON Adapter - Arrays of objects, bare or under a `data` field

use crate::error::AdapterError;
use crate::ingestion::adapter::{
    AdapterMetadata, AdapterOutput, FamilyDetails, FormatAdapter, JsonShape, RawInput,
};
use crate::ingestion::detector::FileFamily;
use crate::ingestion::encoding::decode_text;
use crate::ingestion::table_builder::{is_null_token, TableBuilder};
use crate::value::CellValue;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::debug;

/// Key-count spread across objects above which a warning is emitted.
const KEY_SPREAD_WARNING: usize = 3;

fn to_cell(value: &Value, nested_arrays: &mut usize) -> CellValue {
    match value {
        Value::Null => CellValue::Null,
        Value::Bool(b) => CellValue::Bool(*b),
        Value::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or(CellValue::Null),
        Value::String(s) if is_null_token(s) => CellValue::Null,
        Value::String(s) => CellValue::Text(s.trim().to_string()),
        Value::Array(_) | Value::Object(_) => {
            *nested_arrays += 1;
            CellValue::Text(value.to_string())
        }
    }
}

/// Flattens nested objects into `parent__child` keys, keeping key order.
fn flatten_object(
    obj: &Map<String, Value>,
    prefix: &str,
    out: &mut IndexMap<String, Value>,
    flattened: &mut bool,
) {
    for (key, val) in obj {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}__{}", prefix, key)
        };
        match val {
            Value::Object(inner) if !inner.is_empty() => {
                *flattened = true;
                flatten_object(inner, &name, out, flattened);
            }
            other => {
                out.insert(name, other.clone());
            }
        }
    }
}

/// Locates the record array and reports the shape it came in.
fn extract_records(root: Value, warnings: &mut Vec<String>) -> Result<(Vec<Value>, JsonShape), AdapterError> {
    match root {
        Value::Array(items) => Ok((items, JsonShape::Array)),
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(items)) => {
                if !obj.is_empty() {
                    let ignored: Vec<&str> = obj.keys().map(|k| k.as_str()).collect();
                    warnings.push(format!(
                        "Fields outside \"data\" were ignored: {}",
                        ignored.join(", ")
                    ));
                }
                Ok((items, JsonShape::DataField))
            }
            Some(_) => Err(AdapterError::Structural(
                "the \"data\" field must be an array of objects".to_string(),
            )),
            None => Err(AdapterError::Structural(
                "expected an array of objects or an object with a \"data\" array".to_string(),
            )),
        },
        _ => Err(AdapterError::Structural(
            "expected an array of objects or an object with a \"data\" array".to_string(),
        )),
    }
}

/// JSON Adapter
pub struct JsonAdapter;

impl JsonAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatAdapter for JsonAdapter {
    fn family(&self) -> FileFamily {
        FileFamily::Json
    }

    fn adapt(&self, raw: &RawInput<'_>) -> Result<AdapterOutput, AdapterError> {
        let decoded = decode_text(raw.bytes)?;
        let mut warnings = decoded.warnings;
        let mut limitations = Vec::new();

        let root: Value = serde_json::from_str(&decoded.text).map_err(|e| {
            AdapterError::Decode(format!(
                "invalid JSON at line {}, column {}: {}",
                e.line(),
                e.column(),
                e
            ))
        })?;

        let (items, format) = extract_records(root, &mut warnings)?;
        if items.is_empty() {
            return Err(AdapterError::Structural("the JSON array is empty".to_string()));
        }

        let mut flattened = false;
        let mut objects = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            match item {
                Value::Object(obj) => {
                    let mut flat = IndexMap::new();
                    flatten_object(obj, "", &mut flat, &mut flattened);
                    objects.push(flat);
                }
                other => {
                    return Err(AdapterError::Structural(format!(
                        "element {} is {} but every element must be an object",
                        idx,
                        json_kind(other)
                    )));
                }
            }
        }

        // Union of keys in first-seen order, not just the first object's keys.
        let mut keys: IndexMap<String, ()> = IndexMap::new();
        for obj in &objects {
            for key in obj.keys() {
                keys.entry(key.clone()).or_insert(());
            }
        }
        if keys.is_empty() {
            return Err(AdapterError::Structural(
                "the objects have no keys to use as columns".to_string(),
            ));
        }

        let min_keys = objects.iter().map(|o| o.len()).min().unwrap_or(0);
        let max_keys = objects.iter().map(|o| o.len()).max().unwrap_or(0);
        if max_keys - min_keys > KEY_SPREAD_WARNING {
            warnings.push(format!(
                "Objects have between {} and {} keys; missing keys were set to null",
                min_keys, max_keys
            ));
        }
        if flattened {
            limitations.push("Nested objects were flattened into parent__child columns".to_string());
        }

        let mut nested_values = 0usize;
        let headers: Vec<String> = keys.keys().cloned().collect();
        let records: Vec<Vec<CellValue>> = objects
            .iter()
            .map(|obj| {
                headers
                    .iter()
                    .map(|k| obj.get(k).map(|v| to_cell(v, &mut nested_values)).unwrap_or(CellValue::Null))
                    .collect()
            })
            .collect();
        if nested_values > 0 {
            warnings.push(format!(
                "{} nested array value(s) were kept as JSON text",
                nested_values
            ));
        }

        let table = TableBuilder::new().build(headers, records, &mut warnings, &mut limitations)?;
        debug!(rows = table.dataset.row_count(), ?format, "json parsed");

        let metadata = AdapterMetadata {
            row_count: table.dataset.row_count(),
            discarded_rows: table.discarded_rows,
            headers_original: table.headers_original.clone(),
            headers_normalized: table.headers_normalized.clone(),
            warnings,
            limitations,
            details: FamilyDetails::Json {
                format,
                encoding: decoded.encoding,
            },
        };

        Ok(AdapterOutput {
            dataset: table.dataset,
            metadata,
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
