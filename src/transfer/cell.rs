//! Scalar <-> text cell conversion
//!
//! CSV cells and columnar string columns hold text. This module decides how
//! each BSON value is written as text and how text read back is typed again.
//! Sequences and nested documents are written as relaxed extended JSON, so
//! they stay visible (and parseable) in the output rather than being dropped.

use mongodb::bson::{Binary, Bson, DateTime, Document};

/// Core trait for BSON value conversion
pub trait BsonConverter {
    /// Output type of the conversion
    type Output;

    /// Convert a BSON value to the output type
    fn convert(&self, value: &Bson) -> Self::Output;

    /// Convert an optional BSON value, using the default output for `None`
    fn convert_optional(&self, value: Option<&Bson>) -> Self::Output
    where
        Self::Output: Default,
    {
        value.map(|v| self.convert(v)).unwrap_or_default()
    }
}

/// Plain text converter for tabular cells
///
/// Nulls become empty cells, which read back as absent fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextCellConverter;

impl TextCellConverter {
    /// Create a new text cell converter
    pub fn new() -> Self {
        Self
    }
}

impl BsonConverter for TextCellConverter {
    type Output = String;

    fn convert(&self, value: &Bson) -> String {
        match value {
            Bson::String(s) => s.clone(),
            Bson::Int32(n) => n.to_string(),
            Bson::Int64(n) => n.to_string(),
            // Debug keeps the fraction ("2.0"), so the cell reads back as a double
            Bson::Double(f) => format!("{f:?}"),
            Bson::Boolean(b) => b.to_string(),
            Bson::Null | Bson::Undefined => String::new(),
            Bson::ObjectId(oid) => oid.to_hex(),
            Bson::DateTime(dt) => datetime_to_iso_string(dt),
            Bson::Decimal128(d) => d.to_string(),
            Bson::Binary(bin) => binary_to_hex(bin),
            Bson::Array(_) | Bson::Document(_) => to_json_text(value),
            other => to_json_text(other),
        }
    }
}

/// Type a text cell read from a tabular file.
///
/// Returns `None` for an empty cell, meaning the field is absent.
pub fn parse_cell(text: &str) -> Option<Bson> {
    if text.is_empty() {
        return None;
    }

    if text.eq_ignore_ascii_case("true") {
        return Some(Bson::Boolean(true));
    }
    if text.eq_ignore_ascii_case("false") {
        return Some(Bson::Boolean(false));
    }

    if has_leading_zero(text) {
        return Some(Bson::String(text.to_string()));
    }

    if let Ok(n) = text.parse::<i64>() {
        return Some(match i32::try_from(n) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(n),
        });
    }

    if looks_numeric(text) {
        if let Ok(f) = text.parse::<f64>() {
            return Some(Bson::Double(f));
        }
    }

    if let Some(array) = parse_json_array(text) {
        return Some(array);
    }

    Some(Bson::String(text.to_string()))
}

/// Parse text holding a JSON array (as written for sequences) into BSON.
pub fn parse_json_array(text: &str) -> Option<Bson> {
    let trimmed = text.trim();
    if !(trimmed.starts_with('[') && trimmed.ends_with(']')) {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
    match Bson::try_from(value).ok()? {
        array @ Bson::Array(_) => Some(array),
        _ => None,
    }
}

/// Relaxed extended JSON text for any BSON value.
pub fn to_json_text(value: &Bson) -> String {
    value.clone().into_relaxed_extjson().to_string()
}

/// Relaxed extended JSON value for a whole document.
pub fn document_to_json(doc: &Document) -> serde_json::Value {
    Bson::Document(doc.clone()).into_relaxed_extjson()
}

/// Convert DateTime to ISO 8601 string, falling back to epoch millis.
pub fn datetime_to_iso_string(dt: &DateTime) -> String {
    dt.try_to_rfc3339_string()
        .unwrap_or_else(|_| format!("{}", dt.timestamp_millis()))
}

/// Convert Binary data to hexadecimal string
pub fn binary_to_hex(bin: &Binary) -> String {
    hex::encode(&bin.bytes)
}

// Codes such as "007" are text, not the number 7.
fn has_leading_zero(text: &str) -> bool {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text).as_bytes();
    digits.len() > 1 && digits[0] == b'0' && digits[1].is_ascii_digit()
}

// `f64::from_str` accepts "inf" and "NaN"; those stay strings.
fn looks_numeric(text: &str) -> bool {
    text.bytes().any(|b| b.is_ascii_digit())
        && text
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E'))
}
