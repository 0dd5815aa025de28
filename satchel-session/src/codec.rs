//! Session record encoding.
//!
//! A record is standard-alphabet base64 over the UTF-8 JSON text of the field
//! map. `serde_json::Map` keeps keys sorted, so equal field sets always encode
//! to the same string and change detection can compare encodings directly.

use crate::error::{SessionError, SessionResult};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::error::Category;
use serde_json::{Map, Value};

/// Session field map.
pub type Fields = Map<String, Value>;

/// Encode fields into a store record.
pub fn encode(fields: &Fields) -> SessionResult<String> {
    let json =
        serde_json::to_string(fields).map_err(|e| SessionError::Serialization(e.to_string()))?;
    Ok(STANDARD.encode(json))
}

/// Decode a store record.
///
/// Bad base64, bad UTF-8 and JSON syntax errors yield
/// [`SessionError::MalformedRecord`]. Well-formed JSON that is not an object
/// yields [`SessionError::Deserialization`].
pub fn decode(record: &str) -> SessionResult<Fields> {
    let bytes = STANDARD
        .decode(record.trim())
        .map_err(|e| SessionError::MalformedRecord(format!("invalid base64: {}", e)))?;

    let text = std::str::from_utf8(&bytes)
        .map_err(|e| SessionError::MalformedRecord(format!("invalid utf-8: {}", e)))?;

    serde_json::from_str::<Fields>(text).map_err(|e| match e.classify() {
        Category::Syntax | Category::Eof => {
            SessionError::MalformedRecord(format!("invalid json: {}", e))
        }
        Category::Data | Category::Io => SessionError::Deserialization(e.to_string()),
    })
}
