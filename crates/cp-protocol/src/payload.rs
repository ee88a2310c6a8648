//! Message body codec.
//!
//! Inbound bodies arrive in one of several physical shapes depending on the
//! transport; all of them decode to a single structured form
//! (`serde_json::Value`). Outbound bodies are JSON text, or nothing at all.

use serde::Serialize;
use serde_json::Value;

use crate::error::{PayloadError, PayloadResult};

/// An inbound message body as handed over by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    /// No body.
    Absent,
    /// JSON text.
    Text(String),
    /// UTF-8 encoded JSON text.
    Bytes(Vec<u8>),
    /// Already structured; passed through unchanged.
    Structured(Value),
}

impl From<&[u8]> for RawPayload {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for RawPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<String> for RawPayload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RawPayload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Value> for RawPayload {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

/// The structured form of an empty body.
pub fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Decode an inbound body into its structured form.
///
/// Absent and zero-length bodies decode to `{}`, matching what [`encode`]
/// produces for a publish without a body.
pub fn decode(raw: RawPayload) -> PayloadResult<Value> {
    match raw {
        RawPayload::Absent => Ok(empty_object()),
        RawPayload::Structured(value) => Ok(value),
        RawPayload::Text(text) => parse_text(&text),
        RawPayload::Bytes(bytes) => {
            let text = std::str::from_utf8(&bytes).map_err(|e| PayloadError::Utf8(e.to_string()))?;
            parse_text(text)
        }
    }
}

fn parse_text(text: &str) -> PayloadResult<Value> {
    if text.is_empty() {
        return Ok(empty_object());
    }
    serde_json::from_str(text).map_err(|e| PayloadError::Json(e.to_string()))
}

/// Encode an outbound body. `None` yields an empty payload.
pub fn encode<T: Serialize + ?Sized>(value: Option<&T>) -> PayloadResult<Vec<u8>> {
    match value {
        None => Ok(Vec::new()),
        Some(v) => serde_json::to_vec(v).map_err(|e| PayloadError::Serialization(e.to_string())),
    }
}
