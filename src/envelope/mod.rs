// ABOUTME: Response envelope and raw-payload sentinel for the TARP wire protocol
// ABOUTME: Implements the success/error envelope shape and recursive byte-leaf encoding

//! The TARP response envelope.
//!
//! Every response is either a success envelope `{status, mimetype, result}`
//! or an error envelope `{status, type, message}` — except when a handler
//! returns a [`RawPayload`], which bypasses the envelope entirely and is
//! written to the wire verbatim with its own Content-Type.

use crate::error::TarpError;
use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};

/// A JSON-tree-shaped value that may additionally carry raw byte leaves.
///
/// `serde_json::Value` has no variant for raw bytes, but a handler result
/// may embed them (e.g. a thumbnail nested inside a larger JSON object).
/// `ResultValue` carries such leaves through the result tree as an explicit
/// `Bytes` variant and recursively base64-encodes them during serialization
/// — the Rust realization of the Python original's `encode_bytes_in_map`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<ResultValue>),
    Object(Vec<(String, ResultValue)>),
}

impl ResultValue {
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(data.into())
    }

    pub fn object(entries: impl IntoIterator<Item = (String, ResultValue)>) -> Self {
        Self::Object(entries.into_iter().collect())
    }
}

impl From<Value> for ResultValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ResultValue::Null,
            Value::Bool(b) => ResultValue::Bool(b),
            Value::Number(n) => ResultValue::Number(n),
            Value::String(s) => ResultValue::String(s),
            Value::Array(items) => ResultValue::Array(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                ResultValue::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<ResultValue> for Value {
    /// Lossy conversion back to plain JSON: byte leaves are base64-encoded,
    /// matching what actually reaches the wire.
    fn from(value: ResultValue) -> Self {
        match value {
            ResultValue::Null => Value::Null,
            ResultValue::Bool(b) => Value::Bool(b),
            ResultValue::Number(n) => Value::Number(n),
            ResultValue::String(s) => Value::String(s),
            ResultValue::Bytes(b) => Value::String(encode_b64(&b)),
            ResultValue::Array(items) => Value::Array(items.into_iter().map(Into::into).collect()),
            ResultValue::Object(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (k, v) in entries {
                    map.insert(k, v.into());
                }
                Value::Object(map)
            }
        }
    }
}

impl Serialize for ResultValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ResultValue::Null => serializer.serialize_none(),
            ResultValue::Bool(b) => serializer.serialize_bool(*b),
            ResultValue::Number(n) => n.serialize(serializer),
            ResultValue::String(s) => serializer.serialize_str(s),
            ResultValue::Bytes(b) => serializer.serialize_str(&encode_b64(b)),
            ResultValue::Array(items) => {
                use serde::ser::SerializeSeq;
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ResultValue::Object(entries) => {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

fn encode_b64(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Sentinel returned by a handler to bypass the envelope and write bytes
/// verbatim with a custom Content-Type (e.g. serving a PNG thumbnail).
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub bytes: Vec<u8>,
    pub mimetype: String,
}

impl RawPayload {
    pub fn new(bytes: impl Into<Vec<u8>>, mimetype: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mimetype: mimetype.into(),
        }
    }
}

/// The response envelope wire format.
#[derive(Debug, Clone)]
pub enum Envelope {
    Success {
        mimetype: String,
        result: ResultValue,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl Envelope {
    pub fn success(mimetype: impl Into<String>, result: impl Into<ResultValue>) -> Self {
        Self::Success {
            mimetype: mimetype.into(),
            result: result.into(),
        }
    }

    pub fn error(err: &TarpError) -> Self {
        Self::Error {
            kind: err.envelope_type().to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl Serialize for Envelope {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeMap;
        match self {
            Envelope::Success { mimetype, result } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("status", "success")?;
                map.serialize_entry("mimetype", mimetype)?;
                map.serialize_entry("result", result)?;
                map.end()
            }
            Envelope::Error { kind, message } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("status", "error")?;
                map.serialize_entry("type", kind)?;
                map.serialize_entry("message", message)?;
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let env = Envelope::success("application/json", Value::from(42));
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["mimetype"], "application/json");
        assert_eq!(json["result"], 42);
    }

    #[test]
    fn test_error_envelope_shape() {
        let err = TarpError::operation_in_progress("still working", Some(10));
        let env = Envelope::error(&err);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["type"], "OperationInProgress");
    }

    #[test]
    fn test_byte_leaves_are_base64_encoded() {
        let nested = ResultValue::object([
            ("name".to_string(), ResultValue::String("thumb".to_string())),
            ("data".to_string(), ResultValue::bytes(vec![0xde, 0xad, 0xbe, 0xef])),
        ]);
        let env = Envelope::success("application/json", nested);
        let json = serde_json::to_value(&env).unwrap();
        let encoded = json["result"]["data"].as_str().unwrap();
        use base64::Engine;
        assert_eq!(
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .unwrap(),
            vec![0xde, 0xad, 0xbe, 0xef]
        );
    }

    #[test]
    fn test_value_round_trips_through_result_value() {
        let value = serde_json::json!({"a": 1, "b": [1, 2, 3], "c": null});
        let rv: ResultValue = value.clone().into();
        let back: Value = rv.into();
        assert_eq!(value, back);
    }
}
