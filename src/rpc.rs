// ABOUTME: RPC argument frame codec — base64(CBOR) args/kwargs
// ABOUTME: Pins the opaque blob format the distilled spec leaves open

//! RPC argument frame encode/decode.
//!
//! The wire frame is `{"args": base64(blob), "kwargs": base64(blob)}`. This
//! crate pins CBOR (via `ciborium`) as the blob format: the Python original
//! uses `pickle`, which has no portable Rust equivalent, so a concrete,
//! interoperable choice is made here rather than left open. `args` decodes
//! to a CBOR array, `kwargs` to a CBOR map of string keys.

use crate::error::{Result, TarpError};
use base64::Engine;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

fn cbor_encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)?;
    Ok(buf)
}

fn cbor_decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(ciborium::de::from_reader(bytes)?)
}

/// Encode `args`/`kwargs` into the `{args, kwargs}` wire frame.
pub fn encode_frame(args: &[Value], kwargs: &Map<String, Value>) -> Result<Value> {
    let args_blob = cbor_encode(&args)?;
    let kwargs_blob = cbor_encode(kwargs)?;
    let engine = base64::engine::general_purpose::STANDARD;
    Ok(serde_json::json!({
        "args": engine.encode(args_blob),
        "kwargs": engine.encode(kwargs_blob),
    }))
}

/// Wrap an RPC result the way the wire protocol expects: CBOR-encode it,
/// base64 it, and carry it as `{"payload": <base64>}` — the same opaque
/// encoding used for `args`/`kwargs`, applied to the return value.
pub fn encode_payload(value: &Value) -> Result<Value> {
    let blob = cbor_encode(value)?;
    let engine = base64::engine::general_purpose::STANDARD;
    Ok(serde_json::json!({ "payload": engine.encode(blob) }))
}

/// Decode a `{"payload": <base64>}` wire value back into the original
/// result, the client-side inverse of [`encode_payload`].
pub fn decode_payload(value: &Value) -> Result<Value> {
    let engine = base64::engine::general_purpose::STANDARD;
    let payload_b64 = value
        .get("payload")
        .and_then(Value::as_str)
        .ok_or_else(|| TarpError::dispatch("RPC response missing 'payload' field"))?;
    let blob = engine.decode(payload_b64)?;
    cbor_decode(&blob)
}

/// Decode an RPC wire frame back into `(args, kwargs)`.
pub fn decode_frame(frame: &Value) -> Result<(Vec<Value>, Map<String, Value>)> {
    let engine = base64::engine::general_purpose::STANDARD;

    let obj = frame
        .as_object()
        .ok_or_else(|| TarpError::dispatch("RPC frame must be a JSON object"))?;
    if obj.len() != 2 || !obj.contains_key("args") || !obj.contains_key("kwargs") {
        return Err(TarpError::dispatch(
            "RPC frame must contain exactly 'args' and 'kwargs'",
        ));
    }

    let args_b64 = frame
        .get("args")
        .and_then(Value::as_str)
        .ok_or_else(|| TarpError::dispatch("RPC frame missing 'args' field"))?;
    let kwargs_b64 = frame
        .get("kwargs")
        .and_then(Value::as_str)
        .ok_or_else(|| TarpError::dispatch("RPC frame missing 'kwargs' field"))?;

    let args_blob = engine.decode(args_b64)?;
    let kwargs_blob = engine.decode(kwargs_b64)?;

    let args: Vec<Value> = cbor_decode(&args_blob)
        .map_err(|_| TarpError::dispatch("RPC frame 'args' is not a valid CBOR array"))?;
    let kwargs: Map<String, Value> = cbor_decode(&kwargs_blob)
        .map_err(|_| TarpError::dispatch("RPC frame 'kwargs' is not a valid CBOR map"))?;

    Ok((args, kwargs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_frame() {
        let args = vec![Value::from(1), Value::from("two"), Value::from(3.0)];
        let mut kwargs = Map::new();
        kwargs.insert("flag".to_string(), Value::Bool(true));

        let frame = encode_frame(&args, &kwargs).unwrap();
        let (decoded_args, decoded_kwargs) = decode_frame(&frame).unwrap();

        assert_eq!(decoded_args, args);
        assert_eq!(decoded_kwargs, kwargs);
    }

    #[test]
    fn test_empty_frame_round_trips() {
        let frame = encode_frame(&[], &Map::new()).unwrap();
        let (args, kwargs) = decode_frame(&frame).unwrap();
        assert!(args.is_empty());
        assert!(kwargs.is_empty());
    }

    #[test]
    fn test_malformed_frame_missing_args_is_rejected() {
        let frame = serde_json::json!({ "kwargs": "" });
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_frame_with_extra_key_is_rejected() {
        let frame = serde_json::json!({ "args": "", "kwargs": "", "extra": "x" });
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_malformed_base64_is_rejected() {
        let frame = serde_json::json!({ "args": "not-base64!!", "kwargs": "" });
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_decode_payload_inverts_encode_payload() {
        let wrapped = encode_payload(&Value::from("hello")).unwrap();
        let value = decode_payload(&wrapped).unwrap();
        assert_eq!(value, Value::from("hello"));
    }

    #[test]
    fn test_encode_payload_round_trips_via_cbor() {
        let wrapped = encode_payload(&Value::from(25)).unwrap();
        let payload_b64 = wrapped["payload"].as_str().unwrap();
        let engine = base64::engine::general_purpose::STANDARD;
        let blob = engine.decode(payload_b64).unwrap();
        let value: Value = cbor_decode(&blob).unwrap();
        assert_eq!(value, Value::from(25));
    }
}
