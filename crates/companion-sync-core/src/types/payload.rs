//! Wire payloads exchanged with the transport adapter.
//!
//! A payload is a flat mapping of string keys to primitive values (strings,
//! booleans, numbers and arrays of those). Wire shapes are plain serde types;
//! unknown keys are ignored on decode, and a missing or mistyped required key
//! is reported as [`SyncError::MalformedPayload`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};

/// Flat key/value payload handed to and received from the transport
pub type Payload = Map<String, Value>;

/// Encode a wire type as a payload
pub fn encode<T: Serialize>(value: &T) -> SyncResult<Payload> {
    match serde_json::to_value(value).map_err(|e| SyncError::Serialization(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(SyncError::Serialization(format!(
            "payload must be an object, got {}",
            other
        ))),
    }
}

/// Decode a wire type from a payload
pub fn decode<T: DeserializeOwned>(payload: &Payload) -> SyncResult<T> {
    serde_json::from_value(Value::Object(payload.clone()))
        .map_err(|e| SyncError::MalformedPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Reading {
        todo_text: String,
        is_completed: bool,
        at: f64,
    }

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => panic!("test payload must be an object"),
        }
    }

    #[test]
    fn test_encode_uses_field_names() {
        let reading = Reading {
            todo_text: "walk".to_string(),
            is_completed: true,
            at: 100.5,
        };
        assert_eq!(
            Value::Object(encode(&reading).unwrap()),
            json!({"todoText": "walk", "isCompleted": true, "at": 100.5})
        );
    }

    #[test]
    fn test_integer_number_decodes_as_float() {
        let p = payload(json!({"todoText": "walk", "isCompleted": false, "at": 100}));
        assert_eq!(decode::<Reading>(&p).unwrap().at, 100.0);
    }

    #[test]
    fn test_missing_key_is_malformed() {
        let p = payload(json!({"todoText": "walk", "at": 1}));
        let err = decode::<Reading>(&p).unwrap_err();
        assert!(matches!(err, SyncError::MalformedPayload(msg) if msg.contains("isCompleted")));
    }

    #[test]
    fn test_mistyped_value_is_malformed() {
        let p = payload(json!({"todoText": "walk", "isCompleted": "yes", "at": 1}));
        assert!(matches!(
            decode::<Reading>(&p),
            Err(SyncError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_non_object_cannot_be_encoded() {
        assert!(matches!(
            encode(&vec![1, 2]),
            Err(SyncError::Serialization(_))
        ));
    }
}
