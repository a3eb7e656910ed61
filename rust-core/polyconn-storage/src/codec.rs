// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// JSON codec shared by all connectors.
//
// Two layers: the envelope (`StoredEntity` <-> bytes / text / JSON value),
// whose failures mean the stored record is damaged, and the payload
// (`serde_json::Value` -> caller type `T`), whose failures mean the caller
// asked for the wrong type.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::entity::StoredEntity;
use crate::error::{ConnectorError, ConnectorResult};

/// Serialize an envelope to JSON bytes.
pub fn encode(stored: &StoredEntity) -> ConnectorResult<Vec<u8>> {
    serde_json::to_vec(stored).map_err(|err| {
        ConnectorError::InvalidEntity(format!(
            "failed to serialize entity '{}': {}",
            stored.key, err
        ))
    })
}

/// Serialize an envelope to a JSON string (string-valued stores).
pub fn encode_string(stored: &StoredEntity) -> ConnectorResult<String> {
    serde_json::to_string(stored).map_err(|err| {
        ConnectorError::InvalidEntity(format!(
            "failed to serialize entity '{}': {}",
            stored.key, err
        ))
    })
}

/// Serialize an envelope to a JSON value (document stores).
pub fn encode_value(stored: &StoredEntity) -> ConnectorResult<Value> {
    serde_json::to_value(stored).map_err(|err| {
        ConnectorError::InvalidEntity(format!(
            "failed to serialize entity '{}': {}",
            stored.key, err
        ))
    })
}

/// Parse an envelope from JSON bytes.
pub fn decode(bytes: &[u8]) -> ConnectorResult<StoredEntity> {
    serde_json::from_slice(bytes)
        .map_err(|err| ConnectorError::CorruptedData(format!("invalid entity envelope: {err}")))
}

pub fn decode_str(text: &str) -> ConnectorResult<StoredEntity> {
    decode(text.as_bytes())
}

pub fn decode_value(value: Value) -> ConnectorResult<StoredEntity> {
    serde_json::from_value(value)
        .map_err(|err| ConnectorError::CorruptedData(format!("invalid entity envelope: {err}")))
}

/// Convert a stored payload into the caller's type.
pub fn decode_payload<T: DeserializeOwned>(key: &str, payload: Value) -> ConnectorResult<T> {
    serde_json::from_value(payload).map_err(|err| ConnectorError::Decode {
        key: key.to_string(),
        message: err.to_string(),
    })
}

/// Convert a caller value into a JSON payload without entity validation.
pub fn to_payload<T: Serialize + ?Sized>(key: &str, value: &T) -> ConnectorResult<Value> {
    serde_json::to_value(value).map_err(|err| {
        ConnectorError::InvalidEntity(format!(
            "failed to serialize value for key '{key}': {err}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestRecord {
        name: String,
        score: f64,
    }

    fn stored(key: &str, payload: Value) -> StoredEntity {
        StoredEntity {
            key: key.to_string(),
            payload,
            expiration: None,
            expires_at: None,
        }
    }

    #[test]
    fn test_envelope_round_trip() {
        let original = stored("rec1", json!({"name": "Alice", "score": 95.5}));
        let bytes = encode(&original).unwrap();
        assert_eq!(decode(&bytes).unwrap(), original);

        let text = encode_string(&original).unwrap();
        assert_eq!(decode_str(&text).unwrap(), original);

        let value = encode_value(&original).unwrap();
        assert_eq!(decode_value(value).unwrap(), original);
    }

    #[test]
    fn test_decode_garbage_is_corrupted_data() {
        match decode(b"not-valid-json!!!").unwrap_err() {
            ConnectorError::CorruptedData(msg) => assert!(msg.contains("invalid entity envelope")),
            other => panic!("expected CorruptedData, got: {other:?}"),
        }
        assert!(matches!(
            decode_value(json!({"Payload": 1})),
            Err(ConnectorError::CorruptedData(_))
        ));
    }

    #[test]
    fn test_decode_payload_typed() {
        let record: TestRecord =
            decode_payload("rec1", json!({"name": "Alice", "score": 95.5})).unwrap();
        assert_eq!(record.name, "Alice");

        assert_eq!(decode_payload::<i64>("n", json!(42)).unwrap(), 42);
        assert_eq!(decode_payload::<Vec<i32>>("v", json!([1, 2, 3])).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_decode_payload_wrong_type() {
        let err = decode_payload::<TestRecord>("rec1", json!("just a string")).unwrap_err();
        match err {
            ConnectorError::Decode { key, message } => {
                assert_eq!(key, "rec1");
                assert!(!message.is_empty());
            }
            other => panic!("expected Decode, got: {other:?}"),
        }
    }

    #[test]
    fn test_to_payload() {
        assert_eq!(to_payload("k", &vec![1, 2]).unwrap(), json!([1, 2]));
    }
}
