// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The connector entity envelope.
//
// Every value a caller stores travels as a `ConnectorEntity`: a non-empty
// key, a JSON payload and an optional relative expiration. Backends persist
// it in one shared shape, `StoredEntity`, which adds the absolute deadline
// used for lazy expiry on read.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConnectorError, ConnectorResult};

/// A key, a payload and an optional expiration.
///
/// Built with [`ConnectorEntity::new`], which validates the key and the
/// payload. The payload is held as a `serde_json::Value` so that wrappers
/// never see the caller's type.
#[derive(Debug, Clone)]
pub struct ConnectorEntity {
    key: String,
    payload: Value,
    expiration: Option<Duration>,
    expires_at: Option<DateTime<Utc>>,
}

impl ConnectorEntity {
    /// Build an entity, rejecting an empty key and a payload that is `null`
    /// or cannot be serialized.
    pub fn new<T>(
        key: impl Into<String>,
        payload: &T,
        expiration: Option<Duration>,
    ) -> ConnectorResult<Self>
    where
        T: Serialize + ?Sized,
    {
        let key = key.into();
        if key.is_empty() {
            return Err(ConnectorError::InvalidEntity("key must not be empty".into()));
        }

        let payload = serde_json::to_value(payload).map_err(|e| {
            ConnectorError::InvalidEntity(format!("payload for '{key}' is not serializable: {e}"))
        })?;
        if payload.is_null() {
            return Err(ConnectorError::InvalidEntity(format!(
                "payload for '{key}' must not be null"
            )));
        }

        let expires_at = expiration.and_then(deadline_from_now);

        Ok(Self {
            key,
            payload,
            expiration,
            expires_at,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn expiration(&self) -> Option<Duration> {
        self.expiration
    }

    /// Absolute deadline computed when the entity was built.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Consume the entity and return its payload.
    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// The same key and payload with no expiration.
    pub fn without_expiration(mut self) -> Self {
        self.expiration = None;
        self.expires_at = None;
        self
    }

    /// The persisted envelope for this entity.
    pub fn to_stored(&self) -> StoredEntity {
        StoredEntity {
            key: self.key.clone(),
            payload: self.payload.clone(),
            expiration: self.expiration.map(duration_to_millis),
            expires_at: self.expires_at,
        }
    }

    /// Rebuild an entity from a persisted envelope. The stored deadline is
    /// kept as-is rather than recomputed.
    pub fn from_stored(stored: StoredEntity) -> Self {
        Self {
            key: stored.key,
            payload: stored.payload,
            expiration: stored.expiration.map(Duration::from_millis),
            expires_at: stored.expires_at,
        }
    }

    /// XOR of the key, payload and expiration hashes.
    ///
    /// Distinct entities can collide; collisions compare equal.
    pub fn fingerprint(&self) -> u64 {
        let key_hash = hash_one(&self.key);
        let payload_hash = hash_one(&self.payload.to_string());
        let expiration_hash = hash_one(&self.expiration);
        key_hash ^ payload_hash ^ expiration_hash
    }
}

impl PartialEq for ConnectorEntity {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl Eq for ConnectorEntity {}

impl Hash for ConnectorEntity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.fingerprint());
    }
}

impl fmt::Display for ConnectorEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.to_stored()) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{{\"Key\":{:?}}}", self.key),
        }
    }
}

/// The envelope persisted by every backend.
///
/// `Expiration` is in milliseconds. `ExpiresAt` is an RFC 3339 UTC
/// timestamp with exactly three fractional digits, so stored deadlines
/// order lexicographically. Both are omitted when the entity never expires.
/// Unknown fields written by a backend (`_id`, `_key`, `@metadata`, ...)
/// are ignored on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoredEntity {
    pub key: String,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<u64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "deadline_format"
    )]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredEntity {
    /// True once the deadline has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// `Some(self)` unless expired.
    pub fn live(self) -> Option<Self> {
        if self.is_expired() {
            None
        } else {
            Some(self)
        }
    }
}

/// Convert `(key, value)` pairs into entities sharing one expiration.
///
/// Pairs with an empty key or a value that serializes to `null` (or not at
/// all) are dropped silently. A repeated key keeps its last valid value at
/// the position of its first appearance, so every key appears once.
pub fn to_entities<I, K, V>(pairs: I, expiration: Option<Duration>) -> Vec<ConnectorEntity>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Serialize,
{
    let mut entities: Vec<ConnectorEntity> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for (key, value) in pairs {
        let Ok(entity) = ConnectorEntity::new(key, &value, expiration) else {
            continue;
        };
        match positions.get(entity.key()) {
            Some(&index) => entities[index] = entity,
            None => {
                positions.insert(entity.key().to_string(), entities.len());
                entities.push(entity);
            }
        }
    }
    entities
}

/// True iff `value` serializes to JSON. `None` / unit are vacuously
/// serializable.
pub fn is_serializable<T>(value: &T) -> bool
where
    T: Serialize + ?Sized,
{
    serde_json::to_value(value).is_ok()
}

pub(crate) fn duration_to_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn deadline_from_now(expiration: Duration) -> Option<DateTime<Utc>> {
    let delta = chrono::Duration::from_std(expiration).ok()?;
    Utc::now().checked_add_signed(delta).map(|d| d.trunc_subsecs(3))
}

/// Render a deadline the way `ExpiresAt` is stored.
pub fn format_deadline(deadline: DateTime<Utc>) -> String {
    deadline.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `now` in the stored `ExpiresAt` format, for server-side comparisons.
pub fn deadline_now() -> String {
    format_deadline(Utc::now())
}

mod deadline_format {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(deadline) => serializer.serialize_str(&super::format_deadline(*deadline)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|text| {
            DateTime::parse_from_rfc3339(&text)
                .map(|d| d.with_timezone(&Utc))
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

fn hash_one<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap, HashSet};

    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_new_rejects_empty_key() {
        let err = ConnectorEntity::new("", &"value", None).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidEntity(_)));
    }

    #[test]
    fn test_new_rejects_null_payload() {
        let err = ConnectorEntity::new("k", &Option::<String>::None, None).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidEntity(_)));
        assert!(err.to_string().contains("must not be null"));
    }

    #[test]
    fn test_new_rejects_unserializable_payload() {
        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys are not JSON object keys");
        let err = ConnectorEntity::new("k", &bad, None).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidEntity(_)));
    }

    #[test]
    fn test_expiration_sets_deadline() {
        let before = Utc::now().trunc_subsecs(3);
        let entity = ConnectorEntity::new("k", &1, Some(Duration::from_secs(60))).unwrap();
        let deadline = entity.expires_at().unwrap();
        assert!(deadline >= before + chrono::Duration::seconds(60));
        assert!(ConnectorEntity::new("k", &1, None).unwrap().expires_at().is_none());
    }

    #[test]
    fn test_stored_shape() {
        let entity =
            ConnectorEntity::new("user:1", &json!({"name": "Ada"}), Some(Duration::from_secs(2)))
                .unwrap();
        let stored = serde_json::to_value(entity.to_stored()).unwrap();
        assert_eq!(stored["Key"], "user:1");
        assert_eq!(stored["Payload"]["name"], "Ada");
        assert_eq!(stored["Expiration"], 2000);
        assert!(stored["ExpiresAt"].is_string());

        let plain = serde_json::to_value(ConnectorEntity::new("k", &1, None).unwrap().to_stored())
            .unwrap();
        assert!(plain.get("Expiration").is_none());
        assert!(plain.get("ExpiresAt").is_none());
    }

    #[test]
    fn test_deadline_is_fixed_width() {
        let entity = ConnectorEntity::new("k", &1, Some(Duration::from_secs(1))).unwrap();
        let json = serde_json::to_value(entity.to_stored()).unwrap();
        let text = json["ExpiresAt"].as_str().unwrap();
        // 2026-10-16T10:00:00.123Z
        assert_eq!(text.len(), 24);
        assert!(text.ends_with('Z'));
        assert_eq!(deadline_now().len(), 24);

        let back: StoredEntity = serde_json::from_value(json).unwrap();
        assert_eq!(back.expires_at, entity.expires_at());

        let foreign: StoredEntity = serde_json::from_value(serde_json::json!({
            "Key": "k", "Payload": 1, "ExpiresAt": "2030-01-01T00:00:00+02:00"
        }))
        .unwrap();
        assert_eq!(foreign.expires_at.unwrap().to_rfc3339(), "2029-12-31T22:00:00+00:00");
    }

    #[test]
    fn test_stored_ignores_unknown_fields() {
        let stored: StoredEntity = serde_json::from_value(json!({
            "_key": "k", "_rev": "_abc", "Key": "k", "Payload": [1, 2, 3],
            "@metadata": {"@collection": "ConnectorEntities"}
        }))
        .unwrap();
        assert_eq!(stored.key, "k");
        assert_eq!(stored.payload, json!([1, 2, 3]));
        assert_eq!(stored.expiration, None);
    }

    #[test]
    fn test_expiry_check() {
        let now = Utc::now();
        let mut stored = ConnectorEntity::new("k", &1, None).unwrap().to_stored();
        assert!(!stored.is_expired_at(now));

        stored.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(stored.is_expired_at(now));
        assert!(stored.clone().live().is_none());

        stored.expires_at = Some(now + chrono::Duration::hours(1));
        assert!(stored.live().is_some());
    }

    #[test]
    fn test_round_trip_through_stored() {
        let entity =
            ConnectorEntity::new("k", &json!({"a": 1}), Some(Duration::from_millis(1500))).unwrap();
        let back = ConnectorEntity::from_stored(entity.to_stored());
        assert_eq!(back, entity);
        assert_eq!(back.expires_at(), entity.expires_at());
    }

    #[test]
    fn test_equality_is_fingerprint_based() {
        let a = ConnectorEntity::new("k", &json!({"x": 1}), None).unwrap();
        let b = ConnectorEntity::new("k", &json!({"x": 1}), None).unwrap();
        let c = ConnectorEntity::new("k", &json!({"x": 2}), None).unwrap();
        let d = ConnectorEntity::new("k", &json!({"x": 1}), Some(Duration::from_secs(1))).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_display_is_json() {
        let entity = ConnectorEntity::new("k", &"v", None).unwrap();
        assert_eq!(entity.to_string(), r#"{"Key":"k","Payload":"v"}"#);
    }

    #[test]
    fn test_to_entities_drops_invalid_pairs() {
        let pairs: Vec<(&str, Option<&str>)> = vec![
            ("k1", Some("v1")),
            ("k2", Some("v2")),
            ("", Some("v3")),
            ("k3", None),
        ];
        let entities = to_entities(pairs, None);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].key(), "k1");
        assert_eq!(entities[0].payload(), &json!("v1"));
        assert_eq!(entities[1].key(), "k2");
        assert_eq!(entities[1].payload(), &json!("v2"));
    }

    #[test]
    fn test_to_entities_keeps_last_value_per_key() {
        let pairs = vec![("k", Some("a")), ("other", Some("x")), ("k", Some("b")), ("k", None)];
        let entities = to_entities(pairs, None);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].key(), "k");
        assert_eq!(entities[0].payload(), &json!("b"));
        assert_eq!(entities[1].key(), "other");
    }

    #[test]
    fn test_to_entities_applies_expiration() {
        let mut map = BTreeMap::new();
        map.insert("a", 1);
        map.insert("b", 2);
        let entities = to_entities(map, Some(Duration::from_secs(30)));
        assert!(entities
            .iter()
            .all(|e| e.expiration() == Some(Duration::from_secs(30))));
    }

    #[test]
    fn test_is_serializable() {
        assert!(is_serializable(&"text"));
        assert!(is_serializable(&json!({"nested": [1, 2, 3]})));
        assert!(is_serializable(&Option::<u8>::None));
        assert!(is_serializable(&()));

        let mut bad = HashMap::new();
        bad.insert(vec![1u8], 1);
        assert!(!is_serializable(&bad));
    }

    proptest! {
        #[test]
        fn prop_to_entities_keeps_last_valid_value_per_key(
            pairs in proptest::collection::vec(("[a-z]{0,4}", proptest::option::of(any::<i32>())), 0..32)
        ) {
            let mut expected: Vec<(String, i32)> = Vec::new();
            for (k, v) in &pairs {
                let Some(v) = v else { continue };
                if k.is_empty() {
                    continue;
                }
                match expected.iter_mut().find(|(key, _)| key == k) {
                    Some(slot) => slot.1 = *v,
                    None => expected.push((k.clone(), *v)),
                }
            }

            let entities = to_entities(pairs, None);
            prop_assert_eq!(entities.len(), expected.len());
            for (entity, (key, value)) in entities.iter().zip(expected.iter()) {
                prop_assert_eq!(entity.key(), key.as_str());
                prop_assert_eq!(entity.payload(), &json!(value));
            }
        }

        #[test]
        fn prop_equal_inputs_give_equal_fingerprints(key in "[a-z]{1,8}", value in any::<i64>()) {
            let a = ConnectorEntity::new(key.clone(), &value, None).unwrap();
            let b = ConnectorEntity::new(key, &value, None).unwrap();
            prop_assert_eq!(a.fingerprint(), b.fingerprint());
        }
    }
}
