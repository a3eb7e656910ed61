// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Typed operations over any connector wrapper.
//
// Caller values are wrapped into `ConnectorEntity` envelopes on the way in
// and payloads are decoded back into `T` on the way out. Which backend sits
// underneath is invisible at this level.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::codec;
use crate::entity::{to_entities, ConnectorEntity};
use crate::error::{ConnectorError, ConnectorResult};
use crate::wrapper::ConnectorWrapper;

/// Client-side filter used by [`Operations::query`].
pub type Predicate<'a, T> = &'a (dyn Fn(&T) -> bool + Send + Sync);

/// The uniform CRUD contract every backend offers.
#[async_trait]
pub trait Operations<T>: Send + Sync
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// The value stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> ConnectorResult<Option<T>>;

    /// Every live value.
    async fn get_all(&self) -> ConnectorResult<Vec<T>>;

    /// Store `value` under `key`, replacing any existing record.
    async fn insert(&self, key: &str, value: &T, expiration: Option<Duration>)
        -> ConnectorResult<bool>;

    /// Store several values sharing one expiration.
    ///
    /// Pairs with an empty key or a null value are skipped, and a repeated
    /// key keeps its last value. Empty input is a successful no-op.
    async fn insert_many(
        &self,
        pairs: Vec<(String, T)>,
        expiration: Option<Duration>,
    ) -> ConnectorResult<bool>;

    /// Replace the value under an existing `key`. `Ok(false)` if absent.
    async fn update(&self, key: &str, value: &T) -> ConnectorResult<bool>;

    /// Remove `key`. `Ok(true)` only if a live record was removed.
    async fn delete(&self, key: &str) -> ConnectorResult<bool>;

    async fn exists(&self, key: &str) -> ConnectorResult<bool>;

    /// Live values matching `predicate`.
    ///
    /// # Errors
    ///
    /// [`ConnectorError::Unsupported`] on backends without query support.
    async fn query(&self, predicate: Predicate<'_, T>) -> ConnectorResult<Vec<T>>;
}

/// [`Operations`] implemented over a shared [`ConnectorWrapper`].
pub struct ConnectorOperations<T> {
    wrapper: Arc<dyn ConnectorWrapper>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> ConnectorOperations<T> {
    pub fn new(wrapper: Arc<dyn ConnectorWrapper>) -> Self {
        Self {
            wrapper,
            _payload: PhantomData,
        }
    }

    /// The backend wrapper underneath.
    pub fn wrapper(&self) -> &Arc<dyn ConnectorWrapper> {
        &self.wrapper
    }

    pub fn name(&self) -> &'static str {
        self.wrapper.name()
    }
}

impl<T> Clone for ConnectorOperations<T> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.wrapper))
    }
}

impl<T> std::fmt::Debug for ConnectorOperations<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorOperations")
            .field("backend", &self.wrapper.name())
            .field("connected", &self.wrapper.is_connected())
            .finish()
    }
}

fn decode<T: DeserializeOwned>(entity: ConnectorEntity) -> ConnectorResult<T> {
    let key = entity.key().to_string();
    codec::decode_payload(&key, entity.into_payload())
}

#[async_trait]
impl<T> Operations<T> for ConnectorOperations<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> ConnectorResult<Option<T>> {
        match self.wrapper.get(key).await? {
            Some(entity) => decode(entity).map(Some),
            None => Ok(None),
        }
    }

    async fn get_all(&self) -> ConnectorResult<Vec<T>> {
        self.wrapper
            .get_all()
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    async fn insert(
        &self,
        key: &str,
        value: &T,
        expiration: Option<Duration>,
    ) -> ConnectorResult<bool> {
        let entity = ConnectorEntity::new(key, value, expiration)?;
        self.wrapper.insert(entity).await
    }

    async fn insert_many(
        &self,
        pairs: Vec<(String, T)>,
        expiration: Option<Duration>,
    ) -> ConnectorResult<bool> {
        let submitted = pairs.len();
        let entities = to_entities(pairs, expiration);
        if entities.len() < submitted {
            debug!(
                skipped = submitted - entities.len(),
                backend = self.wrapper.name(),
                "dropped invalid or repeated pairs"
            );
        }
        if entities.is_empty() {
            return Ok(true);
        }
        self.wrapper.insert_many(entities).await
    }

    async fn update(&self, key: &str, value: &T) -> ConnectorResult<bool> {
        let entity = ConnectorEntity::new(key, value, None)?;
        self.wrapper.update(entity).await
    }

    async fn delete(&self, key: &str) -> ConnectorResult<bool> {
        self.wrapper.delete(key).await
    }

    async fn exists(&self, key: &str) -> ConnectorResult<bool> {
        self.wrapper.exists(key).await
    }

    async fn query(&self, predicate: Predicate<'_, T>) -> ConnectorResult<Vec<T>> {
        if !self.wrapper.supports_query() {
            return Err(ConnectorError::unsupported(self.wrapper.name(), "query"));
        }
        let all: Vec<T> = self.get_all().await?;
        Ok(all.into_iter().filter(|value| predicate(value)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    use crate::connectors::memory::MemoryWrapper;
    use crate::metrics::MetricsWrapper;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
        age: u32,
    }

    fn user(name: &str, age: u32) -> User {
        User {
            name: name.to_string(),
            age,
        }
    }

    fn ops<T>() -> ConnectorOperations<T> {
        ConnectorOperations::new(Arc::new(MemoryWrapper::new()))
    }

    /// A memory wrapper that refuses client-side queries.
    struct NoQuery(MemoryWrapper);

    #[async_trait]
    impl ConnectorWrapper for NoQuery {
        async fn get(&self, key: &str) -> ConnectorResult<Option<ConnectorEntity>> {
            self.0.get(key).await
        }
        async fn get_all(&self) -> ConnectorResult<Vec<ConnectorEntity>> {
            self.0.get_all().await
        }
        async fn insert(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
            self.0.insert(entity).await
        }
        async fn insert_many(&self, entities: Vec<ConnectorEntity>) -> ConnectorResult<bool> {
            self.0.insert_many(entities).await
        }
        async fn update(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
            self.0.update(entity).await
        }
        async fn delete(&self, key: &str) -> ConnectorResult<bool> {
            self.0.delete(key).await
        }
        fn name(&self) -> &'static str {
            "NoQuery"
        }
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let store = ops::<User>();
        let ada = user("Ada", 36);

        assert!(store.insert("ada", &ada, None).await.unwrap());
        assert_eq!(store.get("ada").await.unwrap(), Some(ada));
        assert_eq!(store.get("nobody").await.unwrap(), None);
        assert!(store.exists("ada").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_requires_existing_key() {
        let store = ops::<User>();
        assert!(!store.update("ada", &user("Ada", 37)).await.unwrap());
        assert_eq!(store.get("ada").await.unwrap(), None);

        store.insert("ada", &user("Ada", 36), None).await.unwrap();
        assert!(store.update("ada", &user("Ada", 37)).await.unwrap());
        assert_eq!(store.get("ada").await.unwrap().unwrap().age, 37);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = ops::<String>();
        store.insert("k", &"v".to_string(), None).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_many_skips_invalid_pairs() {
        let store = ops::<Option<String>>();
        let pairs = vec![
            ("k1".to_string(), Some("v1".to_string())),
            ("k2".to_string(), Some("v2".to_string())),
            (String::new(), Some("v3".to_string())),
            ("k3".to_string(), None),
        ];
        assert!(store.insert_many(pairs, None).await.unwrap());

        let mut all = store.get_all().await.unwrap();
        all.sort();
        assert_eq!(all, vec![Some("v1".to_string()), Some("v2".to_string())]);
        assert!(store.insert_many(Vec::new(), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_many_forwards_one_entity_per_key() {
        let metered = Arc::new(MetricsWrapper::new(MemoryWrapper::new()));
        let store = ConnectorOperations::<String>::new(metered.clone());
        let pairs = vec![
            ("k".to_string(), "a".to_string()),
            ("k".to_string(), "b".to_string()),
        ];
        assert!(store.insert_many(pairs, None).await.unwrap());

        assert_eq!(metered.stats().await.insert_count, 1);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_entity() {
        let store = ops::<Option<u8>>();
        let err = store.insert("k", &None, None).await.unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidEntity(_)));
        let err = store.insert("", &Some(1), None).await.unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidEntity(_)));
    }

    #[tokio::test]
    async fn test_decode_error_names_key() {
        let wrapper = Arc::new(MemoryWrapper::new());
        let raw = ConnectorOperations::<serde_json::Value>::new(wrapper.clone());
        raw.insert("k", &json!({"unexpected": true}), None)
            .await
            .unwrap();

        let typed = ConnectorOperations::<User>::new(wrapper);
        match typed.get("k").await.unwrap_err() {
            ConnectorError::Decode { key, .. } => assert_eq!(key, "k"),
            other => panic!("expected Decode error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_expired_values_are_absent() {
        let store = ops::<u32>();
        store
            .insert("short", &1, Some(Duration::from_millis(20)))
            .await
            .unwrap();
        store.insert("long", &2, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.get("short").await.unwrap(), None);
        assert!(!store.exists("short").await.unwrap());
        assert_eq!(store.get_all().await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_query_filters_client_side() {
        let store = ops::<User>();
        store
            .insert_many(
                vec![
                    ("a".into(), user("Ada", 36)),
                    ("b".into(), user("Bob", 17)),
                    ("c".into(), user("Cy", 52)),
                ],
                None,
            )
            .await
            .unwrap();

        let adults = store.query(&|u: &User| u.age >= 18).await.unwrap();
        assert_eq!(adults.len(), 2);
        assert!(adults.iter().all(|u| u.age >= 18));
    }

    #[tokio::test]
    async fn test_query_unsupported() {
        let store =
            ConnectorOperations::<u32>::new(Arc::new(NoQuery(MemoryWrapper::new())));
        let err = store.query(&|_: &u32| true).await.unwrap_err();
        assert_eq!(err.to_string(), "query is not supported by the NoQuery connector");
    }
}
