// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The public async client.
//
// A `ConnectorClient<T>` is built once from configuration and lives for as
// long as the caller needs it. It owns the operations adapter, which owns
// the backend wrapper, which owns the lazily created driver handle.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::config::{ConfigSection, ConnectorConfig};
use crate::error::ConnectorResult;
use crate::factory::OperationsFactory;
use crate::operations::{ConnectorOperations, Operations, Predicate};
use crate::wrapper::ConnectorWrapper;

/// Typed CRUD client over the configured backend.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use polyconn_storage::client::ConnectorClient;
/// use polyconn_storage::connectors::MemoryWrapper;
///
/// # tokio_test::block_on(async {
/// let client: ConnectorClient<String> = ConnectorClient::with_wrapper(Arc::new(MemoryWrapper::new()));
/// client.insert("greeting", &"hello".to_string()).await.unwrap();
/// assert_eq!(client.get("greeting").await.unwrap().as_deref(), Some("hello"));
/// # });
/// ```
pub struct ConnectorClient<T> {
    operations: ConnectorOperations<T>,
}

impl<T> ConnectorClient<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Build a client for an already parsed configuration.
    pub fn new(config: &ConnectorConfig) -> ConnectorResult<Self> {
        let operations = OperationsFactory::operations(config)?;
        info!(backend = operations.name(), "connector client created");
        Ok(Self { operations })
    }

    /// Build a client from a `ConnectorConfig` section.
    pub fn from_section(section: &ConfigSection) -> ConnectorResult<Self> {
        Self::new(&ConnectorConfig::from_section(section)?)
    }

    /// Build a client from the `ConnectorConfig` section of a JSON settings
    /// file.
    pub fn from_json_file(path: impl AsRef<Path>) -> ConnectorResult<Self> {
        Self::from_section(&ConfigSection::from_json_file(path)?)
    }

    /// Build a client over an existing wrapper.
    pub fn with_wrapper(wrapper: Arc<dyn ConnectorWrapper>) -> Self {
        Self {
            operations: ConnectorOperations::new(wrapper),
        }
    }

    pub fn operations(&self) -> &ConnectorOperations<T> {
        &self.operations
    }

    /// Backend name, e.g. `"Redis"`.
    pub fn name(&self) -> &'static str {
        self.operations.name()
    }

    /// Whether the backend handle has been created yet.
    pub fn is_connected(&self) -> bool {
        self.operations.wrapper().is_connected()
    }

    pub fn supports_query(&self) -> bool {
        self.operations.wrapper().supports_query()
    }

    pub async fn get(&self, key: &str) -> ConnectorResult<Option<T>> {
        self.operations.get(key).await
    }

    pub async fn get_all(&self) -> ConnectorResult<Vec<T>> {
        self.operations.get_all().await
    }

    pub async fn insert(&self, key: &str, value: &T) -> ConnectorResult<bool> {
        self.operations.insert(key, value, None).await
    }

    pub async fn insert_with_expiration(
        &self,
        key: &str,
        value: &T,
        expiration: Duration,
    ) -> ConnectorResult<bool> {
        self.operations.insert(key, value, Some(expiration)).await
    }

    pub async fn insert_many(&self, pairs: Vec<(String, T)>) -> ConnectorResult<bool> {
        self.operations.insert_many(pairs, None).await
    }

    pub async fn insert_many_with_expiration(
        &self,
        pairs: Vec<(String, T)>,
        expiration: Duration,
    ) -> ConnectorResult<bool> {
        self.operations.insert_many(pairs, Some(expiration)).await
    }

    pub async fn update(&self, key: &str, value: &T) -> ConnectorResult<bool> {
        self.operations.update(key, value).await
    }

    pub async fn delete(&self, key: &str) -> ConnectorResult<bool> {
        self.operations.delete(key).await
    }

    pub async fn exists(&self, key: &str) -> ConnectorResult<bool> {
        self.operations.exists(key).await
    }

    pub async fn query(&self, predicate: Predicate<'_, T>) -> ConnectorResult<Vec<T>> {
        self.operations.query(predicate).await
    }
}

impl<T> std::fmt::Debug for ConnectorClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorClient")
            .field("operations", &self.operations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{keys, LiteDbConfig};
    use crate::connectors::MemoryWrapper;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_from_section_is_lazy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.redb");
        let section = ConfigSection::new()
            .with(keys::INSTANCE, "LiteDb")
            .with(keys::CONNECTION_STRING, path.to_string_lossy());

        let client = ConnectorClient::<Value>::from_section(&section).unwrap();
        assert_eq!(client.name(), "LiteDb");
        assert!(!client.is_connected());
        assert!(!path.exists());

        assert!(client.insert("k", &json!({"a": 1})).await.unwrap());
        assert!(client.is_connected());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("store.redb");
        let settings = dir.path().join("appsettings.json");
        std::fs::write(
            &settings,
            json!({
                "Logging": {"LogLevel": {"Default": "Information"}},
                "ConnectorConfig": {
                    "Instance": "LiteDb",
                    "ConnectionString": db.to_string_lossy(),
                    "CollectionName": "things"
                }
            })
            .to_string(),
        )
        .unwrap();

        let client = ConnectorClient::<u32>::from_json_file(&settings).unwrap();
        assert!(client.insert("n", &7).await.unwrap());
        assert_eq!(client.get("n").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_expiration_variants() {
        let client = ConnectorClient::<String>::with_wrapper(Arc::new(MemoryWrapper::new()));
        client
            .insert_with_expiration("short", &"x".into(), Duration::from_millis(20))
            .await
            .unwrap();
        client
            .insert_many_with_expiration(
                vec![("a".into(), "1".into()), ("b".into(), "2".into())],
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!client.exists("short").await.unwrap());
        let mut all = client.get_all().await.unwrap();
        all.sort();
        assert_eq!(all, vec!["1", "2"]);
    }

    #[test]
    fn test_config_error_at_construction() {
        let section = ConfigSection::new().with(keys::INSTANCE, "LiteDb");
        let err = ConnectorClient::<String>::from_section(&section).unwrap_err();
        assert!(err.is_config());

        let config = ConnectorConfig::LiteDb(LiteDbConfig::new("unused.redb"));
        let client = ConnectorClient::<String>::new(&config).unwrap();
        assert_eq!(client.name(), "LiteDb");
        assert!(!client.supports_query());
    }
}
