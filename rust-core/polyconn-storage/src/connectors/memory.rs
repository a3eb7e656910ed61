// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-process connector.
//
// Uses a `BTreeMap` of stored envelopes wrapped in a tokio `RwLock`.
// Expired envelopes are skipped on read and pruned on write. Not selectable
// through `Instance`; intended for tests, the HTTP layer's own tests and
// ephemeral use.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::entity::{ConnectorEntity, StoredEntity};
use crate::error::ConnectorResult;
use crate::wrapper::ConnectorWrapper;

/// An in-memory wrapper backed by a sorted map.
///
/// All data lives in process memory and is lost on drop. Clones share the
/// same map.
///
/// # Example
///
/// ```rust
/// use polyconn_storage::connectors::memory::MemoryWrapper;
/// use polyconn_storage::entity::ConnectorEntity;
/// use polyconn_storage::wrapper::ConnectorWrapper;
///
/// # tokio_test::block_on(async {
/// let store = MemoryWrapper::new();
/// let entity = ConnectorEntity::new("hello", &"world", None).unwrap();
/// assert!(store.insert(entity).await.unwrap());
/// let found = store.get("hello").await.unwrap().unwrap();
/// assert_eq!(found.payload(), "world");
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryWrapper {
    data: Arc<RwLock<BTreeMap<String, StoredEntity>>>,
}

impl MemoryWrapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records.
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        self.data
            .read()
            .await
            .values()
            .filter(|s| !s.is_expired_at(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn prune(map: &mut BTreeMap<String, StoredEntity>) {
        let now = Utc::now();
        map.retain(|_, stored| !stored.is_expired_at(now));
    }
}

#[async_trait]
impl ConnectorWrapper for MemoryWrapper {
    async fn get(&self, key: &str) -> ConnectorResult<Option<ConnectorEntity>> {
        let map = self.data.read().await;
        Ok(map
            .get(key)
            .cloned()
            .and_then(StoredEntity::live)
            .map(ConnectorEntity::from_stored))
    }

    async fn get_all(&self) -> ConnectorResult<Vec<ConnectorEntity>> {
        let now = Utc::now();
        let map = self.data.read().await;
        Ok(map
            .values()
            .filter(|s| !s.is_expired_at(now))
            .cloned()
            .map(ConnectorEntity::from_stored)
            .collect())
    }

    async fn insert(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        let mut map = self.data.write().await;
        Self::prune(&mut map);
        map.insert(entity.key().to_string(), entity.to_stored());
        Ok(true)
    }

    async fn insert_many(&self, entities: Vec<ConnectorEntity>) -> ConnectorResult<bool> {
        let mut map = self.data.write().await;
        Self::prune(&mut map);
        for entity in entities {
            map.insert(entity.key().to_string(), entity.to_stored());
        }
        Ok(true)
    }

    async fn update(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        let mut map = self.data.write().await;
        Self::prune(&mut map);
        match map.get_mut(entity.key()) {
            Some(slot) => {
                *slot = entity.to_stored();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> ConnectorResult<bool> {
        let mut map = self.data.write().await;
        Self::prune(&mut map);
        Ok(map.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> ConnectorResult<bool> {
        let map = self.data.read().await;
        Ok(map.get(key).is_some_and(|s| !s.is_expired()))
    }

    fn supports_query(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}
