// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The connector wrapper contract.
//
// Every backend implements `ConnectorWrapper`, translating entities to its
// native record shape and issuing native driver calls. Wrappers are
// expected to be thread-safe (`Send + Sync`) and fully asynchronous; sync
// drivers are moved onto the blocking pool inside the wrapper.

use std::sync::Arc;

use async_trait::async_trait;

use crate::entity::ConnectorEntity;
use crate::error::ConnectorResult;

/// A backend speaking the entity contract.
///
/// Higher-level typed access is provided by
/// [`crate::operations::ConnectorOperations`], which wraps caller values
/// into entities and decodes payloads back.
///
/// Expired records are never returned by any read.
#[async_trait]
pub trait ConnectorWrapper: Send + Sync {
    /// Retrieve the live entity stored under `key`.
    ///
    /// Returns `Ok(None)` if the key does not exist, rather than an error.
    async fn get(&self, key: &str) -> ConnectorResult<Option<ConnectorEntity>>;

    /// Every live entity in the store, in no particular order.
    async fn get_all(&self) -> ConnectorResult<Vec<ConnectorEntity>>;

    /// Store `entity`, replacing any record under the same key.
    async fn insert(&self, entity: ConnectorEntity) -> ConnectorResult<bool>;

    /// Store several entities. `Ok(true)` only if every one was stored.
    async fn insert_many(&self, entities: Vec<ConnectorEntity>) -> ConnectorResult<bool>;

    /// Replace the record under `entity.key()` if one exists.
    ///
    /// Returns `Ok(false)` and writes nothing when the key is absent.
    async fn update(&self, entity: ConnectorEntity) -> ConnectorResult<bool>;

    /// Remove the record under `key`.
    ///
    /// Returns `Ok(true)` if a live record existed and was removed.
    async fn delete(&self, key: &str) -> ConnectorResult<bool>;

    /// Check whether a live record exists under `key`.
    async fn exists(&self, key: &str) -> ConnectorResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Whether client-side `query` over `get_all` is offered.
    fn supports_query(&self) -> bool {
        false
    }

    /// Whether the underlying driver handle has been created yet.
    fn is_connected(&self) -> bool {
        true
    }

    /// A human-readable name for this backend, used in logging and errors.
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<W> ConnectorWrapper for Arc<W>
where
    W: ConnectorWrapper + ?Sized,
{
    async fn get(&self, key: &str) -> ConnectorResult<Option<ConnectorEntity>> {
        (**self).get(key).await
    }

    async fn get_all(&self) -> ConnectorResult<Vec<ConnectorEntity>> {
        (**self).get_all().await
    }

    async fn insert(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        (**self).insert(entity).await
    }

    async fn insert_many(&self, entities: Vec<ConnectorEntity>) -> ConnectorResult<bool> {
        (**self).insert_many(entities).await
    }

    async fn update(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        (**self).update(entity).await
    }

    async fn delete(&self, key: &str) -> ConnectorResult<bool> {
        (**self).delete(key).await
    }

    async fn exists(&self, key: &str) -> ConnectorResult<bool> {
        (**self).exists(key).await
    }

    fn supports_query(&self) -> bool {
        (**self).supports_query()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
