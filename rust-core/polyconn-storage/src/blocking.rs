// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Synchronous client.
//
// Drives the same futures as `ConnectorClient` on a runtime it owns, so
// both clients map the same inputs to the same outputs.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::{Builder, Runtime};

use crate::client::ConnectorClient;
use crate::config::{ConfigSection, ConnectorConfig};
use crate::error::ConnectorResult;
use crate::operations::Predicate;
use crate::wrapper::ConnectorWrapper;

const WORKER_THREADS: usize = 2;

/// Blocking counterpart of [`ConnectorClient`].
///
/// Must not be used from inside an async runtime; every call blocks the
/// current thread until the backend answers.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use polyconn_storage::blocking::BlockingConnectorClient;
/// use polyconn_storage::connectors::MemoryWrapper;
///
/// let client = BlockingConnectorClient::<u32>::with_wrapper(Arc::new(MemoryWrapper::new())).unwrap();
/// assert!(client.insert("answer", &42).unwrap());
/// assert_eq!(client.get("answer").unwrap(), Some(42));
/// ```
pub struct BlockingConnectorClient<T> {
    inner: ConnectorClient<T>,
    runtime: Runtime,
}

fn runtime() -> ConnectorResult<Runtime> {
    Ok(Builder::new_multi_thread()
        .worker_threads(WORKER_THREADS)
        .thread_name("polyconn-blocking")
        .enable_all()
        .build()?)
}

impl<T> BlockingConnectorClient<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(config: &ConnectorConfig) -> ConnectorResult<Self> {
        Ok(Self {
            inner: ConnectorClient::new(config)?,
            runtime: runtime()?,
        })
    }

    pub fn from_section(section: &ConfigSection) -> ConnectorResult<Self> {
        Self::new(&ConnectorConfig::from_section(section)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ConnectorResult<Self> {
        Self::from_section(&ConfigSection::from_json_file(path)?)
    }

    pub fn with_wrapper(wrapper: Arc<dyn ConnectorWrapper>) -> ConnectorResult<Self> {
        Ok(Self {
            inner: ConnectorClient::with_wrapper(wrapper),
            runtime: runtime()?,
        })
    }

    /// The async client underneath.
    pub fn as_async(&self) -> &ConnectorClient<T> {
        &self.inner
    }

    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn get(&self, key: &str) -> ConnectorResult<Option<T>> {
        self.runtime.block_on(self.inner.get(key))
    }

    pub fn get_all(&self) -> ConnectorResult<Vec<T>> {
        self.runtime.block_on(self.inner.get_all())
    }

    pub fn insert(&self, key: &str, value: &T) -> ConnectorResult<bool> {
        self.runtime.block_on(self.inner.insert(key, value))
    }

    pub fn insert_with_expiration(
        &self,
        key: &str,
        value: &T,
        expiration: Duration,
    ) -> ConnectorResult<bool> {
        self.runtime
            .block_on(self.inner.insert_with_expiration(key, value, expiration))
    }

    pub fn insert_many(&self, pairs: Vec<(String, T)>) -> ConnectorResult<bool> {
        self.runtime.block_on(self.inner.insert_many(pairs))
    }

    pub fn insert_many_with_expiration(
        &self,
        pairs: Vec<(String, T)>,
        expiration: Duration,
    ) -> ConnectorResult<bool> {
        self.runtime
            .block_on(self.inner.insert_many_with_expiration(pairs, expiration))
    }

    pub fn update(&self, key: &str, value: &T) -> ConnectorResult<bool> {
        self.runtime.block_on(self.inner.update(key, value))
    }

    pub fn delete(&self, key: &str) -> ConnectorResult<bool> {
        self.runtime.block_on(self.inner.delete(key))
    }

    pub fn exists(&self, key: &str) -> ConnectorResult<bool> {
        self.runtime.block_on(self.inner.exists(key))
    }

    pub fn query(&self, predicate: Predicate<'_, T>) -> ConnectorResult<Vec<T>> {
        self.runtime.block_on(self.inner.query(predicate))
    }
}

impl<T> std::fmt::Debug for BlockingConnectorClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingConnectorClient")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}
