// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Metrics-collecting connector wrapper.
//
// Wraps any `ConnectorWrapper` and transparently collects operation counts,
// latency sums, entity totals and error counts. The HTTP surface reports
// these under `/stats`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::entity::ConnectorEntity;
use crate::error::ConnectorResult;
use crate::wrapper::ConnectorWrapper;

/// Accumulated statistics for a connector.
///
/// All counters are monotonically increasing for the lifetime of the
/// [`MetricsWrapper`] that owns them, until [`MetricsWrapper::reset_stats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WrapperStats {
    /// Number of `get` and `exists` operations performed.
    pub get_count: u64,
    /// Number of `get_all` operations performed.
    pub get_all_count: u64,
    /// Number of entities submitted through `insert` and `insert_many`.
    pub insert_count: u64,
    /// Number of `update` operations performed.
    pub update_count: u64,
    /// Number of `delete` operations performed.
    pub delete_count: u64,
    /// Operations that returned an error.
    pub error_count: u64,
    /// Entities returned by `get` and `get_all`.
    pub entities_read: u64,
    /// Cumulative wall-clock latency of all reads, in milliseconds.
    pub read_latency_sum_ms: f64,
    /// Cumulative wall-clock latency of all writes, in milliseconds.
    pub write_latency_sum_ms: f64,
}

/// A connector wrapper that collects operation metrics.
///
/// # Example
///
/// ```rust
/// use polyconn_storage::connectors::MemoryWrapper;
/// use polyconn_storage::entity::ConnectorEntity;
/// use polyconn_storage::metrics::MetricsWrapper;
/// use polyconn_storage::wrapper::ConnectorWrapper;
///
/// # tokio_test::block_on(async {
/// let metered = MetricsWrapper::new(MemoryWrapper::new());
///
/// let entity = ConnectorEntity::new("key", &"value", None).unwrap();
/// metered.insert(entity).await.unwrap();
/// metered.get("key").await.unwrap();
///
/// let stats = metered.stats().await;
/// assert_eq!(stats.insert_count, 1);
/// assert_eq!(stats.get_count, 1);
/// # });
/// ```
pub struct MetricsWrapper<W: ConnectorWrapper> {
    inner: W,
    stats: Arc<RwLock<WrapperStats>>,
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

impl<W: ConnectorWrapper> MetricsWrapper<W> {
    /// Wrap `inner` with metrics collection.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            stats: Arc::new(RwLock::new(WrapperStats::default())),
        }
    }

    /// Return a snapshot of the current statistics.
    pub async fn stats(&self) -> WrapperStats {
        self.stats.read().await.clone()
    }

    /// Reset all statistics to zero.
    pub async fn reset_stats(&self) {
        let mut s = self.stats.write().await;
        *s = WrapperStats::default();
    }

    /// Return a reference to the inner wrapper.
    pub fn inner(&self) -> &W {
        &self.inner
    }

    /// Apply `bump` and the outcome of one operation under a single lock.
    async fn record<R, F>(&self, start: Instant, result: &ConnectorResult<R>, read: bool, bump: F)
    where
        F: FnOnce(&mut WrapperStats),
    {
        let elapsed = elapsed_ms(start);
        let mut s = self.stats.write().await;
        bump(&mut s);
        if read {
            s.read_latency_sum_ms += elapsed;
        } else {
            s.write_latency_sum_ms += elapsed;
        }
        if result.is_err() {
            s.error_count += 1;
        }
    }
}

impl<W: ConnectorWrapper> std::fmt::Debug for MetricsWrapper<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsWrapper")
            .field("inner", &self.inner.name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<W: ConnectorWrapper> ConnectorWrapper for MetricsWrapper<W> {
    async fn get(&self, key: &str) -> ConnectorResult<Option<ConnectorEntity>> {
        let start = Instant::now();
        let result = self.inner.get(key).await;
        let found = u64::from(matches!(result, Ok(Some(_))));
        self.record(start, &result, true, |s| {
            s.get_count += 1;
            s.entities_read += found;
        })
        .await;
        result
    }

    async fn get_all(&self) -> ConnectorResult<Vec<ConnectorEntity>> {
        let start = Instant::now();
        let result = self.inner.get_all().await;
        let found = result.as_ref().map_or(0, |all| all.len() as u64);
        self.record(start, &result, true, |s| {
            s.get_all_count += 1;
            s.entities_read += found;
        })
        .await;
        result
    }

    async fn insert(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        let start = Instant::now();
        let result = self.inner.insert(entity).await;
        self.record(start, &result, false, |s| s.insert_count += 1).await;
        result
    }

    async fn insert_many(&self, entities: Vec<ConnectorEntity>) -> ConnectorResult<bool> {
        let count = entities.len() as u64;
        let start = Instant::now();
        let result = self.inner.insert_many(entities).await;
        self.record(start, &result, false, |s| s.insert_count += count).await;
        result
    }

    async fn update(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        let start = Instant::now();
        let result = self.inner.update(entity).await;
        self.record(start, &result, false, |s| s.update_count += 1).await;
        result
    }

    async fn delete(&self, key: &str) -> ConnectorResult<bool> {
        let start = Instant::now();
        let result = self.inner.delete(key).await;
        self.record(start, &result, false, |s| s.delete_count += 1).await;
        result
    }

    async fn exists(&self, key: &str) -> ConnectorResult<bool> {
        let start = Instant::now();
        let result = self.inner.exists(key).await;
        self.record(start, &result, true, |s| s.get_count += 1).await;
        result
    }

    fn supports_query(&self) -> bool {
        self.inner.supports_query()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
