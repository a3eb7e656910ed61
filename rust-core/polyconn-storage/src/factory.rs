// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Backend selection.
//
// The configured instance is matched exactly once, here. Everything above
// the factory works against `Arc<dyn ConnectorWrapper>`.

use std::sync::Arc;

use tracing::debug;

use crate::config::{ConfigSection, ConnectorConfig, ConnectorKind};
use crate::error::{ConnectorError, ConnectorResult};
use crate::operations::ConnectorOperations;
use crate::wrapper::ConnectorWrapper;

#[cfg(feature = "arangodb")]
use crate::connectors::ArangoDbWrapper;
#[cfg(feature = "couchbase")]
use crate::connectors::CouchbaseWrapper;
#[cfg(feature = "dynamodb")]
use crate::connectors::DynamoDbWrapper;
#[cfg(feature = "litedb")]
use crate::connectors::LiteDbWrapper;
#[cfg(feature = "memcached")]
use crate::connectors::MemcachedWrapper;
#[cfg(feature = "mongodb")]
use crate::connectors::MongoDbWrapper;
#[cfg(feature = "ravendb")]
use crate::connectors::RavenDbWrapper;
#[cfg(feature = "redis")]
use crate::connectors::RedisWrapper;

/// Builds the wrapper and operations adapter for a configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationsFactory;

#[allow(dead_code)]
fn disabled(kind: ConnectorKind) -> ConnectorError {
    ConnectorError::Config(format!(
        "the {kind} connector is not compiled in (enable the '{}' feature)",
        kind.as_str().to_ascii_lowercase()
    ))
}

impl OperationsFactory {
    /// The wrapper for `config`. No connection is opened.
    ///
    /// # Errors
    ///
    /// [`ConnectorError::Config`] for invalid connection settings or a
    /// backend whose cargo feature is disabled.
    pub fn wrapper(config: &ConnectorConfig) -> ConnectorResult<Arc<dyn ConnectorWrapper>> {
        debug!(instance = %config.kind(), "building connector wrapper");
        let wrapper: Arc<dyn ConnectorWrapper> = match config {
            #[cfg(feature = "redis")]
            ConnectorConfig::Redis(c) => Arc::new(RedisWrapper::new(c)?),
            #[cfg(feature = "mongodb")]
            ConnectorConfig::MongoDb(c) => Arc::new(MongoDbWrapper::new(c)),
            #[cfg(feature = "litedb")]
            ConnectorConfig::LiteDb(c) => Arc::new(LiteDbWrapper::new(c)),
            #[cfg(feature = "memcached")]
            ConnectorConfig::Memcached(c) => Arc::new(MemcachedWrapper::new(c)),
            #[cfg(feature = "ravendb")]
            ConnectorConfig::RavenDb(c) => Arc::new(RavenDbWrapper::new(c)?),
            #[cfg(feature = "couchbase")]
            ConnectorConfig::Couchbase(c) => Arc::new(CouchbaseWrapper::new(c)?),
            #[cfg(feature = "dynamodb")]
            ConnectorConfig::DynamoDb(c) => Arc::new(DynamoDbWrapper::new(c)),
            #[cfg(feature = "arangodb")]
            ConnectorConfig::ArangoDb(c) => Arc::new(ArangoDbWrapper::new(c)?),
            #[allow(unreachable_patterns)]
            other => return Err(disabled(other.kind())),
        };
        Ok(wrapper)
    }

    /// Typed operations for `config`.
    pub fn operations<T>(config: &ConnectorConfig) -> ConnectorResult<ConnectorOperations<T>> {
        Ok(ConnectorOperations::new(Self::wrapper(config)?))
    }

    /// Parse `section` and build typed operations for the instance it names.
    pub fn from_section<T>(section: &ConfigSection) -> ConnectorResult<ConnectorOperations<T>> {
        let config = ConnectorConfig::from_section(section)?;
        Self::operations(&config)
    }
}
