// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Memcached connector.
//
// Values are the JSON envelope text. Expirations become native exptimes in
// whole seconds. Memcached cannot enumerate its keys, so get_all is not
// offered. The memcache client is synchronous and runs on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use memcache::{Client, CommandError, MemcacheError};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::codec;
use crate::config::{ConnectorKind, MemcachedConfig};
use crate::entity::ConnectorEntity;
use crate::error::{ConnectorError, ConnectorResult};
use crate::wrapper::ConnectorWrapper;

const KIND: ConnectorKind = ConnectorKind::Memcached;

/// Relative exptimes above this many seconds are read by the server as
/// absolute unix timestamps.
const MAX_RELATIVE_EXPTIME: u64 = 60 * 60 * 24 * 30;

fn driver_err(err: MemcacheError) -> ConnectorError {
    ConnectorError::driver(KIND, err)
}

fn join_err(err: tokio::task::JoinError) -> ConnectorError {
    ConnectorError::driver(KIND, err)
}

/// Result of a `replace`. Only "not stored" and "not found" mean the key
/// is absent; every other command error is a driver failure.
pub fn replace_outcome(result: Result<(), MemcacheError>) -> ConnectorResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(MemcacheError::CommandError(CommandError::KeyNotFound)) => Ok(false),
        Err(e) => Err(driver_err(e)),
    }
}

/// Server URLs for a connection string: `host:port[,host:port...]`, each
/// prefixed with `memcache://` unless a scheme is already present.
pub fn server_urls(connection_string: &str) -> Vec<String> {
    connection_string
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.contains("://") {
                s.to_string()
            } else {
                format!("memcache://{s}")
            }
        })
        .collect()
}

/// Native exptime for an optional expiration. Zero means never.
pub fn exptime(expiration: Option<Duration>, now_unix: u64) -> u32 {
    let Some(ttl) = expiration else {
        return 0;
    };
    let mut secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs += 1;
    }
    let secs = secs.max(1);
    let value = if secs > MAX_RELATIVE_EXPTIME {
        now_unix.saturating_add(secs)
    } else {
        secs
    };
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

/// Lazily connected memcache client pool.
pub struct MemcachedAccess {
    urls: Vec<String>,
    client: OnceCell<Arc<Client>>,
}

impl MemcachedAccess {
    pub fn new(config: &MemcachedConfig) -> Self {
        Self {
            urls: server_urls(&config.connection_string),
            client: OnceCell::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.initialized()
    }

    pub async fn client(&self) -> ConnectorResult<Arc<Client>> {
        let client = self
            .client
            .get_or_try_init(|| async {
                if self.urls.is_empty() {
                    return Err(ConnectorError::Config(
                        "Memcached connectionstring names no servers".into(),
                    ));
                }
                let urls = self.urls.clone();
                tokio::task::spawn_blocking(move || -> ConnectorResult<Arc<Client>> {
                    let client = Client::connect(urls.clone()).map_err(driver_err)?;
                    debug!(servers = ?urls, "connected to memcached");
                    Ok(Arc::new(client))
                })
                .await
                .map_err(join_err)?
            })
            .await?;
        Ok(Arc::clone(client))
    }

    /// Run a blocking client call on the blocking pool.
    async fn call<R, F>(&self, op: F) -> ConnectorResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&Client) -> ConnectorResult<R> + Send + 'static,
    {
        let client = self.client().await?;
        tokio::task::spawn_blocking(move || op(&client))
            .await
            .map_err(join_err)?
    }
}

impl std::fmt::Debug for MemcachedAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemcachedAccess")
            .field("servers", &self.urls)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Memcached wrapper.
#[derive(Debug)]
pub struct MemcachedWrapper {
    access: MemcachedAccess,
}

impl MemcachedWrapper {
    pub fn new(config: &MemcachedConfig) -> Self {
        Self {
            access: MemcachedAccess::new(config),
        }
    }

    pub fn access(&self) -> &MemcachedAccess {
        &self.access
    }
}

#[async_trait]
impl ConnectorWrapper for MemcachedWrapper {
    async fn get(&self, key: &str) -> ConnectorResult<Option<ConnectorEntity>> {
        let key = key.to_string();
        let raw: Option<String> = self
            .access
            .call(move |client| client.get(&key).map_err(driver_err))
            .await?;
        match raw {
            Some(text) => Ok(codec::decode_str(&text)?
                .live()
                .map(ConnectorEntity::from_stored)),
            None => Ok(None),
        }
    }

    async fn get_all(&self) -> ConnectorResult<Vec<ConnectorEntity>> {
        Err(ConnectorError::unsupported(KIND.as_str(), "get_all"))
    }

    async fn insert(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        self.insert_many(vec![entity]).await
    }

    async fn insert_many(&self, entities: Vec<ConnectorEntity>) -> ConnectorResult<bool> {
        let records = entities
            .iter()
            .map(|e| {
                let text = codec::encode_string(&e.to_stored())?;
                Ok((e.key().to_string(), text, e.expiration()))
            })
            .collect::<ConnectorResult<Vec<_>>>()?;

        self.access
            .call(move |client| {
                let now = unix_now();
                for (key, text, expiration) in &records {
                    client
                        .set(key, text.as_str(), exptime(*expiration, now))
                        .map_err(driver_err)?;
                }
                Ok(true)
            })
            .await
    }

    async fn update(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        let key = entity.key().to_string();
        let text = codec::encode_string(&entity.to_stored())?;
        let expires = exptime(entity.expiration(), unix_now());

        self.access
            .call(move |client| {
                let outcome = replace_outcome(client.replace(&key, text.as_str(), expires));
                if matches!(outcome, Ok(false)) {
                    debug!(key = %key, "memcached replace not stored");
                }
                outcome
            })
            .await
    }

    async fn delete(&self, key: &str) -> ConnectorResult<bool> {
        let key = key.to_string();
        self.access
            .call(move |client| client.delete(&key).map_err(driver_err))
            .await
    }

    fn is_connected(&self) -> bool {
        self.access.is_connected()
    }

    fn name(&self) -> &'static str {
        KIND.as_str()
    }
}
