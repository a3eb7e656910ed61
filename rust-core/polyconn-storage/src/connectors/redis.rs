// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Redis connector.
//
// Each entity is one string key holding the JSON envelope. Expirations are
// applied natively with `PX` as well as through the envelope deadline.
// get_all walks the keyspace of the configured database with `SCAN` and
// fetches values with `MGET`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, ConnectionAddr, ConnectionInfo, IntoConnectionInfo};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::codec;
use crate::config::{ConnectorKind, RedisConfig};
use crate::entity::{duration_to_millis, ConnectorEntity};
use crate::error::{ConnectorError, ConnectorResult};
use crate::wrapper::ConnectorWrapper;

const KIND: ConnectorKind = ConnectorKind::Redis;
const SCAN_BATCH: usize = 500;

fn driver_err(err: redis::RedisError) -> ConnectorError {
    ConnectorError::driver(KIND, err)
}

/// Turn a configured connection string into connection info.
///
/// Accepts `redis://` / `rediss://` URLs and bare `host[:port]` strings.
/// StackExchange-style options after a comma (`localhost:6379,abortConnect=false`)
/// are dropped. The configured database number overrides any URL path.
pub fn connection_info(config: &RedisConfig) -> ConnectorResult<ConnectionInfo> {
    let raw = config
        .connection_string
        .split(',')
        .next()
        .unwrap_or_default()
        .trim();
    let url = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("redis://{raw}")
    };
    let mut info = url
        .as_str()
        .into_connection_info()
        .map_err(|e| ConnectorError::Config(format!("invalid Redis connection string: {e}")))?;
    if config.database_number != 0 {
        info.redis.db = config.database_number;
    }
    Ok(info)
}

/// Lazily connected Redis connection manager.
pub struct RedisAccess {
    info: ConnectionInfo,
    manager: OnceCell<ConnectionManager>,
}

impl RedisAccess {
    pub fn new(config: &RedisConfig) -> ConnectorResult<Self> {
        Ok(Self {
            info: connection_info(config)?,
            manager: OnceCell::new(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.manager.initialized()
    }

    /// A clone of the shared connection manager, connecting on first call.
    pub async fn connection(&self) -> ConnectorResult<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                let client = Client::open(self.info.clone()).map_err(driver_err)?;
                let manager = ConnectionManager::new(client).await.map_err(driver_err)?;
                debug!(db = self.info.redis.db, "connected to redis");
                Ok::<_, ConnectorError>(manager)
            })
            .await?;
        Ok(manager.clone())
    }
}

impl std::fmt::Debug for RedisAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let addr = match &self.info.addr {
            ConnectionAddr::Tcp(host, port) | ConnectionAddr::TcpTls { host, port, .. } => {
                format!("{host}:{port}")
            }
            other => format!("{other:?}"),
        };
        f.debug_struct("RedisAccess")
            .field("addr", &addr)
            .field("db", &self.info.redis.db)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Redis wrapper.
#[derive(Debug)]
pub struct RedisWrapper {
    access: RedisAccess,
}

impl RedisWrapper {
    pub fn new(config: &RedisConfig) -> ConnectorResult<Self> {
        Ok(Self {
            access: RedisAccess::new(config)?,
        })
    }

    pub fn access(&self) -> &RedisAccess {
        &self.access
    }
}

/// `SET key value [PX ms] [XX]`.
fn set_command(entity: &ConnectorEntity, only_existing: bool) -> ConnectorResult<redis::Cmd> {
    let value = codec::encode_string(&entity.to_stored())?;
    let mut cmd = redis::cmd("SET");
    cmd.arg(entity.key()).arg(value);
    if let Some(ttl) = entity.expiration() {
        cmd.arg("PX").arg(duration_to_millis(ttl).max(1));
    }
    if only_existing {
        cmd.arg("XX");
    }
    Ok(cmd)
}

fn decode_reply(raw: Option<String>) -> ConnectorResult<Option<ConnectorEntity>> {
    match raw {
        Some(text) => Ok(codec::decode_str(&text)?
            .live()
            .map(ConnectorEntity::from_stored)),
        None => Ok(None),
    }
}

#[async_trait]
impl ConnectorWrapper for RedisWrapper {
    async fn get(&self, key: &str) -> ConnectorResult<Option<ConnectorEntity>> {
        let mut conn = self.access.connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(driver_err)?;
        decode_reply(raw)
    }

    async fn get_all(&self) -> ConnectorResult<Vec<ConnectorEntity>> {
        let mut conn = self.access.connection().await?;
        let mut cursor: u64 = 0;
        let mut keys: Vec<String> = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(driver_err)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();

        let mut entities = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(SCAN_BATCH) {
            let values: Vec<Option<String>> = redis::cmd("MGET")
                .arg(chunk)
                .query_async(&mut conn)
                .await
                .map_err(driver_err)?;
            for raw in values {
                if let Some(entity) = decode_reply(raw)? {
                    entities.push(entity);
                }
            }
        }
        Ok(entities)
    }

    async fn insert(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        let mut conn = self.access.connection().await?;
        let reply: Option<String> = set_command(&entity, false)?
            .query_async(&mut conn)
            .await
            .map_err(driver_err)?;
        Ok(reply.is_some())
    }

    async fn insert_many(&self, entities: Vec<ConnectorEntity>) -> ConnectorResult<bool> {
        if entities.is_empty() {
            return Ok(true);
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for entity in &entities {
            pipe.add_command(set_command(entity, false)?);
        }

        let mut conn = self.access.connection().await?;
        let replies: Vec<Option<String>> = pipe.query_async(&mut conn).await.map_err(driver_err)?;
        let stored = replies.iter().filter(|r| r.is_some()).count();
        if stored != entities.len() {
            warn!(stored, expected = entities.len(), "redis batch partially applied");
        }
        Ok(stored == entities.len())
    }

    async fn update(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        let mut conn = self.access.connection().await?;
        // XX answers nil when the key is absent.
        let reply: Option<String> = set_command(&entity, true)?
            .query_async(&mut conn)
            .await
            .map_err(driver_err)?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> ConnectorResult<bool> {
        let mut conn = self.access.connection().await?;
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(driver_err)?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> ConnectorResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    fn supports_query(&self) -> bool {
        true
    }

    fn is_connected(&self) -> bool {
        self.access.is_connected()
    }

    fn name(&self) -> &'static str {
        KIND.as_str()
    }
}
