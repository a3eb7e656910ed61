// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// LiteDb connector: single-file embedded document store on redb.
//
// redb (pure Rust, B-tree, ACID, single-file database) stands in for the
// embedded LiteDb engine. The connection string is the file path and the
// collection name is the redb table; each record is the JSON envelope keyed
// by entity key.
//
// # Design
//
// - The `Database` is opened on first use; parent directories are created.
// - Read transactions for get / get_all / exists.
// - Write transactions for insert / insert_many / update / delete. Update
//   checks for the key and writes inside one transaction, so it cannot
//   race with another writer.
// - redb is synchronous; every call runs on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableError};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::codec;
use crate::config::{ConnectorKind, LiteDbConfig};
use crate::entity::{ConnectorEntity, StoredEntity};
use crate::error::{ConnectorError, ConnectorResult};
use crate::wrapper::ConnectorWrapper;

const KIND: ConnectorKind = ConnectorKind::LiteDb;

fn driver_err(context: &str, err: impl std::fmt::Display) -> ConnectorError {
    ConnectorError::driver(KIND, format!("{context}: {err}"))
}

fn join_err(err: tokio::task::JoinError) -> ConnectorError {
    ConnectorError::driver(KIND, err)
}

/// Lazily opened redb database file.
pub struct LiteDbAccess {
    path: PathBuf,
    db: OnceCell<Arc<Database>>,
}

impl LiteDbAccess {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            db: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_connected(&self) -> bool {
        self.db.initialized()
    }

    /// The database handle, opening the file on first call.
    pub async fn database(&self) -> ConnectorResult<Arc<Database>> {
        let db = self
            .db
            .get_or_try_init(|| async {
                let path = self.path.clone();
                tokio::task::spawn_blocking(move || -> ConnectorResult<Arc<Database>> {
                    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                        std::fs::create_dir_all(parent)?;
                    }
                    let db = Database::create(&path).map_err(|e| {
                        driver_err(&format!("failed to open {}", path.display()), e)
                    })?;
                    debug!(path = %path.display(), "opened litedb file");
                    Ok(Arc::new(db))
                })
                .await
                .map_err(join_err)?
            })
            .await?;
        Ok(Arc::clone(db))
    }
}

impl std::fmt::Debug for LiteDbAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiteDbAccess")
            .field("path", &self.path)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// LiteDb wrapper: one redb table per collection.
///
/// # Example
///
/// ```rust,no_run
/// use polyconn_storage::config::LiteDbConfig;
/// use polyconn_storage::connectors::litedb::LiteDbWrapper;
/// use polyconn_storage::entity::ConnectorEntity;
/// use polyconn_storage::wrapper::ConnectorWrapper;
///
/// # tokio_test::block_on(async {
/// let store = LiteDbWrapper::new(&LiteDbConfig::new("/tmp/polyconn.db"));
/// store.insert(ConnectorEntity::new("hello", &"world", None).unwrap()).await.unwrap();
/// assert!(store.exists("hello").await.unwrap());
/// # });
/// ```
#[derive(Debug)]
pub struct LiteDbWrapper {
    access: LiteDbAccess,
    table: String,
}

impl LiteDbWrapper {
    pub fn new(config: &LiteDbConfig) -> Self {
        Self {
            access: LiteDbAccess::new(&config.connection_string),
            table: config.collection_name.clone(),
        }
    }

    pub fn access(&self) -> &LiteDbAccess {
        &self.access
    }

    async fn with_table<R, F>(&self, op: F) -> ConnectorResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&Database, TableDefinition<'_, &'static str, &'static [u8]>) -> ConnectorResult<R>
            + Send
            + 'static,
    {
        let db = self.access.database().await?;
        let table = self.table.clone();
        tokio::task::spawn_blocking(move || op(&db, TableDefinition::new(&table)))
            .await
            .map_err(join_err)?
    }
}

fn decode_live(bytes: &[u8]) -> ConnectorResult<Option<StoredEntity>> {
    Ok(codec::decode(bytes)?.live())
}

#[async_trait]
impl ConnectorWrapper for LiteDbWrapper {
    async fn get(&self, key: &str) -> ConnectorResult<Option<ConnectorEntity>> {
        let key = key.to_string();
        let stored = self
            .with_table(move |db, def| {
                let txn = db.begin_read().map_err(|e| driver_err("read txn", e))?;
                let table = match txn.open_table(def) {
                    Ok(t) => t,
                    // Nothing has been written to this collection yet.
                    Err(TableError::TableDoesNotExist(_)) => return Ok(None),
                    Err(e) => return Err(driver_err("open table", e)),
                };
                let stored = match table.get(key.as_str()).map_err(|e| driver_err("get", e))? {
                    Some(value) => decode_live(value.value())?,
                    None => None,
                };
                Ok(stored)
            })
            .await?;
        Ok(stored.map(ConnectorEntity::from_stored))
    }

    async fn get_all(&self) -> ConnectorResult<Vec<ConnectorEntity>> {
        let stored = self
            .with_table(|db, def| {
                let txn = db.begin_read().map_err(|e| driver_err("read txn", e))?;
                let table = match txn.open_table(def) {
                    Ok(t) => t,
                    Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
                    Err(e) => return Err(driver_err("open table", e)),
                };
                let mut results = Vec::new();
                for entry in table.iter().map_err(|e| driver_err("iter", e))? {
                    let (_, value) = entry.map_err(|e| driver_err("scan entry", e))?;
                    if let Some(stored) = decode_live(value.value())? {
                        results.push(stored);
                    }
                }
                Ok(results)
            })
            .await?;
        Ok(stored.into_iter().map(ConnectorEntity::from_stored).collect())
    }

    async fn insert(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        self.insert_many(vec![entity]).await
    }

    async fn insert_many(&self, entities: Vec<ConnectorEntity>) -> ConnectorResult<bool> {
        let owned = entities
            .iter()
            .map(|e| Ok((e.key().to_string(), codec::encode(&e.to_stored())?)))
            .collect::<ConnectorResult<Vec<(String, Vec<u8>)>>>()?;

        self.with_table(move |db, def| {
            let txn = db.begin_write().map_err(|e| driver_err("write txn", e))?;
            {
                let mut table = txn.open_table(def).map_err(|e| driver_err("open table", e))?;
                for (key, bytes) in &owned {
                    table
                        .insert(key.as_str(), bytes.as_slice())
                        .map_err(|e| driver_err("insert", e))?;
                }
            }
            txn.commit().map_err(|e| driver_err("commit", e))?;
            Ok(true)
        })
        .await
    }

    async fn update(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        let key = entity.key().to_string();
        let bytes = codec::encode(&entity.to_stored())?;

        self.with_table(move |db, def| {
            let txn = db.begin_write().map_err(|e| driver_err("write txn", e))?;
            let replaced;
            {
                let mut table = txn.open_table(def).map_err(|e| driver_err("open table", e))?;
                let live = match table.get(key.as_str()).map_err(|e| driver_err("get", e))? {
                    Some(current) => decode_live(current.value())?.is_some(),
                    None => false,
                };
                if live {
                    table
                        .insert(key.as_str(), bytes.as_slice())
                        .map_err(|e| driver_err("insert", e))?;
                }
                replaced = live;
            }
            if replaced {
                txn.commit().map_err(|e| driver_err("commit", e))?;
            } else {
                txn.abort().map_err(|e| driver_err("abort", e))?;
            }
            Ok(replaced)
        })
        .await
    }

    async fn delete(&self, key: &str) -> ConnectorResult<bool> {
        let key = key.to_string();
        self.with_table(move |db, def| {
            let txn = db.begin_write().map_err(|e| driver_err("write txn", e))?;
            let removed: Option<Vec<u8>>;
            {
                let mut table = txn.open_table(def).map_err(|e| driver_err("open table", e))?;
                removed = table
                    .remove(key.as_str())
                    .map_err(|e| driver_err("remove", e))?
                    .map(|guard| guard.value().to_vec());
            }
            txn.commit().map_err(|e| driver_err("commit", e))?;
            match removed {
                Some(bytes) => Ok(decode_live(&bytes)?.is_some()),
                None => Ok(false),
            }
        })
        .await
    }

    fn is_connected(&self) -> bool {
        self.access.is_connected()
    }

    fn name(&self) -> &'static str {
        KIND.as_str()
    }
}
