// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// MongoDB connector.
//
// Entities are stored as `{Key, Payload, Expiration?, ExpiresAt?}` documents
// in one collection, matched on `Key`. The driver-generated `_id` is ignored
// on read.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::{Client, Collection};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::{ConnectorKind, MongoDbConfig};
use crate::entity::{deadline_now, ConnectorEntity, StoredEntity};
use crate::error::{ConnectorError, ConnectorResult};
use crate::wrapper::ConnectorWrapper;

const KIND: ConnectorKind = ConnectorKind::MongoDb;

fn driver_err(err: mongodb::error::Error) -> ConnectorError {
    ConnectorError::driver(KIND, err)
}

fn key_filter(key: &str) -> Document {
    doc! { "Key": key }
}

/// Matches `key` only while its deadline is in the future.
fn live_filter(key: &str, now: &str) -> Document {
    doc! {
        "Key": key,
        "$or": [
            { "ExpiresAt": { "$exists": false } },
            { "ExpiresAt": { "$gt": now } },
        ],
    }
}

/// Lazily connected client and typed collection handle.
pub struct MongoDbAccess {
    config: MongoDbConfig,
    collection: OnceCell<Collection<StoredEntity>>,
}

impl MongoDbAccess {
    pub fn new(config: &MongoDbConfig) -> Self {
        Self {
            config: config.clone(),
            collection: OnceCell::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.collection.initialized()
    }

    pub async fn collection(&self) -> ConnectorResult<&Collection<StoredEntity>> {
        self.collection
            .get_or_try_init(|| async {
                let client = Client::with_uri_str(&self.config.connection_string)
                    .await
                    .map_err(driver_err)?;
                debug!(
                    database = %self.config.database_name,
                    collection = %self.config.collection_name,
                    "created mongodb client"
                );
                Ok::<_, ConnectorError>(
                    client
                        .database(&self.config.database_name)
                        .collection::<StoredEntity>(&self.config.collection_name),
                )
            })
            .await
    }
}

impl std::fmt::Debug for MongoDbAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoDbAccess")
            .field("database", &self.config.database_name)
            .field("collection", &self.config.collection_name)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// MongoDB wrapper.
#[derive(Debug)]
pub struct MongoDbWrapper {
    access: MongoDbAccess,
}

impl MongoDbWrapper {
    pub fn new(config: &MongoDbConfig) -> Self {
        Self {
            access: MongoDbAccess::new(config),
        }
    }

    pub fn access(&self) -> &MongoDbAccess {
        &self.access
    }

    async fn upsert(&self, entity: &ConnectorEntity) -> ConnectorResult<bool> {
        let collection = self.access.collection().await?;
        let result = collection
            .replace_one(key_filter(entity.key()), entity.to_stored())
            .upsert(true)
            .await
            .map_err(driver_err)?;
        Ok(result.matched_count > 0 || result.upserted_id.is_some())
    }
}

#[async_trait]
impl ConnectorWrapper for MongoDbWrapper {
    async fn get(&self, key: &str) -> ConnectorResult<Option<ConnectorEntity>> {
        let collection = self.access.collection().await?;
        let found = collection
            .find_one(key_filter(key))
            .await
            .map_err(driver_err)?;
        Ok(found
            .and_then(StoredEntity::live)
            .map(ConnectorEntity::from_stored))
    }

    async fn get_all(&self) -> ConnectorResult<Vec<ConnectorEntity>> {
        let collection = self.access.collection().await?;
        let cursor = collection.find(doc! {}).await.map_err(driver_err)?;
        let stored: Vec<StoredEntity> = cursor.try_collect().await.map_err(driver_err)?;
        Ok(stored
            .into_iter()
            .filter_map(StoredEntity::live)
            .map(ConnectorEntity::from_stored)
            .collect())
    }

    async fn insert(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        self.upsert(&entity).await
    }

    async fn insert_many(&self, entities: Vec<ConnectorEntity>) -> ConnectorResult<bool> {
        let mut all = true;
        for entity in &entities {
            if !self.upsert(entity).await? {
                warn!(key = entity.key(), "mongodb upsert reported no write");
                all = false;
            }
        }
        Ok(all)
    }

    async fn update(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        let collection = self.access.collection().await?;
        let result = collection
            .replace_one(live_filter(entity.key(), &deadline_now()), entity.to_stored())
            .await
            .map_err(driver_err)?;
        Ok(result.matched_count > 0)
    }

    async fn delete(&self, key: &str) -> ConnectorResult<bool> {
        let collection = self.access.collection().await?;
        let removed = collection
            .find_one_and_delete(key_filter(key))
            .await
            .map_err(driver_err)?;
        Ok(removed.is_some_and(|stored| !stored.is_expired()))
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
