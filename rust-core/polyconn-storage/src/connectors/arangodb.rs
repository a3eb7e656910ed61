// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ArangoDB connector over the HTTP API.
//
// Entity key = document `_key`, so keys must satisfy ArangoDB's key rules.
// The collection is created on first use. Update runs a single AQL
// REPLACE filtered on liveness; the other operations use the document API.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::codec;
use crate::config::{ArangoDbConfig, ConnectorKind};
use crate::connectors::http::{is_not_found, Auth, RestTransport};
use crate::entity::{deadline_now, ConnectorEntity};
use crate::error::ConnectorResult;
use crate::wrapper::ConnectorWrapper;

const KIND: ConnectorKind = ConnectorKind::ArangoDb;

/// Documents per cursor batch.
pub const BATCH_SIZE: usize = 1000;

const LIVE_DOCUMENTS: &str =
    "FOR d IN @@collection FILTER d.ExpiresAt == null OR d.ExpiresAt > @now RETURN d";

const REPLACE_LIVE: &str = "FOR d IN @@collection \
     FILTER d._key == @key AND (d.ExpiresAt == null OR d.ExpiresAt > @now) \
     REPLACE d WITH @doc IN @@collection RETURN 1";

#[derive(Debug, Deserialize)]
struct Cursor {
    #[serde(default)]
    result: Vec<Value>,
    #[serde(rename = "hasMore", default)]
    has_more: bool,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Removed {
    #[serde(default)]
    old: Option<Value>,
}

/// ArangoDB wrapper.
#[derive(Debug)]
pub struct ArangoDbWrapper {
    transport: RestTransport,
    database: String,
    collection: String,
    collection_ready: OnceCell<()>,
}

impl ArangoDbWrapper {
    pub fn new(config: &ArangoDbConfig) -> ConnectorResult<Self> {
        let auth = Auth::from_parts(config.username.as_deref(), config.password.as_deref());
        Ok(Self {
            transport: RestTransport::new(KIND, &config.connection_string, auth)?,
            database: config.database_name.clone(),
            collection: config.collection_name.clone(),
            collection_ready: OnceCell::new(),
        })
    }

    pub fn transport(&self) -> &RestTransport {
        &self.transport
    }

    /// The stored document: the envelope plus `_key`.
    pub fn document(entity: &ConnectorEntity) -> ConnectorResult<Value> {
        let mut doc = codec::encode_value(&entity.to_stored())?;
        if let Some(object) = doc.as_object_mut() {
            object.insert("_key".to_string(), Value::String(entity.key().to_string()));
        }
        Ok(doc)
    }

    fn api(&self, segments: &[&str]) -> ConnectorResult<reqwest::Url> {
        let mut all = vec!["_db", self.database.as_str(), "_api"];
        all.extend_from_slice(segments);
        self.transport.endpoint(&all)
    }

    /// Create the collection unless it already exists. Runs once.
    async fn ensure_collection(&self) -> ConnectorResult<()> {
        self.collection_ready
            .get_or_try_init(|| self.create_collection())
            .await?;
        Ok(())
    }

    async fn create_collection(&self) -> ConnectorResult<()> {
        let url = self.api(&["collection", &self.collection])?;
        let response = self
            .transport
            .send(self.transport.request(Method::GET, url).await?)
            .await?;
        if !is_not_found(&response) {
            return self.transport.expect_success(response).await;
        }

        debug!(collection = %self.collection, "creating arangodb collection");
        let url = self.api(&["collection"])?;
        let request = self
            .transport
            .request(Method::POST, url)
            .await?
            .json(&json!({ "name": self.collection }));
        let response = self.transport.send(request).await?;
        // Lost a creation race with another client.
        if response.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        self.transport.expect_success(response).await
    }

    async fn cursor(&self, query: &str, bind_vars: Value) -> ConnectorResult<Vec<Value>> {
        let url = self.api(&["cursor"])?;
        let request = self.transport.request(Method::POST, url).await?.json(&json!({
            "query": query,
            "bindVars": bind_vars,
            "batchSize": BATCH_SIZE,
        }));
        let mut page: Cursor = self
            .transport
            .json(self.transport.send(request).await?)
            .await?;
        let mut results = std::mem::take(&mut page.result);
        while page.has_more {
            let Some(id) = page.id.take() else {
                break;
            };
            let url = self.api(&["cursor", &id])?;
            let request = self.transport.request(Method::PUT, url).await?;
            page = self
                .transport
                .json(self.transport.send(request).await?)
                .await?;
            results.append(&mut page.result);
            if page.id.is_none() {
                page.id = Some(id);
            }
        }
        Ok(results)
    }

    async fn save(&self, documents: Value) -> ConnectorResult<Value> {
        self.ensure_collection().await?;
        let url = self.api(&["document", &self.collection])?;
        let request = self
            .transport
            .request(Method::POST, url)
            .await?
            .query(&[("overwriteMode", "replace")])
            .json(&documents);
        self.transport
            .json(self.transport.send(request).await?)
            .await
    }
}

#[async_trait]
impl ConnectorWrapper for ArangoDbWrapper {
    async fn get(&self, key: &str) -> ConnectorResult<Option<ConnectorEntity>> {
        let url = self.api(&["document", &self.collection, key])?;
        let response = self
            .transport
            .send(self.transport.request(Method::GET, url).await?)
            .await?;
        if is_not_found(&response) {
            return Ok(None);
        }
        let doc: Value = self.transport.json(response).await?;
        Ok(codec::decode_value(doc)?
            .live()
            .map(ConnectorEntity::from_stored))
    }

    async fn get_all(&self) -> ConnectorResult<Vec<ConnectorEntity>> {
        self.ensure_collection().await?;
        let docs = self
            .cursor(
                LIVE_DOCUMENTS,
                json!({ "@collection": self.collection, "now": deadline_now() }),
            )
            .await?;
        let mut entities = Vec::with_capacity(docs.len());
        for doc in docs {
            if let Some(stored) = codec::decode_value(doc)?.live() {
                entities.push(ConnectorEntity::from_stored(stored));
            }
        }
        Ok(entities)
    }

    async fn insert(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        self.save(Self::document(&entity)?).await?;
        Ok(true)
    }

    async fn insert_many(&self, entities: Vec<ConnectorEntity>) -> ConnectorResult<bool> {
        if entities.is_empty() {
            return Ok(true);
        }
        let documents = entities
            .iter()
            .map(Self::document)
            .collect::<ConnectorResult<Vec<Value>>>()?;
        let results = self.save(Value::Array(documents)).await?;

        let failed: Vec<&Value> = results
            .as_array()
            .map(|items| items.iter().filter(|r| r["error"] == true).collect())
            .unwrap_or_default();
        if !failed.is_empty() {
            warn!(
                failed = failed.len(),
                first = %failed[0]["errorMessage"],
                "arangodb batch insert partially applied"
            );
            return Ok(false);
        }
        Ok(true)
    }

    async fn update(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        self.ensure_collection().await?;
        let replaced = self
            .cursor(
                REPLACE_LIVE,
                json!({
                    "@collection": self.collection,
                    "key": entity.key(),
                    "now": deadline_now(),
                    "doc": Self::document(&entity)?,
                }),
            )
            .await?;
        Ok(!replaced.is_empty())
    }

    async fn delete(&self, key: &str) -> ConnectorResult<bool> {
        let url = self.api(&["document", &self.collection, key])?;
        let request = self
            .transport
            .request(Method::DELETE, url)
            .await?
            .query(&[("returnOld", "true")]);
        let response = self.transport.send(request).await?;
        if is_not_found(&response) {
            return Ok(false);
        }
        let removed: Removed = self.transport.json(response).await?;
        match removed.old {
            Some(old) => Ok(!codec::decode_value(old)?.is_expired()),
            None => Ok(false),
        }
    }

    fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    fn name(&self) -> &'static str {
        KIND.as_str()
    }
}
