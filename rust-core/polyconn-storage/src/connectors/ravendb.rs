// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// RavenDB connector over the REST API.
//
// Document id = entity key. Documents carry `@metadata.@collection` so
// get_all can page through the configured collection, and `@expires` so
// the server's expiration feature (when enabled) removes them.
//
// Update and delete read the document first and then write; another client
// can slip in between the two requests.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::codec;
use crate::config::{ConnectorKind, RavenDbConfig};
use crate::connectors::http::{is_not_found, Auth, RestTransport};
use crate::entity::{format_deadline, ConnectorEntity};
use crate::error::ConnectorResult;
use crate::wrapper::ConnectorWrapper;

const KIND: ConnectorKind = ConnectorKind::RavenDb;

/// Documents fetched per collection page.
pub const PAGE_SIZE: usize = 1024;

#[derive(Debug, Deserialize)]
struct Results {
    #[serde(rename = "Results", default)]
    results: Vec<Value>,
}

/// RavenDB wrapper.
#[derive(Debug)]
pub struct RavenDbWrapper {
    transport: RestTransport,
    database: String,
    collection: String,
}

impl RavenDbWrapper {
    pub fn new(config: &RavenDbConfig) -> ConnectorResult<Self> {
        Ok(Self {
            transport: RestTransport::new(KIND, &config.connection_string, Auth::None)?,
            database: config.database_name.clone(),
            collection: config.collection_name.clone(),
        })
    }

    pub fn transport(&self) -> &RestTransport {
        &self.transport
    }

    /// The document body for `entity`: the envelope plus metadata.
    pub fn document(&self, entity: &ConnectorEntity) -> ConnectorResult<Value> {
        let mut doc = codec::encode_value(&entity.to_stored())?;
        let mut metadata = json!({ "@collection": self.collection });
        if let Some(deadline) = entity.expires_at() {
            metadata["@expires"] = Value::String(format_deadline(deadline));
        }
        if let Some(object) = doc.as_object_mut() {
            object.insert("@metadata".to_string(), metadata);
        }
        Ok(doc)
    }

    async fn put(&self, entity: &ConnectorEntity) -> ConnectorResult<bool> {
        let url = self.transport.endpoint(&["databases", &self.database, "docs"])?;
        let body = self.document(entity)?;
        let request = self
            .transport
            .request(Method::PUT, url)
            .await?
            .query(&[("id", entity.key())])
            .json(&body);
        let response = self.transport.send(request).await?;
        self.transport.expect_success(response).await?;
        Ok(true)
    }
}

fn live_entities(results: Vec<Value>) -> ConnectorResult<Vec<ConnectorEntity>> {
    let mut entities = Vec::with_capacity(results.len());
    for doc in results {
        if let Some(stored) = codec::decode_value(doc)?.live() {
            entities.push(ConnectorEntity::from_stored(stored));
        }
    }
    Ok(entities)
}

#[async_trait]
impl ConnectorWrapper for RavenDbWrapper {
    async fn get(&self, key: &str) -> ConnectorResult<Option<ConnectorEntity>> {
        let url = self.transport.endpoint(&["databases", &self.database, "docs"])?;
        let request = self
            .transport
            .request(Method::GET, url)
            .await?
            .query(&[("id", key)]);
        let response = self.transport.send(request).await?;
        if is_not_found(&response) {
            return Ok(None);
        }
        let body: Results = self.transport.json(response).await?;
        Ok(live_entities(body.results)?.into_iter().next())
    }

    async fn get_all(&self) -> ConnectorResult<Vec<ConnectorEntity>> {
        let url = self
            .transport
            .endpoint(&["databases", &self.database, "collections", "docs"])?;
        let mut entities = Vec::new();
        let mut start = 0usize;
        loop {
            let request = self
                .transport
                .request(Method::GET, url.clone())
                .await?
                .query(&[("name", self.collection.as_str())])
                .query(&[("start", start), ("pageSize", PAGE_SIZE)]);
            let response = self.transport.send(request).await?;
            if is_not_found(&response) {
                break;
            }
            let page: Results = self.transport.json(response).await?;
            let fetched = page.results.len();
            entities.extend(live_entities(page.results)?);
            if fetched < PAGE_SIZE {
                break;
            }
            start += fetched;
        }
        Ok(entities)
    }

    async fn insert(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        self.put(&entity).await
    }

    async fn insert_many(&self, entities: Vec<ConnectorEntity>) -> ConnectorResult<bool> {
        if entities.is_empty() {
            return Ok(true);
        }
        let commands = entities
            .iter()
            .map(|entity| {
                Ok(json!({
                    "Id": entity.key(),
                    "ChangeVector": null,
                    "Type": "PUT",
                    "Document": self.document(entity)?,
                }))
            })
            .collect::<ConnectorResult<Vec<Value>>>()?;

        let url = self
            .transport
            .endpoint(&["databases", &self.database, "bulk_docs"])?;
        let request = self
            .transport
            .request(Method::POST, url)
            .await?
            .json(&json!({ "Commands": commands }));
        let response = self.transport.send(request).await?;
        let body: Results = self.transport.json(response).await?;
        if body.results.len() != entities.len() {
            warn!(
                stored = body.results.len(),
                expected = entities.len(),
                "ravendb bulk_docs partially applied"
            );
            return Ok(false);
        }
        Ok(true)
    }

    async fn update(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        if self.get(entity.key()).await?.is_none() {
            return Ok(false);
        }
        self.put(&entity).await
    }

    async fn delete(&self, key: &str) -> ConnectorResult<bool> {
        let live = self.get(key).await?.is_some();
        let url = self.transport.endpoint(&["databases", &self.database, "docs"])?;
        let request = self
            .transport
            .request(Method::DELETE, url)
            .await?
            .query(&[("id", key)]);
        let response = self.transport.send(request).await?;
        if is_not_found(&response) {
            return Ok(false);
        }
        self.transport.expect_success(response).await?;
        Ok(live)
    }

    fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    fn name(&self) -> &'static str {
        KIND.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::DEFAULT_COLLECTION;

    fn wrapper(uri: &str) -> RavenDbWrapper {
        RavenDbWrapper::new(&RavenDbConfig {
            connection_string: uri.to_string(),
            database_name: "Demo".to_string(),
            collection_name: DEFAULT_COLLECTION.to_string(),
        })
        .unwrap()
    }

    fn raven_doc(key: &str, payload: Value) -> Value {
        json!({
            "Key": key,
            "Payload": payload,
            "@metadata": {"@collection": DEFAULT_COLLECTION, "@change-vector": "A:1"}
        })
    }

    #[test]
    fn test_document_metadata() {
        let w = wrapper("http://localhost:8080");
        let plain = ConnectorEntity::new("k", &1, None).unwrap();
        let doc = w.document(&plain).unwrap();
        assert_eq!(doc["@metadata"]["@collection"], DEFAULT_COLLECTION);
        assert!(doc["@metadata"].get("@expires").is_none());

        let expiring = ConnectorEntity::new("k", &1, Some(Duration::from_secs(60))).unwrap();
        let doc = w.document(&expiring).unwrap();
        assert_eq!(doc["@metadata"]["@expires"], doc["ExpiresAt"]);

        let stored = codec::decode_value(doc).unwrap();
        assert_eq!(stored.key, "k");
    }

    #[tokio::test]
    async fn test_get_found_and_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/databases/Demo/docs"))
            .and(query_param("id", "user:1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Results": [raven_doc("user:1", json!({"name": "Ada"}))],
                "Includes": {}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/databases/Demo/docs"))
            .and(query_param("id", "ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let w = wrapper(&server.uri());
        assert!(!w.is_connected());
        let found = w.get("user:1").await.unwrap().unwrap();
        assert_eq!(found.payload()["name"], "Ada");
        assert!(w.get("ghost").await.unwrap().is_none());
        assert!(w.is_connected());
    }

    #[tokio::test]
    async fn test_insert_puts_document() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/databases/Demo/docs"))
            .and(query_param("id", "k"))
            .and(body_partial_json(json!({
                "Key": "k",
                "Payload": [1, 2],
                "@metadata": {"@collection": DEFAULT_COLLECTION}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"Id": "k", "ChangeVector": "A:2"})))
            .expect(1)
            .mount(&server)
            .await;

        let w = wrapper(&server.uri());
        let entity = ConnectorEntity::new("k", &vec![1, 2], None).unwrap();
        assert!(w.insert(entity).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_missing_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/databases/Demo/docs"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let w = wrapper(&server.uri());
        let entity = ConnectorEntity::new("ghost", &1, None).unwrap();
        assert!(!w.update(entity).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/databases/Demo/docs"))
            .and(query_param("id", "k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Results": [raven_doc("k", json!(1))]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/databases/Demo/docs"))
            .and(query_param("id", "ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/databases/Demo/docs"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let w = wrapper(&server.uri());
        assert!(w.delete("k").await.unwrap());
        assert!(!w.delete("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_all_pages_and_skips_expired() {
        let server = MockServer::start().await;
        let expired = json!({
            "Key": "old", "Payload": 0, "ExpiresAt": "2000-01-01T00:00:00.000Z",
            "@metadata": {"@collection": DEFAULT_COLLECTION}
        });
        Mock::given(method("GET"))
            .and(path("/databases/Demo/collections/docs"))
            .and(query_param("name", DEFAULT_COLLECTION))
            .and(query_param("start", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Results": [raven_doc("a", json!(1)), raven_doc("b", json!(2)), expired]
            })))
            .mount(&server)
            .await;

        let w = wrapper(&server.uri());
        let all = w.get_all().await.unwrap();
        let keys: Vec<&str> = all.iter().map(|e| e.key()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_insert_many_uses_bulk_docs() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/databases/Demo/bulk_docs"))
            .and(body_partial_json(json!({"Commands": [{"Id": "a", "Type": "PUT"}, {"Id": "b", "Type": "PUT"}]})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "Results": [{"Id": "a"}, {"Id": "b"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let w = wrapper(&server.uri());
        let batch = vec![
            ConnectorEntity::new("a", &1, None).unwrap(),
            ConnectorEntity::new("b", &2, None).unwrap(),
        ];
        assert!(w.insert_many(batch).await.unwrap());
        assert!(w.insert_many(Vec::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_server_error_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let w = wrapper(&server.uri());
        let err = w.get("k").await.unwrap_err();
        assert!(matches!(err, crate::error::ConnectorError::Http { status: 500, .. }));
    }
}
