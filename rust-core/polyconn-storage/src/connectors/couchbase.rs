// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Couchbase connector over the N1QL query service.
//
// Every operation is a parameterised statement against the bucket, with the
// entity key as the document key. Expiration is lazy: documents carry
// `ExpiresAt` and reads skip dead ones. get_all needs a primary index on
// the bucket.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::codec;
use crate::config::{ConnectorKind, CouchbaseConfig};
use crate::connectors::http::{Auth, RestTransport};
use crate::entity::{deadline_now, format_deadline, ConnectorEntity};
use crate::error::{ConnectorError, ConnectorResult};
use crate::wrapper::ConnectorWrapper;

const KIND: ConnectorKind = ConnectorKind::Couchbase;

const QUERY_PORT: u16 = 8093;
const QUERY_TLS_PORT: u16 = 18093;

/// Query service URL for a connection string.
///
/// `couchbase://host[,host2]` maps to `http://host:8093`, `couchbases://`
/// to `https://host:18093`. An http(s) URL is taken as is.
pub fn query_service_url(connection_string: &str) -> ConnectorResult<String> {
    let conn = connection_string.trim();
    if conn.starts_with("http://") || conn.starts_with("https://") {
        return Ok(conn.to_string());
    }
    let (scheme, port, rest) = if let Some(rest) = conn.strip_prefix("couchbases://") {
        ("https", QUERY_TLS_PORT, rest)
    } else if let Some(rest) = conn.strip_prefix("couchbase://") {
        ("http", QUERY_PORT, rest)
    } else {
        ("http", QUERY_PORT, conn)
    };
    let host = rest
        .split([',', ';', '/', '?'])
        .next()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| {
            ConnectorError::Config(format!("{KIND} connectionstring names no host: '{conn}'"))
        })?;
    // Data-service ports in the connection string do not apply to queries.
    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    Ok(format!("{scheme}://{host}:{port}"))
}

/// Backtick-quote an identifier for a statement.
fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[derive(Debug, Default, Deserialize)]
struct QueryMetrics {
    #[serde(rename = "mutationCount", default)]
    mutation_count: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    errors: Vec<Value>,
    #[serde(default)]
    metrics: QueryMetrics,
}

/// Couchbase wrapper.
#[derive(Debug)]
pub struct CouchbaseWrapper {
    transport: RestTransport,
    bucket: String,
}

impl CouchbaseWrapper {
    pub fn new(config: &CouchbaseConfig) -> ConnectorResult<Self> {
        let url = query_service_url(&config.connection_string)?;
        let auth = Auth::from_parts(config.username.as_deref(), config.password.as_deref());
        Ok(Self {
            transport: RestTransport::new(KIND, &url, auth)?,
            bucket: config.bucket_name.clone(),
        })
    }

    pub fn transport(&self) -> &RestTransport {
        &self.transport
    }

    /// Run one statement with positional `args`.
    async fn query(&self, statement: &str, args: Vec<Value>) -> ConnectorResult<QueryResponse> {
        debug!(statement, "couchbase query");
        let url = self.transport.endpoint(&["query", "service"])?;
        let request = self
            .transport
            .request(Method::POST, url)
            .await?
            .json(&json!({ "statement": statement, "args": args }));
        let response = self.transport.send(request).await?;
        let body: QueryResponse = self.transport.json(response).await?;
        if body.status != "success" {
            let message = format!("query {}: {}", body.status, Value::Array(body.errors));
            return Err(ConnectorError::driver(KIND, message));
        }
        Ok(body)
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

    /// `UPSERT ... VALUES ($1, $2), ($3, $4), ...` for `entities`.
    fn upsert_statement(
        &self,
        entities: &[ConnectorEntity],
    ) -> ConnectorResult<(String, Vec<Value>)> {
        let mut rows = Vec::with_capacity(entities.len());
        let mut args = Vec::with_capacity(entities.len() * 2);
        for entity in entities {
            let n = args.len();
            rows.push(format!("(${}, ${})", n + 1, n + 2));
            args.push(Value::String(entity.key().to_string()));
            args.push(codec::encode_value(&entity.to_stored())?);
        }
        let statement = format!(
            "UPSERT INTO {} (KEY, VALUE) VALUES {}",
            quote_ident(&self.bucket),
            rows.join(", ")
        );
        Ok((statement, args))
    }

    /// Replace the envelope fields of a live document.
    fn update_statement(&self, entity: &ConnectorEntity) -> (String, Vec<Value>) {
        let stored = entity.to_stored();
        let bucket = quote_ident(&self.bucket);
        let mut args = vec![
            Value::String(stored.key.clone()),
            stored.payload,
            Value::String(deadline_now()),
        ];
        let expiry = match (stored.expiration, stored.expires_at) {
            (Some(ms), Some(deadline)) => {
                args.push(json!(ms));
                args.push(Value::String(format_deadline(deadline)));
                "SET d.Payload = $2, d.Expiration = $4, d.ExpiresAt = $5".to_string()
            }
            _ => "SET d.Payload = $2 UNSET d.Expiration, d.ExpiresAt".to_string(),
        };
        let statement = format!(
            "UPDATE {bucket} AS d USE KEYS $1 {expiry} \
             WHERE d.ExpiresAt IS MISSING OR d.ExpiresAt > $3"
        );
        (statement, args)
    }
}

#[async_trait]
impl ConnectorWrapper for CouchbaseWrapper {
    async fn get(&self, key: &str) -> ConnectorResult<Option<ConnectorEntity>> {
        let statement = format!("SELECT RAW d FROM {} AS d USE KEYS $1", quote_ident(&self.bucket));
        let body = self.query(&statement, vec![json!(key)]).await?;
        Ok(Self::live_entities(body.results)?.into_iter().next())
    }

    async fn get_all(&self) -> ConnectorResult<Vec<ConnectorEntity>> {
        let statement = format!(
            "SELECT RAW d FROM {} AS d WHERE d.ExpiresAt IS MISSING OR d.ExpiresAt > $1",
            quote_ident(&self.bucket)
        );
        let body = self.query(&statement, vec![json!(deadline_now())]).await?;
        Self::live_entities(body.results)
    }

    async fn insert(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        self.insert_many(vec![entity]).await
    }

    async fn insert_many(&self, entities: Vec<ConnectorEntity>) -> ConnectorResult<bool> {
        if entities.is_empty() {
            return Ok(true);
        }
        let (statement, args) = self.upsert_statement(&entities)?;
        let body = self.query(&statement, args).await?;
        let written = body.metrics.mutation_count;
        if written != entities.len() {
            warn!(written, expected = entities.len(), "couchbase upsert partially applied");
            return Ok(false);
        }
        Ok(true)
    }

    async fn update(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        let (statement, args) = self.update_statement(&entity);
        let body = self.query(&statement, args).await?;
        Ok(body.metrics.mutation_count > 0)
    }

    async fn delete(&self, key: &str) -> ConnectorResult<bool> {
        let statement = format!(
            "DELETE FROM {} AS d USE KEYS $1 RETURNING RAW d",
            quote_ident(&self.bucket)
        );
        let body = self.query(&statement, vec![json!(key)]).await?;
        Ok(!Self::live_entities(body.results)?.is_empty())
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

    use wiremock::matchers::{body_partial_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn wrapper(uri: &str) -> CouchbaseWrapper {
        CouchbaseWrapper::new(&CouchbaseConfig {
            connection_string: uri.to_string(),
            bucket_name: "entities".to_string(),
            username: Some("Administrator".to_string()),
            password: Some("password".to_string()),
        })
        .unwrap()
    }

    fn success(results: Value, mutations: usize) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "requestID": "r1",
            "results": results,
            "status": "success",
            "metrics": {"resultCount": 0, "mutationCount": mutations}
        }))
    }

    #[test]
    fn test_query_service_url() {
        assert_eq!(query_service_url("couchbase://localhost").unwrap(), "http://localhost:8093");
        assert_eq!(
            query_service_url("couchbases://db.example.com,db2").unwrap(),
            "https://db.example.com:18093"
        );
        assert_eq!(query_service_url("couchbase://host:11210").unwrap(), "http://host:8093");
        assert_eq!(query_service_url("localhost").unwrap(), "http://localhost:8093");
        assert_eq!(query_service_url("http://q:9000").unwrap(), "http://q:9000");
        assert!(query_service_url("couchbase://").unwrap_err().is_config());
    }

    #[test]
    fn test_statements() {
        let w = wrapper("http://localhost:8093");
        let batch = vec![
            ConnectorEntity::new("a", &1, None).unwrap(),
            ConnectorEntity::new("b", &2, None).unwrap(),
        ];
        let (statement, args) = w.upsert_statement(&batch).unwrap();
        assert_eq!(statement, "UPSERT INTO `entities` (KEY, VALUE) VALUES ($1, $2), ($3, $4)");
        assert_eq!(args.len(), 4);
        assert_eq!(args[2], "b");
        assert_eq!(args[3]["Payload"], 2);

        let (plain, args) = w.update_statement(&batch[0]);
        assert!(plain.contains("UNSET d.Expiration, d.ExpiresAt"));
        assert_eq!(args.len(), 3);

        let expiring = ConnectorEntity::new("a", &1, Some(Duration::from_secs(5))).unwrap();
        let (timed, args) = w.update_statement(&expiring);
        assert!(timed.contains("d.ExpiresAt = $5"));
        assert_eq!(args[3], 5000);

        assert_eq!(quote_ident("we`ird"), "`we``ird`");
    }

    #[tokio::test]
    async fn test_get_sends_statement_with_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query/service"))
            .and(header_exists("authorization"))
            .and(body_partial_json(json!({"args": ["user:1"]})))
            .respond_with(success(json!([{"Key": "user:1", "Payload": {"name": "Ada"}}]), 0))
            .mount(&server)
            .await;

        let w = wrapper(&server.uri());
        let entity = w.get("user:1").await.unwrap().unwrap();
        assert_eq!(entity.payload()["name"], "Ada");
    }

    #[tokio::test]
    async fn test_missing_and_expired_read_as_absent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"args": ["ghost"]})))
            .respond_with(success(json!([]), 0))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"args": ["old"]})))
            .respond_with(success(
                json!([{"Key": "old", "Payload": 1, "ExpiresAt": "2001-01-01T00:00:00.000Z"}]),
                1,
            ))
            .mount(&server)
            .await;

        let w = wrapper(&server.uri());
        assert!(w.get("ghost").await.unwrap().is_none());
        assert!(w.get("old").await.unwrap().is_none());
        // A dead document removed by delete still reports false.
        assert!(!w.delete("old").await.unwrap());
        assert!(!w.delete("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_mutation_counts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(success(json!([]), 1))
            .mount(&server)
            .await;

        let w = wrapper(&server.uri());
        assert!(w.insert(ConnectorEntity::new("a", &1, None).unwrap()).await.unwrap());
        assert!(w.update(ConnectorEntity::new("a", &2, None).unwrap()).await.unwrap());
        let batch = vec![
            ConnectorEntity::new("a", &1, None).unwrap(),
            ConnectorEntity::new("b", &2, None).unwrap(),
        ];
        assert!(!w.insert_many(batch).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_query_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "fatal",
                "errors": [{"code": 4000, "msg": "No index available"}]
            })))
            .mount(&server)
            .await;

        let w = wrapper(&server.uri());
        let err = w.get_all().await.unwrap_err();
        assert!(err.to_string().contains("No index available"));
    }
}
