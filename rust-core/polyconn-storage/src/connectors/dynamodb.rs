// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// DynamoDB connector.
//
// Each entity is one item. The envelope fields become top-level attributes
// and the entity key is written to the table's hash key attribute, which is
// discovered with DescribeTable on first use. JSON payloads map onto native
// attribute values (M, L, S, N, BOOL, NULL).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::config::Credentials;
use aws_sdk_dynamodb::types::{AttributeValue, KeyType, PutRequest, ReturnValue, WriteRequest};
use aws_sdk_dynamodb::Client;
use serde_json::{Map, Number, Value};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::codec;
use crate::config::{ConnectorKind, DynamoDbConfig};
use crate::entity::{deadline_now, ConnectorEntity, StoredEntity};
use crate::error::{ConnectorError, ConnectorResult};
use crate::wrapper::ConnectorWrapper;

const KIND: ConnectorKind = ConnectorKind::DynamoDb;

/// BatchWriteItem accepts at most this many requests.
pub const BATCH_LIMIT: usize = 25;

/// Resubmissions of unprocessed batch items before giving up.
const BATCH_RETRIES: u32 = 3;

/// Delay before the first retry of unprocessed batch items; doubles on
/// every further attempt.
const BATCH_BACKOFF: Duration = Duration::from_millis(50);

const CREDENTIALS_PROVIDER: &str = "polyconn";

fn driver_err<E>(err: E) -> ConnectorError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ConnectorError::driver(KIND, err)
}

/// Endpoint override for a configured service URL. A bare host gets a
/// scheme chosen by `use_http`.
pub fn endpoint_url(service_url: &str, use_http: bool) -> String {
    let url = service_url.trim();
    if url.contains("://") {
        url.to_string()
    } else if use_http {
        format!("http://{url}")
    } else {
        format!("https://{url}")
    }
}

// ---------------------------------------------------------------------------
// JSON <-> AttributeValue
// ---------------------------------------------------------------------------

pub fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attribute(v)))
                .collect(),
        ),
    }
}

fn parse_number(text: &str) -> ConnectorResult<Value> {
    text.parse::<Number>()
        .map(Value::Number)
        .map_err(|e| ConnectorError::CorruptedData(format!("invalid DynamoDB number '{text}': {e}")))
}

pub fn from_attribute(attribute: &AttributeValue) -> ConnectorResult<Value> {
    Ok(match attribute {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::N(n) => parse_number(n)?,
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::Ss(set) => Value::Array(set.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(set) => Value::Array(
            set.iter()
                .map(|n| parse_number(n))
                .collect::<ConnectorResult<_>>()?,
        ),
        AttributeValue::L(items) => Value::Array(
            items
                .iter()
                .map(from_attribute)
                .collect::<ConnectorResult<_>>()?,
        ),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), from_attribute(v)?)))
                .collect::<ConnectorResult<Map<String, Value>>>()?,
        ),
        other => {
            return Err(ConnectorError::CorruptedData(format!(
                "unsupported DynamoDB attribute: {other:?}"
            )))
        }
    })
}

/// Item attributes for `entity`, with the key under `hash_key`.
pub fn to_item(
    entity: &ConnectorEntity,
    hash_key: &str,
) -> ConnectorResult<HashMap<String, AttributeValue>> {
    let envelope = codec::encode_value(&entity.to_stored())?;
    let mut item: HashMap<String, AttributeValue> = match envelope {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), to_attribute(v))).collect(),
        other => {
            return Err(ConnectorError::InvalidEntity(format!(
                "envelope is not an object: {other}"
            )))
        }
    };
    item.insert(hash_key.to_string(), AttributeValue::S(entity.key().to_string()));
    Ok(item)
}

/// Envelope stored in `item`. A hash key other than `Key` is dropped.
pub fn from_item(
    item: &HashMap<String, AttributeValue>,
    hash_key: &str,
) -> ConnectorResult<StoredEntity> {
    let mut object = Map::with_capacity(item.len());
    for (name, attribute) in item {
        if name == hash_key && name != "Key" {
            continue;
        }
        object.insert(name.clone(), from_attribute(attribute)?);
    }
    codec::decode_value(Value::Object(object))
}

// ---------------------------------------------------------------------------
// Access
// ---------------------------------------------------------------------------

struct TableHandle {
    client: Client,
    hash_key: String,
}

/// Lazily built SDK client plus the table's hash key name.
pub struct DynamoDbAccess {
    config: DynamoDbConfig,
    handle: OnceCell<TableHandle>,
}

impl DynamoDbAccess {
    pub fn new(config: &DynamoDbConfig) -> Self {
        Self {
            config: config.clone(),
            handle: OnceCell::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.handle.initialized()
    }

    pub fn table_name(&self) -> &str {
        &self.config.table_name
    }

    async fn build_client(&self) -> Client {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.config.region.clone()));
        if let (Some(access), Some(secret)) = (&self.config.access_key, &self.config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access.clone(),
                secret.clone(),
                None,
                None,
                CREDENTIALS_PROVIDER,
            ));
        }
        if let Some(url) = &self.config.service_url {
            loader = loader.endpoint_url(endpoint_url(url, self.config.use_http));
        }
        Client::new(&loader.load().await)
    }

    async fn connect(&self) -> ConnectorResult<TableHandle> {
        let client = self.build_client().await;
        let described = client
            .describe_table()
            .table_name(&self.config.table_name)
            .send()
            .await
            .map_err(driver_err)?;
        let hash_key = described
            .table()
            .and_then(|table| {
                table
                    .key_schema()
                    .iter()
                    .find(|element| element.key_type() == &KeyType::Hash)
            })
            .map(|element| element.attribute_name().to_string())
            .ok_or_else(|| {
                ConnectorError::Config(format!(
                    "{KIND} table '{}' has no hash key",
                    self.config.table_name
                ))
            })?;
        debug!(table = %self.config.table_name, hash_key = %hash_key, "connected to dynamodb");
        Ok(TableHandle { client, hash_key })
    }

    async fn handle(&self) -> ConnectorResult<&TableHandle> {
        self.handle.get_or_try_init(|| self.connect()).await
    }
}

impl std::fmt::Debug for DynamoDbAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbAccess")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// DynamoDB wrapper.
#[derive(Debug)]
pub struct DynamoDbWrapper {
    access: DynamoDbAccess,
}

impl DynamoDbWrapper {
    pub fn new(config: &DynamoDbConfig) -> Self {
        Self {
            access: DynamoDbAccess::new(config),
        }
    }

    pub fn access(&self) -> &DynamoDbAccess {
        &self.access
    }

    async fn write_batch(
        &self,
        handle: &TableHandle,
        mut requests: Vec<WriteRequest>,
    ) -> ConnectorResult<bool> {
        let table = self.access.table_name().to_string();
        for attempt in 0..=BATCH_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(retry_delay(attempt)).await;
            }
            let output = handle
                .client
                .batch_write_item()
                .request_items(table.clone(), requests)
                .send()
                .await
                .map_err(driver_err)?;
            requests = output
                .unprocessed_items()
                .and_then(|pending| pending.get(&table))
                .cloned()
                .unwrap_or_default();
            if requests.is_empty() {
                return Ok(true);
            }
            debug!(attempt, pending = requests.len(), "dynamodb batch has unprocessed items");
        }
        warn!(pending = requests.len(), "dynamodb batch write left items unprocessed");
        Ok(false)
    }
}

/// Exponential backoff before retry `attempt` (1-based).
fn retry_delay(attempt: u32) -> Duration {
    BATCH_BACKOFF.saturating_mul(1 << attempt.saturating_sub(1).min(16))
}

#[async_trait]
impl ConnectorWrapper for DynamoDbWrapper {
    async fn get(&self, key: &str) -> ConnectorResult<Option<ConnectorEntity>> {
        let handle = self.access.handle().await?;
        let output = handle
            .client
            .get_item()
            .table_name(self.access.table_name())
            .key(&handle.hash_key, AttributeValue::S(key.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(driver_err)?;
        match output.item() {
            Some(item) => Ok(from_item(item, &handle.hash_key)?
                .live()
                .map(ConnectorEntity::from_stored)),
            None => Ok(None),
        }
    }

    async fn get_all(&self) -> ConnectorResult<Vec<ConnectorEntity>> {
        let handle = self.access.handle().await?;
        let mut entities = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;
        loop {
            let output = handle
                .client
                .scan()
                .table_name(self.access.table_name())
                .consistent_read(true)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(driver_err)?;
            for item in output.items() {
                if let Some(stored) = from_item(item, &handle.hash_key)?.live() {
                    entities.push(ConnectorEntity::from_stored(stored));
                }
            }
            match output.last_evaluated_key() {
                Some(last) if !last.is_empty() => start_key = Some(last.clone()),
                _ => break,
            }
        }
        Ok(entities)
    }

    async fn insert(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        let handle = self.access.handle().await?;
        handle
            .client
            .put_item()
            .table_name(self.access.table_name())
            .set_item(Some(to_item(&entity, &handle.hash_key)?))
            .send()
            .await
            .map_err(driver_err)?;
        Ok(true)
    }

    async fn insert_many(&self, entities: Vec<ConnectorEntity>) -> ConnectorResult<bool> {
        if entities.is_empty() {
            return Ok(true);
        }
        let handle = self.access.handle().await?;
        let mut all = true;
        for chunk in entities.chunks(BATCH_LIMIT) {
            let requests = chunk
                .iter()
                .map(|entity| {
                    let put = PutRequest::builder()
                        .set_item(Some(to_item(entity, &handle.hash_key)?))
                        .build()
                        .map_err(driver_err)?;
                    Ok(WriteRequest::builder().put_request(put).build())
                })
                .collect::<ConnectorResult<Vec<_>>>()?;
            all &= self.write_batch(handle, requests).await?;
        }
        Ok(all)
    }

    async fn update(&self, entity: ConnectorEntity) -> ConnectorResult<bool> {
        let handle = self.access.handle().await?;
        let result = handle
            .client
            .put_item()
            .table_name(self.access.table_name())
            .set_item(Some(to_item(&entity, &handle.hash_key)?))
            .condition_expression("attribute_exists(#k) AND (attribute_not_exists(#e) OR #e > :now)")
            .expression_attribute_names("#k", &handle.hash_key)
            .expression_attribute_names("#e", "ExpiresAt")
            .expression_attribute_values(":now", AttributeValue::S(deadline_now()))
            .send()
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Ok(false)
            }
            Err(err) => Err(driver_err(err)),
        }
    }

    async fn delete(&self, key: &str) -> ConnectorResult<bool> {
        let handle = self.access.handle().await?;
        let output = handle
            .client
            .delete_item()
            .table_name(self.access.table_name())
            .key(&handle.hash_key, AttributeValue::S(key.to_string()))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(driver_err)?;
        match output.attributes() {
            Some(old) if !old.is_empty() => Ok(!from_item(old, &handle.hash_key)?.is_expired()),
            _ => Ok(false),
        }
    }

    fn is_connected(&self) -> bool {
        self.access.is_connected()
    }

    fn name(&self) -> &'static str {
        KIND.as_str()
    }
}
