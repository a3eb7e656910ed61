// SPDX-License-Identifier: PMPL-1.0-or-later
//! Integration tests for PolyConn storage
//!
//! End-to-end laws of the client contract, run against the embedded LiteDb
//! (redb) backend and the in-memory wrapper. Network backends are covered
//! by their own module tests.

use std::sync::Arc;
use std::time::Duration;

use polyconn_storage::{
    BlockingConnectorClient, ConfigSection, ConnectorClient, ConnectorError, ConnectorWrapper,
    MemoryWrapper, MetricsWrapper, OperationsFactory,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    id: u64,
    item: String,
    quantity: u32,
}

fn order(id: u64, item: &str, quantity: u32) -> Order {
    Order {
        id,
        item: item.to_string(),
        quantity,
    }
}

fn litedb_section(dir: &TempDir, collection: &str) -> ConfigSection {
    ConfigSection::new()
        .with("Instance", "litedb")
        .with("ConnectionString", dir.path().join("orders.redb").to_string_lossy())
        .with("CollectionName", collection)
}

fn litedb_client<T>(dir: &TempDir) -> ConnectorClient<T>
where
    T: Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
{
    ConnectorClient::from_section(&litedb_section(dir, "Orders")).unwrap()
}

/// Insert then get returns the value on both embedded backends
#[tokio::test]
async fn test_round_trip_on_every_embedded_backend() {
    let dir = tempfile::tempdir().unwrap();
    let clients: Vec<ConnectorClient<Order>> = vec![
        litedb_client(&dir),
        ConnectorClient::with_wrapper(Arc::new(MemoryWrapper::new())),
    ];

    for client in clients {
        let o = order(1, "widget", 3);
        assert!(client.insert("order:1", &o).await.unwrap(), "{}", client.name());
        assert_eq!(client.get("order:1").await.unwrap(), Some(o), "{}", client.name());
        assert_eq!(client.get("order:2").await.unwrap(), None);
    }
}

/// Insert replaces an existing record instead of failing
#[tokio::test]
async fn test_insert_is_an_upsert() {
    let dir = tempfile::tempdir().unwrap();
    let client = litedb_client::<Order>(&dir);

    client.insert("k", &order(1, "a", 1)).await.unwrap();
    assert!(client.insert("k", &order(1, "a", 2)).await.unwrap());
    assert_eq!(client.get("k").await.unwrap().unwrap().quantity, 2);
    assert_eq!(client.get_all().await.unwrap().len(), 1);
}

/// After delete, get returns absent and a second delete returns false
#[tokio::test]
async fn test_delete_law() {
    let dir = tempfile::tempdir().unwrap();
    let client = litedb_client::<Order>(&dir);

    client.insert("k", &order(1, "a", 1)).await.unwrap();
    assert!(client.delete("k").await.unwrap());
    assert_eq!(client.get("k").await.unwrap(), None);
    assert!(!client.delete("k").await.unwrap());
    assert!(!client.exists("k").await.unwrap());
}

/// Update only touches existing keys
#[tokio::test]
async fn test_update_law() {
    let dir = tempfile::tempdir().unwrap();
    let client = litedb_client::<Order>(&dir);

    assert!(!client.update("k", &order(1, "a", 1)).await.unwrap());
    assert!(!client.exists("k").await.unwrap());

    client.insert("k", &order(1, "a", 1)).await.unwrap();
    assert!(client.update("k", &order(1, "b", 9)).await.unwrap());
    assert_eq!(client.get("k").await.unwrap(), Some(order(1, "b", 9)));
}

/// Every value stored by insert_many is visible through get_all
#[tokio::test]
async fn test_insert_many_is_subset_of_get_all() {
    let dir = tempfile::tempdir().unwrap();
    let client = litedb_client::<Order>(&dir);
    client.insert("existing", &order(0, "old", 1)).await.unwrap();

    let batch: Vec<(String, Order)> = (1..=20)
        .map(|i| (format!("order:{i}"), order(i, "bulk", i as u32)))
        .collect();
    assert!(client.insert_many(batch.clone()).await.unwrap());

    let all = client.get_all().await.unwrap();
    assert_eq!(all.len(), 21);
    for (_, o) in &batch {
        assert!(all.contains(o), "missing {o:?}");
    }
}

/// Expired records disappear from every read path
#[tokio::test]
async fn test_expiry_on_litedb() {
    let dir = tempfile::tempdir().unwrap();
    let client = litedb_client::<Value>(&dir);

    client
        .insert_with_expiration("short", &json!(1), Duration::from_millis(30))
        .await
        .unwrap();
    client
        .insert_with_expiration("long", &json!(2), Duration::from_secs(3600))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(client.get("short").await.unwrap(), None);
    assert!(!client.exists("short").await.unwrap());
    assert!(!client.update("short", &json!(3)).await.unwrap());
    assert!(!client.delete("short").await.unwrap());
    assert_eq!(client.get_all().await.unwrap(), vec![json!(2)]);
}

/// Query is refused by backends without query support
#[tokio::test]
async fn test_query_support_by_backend() {
    let dir = tempfile::tempdir().unwrap();
    let lite = litedb_client::<Order>(&dir);
    lite.insert("k", &order(1, "a", 1)).await.unwrap();
    let err = lite.query(&|_: &Order| true).await.unwrap_err();
    assert!(matches!(
        err,
        ConnectorError::Unsupported {
            backend: "LiteDb",
            operation: "query"
        }
    ));

    let memory = ConnectorClient::<Order>::with_wrapper(Arc::new(MemoryWrapper::new()));
    memory.insert("a", &order(1, "a", 1)).await.unwrap();
    memory.insert("b", &order(2, "b", 5)).await.unwrap();
    let big = memory.query(&|o: &Order| o.quantity > 2).await.unwrap();
    assert_eq!(big, vec![order(2, "b", 5)]);
}

/// Invalid configuration is rejected before any connection is attempted
#[test]
fn test_factory_rejection() {
    let cases = [
        ConfigSection::new(),
        ConfigSection::new().with("Instance", "Oracle"),
        ConfigSection::new().with("Instance", "MongoDb").with("ConnectionString", "mongodb://x"),
        ConfigSection::new()
            .with("Instance", "ArangoDb")
            .with("ConnectionString", "tcp://localhost:8529")
            .with("CollectionName", "c"),
        ConfigSection::new()
            .with("Instance", "Redis")
            .with("ConnectionString", "localhost")
            .with("DatabaseNumber", "zero"),
    ];
    for section in cases {
        let err = OperationsFactory::from_section::<Value>(&section).unwrap_err();
        assert!(err.is_config(), "{section:?} gave {err}");
    }
}

/// Construction never connects; the first operation does
#[tokio::test]
async fn test_lazy_connect() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.redb");
    let client = litedb_client::<Order>(&dir);

    assert!(!client.is_connected());
    assert!(!path.exists());
    assert_eq!(client.get("anything").await.unwrap(), None);
    assert!(client.is_connected());
    assert!(path.exists());
}

/// Data written by one client is visible to the next one on the same file
#[tokio::test]
async fn test_litedb_persists_across_clients() {
    let dir = tempfile::tempdir().unwrap();
    {
        let client = litedb_client::<Order>(&dir);
        client.insert("k", &order(7, "kept", 1)).await.unwrap();
    }
    let reopened = litedb_client::<Order>(&dir);
    assert_eq!(reopened.get("k").await.unwrap(), Some(order(7, "kept", 1)));
}

/// Collections on the same file do not see each other
#[tokio::test]
async fn test_collections_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let a = ConnectorClient::<u32>::from_section(&litedb_section(&dir, "A")).unwrap();
    a.insert("k", &1).await.unwrap();
    drop(a);

    let b = ConnectorClient::<u32>::from_section(&litedb_section(&dir, "B")).unwrap();
    assert_eq!(b.get("k").await.unwrap(), None);
    assert!(b.get_all().await.unwrap().is_empty());
}

/// The blocking client gives the same answers as the async one
#[test]
fn test_sync_async_equivalence() {
    let wrapper = Arc::new(MemoryWrapper::new());
    let blocking =
        BlockingConnectorClient::<String>::with_wrapper(wrapper.clone()).unwrap();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let asynchronous = ConnectorClient::<String>::with_wrapper(wrapper);

    let script: Vec<(&str, &str)> = vec![("a", "1"), ("b", "2"), ("a", "3")];
    for (key, value) in &script {
        let sync_insert = blocking.insert(key, &value.to_string()).unwrap();
        let async_insert = runtime
            .block_on(asynchronous.insert(key, &value.to_string()))
            .unwrap();
        assert_eq!(sync_insert, async_insert);
    }

    for key in ["a", "b", "missing"] {
        assert_eq!(
            blocking.get(key).unwrap(),
            runtime.block_on(asynchronous.get(key)).unwrap()
        );
    }
    assert_eq!(
        blocking.update("missing", &"x".to_string()).unwrap(),
        runtime
            .block_on(asynchronous.update("missing", &"x".to_string()))
            .unwrap()
    );
    assert!(blocking.delete("a").unwrap());
    assert!(!runtime.block_on(asynchronous.delete("a")).unwrap());
}

/// Metrics can be layered under a client without changing results
#[tokio::test]
async fn test_metrics_layer_under_client() {
    let metered = Arc::new(MetricsWrapper::new(MemoryWrapper::new()));
    let client = ConnectorClient::<u32>::with_wrapper(metered.clone());

    client.insert("a", &1).await.unwrap();
    client.insert_many(vec![("b".into(), 2), ("c".into(), 3)]).await.unwrap();
    assert_eq!(client.get("a").await.unwrap(), Some(1));
    assert!(!client.delete("zz").await.unwrap());

    let stats = metered.stats().await;
    assert_eq!(stats.insert_count, 3);
    assert_eq!(stats.get_count, 1);
    assert_eq!(stats.delete_count, 1);
    assert_eq!(metered.name(), "Memory");
}
