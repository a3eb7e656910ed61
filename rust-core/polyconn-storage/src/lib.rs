// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PolyConn Storage Connectors
//
// One key / payload / expiration CRUD contract over Redis, MongoDB, LiteDb,
// Memcached, RavenDB, Couchbase, DynamoDB and ArangoDB. A configuration
// section names the backend; the factory builds that backend's wrapper and
// the client exposes typed operations over it.
//
// # Modules
//
// - [`config`] -- Configuration sections, `ConnectorKind` and per-backend settings.
// - [`entity`] -- The `ConnectorEntity` envelope and its stored shape.
// - [`codec`] -- JSON encoding of envelopes and typed payload decoding.
// - [`error`] -- The `ConnectorError` enum covering all failure modes.
// - [`wrapper`] -- The `ConnectorWrapper` trait every backend implements.
// - [`connectors`] -- One wrapper per backend, plus an in-memory one.
// - [`metrics`] -- A transparent wrapper that collects operation statistics.
// - [`operations`] -- Typed operations over any wrapper.
// - [`factory`] -- Backend selection from configuration.
// - [`client`] / [`blocking`] -- The async and blocking client facades.
//
// # Example
//
// ```rust
// use polyconn_storage::{ConfigSection, ConnectorClient};
//
// # tokio_test::block_on(async {
// let dir = tempfile::tempdir().unwrap();
// let path = dir.path().join("entities.redb");
// let section = ConfigSection::from_pairs([
//     ("Instance", "LiteDb".to_string()),
//     ("ConnectionString", path.display().to_string()),
// ]);
//
// let client: ConnectorClient<serde_json::Value> = ConnectorClient::from_section(&section).unwrap();
// client.insert("e1", &serde_json::json!({"name": "test"})).await.unwrap();
//
// let val = client.get("e1").await.unwrap().unwrap();
// assert_eq!(val["name"], "test");
// # });
// ```

pub mod blocking;
pub mod client;
pub mod codec;
pub mod config;
pub mod connectors;
pub mod entity;
pub mod error;
pub mod factory;
pub mod metrics;
pub mod operations;
pub mod wrapper;

// Re-export the most commonly used types at the crate root for convenience.
pub use blocking::BlockingConnectorClient;
pub use client::ConnectorClient;
pub use config::{ConfigSection, ConnectorConfig, ConnectorKind, ConnectorSettings};
pub use connectors::MemoryWrapper;
pub use entity::{ConnectorEntity, StoredEntity};
pub use error::{ConnectorError, ConnectorResult};
pub use factory::OperationsFactory;
pub use metrics::{MetricsWrapper, WrapperStats};
pub use operations::{ConnectorOperations, Operations};
pub use wrapper::ConnectorWrapper;
