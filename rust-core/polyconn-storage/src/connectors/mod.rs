// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Backend wrappers. Each one implements `ConnectorWrapper` over a lazily
// opened driver handle; all but `memory` sit behind a cargo feature.

pub mod memory;

#[cfg(any(feature = "ravendb", feature = "couchbase", feature = "arangodb"))]
pub mod http;

#[cfg(feature = "arangodb")]
pub mod arangodb;
#[cfg(feature = "couchbase")]
pub mod couchbase;
#[cfg(feature = "dynamodb")]
pub mod dynamodb;
#[cfg(feature = "litedb")]
pub mod litedb;
#[cfg(feature = "memcached")]
pub mod memcached;
#[cfg(feature = "mongodb")]
pub mod mongodb;
#[cfg(feature = "ravendb")]
pub mod ravendb;
#[cfg(feature = "redis")]
pub mod redis;

pub use self::memory::MemoryWrapper;

#[cfg(feature = "arangodb")]
pub use self::arangodb::ArangoDbWrapper;
#[cfg(feature = "couchbase")]
pub use self::couchbase::CouchbaseWrapper;
#[cfg(feature = "dynamodb")]
pub use self::dynamodb::DynamoDbWrapper;
#[cfg(feature = "litedb")]
pub use self::litedb::LiteDbWrapper;
#[cfg(feature = "memcached")]
pub use self::memcached::MemcachedWrapper;
#[cfg(feature = "mongodb")]
pub use self::mongodb::MongoDbWrapper;
#[cfg(feature = "ravendb")]
pub use self::ravendb::RavenDbWrapper;
#[cfg(feature = "redis")]
pub use self::redis::RedisWrapper;
