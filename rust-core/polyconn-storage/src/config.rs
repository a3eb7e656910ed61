// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Connector configuration.
//
// A `ConfigSection` is a flat, case-insensitive key/value map read from an
// `appsettings.json`-style document, from environment variables or built
// in code. Its `Instance` key selects one `ConnectorKind`; the remaining
// keys are parsed once into that backend's immutable config struct.
//
// # Keys
//
// | backend   | required                                   | optional                              |
// |-----------|--------------------------------------------|---------------------------------------|
// | Redis     | connectionstring                           | databasenumber (0)                    |
// | MongoDb   | connectionstring, databasename, collectionname |                                   |
// | LiteDb    | connectionstring (file path)               | collectionname (ConnectorEntities)    |
// | Memcached | connectionstring                           |                                       |
// | RavenDb   | connectionstring, databasename             | collectionname (ConnectorEntities)    |
// | Couchbase | connectionstring, bucketname               | username, password                    |
// | DynamoDb  | tablename, region                          | accesskey, secretkey, serviceurl, usehttp |
// | ArangoDb  | connectionstring, collectionname           | databasename (_system), username, password |

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConnectorError, ConnectorResult};

/// Name of the configuration section inside a settings document.
pub const SECTION_NAME: &str = "ConnectorConfig";

/// Collection used by LiteDb and RavenDb when none is configured.
pub const DEFAULT_COLLECTION: &str = "ConnectorEntities";

/// Database used by ArangoDb when none is configured.
pub const DEFAULT_ARANGO_DATABASE: &str = "_system";

/// Key names recognised in a section.
pub mod keys {
    pub const INSTANCE: &str = "instance";
    pub const CONNECTION_STRING: &str = "connectionstring";
    pub const DATABASE_NUMBER: &str = "databasenumber";
    pub const DATABASE_NAME: &str = "databasename";
    pub const COLLECTION_NAME: &str = "collectionname";
    pub const BUCKET_NAME: &str = "bucketname";
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const ACCESS_KEY: &str = "accesskey";
    pub const SECRET_KEY: &str = "secretkey";
    pub const REGION: &str = "region";
    pub const SERVICE_URL: &str = "serviceurl";
    pub const USE_HTTP: &str = "usehttp";
    pub const TABLE_NAME: &str = "tablename";
}

// ---------------------------------------------------------------------------
// ConnectorKind
// ---------------------------------------------------------------------------

/// The closed set of supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectorKind {
    Redis,
    MongoDb,
    LiteDb,
    Memcached,
    RavenDb,
    Couchbase,
    DynamoDb,
    ArangoDb,
}

impl ConnectorKind {
    pub const ALL: [ConnectorKind; 8] = [
        ConnectorKind::Redis,
        ConnectorKind::MongoDb,
        ConnectorKind::LiteDb,
        ConnectorKind::Memcached,
        ConnectorKind::RavenDb,
        ConnectorKind::Couchbase,
        ConnectorKind::DynamoDb,
        ConnectorKind::ArangoDb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorKind::Redis => "Redis",
            ConnectorKind::MongoDb => "MongoDb",
            ConnectorKind::LiteDb => "LiteDb",
            ConnectorKind::Memcached => "Memcached",
            ConnectorKind::RavenDb => "RavenDb",
            ConnectorKind::Couchbase => "Couchbase",
            ConnectorKind::DynamoDb => "DynamoDb",
            ConnectorKind::ArangoDb => "ArangoDb",
        }
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectorKind {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConnectorError::Config(format!("unknown instance '{wanted}'")))
    }
}

// ---------------------------------------------------------------------------
// ConfigSection
// ---------------------------------------------------------------------------

/// A flat configuration section with case-insensitive keys.
///
/// Keys are stored lowercased and values trimmed. Empty values are treated
/// as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSection {
    values: BTreeMap<String, String>,
}

impl ConfigSection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a section from `(key, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut section = Self::new();
        for (key, value) in pairs {
            section.set(key.as_ref(), value);
        }
        section
    }

    /// Read the `ConnectorConfig` section from a JSON settings document.
    ///
    /// The section name is matched case-insensitively. Strings, numbers and
    /// booleans are kept; nested objects, arrays and nulls are skipped.
    pub fn from_json_str(text: &str) -> ConnectorResult<Self> {
        let document: Value = serde_json::from_str(text)
            .map_err(|e| ConnectorError::Config(format!("invalid settings document: {e}")))?;
        Self::from_json_value(&document)
    }

    pub fn from_json_value(document: &Value) -> ConnectorResult<Self> {
        let root = document
            .as_object()
            .ok_or_else(|| ConnectorError::Config("settings document is not an object".into()))?;

        let section = root
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(SECTION_NAME))
            .and_then(|(_, value)| value.as_object())
            .ok_or_else(|| {
                ConnectorError::Config(format!("section '{SECTION_NAME}' not found"))
            })?;

        let pairs = section.iter().filter_map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.as_str(), text))
        });
        Ok(Self::from_pairs(pairs))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ConnectorResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Collect `{PREFIX}_{KEY}` variables from the process environment.
    pub fn from_env(prefix: &str) -> Self {
        Self::from_vars(prefix, std::env::vars())
    }

    /// Collect `{PREFIX}_{KEY}` pairs from an arbitrary variable list.
    pub fn from_vars<I>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let marker = format!("{}_", prefix.to_ascii_lowercase());
        let pairs = vars.into_iter().filter_map(|(name, value)| {
            let lowered = name.to_ascii_lowercase();
            lowered
                .strip_prefix(&marker)
                .filter(|key| !key.is_empty())
                .map(|key| (key.to_string(), value))
        });
        Self::from_pairs(pairs)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values
            .insert(key.trim().to_ascii_lowercase(), value.into().trim().to_string());
    }

    /// Builder-style [`ConfigSection::set`].
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Look up a key, ignoring case. Empty values read as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn get_owned(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    /// Look up a key that `kind` cannot work without.
    pub fn require(&self, key: &str, kind: ConnectorKind) -> ConnectorResult<String> {
        self.get_owned(key).ok_or_else(|| {
            ConnectorError::Config(format!("{kind} configuration requires '{key}'"))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse the `Instance` key.
    pub fn instance(&self) -> ConnectorResult<ConnectorKind> {
        self.get(keys::INSTANCE)
            .ok_or_else(|| ConnectorError::Config("instance not found".into()))?
            .parse()
    }
}

// ---------------------------------------------------------------------------
// Settings accessors
// ---------------------------------------------------------------------------

/// The superset of settings any backend may read.
///
/// Each config struct overrides the accessors it uses; the rest report
/// `None` (or `0` / `false`).
pub trait ConnectorSettings: fmt::Debug + Send + Sync {
    fn kind(&self) -> ConnectorKind;

    fn connection_string(&self) -> Option<&str> {
        None
    }
    fn database_name(&self) -> Option<&str> {
        None
    }
    fn collection_name(&self) -> Option<&str> {
        None
    }
    fn database_number(&self) -> i64 {
        0
    }
    fn username(&self) -> Option<&str> {
        None
    }
    fn password(&self) -> Option<&str> {
        None
    }
    fn bucket_name(&self) -> Option<&str> {
        None
    }
    fn access_key(&self) -> Option<&str> {
        None
    }
    fn secret_key(&self) -> Option<&str> {
        None
    }
    fn region(&self) -> Option<&str> {
        None
    }
    fn service_url(&self) -> Option<&str> {
        None
    }
    fn use_http(&self) -> bool {
        false
    }
    fn table_name(&self) -> Option<&str> {
        None
    }
}

fn redacted(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "***")
}

// ---------------------------------------------------------------------------
// Per-backend configs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub connection_string: String,
    pub database_number: i64,
}

impl RedisConfig {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            database_number: 0,
        }
    }

    pub fn from_section(section: &ConfigSection) -> ConnectorResult<Self> {
        let kind = ConnectorKind::Redis;
        let database_number = match section.get(keys::DATABASE_NUMBER) {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                ConnectorError::Config(format!("{kind} databasenumber '{raw}' is not an integer"))
            })?,
            None => 0,
        };
        Ok(Self {
            connection_string: section.require(keys::CONNECTION_STRING, kind)?,
            database_number,
        })
    }
}

impl ConnectorSettings for RedisConfig {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Redis
    }
    fn connection_string(&self) -> Option<&str> {
        Some(&self.connection_string)
    }
    fn database_number(&self) -> i64 {
        self.database_number
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoDbConfig {
    pub connection_string: String,
    pub database_name: String,
    pub collection_name: String,
}

impl MongoDbConfig {
    pub fn from_section(section: &ConfigSection) -> ConnectorResult<Self> {
        let kind = ConnectorKind::MongoDb;
        Ok(Self {
            connection_string: section.require(keys::CONNECTION_STRING, kind)?,
            database_name: section.require(keys::DATABASE_NAME, kind)?,
            collection_name: section.require(keys::COLLECTION_NAME, kind)?,
        })
    }
}

impl ConnectorSettings for MongoDbConfig {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::MongoDb
    }
    fn connection_string(&self) -> Option<&str> {
        Some(&self.connection_string)
    }
    fn database_name(&self) -> Option<&str> {
        Some(&self.database_name)
    }
    fn collection_name(&self) -> Option<&str> {
        Some(&self.collection_name)
    }
}

/// LiteDb settings. The connection string is the database file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteDbConfig {
    pub connection_string: String,
    pub collection_name: String,
}

impl LiteDbConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            connection_string: path.into(),
            collection_name: DEFAULT_COLLECTION.to_string(),
        }
    }

    pub fn from_section(section: &ConfigSection) -> ConnectorResult<Self> {
        let kind = ConnectorKind::LiteDb;
        Ok(Self {
            connection_string: section.require(keys::CONNECTION_STRING, kind)?,
            collection_name: section
                .get_owned(keys::COLLECTION_NAME)
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
        })
    }
}

impl ConnectorSettings for LiteDbConfig {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::LiteDb
    }
    fn connection_string(&self) -> Option<&str> {
        Some(&self.connection_string)
    }
    fn collection_name(&self) -> Option<&str> {
        Some(&self.collection_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemcachedConfig {
    pub connection_string: String,
}

impl MemcachedConfig {
    pub fn from_section(section: &ConfigSection) -> ConnectorResult<Self> {
        Ok(Self {
            connection_string: section
                .require(keys::CONNECTION_STRING, ConnectorKind::Memcached)?,
        })
    }
}

impl ConnectorSettings for MemcachedConfig {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Memcached
    }
    fn connection_string(&self) -> Option<&str> {
        Some(&self.connection_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RavenDbConfig {
    pub connection_string: String,
    pub database_name: String,
    pub collection_name: String,
}

impl RavenDbConfig {
    pub fn from_section(section: &ConfigSection) -> ConnectorResult<Self> {
        let kind = ConnectorKind::RavenDb;
        Ok(Self {
            connection_string: section.require(keys::CONNECTION_STRING, kind)?,
            database_name: section.require(keys::DATABASE_NAME, kind)?,
            collection_name: section
                .get_owned(keys::COLLECTION_NAME)
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
        })
    }
}

impl ConnectorSettings for RavenDbConfig {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::RavenDb
    }
    fn connection_string(&self) -> Option<&str> {
        Some(&self.connection_string)
    }
    fn database_name(&self) -> Option<&str> {
        Some(&self.database_name)
    }
    fn collection_name(&self) -> Option<&str> {
        Some(&self.collection_name)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct CouchbaseConfig {
    pub connection_string: String,
    pub bucket_name: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl CouchbaseConfig {
    pub fn from_section(section: &ConfigSection) -> ConnectorResult<Self> {
        let kind = ConnectorKind::Couchbase;
        Ok(Self {
            connection_string: section.require(keys::CONNECTION_STRING, kind)?,
            bucket_name: section.require(keys::BUCKET_NAME, kind)?,
            username: section.get_owned(keys::USERNAME),
            password: section.get_owned(keys::PASSWORD),
        })
    }
}

impl fmt::Debug for CouchbaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CouchbaseConfig")
            .field("connection_string", &self.connection_string)
            .field("bucket_name", &self.bucket_name)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .finish()
    }
}

impl ConnectorSettings for CouchbaseConfig {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Couchbase
    }
    fn connection_string(&self) -> Option<&str> {
        Some(&self.connection_string)
    }
    fn bucket_name(&self) -> Option<&str> {
        Some(&self.bucket_name)
    }
    fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }
    fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct DynamoDbConfig {
    pub table_name: String,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub service_url: Option<String>,
    pub use_http: bool,
}

impl DynamoDbConfig {
    pub fn from_section(section: &ConfigSection) -> ConnectorResult<Self> {
        let kind = ConnectorKind::DynamoDb;
        // Anything other than "true" reads as false.
        let use_http = section
            .get(keys::USE_HTTP)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Ok(Self {
            table_name: section.require(keys::TABLE_NAME, kind)?,
            region: section.require(keys::REGION, kind)?,
            access_key: section.get_owned(keys::ACCESS_KEY),
            secret_key: section.get_owned(keys::SECRET_KEY),
            service_url: section.get_owned(keys::SERVICE_URL),
            use_http,
        })
    }
}

impl fmt::Debug for DynamoDbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamoDbConfig")
            .field("table_name", &self.table_name)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &redacted(&self.secret_key))
            .field("service_url", &self.service_url)
            .field("use_http", &self.use_http)
            .finish()
    }
}

impl ConnectorSettings for DynamoDbConfig {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::DynamoDb
    }
    fn access_key(&self) -> Option<&str> {
        self.access_key.as_deref()
    }
    fn secret_key(&self) -> Option<&str> {
        self.secret_key.as_deref()
    }
    fn region(&self) -> Option<&str> {
        Some(&self.region)
    }
    fn service_url(&self) -> Option<&str> {
        self.service_url.as_deref()
    }
    fn use_http(&self) -> bool {
        self.use_http
    }
    fn table_name(&self) -> Option<&str> {
        Some(&self.table_name)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ArangoDbConfig {
    pub connection_string: String,
    pub database_name: String,
    pub collection_name: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ArangoDbConfig {
    pub fn from_section(section: &ConfigSection) -> ConnectorResult<Self> {
        let kind = ConnectorKind::ArangoDb;
        let connection_string = section.require(keys::CONNECTION_STRING, kind)?;
        if !(connection_string.starts_with("http://") || connection_string.starts_with("https://"))
        {
            return Err(ConnectorError::Config(format!(
                "{kind} connectionstring must be an absolute http(s) URL, got '{connection_string}'"
            )));
        }
        Ok(Self {
            connection_string,
            database_name: section
                .get_owned(keys::DATABASE_NAME)
                .unwrap_or_else(|| DEFAULT_ARANGO_DATABASE.to_string()),
            collection_name: section.require(keys::COLLECTION_NAME, kind)?,
            username: section.get_owned(keys::USERNAME),
            password: section.get_owned(keys::PASSWORD),
        })
    }
}

impl fmt::Debug for ArangoDbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArangoDbConfig")
            .field("connection_string", &self.connection_string)
            .field("database_name", &self.database_name)
            .field("collection_name", &self.collection_name)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .finish()
    }
}

impl ConnectorSettings for ArangoDbConfig {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::ArangoDb
    }
    fn connection_string(&self) -> Option<&str> {
        Some(&self.connection_string)
    }
    fn database_name(&self) -> Option<&str> {
        Some(&self.database_name)
    }
    fn collection_name(&self) -> Option<&str> {
        Some(&self.collection_name)
    }
    fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }
    fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

// ---------------------------------------------------------------------------
// ConnectorConfig
// ---------------------------------------------------------------------------

/// Exactly one backend's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorConfig {
    Redis(RedisConfig),
    MongoDb(MongoDbConfig),
    LiteDb(LiteDbConfig),
    Memcached(MemcachedConfig),
    RavenDb(RavenDbConfig),
    Couchbase(CouchbaseConfig),
    DynamoDb(DynamoDbConfig),
    ArangoDb(ArangoDbConfig),
}

impl ConnectorConfig {
    /// Select the backend named by `Instance` and parse its settings.
    pub fn from_section(section: &ConfigSection) -> ConnectorResult<Self> {
        let config = match section.instance()? {
            ConnectorKind::Redis => Self::Redis(RedisConfig::from_section(section)?),
            ConnectorKind::MongoDb => Self::MongoDb(MongoDbConfig::from_section(section)?),
            ConnectorKind::LiteDb => Self::LiteDb(LiteDbConfig::from_section(section)?),
            ConnectorKind::Memcached => Self::Memcached(MemcachedConfig::from_section(section)?),
            ConnectorKind::RavenDb => Self::RavenDb(RavenDbConfig::from_section(section)?),
            ConnectorKind::Couchbase => Self::Couchbase(CouchbaseConfig::from_section(section)?),
            ConnectorKind::DynamoDb => Self::DynamoDb(DynamoDbConfig::from_section(section)?),
            ConnectorKind::ArangoDb => Self::ArangoDb(ArangoDbConfig::from_section(section)?),
        };
        Ok(config)
    }

    pub fn kind(&self) -> ConnectorKind {
        self.settings().kind()
    }

    pub fn settings(&self) -> &dyn ConnectorSettings {
        match self {
            Self::Redis(c) => c,
            Self::MongoDb(c) => c,
            Self::LiteDb(c) => c,
            Self::Memcached(c) => c,
            Self::RavenDb(c) => c,
            Self::Couchbase(c) => c,
            Self::DynamoDb(c) => c,
            Self::ArangoDb(c) => c,
        }
    }
}
