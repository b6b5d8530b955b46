use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;
use crate::watch::WatchStream;

/// A key-value-version tuple returned by bulk queries.
#[derive(Debug, Clone)]
pub struct KeyValueVersion {
    pub key: String,
    pub value: Vec<u8>,
    pub version: i64,
}

/// Backend-agnostic options for metadata store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaOptions {
    None,
    /// Treat the key as a prefix and return all matching entries as a JSON object.
    WithPrefix,
}

/// Key/value store shared by the coordinator and the account listeners.
///
/// Every `put` replaces the value of a single key atomically: a concurrent `get`
/// observes either the previous or the new value, never a partial one.
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    async fn get(&self, key: &str, get_options: MetaOptions) -> Result<Option<Value>>;
    async fn get_childrens(&self, path: &str) -> Result<Vec<String>>;
    async fn put(&self, key: &str, value: Value, put_options: MetaOptions) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;

    /// Subscribe to every put/delete under `prefix`.
    ///
    /// Delivery is at-most-once: a lagging or disconnected watcher loses events and
    /// must resynchronise by reading the keys it cares about.
    async fn watch(&self, prefix: &str) -> Result<WatchStream>;

    /// Retrieve all key-value pairs under a given prefix.
    async fn get_bulk(&self, prefix: &str) -> Result<Vec<KeyValueVersion>>;
}
