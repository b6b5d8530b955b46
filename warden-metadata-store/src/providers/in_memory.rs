use crate::{
    errors::Result,
    store::{KeyValueVersion, MetaOptions, MetadataStore},
    watch::{WatchEvent, WatchStream},
    MetadataError,
};

use async_trait::async_trait;
use dashmap::{mapref::one::RefMut, DashMap};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

const WATCH_CHANNEL_CAPACITY: usize = 256;

/// MemoryStore is an in-process key-value store implementing the MetadataStore trait.
///
/// Used by tests and by single-process deployments where the coordinator and the
/// listeners share one address space. Keys are grouped into maps by their first
/// two path segments (`/warden/assignment`, `/warden/notify`, ...).
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, BTreeMap<String, Value>>>,
    watchers: Arc<DashMap<String, broadcast::Sender<WatchEvent>>>,
}

impl MemoryStore {
    pub async fn new() -> Result<Self> {
        Ok(MemoryStore {
            inner: Arc::new(DashMap::new()),
            watchers: Arc::new(DashMap::new()),
        })
    }

    fn notify_watchers(&self, event: WatchEvent) {
        let key_str = String::from_utf8_lossy(event.key()).to_string();
        for entry in self.watchers.iter() {
            if key_str.starts_with(entry.key().as_str()) {
                // no receivers left is not an error, the next watch() resubscribes
                let _ = entry.value().send(event.clone());
            }
        }
    }

    fn split_path(path: &str) -> Result<(String, String)> {
        let parts: Vec<&str> = path.split('/').take(3).collect();

        // empty, root, category
        if parts.len() < 3 {
            return Err(MetadataError::InvalidArguments(format!(
                "Path must have at least 3 segments: {}",
                path
            )));
        }

        let map_key = parts.join("/");
        let key = path.split('/').skip(3).collect::<Vec<&str>>().join("/");
        Ok((map_key, key))
    }

    fn get_map(&self, map_key: &str) -> RefMut<'_, String, BTreeMap<String, Value>> {
        self.inner.entry(map_key.to_owned()).or_default()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    // Read the value of one key, or of every key under a prefix
    async fn get(&self, path: &str, get_options: MetaOptions) -> Result<Option<Value>> {
        if get_options == MetaOptions::WithPrefix {
            let entries = self.get_bulk(path).await?;
            if entries.is_empty() {
                return Ok(None);
            }
            let mut object = Map::new();
            for entry in entries {
                object.insert(entry.key, serde_json::from_slice(&entry.value)?);
            }
            return Ok(Some(Value::Object(object)));
        }

        let (map_key, key) = Self::split_path(path)?;
        Ok(self
            .inner
            .get(&map_key)
            .and_then(|bmap| bmap.get(&key).cloned()))
    }

    // Return all the paths that are children to the specific path.
    // Returns full paths to match etcd behavior.
    async fn get_childrens(&self, path: &str) -> Result<Vec<String>> {
        let (map_key, minimum_path) = Self::split_path(path)?;

        let mut child_paths = Vec::new();
        if let Some(bmap_ref) = self.inner.get(&map_key) {
            for key in bmap_ref.keys() {
                let is_child = if minimum_path.is_empty() {
                    true
                } else {
                    key.len() > minimum_path.len()
                        && key.starts_with(&minimum_path)
                        && key[minimum_path.len()..].starts_with('/')
                };
                if is_child {
                    child_paths.push(format!("{}/{}", map_key, key));
                }
            }
        }
        Ok(child_paths)
    }

    async fn put(&self, path: &str, value: Value, _put_options: MetaOptions) -> Result<()> {
        let (map_key, key) = Self::split_path(path)?;

        if key.is_empty() {
            return Err(MetadataError::InvalidArguments(format!(
                "Path must have a key component: {}",
                path
            )));
        }

        let value_bytes = serde_json::to_vec(&value)?;
        {
            let mut bmap = self.get_map(&map_key);
            bmap.insert(key, value);
        }

        self.notify_watchers(WatchEvent::Put {
            key: path.as_bytes().to_vec(),
            value: value_bytes,
            mod_revision: None,
            version: None,
        });

        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let (map_key, key) = Self::split_path(path)?;

        if key.is_empty() {
            return Err(MetadataError::InvalidArguments(format!(
                "Path must have a key component: {}",
                path
            )));
        }

        let removed = {
            let mut bmap = self.get_map(&map_key);
            bmap.remove(&key)
        };

        if removed.is_some() {
            self.notify_watchers(WatchEvent::Delete {
                key: path.as_bytes().to_vec(),
                mod_revision: None,
                version: None,
            });
        }

        Ok(())
    }

    async fn watch(&self, prefix: &str) -> Result<WatchStream> {
        let rx = self
            .watchers
            .entry(prefix.to_string())
            .or_insert_with(|| broadcast::channel(WATCH_CHANNEL_CAPACITY).0)
            .subscribe();
        debug!(prefix, "watcher registered on the in-memory store");
        Ok(WatchStream::from_broadcast(rx))
    }

    async fn get_bulk(&self, prefix: &str) -> Result<Vec<KeyValueVersion>> {
        let (map_key, suffix) = Self::split_path(prefix)?;

        let mut out: Vec<KeyValueVersion> = Vec::new();
        if let Some(bmap_ref) = self.inner.get(&map_key) {
            for (k, v) in bmap_ref.iter() {
                if k.starts_with(&suffix) {
                    out.push(KeyValueVersion {
                        key: format!("{}/{}", map_key, k),
                        value: serde_json::to_vec(v)?,
                        // in-memory backend doesn't track versions
                        version: 0,
                    });
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;
    use std::time::Duration;

    /// Tests basic CRUD operations: put, get, and delete
    /// Purpose: Validates core store functionality with valid paths
    /// Expected: Successful storage, retrieval, and removal of key-value pairs
    #[tokio::test]
    async fn test_put_get_delete() -> Result<()> {
        let store = MemoryStore::new().await?;
        let path = "/warden/assignment/current";
        let value = json!({"version": 3});

        store.put(path, value.clone(), MetaOptions::None).await?;
        assert_eq!(store.get(path, MetaOptions::None).await?, Some(value));

        store.delete(path).await?;
        assert!(matches!(store.get(path, MetaOptions::None).await, Ok(None)));

        Ok(())
    }

    /// Tests retrieval of non-existent keys
    /// Purpose: Ensures proper None return for missing keys, without creating maps
    /// Expected: Returns Ok(None) without errors for unknown keys
    #[tokio::test]
    async fn test_get_nonexistent_key() -> Result<()> {
        let store = MemoryStore::new().await?;
        let result = store
            .get("/warden/accounts/load/unknown", MetaOptions::None)
            .await?;
        assert_eq!(result, None);
        Ok(())
    }

    /// Tests error handling for invalid path formats
    /// Purpose: Validates path validation and error reporting
    /// Expected: Returns error for paths missing required segments
    #[tokio::test]
    async fn test_put_invalid_path() -> Result<()> {
        let store = MemoryStore::new().await?;

        let result = store.put("/warden", json!(1), MetaOptions::None).await;
        assert!(result.is_err());

        let result = store
            .put("/warden/assignment", json!(1), MetaOptions::None)
            .await;
        assert!(result.is_err());

        Ok(())
    }

    /// Tests child path discovery and prefix reads
    /// Purpose: Validates hierarchical path traversal and filtering
    /// Expected: Returns full child paths under the prefix, excludes unrelated paths
    #[tokio::test]
    async fn test_get_childrens_and_prefix_get() -> Result<()> {
        let store = MemoryStore::new().await?;
        store
            .put("/warden/accounts/load/acc1", json!({"events_per_minute": 1.0}), MetaOptions::None)
            .await?;
        store
            .put("/warden/accounts/load/acc2", json!({"events_per_minute": 2.0}), MetaOptions::None)
            .await?;
        store
            .put("/warden/accounts/other/acc3", json!(null), MetaOptions::None)
            .await?;

        let mut paths = store.get_childrens("/warden/accounts/load").await?;
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "/warden/accounts/load/acc1".to_string(),
                "/warden/accounts/load/acc2".to_string()
            ]
        );

        let all = store
            .get("/warden/accounts/load/", MetaOptions::WithPrefix)
            .await?
            .unwrap();
        assert_eq!(all.as_object().map(|o| o.len()), Some(2));

        assert!(store.get_childrens("/non/existent/path").await?.is_empty());
        Ok(())
    }

    /// Tests that several watchers on the same prefix all receive events
    /// Purpose: Each listener subscribes independently to its notification topic
    /// Expected: Both streams observe the put; an unrelated prefix observes nothing
    #[tokio::test]
    async fn test_watch_fan_out() -> Result<()> {
        let store = MemoryStore::new().await?;
        let mut first = store.watch("/warden/notify/acc1").await?;
        let mut second = store.watch("/warden/notify/acc1").await?;
        let mut other = store.watch("/warden/notify/acc2").await?;

        store
            .put("/warden/notify/acc1", json!({"signal": "reload"}), MetaOptions::None)
            .await?;

        for stream in [&mut first, &mut second] {
            let event = tokio::time::timeout(Duration::from_secs(1), stream.next())
                .await
                .expect("event delivered")
                .expect("stream open")?;
            assert_eq!(event.key(), b"/warden/notify/acc1");
        }

        let nothing = tokio::time::timeout(Duration::from_millis(50), other.next()).await;
        assert!(nothing.is_err());
        Ok(())
    }

    /// Tests get_bulk API for in-memory backend
    /// Purpose: Ensures MemoryStore::get_bulk returns full paths and serialized values like etcd
    /// Expected: Returns all keys under the given prefix with JSON-serialized values
    #[tokio::test]
    async fn test_get_bulk() -> Result<()> {
        let store = MemoryStore::new().await?;
        store
            .put("/warden/rebalance/history/1", json!({"version": 1}), MetaOptions::None)
            .await?;
        store
            .put("/warden/rebalance/history/2", json!({"version": 2}), MetaOptions::None)
            .await?;

        let kvs = store.get_bulk("/warden/rebalance/history/").await?;
        assert_eq!(kvs.len(), 2);
        for kv in kvs {
            let value: Value = serde_json::from_slice(&kv.value)?;
            assert!(value.get("version").is_some());
        }
        Ok(())
    }
}
