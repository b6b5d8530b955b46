#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use warden_core::paths::BASE_NOTIFY_PATH;
use warden_core::{AccountId, ChannelId};
use warden_coordinator::membership::FileMembershipSource;
use warden_coordinator::rebalance::RebalanceTrigger;
use warden_listener::ListenerConfig;
use warden_load_manager::{LoadManager, WeightParams};
use warden_metadata_store::{
    KeyValueVersion, MemoryStore, MetaOptions, MetadataError, MetadataStorage, MetadataStore,
    WatchStream,
};

pub fn ch(id: i64) -> ChannelId {
    ChannelId::new(id).expect("non-zero channel id")
}

pub fn acc(id: &str) -> AccountId {
    AccountId::new(id).expect("valid account id")
}

pub async fn memory_store() -> Arc<dyn MetadataStore> {
    Arc::new(MetadataStorage::InMemory(
        MemoryStore::new().await.expect("create memory store"),
    ))
}

/// Writes `content` to a fresh roster file.
pub fn roster_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create roster file");
    file.write_all(content.as_bytes()).expect("write roster file");
    file
}

/// Rebalance trigger reading its membership from `roster`.
pub fn trigger(meta_store: Arc<dyn MetadataStore>, roster: &NamedTempFile) -> Arc<RebalanceTrigger> {
    let load_manager = LoadManager::new(meta_store.clone(), WeightParams::default());
    let membership = Arc::new(FileMembershipSource::new(roster.path(), None));
    Arc::new(RebalanceTrigger::new(meta_store, membership, load_manager))
}

pub fn listener_config(fallback: Duration) -> ListenerConfig {
    ListenerConfig {
        fallback_interval: fallback,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
    }
}

/// Store that silently drops every reload signal, as a lossy notification path would.
pub struct DroppingNotifications {
    inner: Arc<dyn MetadataStore>,
    dropped: AtomicUsize,
}

impl DroppingNotifications {
    pub fn new(inner: Arc<dyn MetadataStore>) -> Arc<Self> {
        Arc::new(DroppingNotifications {
            inner,
            dropped: AtomicUsize::new(0),
        })
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataStore for DroppingNotifications {
    async fn get(&self, key: &str, opts: MetaOptions) -> Result<Option<Value>, MetadataError> {
        self.inner.get(key, opts).await
    }

    async fn get_childrens(&self, path: &str) -> Result<Vec<String>, MetadataError> {
        self.inner.get_childrens(path).await
    }

    async fn put(&self, key: &str, value: Value, opts: MetaOptions) -> Result<(), MetadataError> {
        if key.starts_with(BASE_NOTIFY_PATH) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }
        self.inner.put(key, value, opts).await
    }

    async fn delete(&self, key: &str) -> Result<(), MetadataError> {
        self.inner.delete(key).await
    }

    async fn watch(&self, prefix: &str) -> Result<WatchStream, MetadataError> {
        self.inner.watch(prefix).await
    }

    async fn get_bulk(&self, prefix: &str) -> Result<Vec<KeyValueVersion>, MetadataError> {
        self.inner.get_bulk(prefix).await
    }
}
