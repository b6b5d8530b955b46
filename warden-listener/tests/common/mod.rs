#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use warden_core::{AccountId, ChannelId};
use warden_listener::ListenerConfig;
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

pub async fn memory_store() -> MetadataStorage {
    MetadataStorage::InMemory(MemoryStore::new().await.expect("create memory store"))
}

/// Short intervals so that fallback reads happen within a test's timeout.
pub fn fast_config(fallback_ms: u64) -> ListenerConfig {
    ListenerConfig {
        fallback_interval: Duration::from_millis(fallback_ms),
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
    }
}

/// Delegates to an in-memory store; reads fail while `reads_failing` is set.
pub struct FlakyStore {
    inner: MetadataStorage,
    reads_failing: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: MetadataStorage) -> Arc<Self> {
        Arc::new(FlakyStore {
            inner,
            reads_failing: AtomicBool::new(false),
        })
    }

    pub fn fail_reads(&self, failing: bool) {
        self.reads_failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), MetadataError> {
        if self.reads_failing.load(Ordering::SeqCst) {
            return Err(MetadataError::TransportError("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for FlakyStore {
    async fn get(&self, key: &str, opts: MetaOptions) -> Result<Option<Value>, MetadataError> {
        self.check()?;
        self.inner.get(key, opts).await
    }

    async fn get_childrens(&self, path: &str) -> Result<Vec<String>, MetadataError> {
        self.check()?;
        self.inner.get_childrens(path).await
    }

    async fn put(&self, key: &str, value: Value, opts: MetaOptions) -> Result<(), MetadataError> {
        self.inner.put(key, value, opts).await
    }

    async fn delete(&self, key: &str) -> Result<(), MetadataError> {
        self.inner.delete(key).await
    }

    async fn watch(&self, prefix: &str) -> Result<WatchStream, MetadataError> {
        self.inner.watch(prefix).await
    }

    async fn get_bulk(&self, prefix: &str) -> Result<Vec<KeyValueVersion>, MetadataError> {
        self.check()?;
        self.inner.get_bulk(prefix).await
    }
}
