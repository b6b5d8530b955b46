#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use warden_core::{AccountId, ChannelId};
use warden_metadata_store::{
    KeyValueVersion, MemoryStore, MetaOptions, MetadataError, MetadataStorage, MetadataStore,
    WatchStream,
};

/// Creates an in-memory metadata store shared through the trait object.
pub async fn memory_store() -> Arc<dyn MetadataStore> {
    let store = MemoryStore::new().await.expect("create memory store");
    Arc::new(MetadataStorage::InMemory(store))
}

pub fn ch(id: i64) -> ChannelId {
    ChannelId::new(id).expect("non-zero channel id")
}

pub fn acc(id: &str) -> AccountId {
    AccountId::new(id).expect("valid account id")
}

/// Store whose every operation fails, standing in for an unreachable backend.
pub struct FailingStore;

fn unavailable() -> MetadataError {
    MetadataError::TransportError("store unavailable".to_string())
}

#[async_trait]
impl MetadataStore for FailingStore {
    async fn get(&self, _key: &str, _opts: MetaOptions) -> Result<Option<Value>, MetadataError> {
        Err(unavailable())
    }

    async fn get_childrens(&self, _path: &str) -> Result<Vec<String>, MetadataError> {
        Err(unavailable())
    }

    async fn put(&self, _key: &str, _value: Value, _opts: MetaOptions) -> Result<(), MetadataError> {
        Err(unavailable())
    }

    async fn delete(&self, _key: &str) -> Result<(), MetadataError> {
        Err(unavailable())
    }

    async fn watch(&self, _prefix: &str) -> Result<WatchStream, MetadataError> {
        Err(unavailable())
    }

    async fn get_bulk(&self, _prefix: &str) -> Result<Vec<KeyValueVersion>, MetadataError> {
        Err(unavailable())
    }
}
