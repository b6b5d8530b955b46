mod errors;
pub use errors::{MetadataError, Result};

mod store;
pub use store::{KeyValueVersion, MetaOptions, MetadataStore};

mod watch;
pub use watch::{WatchEvent, WatchStream};

mod providers;
#[cfg(feature = "etcd")]
pub use providers::etcd::EtcdStore;
pub use providers::in_memory::MemoryStore;

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone)]
pub enum MetadataStorage {
    #[cfg(feature = "etcd")]
    Etcd(EtcdStore),
    // single process deployments and tests
    InMemory(MemoryStore),
}

impl MetadataStorage {
    pub fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "etcd")]
            MetadataStorage::Etcd(_) => "etcd",
            MetadataStorage::InMemory(_) => "memory",
        }
    }
}

#[async_trait]
impl MetadataStore for MetadataStorage {
    async fn get(&self, key: &str, get_options: MetaOptions) -> Result<Option<Value>> {
        match self {
            #[cfg(feature = "etcd")]
            MetadataStorage::Etcd(store) => store.get(key, get_options).await,
            MetadataStorage::InMemory(store) => store.get(key, get_options).await,
        }
    }

    async fn get_childrens(&self, path: &str) -> Result<Vec<String>> {
        match self {
            #[cfg(feature = "etcd")]
            MetadataStorage::Etcd(store) => store.get_childrens(path).await,
            MetadataStorage::InMemory(store) => store.get_childrens(path).await,
        }
    }

    async fn put(&self, key: &str, value: Value, put_options: MetaOptions) -> Result<()> {
        match self {
            #[cfg(feature = "etcd")]
            MetadataStorage::Etcd(store) => store.put(key, value, put_options).await,
            MetadataStorage::InMemory(store) => store.put(key, value, put_options).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            #[cfg(feature = "etcd")]
            MetadataStorage::Etcd(store) => store.delete(key).await,
            MetadataStorage::InMemory(store) => store.delete(key).await,
        }
    }

    async fn watch(&self, prefix: &str) -> Result<WatchStream> {
        match self {
            #[cfg(feature = "etcd")]
            MetadataStorage::Etcd(store) => store.watch(prefix).await,
            MetadataStorage::InMemory(store) => store.watch(prefix).await,
        }
    }

    async fn get_bulk(&self, prefix: &str) -> Result<Vec<KeyValueVersion>> {
        match self {
            #[cfg(feature = "etcd")]
            MetadataStorage::Etcd(store) => store.get_bulk(prefix).await,
            MetadataStorage::InMemory(store) => store.get_bulk(prefix).await,
        }
    }
}
