use crate::{
    errors::Result,
    store::{KeyValueVersion, MetaOptions, MetadataStore},
    watch::WatchStream,
    MetadataError,
};

use async_trait::async_trait;
use etcd_client::{Client, GetOptions, WatchOptions};
use serde_json::{Map, Value};
use tracing::debug;

impl From<etcd_client::Error> for MetadataError {
    fn from(err: etcd_client::Error) -> Self {
        MetadataError::StorageError(Box::new(err))
    }
}

/// etcd backed store, shared by the coordinator and listeners running on other hosts.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl std::fmt::Debug for EtcdStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdStore").finish_non_exhaustive()
    }
}

impl EtcdStore {
    pub async fn new(addr: String) -> Result<Self> {
        let client = Client::connect([addr.as_str()], None).await?;
        debug!(endpoint = %addr, "connected to etcd");
        Ok(EtcdStore { client })
    }
}

#[async_trait]
impl MetadataStore for EtcdStore {
    async fn get(&self, key: &str, get_options: MetaOptions) -> Result<Option<Value>> {
        let mut client = self.client.clone();

        if get_options == MetaOptions::WithPrefix {
            let response = client
                .get(key, Some(GetOptions::new().with_prefix()))
                .await?;
            if response.kvs().is_empty() {
                return Ok(None);
            }
            let mut object = Map::new();
            for kv in response.kvs() {
                let k = String::from_utf8_lossy(kv.key()).to_string();
                object.insert(k, serde_json::from_slice(kv.value())?);
            }
            return Ok(Some(Value::Object(object)));
        }

        let response = client.get(key, None).await?;
        match response.kvs().first() {
            Some(kv) => Ok(Some(serde_json::from_slice(kv.value())?)),
            None => Ok(None),
        }
    }

    async fn get_childrens(&self, path: &str) -> Result<Vec<String>> {
        let mut client = self.client.clone();
        let prefix = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{}/", path)
        };

        let response = client
            .get(
                prefix.as_str(),
                Some(GetOptions::new().with_prefix().with_keys_only()),
            )
            .await?;

        Ok(response
            .kvs()
            .iter()
            .map(|kv| String::from_utf8_lossy(kv.key()).to_string())
            .collect())
    }

    async fn put(&self, key: &str, value: Value, _put_options: MetaOptions) -> Result<()> {
        let mut client = self.client.clone();
        let bytes = serde_json::to_vec(&value)?;
        client.put(key, bytes, None).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut client = self.client.clone();
        client.delete(key, None).await?;
        Ok(())
    }

    async fn watch(&self, prefix: &str) -> Result<WatchStream> {
        let mut client = self.client.clone();
        let (watcher, stream) = client
            .watch(prefix, Some(WatchOptions::new().with_prefix()))
            .await?;
        Ok(WatchStream::from_etcd(watcher, stream))
    }

    async fn get_bulk(&self, prefix: &str) -> Result<Vec<KeyValueVersion>> {
        let mut client = self.client.clone();
        let response = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;

        Ok(response
            .kvs()
            .iter()
            .map(|kv| KeyValueVersion {
                key: String::from_utf8_lossy(kv.key()).to_string(),
                value: kv.value().to_vec(),
                version: kv.version(),
            })
            .collect())
    }
}
