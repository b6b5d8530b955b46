use futures::stream::Stream;
use futures::StreamExt;
use std::task::{Context, Poll};
use std::{fmt, pin::Pin};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::errors::{MetadataError, Result};

#[derive(Debug, Clone)]
pub enum WatchEvent {
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
        mod_revision: Option<i64>,
        version: Option<i64>,
    },
    Delete {
        key: Vec<u8>,
        mod_revision: Option<i64>,
        version: Option<i64>,
    },
}

impl WatchEvent {
    pub fn key(&self) -> &[u8] {
        match self {
            WatchEvent::Put { key, .. } | WatchEvent::Delete { key, .. } => key,
        }
    }
}

pub struct WatchStream {
    inner: Pin<Box<dyn Stream<Item = Result<WatchEvent>> + Send>>,
}

impl Stream for WatchStream {
    type Item = Result<WatchEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for WatchStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchStream").finish_non_exhaustive()
    }
}

impl WatchStream {
    pub fn new(stream: impl Stream<Item = Result<WatchEvent>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Create a WatchStream from a `tokio::sync::broadcast::Receiver`.
    /// Broadcast lag (slow consumer) is surfaced as `MetadataError::WatchError`.
    pub fn from_broadcast(rx: broadcast::Receiver<WatchEvent>) -> Self {
        let stream = BroadcastStream::new(rx).filter_map(|result| {
            futures::future::ready(match result {
                Ok(event) => Some(Ok(event)),
                Err(BroadcastStreamRecvError::Lagged(n)) => Some(Err(MetadataError::WatchError(
                    format!("watch lagged by {} events, consumer should resync", n),
                ))),
            })
        });
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Adapt an etcd watch. The `Watcher` is carried along with the stream so the
    /// server-side watch stays open for as long as the consumer polls it.
    #[cfg(feature = "etcd")]
    pub(crate) fn from_etcd(
        watcher: etcd_client::Watcher,
        stream: etcd_client::WatchStream,
    ) -> Self {
        use etcd_client::EventType;

        let stream = futures::stream::unfold(
            Some((watcher, stream)),
            |state| async move {
                let (watcher, mut stream) = state?;
                match stream.message().await {
                    Ok(Some(response)) => {
                        let events: Vec<Result<WatchEvent>> = response
                            .events()
                            .iter()
                            .filter_map(|event| {
                                let kv = event.kv()?;
                                let converted = match event.event_type() {
                                    EventType::Put => WatchEvent::Put {
                                        key: kv.key().to_vec(),
                                        value: kv.value().to_vec(),
                                        mod_revision: Some(kv.mod_revision()),
                                        version: Some(kv.version()),
                                    },
                                    EventType::Delete => WatchEvent::Delete {
                                        key: kv.key().to_vec(),
                                        mod_revision: Some(kv.mod_revision()),
                                        version: Some(kv.version()),
                                    },
                                };
                                Some(Ok(converted))
                            })
                            .collect();
                        Some((futures::stream::iter(events), Some((watcher, stream))))
                    }
                    Ok(None) => None,
                    // surface the error once, then end the stream so the consumer re-watches
                    Err(e) => Some((
                        futures::stream::iter(vec![Err(MetadataError::from(e))]),
                        None,
                    )),
                }
            },
        )
        .flatten();

        Self {
            inner: Box::pin(stream),
        }
    }
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, key, mod_revision, version) = match self {
            WatchEvent::Put {
                key,
                mod_revision,
                version,
                ..
            } => ("Put", key, mod_revision, version),
            WatchEvent::Delete {
                key,
                mod_revision,
                version,
            } => ("Delete", key, mod_revision, version),
        };
        write!(f, "{}(key: {}", kind, String::from_utf8_lossy(key))?;
        if let Some(rev) = mod_revision {
            write!(f, ", mod_revision: {}", rev)?;
        }
        if let Some(ver) = version {
            write!(f, ", version: {}", ver)?;
        }
        write!(f, ")")
    }
}
