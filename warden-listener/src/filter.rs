use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;
use warden_core::ChannelId;

/// The channel set an account may act on, as of one assignment version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedChannels {
    /// `None` until the first successful read.
    pub version: Option<u64>,
    pub channels: BTreeSet<ChannelId>,
}

/// Cheap, cloneable read handle on the listener's current allowed set.
///
/// Lookups never wait on I/O: they borrow the last set swapped in by the
/// listener. Each lookup sees one whole set, the previous or the new one.
#[derive(Debug, Clone)]
pub struct ChannelFilter {
    rx: watch::Receiver<Arc<AllowedChannels>>,
}

impl ChannelFilter {
    pub(crate) fn new(rx: watch::Receiver<Arc<AllowedChannels>>) -> Self {
        ChannelFilter { rx }
    }

    pub fn is_allowed(&self, channel_id: ChannelId) -> bool {
        self.rx.borrow().channels.contains(&channel_id)
    }

    /// The full current set, for callers that filter a batch against one version.
    pub fn current(&self) -> Arc<AllowedChannels> {
        self.rx.borrow().clone()
    }

    pub fn allowed_count(&self) -> usize {
        self.rx.borrow().channels.len()
    }

    pub fn version(&self) -> Option<u64> {
        self.rx.borrow().version
    }

    /// Resolves once a set with a version of at least `version` has been applied.
    pub async fn wait_for_version(&mut self, version: u64) -> bool {
        self.rx
            .wait_for(|allowed| allowed.version.is_some_and(|v| v >= version))
            .await
            .is_ok()
    }
}
