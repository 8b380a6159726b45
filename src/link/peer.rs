use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::settings::LinkTiming;

/// Which kind of peer link is feeding the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkKind {
    Driver,
    Synthetic,
}

/// A live notification subscription on a connected peer.
///
/// The session ends when `disconnected` fires or when the sending half of
/// `buffers` is dropped by the link.
pub struct Subscription {
    pub buffers: mpsc::Receiver<Vec<u8>>,
    pub disconnected: CancellationToken,
}

/// Capability to find one named peer and stream its telemetry characteristic.
#[async_trait]
pub trait PeerLink: Send {
    fn kind(&self) -> LinkKind;

    /// `Ok(None)` means the peer is not visible right now.
    async fn discover(&mut self, device_name: &str) -> Result<Option<String>>;

    /// Connects to the peer returned by the last successful `discover` and
    /// subscribes to notifications.
    async fn subscribe(&mut self, peer: &str) -> Result<Subscription>;

    /// Best-effort teardown of the current subscription.
    async fn unsubscribe(&mut self) -> Result<()>;
}

/// Chooses the link for a newly started engine loop.
#[async_trait]
pub trait LinkProvider: Send + Sync {
    async fn open(&self, timing: &LinkTiming) -> Box<dyn PeerLink>;
}
