use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::settings::LinkTiming;

use super::peer::{PeerLink, Subscription};
use super::pipeline::Pipeline;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Where the connection loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkState {
    Idle,
    Scanning,
    Connected,
    Stopped,
}

enum SessionEnd {
    Stopped,
    Disconnected,
}

/// Scan, subscribe, stream, reconnect. Runs until `cancel` fires.
///
/// An absent peer waits `scan_retry` before the next scan. A failed scan or
/// subscribe and an unexpected disconnect all wait `reconnect_delay`. None of
/// these end the loop.
pub async fn link_loop(
    mut link: Box<dyn PeerLink>,
    device_name: String,
    mut pipeline: Pipeline,
    timing: LinkTiming,
    cancel: CancellationToken,
    state: watch::Sender<LinkState>,
) {
    log_info!("link loop started for {device_name} ({:?})", link.kind());

    loop {
        if cancel.is_cancelled() {
            break;
        }
        state.send_replace(LinkState::Scanning);

        let discovered = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = link.discover(&device_name) => result,
        };

        let peer = match discovered {
            Ok(Some(peer)) => peer,
            Ok(None) => {
                log_debug!(
                    "{device_name} not found, scanning again in {}ms",
                    timing.scan_retry().as_millis()
                );
                if !pause(&cancel, timing.scan_retry()).await {
                    break;
                }
                continue;
            }
            Err(err) => {
                log_warn!("scan for {device_name} failed: {err:#}");
                if !pause(&cancel, timing.reconnect_delay()).await {
                    break;
                }
                continue;
            }
        };

        let subscribed = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = link.subscribe(&peer) => result,
        };

        let subscription = match subscribed {
            Ok(subscription) => subscription,
            Err(err) => {
                log_warn!("connect/subscribe to {peer} failed: {err:#}");
                release(link.as_mut()).await;
                if !pause(&cancel, timing.reconnect_delay()).await {
                    break;
                }
                continue;
            }
        };

        state.send_replace(LinkState::Connected);
        log_info!("streaming from {peer}");

        match run_session(subscription, &mut pipeline, &cancel).await {
            SessionEnd::Stopped => break,
            SessionEnd::Disconnected => {
                log_warn!(
                    "{peer} disconnected, reconnecting in {}ms",
                    timing.reconnect_delay().as_millis()
                );
                release(link.as_mut()).await;
                state.send_replace(LinkState::Scanning);
                if !pause(&cancel, timing.reconnect_delay()).await {
                    break;
                }
            }
        }
    }

    release(link.as_mut()).await;
    state.send_replace(LinkState::Stopped);
    log_info!("link loop stopped");
}

/// Feeds buffers through the pipeline one at a time until stop or disconnect.
/// A closed buffer channel counts as a disconnect.
async fn run_session(
    subscription: Subscription,
    pipeline: &mut Pipeline,
    cancel: &CancellationToken,
) -> SessionEnd {
    let Subscription {
        mut buffers,
        disconnected,
    } = subscription;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionEnd::Stopped,
            _ = disconnected.cancelled() => return SessionEnd::Disconnected,
            buffer = buffers.recv() => match buffer {
                Some(buffer) => {
                    pipeline.process(&buffer).await;
                }
                None => return SessionEnd::Disconnected,
            },
        }
    }
}

async fn release(link: &mut dyn PeerLink) {
    if let Err(err) = link.unsubscribe().await {
        log_debug!("unsubscribe failed: {err:#}");
    }
}

/// Sleeps for `delay` unless cancelled first. Returns false on cancel.
async fn pause(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
