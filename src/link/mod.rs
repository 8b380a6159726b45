#[cfg(feature = "ble")]
mod ble;
mod controller;
mod manager;
mod peer;
mod pipeline;
mod synthetic;

use async_trait::async_trait;
use log::info;

use crate::settings::LinkTiming;

pub use controller::LinkController;
pub use manager::{link_loop, LinkState};
pub use peer::{LinkKind, LinkProvider, PeerLink, Subscription};
pub use pipeline::{LatestSample, Pipeline, SharedPosture};
pub use synthetic::SyntheticLink;

/// Opens the BLE driver once per start and falls back to the synthetic
/// generator when it is unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultLinkProvider;

#[async_trait]
impl LinkProvider for DefaultLinkProvider {
    async fn open(&self, timing: &LinkTiming) -> Box<dyn PeerLink> {
        #[cfg(feature = "ble")]
        match ble::BleLink::first_adapter().await {
            Ok(Some(link)) => return Box::new(link),
            Ok(None) => info!("No Bluetooth adapter found"),
            Err(err) => log::warn!("Bluetooth driver unavailable: {err:#}"),
        }

        info!("Running in simulation mode");
        Box::new(SyntheticLink::new(timing.synthetic_interval()))
    }
}

/// Always hands out the synthetic generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticProvider;

#[async_trait]
impl LinkProvider for SyntheticProvider {
    async fn open(&self, timing: &LinkTiming) -> Box<dyn PeerLink> {
        Box::new(SyntheticLink::new(timing.synthetic_interval()))
    }
}
