//! BLE central link built on `btleplug`.
//!
//! Scans for a peripheral advertising the configured local name, subscribes
//! to the sensor characteristic and bridges the adapter's disconnect event
//! into the subscription's `disconnected` token.

use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use btleplug::api::{
    bleuuid::uuid_from_u16, Central, CentralEvent, Characteristic, Manager as _,
    Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::peer::{LinkKind, PeerLink, Subscription};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Characteristic carrying the six-byte sensor frames (service 0x1815).
const CHAR_UUID_16: u16 = 0x2A58;
const SCAN_WINDOW: Duration = Duration::from_secs(2);
const FRAME_QUEUE: usize = 256;

struct ActiveSession {
    peripheral: Peripheral,
    characteristic: Characteristic,
    pump: CancellationToken,
}

pub struct BleLink {
    adapter: Adapter,
    found: Option<Peripheral>,
    session: Option<ActiveSession>,
}

impl BleLink {
    /// Returns `Ok(None)` when the platform has no usable Bluetooth adapter.
    pub async fn first_adapter() -> Result<Option<Self>> {
        let manager = Manager::new()
            .await
            .context("failed to initialize BLE manager")?;
        let adapter = manager
            .adapters()
            .await
            .context("failed to list BLE adapters")?
            .into_iter()
            .next();

        Ok(adapter.map(|adapter| Self {
            adapter,
            found: None,
            session: None,
        }))
    }
}

/// Awaits `setup`; if it fails, awaits `teardown` before returning the setup
/// error. A teardown failure is logged and otherwise ignored.
async fn or_teardown<T, S, D>(setup: S, teardown: D) -> Result<T>
where
    S: Future<Output = Result<T>>,
    D: Future<Output = Result<()>>,
{
    match setup.await {
        Ok(value) => Ok(value),
        Err(err) => {
            if let Err(cleanup) = teardown.await {
                log_warn!("cleanup after failed setup also failed: {cleanup:#}");
            }
            Err(err)
        }
    }
}

#[async_trait]
impl PeerLink for BleLink {
    fn kind(&self) -> LinkKind {
        LinkKind::Driver
    }

    async fn discover(&mut self, device_name: &str) -> Result<Option<String>> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .context("failed to start BLE scan")?;
        tokio::time::sleep(SCAN_WINDOW).await;

        let peripherals = self.adapter.peripherals().await?;
        let mut matched = None;
        for peripheral in peripherals {
            let name = peripheral
                .properties()
                .await?
                .and_then(|props| props.local_name);
            if name.as_deref() == Some(device_name) {
                matched = Some(peripheral);
                break;
            }
        }

        if let Err(err) = self.adapter.stop_scan().await {
            log_debug!("stop_scan failed: {err}");
        }

        let id = matched.as_ref().map(|p| format!("{:?}", p.id()));
        self.found = matched;
        Ok(id)
    }

    async fn subscribe(&mut self, peer: &str) -> Result<Subscription> {
        let peripheral = self
            .found
            .take()
            .ok_or_else(|| anyhow!("peer {peer} was not discovered"))?;

        let mut events = self
            .adapter
            .events()
            .await
            .context("failed to open BLE adapter events")?;
        peripheral.connect().await.context("BLE connect failed")?;

        let wanted = uuid_from_u16(CHAR_UUID_16);
        let setup = async {
            peripheral
                .discover_services()
                .await
                .context("BLE service discovery failed")?;

            let characteristic = peripheral
                .characteristics()
                .into_iter()
                .find(|c| c.uuid == wanted)
                .ok_or_else(|| anyhow!("peer {peer} does not expose the sensor characteristic"))?;

            peripheral
                .subscribe(&characteristic)
                .await
                .context("BLE subscribe failed")?;
            let notifications = peripheral.notifications().await?;
            Ok::<_, anyhow::Error>((characteristic, notifications))
        };
        let teardown = async {
            peripheral
                .disconnect()
                .await
                .context("BLE disconnect failed")
        };
        let (characteristic, mut notifications) = or_teardown(setup, teardown).await?;

        let (tx, rx) = mpsc::channel(FRAME_QUEUE);
        let disconnected = CancellationToken::new();
        let pump = CancellationToken::new();
        let peripheral_id = peripheral.id();

        {
            let disconnected = disconnected.clone();
            let pump = pump.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = pump.cancelled() => break,
                        notification = notifications.next() => match notification {
                            Some(value) if value.uuid == wanted => {
                                if tx.send(value.value).await.is_err() {
                                    break;
                                }
                            }
                            Some(_) => {}
                            None => {
                                disconnected.cancel();
                                break;
                            }
                        },
                        event = events.next() => match event {
                            Some(CentralEvent::DeviceDisconnected(id)) if id == peripheral_id => {
                                disconnected.cancel();
                                break;
                            }
                            Some(_) => {}
                            None => {
                                disconnected.cancel();
                                break;
                            }
                        },
                    }
                }
            });
        }

        log_info!("subscribed to sensor notifications on {peer}");
        self.session = Some(ActiveSession {
            peripheral,
            characteristic,
            pump,
        });

        Ok(Subscription {
            buffers: rx,
            disconnected,
        })
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        session.pump.cancel();

        if let Err(err) = session.peripheral.unsubscribe(&session.characteristic).await {
            log_warn!("BLE unsubscribe failed: {err}");
        }
        session
            .peripheral
            .disconnect()
            .await
            .context("BLE disconnect failed")
    }
}
