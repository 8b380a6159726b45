//! Stand-in peer used when no wireless driver is available.
//!
//! Produces a bounded random walk over all six axes and hands it to the
//! pipeline as offset-binary frames, exactly like the real device would.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::telemetry::{encode, Axes};

use super::peer::{LinkKind, PeerLink, Subscription};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

const SYNTHETIC_PEER: &str = "synthetic";
const ACCEL_STEP: i16 = 3;
const GYRO_STEP: i16 = 2;
const FRAME_QUEUE: usize = 64;

/// Six-axis random walk clamped to the signed byte range.
#[derive(Debug, Default, Clone)]
pub struct RandomWalk {
    values: [i16; 6],
}

impl RandomWalk {
    pub fn step<R: Rng>(&mut self, rng: &mut R) -> Axes {
        for (idx, value) in self.values.iter_mut().enumerate() {
            let bound = if idx < 3 { ACCEL_STEP } else { GYRO_STEP };
            *value = (*value + rng.gen_range(-bound..=bound))
                .clamp(i16::from(i8::MIN), i16::from(i8::MAX));
        }
        let [ax, ay, az, gx, gy, gz] = self.values.map(|v| v as i8);
        Axes {
            ax,
            ay,
            az,
            gx,
            gy,
            gz,
        }
    }
}

pub struct SyntheticLink {
    interval: Duration,
    generator: Option<CancellationToken>,
}

impl SyntheticLink {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            generator: None,
        }
    }
}

#[async_trait]
impl PeerLink for SyntheticLink {
    fn kind(&self) -> LinkKind {
        LinkKind::Synthetic
    }

    async fn discover(&mut self, _device_name: &str) -> Result<Option<String>> {
        Ok(Some(SYNTHETIC_PEER.to_string()))
    }

    async fn subscribe(&mut self, _peer: &str) -> Result<Subscription> {
        if let Some(previous) = self.generator.take() {
            previous.cancel();
        }

        let (tx, rx) = mpsc::channel(FRAME_QUEUE);
        let stop = CancellationToken::new();
        let stop_for_task = stop.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut walk = RandomWalk::default();
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_for_task.cancelled() => break,
                    _ = ticker.tick() => {
                        let frame = encode(&walk.step(&mut rng));
                        if tx.send(frame.to_vec()).await.is_err() {
                            break;
                        }
                    }
                }
            }
            log_debug!("synthetic generator stopped");
        });

        log_info!(
            "synthetic generator running at one sample every {}ms",
            interval.as_millis()
        );
        self.generator = Some(stop);

        Ok(Subscription {
            buffers: rx,
            disconnected: CancellationToken::new(),
        })
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        if let Some(generator) = self.generator.take() {
            generator.cancel();
        }
        Ok(())
    }
}
