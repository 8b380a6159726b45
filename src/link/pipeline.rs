use std::{
    sync::{Arc, Mutex, RwLock},
    time::Instant,
};

use crate::{
    live::BroadcastHub,
    store::{local_today, CounterStore, SampleStore},
    telemetry::{decode, PostureClassifier, Sample},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error};

/// Most recent sample seen by the pipeline, readable from any thread.
#[derive(Clone, Default)]
pub struct LatestSample(Arc<RwLock<Option<Sample>>>);

impl LatestSample {
    pub fn get(&self) -> Option<Sample> {
        *self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set(&self, sample: Sample) {
        *self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(sample);
    }
}

/// Posture state shared across engine restarts within one process.
#[derive(Clone, Default)]
pub struct SharedPosture(Arc<Mutex<PostureClassifier>>);

impl SharedPosture {
    pub fn is_slouching(&self) -> bool {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_slouching()
    }
}

/// Everything that happens to one notification buffer. Owned by the link
/// loop, which makes it the only writer of posture state, counters, samples
/// and the latest-sample slot.
pub struct Pipeline {
    posture: SharedPosture,
    samples: SampleStore,
    counters: Option<CounterStore>,
    hub: BroadcastHub,
    latest: LatestSample,
    started_at: Instant,
}

impl Pipeline {
    pub fn new(
        posture: SharedPosture,
        samples: SampleStore,
        counters: Option<CounterStore>,
        hub: BroadcastHub,
        latest: LatestSample,
        started_at: Instant,
    ) -> Self {
        Self {
            posture,
            samples,
            counters,
            hub,
            latest,
            started_at,
        }
    }

    /// Runs one buffer through decode, classify, persist and fan-out.
    /// Returns `None` when the buffer is too short to hold a frame.
    pub async fn process(&mut self, buffer: &[u8]) -> Option<Sample> {
        let Some(axes) = decode(buffer) else {
            log_debug!("dropping {}-byte notification", buffer.len());
            return None;
        };
        let sample = Sample::new(self.started_at.elapsed().as_secs_f64(), axes);

        let classification = self
            .posture
            .0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .observe(&sample);

        if let Some(counters) = &self.counters {
            if let Err(err) = counters
                .apply(classification.counter_deltas(), local_today())
                .await
            {
                log_error!("failed to update posture counters: {err:#}");
            }
        }

        if let Err(err) = self.samples.append(&sample).await {
            log_error!("failed to store sample t={:.2}: {err:#}", sample.t);
        }

        self.latest.set(sample);
        self.hub.publish(&sample);
        Some(sample)
    }
}
