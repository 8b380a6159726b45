//! Live fan-out of samples to any number of listeners.
//!
//! Each listener owns a bounded queue. Publishing never waits: a full queue
//! loses that sample for that listener only, and a listener whose receiving
//! side has gone away is dropped from the registry on the next publish.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use log::debug;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::telemetry::Sample;

pub const DEFAULT_LISTENER_CAPACITY: usize = 100;

pub type ListenerId = Uuid;

/// Receiving end handed to a live consumer.
pub struct Listener {
    id: ListenerId,
    receiver: mpsc::Receiver<Sample>,
}

impl Listener {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Waits for the next sample; `None` once the listener is unregistered
    /// and its queue drained.
    pub async fn recv(&mut self) -> Option<Sample> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Sample> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
    pub closed: usize,
}

#[derive(Clone)]
pub struct BroadcastHub {
    listeners: Arc<Mutex<HashMap<ListenerId, mpsc::Sender<Sample>>>>,
    default_capacity: usize,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_LISTENER_CAPACITY)
    }
}

impl BroadcastHub {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            listeners: Arc::new(Mutex::new(HashMap::new())),
            default_capacity: default_capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ListenerId, mpsc::Sender<Sample>>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self) -> Listener {
        self.register_with_capacity(self.default_capacity)
    }

    pub fn register_with_capacity(&self, capacity: usize) -> Listener {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let id = Uuid::new_v4();
        self.lock().insert(id, sender);
        debug!("Registered live listener {id} (capacity {})", capacity.max(1));
        Listener { id, receiver }
    }

    /// Removing an unknown or already-removed listener is a no-op.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            debug!("Unregistered live listener {id}");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn publish(&self, sample: &Sample) -> PublishReport {
        let mut report = PublishReport::default();
        let mut listeners = self.lock();

        listeners.retain(|id, sender| match sender.try_send(*sample) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!("Listener {id} queue full; dropping sample t={:.2}", sample.t);
                report.dropped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Listener {id} went away; removing");
                report.closed += 1;
                false
            }
        });

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Axes;

    fn sample(t: f64) -> Sample {
        Sample::new(t, Axes::default())
    }

    #[tokio::test]
    async fn test_every_listener_receives_published_sample() {
        let hub = BroadcastHub::default();
        let mut a = hub.register();
        let mut b = hub.register();

        let report = hub.publish(&sample(1.0));

        assert_eq!(report.delivered, 2);
        assert_eq!(a.recv().await.unwrap().t, 1.0);
        assert_eq!(b.recv().await.unwrap().t, 1.0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_only_for_that_listener() {
        let hub = BroadcastHub::default();
        let mut slow = hub.register_with_capacity(1);
        let mut fast = hub.register_with_capacity(10);

        hub.publish(&sample(1.0));
        let report = hub.publish(&sample(2.0));

        assert_eq!(report, PublishReport { delivered: 1, dropped: 1, closed: 0 });
        assert_eq!(slow.try_recv().unwrap().t, 1.0);
        assert!(slow.try_recv().is_none());
        assert_eq!(fast.try_recv().unwrap().t, 1.0);
        assert_eq!(fast.try_recv().unwrap().t, 2.0);
        assert_eq!(hub.len(), 2);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let hub = BroadcastHub::default();
        let listener = hub.register();

        assert!(hub.unregister(listener.id()));
        assert!(!hub.unregister(listener.id()));
        assert!(!hub.unregister(Uuid::new_v4()));
        assert!(hub.is_empty());
    }

    #[test]
    fn test_dropped_listener_is_removed_on_publish() {
        let hub = BroadcastHub::default();
        let listener = hub.register();
        let _kept = hub.register();
        drop(listener);

        let report = hub.publish(&sample(0.0));

        assert_eq!(report.closed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn test_publish_without_listeners_is_a_no_op() {
        let hub = BroadcastHub::new(0);
        assert_eq!(hub.publish(&sample(0.0)), PublishReport::default());
    }

    #[tokio::test]
    async fn test_concurrent_registration() {
        let hub = BroadcastHub::default();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let hub = hub.clone();
            handles.push(tokio::spawn(async move {
                let listener = hub.register();
                hub.unregister(listener.id());
                hub.register()
            }));
        }

        let mut listeners = Vec::new();
        for handle in handles {
            listeners.push(handle.await.unwrap());
        }

        assert_eq!(hub.len(), 16);
        assert_eq!(hub.publish(&sample(3.0)).delivered, 16);
    }
}
