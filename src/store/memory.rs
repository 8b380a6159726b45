use std::{
    collections::VecDeque,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::{DateTime, Utc};

use crate::db::{SampleQuery, StoredSample};
use crate::telemetry::Sample;

struct LogState {
    next_id: i64,
    entries: VecDeque<StoredSample>,
}

/// Sample log used when persistence is disabled. When a capacity is set the
/// oldest entries are evicted; ids keep increasing across evictions.
pub struct MemoryLog {
    capacity: Option<usize>,
    state: RwLock<LogState>,
}

impl MemoryLog {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity: capacity.map(|c| c.max(1)),
            state: RwLock::new(LogState {
                next_id: 1,
                entries: VecDeque::new(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, LogState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, LogState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn append(&self, sample: &Sample) -> StoredSample {
        let mut state = self.write();
        let stored = StoredSample {
            id: state.next_id,
            sample: *sample,
            created_at: Utc::now(),
        };
        state.next_id += 1;
        if let Some(capacity) = self.capacity {
            while state.entries.len() >= capacity {
                state.entries.pop_front();
            }
        }
        state.entries.push_back(stored.clone());
        stored
    }

    pub fn query(&self, query: SampleQuery) -> Vec<StoredSample> {
        let offset = usize::try_from(query.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
        self.read()
            .entries
            .iter()
            .filter(|stored| query.matches(stored.sample.t))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn latest(&self) -> Option<StoredSample> {
        self.read().entries.back().cloned()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn prune_created_before(&self, cutoff: DateTime<Utc>) -> u64 {
        let mut state = self.write();
        let before = state.entries.len();
        state.entries.retain(|stored| stored.created_at > cutoff);
        (before - state.entries.len()) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Axes;

    fn sample(t: f64) -> Sample {
        Sample::new(t, Axes::default())
    }

    #[test]
    fn test_bounded_log_evicts_oldest() {
        let log = MemoryLog::new(Some(3));
        for i in 0..5 {
            log.append(&sample(i as f64));
        }

        let ts: Vec<f64> = log.query(SampleQuery::all()).iter().map(|s| s.sample.t).collect();
        assert_eq!(ts, vec![2.0, 3.0, 4.0]);
        assert_eq!(log.latest().unwrap().id, 5);
    }

    #[test]
    fn test_unbounded_log_keeps_everything() {
        let log = MemoryLog::new(None);
        for i in 0..1_000 {
            log.append(&sample(i as f64));
        }
        assert_eq!(log.len(), 1_000);
    }

    #[test]
    fn test_query_filters_then_pages() {
        let log = MemoryLog::new(None);
        for i in 0..10 {
            log.append(&sample(i as f64));
        }

        let page = log.query(SampleQuery {
            limit: 2,
            offset: 1,
            start_t: Some(5.0),
            end_t: None,
        });
        let ts: Vec<f64> = page.iter().map(|s| s.sample.t).collect();
        assert_eq!(ts, vec![6.0, 7.0]);

        assert!(log
            .query(SampleQuery {
                offset: 100,
                ..SampleQuery::default()
            })
            .is_empty());
    }

    #[test]
    fn test_prune_and_empty_latest() {
        let log = MemoryLog::new(None);
        assert!(log.latest().is_none());
        log.append(&sample(0.0));
        log.append(&sample(1.0));

        assert_eq!(log.prune_created_before(Utc::now()), 2);
        assert_eq!(log.len(), 0);
    }
}
