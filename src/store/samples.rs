use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};

use crate::db::{Database, SampleQuery, StoredSample};
use crate::telemetry::Sample;

use super::memory::MemoryLog;

/// The sample log behind the engine: SQLite when persistence is on, an
/// in-process log otherwise. Both keep the same ordering and paging rules.
#[derive(Clone)]
pub enum SampleStore {
    Durable(Database),
    Memory(Arc<MemoryLog>),
}

impl SampleStore {
    pub fn memory(capacity: Option<usize>) -> Self {
        SampleStore::Memory(Arc::new(MemoryLog::new(capacity)))
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, SampleStore::Durable(_))
    }

    pub async fn append(&self, sample: &Sample) -> Result<StoredSample> {
        match self {
            SampleStore::Durable(db) => db.insert_sample(sample).await,
            SampleStore::Memory(log) => Ok(log.append(sample)),
        }
    }

    pub async fn query(&self, query: SampleQuery) -> Result<Vec<StoredSample>> {
        match self {
            SampleStore::Durable(db) => db.query_samples(query).await,
            SampleStore::Memory(log) => Ok(log.query(query)),
        }
    }

    pub async fn latest(&self) -> Result<Option<StoredSample>> {
        match self {
            SampleStore::Durable(db) => db.latest_sample().await,
            SampleStore::Memory(log) => Ok(log.latest()),
        }
    }

    pub async fn len(&self) -> Result<u64> {
        match self {
            SampleStore::Durable(db) => db.count_samples().await,
            SampleStore::Memory(log) => Ok(log.len() as u64),
        }
    }

    /// Removes samples created more than `days` ago and returns the count.
    /// `days == 0` clears everything written so far. A window reaching past
    /// the earliest representable time prunes nothing.
    pub async fn prune_older_than(&self, days: u32) -> Result<u64> {
        let Some(cutoff) = Utc::now().checked_sub_signed(Duration::days(i64::from(days))) else {
            return Ok(0);
        };
        match self {
            SampleStore::Durable(db) => db.prune_samples_created_before(cutoff).await,
            SampleStore::Memory(log) => Ok(log.prune_created_before(cutoff)),
        }
    }
}
