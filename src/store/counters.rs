use anyhow::Result;
use chrono::{Days, Local, NaiveDate};
use log::warn;

use crate::db::{CounterName, DailyCounter, Database};

/// Counter dates follow the local calendar day of the engine host.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// Per-day named counters with inline retention pruning.
#[derive(Clone)]
pub struct CounterStore {
    db: Database,
    retention_days: u32,
}

impl CounterStore {
    pub fn new(db: Database, retention_days: u32) -> Self {
        Self { db, retention_days }
    }

    pub async fn increment(&self, name: CounterName, date: NaiveDate) -> Result<()> {
        self.db.increment_counters(vec![name], date).await
    }

    /// Applies one tick's deltas atomically, then prunes expired days.
    /// A failed prune is logged and does not fail the batch.
    pub async fn apply(&self, deltas: Vec<CounterName>, date: NaiveDate) -> Result<()> {
        self.db.increment_counters(deltas, date).await?;
        if let Err(err) = self.prune_relative_to(date, self.retention_days).await {
            warn!("Counter retention prune failed: {err:#}");
        }
        Ok(())
    }

    pub async fn get(&self, name: CounterName, date: NaiveDate) -> Result<u64> {
        self.db.get_counter(name, date).await
    }

    pub async fn reset(&self, name: CounterName, date: NaiveDate) -> Result<()> {
        self.db.reset_counter(name, date).await
    }

    pub async fn range_sum(&self, name: CounterName, start: NaiveDate, end: NaiveDate) -> Result<u64> {
        self.db.sum_counter(name, start, end).await
    }

    pub async fn total(&self, name: CounterName) -> Result<u64> {
        self.db.total_counter(name).await
    }

    pub async fn history(
        &self,
        name: CounterName,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyCounter>> {
        self.db.counter_history(name, start, end).await
    }

    /// Deletes rows dated before today minus `retention_days`.
    pub async fn prune(&self, retention_days: u32) -> Result<u64> {
        self.prune_relative_to(local_today(), retention_days).await
    }

    async fn prune_relative_to(&self, today: NaiveDate, retention_days: u32) -> Result<u64> {
        let oldest_kept = today
            .checked_sub_days(Days::new(u64::from(retention_days)))
            .unwrap_or(NaiveDate::MIN);
        self.db.prune_counters_before(oldest_kept).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir, retention_days: u32) -> CounterStore {
        let db = Database::new(dir.path().join("counters.sqlite3")).unwrap();
        CounterStore::new(db, retention_days)
    }

    #[tokio::test]
    async fn test_apply_prunes_days_outside_retention() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, 30);
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let stale = today - Days::new(31);
        let edge = today - Days::new(30);

        store.increment(CounterName::SlouchTime, stale).await.unwrap();
        store.increment(CounterName::SlouchTime, edge).await.unwrap();
        store
            .apply(vec![CounterName::SlouchFrequency, CounterName::SlouchTime], today)
            .await
            .unwrap();

        assert_eq!(store.get(CounterName::SlouchTime, stale).await.unwrap(), 0);
        assert_eq!(store.get(CounterName::SlouchTime, edge).await.unwrap(), 1);
        assert_eq!(store.get(CounterName::SlouchTime, today).await.unwrap(), 1);
        assert_eq!(store.get(CounterName::SlouchFrequency, today).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reset_then_get_is_zero() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, 30);
        let today = local_today();

        store.increment(CounterName::StraightTime, today).await.unwrap();
        store.reset(CounterName::StraightTime, today).await.unwrap();

        assert_eq!(store.get(CounterName::StraightTime, today).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_range_sum_spans_days() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, 30);
        let today = local_today();
        let yesterday = today - Days::new(1);

        store.increment(CounterName::SlouchFrequency, yesterday).await.unwrap();
        store.increment(CounterName::SlouchFrequency, today).await.unwrap();
        store.increment(CounterName::SlouchFrequency, today).await.unwrap();

        assert_eq!(
            store
                .range_sum(CounterName::SlouchFrequency, yesterday, today)
                .await
                .unwrap(),
            3
        );
        assert_eq!(store.history(CounterName::SlouchFrequency, yesterday, today).await.unwrap().len(), 2);
        assert_eq!(store.total(CounterName::SlouchFrequency).await.unwrap(), 3);
        assert_eq!(store.prune(0).await.unwrap(), 1);
    }
}
