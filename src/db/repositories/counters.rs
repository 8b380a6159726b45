use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use crate::db::{
    connection::Database,
    helpers::{format_date, parse_date, to_u64},
    models::{CounterName, DailyCounter},
};

impl Database {
    /// Adds one to each named counter for `date`, creating rows at 1.
    /// All increments in the batch commit together.
    pub async fn increment_counters(&self, names: Vec<CounterName>, date: NaiveDate) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let date = format_date(date);
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO daily_counters (name, date, value) VALUES (?1, ?2, 1)
                     ON CONFLICT(name, date) DO UPDATE SET value = value + 1",
                )?;
                for name in &names {
                    stmt.execute(params![name.as_str(), date])
                        .with_context(|| format!("failed to increment {name}"))?;
                }
            }
            tx.commit().context("failed to commit counter increments")?;
            Ok(())
        })
        .await
    }

    pub async fn get_counter(&self, name: CounterName, date: NaiveDate) -> Result<u64> {
        let date = format_date(date);
        self.execute(move |conn| {
            let value: Option<i64> = conn
                .query_row(
                    "SELECT value FROM daily_counters WHERE name = ?1 AND date = ?2",
                    params![name.as_str(), date],
                    |row| row.get(0),
                )
                .optional()?;
            value.map_or(Ok(0), |v| to_u64(v, name.as_str()))
        })
        .await
    }

    pub async fn reset_counter(&self, name: CounterName, date: NaiveDate) -> Result<()> {
        let date = format_date(date);
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO daily_counters (name, date, value) VALUES (?1, ?2, 0)
                 ON CONFLICT(name, date) DO UPDATE SET value = 0",
                params![name.as_str(), date],
            )
            .with_context(|| format!("failed to reset {name}"))?;
            Ok(())
        })
        .await
    }

    /// Sum over the inclusive date range.
    pub async fn sum_counter(
        &self,
        name: CounterName,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64> {
        let (start, end) = (format_date(start), format_date(end));
        self.execute(move |conn| {
            let total: i64 = conn.query_row(
                "SELECT COALESCE(SUM(value), 0) FROM daily_counters
                 WHERE name = ?1 AND date >= ?2 AND date <= ?3",
                params![name.as_str(), start, end],
                |row| row.get(0),
            )?;
            to_u64(total, name.as_str())
        })
        .await
    }

    /// Sum across every retained day.
    pub async fn total_counter(&self, name: CounterName) -> Result<u64> {
        self.execute(move |conn| {
            let total: i64 = conn.query_row(
                "SELECT COALESCE(SUM(value), 0) FROM daily_counters WHERE name = ?1",
                params![name.as_str()],
                |row| row.get(0),
            )?;
            to_u64(total, name.as_str())
        })
        .await
    }

    pub async fn counter_history(
        &self,
        name: CounterName,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyCounter>> {
        let (start, end) = (format_date(start), format_date(end));
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT date, value FROM daily_counters
                 WHERE name = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
            )?;

            let mut rows = stmt.query(params![name.as_str(), start, end])?;
            let mut history = Vec::new();
            while let Some(row) = rows.next()? {
                let date: String = row.get(0)?;
                let value: i64 = row.get(1)?;
                history.push(DailyCounter {
                    name,
                    date: parse_date(&date, "date")?,
                    value: to_u64(value, name.as_str())?,
                });
            }
            Ok(history)
        })
        .await
    }

    /// Deletes every counter row dated strictly before `oldest_kept`.
    pub async fn prune_counters_before(&self, oldest_kept: NaiveDate) -> Result<u64> {
        let cutoff = format_date(oldest_kept);
        self.execute(move |conn| {
            let deleted = conn
                .execute("DELETE FROM daily_counters WHERE date < ?1", params![cutoff])
                .with_context(|| "failed to prune counters")?;
            Ok(deleted as u64)
        })
        .await
    }
}
