use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{conversion_error, format_timestamp, parse_datetime, to_axis, to_u64},
    models::{SampleQuery, StoredSample},
};
use crate::telemetry::Sample;

const SAMPLE_COLUMNS: &str = "id, t, ax, ay, az, gx, gy, gz, pitch, created_at";

fn row_to_stored_sample(row: &Row) -> Result<StoredSample, rusqlite::Error> {
    let axis = |idx: usize, field: &str| -> Result<i8, rusqlite::Error> {
        to_axis(row.get::<_, i64>(idx)?, field)
            .map_err(|err| conversion_error(idx, Type::Integer, err))
    };
    let created_at: String = row.get(9)?;

    Ok(StoredSample {
        id: row.get(0)?,
        sample: Sample {
            t: row.get(1)?,
            ax: axis(2, "ax")?,
            ay: axis(3, "ay")?,
            az: axis(4, "az")?,
            gx: axis(5, "gx")?,
            gy: axis(6, "gy")?,
            gz: axis(7, "gz")?,
            pitch: row.get(8)?,
        },
        created_at: parse_datetime(&created_at, "created_at")
            .map_err(|err| conversion_error(9, Type::Text, err))?,
    })
}

fn clamp_to_sql(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl Database {
    pub async fn insert_sample(&self, sample: &Sample) -> Result<StoredSample> {
        let record = *sample;
        self.execute(move |conn| {
            let created_at = Utc::now();
            conn.execute(
                "INSERT INTO samples (t, ax, ay, az, gx, gy, gz, pitch, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.t,
                    record.ax,
                    record.ay,
                    record.az,
                    record.gx,
                    record.gy,
                    record.gz,
                    record.pitch,
                    format_timestamp(created_at),
                ],
            )
            .with_context(|| "failed to insert sample")?;

            Ok(StoredSample {
                id: conn.last_insert_rowid(),
                sample: record,
                created_at,
            })
        })
        .await
    }

    /// Samples in insertion order, filtered by inclusive `t` bounds and paged.
    pub async fn query_samples(&self, query: SampleQuery) -> Result<Vec<StoredSample>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SAMPLE_COLUMNS}
                 FROM samples
                 WHERE (?1 IS NULL OR t >= ?1)
                   AND (?2 IS NULL OR t <= ?2)
                 ORDER BY id ASC
                 LIMIT ?3 OFFSET ?4"
            ))?;

            let samples = stmt
                .query_map(
                    params![
                        query.start_t,
                        query.end_t,
                        clamp_to_sql(query.limit),
                        clamp_to_sql(query.offset),
                    ],
                    row_to_stored_sample,
                )?
                .collect::<Result<Vec<_>, _>>()
                .context("failed to read samples")?;

            Ok(samples)
        })
        .await
    }

    pub async fn latest_sample(&self) -> Result<Option<StoredSample>> {
        self.execute(|conn| {
            let latest = conn
                .query_row(
                    &format!("SELECT {SAMPLE_COLUMNS} FROM samples ORDER BY id DESC LIMIT 1"),
                    [],
                    row_to_stored_sample,
                )
                .optional()
                .context("failed to read latest sample")?;
            Ok(latest)
        })
        .await
    }

    pub async fn count_samples(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM samples", [], |row| row.get(0))?;
            to_u64(count, "sample count")
        })
        .await
    }

    /// Deletes rows created at or before `cutoff`; returns how many went.
    pub async fn prune_samples_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.execute(move |conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM samples WHERE created_at <= ?1",
                    params![format_timestamp(cutoff)],
                )
                .with_context(|| "failed to prune samples")?;
            Ok(deleted as u64)
        })
        .await
    }
}
