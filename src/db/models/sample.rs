//! Persisted sample rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::telemetry::Sample;

/// A sample as held by the sample log, with its insertion identity and
/// wall-clock creation time (distinct from the sample's engine-relative `t`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSample {
    pub id: i64,
    #[serde(flatten)]
    pub sample: Sample,
    pub created_at: DateTime<Utc>,
}

/// Pagination and `t`-range filter for sample queries. Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleQuery {
    pub limit: u64,
    pub offset: u64,
    pub start_t: Option<f64>,
    pub end_t: Option<f64>,
}

impl Default for SampleQuery {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
            start_t: None,
            end_t: None,
        }
    }
}

impl SampleQuery {
    /// Everything in the log, oldest first.
    pub fn all() -> Self {
        Self {
            limit: u64::MAX,
            ..Self::default()
        }
    }

    pub fn matches(&self, t: f64) -> bool {
        self.start_t.map_or(true, |start| t >= start) && self.end_t.map_or(true, |end| t <= end)
    }
}
