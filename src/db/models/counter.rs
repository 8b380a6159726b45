//! Per-day posture counters.

use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterName {
    /// Edge-triggered: one per transition into slouching.
    SlouchFrequency,
    /// Level-triggered: one per sample tick while slouching.
    SlouchTime,
    /// Level-triggered: one per sample tick while upright.
    StraightTime,
}

impl CounterName {
    pub const ALL: [CounterName; 3] = [
        CounterName::SlouchFrequency,
        CounterName::SlouchTime,
        CounterName::StraightTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CounterName::SlouchFrequency => "slouch_frequency",
            CounterName::SlouchTime => "slouch_time",
            CounterName::StraightTime => "straight_time",
        }
    }
}

impl fmt::Display for CounterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCounterNameError(pub String);

impl fmt::Display for ParseCounterNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown counter '{}'", self.0)
    }
}

impl std::error::Error for ParseCounterNameError {}

impl FromStr for CounterName {
    type Err = ParseCounterNameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        CounterName::ALL
            .into_iter()
            .find(|name| name.as_str() == value)
            .ok_or_else(|| ParseCounterNameError(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCounter {
    pub name: CounterName,
    pub date: NaiveDate,
    pub value: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_names_parse_from_their_column_value() {
        for name in CounterName::ALL {
            assert_eq!(name.as_str().parse::<CounterName>().unwrap(), name);
        }
        assert!("slouch_count".parse::<CounterName>().is_err());
    }
}
