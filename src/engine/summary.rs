use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Counter totals over one period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterTotals {
    pub slouch_frequency: u64,
    pub slouch_time: u64,
    pub straight_time: u64,
}

impl CounterTotals {
    pub fn ticks(&self) -> u64 {
        self.slouch_time + self.straight_time
    }

    /// Share of ticks spent slouching, rounded to a whole percent. 0 with no ticks.
    pub fn slouch_percentage(&self) -> u64 {
        let total = self.ticks();
        if total == 0 {
            return 0;
        }
        (self.slouch_time as f64 / total as f64 * 100.0).round() as u64
    }

    /// `"{slouch/straight:.2}:1"`, or `"N/A"` without straight time.
    pub fn slouch_ratio(&self) -> String {
        if self.straight_time == 0 {
            return "N/A".to_string();
        }
        format!("{:.2}:1", self.slouch_time as f64 / self.straight_time as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostureSummary {
    pub date: NaiveDate,
    pub today: CounterTotals,
    pub all_time: CounterTotals,
}

fn write_period(f: &mut fmt::Formatter<'_>, label: &str, totals: &CounterTotals) -> fmt::Result {
    writeln!(f, "{label}:")?;
    writeln!(f, "  slouch episodes: {}", totals.slouch_frequency)?;
    writeln!(
        f,
        "  slouching: {} ticks ({}%)",
        totals.slouch_time,
        totals.slouch_percentage()
    )?;
    writeln!(f, "  straight: {} ticks", totals.straight_time)?;
    write!(f, "  slouch:straight ratio: {}", totals.slouch_ratio())
}

impl fmt::Display for PostureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_period(f, &format!("Today ({})", self.date), &self.today)?;
        writeln!(f)?;
        write_period(f, "All time", &self.all_time)
    }
}
