pub mod counter;
pub mod sample;

pub use counter::{CounterName, DailyCounter};
pub use sample::{SampleQuery, StoredSample};
