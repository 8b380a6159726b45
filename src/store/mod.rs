mod counters;
mod memory;
mod samples;

pub use counters::{local_today, CounterStore};
pub use memory::MemoryLog;
pub use samples::SampleStore;
