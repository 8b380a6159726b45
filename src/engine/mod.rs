mod facade;
mod summary;

pub use facade::{Engine, EngineStatus};
pub use summary::{CounterTotals, PostureSummary};
