pub mod counters;
pub mod samples;
