pub mod classifier;
pub mod decoder;
pub mod sample;

pub use classifier::PostureClassifier;
pub use decoder::{decode, encode, FRAME_LEN};
pub use sample::{Axes, Sample, SampleSeries};
