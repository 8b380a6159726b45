//! Slouch detection with a hysteresis band on `az`.
//!
//! Entering the slouching state needs `az > 64`; leaving it needs `az < 50`.
//! Values in between keep whatever state is current.

use crate::db::models::CounterName;

use super::sample::Sample;

pub const ENTER_SLOUCH_AZ: i8 = 64;
pub const EXIT_SLOUCH_AZ: i8 = 50;

/// What one sample contributed to the daily counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Set on the tick that transitions into slouching.
    pub entered_slouch: bool,
    /// Exactly one level counter per tick.
    pub tick: CounterName,
}

impl Classification {
    pub fn counter_deltas(&self) -> Vec<CounterName> {
        let mut deltas = Vec::with_capacity(2);
        if self.entered_slouch {
            deltas.push(CounterName::SlouchFrequency);
        }
        deltas.push(self.tick);
        deltas
    }
}

#[derive(Debug, Default)]
pub struct PostureClassifier {
    slouching: bool,
}

impl PostureClassifier {
    pub fn is_slouching(&self) -> bool {
        self.slouching
    }

    pub fn observe(&mut self, sample: &Sample) -> Classification {
        let az = sample.az;
        let above_enter = az > ENTER_SLOUCH_AZ;

        let mut entered_slouch = false;
        if above_enter && !self.slouching {
            self.slouching = true;
            entered_slouch = true;
        } else if az < EXIT_SLOUCH_AZ && self.slouching {
            self.slouching = false;
        }

        let tick = if above_enter {
            CounterName::SlouchTime
        } else {
            CounterName::StraightTime
        };

        Classification {
            entered_slouch,
            tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Axes;

    fn sample_with_az(az: i8) -> Sample {
        Sample::new(0.0, Axes { az, ..Axes::default() })
    }

    fn feed(classifier: &mut PostureClassifier, values: &[i8]) -> Vec<Classification> {
        values
            .iter()
            .map(|az| classifier.observe(&sample_with_az(*az)))
            .collect()
    }

    fn count(results: &[Classification], name: CounterName) -> usize {
        results
            .iter()
            .flat_map(|c| c.counter_deltas())
            .filter(|delta| *delta == name)
            .count()
    }

    #[test]
    fn test_band_values_do_not_toggle_state() {
        let mut classifier = PostureClassifier::default();
        let results = feed(&mut classifier, &[70, 70, 55, 70]);

        assert_eq!(count(&results, CounterName::SlouchFrequency), 1);
        assert!(results[0].entered_slouch);
        assert!(!results[1].entered_slouch);
        assert!(!results[3].entered_slouch);
        assert!(classifier.is_slouching());
    }

    #[test]
    fn test_reentry_requires_dropping_below_exit_threshold() {
        let mut classifier = PostureClassifier::default();
        let results = feed(&mut classifier, &[70, 49, 70]);

        assert_eq!(count(&results, CounterName::SlouchFrequency), 2);
        assert!(results[2].entered_slouch);
    }

    #[test]
    fn test_thresholds_are_strict() {
        let mut classifier = PostureClassifier::default();
        feed(&mut classifier, &[64]);
        assert!(!classifier.is_slouching());

        feed(&mut classifier, &[65, 50]);
        assert!(classifier.is_slouching());

        feed(&mut classifier, &[49]);
        assert!(!classifier.is_slouching());
    }

    #[test]
    fn test_exit_emits_no_edge_counter() {
        let mut classifier = PostureClassifier::default();
        let results = feed(&mut classifier, &[90, 0]);

        assert_eq!(
            results[1].counter_deltas(),
            vec![CounterName::StraightTime]
        );
    }

    #[test]
    fn test_level_counters_sum_to_tick_count() {
        let mut classifier = PostureClassifier::default();
        let values: Vec<i8> = (0..200).map(|i| ((i * 37) % 256 - 128) as i8).collect();
        let results = feed(&mut classifier, &values);

        let slouch = count(&results, CounterName::SlouchTime);
        let straight = count(&results, CounterName::StraightTime);
        assert_eq!(slouch + straight, values.len());
    }

    #[test]
    fn test_level_tick_follows_current_az_not_state() {
        let mut classifier = PostureClassifier::default();
        let results = feed(&mut classifier, &[70, 55]);

        // Still slouching at 55, but the tick only counts az > 64 as slouch time.
        assert!(classifier.is_slouching());
        assert_eq!(results[1].tick, CounterName::StraightTime);
    }
}
