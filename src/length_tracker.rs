// src/length_tracker.rs
//! Running average of bone lengths over the most recent samples.
//!
//! The sum is maintained incrementally. Float error in that sum would grow
//! without bound, so during the last window of every epoch a second sum is
//! built from scratch and swapped in when the epoch ends.

use tracing::debug;

use crate::lengths::BoneLengths;

pub const HISTORY_CAPACITY: usize = 256;
/// Below this many samples fresh measurements are purified against the default hand.
pub const BOOTSTRAP_SAMPLES: usize = 16;
/// Below this many samples the reported average is blended with the baseline.
pub const WARMUP_SAMPLES: usize = 32;
/// Epoch length in units of full history windows.
pub const DRIFT_EPOCH_WINDOWS: usize = 14;

const EPOCH_LENGTH: usize = HISTORY_CAPACITY * DRIFT_EPOCH_WINDOWS;
const REFRESH_START: usize = EPOCH_LENGTH - HISTORY_CAPACITY;

#[derive(Debug, Clone)]
pub struct BoneLengthTracker {
    history: Vec<BoneLengths>,
    sum: BoneLengths,
    fresh_sum: BoneLengths,
    /// Samples since the epoch started, once the history is full.
    epoch_position: usize,
    running_average: BoneLengths,
    baseline: BoneLengths,
}

impl Default for BoneLengthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl BoneLengthTracker {
    pub fn new() -> Self {
        Self::with_baseline(BoneLengths::DEFAULT)
    }

    pub fn with_baseline(baseline: BoneLengths) -> Self {
        Self {
            history: Vec::with_capacity(HISTORY_CAPACITY),
            sum: BoneLengths::zero(),
            fresh_sum: BoneLengths::zero(),
            epoch_position: 0,
            running_average: baseline,
            baseline,
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Purify and record one measurement. Returns the purified sample.
    pub fn push(&mut self, sample: BoneLengths) -> BoneLengths {
        let mut sample = sample;

        if self.history.len() < HISTORY_CAPACITY {
            let reference = if self.history.len() < BOOTSTRAP_SAMPLES {
                BoneLengths::DEFAULT
            } else {
                self.trusted_average()
            };
            sample.purify(&reference);
            self.sum += sample;
            self.history.push(sample);
            self.running_average = self.sum / self.history.len() as f32;
            return sample;
        }

        let reference = self.trusted_average();
        sample.purify(&reference);

        let slot = self.epoch_position % HISTORY_CAPACITY;
        if self.epoch_position == REFRESH_START {
            self.fresh_sum = sample;
        } else if self.epoch_position > REFRESH_START {
            self.fresh_sum += sample;
        }

        if self.epoch_position == EPOCH_LENGTH - 1 {
            // fresh_sum now covers exactly the samples left in the history.
            self.sum = self.fresh_sum;
            self.epoch_position = 0;
            debug!("bone length sum rebuilt from the latest window");
        } else {
            self.sum -= self.history[slot];
            self.sum += sample;
            self.epoch_position += 1;
        }
        self.history[slot] = sample;
        self.running_average = self.sum / HISTORY_CAPACITY as f32;
        sample
    }

    /// Average over the history, without warmup blending.
    pub fn running_average(&self) -> &BoneLengths {
        &self.running_average
    }

    /// Best current estimate of the hand's bone lengths.
    pub fn average_lengths(&self) -> BoneLengths {
        match self.history.len() {
            0 => self.baseline,
            n if n >= WARMUP_SAMPLES => self.running_average,
            n => BoneLengths::mix(&self.baseline, &self.running_average, n as f32 / WARMUP_SAMPLES as f32),
        }
    }

    fn trusted_average(&self) -> BoneLengths {
        let mut average = self.running_average;
        average.purify(&BoneLengths::DEFAULT);
        average
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lengths::BONE_COUNT;

    fn assert_lengths_close(actual: &BoneLengths, expected: &BoneLengths, eps: f32) {
        for (i, (a, e)) in actual.values().iter().zip(expected.values().iter()).enumerate() {
            assert!((a - e).abs() < eps, "length {}: expected {}, got {}", i, e, a);
        }
    }

    fn mean(samples: &[BoneLengths]) -> BoneLengths {
        let sum = samples.iter().fold(BoneLengths::zero(), |acc, s| acc + *s);
        sum / samples.len() as f32
    }

    #[test]
    fn test_empty_tracker_reports_baseline() {
        let tracker = BoneLengthTracker::new();
        assert!(tracker.is_empty());
        assert_eq!(tracker.average_lengths(), BoneLengths::DEFAULT);
    }

    #[test]
    fn test_identical_samples_converge_after_warmup() {
        let sample = BoneLengths::DEFAULT * 1.08;
        let mut tracker = BoneLengthTracker::new();

        for _ in 0..WARMUP_SAMPLES - 1 {
            tracker.push(sample);
        }
        let blended = tracker.average_lengths();
        let expected = BoneLengths::mix(&BoneLengths::DEFAULT, &sample, 31.0 / 32.0);
        assert_lengths_close(&blended, &expected, 1e-6);

        tracker.push(sample);
        assert_lengths_close(&tracker.average_lengths(), &sample, 1e-6);

        for _ in 0..100 {
            tracker.push(sample);
        }
        assert_lengths_close(&tracker.average_lengths(), &sample, 1e-6);
    }

    #[test]
    fn test_oldest_sample_evicted_when_full() {
        let samples: Vec<BoneLengths> = (0..=HISTORY_CAPACITY)
            .map(|k| BoneLengths::DEFAULT * (1.0 + 0.001 * k as f32))
            .collect();
        let mut tracker = BoneLengthTracker::new();
        for sample in &samples[..HISTORY_CAPACITY] {
            tracker.push(*sample);
        }
        assert_lengths_close(&tracker.average_lengths(), &mean(&samples[..HISTORY_CAPACITY]), 1e-5);

        tracker.push(samples[HISTORY_CAPACITY]);
        assert_eq!(tracker.len(), HISTORY_CAPACITY);
        assert_lengths_close(&tracker.average_lengths(), &mean(&samples[1..]), 1e-5);
        assert_lengths_close(&tracker.average_lengths(), &mean(&tracker.history), 1e-5);
    }

    #[test]
    fn test_epoch_rebuild_matches_history() {
        let mut tracker = BoneLengthTracker::new();
        let total = HISTORY_CAPACITY + EPOCH_LENGTH;
        for k in 0..total {
            let wobble = 1.0 + 0.05 * ((k as f32) * 0.37).sin();
            tracker.push(BoneLengths::DEFAULT * wobble);
        }
        assert_eq!(tracker.epoch_position, 0);
        assert_lengths_close(&tracker.sum, &(mean(&tracker.history) * HISTORY_CAPACITY as f32), 1e-4);
    }

    #[test]
    fn test_outliers_do_not_reach_the_average() {
        let mut tracker = BoneLengthTracker::new();
        let mut bad = BoneLengths::DEFAULT;
        bad.set_wrist_connection(crate::topology::Finger::Ring, f32::NAN);
        let cleaned = tracker.push(bad);
        assert!(cleaned.values().iter().all(|v| v.is_finite()));
        assert_eq!(cleaned.values().len(), BONE_COUNT);
        assert!(tracker.average_lengths().values().iter().all(|v| v.is_finite()));
    }
}
