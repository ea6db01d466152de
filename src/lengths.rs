// src/lengths.rs
//! Bone-length profile of one hand.
//!
//! 24 lengths in meters: five wrist-to-knuckle segments (thumb base first),
//! four knuckle-to-knuckle segments (index-thumb base, middle-index,
//! ring-middle, little-ring) and three segments inside each finger.

use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::reconstruct::ReconstructedHand;
use crate::topology::{Finger, FINGER_COUNT, JOINTS_PER_FINGER};

pub const BONE_COUNT: usize = 24;

const WRIST_BASE: usize = 0;
const BETWEEN_BASE: usize = 5;
const INSIDE_BASE: usize = 9;
const SEGMENTS_PER_FINGER: usize = JOINTS_PER_FINGER - 1;

/// Measured lengths outside `[MIN_RATIO, MAX_RATIO] * default` are outliers.
pub const MIN_DEFAULT_RATIO: f32 = 0.4;
pub const MAX_DEFAULT_RATIO: f32 = 1.95;
/// Allowed fingertip length relative to the segment before it.
pub const MIN_TIP_RATIO: f32 = 0.5;
pub const MAX_TIP_RATIO: f32 = 1.25;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoneLengths {
    values: [f32; BONE_COUNT],
}

impl BoneLengths {
    /// Adult hand calibration data.
    #[rustfmt::skip]
    pub const DEFAULT: BoneLengths = BoneLengths {
        values: [
            // wrist to thumb base, index, middle, ring, little knuckle
            0.031, 0.081, 0.081, 0.080, 0.0725,
            // index-thumb base, middle-index, ring-middle, little-ring
            0.063, 0.023, 0.019, 0.023,
            // thumb, index, middle, ring, little
            0.032, 0.028, 0.025,
            0.031, 0.024, 0.020,
            0.036, 0.030, 0.020,
            0.033, 0.028, 0.020,
            0.025, 0.021, 0.020,
        ],
    };

    pub const fn zero() -> Self {
        Self { values: [0.0; BONE_COUNT] }
    }

    pub fn values(&self) -> &[f32; BONE_COUNT] {
        &self.values
    }

    /// Measure a complete hand. `None` unless the wrist and every chain are resolved.
    pub fn measure(hand: &ReconstructedHand) -> Option<Self> {
        let wrist = hand.wrist?;
        let mut chains = [[Vector3::zeros(); JOINTS_PER_FINGER]; FINGER_COUNT];
        for (chain, finger) in chains.iter_mut().zip(hand.fingers.iter()) {
            *chain = *finger.joints()?;
        }
        Some(Self::from_chains(&wrist, &chains))
    }

    pub fn from_chains(wrist: &Vector3<f32>, chains: &[[Vector3<f32>; JOINTS_PER_FINGER]; FINGER_COUNT]) -> Self {
        let mut lengths = Self::zero();
        for finger in Finger::ALL {
            let chain = &chains[finger.index()];
            lengths.set_wrist_connection(finger, (chain[0] - wrist).norm());
            if finger != Finger::Thumb {
                let previous = &chains[finger.index() - 1];
                lengths.values[BETWEEN_BASE + finger.index() - 1] = (chain[0] - previous[0]).norm();
            }
            for joint in 1..JOINTS_PER_FINGER {
                lengths.set_inside_finger(finger, joint, (chain[joint] - chain[joint - 1]).norm());
            }
        }
        lengths
    }

    pub fn wrist_connection(&self, finger: Finger) -> f32 {
        self.values[WRIST_BASE + finger.index()]
    }

    pub fn set_wrist_connection(&mut self, finger: Finger, length: f32) {
        self.values[WRIST_BASE + finger.index()] = length;
    }

    /// Knuckle-to-knuckle length ending at `finger`'s knuckle, starting at the
    /// previous finger's. Not defined for the thumb.
    pub fn between_knuckles(&self, finger: Finger) -> f32 {
        debug_assert!(finger != Finger::Thumb);
        self.values[BETWEEN_BASE + finger.index().saturating_sub(1)]
    }

    /// Segment of `finger` ending at `end_joint` (1..=3).
    pub fn inside_finger(&self, finger: Finger, end_joint: usize) -> f32 {
        self.values[inside_slot(finger, end_joint)]
    }

    pub fn set_inside_finger(&mut self, finger: Finger, end_joint: usize, length: f32) {
        self.values[inside_slot(finger, end_joint)] = length;
    }

    /// Overall hand size relative to the default hand; 1.0 for the default.
    pub fn scale(&self) -> f32 {
        let default = &Self::DEFAULT;
        let palm: f32 = Finger::PALM
            .iter()
            .map(|&f| self.wrist_connection(f) / default.wrist_connection(f))
            .sum();
        let fingers: f32 = [Finger::Index, Finger::Middle, Finger::Ring]
            .iter()
            .map(|&f| self.inside_finger(f, 1) / default.inside_finger(f, 1))
            .sum();
        (fingers * 7.0 / 6.0 + palm) * 2.0 / 15.0
    }

    /// Linear blend, `t = 0` gives `a`.
    pub fn mix(a: &Self, b: &Self, t: f32) -> Self {
        *a + (*b - *a) * t
    }

    /// Replace outliers in a fresh measurement using a trusted `average`.
    ///
    /// Returns how many lengths were replaced. Running it again against the
    /// same average changes nothing.
    pub fn purify(&mut self, average: &Self) -> usize {
        let default = &Self::DEFAULT;
        let mut rejected = [false; BONE_COUNT];

        for (i, (value, reference)) in self.values.iter().zip(default.values.iter()).enumerate() {
            let in_range = *value > MIN_DEFAULT_RATIO * reference && *value < MAX_DEFAULT_RATIO * reference;
            rejected[i] = !in_range;
        }

        for finger in Finger::ALL {
            let tip = inside_slot(finger, 3);
            let before_tip = inside_slot(finger, 2);
            let ratio = self.values[tip] / self.values[before_tip];
            if !(ratio >= MIN_TIP_RATIO && ratio <= MAX_TIP_RATIO) {
                rejected[tip] = true;
            }
        }

        let mut replaced = 0;
        for i in 0..BONE_COUNT {
            if rejected[i] {
                self.values[i] = average.values[replacement_slot(i)];
                replaced += 1;
            }
        }

        // A little finger longer than the ring finger beyond its knuckle is a mislabel.
        let little_outer = self.inside_finger(Finger::Little, 2) + self.inside_finger(Finger::Little, 3);
        let ring_outer = self.inside_finger(Finger::Ring, 2) + self.inside_finger(Finger::Ring, 3);
        if little_outer > ring_outer {
            self.set_inside_finger(Finger::Little, 3, self.inside_finger(Finger::Ring, 3));
            self.set_inside_finger(Finger::Little, 2, self.inside_finger(Finger::Ring, 2));
            replaced += 1;
        }

        replaced
    }
}

fn inside_slot(finger: Finger, end_joint: usize) -> usize {
    debug_assert!((1..JOINTS_PER_FINGER).contains(&end_joint));
    INSIDE_BASE + finger.index() * SEGMENTS_PER_FINGER + end_joint - 1
}

/// Which averaged length stands in for a rejected one. Fingertips borrow the
/// segment before them, which is measured more reliably.
fn replacement_slot(slot: usize) -> usize {
    if slot >= INSIDE_BASE && (slot - INSIDE_BASE) % SEGMENTS_PER_FINGER == SEGMENTS_PER_FINGER - 1 {
        slot - 1
    } else {
        slot
    }
}

impl Default for BoneLengths {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Add for BoneLengths {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for BoneLengths {
    fn add_assign(&mut self, rhs: Self) {
        for (a, b) in self.values.iter_mut().zip(rhs.values.iter()) {
            *a += b;
        }
    }
}

impl Sub for BoneLengths {
    type Output = Self;

    fn sub(mut self, rhs: Self) -> Self {
        self -= rhs;
        self
    }
}

impl SubAssign for BoneLengths {
    fn sub_assign(&mut self, rhs: Self) {
        for (a, b) in self.values.iter_mut().zip(rhs.values.iter()) {
            *a -= b;
        }
    }
}

impl Mul<f32> for BoneLengths {
    type Output = Self;

    fn mul(mut self, rhs: f32) -> Self {
        self.values.iter_mut().for_each(|v| *v *= rhs);
        self
    }
}

impl Div<f32> for BoneLengths {
    type Output = Self;

    fn div(self, rhs: f32) -> Self {
        self * rhs.recip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_default_scale_is_one() {
        let scale = BoneLengths::DEFAULT.scale();
        assert!(approx_eq(scale, 1.0), "scale: expected 1.0, got {}", scale);
        let doubled = (BoneLengths::DEFAULT * 2.0).scale();
        assert!(approx_eq(doubled, 2.0), "scale: expected 2.0, got {}", doubled);
    }

    #[test]
    fn test_accessor_layout() {
        let lengths = BoneLengths::DEFAULT;
        assert_eq!(lengths.wrist_connection(Finger::Thumb), 0.031);
        assert_eq!(lengths.wrist_connection(Finger::Little), 0.0725);
        assert_eq!(lengths.between_knuckles(Finger::Index), 0.063);
        assert_eq!(lengths.between_knuckles(Finger::Little), 0.023);
        assert_eq!(lengths.inside_finger(Finger::Thumb, 1), 0.032);
        assert_eq!(lengths.inside_finger(Finger::Middle, 2), 0.030);
        assert_eq!(lengths.inside_finger(Finger::Little, 3), 0.020);
    }

    #[test]
    fn test_defaults_survive_purification() {
        let mut lengths = BoneLengths::DEFAULT;
        assert_eq!(lengths.purify(&BoneLengths::DEFAULT), 0);
        assert_eq!(lengths, BoneLengths::DEFAULT);
    }

    #[test]
    fn test_outliers_replaced_from_average() {
        let average = BoneLengths::DEFAULT * 1.1;
        let mut sample = BoneLengths::DEFAULT;
        sample.set_wrist_connection(Finger::Ring, 0.5);
        sample.set_wrist_connection(Finger::Index, 0.01);
        sample.set_inside_finger(Finger::Index, 3, 0.031);

        let replaced = sample.purify(&average);
        assert_eq!(replaced, 3);
        assert!(approx_eq(sample.wrist_connection(Finger::Ring), 0.080 * 1.1));
        assert!(approx_eq(sample.wrist_connection(Finger::Index), 0.081 * 1.1));
        // Rejected tip borrows the averaged segment before it.
        assert!(approx_eq(sample.inside_finger(Finger::Index, 3), 0.024 * 1.1));
        assert!(approx_eq(sample.wrist_connection(Finger::Middle), 0.081));
    }

    #[test]
    fn test_purification_is_idempotent() {
        let average = BoneLengths::DEFAULT;
        let mut sample = BoneLengths::DEFAULT * 1.05;
        sample.set_wrist_connection(Finger::Thumb, f32::NAN);
        sample.set_inside_finger(Finger::Ring, 3, 0.001);
        sample.set_inside_finger(Finger::Little, 2, 0.03);
        sample.values[BETWEEN_BASE + 2] = 0.9;

        let mut once = sample;
        once.purify(&average);
        let mut twice = once;
        let replaced = twice.purify(&average);
        assert_eq!(once, twice);
        assert_eq!(replaced, 0);
        assert!(once.values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_long_little_finger_is_capped_by_ring() {
        let mut sample = BoneLengths::DEFAULT;
        sample.set_inside_finger(Finger::Little, 2, 0.026);
        sample.set_inside_finger(Finger::Little, 3, 0.024);
        sample.purify(&BoneLengths::DEFAULT);
        assert_eq!(sample.inside_finger(Finger::Little, 2), sample.inside_finger(Finger::Ring, 2));
        assert_eq!(sample.inside_finger(Finger::Little, 3), sample.inside_finger(Finger::Ring, 3));
    }

    #[test]
    fn test_from_chains_measures_segments() {
        let wrist = Vector3::zeros();
        let mut chains = [[Vector3::zeros(); JOINTS_PER_FINGER]; FINGER_COUNT];
        for finger in Finger::ALL {
            let x = finger.index() as f32 * 0.02;
            for joint in 0..JOINTS_PER_FINGER {
                chains[finger.index()][joint] = Vector3::new(x, 0.08 + 0.03 * joint as f32, 0.0);
            }
        }
        let lengths = BoneLengths::from_chains(&wrist, &chains);
        assert!(approx_eq(lengths.wrist_connection(Finger::Middle), (0.04f32 * 0.04 + 0.08 * 0.08).sqrt()));
        assert!(approx_eq(lengths.between_knuckles(Finger::Ring), 0.02));
        assert!(approx_eq(lengths.inside_finger(Finger::Thumb, 2), 0.03));
    }

    #[test]
    fn test_mix_endpoints() {
        let a = BoneLengths::DEFAULT;
        let b = BoneLengths::DEFAULT * 2.0;
        assert_eq!(BoneLengths::mix(&a, &b, 0.0), a);
        let half = BoneLengths::mix(&a, &b, 0.5);
        assert!(approx_eq(half.wrist_connection(Finger::Index), 0.081 * 1.5));
    }
}
