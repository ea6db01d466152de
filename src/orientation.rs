// src/orientation.rs
//! Palm orientation that survives unreliable frames.
//!
//! Reliable frames set up and tangent directly. On other frames the thumb's
//! yaw around the last stable up direction is tracked, and the last stable
//! tangent is turned by the same amount.

use nalgebra::Vector3;
use serde::Serialize;
use tracing::{debug, trace};

use crate::geometry::{reject, rotate_about};
use crate::lengths::BoneLengths;
use crate::reconstruct::ReconstructedHand;
use crate::topology::Finger;

/// Stable palm frame in world space. Thumb positions are relative to the wrist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrientationBasis {
    pub palm_tangent: Vector3<f32>,
    pub up_direction: Vector3<f32>,
    pub wrist_position: Vector3<f32>,
    pub thumb_base: Vector3<f32>,
    pub thumb_joint1: Vector3<f32>,
    pub thumb_direction2: Vector3<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct OrientationTracker {
    last_up: Option<Vector3<f32>>,
    last_tangent: Option<Vector3<f32>>,
    estimated_tangent: Option<Vector3<f32>>,
    last_wrist: Option<Vector3<f32>>,
    last_thumb_knuckle: Option<Vector3<f32>>,
    last_thumb_joint1: Option<Vector3<f32>>,
    last_thumb_direction2: Option<Vector3<f32>>,
    /// Thumb direction in the (x, up, tangent) frame of the last reliable frame.
    reference_thumb: Option<Vector3<f32>>,
    reference_yaw: Option<f32>,
    basis: Option<OrientationBasis>,
}

impl OrientationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn basis(&self) -> Option<&OrientationBasis> {
        self.basis.as_ref()
    }

    /// Feed one world-space hypothesis. Returns whether the basis was recomputed.
    pub fn update(&mut self, hand: &ReconstructedHand, lengths: &BoneLengths) -> bool {
        let changed = self.observe(hand);
        if changed {
            self.rebuild_basis(lengths)
        } else {
            false
        }
    }

    fn observe(&mut self, hand: &ReconstructedHand) -> bool {
        let directions = match (hand.directions_are_reliable, hand.up_direction, hand.palm_tangent) {
            (true, Some(up), Some(tangent)) => Some((up, tangent)),
            _ => None,
        };

        if let Some((up, tangent)) = directions {
            self.last_up = Some(up);
            let mut next = tangent;
            // The single-knuckle palm fit has no sign for the tangent; keep it continuous.
            if hand.palm_tangent_was_backwards {
                if let Some(last) = self.last_tangent {
                    if next.dot(&last) < -0.8 {
                        next = -next;
                    }
                }
            }
            self.last_tangent = Some(next);
            self.estimated_tangent = Some(next);
            self.reference_thumb = None;
        }

        let Some(wrist) = hand.wrist else {
            return directions.is_some();
        };
        self.last_wrist = Some(wrist);

        let Some(thumb_joint1) = hand.thumb_joint1 else {
            return true;
        };
        if let Some(thumb) = hand.chain(Finger::Thumb).joints() {
            if let Some(direction) = (thumb[2] - thumb_joint1).try_normalize(f32::EPSILON) {
                self.last_thumb_direction2 = Some(direction);
            }
        }

        let joint1 = thumb_joint1 - wrist;
        if let Some(knuckle) = hand.thumb_knuckle {
            self.last_thumb_knuckle = Some(knuckle - wrist);
            self.last_thumb_joint1 = Some(joint1);
        }

        if directions.is_none() && self.reference_thumb.is_none() {
            return true;
        }
        let (Some(up), Some(tangent)) = (self.last_up, self.last_tangent) else {
            return true;
        };
        let Some(thumb_direction) = joint1.try_normalize(f32::EPSILON) else {
            return true;
        };

        let side = up.cross(&tangent);
        let local = Vector3::new(thumb_direction.dot(&side), thumb_direction.dot(&up), thumb_direction.dot(&tangent));

        if directions.is_some() {
            self.reference_thumb = Some(local);
            self.reference_yaw = None;
            return true;
        }

        let Some(reference) = self.reference_thumb else {
            return true;
        };
        let start_yaw = *self.reference_yaw.get_or_insert_with(|| reference.x.atan2(reference.z));
        let end_yaw = local.x.atan2(local.z);
        let candidate = rotate_about(&tangent, &up, end_yaw - start_yaw);

        // Reject rotations that would point the tangent away from the thumb.
        let thumb_across = reject(&thumb_direction, &up);
        if candidate.dot(&thumb_across) > 0.0 {
            trace!(yaw = end_yaw - start_yaw, "palm tangent follows thumb yaw");
            self.estimated_tangent = Some(candidate);
        }
        true
    }

    fn rebuild_basis(&mut self, lengths: &BoneLengths) -> bool {
        let (Some(tangent), Some(up), Some(wrist), Some(knuckle), Some(joint1), Some(direction2)) = (
            self.estimated_tangent,
            self.last_up,
            self.last_wrist,
            self.last_thumb_knuckle,
            self.last_thumb_joint1,
            self.last_thumb_direction2,
        ) else {
            return false;
        };

        // Thumb base projected into the palm plane at its calibrated distance.
        let in_plane = up * knuckle.dot(&up) + tangent * knuckle.dot(&tangent);
        let Some(base_direction) = in_plane.try_normalize(f32::EPSILON) else {
            return false;
        };
        let thumb_base = base_direction * lengths.wrist_connection(Finger::Thumb);
        let Some(first_segment) = (joint1 - thumb_base).try_normalize(f32::EPSILON) else {
            return false;
        };
        let thumb_joint1 = thumb_base + first_segment * lengths.inside_finger(Finger::Thumb, 1);

        self.basis = Some(OrientationBasis {
            palm_tangent: tangent,
            up_direction: up,
            wrist_position: wrist,
            thumb_base,
            thumb_joint1,
            thumb_direction2: direction2,
        });
        debug!(wrist = ?wrist, "orientation basis updated");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconstruct::FingerChain;
    use crate::topology::Handedness;

    fn hand(reliable: bool, tangent: Vector3<f32>, thumb_joint1: Vector3<f32>) -> ReconstructedHand {
        let wrist = Vector3::new(0.0, 0.0, -0.4);
        let mut hand = ReconstructedHand::empty(Handedness::Left);
        hand.wrist = Some(wrist);
        hand.up_direction = Some(Vector3::y());
        hand.palm_tangent = Some(tangent);
        hand.directions_are_reliable = reliable;
        let knuckle = wrist + Vector3::new(-0.022, 0.022, 0.0);
        hand.thumb_knuckle = Some(knuckle);
        hand.thumb_joint1 = Some(thumb_joint1);
        hand.fingers[0] = FingerChain::Resolved([
            knuckle,
            thumb_joint1,
            thumb_joint1 + Vector3::new(-0.014, 0.024, 0.0),
            thumb_joint1 + Vector3::new(-0.026, 0.046, 0.0),
        ]);
        hand
    }

    #[test]
    fn test_reliable_frame_builds_basis() {
        let mut tracker = OrientationTracker::new();
        let joint1 = Vector3::new(-0.05, 0.038, -0.4);
        assert!(tracker.update(&hand(true, -Vector3::x(), joint1), &BoneLengths::DEFAULT));

        let basis = tracker.basis().unwrap();
        assert!((basis.palm_tangent + Vector3::x()).norm() < 1e-6);
        assert!((basis.thumb_base.norm() - 0.031).abs() < 1e-6, "base: {:?}", basis.thumb_base);
        let first = (basis.thumb_joint1 - basis.thumb_base).norm();
        assert!((first - 0.032).abs() < 1e-6, "first thumb segment: {}", first);
        assert!((basis.thumb_direction2.norm() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_no_basis_without_thumb() {
        let mut tracker = OrientationTracker::new();
        let mut frame = hand(true, -Vector3::x(), Vector3::new(-0.05, 0.038, -0.4));
        frame.thumb_joint1 = None;
        frame.thumb_knuckle = None;
        assert!(!tracker.update(&frame, &BoneLengths::DEFAULT));
        assert!(tracker.basis().is_none());
    }

    #[test]
    fn test_empty_hypothesis_is_a_no_op() {
        let mut tracker = OrientationTracker::new();
        let joint1 = Vector3::new(-0.05, 0.038, -0.4);
        tracker.update(&hand(true, -Vector3::x(), joint1), &BoneLengths::DEFAULT);
        let before = *tracker.basis().unwrap();
        assert!(!tracker.update(&ReconstructedHand::empty(Handedness::Left), &BoneLengths::DEFAULT));
        assert_eq!(*tracker.basis().unwrap(), before);
    }

    #[test]
    fn test_unreliable_frame_turns_tangent_with_thumb_yaw() {
        let mut tracker = OrientationTracker::new();
        let wrist = Vector3::new(0.0, 0.0, -0.4);
        let joint1_offset = Vector3::new(-0.04, 0.03, 0.0);
        tracker.update(&hand(true, -Vector3::x(), wrist + joint1_offset), &BoneLengths::DEFAULT);

        // Whole hand yawed by 20 degrees about up; tangent from this frame is garbage.
        let yaw = 20.0_f32.to_radians();
        let turned = rotate_about(&joint1_offset, &Vector3::y(), yaw);
        assert!(tracker.update(&hand(false, Vector3::z(), wrist + turned), &BoneLengths::DEFAULT));

        let expected = rotate_about(&-Vector3::x(), &Vector3::y(), yaw);
        let basis = tracker.basis().unwrap();
        assert!((basis.palm_tangent - expected).norm() < 1e-4, "tangent: {:?}", basis.palm_tangent);
    }

    #[test]
    fn test_backwards_tangent_is_flipped() {
        let mut tracker = OrientationTracker::new();
        let joint1 = Vector3::new(-0.05, 0.038, -0.4);
        tracker.update(&hand(true, -Vector3::x(), joint1), &BoneLengths::DEFAULT);
        let mut flipped = hand(true, Vector3::x(), joint1);
        flipped.palm_tangent_was_backwards = true;
        tracker.update(&flipped, &BoneLengths::DEFAULT);
        assert!((tracker.basis().unwrap().palm_tangent + Vector3::x()).norm() < 1e-6);
    }
}
