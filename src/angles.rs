// src/angles.rs
//! Knuckle layout and finger flexion angles.
//!
//! Knuckles are placed by triangle geometry from the averaged bone lengths
//! and the orientation basis. Flexion angles come from projecting each
//! finger's raw landmarks onto its bending plane through the camera rays.

use nalgebra::{Isometry3, Point3, Vector3};
use serde::Serialize;
use tracing::trace;

use crate::config::AngleConfig;
use crate::geometry::{is_finite, rotate_about, Plane};
use crate::lengths::BoneLengths;
use crate::orientation::OrientationBasis;
use crate::reconstruct::ReconstructedHand;
use crate::topology::{Finger, Handedness, LANDMARK_COUNT};

pub const PALM_FINGERS: usize = 4;

/// Little finger bending plane is tilted away from the other fingers.
pub const LITTLE_FINGER_TILT_DEGREES: f32 = 7.5;
pub const LITTLE_KNUCKLE_SPLAY_DEGREES: f32 = 10.0;
pub const RING_KNUCKLE_SPLAY_DEGREES: f32 = 7.5;

pub const DEFAULT_KNUCKLE_ANGLE_DEGREES: f32 = 90.0;
pub const DEFAULT_FIRST_JOINT_ANGLE_DEGREES: f32 = 0.0;

/// Knuckle and first-joint angles beyond these count as evidence of a wrong hand hypothesis.
pub const IMPLAUSIBLE_KNUCKLE_DEGREES: f32 = 112.0;
pub const IMPLAUSIBLE_FIRST_JOINT_DEGREES: f32 = 22.0;

/// In-plane "up" and bending-plane normal for a palm finger.
pub fn finger_frame(finger: Finger, up: &Vector3<f32>, tangent: &Vector3<f32>) -> (Vector3<f32>, Vector3<f32>) {
    if finger == Finger::Little {
        let (sin, cos) = LITTLE_FINGER_TILT_DEGREES.to_radians().sin_cos();
        (up * cos - tangent * sin, up * sin + tangent * cos)
    } else {
        (*up, *tangent)
    }
}

pub fn palm_normal(up: &Vector3<f32>, tangent: &Vector3<f32>, handedness: Handedness) -> Vector3<f32> {
    up.cross(tangent) * handedness.mirror()
}

/// Index, middle, ring and little knuckles of a hand with the given wrist and palm directions.
pub fn palm_knuckles(
    wrist: &Vector3<f32>,
    up: &Vector3<f32>,
    tangent: &Vector3<f32>,
    lengths: &BoneLengths,
    handedness: Handedness,
) -> [Vector3<f32>; PALM_FINGERS] {
    let to_middle = lengths.wrist_connection(Finger::Middle);
    let middle = wrist + up * to_middle;

    // Angle at the inner knuckle of each wrist/knuckle/knuckle triangle.
    let corner = |to_inner: f32, between: f32, to_outer: f32| {
        let cos = ((to_inner * to_inner + between * between - to_outer * to_outer) / (2.0 * to_inner * between)).clamp(-1.0, 1.0);
        (cos, (1.0 - cos * cos).sqrt())
    };

    let (cos_index, sin_index) = corner(
        to_middle,
        lengths.between_knuckles(Finger::Middle),
        lengths.wrist_connection(Finger::Index),
    );
    let index = middle + (-up * cos_index + tangent * sin_index) * lengths.between_knuckles(Finger::Middle);

    let (cos_ring, sin_ring) = corner(
        to_middle,
        lengths.between_knuckles(Finger::Ring),
        lengths.wrist_connection(Finger::Ring),
    );
    let middle_to_ring = -up * cos_ring - tangent * sin_ring;
    let ring = middle + middle_to_ring * lengths.between_knuckles(Finger::Ring);

    let (cos_little, sin_little) = corner(
        lengths.wrist_connection(Finger::Ring),
        lengths.between_knuckles(Finger::Little),
        lengths.wrist_connection(Finger::Little),
    );
    let wrist_to_ring = (ring - wrist).normalize();
    let outward = (middle_to_ring - wrist_to_ring * middle_to_ring.dot(&wrist_to_ring)).normalize();
    let little = ring + (-wrist_to_ring * cos_little + outward * sin_little) * lengths.between_knuckles(Finger::Little);

    // Palm arch: ring and little knuckles curl towards the palm side.
    let mirror = -handedness.mirror();
    let ring = wrist + rotate_about(&(ring - wrist), up, mirror * RING_KNUCKLE_SPLAY_DEGREES.to_radians());

    let mut wrist_to_little = little - wrist;
    let little_limit = 0.99 * lengths.wrist_connection(Finger::Ring);
    let little_length = lengths.wrist_connection(Finger::Little);
    if little_length > little_limit {
        wrist_to_little *= little_limit / little_length;
    }
    let little = wrist + rotate_about(&wrist_to_little, up, mirror * LITTLE_KNUCKLE_SPLAY_DEGREES.to_radians());

    [index, middle, ring, little]
}

/// Raw camera-space landmarks and camera pose for one frame.
#[derive(Debug, Clone)]
pub struct AngleFrame<'a> {
    pub camera_points: &'a [Vector3<f32>; LANDMARK_COUNT],
    pub world_to_camera: &'a Isometry3<f32>,
    pub close_to_edge: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AngleTracker {
    /// World-space knuckles relative to the basis wrist; index first.
    knuckle_positions: Option<[Vector3<f32>; PALM_FINGERS]>,
    knuckle_angles: [f32; PALM_FINGERS],
    first_joint_angles: [f32; PALM_FINGERS],
}

impl Default for AngleTracker {
    fn default() -> Self {
        Self {
            knuckle_positions: None,
            knuckle_angles: [DEFAULT_KNUCKLE_ANGLE_DEGREES.to_radians(); PALM_FINGERS],
            first_joint_angles: [DEFAULT_FIRST_JOINT_ANGLE_DEGREES.to_radians(); PALM_FINGERS],
        }
    }
}

impl AngleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn knuckle_positions(&self) -> Option<&[Vector3<f32>; PALM_FINGERS]> {
        self.knuckle_positions.as_ref()
    }

    /// Knuckle angle (radians) per palm finger, index first.
    pub fn knuckle_angles(&self) -> &[f32; PALM_FINGERS] {
        &self.knuckle_angles
    }

    pub fn first_joint_angles(&self) -> &[f32; PALM_FINGERS] {
        &self.first_joint_angles
    }

    pub fn update(
        &mut self,
        hand: &ReconstructedHand,
        basis: Option<&OrientationBasis>,
        lengths: &BoneLengths,
        frame: &AngleFrame<'_>,
        config: &AngleConfig,
    ) {
        let Some(basis) = basis else { return };
        if frame.close_to_edge || hand.is_empty() {
            return;
        }

        let to_camera = frame.world_to_camera;
        let tangent = to_camera.transform_vector(&basis.palm_tangent);
        let up = to_camera.transform_vector(&basis.up_direction);
        let wrist = to_camera.transform_point(&Point3::from(basis.wrist_position)).coords;

        let knuckles = palm_knuckles(&wrist, &up, &tangent, lengths, hand.handedness);

        // Bending planes seen edge-on give no usable angle.
        let alignment = wrist.dot(&tangent);
        let view_ok = alignment * alignment >= config.min_view_alignment.powi(2) * wrist.norm_squared();
        if view_ok && hand.wrist.is_some() {
            self.extract_angles(hand, &knuckles, &wrist, &up, &tangent, frame, config);
        } else if !view_ok {
            trace!(alignment, "finger planes edge-on, keeping previous angles");
        }

        let to_world = to_camera.inverse();
        self.knuckle_positions = Some(knuckles.map(|knuckle| {
            to_world.transform_point(&Point3::from(knuckle)).coords - basis.wrist_position
        }));
    }

    #[allow(clippy::too_many_arguments)]
    fn extract_angles(
        &mut self,
        hand: &ReconstructedHand,
        knuckles: &[Vector3<f32>; PALM_FINGERS],
        wrist: &Vector3<f32>,
        up: &Vector3<f32>,
        tangent: &Vector3<f32>,
        frame: &AngleFrame<'_>,
        config: &AngleConfig,
    ) {
        let normal = palm_normal(up, tangent, hand.handedness);

        for (slot, finger) in Finger::PALM.into_iter().enumerate() {
            if !hand.chain(finger).is_resolved() {
                continue;
            }
            let (finger_up, plane_normal) = finger_frame(finger, up, tangent);
            let plane = Plane::new(knuckles[slot], plane_normal);

            let raw = [
                *wrist,
                frame.camera_points[finger.landmark(0)],
                frame.camera_points[finger.landmark(1)],
                frame.camera_points[finger.landmark(2)],
            ];
            let projected = raw.map(|point| plane.intersect_camera_ray(&point));
            let usable = projected
                .iter()
                .all(|p| is_finite(p) && p.z >= config.projected_z_min && p.z <= config.projected_z_max);
            if !usable {
                trace!(finger = finger.name(), "projected joints outside depth window");
                continue;
            }

            let elevation = |from: &Vector3<f32>, to: &Vector3<f32>| -> Option<f32> {
                let direction = (to - from).try_normalize(f32::EPSILON)?;
                Some(direction.dot(&finger_up).atan2(direction.dot(&normal)))
            };
            let (Some(knuckle_angle), Some(second)) = (
                elevation(&projected[1], &projected[2]),
                elevation(&projected[2], &projected[3]),
            ) else {
                continue;
            };
            self.knuckle_angles[slot] = knuckle_angle;
            self.first_joint_angles[slot] = second - knuckle_angle;
        }
    }

    /// How many tracked angles are beyond anatomical plausibility.
    pub fn implausibility_evidence(&self) -> usize {
        let knuckle_limit = IMPLAUSIBLE_KNUCKLE_DEGREES.to_radians();
        let joint_limit = IMPLAUSIBLE_FIRST_JOINT_DEGREES.to_radians();
        self.knuckle_angles.iter().filter(|a| **a > knuckle_limit).count()
            + self.first_joint_angles.iter().filter(|a| **a > joint_limit).count()
    }

    #[cfg(test)]
    pub(crate) fn with_state(
        knuckle_positions: [Vector3<f32>; PALM_FINGERS],
        knuckle_angles: [f32; PALM_FINGERS],
        first_joint_angles: [f32; PALM_FINGERS],
    ) -> Self {
        Self {
            knuckle_positions: Some(knuckle_positions),
            knuckle_angles,
            first_joint_angles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconstruct::FingerChain;
    use crate::topology::JOINTS_PER_FINGER;

    fn basis(wrist: Vector3<f32>) -> OrientationBasis {
        OrientationBasis {
            palm_tangent: -Vector3::x(),
            up_direction: Vector3::y(),
            wrist_position: wrist,
            thumb_base: Vector3::new(-0.022, 0.022, 0.0),
            thumb_joint1: Vector3::new(-0.05, 0.038, 0.0),
            thumb_direction2: Vector3::new(-0.5, 0.866, 0.0),
        }
    }

    #[test]
    fn test_knuckle_layout_respects_lengths() {
        let lengths = BoneLengths::DEFAULT;
        let wrist = Vector3::new(0.02, -0.06, -0.4);
        let knuckles = palm_knuckles(&wrist, &Vector3::y(), &-Vector3::x(), &lengths, Handedness::Left);

        for (slot, finger) in Finger::PALM.into_iter().enumerate() {
            let distance = (knuckles[slot] - wrist).norm();
            let expected = lengths.wrist_connection(finger);
            assert!((distance - expected).abs() < 1e-5, "{}: expected {}, got {}", finger.name(), expected, distance);
        }
        let middle_index = (knuckles[0] - knuckles[1]).norm();
        assert!((middle_index - 0.023).abs() < 1e-5, "middle-index: {}", middle_index);
        let ring_middle = (knuckles[2] - knuckles[1]).norm();
        assert!((ring_middle - 0.019).abs() < 1e-5, "ring-middle: {}", ring_middle);
        // Index on the tangent side, ring and little on the other.
        assert!(knuckles[0].x < wrist.x && knuckles[2].x > wrist.x && knuckles[3].x > knuckles[2].x);
        // Palm arch towards the palm normal (+z for this left hand).
        assert!(knuckles[2].z > wrist.z && knuckles[3].z > knuckles[2].z);
    }

    #[test]
    fn test_layout_mirrors_for_right_hand() {
        let lengths = BoneLengths::DEFAULT;
        let wrist = Vector3::zeros();
        let left = palm_knuckles(&wrist, &Vector3::y(), &-Vector3::x(), &lengths, Handedness::Left);
        let right = palm_knuckles(&wrist, &Vector3::y(), &Vector3::x(), &lengths, Handedness::Right);
        for slot in 0..PALM_FINGERS {
            let mirrored = Vector3::new(-right[slot].x, right[slot].y, right[slot].z);
            assert!((mirrored - left[slot]).norm() < 1e-6, "slot {}: {:?} vs {:?}", slot, left[slot], right[slot]);
        }
    }

    #[test]
    fn test_face_on_palm_keeps_default_angles() {
        let wrist = Vector3::new(0.0, -0.06, -0.4);
        let mut hand = ReconstructedHand::empty(Handedness::Left);
        hand.wrist = Some(wrist);
        let points = [wrist; LANDMARK_COUNT];
        let identity = Isometry3::identity();
        let frame = AngleFrame {
            camera_points: &points,
            world_to_camera: &identity,
            close_to_edge: false,
        };

        let mut tracker = AngleTracker::new();
        tracker.update(&hand, Some(&basis(wrist)), &BoneLengths::DEFAULT, &frame, &AngleConfig::default());
        assert!(tracker.knuckle_positions().is_some());
        assert_eq!(tracker.knuckle_angles(), &[90.0_f32.to_radians(); PALM_FINGERS]);
        assert_eq!(tracker.implausibility_evidence(), 0);
    }

    #[test]
    fn test_bent_index_finger_angles_from_oblique_view() {
        // Palm turned 60 degrees about up so finger planes face the camera.
        let turn = 60.0_f32.to_radians();
        let up = Vector3::y();
        let tangent = rotate_about(&-Vector3::x(), &up, turn);
        let wrist = Vector3::new(0.05, -0.06, -0.4);
        let lengths = BoneLengths::DEFAULT;
        let knuckles = palm_knuckles(&wrist, &up, &tangent, &lengths, Handedness::Left);
        let normal = palm_normal(&up, &tangent, Handedness::Left);

        // Knuckle bent to 45 degrees, first joint a further 30.
        let first = rotate_about(&normal, &tangent, 45.0_f32.to_radians());
        let second = rotate_about(&first, &tangent, (-30.0_f32).to_radians());
        let mut points = [wrist; LANDMARK_COUNT];
        let index = Finger::Index;
        points[index.landmark(0)] = knuckles[0];
        points[index.landmark(1)] = knuckles[0] + first * 0.031;
        points[index.landmark(2)] = points[index.landmark(1)] + second * 0.024;
        points[index.landmark(3)] = points[index.landmark(2)] + second * 0.02;

        let mut hand = ReconstructedHand::empty(Handedness::Left);
        hand.wrist = Some(wrist);
        let chain: [Vector3<f32>; JOINTS_PER_FINGER] = index.landmarks().map(|l| points[l]);
        hand.fingers[index.index()] = FingerChain::Resolved(chain);

        let mut basis = basis(wrist);
        basis.palm_tangent = tangent;
        let identity = Isometry3::identity();
        let frame = AngleFrame {
            camera_points: &points,
            world_to_camera: &identity,
            close_to_edge: false,
        };
        let mut tracker = AngleTracker::new();
        tracker.update(&hand, Some(&basis), &lengths, &frame, &AngleConfig::default());

        let knuckle = tracker.knuckle_angles()[0].to_degrees();
        let joint = tracker.first_joint_angles()[0].to_degrees();
        assert!((knuckle - 45.0).abs() < 0.01, "knuckle: expected 45, got {}", knuckle);
        assert!((joint + 30.0).abs() < 0.01, "first joint: expected -30, got {}", joint);
        // Untracked fingers keep their defaults.
        assert!((tracker.knuckle_angles()[1].to_degrees() - 90.0).abs() < 1e-4);
    }

    #[test]
    fn test_close_to_edge_skips_update() {
        let wrist = Vector3::new(0.0, -0.06, -0.4);
        let mut hand = ReconstructedHand::empty(Handedness::Left);
        hand.wrist = Some(wrist);
        let points = [wrist; LANDMARK_COUNT];
        let identity = Isometry3::identity();
        let frame = AngleFrame {
            camera_points: &points,
            world_to_camera: &identity,
            close_to_edge: true,
        };
        let mut tracker = AngleTracker::new();
        tracker.update(&hand, Some(&basis(wrist)), &BoneLengths::DEFAULT, &frame, &AngleConfig::default());
        assert!(tracker.knuckle_positions().is_none());
    }

    #[test]
    fn test_evidence_counts_hyperextension() {
        let tracker = AngleTracker::with_state(
            [Vector3::zeros(); PALM_FINGERS],
            [120.0_f32.to_radians(), 90.0_f32.to_radians(), 113.0_f32.to_radians(), 10.0_f32.to_radians()],
            [30.0_f32.to_radians(), 0.0, 0.0, -40.0_f32.to_radians()],
        );
        assert_eq!(tracker.implausibility_evidence(), 3);
    }
}
