// src/pose.rs
//! Forward kinematics from the tracked basis, angles and bone lengths.

use nalgebra::{Unit, UnitQuaternion, Vector3};
use serde::Serialize;

use crate::angles::{finger_frame, palm_normal, AngleTracker, PALM_FINGERS};
use crate::geometry::{reject, slerp_directions};
use crate::lengths::BoneLengths;
use crate::orientation::OrientationBasis;
use crate::topology::{Finger, Handedness, FINGER_COUNT, JOINTS_PER_FINGER, LANDMARK_COUNT};

pub const KNUCKLE_ANGLE_RANGE_DEGREES: (f32, f32) = (-10.0, 95.0);
pub const FIRST_JOINT_ANGLE_RANGE_DEGREES: (f32, f32) = (-120.0, 0.0);
/// First and second joint angles are coupled so they never sum past this.
pub const JOINT_COUPLING_DEGREES: f32 = -185.0;

/// Thumb tangent-component window over which the distal direction blends.
const THUMB_WINDOW_START_DEGREES: f32 = 38.0;
const THUMB_WINDOW_END_DEGREES: f32 = -5.0;
const THUMB_PALM_FADE: f32 = 0.05;

/// Last segment is kept between these fractions of the middle one.
const TIP_RATIO_RANGE: (f32, f32) = (0.6, 1.0);

const CENTER_WRIST_WEIGHT: f32 = 0.375;
const CENTER_JOINT_WEIGHT: f32 = 0.125;

/// Fully determined hand skeleton in world space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hand {
    pub handedness: Handedness,
    pub wrist: Vector3<f32>,
    /// Thumb first, four joints each from knuckle to tip.
    pub fingers: [[Vector3<f32>; JOINTS_PER_FINGER]; FINGER_COUNT],
    /// Knuckle, first and second joint angles (radians) of the palm fingers.
    pub finger_angles: [[f32; 3]; PALM_FINGERS],
    pub palm_tangent: Vector3<f32>,
    pub up_direction: Vector3<f32>,
    pub palm_normal: Vector3<f32>,
    pub center: Vector3<f32>,
}

impl Hand {
    pub fn finger(&self, finger: Finger) -> &[Vector3<f32>; JOINTS_PER_FINGER] {
        &self.fingers[finger.index()]
    }

    pub fn tip(&self, finger: Finger) -> Vector3<f32> {
        self.fingers[finger.index()][JOINTS_PER_FINGER - 1]
    }

    /// Joint positions in landmark order.
    pub fn landmarks(&self) -> [Vector3<f32>; LANDMARK_COUNT] {
        let mut points = [self.wrist; LANDMARK_COUNT];
        for finger in Finger::ALL {
            for (joint, landmark) in finger.landmarks().into_iter().enumerate() {
                points[landmark] = self.fingers[finger.index()][joint];
            }
        }
        points
    }
}

/// Clamp a measured knuckle and first-joint angle and derive the second joint angle.
pub fn clamp_finger_angles(knuckle: f32, first_joint: f32) -> [f32; 3] {
    let (knuckle_min, knuckle_max) = KNUCKLE_ANGLE_RANGE_DEGREES;
    let (joint_min, joint_max) = FIRST_JOINT_ANGLE_RANGE_DEGREES;
    let knuckle = knuckle.clamp(knuckle_min.to_radians(), knuckle_max.to_radians());
    let first_joint = first_joint.clamp(joint_min.to_radians(), joint_max.to_radians());
    let second_joint = first_joint.max(JOINT_COUPLING_DEGREES.to_radians() - first_joint);
    [knuckle, first_joint, second_joint]
}

/// Builds the complete hand. `None` until a basis and a knuckle layout exist.
pub fn synthesize(
    basis: &OrientationBasis,
    angles: &AngleTracker,
    lengths: &BoneLengths,
    handedness: Handedness,
) -> Option<Hand> {
    let knuckle_offsets = angles.knuckle_positions()?;

    let tangent = basis.palm_tangent;
    let up = basis.up_direction;
    let normal = palm_normal(&up, &tangent, handedness);
    let wrist = basis.wrist_position;

    let (direction2, direction3) = thumb_directions(&basis.thumb_joint1, basis.thumb_direction2, &normal, &tangent);
    let thumb_base = wrist + basis.thumb_base;
    let thumb_joint1 = wrist + basis.thumb_joint1;
    let thumb_joint2 = thumb_joint1 + direction2 * lengths.inside_finger(Finger::Thumb, 2);
    let thumb_joint3 = thumb_joint2 + direction3 * tip_length(lengths, Finger::Thumb);

    let mut fingers = [[Vector3::zeros(); JOINTS_PER_FINGER]; FINGER_COUNT];
    fingers[Finger::Thumb.index()] = [thumb_base, thumb_joint1, thumb_joint2, thumb_joint3];

    let mut center = wrist * CENTER_WRIST_WEIGHT + thumb_joint1 * CENTER_JOINT_WEIGHT;
    let mut finger_angles = [[0.0; 3]; PALM_FINGERS];
    let mirror = handedness.mirror();

    for (slot, finger) in Finger::PALM.into_iter().enumerate() {
        let (_, plane_tangent) = finger_frame(finger, &up, &tangent);
        let axis = Unit::new_normalize(plane_tangent);

        // Little finger follows the ring finger.
        let source = slot.min(2);
        let clamped = clamp_finger_angles(angles.knuckle_angles()[source], angles.first_joint_angles()[source]);
        finger_angles[slot] = clamped;

        let rotation = |angle: f32| UnitQuaternion::from_axis_angle(&axis, angle * mirror);
        let first = rotation(clamped[0]) * normal;
        let second = rotation(clamped[1]) * first;
        let third = rotation(clamped[2]) * second;

        let knuckle = wrist + knuckle_offsets[slot];
        let joint1 = knuckle + first * lengths.inside_finger(finger, 1);
        let joint2 = joint1 + second * lengths.inside_finger(finger, 2);
        let joint3 = joint2 + third * tip_length(lengths, finger);

        center += knuckle * CENTER_JOINT_WEIGHT;
        fingers[finger.index()] = [knuckle, joint1, joint2, joint3];
    }

    Some(Hand {
        handedness,
        wrist,
        fingers,
        finger_angles,
        palm_tangent: tangent,
        up_direction: up,
        palm_normal: normal,
        center,
    })
}

fn tip_length(lengths: &BoneLengths, finger: Finger) -> f32 {
    let middle = lengths.inside_finger(finger, 2);
    let (low, high) = TIP_RATIO_RANGE;
    lengths.inside_finger(finger, 3).clamp(low * middle, high * middle)
}

/// Second and third thumb segment directions.
///
/// When the thumb points into the palm, the distal segment continues the bend
/// between the first two segments, faded by how far the thumb crosses the palm.
fn thumb_directions(
    joint1: &Vector3<f32>,
    direction2: Vector3<f32>,
    normal: &Vector3<f32>,
    tangent: &Vector3<f32>,
) -> (Vector3<f32>, Vector3<f32>) {
    let Some(direction1) = joint1.try_normalize(f32::EPSILON) else {
        return (direction2, direction2);
    };
    let towards_palm = direction1.dot(normal);
    if towards_palm <= 0.0 {
        return (direction2, direction2);
    }

    let normal_component = direction2.dot(normal);
    let flat = reject(&direction2, normal)
        .try_normalize(f32::EPSILON)
        .unwrap_or(direction2);
    let tangent_component = flat.dot(tangent).clamp(-1.0, 1.0);
    let direction2 = if normal_component < 0.0 { flat } else { direction2 };

    let bend = UnitQuaternion::rotation_between(&direction1, &direction2).unwrap_or_else(UnitQuaternion::identity);
    let mut direction3 = bend * direction2;
    if normal_component < 0.0 {
        direction3 = reject(&direction3, normal)
            .try_normalize(f32::EPSILON)
            .unwrap_or(direction2);
    }

    if tangent_component < THUMB_WINDOW_END_DEGREES.to_radians().sin() {
        return (direction2, direction3);
    }
    let mut t = (tangent_component.asin() - THUMB_WINDOW_START_DEGREES.to_radians())
        / (THUMB_WINDOW_END_DEGREES - THUMB_WINDOW_START_DEGREES).to_radians();
    if towards_palm < THUMB_PALM_FADE {
        t *= towards_palm / THUMB_PALM_FADE;
    }
    (direction2, slerp_directions(&direction2, &direction3, t.clamp(0.0, 1.0)))
}
