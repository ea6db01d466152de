// src/plane_fit.rs
//! Per-finger bending planes.
//!
//! Each finger bends (approximately) inside one plane. When at least two of
//! its landmarks are visible and the visible bones are not all colinear, the
//! plane normal is the summed cross product of the bone directions. Occluded
//! landmarks are then recovered by intersecting their camera rays with it.

use nalgebra::Vector3;

use crate::geometry::Plane;
use crate::topology::{Finger, JOINTS_PER_FINGER, LANDMARK_COUNT, WRIST};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FingerObservation {
    pub finger: Finger,
    /// Visibility per joint, knuckle first.
    pub visible: [bool; JOINTS_PER_FINGER],
    pub plane: Option<Plane>,
}

impl FingerObservation {
    pub fn is_visible(&self, joint: usize) -> bool {
        self.visible[joint]
    }

    pub fn fully_visible(&self) -> bool {
        self.visible.iter().all(|v| *v)
    }
}

/// Collect visibility for one finger and fit its bending plane.
pub fn observe_finger(
    finger: Finger,
    points: &[Vector3<f32>; LANDMARK_COUNT],
    occluded: &[bool; LANDMARK_COUNT],
    colinearity_threshold: f32,
) -> FingerObservation {
    let landmarks = finger.landmarks();
    let visible = std::array::from_fn(|joint| !occluded[landmarks[joint]]);
    let plane = fit_bending_plane(finger, points, occluded, colinearity_threshold);
    FingerObservation { finger, visible, plane }
}

pub fn fit_bending_plane(
    finger: Finger,
    points: &[Vector3<f32>; LANDMARK_COUNT],
    occluded: &[bool; LANDMARK_COUNT],
    colinearity_threshold: f32,
) -> Option<Plane> {
    let landmarks = finger.landmarks();
    let visible: Vec<usize> = (0..JOINTS_PER_FINGER)
        .filter(|&joint| !occluded[landmarks[joint]])
        .collect();
    if visible.len() < 2 {
        return None;
    }

    let mut pairs: Vec<(usize, usize)> = Vec::with_capacity(4);
    // The wrist-to-knuckle bone lies in the bending plane for the thumb and middle finger only.
    if matches!(finger, Finger::Thumb | Finger::Middle) && !occluded[WRIST] && !occluded[landmarks[0]] {
        pairs.push((WRIST, landmarks[0]));
    }
    pairs.extend(visible.windows(2).map(|w| (landmarks[w[0]], landmarks[w[1]])));
    if pairs.len() < 2 {
        return None;
    }

    let directions: Vec<Vector3<f32>> = pairs
        .iter()
        .filter_map(|&(from, to)| (points[to] - points[from]).try_normalize(f32::EPSILON))
        .collect();

    let mut normal_sum = Vector3::zeros();
    for (i, first) in directions.iter().enumerate() {
        for second in &directions[i + 1..] {
            if first.dot(second) < colinearity_threshold {
                normal_sum += first.cross(second);
            }
        }
    }
    let normal = normal_sum.try_normalize(1e-9)?;

    // Middle joints carry more weight; they constrain the bend best.
    let (weighted_sum, weight_total) = visible.iter().fold((Vector3::zeros(), 0.0_f32), |(sum, total), &joint| {
        let weight = if joint == 1 || joint == 2 { 2.0 } else { 1.0 };
        (sum + points[landmarks[joint]] * weight, total + weight)
    });

    Some(Plane::new(weighted_sum / weight_total, normal))
}

/// Recover a hidden landmark from its camera ray and the finger plane.
pub fn reproject(plane: &Plane, raw: &Vector3<f32>) -> Vector3<f32> {
    plane.intersect_camera_ray(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bent_index_finger() -> [Vector3<f32>; LANDMARK_COUNT] {
        let mut points = [Vector3::new(0.0, -0.05, -0.4); LANDMARK_COUNT];
        // Bends towards the camera inside the plane x = -0.02.
        let joints = [
            Vector3::new(-0.02, 0.03, -0.40),
            Vector3::new(-0.02, 0.06, -0.39),
            Vector3::new(-0.02, 0.075, -0.37),
            Vector3::new(-0.02, 0.08, -0.35),
        ];
        for (joint, point) in joints.into_iter().enumerate() {
            points[Finger::Index.landmark(joint)] = point;
        }
        points
    }

    #[test]
    fn test_plane_normal_is_perpendicular_to_bend() {
        let points = bent_index_finger();
        let occluded = [false; LANDMARK_COUNT];
        let plane = fit_bending_plane(Finger::Index, &points, &occluded, 0.95).unwrap();
        assert!(plane.normal.x.abs() > 0.999, "normal should be along x, got {:?}", plane.normal);
        assert!((plane.point.x + 0.02).abs() < 1e-6);
        for joint in 0..JOINTS_PER_FINGER {
            let d = plane.signed_distance(&points[Finger::Index.landmark(joint)]);
            assert!(d.abs() < 1e-6, "joint {} off plane by {}", joint, d);
        }
    }

    #[test]
    fn test_hidden_joint_recovered_by_reprojection() {
        let points = bent_index_finger();
        let mut occluded = [false; LANDMARK_COUNT];
        occluded[Finger::Index.landmark(2)] = true;

        let observation = observe_finger(Finger::Index, &points, &occluded, 0.95);
        assert_eq!(observation.visible, [true, true, false, true]);

        let plane = observation.plane.unwrap();
        // A bad depth estimate on the same camera ray.
        let truth = points[Finger::Index.landmark(2)];
        let recovered = reproject(&plane, &(truth * 1.2));
        assert!((recovered - truth).norm() < 1e-5, "got {:?}", recovered);
    }

    #[test]
    fn test_straight_finger_has_no_plane() {
        let mut points = [Vector3::new(0.0, -0.05, -0.4); LANDMARK_COUNT];
        for joint in 0..JOINTS_PER_FINGER {
            points[Finger::Middle.landmark(joint)] = Vector3::new(0.0, 0.03 + 0.03 * joint as f32, -0.4);
        }
        let occluded = [false; LANDMARK_COUNT];
        assert!(fit_bending_plane(Finger::Middle, &points, &occluded, 0.95).is_none());
    }

    #[test]
    fn test_single_visible_joint_has_no_plane() {
        let points = bent_index_finger();
        let mut occluded = [true; LANDMARK_COUNT];
        occluded[Finger::Index.landmark(1)] = false;
        let observation = observe_finger(Finger::Index, &points, &occluded, 0.95);
        assert!(observation.plane.is_none());
        assert_eq!(observation.visible, [false, true, false, false]);
    }
}
