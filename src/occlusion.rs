// src/occlusion.rs
//! 2D occlusion classification.
//!
//! Every finger is turned into simple shapes on the image plane (scaled to the
//! hand-center depth): a disc per joint, a strip per bone and webbing
//! triangles/strips between neighbouring knuckles. A landmark is occluded when
//! a shape of something in front of it contains it. Fingers with a lower index
//! are treated as closer to the camera. Inside one finger the palm-facing
//! direction decides whether joints towards the tip or towards the root are in
//! front.

use nalgebra::Vector2;

use crate::topology::{Finger, Handedness, FINGER_COUNT, JOINTS_PER_FINGER, LANDMARK_COUNT, WRIST};

pub trait OcclusionShape {
    fn contains(&self, point: &Vector2<f32>) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Vector2<f32>,
    pub radius: f32,
}

impl OcclusionShape for Circle {
    fn contains(&self, point: &Vector2<f32>) -> bool {
        (point - self.center).norm_squared() <= self.radius * self.radius
    }
}

/// Straight part of a capsule: the band of half-width `radius` around the
/// segment `start..end`, without end caps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Strip {
    pub start: Vector2<f32>,
    pub end: Vector2<f32>,
    pub radius: f32,
    normal: Option<Vector2<f32>>,
}

impl Strip {
    pub fn new(start: Vector2<f32>, end: Vector2<f32>, radius: f32) -> Self {
        let line = end - start;
        let normal = Vector2::new(-line.y, line.x).try_normalize(f32::EPSILON);
        Self {
            start,
            end,
            radius,
            normal,
        }
    }
}

impl OcclusionShape for Strip {
    fn contains(&self, point: &Vector2<f32>) -> bool {
        // Zero-length segments cover nothing.
        let Some(normal) = self.normal else {
            return false;
        };
        let line = self.end - self.start;
        if (point - self.end).dot(&line) > 0.0 || (point - self.start).dot(&line) < 0.0 {
            return false;
        }
        (point - self.start).dot(&normal).abs() <= self.radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub vertices: [Vector2<f32>; 3],
}

impl Triangle {
    pub fn new(a: Vector2<f32>, b: Vector2<f32>, c: Vector2<f32>) -> Self {
        Self { vertices: [a, b, c] }
    }
}

fn cross_2d(a: &Vector2<f32>, b: &Vector2<f32>) -> f32 {
    a.x * b.y - a.y * b.x
}

impl OcclusionShape for Triangle {
    fn contains(&self, point: &Vector2<f32>) -> bool {
        let [a, b, c] = &self.vertices;
        let signs = [
            cross_2d(&(b - a), &(point - a)) > 0.0,
            cross_2d(&(c - b), &(point - b)) > 0.0,
            cross_2d(&(a - c), &(point - c)) > 0.0,
        ];
        signs[0] == signs[1] && signs[1] == signs[2]
    }
}

/// One joint: a disc at the joint and the strip of the bone leading into it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointShape {
    pub disc: Circle,
    pub bone: Strip,
}

impl OcclusionShape for JointShape {
    fn contains(&self, point: &Vector2<f32>) -> bool {
        self.bone.contains(point) || self.disc.contains(point)
    }
}

/// Webbing between a finger and its neighbour towards the little finger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Connection {
    Web(Triangle),
    Bridge(Strip),
}

impl OcclusionShape for Connection {
    fn contains(&self, point: &Vector2<f32>) -> bool {
        match self {
            Connection::Web(triangle) => triangle.contains(point),
            Connection::Bridge(strip) => strip.contains(point),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FingerShape {
    pub joints: [JointShape; JOINTS_PER_FINGER],
    pub connections: Vec<Connection>,
}

impl FingerShape {
    pub fn build(finger: Finger, points: &[Vector2<f32>; LANDMARK_COUNT], radius: f32) -> Self {
        let landmarks = finger.landmarks();
        let mut connections = Vec::with_capacity(3);

        let joints = std::array::from_fn(|joint| {
            let current = points[landmarks[joint]];
            let previous = if joint == 0 { points[WRIST] } else { points[landmarks[joint - 1]] };

            match (finger, joint) {
                (Finger::Little, _) => {}
                (_, 0) => {
                    // Webbing to the next finger's knuckle.
                    let neighbour = points[landmarks[0] + JOINTS_PER_FINGER];
                    connections.push(Connection::Web(Triangle::new(previous, current, neighbour)));
                    if finger != Finger::Thumb {
                        connections.push(Connection::Bridge(Strip::new(current, neighbour, radius)));
                    }
                }
                (Finger::Thumb, 1) => {
                    let index_knuckle = points[Finger::Index.knuckle()];
                    connections.push(Connection::Web(Triangle::new(previous, current, index_knuckle)));
                    connections.push(Connection::Bridge(Strip::new(current, index_knuckle, radius)));
                }
                _ => {}
            }

            JointShape {
                disc: Circle { center: current, radius },
                bone: Strip::new(previous, current, radius),
            }
        });

        Self { joints, connections }
    }

    pub fn contains(&self, point: &Vector2<f32>, testing_connections: bool) -> bool {
        self.joints.iter().any(|joint| joint.contains(point))
            || (testing_connections && self.connections_contain(point))
    }

    pub fn connections_contain(&self, point: &Vector2<f32>) -> bool {
        self.connections.iter().any(|connection| connection.contains(point))
    }

    /// Whether joints of this same finger cover `point`, which sits at `joint`.
    ///
    /// With `towards_root` the bones between the root and the joint are in
    /// front; otherwise the joints further towards the tip are.
    pub fn occludes_own_joint(&self, point: &Vector2<f32>, joint: usize, towards_root: bool) -> bool {
        if towards_root {
            return self.joints[..joint].iter().any(|shape| shape.contains(point));
        }
        if joint == 3 {
            return false;
        }
        if self.joints[joint + 1..].iter().any(|shape| shape.disc.contains(point)) {
            return true;
        }
        if joint == 2 {
            return false;
        }
        self.joints[joint + 2..].iter().any(|shape| shape.bone.contains(point))
    }
}

/// Whether the palm faces the camera, from the knuckle-line orientation.
pub fn is_front_facing(points: &[Vector2<f32>; LANDMARK_COUNT], handedness: Handedness) -> bool {
    let along_palm = (points[Finger::Middle.knuckle()] + points[Finger::Ring.knuckle()]) * 0.5 - points[WRIST];
    let across_palm = points[Finger::Little.knuckle()] - points[Finger::Index.knuckle()];
    handedness.is_right() == (cross_2d(&along_palm, &across_palm) > 0.0)
}

/// Classify every landmark as occluded (`true`) or visible.
pub fn classify(points: &[Vector2<f32>; LANDMARK_COUNT], is_front: bool, radius: f32) -> [bool; LANDMARK_COUNT] {
    let fingers: [FingerShape; FINGER_COUNT] = std::array::from_fn(|i| FingerShape::build(Finger::ALL[i], points, radius));
    let mut occluded = [false; LANDMARK_COUNT];

    occluded[WRIST] = fingers
        .iter()
        .any(|finger| finger.occludes_own_joint(&points[WRIST], 1, false));

    for (f, finger) in Finger::ALL.into_iter().enumerate() {
        for joint in 0..JOINTS_PER_FINGER {
            let landmark = finger.landmark(joint);
            let point = &points[landmark];

            if fingers[f].occludes_own_joint(point, joint, !is_front) {
                occluded[landmark] = true;
                continue;
            }

            occluded[landmark] = if finger == Finger::Thumb {
                // The thumb root and first joint sit under the palm web and are never covered by other fingers.
                joint >= 2
                    && (fingers[1..].iter().any(|other| other.contains(point, true))
                        || fingers[0].connections_contain(point))
            } else {
                fingers[..f]
                    .iter()
                    .enumerate()
                    .any(|(i, other)| other.contains(point, i + 1 < f || joint > 0))
            };
        }
    }

    occluded
}
