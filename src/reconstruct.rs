// src/reconstruct.rs
//! Per-frame 3D hand hypothesis from projected landmarks.
//!
//! Occluded landmarks are recovered from finger bending planes; fingers
//! without a usable plane borrow one derived from the palm plane. The result
//! also carries palm directions for the orientation tracker.

use nalgebra::{Isometry3, Point3, Vector3};
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::ReconstructionConfig;
use crate::geometry::{reject, Plane};
use crate::lengths::BoneLengths;
use crate::occlusion;
use crate::plane_fit::{observe_finger, reproject, FingerObservation};
use crate::projector::ProjectedLandmarks;
use crate::topology::{Finger, Handedness, FINGER_COUNT, JOINTS_PER_FINGER, LANDMARK_COUNT, THUMB_CMC, THUMB_MCP, WRIST};

/// A finger is either fully determined or not at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum FingerChain {
    Unresolved,
    Resolved([Vector3<f32>; JOINTS_PER_FINGER]),
}

impl FingerChain {
    pub fn joints(&self) -> Option<&[Vector3<f32>; JOINTS_PER_FINGER]> {
        match self {
            FingerChain::Resolved(joints) => Some(joints),
            FingerChain::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, FingerChain::Resolved(_))
    }

    fn map(&self, f: impl Fn(&Vector3<f32>) -> Vector3<f32>) -> Self {
        match self {
            FingerChain::Resolved(joints) => FingerChain::Resolved(joints.map(|joint| f(&joint))),
            FingerChain::Unresolved => FingerChain::Unresolved,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconstructedHand {
    pub handedness: Handedness,
    pub wrist: Option<Vector3<f32>>,
    pub fingers: [FingerChain; FINGER_COUNT],
    /// Points from the middle knuckle line towards the index finger, inside the palm plane.
    pub palm_tangent: Option<Vector3<f32>>,
    /// Points from the wrist towards the knuckles.
    pub up_direction: Option<Vector3<f32>>,
    pub directions_are_reliable: bool,
    /// Palm tangent pointed away from the viewer in camera space.
    pub palm_tangent_was_backwards: bool,
    pub thumb_knuckle: Option<Vector3<f32>>,
    pub thumb_joint1: Option<Vector3<f32>>,
}

impl ReconstructedHand {
    pub fn empty(handedness: Handedness) -> Self {
        Self {
            handedness,
            wrist: None,
            fingers: [FingerChain::Unresolved; FINGER_COUNT],
            palm_tangent: None,
            up_direction: None,
            directions_are_reliable: false,
            palm_tangent_was_backwards: false,
            thumb_knuckle: None,
            thumb_joint1: None,
        }
    }

    pub fn chain(&self, finger: Finger) -> &FingerChain {
        &self.fingers[finger.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.wrist.is_none() && self.fingers.iter().all(|chain| !chain.is_resolved())
    }

    pub fn is_only_wrist(&self) -> bool {
        self.wrist.is_some() && self.fingers.iter().all(|chain| !chain.is_resolved())
    }

    pub fn is_complete(&self) -> bool {
        self.wrist.is_some() && self.fingers.iter().all(FingerChain::is_resolved)
    }

    /// Same hypothesis in another frame. Directions rotate, points move.
    pub fn transformed(&self, transform: &Isometry3<f32>) -> Self {
        let point = |p: &Vector3<f32>| transform.transform_point(&Point3::from(*p)).coords;
        let direction = |d: &Vector3<f32>| transform.transform_vector(d);
        Self {
            handedness: self.handedness,
            wrist: self.wrist.as_ref().map(point),
            fingers: self.fingers.map(|chain| chain.map(point)),
            palm_tangent: self.palm_tangent.as_ref().map(direction),
            up_direction: self.up_direction.as_ref().map(direction),
            directions_are_reliable: self.directions_are_reliable,
            palm_tangent_was_backwards: self.palm_tangent_was_backwards,
            thumb_knuckle: self.thumb_knuckle.as_ref().map(point),
            thumb_joint1: self.thumb_joint1.as_ref().map(point),
        }
    }
}

/// Per-frame reconstruction diagnostics, kept beside the hand for callers that want them.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameAnalysis {
    pub occluded: [bool; LANDMARK_COUNT],
    pub is_front: bool,
    pub observations: [FingerObservation; FINGER_COUNT],
}

#[derive(Debug, Clone)]
pub struct FrameReconstructor {
    config: ReconstructionConfig,
}

impl FrameReconstructor {
    pub fn new(config: ReconstructionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Occlusion flags, facing and per-finger planes for one frame.
    pub fn analyze(&self, projected: &ProjectedLandmarks, handedness: Handedness) -> FrameAnalysis {
        let is_front = occlusion::is_front_facing(&projected.points_2d, handedness);
        let mut occluded = occlusion::classify(&projected.points_2d, is_front, self.config.occlusion_radius);

        for (landmark, point) in projected.points_3d.iter().enumerate() {
            if !self.config.depth_in_band(-point.z, projected.center_depth) {
                occluded[landmark] = true;
            }
        }

        let observations = std::array::from_fn(|i| {
            observe_finger(
                Finger::ALL[i],
                &projected.points_3d,
                &occluded,
                self.config.colinearity_threshold,
            )
        });

        FrameAnalysis {
            occluded,
            is_front,
            observations,
        }
    }

    /// Build the camera-space hypothesis for one hand.
    ///
    /// `lengths` is the hand's current bone-length average, used to reject
    /// implausible knuckles.
    pub fn reconstruct(
        &self,
        projected: &ProjectedLandmarks,
        handedness: Handedness,
        lengths: &BoneLengths,
    ) -> ReconstructedHand {
        let analysis = self.analyze(projected, handedness);
        self.reconstruct_from(projected, handedness, lengths, &analysis)
    }

    pub fn reconstruct_from(
        &self,
        projected: &ProjectedLandmarks,
        handedness: Handedness,
        lengths: &BoneLengths,
        analysis: &FrameAnalysis,
    ) -> ReconstructedHand {
        let points = &projected.points_3d;
        let occluded = &analysis.occluded;
        let observations = &analysis.observations;
        let mut hand = ReconstructedHand::empty(handedness);

        let wrist = (!occluded[WRIST]).then_some(points[WRIST]);

        let determined_knuckles = Finger::PALM
            .iter()
            .filter(|f| {
                let observation = &observations[f.index()];
                observation.plane.is_some() || observation.is_visible(0)
            })
            .count();
        let determined_planes = Finger::PALM
            .iter()
            .filter(|f| observations[f.index()].plane.is_some())
            .count();

        if determined_knuckles < 2 && determined_planes == 0 {
            trace!(handedness = handedness.name(), "not enough knuckles for a palm");
            hand.wrist = wrist;
            return hand;
        }

        let mut planes: [Option<Plane>; FINGER_COUNT] = std::array::from_fn(|i| observations[i].plane);
        let mut knuckles: [Option<Vector3<f32>>; FINGER_COUNT] = std::array::from_fn(|i| {
            let observation = &observations[i];
            let raw = points[Finger::ALL[i].knuckle()];
            if observation.is_visible(0) {
                Some(raw)
            } else {
                observation.plane.map(|plane| reproject(&plane, &raw))
            }
        });

        // Thumb resolves before the palm; its knuckle is not on the knuckle line.
        hand.fingers[Finger::Thumb.index()] = self.finger_chain(Finger::Thumb, points, knuckles[0], &planes[0], &observations[0]);

        let Some(wrist_point) = wrist else {
            for finger in Finger::PALM {
                let i = finger.index();
                hand.fingers[i] = self.finger_chain(finger, points, knuckles[i], &planes[i], &observations[i]);
            }
            self.finalize(&mut hand, points, occluded, projected.center_depth);
            return hand;
        };
        hand.wrist = Some(wrist_point);

        // Knuckles at anatomically impossible distances from the wrist.
        for finger in Finger::PALM {
            let i = finger.index();
            let Some(knuckle) = knuckles[i] else { continue };
            let expected = lengths.wrist_connection(finger);
            let distance_squared = (knuckle - wrist_point).norm_squared();
            let too_close = distance_squared < (0.4 * expected).powi(2);
            let too_far = distance_squared >= (1.95 * expected).powi(2);
            if too_close || too_far {
                debug!(finger = finger.name(), distance = distance_squared.sqrt(), expected, "implausible knuckle");
                planes[i] = None;
                if !observations[i].is_visible(0) {
                    knuckles[i] = None;
                }
            }
        }

        let present: Vec<Finger> = Finger::PALM
            .into_iter()
            .filter(|f| knuckles[f.index()].is_some())
            .collect();
        if present.is_empty() {
            self.finalize(&mut hand, points, occluded, projected.center_depth);
            return hand;
        }

        let thumb_knuckle = knuckles[Finger::Thumb.index()];
        let Some(palm) = self.palm_frame(&present, &knuckles, &planes, wrist_point, thumb_knuckle, projected) else {
            for finger in Finger::PALM {
                let i = finger.index();
                hand.fingers[i] = self.finger_chain(finger, points, knuckles[i], &planes[i], &observations[i]);
            }
            self.finalize(&mut hand, points, occluded, projected.center_depth);
            return hand;
        };

        for finger in Finger::PALM {
            let i = finger.index();
            if knuckles[i].is_none() {
                knuckles[i] = Some(palm.plane.intersect_camera_ray(&points[finger.knuckle()]));
            }
            if planes[i].is_none() {
                planes[i] = knuckles[i].map(|knuckle| Plane::new(knuckle, palm.tangent));
            }
            hand.fingers[i] = self.finger_chain(finger, points, knuckles[i], &planes[i], &observations[i]);
        }

        hand.palm_tangent = Some(palm.tangent);
        hand.up_direction = palm.up;
        hand.directions_are_reliable = palm.reliable;
        hand.palm_tangent_was_backwards = palm.tangent.dot(&Vector3::z()) < -0.3;

        self.finalize(&mut hand, points, occluded, projected.center_depth);
        hand
    }

    /// Joint chain for one finger. With a plane every hidden joint is
    /// reprojected; without one the finger must be fully visible.
    fn finger_chain(
        &self,
        finger: Finger,
        points: &[Vector3<f32>; LANDMARK_COUNT],
        knuckle: Option<Vector3<f32>>,
        plane: &Option<Plane>,
        observation: &FingerObservation,
    ) -> FingerChain {
        let Some(knuckle) = knuckle else {
            return FingerChain::Unresolved;
        };
        let landmarks = finger.landmarks();
        match plane {
            Some(plane) => {
                let mut joints = [knuckle; JOINTS_PER_FINGER];
                for joint in 1..JOINTS_PER_FINGER {
                    let raw = points[landmarks[joint]];
                    joints[joint] = if observation.is_visible(joint) { raw } else { reproject(plane, &raw) };
                }
                FingerChain::Resolved(joints)
            }
            None if observation.fully_visible() => FingerChain::Resolved(landmarks.map(|landmark| points[landmark])),
            None => FingerChain::Unresolved,
        }
    }

    fn palm_frame(
        &self,
        present: &[Finger],
        knuckles: &[Option<Vector3<f32>>; FINGER_COUNT],
        planes: &[Option<Plane>; FINGER_COUNT],
        wrist: Vector3<f32>,
        thumb_knuckle: Option<Vector3<f32>>,
        projected: &ProjectedLandmarks,
    ) -> Option<PalmFrame> {
        let knuckle = |finger: Finger| knuckles[finger.index()];

        if let [only] = present {
            // One knuckle: its bending plane normal is the palm tangent.
            let plane = planes[only.index()]?;
            let point = knuckle(*only)?;
            let up = match only {
                Finger::Middle => (point - wrist).try_normalize(f32::EPSILON),
                Finger::Index => thumb_knuckle.and_then(|thumb| (point - thumb).try_normalize(f32::EPSILON)),
                _ => None,
            };
            let tangent = match up {
                Some(up) => reject(&plane.normal, &up).try_normalize(f32::EPSILON)?,
                None => plane.normal,
            };
            let normal = up.unwrap_or(point - wrist).cross(&plane.normal).try_normalize(f32::EPSILON)?;
            return Some(PalmFrame {
                plane: Plane::new(wrist, normal),
                tangent,
                up,
                reliable: false,
            });
        }

        let mut reliable = false;
        let up = if let Some(middle) = knuckle(Finger::Middle) {
            if knuckle(Finger::Index).is_some() {
                reliable = !self.thumb_crowds_knuckles(projected);
            }
            (middle - wrist).try_normalize(f32::EPSILON)
        } else if let Some(index) = knuckle(Finger::Index) {
            if let Some(ring) = knuckle(Finger::Ring) {
                (index + ring - wrist * 2.0).try_normalize(f32::EPSILON)
            } else if let Some(little) = knuckle(Finger::Little) {
                (index + little * 0.5 - wrist * 1.5).try_normalize(f32::EPSILON)
            } else {
                thumb_knuckle.and_then(|thumb| (index - thumb).try_normalize(f32::EPSILON))
            }
        } else {
            None
        };

        let first = knuckle(present[0])?;
        let second = knuckle(present[1])?;
        let delta = first - second;
        let tangent = match up {
            Some(up) => reject(&delta, &up),
            None => delta,
        }
        .try_normalize(f32::EPSILON)?;

        let center = present
            .iter()
            .filter_map(|f| knuckle(*f))
            .sum::<Vector3<f32>>()
            / present.len() as f32;
        let normal = up.unwrap_or(center - wrist).cross(&tangent).try_normalize(f32::EPSILON)?;

        Some(PalmFrame {
            plane: Plane::new(center, normal),
            tangent,
            up,
            reliable,
        })
    }

    /// The thumb lying across the index or middle knuckle in the image makes
    /// those knuckles' positions untrustworthy.
    fn thumb_crowds_knuckles(&self, projected: &ProjectedLandmarks) -> bool {
        let limit = self.config.crowding_distance.powi(2);
        let thumb = &projected.points_2d[THUMB_MCP..=THUMB_MCP + 2];
        [Finger::Index.knuckle(), Finger::Middle.knuckle()].iter().any(|&knuckle| {
            let knuckle = projected.points_2d[knuckle];
            thumb.iter().any(|joint| (joint - knuckle).norm_squared() < limit)
        })
    }

    /// Thumb references and the last depth sanity pass over every chain.
    fn finalize(
        &self,
        hand: &mut ReconstructedHand,
        points: &[Vector3<f32>; LANDMARK_COUNT],
        occluded: &[bool; LANDMARK_COUNT],
        center_depth: f32,
    ) {
        hand.thumb_knuckle = (!occluded[THUMB_CMC]).then_some(points[THUMB_CMC]);
        hand.thumb_joint1 = (!occluded[THUMB_MCP]).then_some(points[THUMB_MCP]);

        for chain in hand.fingers.iter_mut() {
            let keep = chain
                .joints()
                .map(|joints| joints.iter().all(|joint| self.config.depth_in_band(-joint.z, center_depth)));
            if keep == Some(false) {
                *chain = FingerChain::Unresolved;
            }
        }
    }
}

struct PalmFrame {
    plane: Plane,
    tangent: Vector3<f32>,
    up: Option<Vector3<f32>>,
    reliable: bool,
}
