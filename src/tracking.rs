// src/tracking.rs - Per-hand tracking sessions
use nalgebra::{Isometry3, Vector2, Vector3};
use serde::Serialize;
use tracing::{debug, trace};

use crate::angles::{AngleFrame, AngleTracker};
use crate::config::TrackerConfig;
use crate::detection::DetectionQuality;
use crate::length_tracker::BoneLengthTracker;
use crate::lengths::BoneLengths;
use crate::orientation::{OrientationBasis, OrientationTracker};
use crate::pose::{self, Hand};
use crate::projector::{CameraModel, Detected2D, PointProjector};
use crate::reconstruct::{FrameReconstructor, ReconstructedHand};
use crate::topology::{Handedness, LANDMARK_COUNT};

/// One frame of detector output for a single hand.
#[derive(Debug, Clone)]
pub struct HandFrame {
    pub timestamp: f64,
    pub landmarks: [Detected2D; LANDMARK_COUNT],
    /// Rough distance of the hand center from the camera, in meters.
    pub center_depth: f32,
    pub camera: CameraModel,
    pub camera_to_world: Isometry3<f32>,
}

impl HandFrame {
    pub fn assess(&self, config: &TrackerConfig) -> DetectionQuality {
        let points: [Vector2<f32>; LANDMARK_COUNT] = self.landmarks.map(|landmark| landmark.position());
        DetectionQuality::from_points(&points, self.camera.resolution.aspect_ratio(), &config.detection)
    }
}

/// Camera-side data the trackers need besides the world-space hypothesis.
#[derive(Debug, Clone)]
pub struct FrameContext<'a> {
    pub camera_points: &'a [Vector3<f32>; LANDMARK_COUNT],
    pub camera_to_world: Isometry3<f32>,
    pub close_to_edge: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackingStats {
    pub frames: u64,
    pub rejected_detections: u64,
    pub empty_frames: u64,
    /// Hypotheses with a wrist but no finger chains.
    pub wrist_only_frames: u64,
    pub length_samples: u64,
}

/// Tracking state for one hand. Left and right hands each get their own.
#[derive(Debug, Clone)]
pub struct HandTracker {
    handedness: Handedness,
    config: TrackerConfig,
    reconstructor: FrameReconstructor,
    lengths: BoneLengthTracker,
    orientation: OrientationTracker,
    angles: AngleTracker,
    stats: TrackingStats,
}

impl HandTracker {
    pub fn new(handedness: Handedness, config: TrackerConfig) -> Self {
        Self {
            handedness,
            reconstructor: FrameReconstructor::new(config.reconstruction.clone()),
            config,
            lengths: BoneLengthTracker::new(),
            orientation: OrientationTracker::new(),
            angles: AngleTracker::new(),
            stats: TrackingStats::default(),
        }
    }

    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    pub fn stats(&self) -> &TrackingStats {
        &self.stats
    }

    /// Runs the whole pipeline for one frame and returns the current hand, if any.
    pub fn process_frame(&mut self, frame: &HandFrame) -> Option<Hand> {
        let quality = frame.assess(&self.config);
        self.process_assessed(frame, &quality)
    }

    pub fn process_assessed(&mut self, frame: &HandFrame, quality: &DetectionQuality) -> Option<Hand> {
        self.stats.frames += 1;
        if !quality.is_usable() {
            self.stats.rejected_detections += 1;
            debug!(
                handedness = self.handedness.name(),
                small = quality.is_small(),
                flatness = quality.flatness,
                "detection rejected"
            );
            return self.completed_hand();
        }

        let projector = PointProjector::from_camera(&frame.camera);
        let projected = projector.project(&frame.landmarks, frame.center_depth);
        let average = self.lengths.average_lengths();
        let camera_hand = self.reconstructor.reconstruct(&projected, self.handedness, &average);
        let world_hand = camera_hand.transformed(&frame.camera_to_world);

        let context = FrameContext {
            camera_points: &projected.points_3d,
            camera_to_world: frame.camera_to_world,
            close_to_edge: quality.is_close_to_edge(),
        };
        self.input_hand_data(&world_hand, &context);
        self.completed_hand()
    }

    /// Feed a world-space hypothesis to the trackers.
    ///
    /// An empty hypothesis changes nothing.
    pub fn input_hand_data(&mut self, hand: &ReconstructedHand, context: &FrameContext<'_>) {
        if hand.is_empty() {
            self.stats.empty_frames += 1;
            trace!(handedness = self.handedness.name(), "empty hypothesis");
            return;
        }
        if hand.is_only_wrist() {
            self.stats.wrist_only_frames += 1;
            trace!(handedness = self.handedness.name(), "only the wrist resolved");
        }

        if hand.directions_are_reliable {
            if let Some(sample) = BoneLengths::measure(hand) {
                self.lengths.push(sample);
                self.stats.length_samples += 1;
            }
        }

        let average = self.lengths.average_lengths();
        self.orientation.update(hand, &average);

        let world_to_camera = context.camera_to_world.inverse();
        let frame = AngleFrame {
            camera_points: context.camera_points,
            world_to_camera: &world_to_camera,
            close_to_edge: context.close_to_edge,
        };
        self.angles
            .update(hand, self.orientation.basis(), &average, &frame, &self.config.angles);
    }

    pub fn completed_hand(&self) -> Option<Hand> {
        let basis = self.orientation.basis()?;
        pose::synthesize(basis, &self.angles, &self.lengths.average_lengths(), self.handedness)
    }

    /// Extreme angles seen for this hypothesis. Higher means the handedness is more likely wrong.
    pub fn implausibility_evidence(&self) -> usize {
        self.angles.implausibility_evidence()
    }

    pub fn average_lengths(&self) -> BoneLengths {
        self.lengths.average_lengths()
    }

    pub fn scale(&self) -> f32 {
        self.average_lengths().scale()
    }

    pub fn basis(&self) -> Option<&OrientationBasis> {
        self.orientation.basis()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingResult {
    pub timestamp: f64,
    pub quality: DetectionQuality,
    pub left: Option<Hand>,
    pub right: Option<Hand>,
    pub left_evidence: usize,
    pub right_evidence: usize,
}

impl TrackingResult {
    pub fn hand(&self, handedness: Handedness) -> Option<&Hand> {
        match handedness {
            Handedness::Left => self.left.as_ref(),
            Handedness::Right => self.right.as_ref(),
        }
    }

    pub fn evidence(&self, handedness: Handedness) -> usize {
        match handedness {
            Handedness::Left => self.left_evidence,
            Handedness::Right => self.right_evidence,
        }
    }
}

/// Tracks the same detections as both a left and a right hand.
///
/// Choosing between the two hypotheses is left to the caller.
#[derive(Debug, Clone)]
pub struct HandPairTracker {
    config: TrackerConfig,
    left: HandTracker,
    right: HandTracker,
}

impl HandPairTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            left: HandTracker::new(Handedness::Left, config.clone()),
            right: HandTracker::new(Handedness::Right, config.clone()),
            config,
        }
    }

    pub fn process_frame(&mut self, frame: &HandFrame) -> TrackingResult {
        let quality = frame.assess(&self.config);
        let left = self.left.process_assessed(frame, &quality);
        let right = self.right.process_assessed(frame, &quality);
        TrackingResult {
            timestamp: frame.timestamp,
            quality,
            left,
            right,
            left_evidence: self.left.implausibility_evidence(),
            right_evidence: self.right.implausibility_evidence(),
        }
    }

    pub fn tracker(&self, handedness: Handedness) -> &HandTracker {
        match handedness {
            Handedness::Left => &self.left,
            Handedness::Right => &self.right,
        }
    }
}
