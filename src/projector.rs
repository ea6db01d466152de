// src/projector.rs
//! Lifts normalized 2D detections into camera space.
//!
//! Camera space looks down -Z; a landmark seen at normalized image position
//! `(u, v)` with depth `d` lands at `(x * d, y * d, -d)` where `(x, y)` is the
//! position on the unit-depth image plane. Normalized coordinates and the
//! principal point share one convention (origin and axis directions).

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::HandPoseError;
use crate::topology::LANDMARK_COUNT;

/// One landmark from the external detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detected2D {
    pub x: f32,
    pub y: f32,
    /// Distance along the optical axis in meters.
    pub depth: f32,
}

impl Detected2D {
    pub fn new(x: f32, y: f32, depth: f32) -> Self {
        Self { x, y, depth }
    }

    pub fn position(&self) -> Vector2<f32> {
        Vector2::new(self.x, self.y)
    }
}

pub fn landmarks_from_slice(landmarks: &[Detected2D]) -> Result<[Detected2D; LANDMARK_COUNT], HandPoseError> {
    landmarks
        .try_into()
        .map_err(|_| HandPoseError::LandmarkCount(landmarks.len()))
}

/// Pinhole intrinsics in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub focal_length: [f32; 2],
    pub principal_point: [f32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageResolution {
    pub width: u32,
    pub height: u32,
}

impl ImageResolution {
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub intrinsics: CameraIntrinsics,
    pub resolution: ImageResolution,
}

/// Landmarks lifted into camera space for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedLandmarks {
    /// Image-plane positions scaled onto the plane at `center_depth`. Used for 2D occlusion tests.
    pub points_2d: [Vector2<f32>; LANDMARK_COUNT],
    /// Camera-space positions using each landmark's own depth.
    pub points_3d: [Vector3<f32>; LANDMARK_COUNT],
    pub center_depth: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointProjector {
    scale: Vector2<f32>,
    translation: Vector2<f32>,
}

impl PointProjector {
    pub fn new(intrinsics: &CameraIntrinsics, resolution: &ImageResolution) -> Self {
        let [fx, fy] = intrinsics.focal_length;
        let [cx, cy] = intrinsics.principal_point;
        Self {
            scale: Vector2::new(resolution.width as f32 / fx, resolution.height as f32 / fy),
            translation: Vector2::new(-cx / fx, -cy / fy),
        }
    }

    pub fn from_camera(camera: &CameraModel) -> Self {
        Self::new(&camera.intrinsics, &camera.resolution)
    }

    /// Normalized image position to the unit-depth image plane.
    pub fn camera_xy(&self, normalized: &Vector2<f32>) -> Vector2<f32> {
        normalized.component_mul(&self.scale) + self.translation
    }

    pub fn scale(&self) -> Vector2<f32> {
        self.scale
    }

    pub fn project(&self, landmarks: &[Detected2D; LANDMARK_COUNT], center_depth: f32) -> ProjectedLandmarks {
        let mut points_2d = [Vector2::zeros(); LANDMARK_COUNT];
        let mut points_3d = [Vector3::zeros(); LANDMARK_COUNT];

        for (i, landmark) in landmarks.iter().enumerate() {
            let xy = self.camera_xy(&landmark.position());
            points_2d[i] = xy * center_depth;
            points_3d[i] = Vector3::new(xy.x * landmark.depth, xy.y * landmark.depth, -landmark.depth);
        }

        ProjectedLandmarks {
            points_2d,
            points_3d,
            center_depth,
        }
    }

    /// Inverse of [`PointProjector::project`] for a camera-space point. Handy for synthetic input.
    pub fn detect(&self, point: &Vector3<f32>) -> Detected2D {
        let depth = -point.z;
        let xy = Vector2::new(point.x, point.y) / depth;
        let normalized = (xy - self.translation).component_div(&self.scale);
        Detected2D::new(normalized.x, normalized.y, depth)
    }
}
