// src/replay.rs
//! Recorded detector output, replayed through the trackers offline.
//!
//! ```json
//! {
//!   "camera": {
//!     "intrinsics": { "focal_length": [1000, 1000], "principal_point": [960, 720] },
//!     "resolution": { "width": 1920, "height": 1440 }
//!   },
//!   "frames": [
//!     { "timestamp": 0.0, "center_depth": 0.4, "landmarks": [{ "x": 0.5, "y": 0.4, "depth": 0.41 }, ...] }
//!   ]
//! }
//! ```

use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{HandPoseError, Result};
use crate::projector::{landmarks_from_slice, CameraModel, Detected2D};
use crate::tracking::HandFrame;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub camera: CameraModel,
    pub frames: Vec<RecordedFrame>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub timestamp: f64,
    pub landmarks: Vec<Detected2D>,
    pub center_depth: f32,
    /// Identity when absent.
    #[serde(default)]
    pub camera_to_world: Option<RecordedPose>,
}

/// Rigid camera pose. Rotation is a quaternion in `[x, y, z, w]` order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecordedPose {
    pub rotation: [f32; 4],
    pub translation: [f32; 3],
}

impl RecordedPose {
    pub fn isometry(&self) -> Isometry3<f32> {
        let [x, y, z, w] = self.rotation;
        let [tx, ty, tz] = self.translation;
        Isometry3::from_parts(
            Translation3::new(tx, ty, tz),
            UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z)),
        )
    }
}

impl Recording {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| HandPoseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let recording: Recording = serde_json::from_str(content)?;
        if let Some(frame) = recording.frames.iter().find(|f| landmarks_from_slice(&f.landmarks).is_err()) {
            return Err(HandPoseError::LandmarkCount(frame.landmarks.len()));
        }
        Ok(recording)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames ready for a tracker, in recording order.
    pub fn hand_frames(&self) -> impl Iterator<Item = Result<HandFrame>> + '_ {
        self.frames.iter().map(|frame| {
            Ok(HandFrame {
                timestamp: frame.timestamp,
                landmarks: landmarks_from_slice(&frame.landmarks)?,
                center_depth: frame.center_depth,
                camera: self.camera,
                camera_to_world: frame
                    .camera_to_world
                    .map(|pose| pose.isometry())
                    .unwrap_or_else(Isometry3::identity),
            })
        })
    }
}
