// src/lib.rs
//! Hand pose reconstruction from 21 detected 2D landmarks.
//!
//! Each frame is lifted into camera space, hidden joints are recovered from
//! finger bending planes, and the result feeds per-hand trackers for bone
//! lengths, palm orientation and finger angles. [`HandTracker`] runs the whole
//! chain and returns a fully determined [`Hand`].

pub mod angles;
pub mod config;
pub mod data;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod length_tracker;
pub mod lengths;
pub mod occlusion;
pub mod orientation;
pub mod plane_fit;
pub mod pose;
pub mod projector;
pub mod reconstruct;
pub mod replay;
pub mod topology;
pub mod tracking;

pub use config::TrackerConfig;
pub use error::{HandPoseError, Result};
pub use lengths::BoneLengths;
pub use pose::Hand;
pub use projector::{CameraIntrinsics, CameraModel, Detected2D, ImageResolution};
pub use topology::{Finger, Handedness};
pub use tracking::{HandFrame, HandPairTracker, HandTracker, TrackingResult};
