// src/config.rs
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{HandPoseError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub reconstruction: ReconstructionConfig,
    #[serde(default)]
    pub angles: AngleConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconstructionConfig {
    /// Radius of joint discs and segment strips in the 2D occlusion test (meters at center depth)
    #[serde(default = "default_occlusion_radius")]
    pub occlusion_radius: f32,
    /// Max distance between a landmark's depth and the hand-center depth
    #[serde(default = "default_depth_tolerance")]
    pub depth_tolerance: f32,
    #[serde(default = "default_min_depth")]
    pub min_depth: f32,
    #[serde(default = "default_max_depth")]
    pub max_depth: f32,
    /// Direction pairs whose cosine reaches this are treated as colinear in plane fitting
    #[serde(default = "default_colinearity_threshold")]
    pub colinearity_threshold: f32,
    /// Thumb joints closer than this to the index or middle knuckle make palm directions unreliable
    #[serde(default = "default_crowding_distance")]
    pub crowding_distance: f32,
}

fn default_occlusion_radius() -> f32 { 0.01 }
fn default_depth_tolerance() -> f32 { 0.15 }
fn default_min_depth() -> f32 { 0.0 }
fn default_max_depth() -> f32 { 0.8 }
fn default_colinearity_threshold() -> f32 { 0.95 }
fn default_crowding_distance() -> f32 { 0.02 }

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            occlusion_radius: default_occlusion_radius(),
            depth_tolerance: default_depth_tolerance(),
            min_depth: default_min_depth(),
            max_depth: default_max_depth(),
            colinearity_threshold: default_colinearity_threshold(),
            crowding_distance: default_crowding_distance(),
        }
    }
}

impl ReconstructionConfig {
    /// Whether a landmark depth sits inside the usable band around the hand center.
    pub fn depth_in_band(&self, depth: f32, center_depth: f32) -> bool {
        depth > self.min_depth && depth <= self.max_depth && (depth - center_depth).abs() <= self.depth_tolerance
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AngleConfig {
    /// Minimum |cos| between the palm tangent and the camera ray to the wrist
    #[serde(default = "default_min_view_alignment")]
    pub min_view_alignment: f32,
    /// Camera-space z window accepted for points projected onto a finger plane
    #[serde(default = "default_projected_z_min")]
    pub projected_z_min: f32,
    #[serde(default = "default_projected_z_max")]
    pub projected_z_max: f32,
}

fn default_min_view_alignment() -> f32 { 0.18 }
fn default_projected_z_min() -> f32 { -0.75 }
fn default_projected_z_max() -> f32 { -0.15 }

impl Default for AngleConfig {
    fn default() -> Self {
        Self {
            min_view_alignment: default_min_view_alignment(),
            projected_z_min: default_projected_z_min(),
            projected_z_max: default_projected_z_max(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Bounding boxes narrower than this (normalized units, per axis) are too small to use
    #[serde(default = "default_min_box_size")]
    pub min_box_size: [f32; 2],
    #[serde(default = "default_edge_low")]
    pub edge_low: [f32; 2],
    #[serde(default = "default_edge_high")]
    pub edge_high: [f32; 2],
    #[serde(default = "default_max_flatness")]
    pub max_flatness: f32,
    /// Tighter flatness limit for hands touching the image border
    #[serde(default = "default_max_flatness_near_edge")]
    pub max_flatness_near_edge: f32,
}

fn default_min_box_size() -> [f32; 2] { [0.075, 0.1] }
fn default_edge_low() -> [f32; 2] { [0.06, 0.08] }
fn default_edge_high() -> [f32; 2] { [0.94, 0.92] }
fn default_max_flatness() -> f32 { 0.50 }
fn default_max_flatness_near_edge() -> f32 { 0.48 }

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_box_size: default_min_box_size(),
            edge_low: default_edge_low(),
            edge_high: default_edge_high(),
            max_flatness: default_max_flatness(),
            max_flatness_near_edge: default_max_flatness_near_edge(),
        }
    }
}

impl TrackerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| HandPoseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TrackerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let r = &self.reconstruction;
        if !(r.occlusion_radius > 0.0) {
            return Err(HandPoseError::InvalidConfig(format!(
                "occlusion_radius must be positive, got {}",
                r.occlusion_radius
            )));
        }
        if !(r.min_depth < r.max_depth) {
            return Err(HandPoseError::InvalidConfig(format!(
                "depth band is empty: min_depth {} >= max_depth {}",
                r.min_depth, r.max_depth
            )));
        }
        if !(r.colinearity_threshold > 0.0 && r.colinearity_threshold <= 1.0) {
            return Err(HandPoseError::InvalidConfig(format!(
                "colinearity_threshold must be in (0, 1], got {}",
                r.colinearity_threshold
            )));
        }
        let a = &self.angles;
        if !(a.projected_z_min < a.projected_z_max && a.projected_z_max < 0.0) {
            return Err(HandPoseError::InvalidConfig(format!(
                "projected z window [{}, {}] must be ordered and in front of the camera",
                a.projected_z_min, a.projected_z_max
            )));
        }
        Ok(())
    }
}
