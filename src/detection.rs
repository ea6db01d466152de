// src/detection.rs
//! Quality flags for a raw 2D detection, decided before any 3D work.

use nalgebra::Vector2;
use serde::Serialize;

use crate::config::DetectionConfig;
use crate::topology::LANDMARK_COUNT;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DetectionQuality {
    /// Per axis, the bounding box is narrower than the configured minimum.
    pub small: [bool; 2],
    /// Per axis, the bounding box reaches into the border band of the image.
    pub close_to_edge: [bool; 2],
    pub flat: bool,
    pub flatness: f32,
}

impl DetectionQuality {
    /// `points` are normalized image coordinates in [0, 1].
    pub fn from_points(points: &[Vector2<f32>; LANDMARK_COUNT], aspect_ratio: f32, config: &DetectionConfig) -> Self {
        let mut low = Vector2::new(1.0_f32, 1.0);
        let mut high = Vector2::new(0.0_f32, 0.0);
        for point in points {
            low = low.inf(point);
            high = high.sup(point);
        }
        let size = high - low;

        let mut quality = Self::default();
        for axis in 0..2 {
            quality.small[axis] = size[axis] < config.min_box_size[axis];
            quality.close_to_edge[axis] = low[axis] < config.edge_low[axis] || high[axis] > config.edge_high[axis];
        }

        let corrected: Vec<Vector2<f32>> = points
            .iter()
            .map(|p| Vector2::new(p.x * aspect_ratio, p.y))
            .collect();
        quality.flatness = flatness(&corrected);
        let limit = if quality.is_close_to_edge() {
            config.max_flatness_near_edge
        } else {
            config.max_flatness
        };
        quality.flat = quality.flatness > limit;
        quality
    }

    pub fn is_small(&self) -> bool {
        self.small[0] || self.small[1]
    }

    pub fn is_close_to_edge(&self) -> bool {
        self.close_to_edge[0] || self.close_to_edge[1]
    }

    /// Whether the detection is worth reconstructing at all.
    pub fn is_usable(&self) -> bool {
        !self.is_small() && !self.flat
    }
}

/// How elongated a point cloud is, from 0 (round) to 1 (a line).
///
/// Measured along the axis through the farthest point from the centroid and
/// the farthest point on the opposite side. Clouds without such an opposite
/// point score 0.
pub fn flatness(points: &[Vector2<f32>]) -> f32 {
    if points.len() <= 2 {
        return 1.0;
    }
    let center = points.iter().sum::<Vector2<f32>>() / points.len() as f32;

    let Some(first) = points
        .iter()
        .map(|p| p - center)
        .max_by(|a, b| a.norm_squared().total_cmp(&b.norm_squared()))
    else {
        return 1.0;
    };
    let max_distance = first.norm();
    if max_distance <= f32::EPSILON {
        return 0.0;
    }

    let Some(second) = points
        .iter()
        .map(|p| p - center)
        .filter(|delta| delta.dot(&first) <= 0.0)
        .max_by(|a, b| a.norm_squared().total_cmp(&b.norm_squared()))
    else {
        return 0.0;
    };
    let Some(second_direction) = second.try_normalize(f32::EPSILON) else {
        return 0.0;
    };
    let first_direction = first / max_distance;
    if first_direction.dot(&second_direction) > -0.5 {
        return 0.0;
    }

    let long_axis = (first_direction - second_direction).normalize();
    let max_perpendicular = points
        .iter()
        .map(|p| {
            let delta = p - center;
            (delta - long_axis * delta.dot(&long_axis)).norm()
        })
        .fold(0.0_f32, f32::max);

    (1.0 - max_perpendicular / max_distance).clamp(0.0, 1.0)
}
