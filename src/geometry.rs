// src/geometry.rs
use nalgebra::{Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Infinite plane through `point` with unit `normal`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub point: Vector3<f32>,
    pub normal: Vector3<f32>,
}

impl Plane {
    pub fn new(point: Vector3<f32>, normal: Vector3<f32>) -> Self {
        Self { point, normal }
    }

    /// Parameter `t` such that `direction * t` lies on the plane, for a ray
    /// leaving the camera origin. Non-finite when the ray is parallel.
    pub fn ray_progress(&self, direction: &Vector3<f32>) -> f32 {
        self.normal.dot(&self.point) / self.normal.dot(direction)
    }

    /// Where the camera ray through `direction` meets the plane.
    ///
    /// Any point on the ray works as `direction`, in particular a landmark's
    /// raw 3D estimate.
    pub fn intersect_camera_ray(&self, direction: &Vector3<f32>) -> Vector3<f32> {
        direction * self.ray_progress(direction)
    }

    #[cfg(test)]
    pub(crate) fn signed_distance(&self, point: &Vector3<f32>) -> f32 {
        self.normal.dot(&(point - self.point))
    }
}

/// `vector` with its component along the unit `axis` removed.
pub fn reject(vector: &Vector3<f32>, axis: &Vector3<f32>) -> Vector3<f32> {
    vector - axis * vector.dot(axis)
}

pub fn rotate_about(vector: &Vector3<f32>, axis: &Vector3<f32>, angle: f32) -> Vector3<f32> {
    UnitQuaternion::from_axis_angle(&Unit::new_normalize(*axis), angle) * vector
}

/// Spherical interpolation between two unit directions.
pub fn slerp_directions(from: &Vector3<f32>, to: &Vector3<f32>, t: f32) -> Vector3<f32> {
    let cos_angle = from.dot(to).clamp(-1.0, 1.0);
    let angle = cos_angle.acos();
    let sin_angle = angle.sin();
    if sin_angle.abs() < 1e-5 {
        // Nearly parallel; linear blend is exact enough.
        return (from * (1.0 - t) + to * t)
            .try_normalize(f32::EPSILON)
            .unwrap_or(*from);
    }
    let a = ((1.0 - t) * angle).sin() / sin_angle;
    let b = (t * angle).sin() / sin_angle;
    from * a + to * b
}

pub fn is_finite(vector: &Vector3<f32>) -> bool {
    vector.iter().all(|component| component.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: &Vector3<f32>, b: &Vector3<f32>, eps: f32) -> bool {
        (a - b).norm() < eps
    }

    #[test]
    fn test_ray_plane_round_trip() {
        let plane = Plane::new(Vector3::new(0.03, -0.02, -0.41), Vector3::new(0.2, -0.3, 0.9).normalize());
        let on_plane = plane.point + Vector3::new(0.9, 0.3, -0.1).cross(&plane.normal) * 0.05;
        assert!(plane.signed_distance(&on_plane).abs() < 1e-6);

        // Any scaled copy of the point lies on the same camera ray.
        for scale in [0.5_f32, 0.9, 1.7] {
            let hit = plane.intersect_camera_ray(&(on_plane * scale));
            assert!(approx_eq(&hit, &on_plane, 1e-5), "scale {}: got {:?}", scale, hit);
        }
    }

    #[test]
    fn test_parallel_ray_is_not_finite() {
        let plane = Plane::new(Vector3::new(0.0, 0.0, -0.4), Vector3::new(0.0, 0.0, 1.0));
        let hit = plane.intersect_camera_ray(&Vector3::new(1.0, 0.0, 0.0));
        assert!(!is_finite(&hit));
    }

    #[test]
    fn test_rotate_and_reject() {
        let rotated = rotate_about(&Vector3::z(), &Vector3::x(), std::f32::consts::FRAC_PI_2);
        assert!(approx_eq(&rotated, &-Vector3::y(), 1e-6), "got {:?}", rotated);

        let flat = reject(&Vector3::new(1.0, 2.0, 3.0), &Vector3::y());
        assert!(approx_eq(&flat, &Vector3::new(1.0, 0.0, 3.0), 1e-6));
    }

    #[test]
    fn test_slerp_endpoints_and_midpoint() {
        let a = Vector3::x();
        let b = Vector3::y();
        assert!(approx_eq(&slerp_directions(&a, &b, 0.0), &a, 1e-6));
        assert!(approx_eq(&slerp_directions(&a, &b, 1.0), &b, 1e-6));
        let mid = slerp_directions(&a, &b, 0.5);
        let expected = Vector3::new(1.0, 1.0, 0.0).normalize();
        assert!(approx_eq(&mid, &expected, 1e-6), "got {:?}", mid);
        assert!(approx_eq(&slerp_directions(&a, &a, 0.3), &a, 1e-6));
    }
}
