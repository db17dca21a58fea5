//! View volume planes and bounding volumes

use glam::{Vec2, Vec3};

use crate::camera::Camera;

/// `normal · p + d >= 0` is inside
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    pub fn new(normal: Vec3, d: f32) -> Self {
        Self { normal, d }
    }

    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// left, right, bottom, top, near, far
    pub planes: [Plane; 6],
}

impl Frustum {
    /// `None` for a camera without visible area
    pub fn from_camera(camera: &Camera, depth_range: f32) -> Option<Self> {
        if !camera.is_valid() || depth_range <= 0.0 {
            return None;
        }
        let center = camera.position;
        let half = camera.half_extents();
        let right = camera.right();
        let up = camera.up();
        let rc = right.dot(center);
        let uc = up.dot(center);

        Some(Self {
            planes: [
                Plane::new(right, half.x - rc),
                Plane::new(-right, half.x + rc),
                Plane::new(up, half.y - uc),
                Plane::new(-up, half.y + uc),
                Plane::new(Vec3::NEG_Z, center.z + depth_range),
                Plane::new(Vec3::Z, depth_range - center.z),
            ],
        })
    }

    /// Degenerate frustum that rejects nothing
    pub fn accept_all() -> Self {
        Self {
            planes: [Plane::new(Vec3::ZERO, 0.0); 6],
        }
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.signed_distance(point) >= 0.0)
    }

    /// Conservative: may accept spheres near corners that are outside
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(center) >= -radius)
    }

    /// Positive-vertex test against each plane
    pub fn intersects_box(&self, min: Vec3, max: Vec3) -> bool {
        self.planes.iter().all(|plane| {
            let positive = Vec3::select(plane.normal.cmpge(Vec3::ZERO), max, min);
            plane.signed_distance(positive) >= 0.0
        })
    }

    pub fn intersects(&self, volume: &BoundingVolume) -> bool {
        match *volume {
            BoundingVolume::Sphere { center, radius } => self.intersects_sphere(center, radius),
            BoundingVolume::Box { min, max } => self.intersects_box(min, max),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundingVolume {
    Sphere { center: Vec3, radius: f32 },
    Box { min: Vec3, max: Vec3 },
}

impl BoundingVolume {
    pub fn sphere(center: Vec3, radius: f32) -> Self {
        BoundingVolume::Sphere { center, radius }
    }

    pub fn aabb(min: Vec3, max: Vec3) -> Self {
        BoundingVolume::Box {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn center(&self) -> Vec3 {
        match *self {
            BoundingVolume::Sphere { center, .. } => center,
            BoundingVolume::Box { min, max } => (min + max) * 0.5,
        }
    }

    /// Axis-aligned extent in world space
    pub fn min_max(&self) -> (Vec3, Vec3) {
        match *self {
            BoundingVolume::Sphere { center, radius } => (center - Vec3::splat(radius), center + Vec3::splat(radius)),
            BoundingVolume::Box { min, max } => (min, max),
        }
    }

    pub fn xy_bounds(&self) -> (Vec2, Vec2) {
        let (min, max) = self.min_max();
        (min.truncate(), max.truncate())
    }

    /// Volume covering both this one and a copy moved by `offset`
    pub fn swept(&self, offset: Vec3) -> Self {
        match *self {
            BoundingVolume::Sphere { center, radius } => BoundingVolume::Sphere {
                center: center + offset * 0.5,
                radius: radius + offset.length() * 0.5,
            },
            BoundingVolume::Box { min, max } => BoundingVolume::Box {
                min: min.min(min + offset),
                max: max.max(max + offset),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frustum() -> Frustum {
        Frustum::from_camera(&Camera::new(200.0, 100.0), 1000.0).unwrap()
    }

    #[test]
    fn test_axis_aligned_extents() {
        let frustum = frustum();
        assert!(frustum.contains_point(Vec3::new(99.0, 49.0, 0.0)));
        assert!(!frustum.contains_point(Vec3::new(101.0, 0.0, 0.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, -51.0, 0.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 1001.0)));
    }

    #[test]
    fn test_sphere_outside_one_plane_is_rejected() {
        let frustum = frustum();
        assert!(!frustum.intersects_sphere(Vec3::new(120.0, 0.0, 0.0), 10.0));
        assert!(frustum.intersects_sphere(Vec3::new(105.0, 0.0, 0.0), 10.0));
    }

    #[test]
    fn test_box_positive_vertex() {
        let frustum = frustum();
        assert!(frustum.intersects_box(Vec3::new(90.0, -5.0, -1.0), Vec3::new(150.0, 5.0, 1.0)));
        assert!(!frustum.intersects_box(Vec3::new(110.0, -5.0, -1.0), Vec3::new(150.0, 5.0, 1.0)));
    }

    #[test]
    fn test_rotation_turns_the_rectangle() {
        let camera = Camera::new(200.0, 100.0).with_rotation(std::f32::consts::FRAC_PI_2);
        let frustum = Frustum::from_camera(&camera, 1000.0).unwrap();
        // The long axis now runs along Y
        assert!(frustum.contains_point(Vec3::new(0.0, 90.0, 0.0)));
        assert!(!frustum.contains_point(Vec3::new(90.0, 0.0, 0.0)));
    }

    #[test]
    fn test_invalid_camera_has_no_frustum() {
        assert!(Frustum::from_camera(&Camera::new(0.0, 0.0), 1000.0).is_none());
    }

    #[test]
    fn test_swept_sphere_covers_both_ends() {
        let swept = BoundingVolume::sphere(Vec3::ZERO, 1.0).swept(Vec3::new(10.0, 0.0, 0.0));
        let (min, max) = swept.min_max();
        assert!(min.x <= -1.0 && max.x >= 11.0);
    }
}
