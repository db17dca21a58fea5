//! 2D world camera
//!
//! The world is drawn top-down: the camera looks along -Z at a rectangle of
//! `viewport / zoom` world units centered on `position.xy`, rotated by
//! `rotation` radians about Z.

use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: Vec3,
    pub zoom: f32,
    /// Radians, counter-clockwise
    pub rotation: f32,
    pub viewport_width: f32,
    pub viewport_height: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            zoom: 1.0,
            rotation: 0.0,
            viewport_width: 1280.0,
            viewport_height: 720.0,
        }
    }
}

impl Camera {
    pub fn new(viewport_width: f32, viewport_height: f32) -> Self {
        Self {
            viewport_width,
            viewport_height,
            ..Self::default()
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_zoom(mut self, zoom: f32) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    /// A camera with no visible area cannot produce a frustum
    pub fn is_valid(&self) -> bool {
        self.viewport_width > 0.0
            && self.viewport_height > 0.0
            && self.zoom > 0.0
            && self.position.is_finite()
            && self.rotation.is_finite()
    }

    /// World-space half width/height of the visible rectangle
    pub fn half_extents(&self) -> Vec2 {
        Vec2::new(self.viewport_width, self.viewport_height) / (2.0 * self.zoom)
    }

    pub fn right(&self) -> Vec3 {
        let (sin, cos) = self.rotation.sin_cos();
        Vec3::new(cos, sin, 0.0)
    }

    pub fn up(&self) -> Vec3 {
        let (sin, cos) = self.rotation.sin_cos();
        Vec3::new(-sin, cos, 0.0)
    }

    pub fn center(&self) -> Vec2 {
        self.position.truncate()
    }

    pub fn distance_to(&self, point: Vec3) -> f32 {
        self.position.distance(point)
    }

    /// `u_view` uniform: (center x, center y, zoom, rotation)
    pub fn view_uniform(&self) -> Vec4 {
        Vec4::new(self.position.x, self.position.y, self.zoom, self.rotation)
    }

    /// `u_viewport` uniform: viewport size in pixels
    pub fn viewport_uniform(&self) -> Vec2 {
        Vec2::new(self.viewport_width, self.viewport_height)
    }
}
