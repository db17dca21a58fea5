use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use super::error::rejected_draw;
use crate::constants::batching::MAX_UNIFORM_SLOTS;
use crate::error::RenderResult;
use crate::gpu::PrimitiveKind;

pub type DrawCallId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum DrawPriority {
    Low,
    #[default]
    Normal,
    /// Forces the batcher to flush on the next tick
    High,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    /// Texture resource id; sampled by the fragment stage
    Texture(String),
}

impl UniformValue {
    /// vec4 slot contents; textures occupy a zeroed slot
    pub fn slot(&self) -> [f32; 4] {
        match self {
            UniformValue::Float(x) => [*x, 0.0, 0.0, 0.0],
            UniformValue::Vec2(v) => [v.x, v.y, 0.0, 0.0],
            UniformValue::Vec3(v) => [v.x, v.y, v.z, 0.0],
            UniformValue::Vec4(v) => v.to_array(),
            UniformValue::Texture(_) => [0.0; 4],
        }
    }
}

impl Hash for UniformValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            UniformValue::Texture(id) => id.hash(state),
            other => {
                for component in other.slot() {
                    component.to_bits().hash(state);
                }
            }
        }
    }
}

/// Uniforms by name, iterated in name order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformSet(BTreeMap<String, UniformValue>);

impl UniformSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: UniformValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: UniformValue) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// First texture uniform in name order
    pub fn texture(&self) -> Option<&str> {
        self.0.values().find_map(|value| match value {
            UniformValue::Texture(id) => Some(id.as_str()),
            _ => None,
        })
    }

    /// One vec4 per uniform, in name order
    pub fn packed(&self) -> Vec<[f32; 4]> {
        self.0.values().map(UniformValue::slot).collect()
    }

    /// Names plus value fingerprint; equal signatures can share a draw
    pub fn signature(&self) -> u64 {
        crate::hash::fx_digest(&self.0)
    }
}

/// A draw call as submitted by a component
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCallRequest {
    /// Program resource id
    pub program: String,
    pub primitive: PrimitiveKind,
    pub vertices: Vec<f32>,
    /// Floats per vertex
    pub vertex_stride: u32,
    pub indices: Option<Vec<u32>>,
    pub uniforms: UniformSet,
    pub priority: DrawPriority,
}

impl DrawCallRequest {
    pub fn new(program: &str, primitive: PrimitiveKind, vertices: Vec<f32>, vertex_stride: u32) -> Self {
        Self {
            program: program.to_string(),
            primitive,
            vertices,
            vertex_stride,
            indices: None,
            uniforms: UniformSet::new(),
            priority: DrawPriority::Normal,
        }
    }

    pub fn with_indices(mut self, indices: Vec<u32>) -> Self {
        self.indices = Some(indices);
        self
    }

    pub fn with_uniforms(mut self, uniforms: UniformSet) -> Self {
        self.uniforms = uniforms;
        self
    }

    pub fn with_priority(mut self, priority: DrawPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn vertex_count(&self) -> u32 {
        if self.vertex_stride == 0 {
            return 0;
        }
        self.vertices.len() as u32 / self.vertex_stride
    }

    pub fn validate(&self) -> RenderResult<()> {
        if self.program.is_empty() {
            return Err(rejected_draw("no program"));
        }
        if self.vertex_stride == 0 {
            return Err(rejected_draw("vertex stride is zero"));
        }
        if self.vertices.is_empty() {
            return Err(rejected_draw("empty vertex data"));
        }
        if self.vertices.len() % self.vertex_stride as usize != 0 {
            return Err(rejected_draw(format!(
                "{} floats is not a multiple of stride {}",
                self.vertices.len(),
                self.vertex_stride
            )));
        }
        if self.uniforms.len() > MAX_UNIFORM_SLOTS {
            return Err(rejected_draw(format!(
                "{} uniforms exceed the {} slot limit",
                self.uniforms.len(),
                MAX_UNIFORM_SLOTS
            )));
        }
        let vertex_count = self.vertex_count();
        if let Some(indices) = &self.indices {
            if let Some(bad) = indices.iter().find(|&&index| index >= vertex_count) {
                return Err(rejected_draw(format!(
                    "index {} out of range for {} vertices",
                    bad, vertex_count
                )));
            }
        }
        Ok(())
    }
}

/// A queued draw call
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub id: DrawCallId,
    pub request: DrawCallRequest,
    /// Enqueue time (ms)
    pub timestamp: f64,
}

/// Same-shape draw calls merged for one submission
#[derive(Debug, Clone, PartialEq)]
pub struct BatchedDrawCall {
    pub program: String,
    pub primitive: PrimitiveKind,
    pub vertex_stride: u32,
    pub vertices: Vec<f32>,
    pub indices: Option<Vec<u32>>,
    pub uniforms: UniformSet,
    /// Number of draw calls merged into this one
    pub merged: usize,
}

impl BatchedDrawCall {
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32 / self.vertex_stride.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> DrawCallRequest {
        DrawCallRequest::new(
            "program/test",
            PrimitiveKind::Triangles,
            vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            2,
        )
    }

    #[test]
    fn test_validation() {
        assert!(triangle().validate().is_ok());
        assert!(triangle().with_indices(vec![0, 1, 2]).validate().is_ok());
        assert!(triangle().with_indices(vec![0, 1, 3]).validate().is_err());

        let mut ragged = triangle();
        ragged.vertices.push(4.0);
        assert!(ragged.validate().is_err());

        let empty = DrawCallRequest::new("program/test", PrimitiveKind::Points, Vec::new(), 2);
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_signature_tracks_names_and_values() {
        let a = UniformSet::new().with("u_time", UniformValue::Float(1.0));
        let b = UniformSet::new().with("u_time", UniformValue::Float(1.0));
        let c = UniformSet::new().with("u_time", UniformValue::Float(2.0));
        let d = UniformSet::new().with("u_energy", UniformValue::Float(1.0));
        assert_eq!(a.signature(), b.signature());
        assert_ne!(a.signature(), c.signature());
        assert_ne!(a.signature(), d.signature());
    }

    #[test]
    fn test_packed_in_name_order() {
        let uniforms = UniformSet::new()
            .with("u_view", UniformValue::Vec4(Vec4::new(1.0, 2.0, 3.0, 4.0)))
            .with("u_texture", UniformValue::Texture("texture/a".to_string()))
            .with("u_energy", UniformValue::Float(0.5));
        assert_eq!(
            uniforms.packed(),
            vec![[0.5, 0.0, 0.0, 0.0], [0.0; 4], [1.0, 2.0, 3.0, 4.0]]
        );
        assert_eq!(uniforms.texture(), Some("texture/a"));
    }
}
