//! Visibility culling for the 2D world view
//!
//! CPU-side frustum, LOD, occlusion, adaptive, predictive and grid culling
//! of organism bounds against the camera rectangle.

pub mod culler;
pub mod frustum;

pub use crate::camera::Camera;
pub use culler::{bucket_by_lod, CullableObject, CullingStats, FrustumCuller, LodBuckets};
pub use frustum::{BoundingVolume, Frustum, Plane};
