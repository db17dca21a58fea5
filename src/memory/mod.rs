//! GPU memory management
//!
//! Reference-counted registry of native objects with an LRU garbage
//! collector and a hard memory ceiling.

pub mod resource_manager;

pub use resource_manager::{GpuContext, GpuResource, ResourceKind, ResourceManager, ResourceStats};
