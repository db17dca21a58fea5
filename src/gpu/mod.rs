//! Graphics backends
//!
//! `GpuBackend` is the single graphics context. `WgpuBackend` drives a real
//! device; `HeadlessBackend` keeps everything in memory for hosts without a
//! GPU and for tests.

pub mod backend;
pub mod headless;
pub mod types;
pub mod wgpu_backend;

pub use backend::{GpuBackend, GpuError};
pub use headless::HeadlessBackend;
pub use types::{
    BufferUsage, Capabilities, DrawSubmission, FeedbackKernel, FeedbackPass, NativeHandle,
    PrimitiveKind, ProgramDesc, ProgramKind, TextureDesc, TextureFormat,
};
pub use wgpu_backend::{WgpuBackend, WgpuBackendConfig};
