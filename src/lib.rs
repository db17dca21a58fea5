//! GPU rendering and resource-management core for procedurally generated
//! organisms.
//!
//! `OrganismRenderer` is the entry point. It owns a `GpuBackend` through the
//! `ResourceManager` and drives culling, batching, particles, procedural
//! textures and the mutation pass once per host frame.

pub mod camera;
pub mod config;
pub mod constants;
pub mod culling;
pub mod error;
pub mod gpu;
pub mod hash;
pub mod memory;
pub mod mutation;
pub mod particles;
pub mod renderer;
pub mod texture;

pub use camera::Camera;
pub use config::{ConfigError, QualityTier, RenderConfig};
pub use error::{RenderError, RenderResult};
pub use gpu::{GpuBackend, GpuError, HeadlessBackend, WgpuBackend, WgpuBackendConfig};
pub use memory::ResourceManager;
pub use mutation::MutationData;
pub use renderer::{FrameInput, FrameStats, MutationEvent, MutationEventKind, OrganismRenderer, RenderRequest};

/// Initialize `env_logger` for binaries and tests; `RUST_LOG` overrides
/// the `info` default. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
