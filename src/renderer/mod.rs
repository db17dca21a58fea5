pub mod batcher;
pub mod draw_call;
pub mod error;
pub mod organism_renderer;

pub use batcher::{BatcherMetrics, DrawBatcher};
pub use draw_call::{
    BatchedDrawCall, DrawCall, DrawCallId, DrawCallRequest, DrawPriority, UniformSet, UniformValue,
};
pub use error::RenderErrorContext;
pub use organism_renderer::{
    organism_quad, organism_radius, FrameInput, FrameStats, MutationEvent, MutationEventKind,
    OrganismRenderer, RenderRequest, RendererStats, ORGANISM_PROGRAM_ID,
};
