//! The graphics-context seam
//!
//! Everything that touches the device goes through a `GpuBackend`. The
//! resource registry owns the backend, so the borrow checker keeps the
//! context to one logical operation at a time.

use std::any::Any;

use thiserror::Error;

use super::types::{
    BufferUsage, Capabilities, DrawSubmission, FeedbackPass, NativeHandle, ProgramDesc, TextureDesc,
};

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    #[error("device request failed: {0}")]
    DeviceRequest(String),

    #[error("program '{label}' failed to compile: {message}")]
    ProgramCompile { label: String, message: String },

    #[error("program '{label}' is not supported by this device: {reason}")]
    Unsupported { label: String, reason: String },

    #[error("'{label}' was not allocated: {reason}")]
    Denied { label: String, reason: String },
}

pub trait GpuBackend {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// `None` when the device refuses the allocation
    fn create_buffer(&mut self, label: &str, contents: &[u8], usage: BufferUsage) -> Option<NativeHandle>;

    /// `data` must hold exactly `desc.byte_size()` bytes when present
    fn create_texture(&mut self, label: &str, desc: &TextureDesc, data: Option<&[u8]>) -> Option<NativeHandle>;

    fn compile_program(&mut self, desc: &ProgramDesc) -> Result<NativeHandle, GpuError>;

    /// Unknown handles are ignored with a warning
    fn delete(&mut self, handle: NativeHandle);

    fn write_buffer(&mut self, handle: NativeHandle, offset: u64, data: &[u8]) -> bool;

    /// Blocks until the copy is visible to the CPU
    fn read_buffer(&mut self, handle: NativeHandle, out: &mut [u8]) -> bool;

    fn begin_frame(&mut self);

    fn draw(&mut self, submission: &DrawSubmission) -> bool;

    fn dispatch_feedback(&mut self, pass: &FeedbackPass<'_>) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
