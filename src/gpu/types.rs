//! Backend-neutral GPU descriptors exchanged across the `GpuBackend` seam

use serde::{Deserialize, Serialize};

/// Opaque backend object handle
///
/// Only the resource registry holds these long term; other components look
/// them up by `ResourceId` right before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
    /// Read/write storage, also used as feedback targets
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    /// Also usable as a color attachment
    pub render_target: bool,
}

impl TextureDesc {
    pub fn byte_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.format.bytes_per_pixel() as u64
    }
}

/// Rasterization topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Points,
    Lines,
    Triangles,
    TriangleStrip,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 4] = [
        PrimitiveKind::Points,
        PrimitiveKind::Lines,
        PrimitiveKind::Triangles,
        PrimitiveKind::TriangleStrip,
    ];
}

/// Feedback kernels a backend knows how to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackKernel {
    Mutation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramKind {
    /// Rasterizing program; attribute component counts in shader-location order
    Render { vertex_attributes: Vec<u32> },
    /// Non-rasterizing pass reading `inputs` buffers and writing `outputs`
    Feedback {
        kernel: FeedbackKernel,
        inputs: u32,
        outputs: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDesc {
    pub label: String,
    pub source: String,
    pub kind: ProgramKind,
}

impl ProgramDesc {
    pub fn render(label: &str, source: &str, vertex_attributes: &[u32]) -> Self {
        Self {
            label: label.to_string(),
            source: source.to_string(),
            kind: ProgramKind::Render {
                vertex_attributes: vertex_attributes.to_vec(),
            },
        }
    }

    pub fn feedback(label: &str, source: &str, kernel: FeedbackKernel, inputs: u32, outputs: u32) -> Self {
        Self {
            label: label.to_string(),
            source: source.to_string(),
            kind: ProgramKind::Feedback {
                kernel,
                inputs,
                outputs,
            },
        }
    }

    /// Rough driver-side footprint used for budget accounting
    pub fn estimated_size(&self) -> u64 {
        (self.source.len() as u64).max(1024)
    }
}

/// One rasterization request, already merged and uploaded
#[derive(Debug, Clone, PartialEq)]
pub struct DrawSubmission {
    pub program: NativeHandle,
    pub primitive: PrimitiveKind,
    pub vertex_buffer: NativeHandle,
    pub vertex_count: u32,
    pub index_buffer: Option<NativeHandle>,
    pub index_count: u32,
    /// One vec4 slot per uniform, in uniform-name order
    pub uniforms: Vec<[f32; 4]>,
    pub texture: Option<NativeHandle>,
}

/// One non-rasterizing transform pass
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackPass<'a> {
    pub program: NativeHandle,
    pub inputs: &'a [NativeHandle],
    pub outputs: &'a [NativeHandle],
    pub uniforms: &'a [u8],
    pub invocations: u32,
}

/// What the device can do, queried once at startup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capabilities {
    pub max_texture_size: u32,
    /// Default memory ceiling when the host config leaves it unset
    pub suggested_memory_mb: u32,
    /// Enough storage bindings per stage for the mutation pass
    pub supports_feedback: bool,
}
