//! In-memory backend
//!
//! Keeps buffers and textures as byte vectors, records draw submissions and
//! runs feedback passes with the CPU reference kernel. Hosts without a GPU
//! use it directly; tests use its fault injection to force allocation and
//! compile failures.

use std::any::Any;

use rustc_hash::FxHashMap;

use super::backend::{GpuBackend, GpuError};
use super::types::{
    BufferUsage, Capabilities, DrawSubmission, FeedbackKernel, FeedbackPass, NativeHandle,
    ProgramDesc, ProgramKind, TextureDesc,
};
use crate::constants::memory::FALLBACK_MEMORY_CEILING_MB;
use crate::mutation::kernel;

enum HeadlessObject {
    Buffer { data: Vec<u8>, usage: BufferUsage },
    Texture { desc: TextureDesc, data: Vec<u8> },
    Program(ProgramDesc),
}

impl HeadlessObject {
    fn byte_size(&self) -> u64 {
        match self {
            HeadlessObject::Buffer { data, .. } => data.len() as u64,
            HeadlessObject::Texture { data, .. } => data.len() as u64,
            HeadlessObject::Program(desc) => desc.estimated_size(),
        }
    }
}

pub struct HeadlessBackend {
    capabilities: Capabilities,
    next_handle: u64,
    objects: FxHashMap<NativeHandle, HeadlessObject>,
    allocated_bytes: u64,

    // Fault injection
    device_memory_limit: Option<u64>,
    failing_programs: Vec<String>,
    fail_allocations: bool,

    // Recorded activity
    frame_draws: Vec<DrawSubmission>,
    total_draws: u64,
    frames: u64,
    feedback_passes: u64,
    invalid_deletes: u64,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities {
            max_texture_size: 4096,
            suggested_memory_mb: FALLBACK_MEMORY_CEILING_MB,
            supports_feedback: true,
        })
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            next_handle: 1,
            objects: FxHashMap::default(),
            allocated_bytes: 0,
            device_memory_limit: None,
            failing_programs: Vec::new(),
            fail_allocations: false,
            frame_draws: Vec::new(),
            total_draws: 0,
            frames: 0,
            feedback_passes: 0,
            invalid_deletes: 0,
        }
    }

    /// Make every later compile of the program with this label fail
    pub fn fail_program(&mut self, label: &str) {
        self.failing_programs.push(label.to_string());
    }

    pub fn set_fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    /// Cap what the simulated device will hand out, independent of any budget
    pub fn set_device_memory_limit(&mut self, limit: Option<u64>) {
        self.device_memory_limit = limit;
    }

    pub fn frame_draws(&self) -> &[DrawSubmission] {
        &self.frame_draws
    }

    pub fn total_draws(&self) -> u64 {
        self.total_draws
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn feedback_passes(&self) -> u64 {
        self.feedback_passes
    }

    pub fn invalid_deletes(&self) -> u64 {
        self.invalid_deletes
    }

    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes
    }

    pub fn buffer_contents(&self, handle: NativeHandle) -> Option<&[u8]> {
        match self.objects.get(&handle) {
            Some(HeadlessObject::Buffer { data, .. }) => Some(data),
            _ => None,
        }
    }

    pub fn buffer_usage(&self, handle: NativeHandle) -> Option<BufferUsage> {
        match self.objects.get(&handle) {
            Some(HeadlessObject::Buffer { usage, .. }) => Some(*usage),
            _ => None,
        }
    }

    pub fn texture_desc(&self, handle: NativeHandle) -> Option<TextureDesc> {
        match self.objects.get(&handle) {
            Some(HeadlessObject::Texture { desc, .. }) => Some(*desc),
            _ => None,
        }
    }

    pub fn texture_contents(&self, handle: NativeHandle) -> Option<&[u8]> {
        match self.objects.get(&handle) {
            Some(HeadlessObject::Texture { data, .. }) => Some(data),
            _ => None,
        }
    }

    fn allocate(&mut self, object: HeadlessObject) -> Option<NativeHandle> {
        let size = object.byte_size();
        if self.fail_allocations {
            return None;
        }
        if let Some(limit) = self.device_memory_limit {
            if self.allocated_bytes + size > limit {
                log::debug!(
                    "[HeadlessBackend::allocate] Device limit reached ({} + {} > {})",
                    self.allocated_bytes,
                    size,
                    limit
                );
                return None;
            }
        }
        let handle = NativeHandle(self.next_handle);
        self.next_handle += 1;
        self.allocated_bytes += size;
        self.objects.insert(handle, object);
        Some(handle)
    }

    fn buffer_bytes(&self, handle: NativeHandle) -> Option<&Vec<u8>> {
        match self.objects.get(&handle) {
            Some(HeadlessObject::Buffer { data, .. }) => Some(data),
            _ => None,
        }
    }

    fn is_buffer(&self, handle: NativeHandle) -> bool {
        matches!(self.objects.get(&handle), Some(HeadlessObject::Buffer { .. }))
    }
}

impl GpuBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn create_buffer(&mut self, _label: &str, contents: &[u8], usage: BufferUsage) -> Option<NativeHandle> {
        if contents.is_empty() {
            return None;
        }
        self.allocate(HeadlessObject::Buffer {
            data: contents.to_vec(),
            usage,
        })
    }

    fn create_texture(&mut self, _label: &str, desc: &TextureDesc, data: Option<&[u8]>) -> Option<NativeHandle> {
        let size = desc.byte_size() as usize;
        if size == 0 || desc.width > self.capabilities.max_texture_size || desc.height > self.capabilities.max_texture_size {
            return None;
        }
        let data = match data {
            Some(bytes) if bytes.len() == size => bytes.to_vec(),
            Some(_) => return None,
            None => vec![0; size],
        };
        self.allocate(HeadlessObject::Texture { desc: *desc, data })
    }

    fn compile_program(&mut self, desc: &ProgramDesc) -> Result<NativeHandle, GpuError> {
        if self.failing_programs.iter().any(|label| *label == desc.label) {
            return Err(GpuError::ProgramCompile {
                label: desc.label.clone(),
                message: "injected compile failure".to_string(),
            });
        }
        if desc.source.trim().is_empty() {
            return Err(GpuError::ProgramCompile {
                label: desc.label.clone(),
                message: "empty shader source".to_string(),
            });
        }
        if matches!(desc.kind, ProgramKind::Feedback { .. }) && !self.capabilities.supports_feedback {
            return Err(GpuError::Unsupported {
                label: desc.label.clone(),
                reason: "feedback passes disabled".to_string(),
            });
        }
        self.allocate(HeadlessObject::Program(desc.clone()))
            .ok_or_else(|| GpuError::Denied {
                label: desc.label.clone(),
                reason: "out of device memory".to_string(),
            })
    }

    fn delete(&mut self, handle: NativeHandle) {
        match self.objects.remove(&handle) {
            Some(object) => {
                self.allocated_bytes = self.allocated_bytes.saturating_sub(object.byte_size());
            }
            None => {
                log::warn!("[HeadlessBackend::delete] Unknown handle {:?}", handle);
                self.invalid_deletes += 1;
            }
        }
    }

    fn write_buffer(&mut self, handle: NativeHandle, offset: u64, data: &[u8]) -> bool {
        match self.objects.get_mut(&handle) {
            Some(HeadlessObject::Buffer { data: target, .. }) => {
                let start = offset as usize;
                let end = start + data.len();
                if end > target.len() {
                    return false;
                }
                target[start..end].copy_from_slice(data);
                true
            }
            _ => false,
        }
    }

    fn read_buffer(&mut self, handle: NativeHandle, out: &mut [u8]) -> bool {
        match self.buffer_bytes(handle) {
            Some(data) if data.len() >= out.len() => {
                out.copy_from_slice(&data[..out.len()]);
                true
            }
            _ => false,
        }
    }

    fn begin_frame(&mut self) {
        self.frames += 1;
        self.frame_draws.clear();
    }

    fn draw(&mut self, submission: &DrawSubmission) -> bool {
        let program_ok = matches!(
            self.objects.get(&submission.program),
            Some(HeadlessObject::Program(ProgramDesc { kind: ProgramKind::Render { .. }, .. }))
        );
        let indices_ok = submission.index_buffer.map_or(true, |h| self.is_buffer(h));
        let texture_ok = submission
            .texture
            .map_or(true, |h| matches!(self.objects.get(&h), Some(HeadlessObject::Texture { .. })));
        if !program_ok || !self.is_buffer(submission.vertex_buffer) || !indices_ok || !texture_ok {
            log::warn!("[HeadlessBackend::draw] Rejected submission with stale handles");
            return false;
        }
        self.frame_draws.push(submission.clone());
        self.total_draws += 1;
        true
    }

    fn dispatch_feedback(&mut self, pass: &FeedbackPass<'_>) -> bool {
        let kernel_kind = match self.objects.get(&pass.program) {
            Some(HeadlessObject::Program(ProgramDesc {
                kind: ProgramKind::Feedback { kernel, .. },
                ..
            })) => *kernel,
            _ => return false,
        };

        let mut inputs = Vec::with_capacity(pass.inputs.len());
        for handle in pass.inputs {
            match self.buffer_bytes(*handle) {
                Some(bytes) => inputs.push(bytes.clone()),
                None => return false,
            }
        }

        let outputs = match kernel_kind {
            FeedbackKernel::Mutation => kernel::run_packed(&inputs, pass.uniforms, pass.invocations),
        };
        let Some(outputs) = outputs else {
            return false;
        };
        if outputs.len() != pass.outputs.len() {
            return false;
        }

        for (handle, bytes) in pass.outputs.iter().zip(outputs) {
            if !self.write_buffer(*handle, 0, &bytes) {
                return false;
            }
        }
        self.feedback_passes += 1;
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_write_and_read() {
        let mut backend = HeadlessBackend::new();
        let handle = backend.create_buffer("test", &[0u8; 8], BufferUsage::Storage).unwrap();
        assert!(backend.write_buffer(handle, 4, &[1, 2, 3, 4]));
        let mut out = [0u8; 8];
        assert!(backend.read_buffer(handle, &mut out));
        assert_eq!(out, [0, 0, 0, 0, 1, 2, 3, 4]);
        assert!(!backend.write_buffer(handle, 6, &[1, 2, 3, 4]));
    }

    #[test]
    fn test_delete_tracks_memory_and_double_free() {
        let mut backend = HeadlessBackend::new();
        let handle = backend.create_buffer("test", &[0u8; 64], BufferUsage::Vertex).unwrap();
        assert_eq!(backend.allocated_bytes(), 64);
        backend.delete(handle);
        assert_eq!(backend.allocated_bytes(), 0);
        assert_eq!(backend.invalid_deletes(), 0);
        backend.delete(handle);
        assert_eq!(backend.invalid_deletes(), 1);
    }

    #[test]
    fn test_injected_compile_failure() {
        let mut backend = HeadlessBackend::new();
        backend.fail_program("broken");
        let desc = ProgramDesc::render("broken", "@vertex fn vs_main() {}", &[2]);
        assert!(matches!(
            backend.compile_program(&desc),
            Err(GpuError::ProgramCompile { .. })
        ));
        let ok = ProgramDesc::render("fine", "@vertex fn vs_main() {}", &[2]);
        assert!(backend.compile_program(&ok).is_ok());
    }

    #[test]
    fn test_device_memory_limit() {
        let mut backend = HeadlessBackend::new();
        backend.set_device_memory_limit(Some(100));
        assert!(backend.create_buffer("a", &[0u8; 80], BufferUsage::Vertex).is_some());
        assert!(backend.create_buffer("b", &[0u8; 80], BufferUsage::Vertex).is_none());
    }

    #[test]
    fn test_texture_size_must_match_data() {
        let mut backend = HeadlessBackend::new();
        let desc = TextureDesc {
            width: 2,
            height: 2,
            format: crate::gpu::TextureFormat::Rgba8Unorm,
            render_target: false,
        };
        assert!(backend.create_texture("t", &desc, Some(&[0u8; 15])).is_none());
        let uploaded = backend.create_texture("t", &desc, Some(&[0u8; 16])).unwrap();
        assert!(backend.create_texture("t", &desc, None).is_some());
        assert_eq!(backend.texture_desc(uploaded), Some(desc));
        assert_eq!(backend.buffer_usage(uploaded), None);
    }

    #[test]
    fn test_objects_keep_their_creation_parameters() {
        let mut backend = HeadlessBackend::new();
        let index = backend.create_buffer("i", &[0u8; 12], BufferUsage::Index).unwrap();
        assert_eq!(backend.buffer_usage(index), Some(BufferUsage::Index));
        assert_eq!(backend.texture_desc(index), None);
    }
}
