//! GPU object registry
//!
//! Owns the graphics backend and every native handle created through it.
//! Other components refer to objects by id, retain what they hold and
//! release it when done; only this registry ever deletes a native object.
//! Creation never errors across the frame boundary: a denied allocation is
//! logged and reported as `None`, and the caller degrades.

use rustc_hash::FxHashMap;

use crate::config::ResourceConfig;
use crate::constants::memory::BYTES_PER_MB;
use crate::error::{RenderError, RenderResult};
use crate::gpu::{
    BufferUsage, Capabilities, DrawSubmission, FeedbackPass, GpuBackend, GpuError, NativeHandle,
    ProgramDesc, TextureDesc, TextureFormat,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Program,
    Framebuffer,
}

/// Registry record for one native object
#[derive(Debug, Clone)]
pub struct GpuResource {
    pub id: String,
    pub kind: ResourceKind,
    pub byte_size: u64,
    /// Clock value (ms) of the last create/retain/touch
    pub last_used: f64,
    pub ref_count: u32,
    handle: NativeHandle,
    /// Creation order, breaks last-used ties deterministically
    sequence: u64,
}

impl GpuResource {
    pub fn handle(&self) -> NativeHandle {
        self.handle
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceStats {
    pub buffers: usize,
    pub textures: usize,
    pub programs: usize,
    pub framebuffers: usize,
    pub bytes_in_use: u64,
    pub peak_bytes: u64,
    pub memory_ceiling_bytes: u64,
    pub evictions: u64,
    pub denied_creations: u64,
}

/// Non-deleting view of the graphics context
pub struct GpuContext<'a> {
    backend: &'a mut dyn GpuBackend,
}

impl GpuContext<'_> {
    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    pub fn begin_frame(&mut self) {
        self.backend.begin_frame();
    }

    pub fn write_buffer(&mut self, handle: NativeHandle, offset: u64, data: &[u8]) -> bool {
        self.backend.write_buffer(handle, offset, data)
    }

    pub fn read_buffer(&mut self, handle: NativeHandle, out: &mut [u8]) -> bool {
        self.backend.read_buffer(handle, out)
    }

    pub fn draw(&mut self, submission: &DrawSubmission) -> bool {
        self.backend.draw(submission)
    }

    pub fn dispatch_feedback(&mut self, pass: &FeedbackPass<'_>) -> bool {
        self.backend.dispatch_feedback(pass)
    }
}

pub struct ResourceManager {
    backend: Box<dyn GpuBackend>,
    resources: FxHashMap<String, GpuResource>,

    memory_ceiling: u64,
    gc_threshold: f32,
    bytes_in_use: u64,
    peak_bytes: u64,

    clock_ms: f64,
    next_sequence: u64,

    evictions: u64,
    denied_creations: u64,
    destroyed: bool,
}

impl ResourceManager {
    /// `memory_ceiling_mb` of `None` takes the backend's suggested ceiling
    pub fn new(backend: Box<dyn GpuBackend>, config: &ResourceConfig, memory_ceiling_mb: Option<u32>) -> Self {
        let capabilities = backend.capabilities();
        let ceiling_mb = memory_ceiling_mb.unwrap_or(capabilities.suggested_memory_mb);
        log::info!(
            "[ResourceManager::new] Backend '{}', memory ceiling {} MB, GC threshold {:.0}%",
            backend.name(),
            ceiling_mb,
            config.gc_threshold * 100.0
        );

        Self {
            backend,
            resources: FxHashMap::default(),
            memory_ceiling: ceiling_mb as u64 * BYTES_PER_MB,
            gc_threshold: config.gc_threshold,
            bytes_in_use: 0,
            peak_bytes: 0,
            clock_ms: 0.0,
            next_sequence: 0,
            evictions: 0,
            denied_creations: 0,
            destroyed: false,
        }
    }

    /// Frame clock supplied by the host; stamps create/retain/touch
    pub fn set_clock(&mut self, now_ms: f64) {
        self.clock_ms = now_ms;
    }

    pub fn clock(&self) -> f64 {
        self.clock_ms
    }

    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    pub fn context(&mut self) -> GpuContext<'_> {
        GpuContext {
            backend: self.backend.as_mut(),
        }
    }

    pub fn backend(&self) -> &dyn GpuBackend {
        self.backend.as_ref()
    }

    /// Concrete backend access for diagnostics and fault injection
    pub fn backend_as_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.backend.as_any_mut().downcast_mut::<T>()
    }

    pub fn backend_as<T: 'static>(&self) -> Option<&T> {
        self.backend.as_any().downcast_ref::<T>()
    }

    pub fn create_buffer(&mut self, id: &str, data: &[u8], usage: BufferUsage) -> Option<NativeHandle> {
        if let Err(err) = Self::validate_id(id).and_then(|_| {
            if data.is_empty() {
                Err(RenderError::invalid(format!("buffer '{}' has no data", id)))
            } else {
                Ok(())
            }
        }) {
            log::warn!("[ResourceManager::create_buffer] {}", err);
            return None;
        }

        self.allocate(id, ResourceKind::Buffer, data.len() as u64, |backend| {
            backend.create_buffer(id, data, usage).ok_or_else(|| refused(id))
        })
        .ok()
    }

    pub fn create_texture(
        &mut self,
        id: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
        data: Option<&[u8]>,
    ) -> Option<NativeHandle> {
        let desc = TextureDesc {
            width,
            height,
            format,
            render_target: false,
        };
        self.create_texture_object(id, ResourceKind::Texture, desc, data)
    }

    /// Render-target texture registered as a framebuffer
    pub fn create_framebuffer(&mut self, id: &str, width: u32, height: u32) -> Option<NativeHandle> {
        let desc = TextureDesc {
            width,
            height,
            format: TextureFormat::Rgba8Unorm,
            render_target: true,
        };
        self.create_texture_object(id, ResourceKind::Framebuffer, desc, None)
    }

    fn create_texture_object(
        &mut self,
        id: &str,
        kind: ResourceKind,
        desc: TextureDesc,
        data: Option<&[u8]>,
    ) -> Option<NativeHandle> {
        let max = self.backend.capabilities().max_texture_size;
        let validation = Self::validate_id(id).and_then(|_| {
            if desc.width == 0 || desc.height == 0 {
                Err(RenderError::invalid(format!("texture '{}' has zero area", id)))
            } else if desc.width > max || desc.height > max {
                Err(RenderError::invalid(format!(
                    "texture '{}' is {}x{}, device maximum is {}",
                    id, desc.width, desc.height, max
                )))
            } else if data.is_some_and(|bytes| bytes.len() as u64 != desc.byte_size()) {
                Err(RenderError::invalid(format!(
                    "texture '{}' data does not match {}x{}",
                    id, desc.width, desc.height
                )))
            } else {
                Ok(())
            }
        });
        if let Err(err) = validation {
            log::warn!("[ResourceManager::create_texture] {}", err);
            return None;
        }

        self.allocate(id, kind, desc.byte_size(), |backend| {
            backend.create_texture(id, &desc, data).ok_or_else(|| refused(id))
        })
        .ok()
    }

    /// Compile and register a program; the caller retains it
    pub fn create_program(&mut self, id: &str, desc: &ProgramDesc) -> Result<NativeHandle, GpuError> {
        if let Err(err) = Self::validate_id(id) {
            log::warn!("[ResourceManager::create_program] {}", err);
            return Err(GpuError::Denied {
                label: desc.label.clone(),
                reason: err.to_string(),
            });
        }
        self.allocate(id, ResourceKind::Program, desc.estimated_size(), |backend| {
            backend.compile_program(desc)
        })
    }

    fn validate_id(id: &str) -> RenderResult<()> {
        if id.is_empty() {
            Err(RenderError::invalid("resource id is empty"))
        } else {
            Ok(())
        }
    }

    /// The object already registered under `id`, if any, stays live until its
    /// replacement has been created
    fn allocate<F>(&mut self, id: &str, kind: ResourceKind, size: u64, create: F) -> Result<NativeHandle, GpuError>
    where
        F: Fn(&mut dyn GpuBackend) -> Result<NativeHandle, GpuError>,
    {
        if self.destroyed {
            log::warn!("[ResourceManager::allocate] '{}' requested after destroy", id);
            return Err(GpuError::Denied {
                label: id.to_string(),
                reason: "resource manager destroyed".to_string(),
            });
        }
        let previous = self.detach(id);

        if let Err(err) = self.reserve(id, size) {
            log::warn!("[ResourceManager::allocate] {}", err);
            self.denied_creations += 1;
            self.restore(previous);
            return Err(GpuError::Denied {
                label: id.to_string(),
                reason: err.to_string(),
            });
        }

        let mut created = create(self.backend.as_mut());
        if matches!(created, Err(GpuError::Denied { .. })) && self.evict_until(0, None) > 0 {
            log::debug!("[ResourceManager::allocate] Device refused '{}', retrying after full eviction", id);
            created = create(self.backend.as_mut());
        }
        let handle = match created {
            Ok(handle) => handle,
            Err(err) => {
                log::warn!("[ResourceManager::allocate] '{}' ({} bytes): {}", id, size, err);
                if matches!(err, GpuError::Denied { .. }) {
                    self.denied_creations += 1;
                }
                self.restore(previous);
                return Err(err);
            }
        };

        if let Some(old) = previous {
            self.retire(old);
        }
        self.insert(id, kind, handle, size);
        if self.is_over_threshold() {
            self.evict_until(self.threshold_bytes(), Some(id));
        }
        Ok(handle)
    }

    fn insert(&mut self, id: &str, kind: ResourceKind, handle: NativeHandle, size: u64) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.resources.insert(
            id.to_string(),
            GpuResource {
                id: id.to_string(),
                kind,
                byte_size: size,
                last_used: self.clock_ms,
                ref_count: 0,
                handle,
                sequence,
            },
        );
        self.bytes_in_use += size;
        self.peak_bytes = self.peak_bytes.max(self.bytes_in_use);
    }

    /// Take an entry out of the registry and its accounting without deleting
    /// the native object
    fn detach(&mut self, id: &str) -> Option<GpuResource> {
        let old = self.resources.remove(id)?;
        self.bytes_in_use = self.bytes_in_use.saturating_sub(old.byte_size);
        Some(old)
    }

    fn restore(&mut self, previous: Option<GpuResource>) {
        if let Some(old) = previous {
            self.bytes_in_use += old.byte_size;
            self.resources.insert(old.id.clone(), old);
        }
    }

    /// Re-creating an id replaces the previous object
    fn retire(&mut self, old: GpuResource) {
        if old.ref_count > 0 {
            log::warn!(
                "[ResourceManager] Replacing '{}' while it still has {} holder(s)",
                old.id,
                old.ref_count
            );
        }
        self.backend.delete(old.handle);
    }

    /// Make room for `size` more bytes, evicting down to the GC threshold first
    fn reserve(&mut self, id: &str, size: u64) -> RenderResult<()> {
        if size > self.memory_ceiling {
            return Err(self.exhaustion(id, size));
        }
        let threshold = self.threshold_bytes();
        if self.bytes_in_use + size > threshold {
            self.evict_until(threshold.saturating_sub(size), None);
        }
        if self.bytes_in_use + size > self.memory_ceiling {
            return Err(self.exhaustion(id, size));
        }
        Ok(())
    }

    fn exhaustion(&self, id: &str, size: u64) -> RenderError {
        RenderError::ResourceExhaustion {
            resource: id.to_string(),
            requested: size,
            available: self.memory_ceiling.saturating_sub(self.bytes_in_use),
        }
    }

    pub fn retain_resource(&mut self, id: &str) -> bool {
        match self.resources.get_mut(id) {
            Some(resource) => {
                resource.ref_count += 1;
                resource.last_used = self.clock_ms;
                true
            }
            None => {
                log::warn!("[ResourceManager::retain_resource] Unknown resource '{}'", id);
                false
            }
        }
    }

    /// Drop one hold; a resource reaching zero holders is deleted right away
    /// only while usage is over the GC threshold, otherwise it waits for GC
    pub fn release_resource(&mut self, id: &str) {
        if self.drop_hold(id) == Some(0) && self.is_over_threshold() {
            self.delete(id);
        }
    }

    /// Drop one hold and delete immediately if it was the last one
    pub fn release_now(&mut self, id: &str) {
        if self.drop_hold(id) == Some(0) {
            self.delete(id);
        }
    }

    fn drop_hold(&mut self, id: &str) -> Option<u32> {
        let Some(resource) = self.resources.get_mut(id) else {
            log::warn!("[ResourceManager::release_resource] Unknown resource '{}'", id);
            return None;
        };
        if resource.ref_count == 0 {
            log::warn!("[ResourceManager::release_resource] '{}' released with no holders", id);
            return None;
        }
        resource.ref_count -= 1;
        Some(resource.ref_count)
    }

    pub fn touch(&mut self, id: &str) -> bool {
        match self.resources.get_mut(id) {
            Some(resource) => {
                resource.last_used = self.clock_ms;
                true
            }
            None => false,
        }
    }

    pub fn handle(&self, id: &str) -> Option<NativeHandle> {
        self.resources.get(id).map(|r| r.handle)
    }

    pub fn resource(&self, id: &str) -> Option<&GpuResource> {
        self.resources.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    pub fn ref_count(&self, id: &str) -> Option<u32> {
        self.resources.get(id).map(|r| r.ref_count)
    }

    /// Evict zero-holder resources, least recently used first, until usage
    /// is back under the GC threshold. Returns how many were evicted.
    pub fn garbage_collect(&mut self) -> usize {
        let evicted = self.evict_until(self.threshold_bytes(), None);
        if evicted > 0 {
            log::debug!(
                "[ResourceManager::garbage_collect] Evicted {} resource(s), {:.2} MB in use",
                evicted,
                self.memory_usage_mb()
            );
        }
        evicted
    }

    /// Delete one resource if nothing holds it
    pub fn evict(&mut self, id: &str) -> bool {
        if self.ref_count(id) != Some(0) {
            return false;
        }
        self.delete(id);
        self.evictions += 1;
        true
    }

    /// Evict every zero-holder resource
    pub fn force_cleanup(&mut self) -> usize {
        self.evict_until(0, None)
    }

    fn evict_until(&mut self, target_bytes: u64, exclude: Option<&str>) -> usize {
        if self.bytes_in_use <= target_bytes {
            return 0;
        }
        let mut candidates: Vec<(f64, u64, String)> = self
            .resources
            .values()
            .filter(|r| r.ref_count == 0 && Some(r.id.as_str()) != exclude)
            .map(|r| (r.last_used, r.sequence, r.id.clone()))
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut evicted = 0;
        for (_, _, id) in candidates {
            if self.bytes_in_use <= target_bytes {
                break;
            }
            self.delete(&id);
            self.evictions += 1;
            evicted += 1;
        }
        evicted
    }

    fn delete(&mut self, id: &str) {
        if let Some(resource) = self.resources.remove(id) {
            log::debug!(
                "[ResourceManager::delete] Deleting {:?} '{}' ({} bytes)",
                resource.kind,
                id,
                resource.byte_size
            );
            self.backend.delete(resource.handle);
            self.bytes_in_use = self.bytes_in_use.saturating_sub(resource.byte_size);
        }
    }

    fn threshold_bytes(&self) -> u64 {
        (self.memory_ceiling as f64 * self.gc_threshold as f64) as u64
    }

    pub fn is_over_threshold(&self) -> bool {
        self.bytes_in_use > self.threshold_bytes()
    }

    pub fn memory_usage_mb(&self) -> f64 {
        self.bytes_in_use as f64 / BYTES_PER_MB as f64
    }

    pub fn memory_ceiling_mb(&self) -> f64 {
        self.memory_ceiling as f64 / BYTES_PER_MB as f64
    }

    /// Usage as a share of the ceiling
    pub fn usage_ratio(&self) -> f32 {
        if self.memory_ceiling == 0 {
            return 0.0;
        }
        (self.bytes_in_use as f64 / self.memory_ceiling as f64) as f32
    }

    pub fn bytes_in_use(&self) -> u64 {
        self.bytes_in_use
    }

    pub fn gc_threshold(&self) -> f32 {
        self.gc_threshold
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn stats(&self) -> ResourceStats {
        let mut stats = ResourceStats {
            bytes_in_use: self.bytes_in_use,
            peak_bytes: self.peak_bytes,
            memory_ceiling_bytes: self.memory_ceiling,
            evictions: self.evictions,
            denied_creations: self.denied_creations,
            ..Default::default()
        };
        for resource in self.resources.values() {
            match resource.kind {
                ResourceKind::Buffer => stats.buffers += 1,
                ResourceKind::Texture => stats.textures += 1,
                ResourceKind::Program => stats.programs += 1,
                ResourceKind::Framebuffer => stats.framebuffers += 1,
            }
        }
        stats
    }

    /// Delete everything regardless of holders; later calls are no-ops
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        log::info!(
            "[ResourceManager::destroy] Releasing {} resource(s), {:.2} MB",
            self.resources.len(),
            self.memory_usage_mb()
        );
        for (_, resource) in self.resources.drain() {
            self.backend.delete(resource.handle);
        }
        self.bytes_in_use = 0;
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

fn refused(id: &str) -> GpuError {
    GpuError::Denied {
        label: id.to_string(),
        reason: "device refused the allocation".to_string(),
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessBackend;

    const KB: usize = 1024;

    fn manager(ceiling_mb: u32) -> ResourceManager {
        ResourceManager::new(
            Box::new(HeadlessBackend::new()),
            &ResourceConfig::default(),
            Some(ceiling_mb),
        )
    }

    #[test]
    fn test_refcount_retain_three_release_two() {
        let mut resources = manager(1);
        // 900 KB of a 1 MB ceiling sits above the 80% threshold
        assert!(resources
            .create_buffer("vertices", &vec![0u8; 900 * KB], BufferUsage::Vertex)
            .is_some());

        for _ in 0..3 {
            assert!(resources.retain_resource("vertices"));
        }
        resources.release_resource("vertices");
        resources.release_resource("vertices");
        assert!(resources.contains("vertices"));
        assert_eq!(resources.ref_count("vertices"), Some(1));

        resources.release_resource("vertices");
        assert!(!resources.contains("vertices"));
        assert_eq!(resources.bytes_in_use(), 0);
    }

    #[test]
    fn test_release_under_threshold_defers_deletion() {
        let mut resources = manager(16);
        resources.create_buffer("small", &[1u8; 64], BufferUsage::Vertex).unwrap();
        resources.retain_resource("small");
        resources.release_resource("small");
        assert!(resources.contains("small"));
        assert_eq!(resources.ref_count("small"), Some(0));
        assert_eq!(resources.force_cleanup(), 1);
        assert!(!resources.contains("small"));
    }

    #[test]
    fn test_gc_evicts_least_recently_used_first() {
        let mut resources = manager(1);
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            resources.set_clock(i as f64 * 10.0);
            resources.create_buffer(id, &vec![0u8; 300 * KB], BufferUsage::Vertex);
        }
        // Room for "c" came from the oldest zero-holder buffer
        assert!(!resources.contains("a"));
        assert!(resources.contains("b"));
        assert!(resources.contains("c"));
    }

    #[test]
    fn test_usage_never_exceeds_ceiling() {
        let mut resources = manager(1);
        for i in 0..50 {
            resources.set_clock(i as f64);
            let id = format!("buffer/{}", i);
            resources.create_buffer(&id, &vec![0u8; (37 + i * 13) * KB % (700 * KB) + KB], BufferUsage::Vertex);
            if i % 3 == 0 {
                resources.retain_resource(&id);
            }
            resources.garbage_collect();
            assert!(resources.memory_usage_mb() <= resources.memory_ceiling_mb());
        }
    }

    #[test]
    fn test_creation_denied_when_everything_is_retained() {
        let mut resources = manager(1);
        resources.create_buffer("held", &vec![0u8; 700 * KB], BufferUsage::Vertex).unwrap();
        resources.retain_resource("held");
        assert!(resources
            .create_buffer("more", &vec![0u8; 400 * KB], BufferUsage::Vertex)
            .is_none());
        assert!(resources.contains("held"));
        assert_eq!(resources.stats().denied_creations, 1);
    }

    #[test]
    fn test_oversized_request_is_denied_without_eviction() {
        let mut resources = manager(1);
        resources.create_buffer("keep", &[0u8; 16], BufferUsage::Vertex).unwrap();
        assert!(resources
            .create_buffer("huge", &vec![0u8; 2 * 1024 * KB], BufferUsage::Vertex)
            .is_none());
        assert!(resources.contains("keep"));
    }

    #[test]
    fn test_invalid_texture_requests_return_none() {
        let mut resources = manager(16);
        assert!(resources.create_texture("t", 0, 4, TextureFormat::Rgba8Unorm, None).is_none());
        assert!(resources
            .create_texture("t", 4, 4, TextureFormat::Rgba8Unorm, Some(&[0u8; 3]))
            .is_none());
        assert!(resources.create_texture("t", 8192, 8, TextureFormat::Rgba8Unorm, None).is_none());
        assert!(resources.create_texture("", 4, 4, TextureFormat::Rgba8Unorm, None).is_none());
        assert!(resources.create_texture("t", 4, 4, TextureFormat::Rgba8Unorm, None).is_some());
    }

    #[test]
    fn test_recreate_replaces_previous_object() {
        let mut resources = manager(16);
        let first = resources.create_buffer("dup", &[0u8; 32], BufferUsage::Vertex).unwrap();
        let second = resources.create_buffer("dup", &[0u8; 64], BufferUsage::Vertex).unwrap();
        assert_ne!(first, second);
        assert_eq!(resources.bytes_in_use(), 64);
        let headless = resources.backend_as::<HeadlessBackend>().unwrap();
        assert_eq!(headless.live_objects(), 1);
    }

    #[test]
    fn test_failed_recreate_keeps_original() {
        let mut resources = manager(16);
        let original = resources.create_buffer("held", &[7u8; 32], BufferUsage::Vertex).unwrap();
        resources.retain_resource("held");

        resources
            .backend_as_mut::<HeadlessBackend>()
            .unwrap()
            .set_fail_allocations(true);
        assert!(resources.create_buffer("held", &[0u8; 64], BufferUsage::Vertex).is_none());

        assert!(resources.contains("held"));
        assert_eq!(resources.handle("held"), Some(original));
        assert_eq!(resources.ref_count("held"), Some(1));
        assert_eq!(resources.bytes_in_use(), 32);
        let headless = resources.backend_as::<HeadlessBackend>().unwrap();
        assert_eq!(headless.buffer_contents(original), Some(&[7u8; 32][..]));
    }

    #[test]
    fn test_recreate_over_ceiling_keeps_original() {
        let mut resources = manager(1);
        resources.create_buffer("held", &vec![0u8; 300 * KB], BufferUsage::Vertex).unwrap();
        resources.retain_resource("held");
        assert!(resources
            .create_buffer("held", &vec![0u8; 2 * 1024 * KB], BufferUsage::Vertex)
            .is_none());
        assert!(resources.contains("held"));
        assert_eq!(resources.bytes_in_use(), 300 * KB as u64);
    }

    #[test]
    fn test_programs_count_against_ceiling() {
        let mut resources = manager(1);
        let desc = ProgramDesc::render("flat", "@vertex fn vs_main() {}", &[2]);
        resources.create_program("program/flat", &desc).unwrap();
        assert_eq!(resources.bytes_in_use(), desc.estimated_size());
        assert_eq!(resources.stats().programs, 1);

        resources.retain_resource("program/flat");
        resources
            .create_buffer("held", &vec![0u8; 1024 * KB - 1536], BufferUsage::Vertex)
            .unwrap();
        resources.retain_resource("held");
        let other = ProgramDesc::render("other", "@vertex fn vs_main() {}", &[2]);
        assert!(matches!(
            resources.create_program("program/other", &other),
            Err(GpuError::Denied { .. })
        ));
        assert!(resources.memory_usage_mb() <= resources.memory_ceiling_mb());
    }

    #[test]
    fn test_failed_program_recompile_keeps_original() {
        let mut resources = manager(16);
        let desc = ProgramDesc::render("flat", "@vertex fn vs_main() {}", &[2]);
        let original = resources.create_program("program/flat", &desc).unwrap();
        let broken = ProgramDesc::render("broken", "", &[2]);
        assert!(matches!(
            resources.create_program("program/flat", &broken),
            Err(GpuError::ProgramCompile { .. })
        ));
        assert_eq!(resources.handle("program/flat"), Some(original));
        assert_eq!(resources.stats().denied_creations, 0);
    }

    #[test]
    fn test_framebuffer_kind_is_tracked() {
        let mut resources = manager(16);
        resources.create_framebuffer("pick", 32, 32).unwrap();
        let stats = resources.stats();
        assert_eq!(stats.framebuffers, 1);
        assert_eq!(stats.bytes_in_use, 32 * 32 * 4);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut resources = manager(16);
        resources.create_buffer("a", &[0u8; 32], BufferUsage::Vertex).unwrap();
        resources.retain_resource("a");
        resources.destroy();
        resources.destroy();
        assert!(resources.is_empty());
        assert!(resources.create_buffer("b", &[0u8; 32], BufferUsage::Vertex).is_none());
        let headless = resources.backend_as::<HeadlessBackend>().unwrap();
        assert_eq!(headless.live_objects(), 0);
        assert_eq!(headless.invalid_deletes(), 0);
    }
}
