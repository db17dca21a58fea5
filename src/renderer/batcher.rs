//! Draw-call batcher
//!
//! Queues draw calls, merges those sharing (program, primitive, stride,
//! uniform signature) and submits one draw per group. Merged geometry goes
//! through the resource registry as transient buffers reused by group slot,
//! so per-frame churn counts against the memory budget.

use rustc_hash::FxHashMap;
use serde::Serialize;

use super::draw_call::{BatchedDrawCall, DrawCall, DrawCallId, DrawCallRequest, DrawPriority};
use crate::config::BatcherConfig;
use crate::gpu::{BufferUsage, DrawSubmission, PrimitiveKind};
use crate::memory::ResourceManager;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatcherMetrics {
    pub draw_calls: u64,
    pub batches: u64,
    pub vertices: u64,
    /// draw_calls / batches
    pub compression_ratio: f32,
    /// Batches dropped because upload or submission failed
    pub skipped_batches: u64,
    pub rejected_calls: u64,
    pub flushes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    program: String,
    primitive: PrimitiveKind,
    stride: u32,
    signature: u64,
    // Strips cannot be concatenated, each one stays on its own
    strip: Option<DrawCallId>,
}

impl GroupKey {
    fn of(call: &DrawCall) -> Self {
        let request = &call.request;
        Self {
            program: request.program.clone(),
            primitive: request.primitive,
            stride: request.vertex_stride,
            signature: request.uniforms.signature(),
            strip: (request.primitive == PrimitiveKind::TriangleStrip).then_some(call.id),
        }
    }
}

/// Calls whose keys match still need equal uniforms to share a group, the
/// signature is only a hash of them
fn group_calls<'a, K>(calls: &'a [DrawCall], key: K) -> Vec<Vec<&'a DrawCall>>
where
    K: Fn(&DrawCall) -> GroupKey,
{
    let mut slots: FxHashMap<GroupKey, Vec<usize>> = FxHashMap::default();
    let mut groups: Vec<Vec<&DrawCall>> = Vec::new();
    for call in calls {
        let candidates = slots.entry(key(call)).or_default();
        let existing = candidates
            .iter()
            .copied()
            .find(|&slot| groups[slot][0].request.uniforms == call.request.uniforms);
        match existing {
            Some(slot) => groups[slot].push(call),
            None => {
                candidates.push(groups.len());
                groups.push(vec![call]);
            }
        }
    }
    groups
}

fn vertex_buffer_id(slot: usize) -> String {
    format!("batch/{}/vertices", slot)
}

fn index_buffer_id(slot: usize) -> String {
    format!("batch/{}/indices", slot)
}

pub struct DrawBatcher {
    config: BatcherConfig,
    pending: Vec<DrawCall>,
    next_id: DrawCallId,
    metrics: BatcherMetrics,
    /// Highest number of transient slots used by any flush
    transient_slots: usize,
}

impl DrawBatcher {
    pub fn new(config: &BatcherConfig) -> Self {
        Self {
            config: config.clone(),
            pending: Vec::new(),
            next_id: 1,
            metrics: BatcherMetrics::default(),
            transient_slots: 0,
        }
    }

    /// Queue a draw call; malformed requests are logged and dropped
    pub fn add_draw_call(&mut self, request: DrawCallRequest, now: f64) -> Option<DrawCallId> {
        if let Err(err) = request.validate() {
            log::warn!("[DrawBatcher::add_draw_call] {}", err);
            self.metrics.rejected_calls += 1;
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push(DrawCall {
            id,
            request,
            timestamp: now,
        });
        Some(id)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn should_flush(&self, now: f64) -> bool {
        let Some(oldest) = self.pending.first() else {
            return false;
        };
        self.pending.len() > self.config.max_batch_size
            || now - oldest.timestamp > self.config.max_wait_time_ms
            || self
                .pending
                .iter()
                .any(|call| call.request.priority == DrawPriority::High)
    }

    /// Per-tick scheduler; returns whether a flush happened
    pub fn tick(&mut self, now: f64, resources: &mut ResourceManager) -> bool {
        if !self.should_flush(now) {
            return false;
        }
        self.flush(resources);
        true
    }

    /// Merge pending calls by shape, in order of first appearance
    pub fn build_batches(calls: &[DrawCall]) -> Vec<BatchedDrawCall> {
        let groups = group_calls(calls, GroupKey::of);

        groups
            .into_iter()
            .map(|group| {
                let first = &group[0].request;
                let indexed = group.iter().any(|call| call.request.indices.is_some());
                let mut vertices = Vec::with_capacity(group.iter().map(|c| c.request.vertices.len()).sum());
                let mut indices = indexed.then(Vec::new);
                let mut base = 0u32;

                for call in &group {
                    let request = &call.request;
                    vertices.extend_from_slice(&request.vertices);
                    if let Some(indices) = indices.as_mut() {
                        match &request.indices {
                            Some(own) => indices.extend(own.iter().map(|i| i + base)),
                            None => indices.extend(base..base + request.vertex_count()),
                        }
                    }
                    base += request.vertex_count();
                }

                BatchedDrawCall {
                    program: first.program.clone(),
                    primitive: first.primitive,
                    vertex_stride: first.vertex_stride,
                    vertices,
                    indices,
                    uniforms: first.uniforms.clone(),
                    merged: group.len(),
                }
            })
            .collect()
    }

    /// Submit everything pending now. Returns the number of batches drawn.
    pub fn flush(&mut self, resources: &mut ResourceManager) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        let calls = std::mem::take(&mut self.pending);
        let batches = Self::build_batches(&calls);
        self.transient_slots = self.transient_slots.max(batches.len());

        let mut submitted = 0;
        for (slot, batch) in batches.iter().enumerate() {
            if Self::submit(slot, batch, resources) {
                submitted += 1;
                self.metrics.draw_calls += batch.merged as u64;
                self.metrics.vertices += batch.vertex_count() as u64;
            } else {
                self.metrics.skipped_batches += 1;
            }
        }

        self.metrics.batches += submitted as u64;
        self.metrics.flushes += 1;
        if self.metrics.batches > 0 {
            self.metrics.compression_ratio = self.metrics.draw_calls as f32 / self.metrics.batches as f32;
        }
        log::trace!(
            "[DrawBatcher::flush] {} call(s) -> {} batch(es), {} skipped",
            calls.len(),
            submitted,
            batches.len() - submitted
        );
        submitted
    }

    fn submit(slot: usize, batch: &BatchedDrawCall, resources: &mut ResourceManager) -> bool {
        let vertex_id = vertex_buffer_id(slot);
        let Some(vertex_buffer) =
            resources.create_buffer(&vertex_id, bytemuck::cast_slice(&batch.vertices), BufferUsage::Vertex)
        else {
            log::debug!("[DrawBatcher::submit] Vertex upload denied for slot {}", slot);
            return false;
        };
        resources.retain_resource(&vertex_id);

        let index_id = index_buffer_id(slot);
        let mut index_buffer = None;
        if let Some(indices) = &batch.indices {
            match resources.create_buffer(&index_id, bytemuck::cast_slice(indices), BufferUsage::Index) {
                Some(handle) => {
                    resources.retain_resource(&index_id);
                    index_buffer = Some(handle);
                }
                None => {
                    log::debug!("[DrawBatcher::submit] Index upload denied for slot {}", slot);
                    resources.release_resource(&vertex_id);
                    return false;
                }
            }
        }

        // Resolved after uploading; those allocations may have run GC
        let drawn = match resources.handle(&batch.program) {
            Some(program) => {
                let texture_id = batch.uniforms.texture();
                let texture = texture_id.and_then(|id| resources.handle(id));
                let submission = DrawSubmission {
                    program,
                    primitive: batch.primitive,
                    vertex_buffer,
                    vertex_count: batch.vertex_count(),
                    index_buffer,
                    index_count: batch.indices.as_ref().map_or(0, |i| i.len() as u32),
                    uniforms: batch.uniforms.packed(),
                    texture,
                };
                let drawn = resources.context().draw(&submission);
                resources.touch(&batch.program);
                if let Some(id) = texture_id {
                    resources.touch(id);
                }
                drawn
            }
            None => {
                log::warn!("[DrawBatcher::submit] Unknown program '{}'", batch.program);
                false
            }
        };

        resources.release_resource(&vertex_id);
        if index_buffer.is_some() {
            resources.release_resource(&index_id);
        }
        drawn
    }

    pub fn metrics(&self) -> &BatcherMetrics {
        &self.metrics
    }

    pub fn reset_metrics(&mut self) {
        self.metrics = BatcherMetrics::default();
    }

    /// Drop pending calls and delete the transient buffers
    pub fn dispose(&mut self, resources: &mut ResourceManager) {
        self.pending.clear();
        for slot in 0..self.transient_slots {
            resources.evict(&vertex_buffer_id(slot));
            resources.evict(&index_buffer_id(slot));
        }
        self.transient_slots = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::gpu::{HeadlessBackend, ProgramDesc};
    use crate::renderer::draw_call::{UniformSet, UniformValue};

    const PROGRAM: &str = "program/test";

    fn setup() -> (DrawBatcher, ResourceManager) {
        let mut resources =
            ResourceManager::new(Box::new(HeadlessBackend::new()), &ResourceConfig::default(), Some(16));
        let desc = ProgramDesc::render("test", "@vertex fn vs_main() {}", &[2]);
        resources.create_program(PROGRAM, &desc).unwrap();
        resources.retain_resource(PROGRAM);
        (DrawBatcher::new(&BatcherConfig::default()), resources)
    }

    fn quad(x: f32) -> DrawCallRequest {
        DrawCallRequest::new(
            PROGRAM,
            PrimitiveKind::Triangles,
            vec![x, 0.0, x + 1.0, 0.0, x + 1.0, 1.0, x, 1.0],
            2,
        )
        .with_indices(vec![0, 1, 2, 0, 2, 3])
    }

    fn headless(resources: &ResourceManager) -> &HeadlessBackend {
        resources.backend_as::<HeadlessBackend>().unwrap()
    }

    #[test]
    fn test_identical_calls_merge_into_one_batch() {
        let (mut batcher, mut resources) = setup();
        for i in 0..10 {
            assert!(batcher.add_draw_call(quad(i as f32), 0.0).is_some());
        }
        assert_eq!(batcher.flush(&mut resources), 1);

        let metrics = batcher.metrics();
        assert_eq!(metrics.draw_calls, 10);
        assert_eq!(metrics.batches, 1);
        assert_eq!(metrics.vertices, 40);
        assert_eq!(metrics.compression_ratio, 10.0);

        let draws = headless(&resources).frame_draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].vertex_count, 40);
        assert_eq!(draws[0].index_count, 60);
        let backend = headless(&resources);
        assert_eq!(backend.buffer_usage(draws[0].vertex_buffer), Some(BufferUsage::Vertex));
        assert_eq!(backend.buffer_usage(draws[0].index_buffer.unwrap()), Some(BufferUsage::Index));
    }

    #[test]
    fn test_indices_are_remapped_by_vertex_offset() {
        let calls: Vec<DrawCall> = (0..3)
            .map(|i| DrawCall {
                id: i,
                request: quad(i as f32),
                timestamp: 0.0,
            })
            .collect();
        let batches = DrawBatcher::build_batches(&calls);
        assert_eq!(batches.len(), 1);
        let indices = batches[0].indices.as_ref().unwrap();
        assert_eq!(&indices[6..12], &[4, 5, 6, 4, 6, 7]);
        assert_eq!(&indices[12..], &[8, 9, 10, 8, 10, 11]);
    }

    #[test]
    fn test_unindexed_call_in_indexed_group_gets_sequential_indices() {
        let plain = DrawCallRequest::new(PROGRAM, PrimitiveKind::Triangles, vec![0.0; 6], 2);
        let calls = vec![
            DrawCall { id: 1, request: quad(0.0), timestamp: 0.0 },
            DrawCall { id: 2, request: plain, timestamp: 0.0 },
        ];
        let batches = DrawBatcher::build_batches(&calls);
        let indices = batches[0].indices.as_ref().unwrap();
        assert_eq!(&indices[6..], &[4, 5, 6]);
    }

    #[test]
    fn test_groups_split_by_shape_in_first_appearance_order() {
        let points = DrawCallRequest::new(PROGRAM, PrimitiveKind::Points, vec![0.0, 0.0], 2);
        let tinted = quad(5.0).with_uniforms(UniformSet::new().with("u_tint", UniformValue::Float(1.0)));
        let calls = vec![
            DrawCall { id: 1, request: points.clone(), timestamp: 0.0 },
            DrawCall { id: 2, request: quad(0.0), timestamp: 0.0 },
            DrawCall { id: 3, request: tinted, timestamp: 0.0 },
            DrawCall { id: 4, request: points, timestamp: 0.0 },
        ];
        let batches = DrawBatcher::build_batches(&calls);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].primitive, PrimitiveKind::Points);
        assert_eq!(batches[0].merged, 2);
        assert_eq!(batches[1].merged, 1);
        assert!(batches[2].uniforms.get("u_tint").is_some());
    }

    #[test]
    fn test_strips_are_never_merged() {
        let strip = DrawCallRequest::new(PROGRAM, PrimitiveKind::TriangleStrip, vec![0.0; 8], 2);
        let calls = vec![
            DrawCall { id: 1, request: strip.clone(), timestamp: 0.0 },
            DrawCall { id: 2, request: strip, timestamp: 0.0 },
        ];
        assert_eq!(DrawBatcher::build_batches(&calls).len(), 2);
    }

    #[test]
    fn test_colliding_signatures_keep_distinct_uniforms_apart() {
        let warm = quad(0.0).with_uniforms(UniformSet::new().with("u_tint", UniformValue::Float(1.0)));
        let cold = quad(1.0).with_uniforms(UniformSet::new().with("u_tint", UniformValue::Float(0.0)));
        let calls = vec![
            DrawCall { id: 1, request: warm.clone(), timestamp: 0.0 },
            DrawCall { id: 2, request: cold, timestamp: 0.0 },
            DrawCall { id: 3, request: warm, timestamp: 0.0 },
        ];
        // Every call hashes to the same key
        let groups = group_calls(&calls, |call| GroupKey {
            signature: 0,
            ..GroupKey::of(call)
        });
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(groups[1][0].id, 2);
    }

    #[test]
    fn test_malformed_calls_are_rejected() {
        let (mut batcher, _resources) = setup();
        let ragged = DrawCallRequest::new(PROGRAM, PrimitiveKind::Triangles, vec![0.0; 5], 2);
        let bad_index = quad(0.0).with_indices(vec![0, 1, 9]);
        let empty = DrawCallRequest::new(PROGRAM, PrimitiveKind::Triangles, Vec::new(), 2);
        assert!(batcher.add_draw_call(ragged, 0.0).is_none());
        assert!(batcher.add_draw_call(bad_index, 0.0).is_none());
        assert!(batcher.add_draw_call(empty, 0.0).is_none());
        assert_eq!(batcher.pending_len(), 0);
        assert_eq!(batcher.metrics().rejected_calls, 3);
    }

    #[test]
    fn test_tick_scheduling() {
        let (mut batcher, mut resources) = setup();
        assert!(!batcher.tick(0.0, &mut resources));

        batcher.add_draw_call(quad(0.0), 0.0);
        assert!(!batcher.tick(10.0, &mut resources));
        assert!(batcher.tick(17.0, &mut resources));
        assert_eq!(batcher.pending_len(), 0);

        batcher.add_draw_call(quad(0.0).with_priority(DrawPriority::High), 20.0);
        assert!(batcher.tick(20.0, &mut resources));

        for i in 0..101 {
            batcher.add_draw_call(quad(i as f32), 30.0);
        }
        assert!(batcher.tick(30.0, &mut resources));
    }

    #[test]
    fn test_denied_upload_skips_batch() {
        let (mut batcher, mut resources) = setup();
        resources
            .backend_as_mut::<HeadlessBackend>()
            .unwrap()
            .set_fail_allocations(true);
        batcher.add_draw_call(quad(0.0), 0.0);
        assert_eq!(batcher.flush(&mut resources), 0);
        assert_eq!(batcher.metrics().skipped_batches, 1);
        assert_eq!(headless(&resources).total_draws(), 0);
    }

    #[test]
    fn test_flush_on_empty_queue_is_noop() {
        let (mut batcher, mut resources) = setup();
        assert_eq!(batcher.flush(&mut resources), 0);
        assert_eq!(batcher.metrics().flushes, 0);
    }

    #[test]
    fn test_transient_buffers_are_reused_and_disposed() {
        let (mut batcher, mut resources) = setup();
        for frame in 0..3 {
            batcher.add_draw_call(quad(frame as f32), 0.0);
            batcher.flush(&mut resources);
        }
        assert_eq!(resources.stats().buffers, 2);
        batcher.dispose(&mut resources);
        assert_eq!(resources.stats().buffers, 0);
        assert!(batcher.metrics().compression_ratio >= 1.0);
        batcher.reset_metrics();
        assert_eq!(batcher.metrics(), &BatcherMetrics::default());
    }
}
