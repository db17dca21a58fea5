//! Frame orchestrator
//!
//! Owns the resource registry (and through it the graphics backend) plus
//! every rendering component, and serializes their access to the device.
//! Only construction can fail; everything on the frame path absorbs its
//! failures and reports them through `FrameStats`.

use glam::{Vec2, Vec3};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::batcher::{BatcherMetrics, DrawBatcher};
use super::draw_call::{DrawCallRequest, UniformSet, UniformValue};
use super::error::RenderErrorContext;
use crate::camera::Camera;
use crate::config::RenderConfig;
use crate::constants::organism::{BASE_RADIUS, VERTEX_STRIDE};
use crate::culling::{BoundingVolume, CullableObject, CullingStats, FrustumCuller};
use crate::error::RenderResult;
use crate::gpu::{GpuBackend, PrimitiveKind, ProgramDesc};
use crate::memory::{ResourceManager, ResourceStats};
use crate::mutation::processor::check_population;
use crate::mutation::{CpuMutationProcessor, GpuMutationProcessor, MutationData, MutationProcessor};
use crate::particles::{ParticleKind, ParticleStats, ParticleSystem, PARTICLE_PROGRAM_ID};
use crate::texture::{OrganismTraits, ProceduralTextureGenerator, TextureCacheStats, TextureHandle, TextureOptions};

pub const ORGANISM_PROGRAM_ID: &str = "program/organism";

const ORGANISM_SHADER: &str = include_str!("../shaders/organism.wgsl");
const PARTICLE_SHADER: &str = include_str!("../shaders/particles.wgsl");

/// Uniform naming a texture that is never registered; samples as white
const UNTEXTURED: &str = "";

/// Smallest share of the configured particle count kept under pressure
const MIN_PARTICLE_SHARE: usize = 8;

/// One organism to draw this frame, as sent by the message layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub organism_id: String,
    pub position: Vec2,
    #[serde(default)]
    pub traits: Vec<f32>,
    pub energy: f32,
    #[serde(default)]
    pub generation: u32,
    pub dna: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationEventKind {
    Mutation,
    Consciousness,
    Trait,
    Energy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEvent {
    #[serde(rename = "type")]
    pub kind: MutationEventKind,
    pub magnitude: f32,
    pub timestamp: f64,
    /// Burst origin; the camera center when absent
    #[serde(default)]
    pub position: Option<Vec2>,
    /// Values for trait events, one particle group per value
    #[serde(default)]
    pub traits: Vec<f32>,
}

/// Per-frame clock and performance inputs from the frame driver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    pub now_ms: f64,
    /// Seconds since the previous frame
    pub delta_time: f32,
    pub current_fps: f32,
    pub global_energy: f32,
    pub mutation_level: f32,
}

impl FrameInput {
    /// Steady-state frame at `fps`
    pub fn at(now_ms: f64, fps: f32) -> Self {
        Self {
            now_ms,
            delta_time: if fps > 0.0 { 1.0 / fps } else { 0.0 },
            current_fps: fps,
            global_energy: 0.5,
            mutation_level: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameStats {
    pub frame: u64,
    pub submitted: usize,
    pub visible: usize,
    pub culled: usize,
    pub visible_budget: usize,
    /// Whether the batcher flushed this frame
    pub flushed: bool,
    pub batches: u64,
    pub live_particles: usize,
    pub particle_budget: usize,
    pub memory_usage_mb: f64,
    pub textures_skipped: u64,
    pub mutation_ran: bool,
}

/// Aggregate of every component's metrics
#[derive(Debug, Clone)]
pub struct RendererStats {
    pub frames: u64,
    pub resources: ResourceStats,
    pub batcher: BatcherMetrics,
    pub culling: CullingStats,
    pub particles: ParticleStats,
    pub textures: TextureCacheStats,
    pub mutation_ticks: u64,
    pub cpu_mutation_ticks: u64,
    pub gpu_mutation_available: bool,
    pub particles_enabled: bool,
}

struct RegisteredOrganism {
    request: RenderRequest,
    texture: Option<TextureHandle>,
    object: CullableObject,
}

pub fn organism_radius(energy: f32) -> f32 {
    BASE_RADIUS * (0.75 + 0.5 * energy.clamp(0.0, 1.0))
}

/// Indexed quad, stride 5: position(2) uv(2) energy(1)
pub fn organism_quad(center: Vec2, radius: f32, energy: f32) -> (Vec<f32>, Vec<u32>) {
    let corners = [
        (Vec2::new(-1.0, -1.0), Vec2::new(0.0, 1.0)),
        (Vec2::new(1.0, -1.0), Vec2::new(1.0, 1.0)),
        (Vec2::new(1.0, 1.0), Vec2::new(1.0, 0.0)),
        (Vec2::new(-1.0, 1.0), Vec2::new(0.0, 0.0)),
    ];
    let mut vertices = Vec::with_capacity(corners.len() * VERTEX_STRIDE as usize);
    for (offset, uv) in corners {
        let position = center + offset * radius;
        vertices.extend_from_slice(&[position.x, position.y, uv.x, uv.y, energy]);
    }
    (vertices, vec![0, 1, 2, 0, 2, 3])
}

pub struct OrganismRenderer {
    config: RenderConfig,
    resources: ResourceManager,
    batcher: DrawBatcher,
    culler: FrustumCuller,
    particles: ParticleSystem,
    textures: ProceduralTextureGenerator,
    gpu_mutation: GpuMutationProcessor,
    cpu_mutation: CpuMutationProcessor,

    organisms: Vec<RegisteredOrganism>,
    organism_slots: FxHashMap<String, usize>,
    population: Option<MutationData>,

    particles_enabled: bool,
    frame: u64,
    mutation_ticks: u64,
    cpu_mutation_ticks: u64,
    textures_skipped: u64,
    disposed: bool,
}

impl OrganismRenderer {
    pub fn new(backend: Box<dyn GpuBackend>, config: RenderConfig) -> RenderResult<Self> {
        config.validate()?;
        let mut resources = ResourceManager::new(backend, &config.resources, config.memory_ceiling_mb);

        let organism = ProgramDesc::render("organism", ORGANISM_SHADER, &[2, 2, 1]);
        resources
            .create_program(ORGANISM_PROGRAM_ID, &organism)
            .init_context("organism program")?;
        resources.retain_resource(ORGANISM_PROGRAM_ID);

        let particle = ProgramDesc::render("particles", PARTICLE_SHADER, &[2, 1, 4]);
        let particles_enabled = match resources.create_program(PARTICLE_PROGRAM_ID, &particle) {
            Ok(_) => {
                resources.retain_resource(PARTICLE_PROGRAM_ID);
                true
            }
            Err(err) => {
                log::error!("[OrganismRenderer::new] Particles disabled: {}", err);
                false
            }
        };

        let gpu_mutation = GpuMutationProcessor::new(&mut resources, &config.mutation);
        if let Some(reason) = gpu_mutation.disabled_reason() {
            log::warn!("[OrganismRenderer::new] Mutation runs on the CPU: {}", reason);
        }

        let mut culler = FrustumCuller::new(&config.culling, config.max_visible_objects());
        culler.update_camera(Camera::default());

        log::info!(
            "[OrganismRenderer::new] {:?} quality: {} particles, {} visible objects, {} px textures",
            config.quality,
            config.max_particles(),
            config.max_visible_objects(),
            config.texture_size()
        );

        Ok(Self {
            batcher: DrawBatcher::new(&config.batcher),
            culler,
            particles: ParticleSystem::new(config.max_particles(), &config.particles),
            textures: ProceduralTextureGenerator::new(&config.texture),
            gpu_mutation,
            cpu_mutation: CpuMutationProcessor::new(&config.mutation),
            resources,
            config,
            organisms: Vec::new(),
            organism_slots: FxHashMap::default(),
            population: None,
            particles_enabled,
            frame: 0,
            mutation_ticks: 0,
            cpu_mutation_ticks: 0,
            textures_skipped: 0,
            disposed: false,
        })
    }

    /// Register an organism for the next frame. A later request for the same
    /// id replaces the earlier one.
    pub fn submit_render_request(&mut self, request: RenderRequest, now: f64) -> bool {
        if self.disposed {
            return false;
        }
        if request.organism_id.is_empty() || !request.position.is_finite() || !request.energy.is_finite() {
            log::warn!(
                "[OrganismRenderer::submit_render_request] Rejected request for '{}'",
                request.organism_id
            );
            return false;
        }
        self.resources.set_clock(now);

        let options = TextureOptions {
            dna: request.dna.clone(),
            size: self.config.texture_size(),
            traits: OrganismTraits::from_slice(&request.traits),
            generation: request.generation,
            pattern: self.textures.default_pattern(),
            octaves: self.config.noise_octaves(),
        };
        let texture = self.textures.generate_organism_texture(&options, &mut self.resources);
        if texture.is_none() {
            self.textures_skipped += 1;
            log::debug!(
                "[OrganismRenderer::submit_render_request] Drawing '{}' untextured",
                request.organism_id
            );
        }

        let energy = request.energy.clamp(0.0, 1.0);
        let bounds = BoundingVolume::Sphere {
            center: Vec3::new(request.position.x, request.position.y, 0.0),
            radius: organism_radius(energy),
        };
        let object = CullableObject::new(request.organism_id.clone(), bounds, (energy * 100.0) as i32);

        let organism = RegisteredOrganism {
            request,
            texture,
            object,
        };
        match self.organism_slots.get(&organism.request.organism_id) {
            Some(&slot) => self.organisms[slot] = organism,
            None => {
                self.organism_slots
                    .insert(organism.request.organism_id.clone(), self.organisms.len());
                self.organisms.push(organism);
            }
        }
        true
    }

    /// Particle burst by event type, plus a mutation tick when configured
    pub fn handle_mutation_event(&mut self, event: MutationEvent, now: f64) -> bool {
        if self.disposed {
            return false;
        }
        let finite = event.magnitude.is_finite()
            && event.traits.iter().all(|value| value.is_finite())
            && event.position.map_or(true, |p| p.is_finite());
        if !finite {
            log::warn!(
                "[OrganismRenderer::handle_mutation_event] Rejected {:?} event with non-finite values",
                event.kind
            );
            return false;
        }
        self.resources.set_clock(now);
        let intensity = event.magnitude.clamp(0.0, 1.0);
        let origin = event.position.unwrap_or_else(|| self.culler.camera().center());

        let emitted = match event.kind {
            MutationEventKind::Mutation => self.particles.emit_mutation_burst(origin.x, origin.y, intensity),
            MutationEventKind::Consciousness => {
                self.particles.emit_consciousness_pulse(origin.x, origin.y, intensity)
            }
            MutationEventKind::Trait if event.traits.is_empty() => {
                self.particles.emit_trait_particles(origin.x, origin.y, &[intensity])
            }
            MutationEventKind::Trait => self.particles.emit_trait_particles(origin.x, origin.y, &event.traits),
            MutationEventKind::Energy => {
                usize::from(self.particles.emit_particle(origin.x, origin.y, intensity, ParticleKind::Energy))
            }
        };
        log::trace!(
            "[OrganismRenderer::handle_mutation_event] {:?} emitted {} particle(s)",
            event.kind,
            emitted
        );

        if self.config.mutation.tick_on_event && self.population.is_some() {
            self.run_mutation_tick(self.frame_delta());
        }
        true
    }

    /// Load the population the mutation pass advances
    pub fn set_population(&mut self, data: MutationData) -> bool {
        match check_population(&data, self.config.mutation.max_organisms) {
            Ok(count) => {
                log::debug!("[OrganismRenderer::set_population] {} organism(s)", count);
                self.population = Some(data);
                true
            }
            Err(err) => {
                log::warn!("[OrganismRenderer::set_population] {}", err);
                false
            }
        }
    }

    pub fn population(&self) -> Option<&MutationData> {
        self.population.as_ref()
    }

    /// Degenerate cameras keep the previous view
    pub fn update_camera(&mut self, camera: Camera) -> bool {
        self.culler.update_camera(camera)
    }

    pub fn camera(&self) -> &Camera {
        self.culler.camera()
    }

    fn frame_delta(&self) -> f32 {
        1.0 / self.config.target_fps().max(1.0)
    }

    /// Advance the population one tick, on the CPU when the GPU path is
    /// unavailable or its tick failed
    pub fn run_mutation_tick(&mut self, delta_time: f32) -> bool {
        let Some(population) = self.population.as_ref() else {
            return false;
        };

        let mut next = None;
        if self.gpu_mutation.is_available() {
            next = self
                .gpu_mutation
                .process_mutations(&mut self.resources, population, delta_time);
        }
        if next.is_none() {
            next = self
                .cpu_mutation
                .process_mutations(&mut self.resources, population, delta_time);
            if next.is_some() {
                self.cpu_mutation_ticks += 1;
            }
        }

        match next {
            Some(next) => {
                self.population = Some(next);
                self.mutation_ticks += 1;
                true
            }
            None => false,
        }
    }

    pub fn render_frame(&mut self, input: FrameInput) -> FrameStats {
        if self.disposed {
            return FrameStats {
                frame: self.frame,
                ..FrameStats::default()
            };
        }
        self.frame += 1;
        self.resources.set_clock(input.now_ms);
        self.resources.context().begin_frame();

        let mut objects: Vec<CullableObject> = self.organisms.iter().map(|o| o.object.clone()).collect();
        let submitted = objects.len();
        let visible = self.culler.adaptive_cull(
            &mut objects,
            input.current_fps,
            self.config.target_fps(),
            input.now_ms,
        );

        let camera = *self.culler.camera();
        for object in &visible {
            let Some(&slot) = self.organism_slots.get(&object.id) else {
                continue;
            };
            let draw = self.organism_draw(&self.organisms[slot], &camera);
            self.batcher.add_draw_call(draw, input.now_ms);
        }
        self.organisms.clear();
        self.organism_slots.clear();

        if self.particles_enabled {
            let center = camera.center();
            self.particles
                .update(input.delta_time, input.global_energy, center.x, center.y);
            let time = (input.now_ms / 1000.0) as f32;
            if let Some(mut draw) = self
                .particles
                .render(time, input.global_energy, input.mutation_level)
            {
                draw.uniforms.set("u_view", UniformValue::Vec4(camera.view_uniform()));
                draw.uniforms
                    .set("u_viewport", UniformValue::Vec2(camera.viewport_uniform()));
                self.batcher.add_draw_call(draw, input.now_ms);
            }
        }

        // Draws never outlive the frame that queued them
        let batches_before = self.batcher.metrics().batches;
        let mut flushed = self.batcher.tick(input.now_ms, &mut self.resources);
        if self.batcher.pending_len() > 0 {
            self.batcher.flush(&mut self.resources);
            flushed = true;
        }
        let batches = self.batcher.metrics().batches - batches_before;

        let interval = self.config.mutation.interval_frames;
        let mutation_ran = interval > 0
            && self.frame % interval == 0
            && self.population.is_some()
            && self.run_mutation_tick(input.delta_time.max(0.0));

        self.degrade_under_pressure();

        FrameStats {
            frame: self.frame,
            submitted,
            visible: visible.len(),
            culled: submitted - visible.len(),
            visible_budget: self.culler.max_visible_objects(),
            flushed,
            batches,
            live_particles: self.particles.live_count(),
            particle_budget: self.particles.budget(),
            memory_usage_mb: self.resources.memory_usage_mb(),
            textures_skipped: self.textures_skipped,
            mutation_ran,
        }
    }

    fn organism_draw(&self, organism: &RegisteredOrganism, camera: &Camera) -> DrawCallRequest {
        let energy = organism.request.energy.clamp(0.0, 1.0);
        let (vertices, indices) = organism_quad(organism.request.position, organism_radius(energy), energy);
        let texture = organism
            .texture
            .as_ref()
            .map_or(UNTEXTURED, |texture| texture.id.as_str());
        let uniforms = UniformSet::new()
            .with("u_texture", UniformValue::Texture(texture.to_string()))
            .with("u_view", UniformValue::Vec4(camera.view_uniform()))
            .with("u_viewport", UniformValue::Vec2(camera.viewport_uniform()));
        DrawCallRequest::new(ORGANISM_PROGRAM_ID, PrimitiveKind::Triangles, vertices, VERTEX_STRIDE)
            .with_indices(indices)
            .with_uniforms(uniforms)
    }

    /// Halve the particle budget while memory is over the GC threshold and
    /// regrow it once usage is back under
    fn degrade_under_pressure(&mut self) {
        let full = self.particles.capacity();
        let floor = (full / MIN_PARTICLE_SHARE).max(1).min(full);
        let budget = self.particles.budget();

        if self.resources.is_over_threshold() {
            self.resources.garbage_collect();
            if self.resources.is_over_threshold() && budget > floor {
                let next = (budget / 2).max(floor);
                log::info!(
                    "[OrganismRenderer::degrade_under_pressure] {:.1} MB in use, particle budget {} -> {}",
                    self.resources.memory_usage_mb(),
                    budget,
                    next
                );
                self.particles.set_budget(next);
            }
        } else if budget < full {
            let step = (full / 10).max(1);
            self.particles.set_budget((budget + step).min(full));
        }
    }

    /// Submit everything the batcher is holding
    pub fn flush(&mut self) -> usize {
        if self.disposed {
            return 0;
        }
        self.batcher.flush(&mut self.resources)
    }

    pub fn stats(&self) -> RendererStats {
        RendererStats {
            frames: self.frame,
            resources: self.resources.stats(),
            batcher: self.batcher.metrics().clone(),
            culling: self.culler.stats().clone(),
            particles: self.particles.stats(),
            textures: self.textures.stats(),
            mutation_ticks: self.mutation_ticks,
            cpu_mutation_ticks: self.cpu_mutation_ticks,
            gpu_mutation_available: self.gpu_mutation.is_available(),
            particles_enabled: self.particles_enabled,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    /// Direct registry access for hosts that manage their own objects
    pub fn resources_mut(&mut self) -> &mut ResourceManager {
        &mut self.resources
    }

    pub fn particles(&self) -> &ParticleSystem {
        &self.particles
    }

    pub fn pending_organisms(&self) -> usize {
        self.organisms.len()
    }

    pub fn is_gpu_mutation_available(&self) -> bool {
        self.gpu_mutation.is_available()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Release every component's objects and destroy the registry
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        log::info!("[OrganismRenderer::dispose] Releasing after {} frame(s)", self.frame);
        self.batcher.dispose(&mut self.resources);
        self.textures.clear_cache(&mut self.resources);
        self.gpu_mutation.dispose(&mut self.resources);
        self.cpu_mutation.dispose(&mut self.resources);
        self.particles.clear();
        self.organisms.clear();
        self.organism_slots.clear();

        self.resources.release_now(ORGANISM_PROGRAM_ID);
        if self.particles_enabled {
            self.resources.release_now(PARTICLE_PROGRAM_ID);
        }
        self.resources.destroy();
        self.disposed = true;
    }
}

impl Drop for OrganismRenderer {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{QualityTier, TexturePattern};
    use crate::gpu::HeadlessBackend;

    fn config() -> RenderConfig {
        let mut config = RenderConfig::for_quality(QualityTier::Low);
        config.texture_size = Some(16);
        config.memory_ceiling_mb = Some(64);
        config.mutation.max_organisms = 64;
        config.texture.pattern = TexturePattern::Organic;
        config
    }

    fn renderer() -> OrganismRenderer {
        OrganismRenderer::new(Box::new(HeadlessBackend::new()), config()).unwrap()
    }

    fn request(id: &str, x: f32, y: f32) -> RenderRequest {
        RenderRequest {
            organism_id: id.to_string(),
            position: Vec2::new(x, y),
            traits: vec![0.4, 0.6, 0.2, 0.8],
            energy: 0.7,
            generation: 1,
            dna: format!("ATCG{}", id),
        }
    }

    fn headless(renderer: &OrganismRenderer) -> &HeadlessBackend {
        renderer.resources().backend_as::<HeadlessBackend>().unwrap()
    }

    #[test]
    fn test_organism_quad_layout() {
        let (vertices, indices) = organism_quad(Vec2::new(10.0, 20.0), 2.0, 0.5);
        assert_eq!(vertices.len(), 4 * VERTEX_STRIDE as usize);
        assert_eq!(&vertices[..5], &[8.0, 18.0, 0.0, 1.0, 0.5]);
        assert_eq!(indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_organism_program_failure_is_fatal() {
        let mut backend = HeadlessBackend::new();
        backend.fail_program("organism");
        let result = OrganismRenderer::new(Box::new(backend), config());
        assert!(matches!(
            result,
            Err(crate::error::RenderError::InitializationFailure { .. })
        ));
    }

    #[test]
    fn test_particle_program_failure_only_disables_particles() {
        let mut backend = HeadlessBackend::new();
        backend.fail_program("particles");
        let mut renderer = OrganismRenderer::new(Box::new(backend), config()).unwrap();
        assert!(!renderer.stats().particles_enabled);
        renderer.submit_render_request(request("a", 0.0, 0.0), 0.0);
        let stats = renderer.render_frame(FrameInput::at(0.0, 30.0));
        assert_eq!(stats.visible, 1);
        assert_eq!(stats.batches, 1);
        assert_eq!(renderer.flush(), 0);
    }

    #[test]
    fn test_visible_organisms_are_drawn() {
        let mut renderer = renderer();
        renderer.submit_render_request(request("a", 0.0, 0.0), 0.0);
        renderer.submit_render_request(request("b", 50.0, 0.0), 0.0);
        renderer.submit_render_request(request("far", 50_000.0, 0.0), 0.0);

        let stats = renderer.render_frame(FrameInput::at(0.0, 30.0));
        assert_eq!(stats.submitted, 3);
        assert_eq!(stats.visible, 2);
        assert_eq!(stats.culled, 1);
        assert_eq!(renderer.pending_organisms(), 0);

        // Different textures keep the quads in separate batches
        assert!(stats.flushed);
        assert_eq!(stats.batches, 2);
        let draws = headless(&renderer).frame_draws();
        assert_eq!(draws.len(), 2);
        assert!(draws.iter().all(|d| d.texture.is_some() && d.index_count == 6));
    }

    #[test]
    fn test_each_frame_draws_only_its_own_quads() {
        let mut renderer = renderer();
        for frame in 0..4 {
            let now = frame as f64 * 33.0;
            let x = frame as f32 * 10.0;
            renderer.submit_render_request(request("a", x, 0.0), now);
            let stats = renderer.render_frame(FrameInput::at(now, 30.0));
            assert!(stats.flushed);
            assert_eq!(stats.batches, 1);

            let backend = headless(&renderer);
            let draws = backend.frame_draws();
            assert_eq!(draws.len(), 1);
            assert_eq!(draws[0].vertex_count, 4);
            let bytes = backend.buffer_contents(draws[0].vertex_buffer).unwrap();
            let first_x = f32::from_ne_bytes(bytes[0..4].try_into().unwrap());
            assert!((first_x - (x - organism_radius(0.7))).abs() < 1e-4);
        }
        assert_eq!(renderer.stats().batcher.draw_calls, 4);
    }

    #[test]
    fn test_non_finite_event_is_rejected() {
        let mut renderer = renderer();
        let nan_trait = MutationEvent {
            kind: MutationEventKind::Trait,
            magnitude: 0.5,
            timestamp: 0.0,
            position: None,
            traits: vec![f32::NAN],
        };
        assert!(!renderer.handle_mutation_event(nan_trait, 0.0));
        let nan_position = MutationEvent {
            kind: MutationEventKind::Mutation,
            magnitude: 0.5,
            timestamp: 0.0,
            position: Some(Vec2::new(f32::NAN, 0.0)),
            traits: Vec::new(),
        };
        assert!(!renderer.handle_mutation_event(nan_position, 0.0));
        assert_eq!(renderer.particles().live_count(), 0);
    }

    #[test]
    fn test_repeated_request_replaces_previous() {
        let mut renderer = renderer();
        renderer.submit_render_request(request("a", 0.0, 0.0), 0.0);
        renderer.submit_render_request(request("a", 5.0, 0.0), 0.0);
        assert_eq!(renderer.pending_organisms(), 1);
    }

    #[test]
    fn test_invalid_request_is_rejected() {
        let mut renderer = renderer();
        assert!(!renderer.submit_render_request(request("", 0.0, 0.0), 0.0));
        assert!(!renderer.submit_render_request(request("a", f32::NAN, 0.0), 0.0));
        assert_eq!(renderer.pending_organisms(), 0);
    }

    #[test]
    fn test_mutation_event_emits_burst() {
        let mut renderer = renderer();
        let event = MutationEvent {
            kind: MutationEventKind::Mutation,
            magnitude: 1.0,
            timestamp: 0.0,
            position: Some(Vec2::new(10.0, 10.0)),
            traits: Vec::new(),
        };
        assert!(renderer.handle_mutation_event(event, 0.0));
        assert_eq!(renderer.particles().live_count(), 24);
    }

    #[test]
    fn test_mutation_event_deserializes_type_field() {
        let event: MutationEvent =
            serde_json::from_str(r#"{"type":"consciousness","magnitude":0.5,"timestamp":12.0}"#).unwrap();
        assert_eq!(event.kind, MutationEventKind::Consciousness);
        assert_eq!(event.position, None);
    }

    #[test]
    fn test_interval_runs_mutation_tick() {
        let mut config = config();
        config.mutation.interval_frames = 2;
        let mut renderer = OrganismRenderer::new(Box::new(HeadlessBackend::new()), config).unwrap();
        let mut data = MutationData::with_capacity(4);
        data.push([0.0, 0.0], [1.0, 0.0], [0.5; 4], 7, 1.0, 0.0);
        assert!(renderer.set_population(data));

        assert!(!renderer.render_frame(FrameInput::at(0.0, 30.0)).mutation_ran);
        assert!(renderer.render_frame(FrameInput::at(33.0, 30.0)).mutation_ran);
        assert_eq!(renderer.stats().mutation_ticks, 1);
        assert!(renderer.population().unwrap().positions[0][0] > 0.0);
    }

    #[test]
    fn test_disabled_gpu_mutation_falls_back_to_cpu() {
        let mut backend = HeadlessBackend::new();
        backend.fail_program("mutation");
        let mut renderer = OrganismRenderer::new(Box::new(backend), config()).unwrap();
        assert!(!renderer.is_gpu_mutation_available());

        let mut data = MutationData::with_capacity(2);
        data.push([0.0, 0.0], [0.0, 1.0], [0.5; 4], 3, 1.0, 0.0);
        renderer.set_population(data);
        assert!(renderer.run_mutation_tick(0.1));
        assert_eq!(renderer.stats().cpu_mutation_ticks, 1);
    }

    #[test]
    fn test_oversized_population_is_rejected() {
        let mut renderer = renderer();
        assert!(!renderer.set_population(MutationData::zeroed(65)));
        assert!(renderer.population().is_none());
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut renderer = renderer();
        renderer.submit_render_request(request("a", 0.0, 0.0), 0.0);
        renderer.render_frame(FrameInput::at(0.0, 30.0));
        renderer.dispose();
        renderer.dispose();
        assert!(renderer.is_disposed());
        assert_eq!(headless(&renderer).live_objects(), 0);
        assert!(!renderer.submit_render_request(request("b", 0.0, 0.0), 1.0));
        assert_eq!(renderer.render_frame(FrameInput::at(1.0, 30.0)).frame, 1);
    }
}
