use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::particle::{self, EmitParams, Particle, ParticleKind};
use crate::config::ParticleConfig;
use crate::constants::particles::{
    CENTER_PULL, CONSCIOUSNESS_PULSE_COUNT, DRAG, MUTATION_BURST_COUNT, TRAIT_PARTICLES_PER_TRAIT,
    VERTEX_STRIDE,
};
use crate::gpu::PrimitiveKind;
use crate::renderer::draw_call::{DrawCallRequest, DrawPriority, UniformSet, UniformValue};

pub const PARTICLE_PROGRAM_ID: &str = "program/particles";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParticleStats {
    pub live: usize,
    pub capacity: usize,
    pub budget: usize,
    pub emitted: u64,
    /// Emissions refused because the pool or budget was full
    pub dropped: u64,
    pub recycled: u64,
}

/// Fixed-capacity particle pool
///
/// Slots are allocated once at construction and recycled through a free
/// list; the pool never grows.
pub struct ParticleSystem {
    particles: Vec<Particle>,
    free: Vec<usize>,
    live: usize,
    budget: usize,
    rng: StdRng,
    emitted: u64,
    dropped: u64,
    recycled: u64,
}

impl ParticleSystem {
    pub fn new(capacity: usize, config: &ParticleConfig) -> Self {
        log::debug!("[ParticleSystem::new] Pool of {} particles", capacity);
        Self {
            particles: vec![Particle::dormant(); capacity],
            free: (0..capacity).rev().collect(),
            live: 0,
            budget: capacity,
            rng: StdRng::seed_from_u64(config.seed),
            emitted: 0,
            dropped: 0,
            recycled: 0,
        }
    }

    fn emit(&mut self, params: EmitParams) -> bool {
        // A non-finite lifetime never expires and would pin the slot
        if !params.max_age.is_finite() || !params.position.is_finite() {
            self.dropped += 1;
            return false;
        }
        if self.live >= self.budget {
            self.dropped += 1;
            return false;
        }
        let Some(slot) = self.free.pop() else {
            self.dropped += 1;
            return false;
        };
        self.particles[slot] = Particle {
            position: params.position,
            velocity: params.velocity,
            color: params.color,
            size: params.size,
            age: 0.0,
            max_age: params.max_age,
            kind: params.kind,
            alive: true,
        };
        self.live += 1;
        self.emitted += 1;
        true
    }

    /// One particle in a random direction; `false` when the pool is full
    pub fn emit_particle(&mut self, x: f32, y: f32, energy: f32, kind: ParticleKind) -> bool {
        let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        self.emit(particle::energy_particle(Vec2::new(x, y), energy, kind, Vec2::from_angle(angle)))
    }

    pub fn emit_mutation_burst(&mut self, x: f32, y: f32, intensity: f32) -> usize {
        let origin = Vec2::new(x, y);
        (0..MUTATION_BURST_COUNT)
            .filter(|&i| self.emit(particle::mutation_burst(origin, intensity, i, MUTATION_BURST_COUNT)))
            .count()
    }

    pub fn emit_consciousness_pulse(&mut self, x: f32, y: f32, intensity: f32) -> usize {
        let origin = Vec2::new(x, y);
        (0..CONSCIOUSNESS_PULSE_COUNT)
            .filter(|&i| self.emit(particle::consciousness_pulse(origin, intensity, i, CONSCIOUSNESS_PULSE_COUNT)))
            .count()
    }

    pub fn emit_trait_particles(&mut self, x: f32, y: f32, trait_values: &[f32]) -> usize {
        let origin = Vec2::new(x, y);
        let count = trait_values.len() * TRAIT_PARTICLES_PER_TRAIT;
        let mut emitted = 0;
        for (trait_index, &value) in trait_values.iter().enumerate() {
            for j in 0..TRAIT_PARTICLES_PER_TRAIT {
                let index = trait_index * TRAIT_PARTICLES_PER_TRAIT + j;
                if self.emit(particle::trait_particle(origin, trait_index, value, index, count)) {
                    emitted += 1;
                }
            }
        }
        emitted
    }

    /// Advance live particles; expired ones return to the free list
    pub fn update(&mut self, delta_time: f32, global_energy: f32, center_x: f32, center_y: f32) {
        if self.live == 0 || delta_time <= 0.0 {
            return;
        }
        let center = Vec2::new(center_x, center_y);
        let pull = global_energy * CENTER_PULL * delta_time;
        let damping = (1.0 - DRAG * delta_time).max(0.0);

        for (slot, particle) in self.particles.iter_mut().enumerate() {
            if !particle.alive {
                continue;
            }
            particle.velocity += (center - particle.position) * pull;
            particle.velocity *= damping;
            particle.position += particle.velocity * delta_time;
            particle.age += delta_time;

            if particle.age >= particle.max_age {
                particle.alive = false;
                self.free.push(slot);
                self.live -= 1;
                self.recycled += 1;
            } else {
                particle.color.w = 1.0 - particle.life_fraction();
            }
        }
    }

    /// One point draw of every live particle, `None` when nothing is live
    pub fn render(&self, time: f32, global_energy: f32, mutation_level: f32) -> Option<DrawCallRequest> {
        if self.live == 0 {
            return None;
        }
        let mut vertices = Vec::with_capacity(self.live * VERTEX_STRIDE as usize);
        for particle in self.particles.iter().filter(|p| p.alive) {
            vertices.extend_from_slice(&[
                particle.position.x,
                particle.position.y,
                particle.size,
                particle.color.x,
                particle.color.y,
                particle.color.z,
                particle.color.w,
            ]);
        }

        let uniforms = UniformSet::new()
            .with("u_time", UniformValue::Float(time))
            .with("u_energy", UniformValue::Float(global_energy))
            .with("u_mutation", UniformValue::Float(mutation_level));
        Some(
            DrawCallRequest::new(PARTICLE_PROGRAM_ID, PrimitiveKind::Points, vertices, VERTEX_STRIDE)
                .with_uniforms(uniforms)
                .with_priority(DrawPriority::Low),
        )
    }

    /// Limit live particles to `budget` (at most the pool capacity).
    /// Particles above a lowered budget are left to expire.
    pub fn set_budget(&mut self, budget: usize) {
        let budget = budget.min(self.particles.len());
        if budget != self.budget {
            log::debug!("[ParticleSystem::set_budget] {} -> {}", self.budget, budget);
        }
        self.budget = budget;
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn capacity(&self) -> usize {
        self.particles.len()
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn particles(&self) -> impl Iterator<Item = &Particle> {
        self.particles.iter().filter(|p| p.alive)
    }

    pub fn clear(&mut self) {
        for particle in &mut self.particles {
            particle.alive = false;
        }
        self.free.clear();
        self.free.extend((0..self.particles.len()).rev());
        self.live = 0;
    }

    pub fn stats(&self) -> ParticleStats {
        ParticleStats {
            live: self.live,
            capacity: self.particles.len(),
            budget: self.budget,
            emitted: self.emitted,
            dropped: self.dropped,
            recycled: self.recycled,
        }
    }
}
