//! Pooled particle effects for mutation, consciousness and trait events

pub mod particle;
pub mod particle_system;

pub use particle::{EmitParams, Particle, ParticleKind};
pub use particle_system::{ParticleStats, ParticleSystem, PARTICLE_PROGRAM_ID};
