use glam::{Vec2, Vec4};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticleKind {
    Energy,
    Mutation,
    Consciousness,
    Trait,
}

impl ParticleKind {
    pub fn base_color(self) -> Vec4 {
        match self {
            ParticleKind::Energy => Vec4::new(1.0, 0.85, 0.3, 1.0),
            ParticleKind::Mutation => Vec4::new(0.9, 0.2, 0.8, 1.0),
            ParticleKind::Consciousness => Vec4::new(0.3, 0.8, 1.0, 1.0),
            ParticleKind::Trait => Vec4::new(0.4, 1.0, 0.5, 1.0),
        }
    }
}

/// Pool slot; dormant slots keep their last values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Vec2,
    pub velocity: Vec2,
    pub color: Vec4,
    pub size: f32,
    /// Seconds since emission
    pub age: f32,
    pub max_age: f32,
    pub kind: ParticleKind,
    pub alive: bool,
}

impl Particle {
    pub fn dormant() -> Self {
        Self {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            color: Vec4::ZERO,
            size: 0.0,
            age: 0.0,
            max_age: 0.0,
            kind: ParticleKind::Energy,
            alive: false,
        }
    }

    /// 0 at emission, 1 at expiry
    pub fn life_fraction(&self) -> f32 {
        if self.max_age <= 0.0 {
            return 1.0;
        }
        (self.age / self.max_age).clamp(0.0, 1.0)
    }
}

/// Everything needed to wake a pool slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmitParams {
    pub position: Vec2,
    pub velocity: Vec2,
    pub color: Vec4,
    pub size: f32,
    pub max_age: f32,
    pub kind: ParticleKind,
}

/// Clamp to [0, 1]; non-finite input counts as 0
fn unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn ring_direction(index: usize, count: usize) -> Vec2 {
    let angle = index as f32 / count.max(1) as f32 * std::f32::consts::TAU;
    Vec2::from_angle(angle)
}

/// Particle `index` of a mutation burst of `count`
pub fn mutation_burst(origin: Vec2, intensity: f32, index: usize, count: usize) -> EmitParams {
    let intensity = unit(intensity);
    let speed = 40.0 * (0.5 + intensity) * (1.0 + (index % 3) as f32 * 0.25);
    EmitParams {
        position: origin,
        velocity: ring_direction(index, count) * speed,
        color: ParticleKind::Mutation.base_color(),
        size: 2.0 + intensity * 3.0,
        max_age: 0.8 + intensity * 0.6,
        kind: ParticleKind::Mutation,
    }
}

/// Particle `index` of an expanding consciousness ring of `count`
pub fn consciousness_pulse(origin: Vec2, intensity: f32, index: usize, count: usize) -> EmitParams {
    let intensity = unit(intensity);
    EmitParams {
        position: origin,
        velocity: ring_direction(index, count) * 25.0 * (0.5 + intensity),
        color: ParticleKind::Consciousness.base_color(),
        size: 3.0 + intensity * 2.0,
        max_age: 1.2 + intensity * 0.8,
        kind: ParticleKind::Consciousness,
    }
}

/// Particle `index` of `count` for trait number `trait_index` with value `value`
pub fn trait_particle(origin: Vec2, trait_index: usize, value: f32, index: usize, count: usize) -> EmitParams {
    let value = unit(value);
    let tint = match trait_index % 4 {
        0 => Vec4::new(0.4, 1.0, 0.5, 1.0),
        1 => Vec4::new(1.0, 0.6, 0.3, 1.0),
        2 => Vec4::new(0.5, 0.6, 1.0, 1.0),
        _ => Vec4::new(1.0, 1.0, 0.5, 1.0),
    };
    let brightness = 0.5 + 0.5 * value;
    EmitParams {
        position: origin,
        velocity: ring_direction(index, count) * (15.0 + value * 30.0),
        color: Vec4::new(tint.x * brightness, tint.y * brightness, tint.z * brightness, 1.0),
        size: 1.5 + value * 2.5,
        max_age: 1.0 + value,
        kind: ParticleKind::Trait,
    }
}

/// Generic emission with a caller-chosen direction
pub fn energy_particle(origin: Vec2, energy: f32, kind: ParticleKind, direction: Vec2) -> EmitParams {
    let energy = unit(energy);
    EmitParams {
        position: origin,
        velocity: direction * (20.0 + energy * 40.0),
        color: kind.base_color(),
        size: 1.5 + energy * 2.0,
        max_age: 0.6 + energy * 0.9,
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_is_a_pure_function() {
        let a = mutation_burst(Vec2::new(5.0, 5.0), 0.5, 7, 24);
        let b = mutation_burst(Vec2::new(5.0, 5.0), 0.5, 7, 24);
        assert_eq!(a, b);
        assert_eq!(a.size, 3.5);
    }

    #[test]
    fn test_non_finite_values_give_finite_lifetimes() {
        let origin = Vec2::ZERO;
        for value in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert_eq!(trait_particle(origin, 0, value, 0, 4).max_age, 1.0);
            assert!(mutation_burst(origin, value, 0, 4).max_age.is_finite());
            assert!(consciousness_pulse(origin, value, 0, 4).max_age.is_finite());
            let energy = energy_particle(origin, value, ParticleKind::Energy, Vec2::X);
            assert!(energy.max_age.is_finite());
            assert!(energy.velocity.is_finite());
        }
        assert!((a.velocity.length() - 40.0 * 1.0 * 1.25).abs() < 1e-3);
    }

    #[test]
    fn test_ring_directions_are_spread() {
        let first = consciousness_pulse(Vec2::ZERO, 1.0, 0, 4).velocity.normalize();
        let second = consciousness_pulse(Vec2::ZERO, 1.0, 1, 4).velocity.normalize();
        assert!(first.dot(second).abs() < 1e-5);
    }

    #[test]
    fn test_life_fraction() {
        let mut particle = Particle::dormant();
        particle.max_age = 2.0;
        particle.age = 0.5;
        assert_eq!(particle.life_fraction(), 0.25);
    }
}
