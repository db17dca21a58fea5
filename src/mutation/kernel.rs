//! CPU reference of the mutation pass
//!
//! `shaders/mutation.wgsl` implements the same per-slot step. The headless
//! backend and `CpuMutationProcessor` both run this code, so their outputs
//! are identical.

use super::data::{MutationData, MutationUniforms};
use crate::constants::mutation::RESET_ENERGY;
use crate::constants::texture::GOLDEN_GAMMA;
use crate::hash::mix32;

/// Wrap `value` into `[-bounds, bounds)`
#[inline]
pub fn wrap(value: f32, bounds: f32) -> f32 {
    if bounds <= 0.0 {
        return value;
    }
    let span = bounds * 2.0;
    let mut shifted = (value + bounds) % span;
    if shifted < 0.0 {
        shifted += span;
    }
    shifted - bounds
}

/// Per-organism hash for tick `tick`
#[inline]
pub fn slot_hash(dna: u32, slot: u32, tick: u32) -> u32 {
    mix32(dna ^ slot.wrapping_mul(GOLDEN_GAMMA) ^ tick)
}

/// Deterministic perturbation in [-1, 1] for trait `k`
#[inline]
pub fn trait_noise(hash: u32, k: u32) -> f32 {
    let bits = mix32(hash.wrapping_add(k)) & 0xffff;
    (bits as f32 / 65535.0) * 2.0 - 1.0
}

/// Advance the first `params.count` organisms in place
pub fn step(data: &mut MutationData, params: &MutationUniforms) {
    let count = (params.count as usize).min(data.len());
    let dt = params.delta_time;

    for i in 0..count {
        let position = &mut data.positions[i];
        let velocity = data.velocities[i];
        position[0] = wrap(position[0] + velocity[0] * dt, params.world_bounds);
        position[1] = wrap(position[1] + velocity[1] * dt, params.world_bounds);

        data.energy[i] -= params.energy_decay * dt;

        let hash = slot_hash(data.dna[i], i as u32, params.tick);
        for (k, value) in data.traits[i].iter_mut().enumerate() {
            let drift = trait_noise(hash, k as u32) * params.mutation_rate * dt;
            *value = (*value + drift).clamp(0.0, 1.0);
        }

        if data.energy[i] <= 0.0 {
            if params.mutation_rate > 0.0 {
                data.dna[i] ^= 1 << (hash % 32);
                data.generation[i] += 1.0;
                data.energy[i] = RESET_ENERGY;
            } else {
                data.energy[i] = 0.0;
            }
        }
    }
}

/// Run the pass over packed device buffers: six inputs in, six outputs out.
/// `None` when the buffers or parameter block are malformed.
pub fn run_packed(inputs: &[Vec<u8>], uniforms: &[u8], invocations: u32) -> Option<Vec<Vec<u8>>> {
    if uniforms.len() < std::mem::size_of::<MutationUniforms>() {
        return None;
    }
    let params: MutationUniforms =
        bytemuck::pod_read_unaligned(&uniforms[..std::mem::size_of::<MutationUniforms>()]);
    if params.count > invocations {
        return None;
    }

    let mut data = MutationData::from_packed(inputs, invocations as usize)?;
    step(&mut data, &params);
    Some(data.to_packed())
}
