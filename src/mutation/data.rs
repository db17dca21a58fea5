use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

/// Number of parallel arrays per organism population
pub const ARRAY_COUNT: usize = 6;

/// Bytes per element of each array, in buffer-binding order
pub const ELEMENT_SIZES: [usize; ARRAY_COUNT] = [8, 8, 16, 4, 4, 4];

pub const ARRAY_NAMES: [&str; ARRAY_COUNT] = [
    "positions",
    "velocities",
    "traits",
    "dna",
    "energy",
    "generation",
];

/// Structure-of-arrays organism population
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationData {
    pub positions: Vec<[f32; 2]>,
    pub velocities: Vec<[f32; 2]>,
    pub traits: Vec<[f32; 4]>,
    pub dna: Vec<u32>,
    pub energy: Vec<f32>,
    pub generation: Vec<f32>,
}

impl MutationData {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            velocities: Vec::with_capacity(capacity),
            traits: Vec::with_capacity(capacity),
            dna: Vec::with_capacity(capacity),
            energy: Vec::with_capacity(capacity),
            generation: Vec::with_capacity(capacity),
        }
    }

    /// Zero-filled population of `len` organisms
    pub fn zeroed(len: usize) -> Self {
        Self {
            positions: vec![[0.0; 2]; len],
            velocities: vec![[0.0; 2]; len],
            traits: vec![[0.0; 4]; len],
            dna: vec![0; len],
            energy: vec![0.0; len],
            generation: vec![0.0; len],
        }
    }

    pub fn push(
        &mut self,
        position: [f32; 2],
        velocity: [f32; 2],
        traits: [f32; 4],
        dna: u32,
        energy: f32,
        generation: f32,
    ) {
        self.positions.push(position);
        self.velocities.push(velocity);
        self.traits.push(traits);
        self.dna.push(dna);
        self.energy.push(energy);
        self.generation.push(generation);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Organism count, or an error when the arrays disagree in length
    pub fn validate(&self) -> RenderResult<usize> {
        let len = self.positions.len();
        let lengths = [
            self.velocities.len(),
            self.traits.len(),
            self.dna.len(),
            self.energy.len(),
            self.generation.len(),
        ];
        if lengths.iter().any(|&l| l != len) {
            return Err(RenderError::invalid(format!(
                "mutation arrays have mismatched lengths: positions {}, others {:?}",
                len, lengths
            )));
        }
        Ok(len)
    }

    /// Raw bytes of one array, in binding order
    pub fn array_bytes(&self, index: usize) -> &[u8] {
        match index {
            0 => bytemuck::cast_slice(&self.positions),
            1 => bytemuck::cast_slice(&self.velocities),
            2 => bytemuck::cast_slice(&self.traits),
            3 => bytemuck::cast_slice(&self.dna),
            4 => bytemuck::cast_slice(&self.energy),
            5 => bytemuck::cast_slice(&self.generation),
            _ => &[],
        }
    }

    /// Whether array `index` holds the same values in both populations
    pub fn array_matches(&self, other: &MutationData, index: usize) -> bool {
        self.array_bytes(index) == other.array_bytes(index)
    }

    /// Rebuild from packed buffers, keeping the first `len` elements of each.
    /// `None` if any buffer is too short.
    pub fn from_packed(arrays: &[Vec<u8>], len: usize) -> Option<Self> {
        if arrays.len() != ARRAY_COUNT {
            return None;
        }
        for (bytes, size) in arrays.iter().zip(ELEMENT_SIZES) {
            if bytes.len() < len * size {
                return None;
            }
        }
        Some(Self {
            positions: read_elements(&arrays[0], len),
            velocities: read_elements(&arrays[1], len),
            traits: read_elements(&arrays[2], len),
            dna: read_elements(&arrays[3], len),
            energy: read_elements(&arrays[4], len),
            generation: read_elements(&arrays[5], len),
        })
    }

    pub fn to_packed(&self) -> Vec<Vec<u8>> {
        (0..ARRAY_COUNT).map(|i| self.array_bytes(i).to_vec()).collect()
    }
}

// Buffers read back from the device carry no alignment guarantee
fn read_elements<T: Pod>(bytes: &[u8], len: usize) -> Vec<T> {
    bytes
        .chunks_exact(std::mem::size_of::<T>())
        .take(len)
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

/// Parameter block shared with `shaders/mutation.wgsl`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MutationUniforms {
    pub delta_time: f32,
    pub mutation_rate: f32,
    pub energy_decay: f32,
    pub world_bounds: f32,
    pub tick: u32,
    /// Live organisms; slots past this pass through untouched
    pub count: u32,
    pub _padding: [u32; 2],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_block_layout() {
        assert_eq!(std::mem::size_of::<MutationUniforms>(), 32);
    }

    #[test]
    fn test_validate_rejects_mismatched_lengths() {
        let mut data = MutationData::zeroed(3);
        assert_eq!(data.validate().unwrap(), 3);
        data.energy.pop();
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_from_packed_truncates_to_len() {
        let mut data = MutationData::default();
        data.push([1.0, 2.0], [0.5, 0.5], [0.1, 0.2, 0.3, 0.4], 7, 0.9, 2.0);
        data.push([3.0, 4.0], [0.0, 0.0], [0.0; 4], 9, 0.1, 0.0);
        let packed = data.to_packed();

        let first = MutationData::from_packed(&packed, 1).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first.dna, vec![7]);
        assert_eq!(first.traits, vec![[0.1, 0.2, 0.3, 0.4]]);

        assert!(MutationData::from_packed(&packed, 3).is_none());
    }
}
