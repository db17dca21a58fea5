//! Procedural organism textures: seeded noise, pattern fields and the
//! cached generator that uploads them

pub mod generator;
pub mod noise;
pub mod patterns;

pub use generator::{
    synthesize_dna_pixels, synthesize_pixels, OrganismTraits, ProceduralTextureGenerator, TextureCacheKey,
    TextureCacheStats, TextureHandle, TextureOptions,
};
pub use self::noise::{LatticeNoise, PermutationTable};
