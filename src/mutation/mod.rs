//! Organism mutation pass
//!
//! Population state lives in six parallel arrays. Each tick integrates
//! motion, decays energy, drifts traits and mutates dna on a non-rasterizing
//! GPU pass, with a CPU processor behind the same trait as fallback.

pub mod buffers;
pub mod cpu_fallback;
pub mod data;
pub mod kernel;
pub mod processor;

pub use buffers::{MutationBufferPair, MutationBufferSet};
pub use cpu_fallback::CpuMutationProcessor;
pub use data::{MutationData, MutationUniforms};
pub use processor::{GpuMutationProcessor, MutationProcessor, MUTATION_PROGRAM_ID};
