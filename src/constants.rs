// Organism Render Constants
//
// Shared tuning values used by the CPU paths and mirrored in the WGSL
// programs. Keep the mutation values in sync with shaders/mutation.wgsl.

/// Resource budget constants
pub mod memory {
    pub const BYTES_PER_MB: u64 = 1024 * 1024;

    /// Eviction starts once usage crosses this share of the ceiling
    pub const DEFAULT_GC_THRESHOLD: f32 = 0.8;

    /// Used when neither the config nor the backend supplies a ceiling
    pub const FALLBACK_MEMORY_CEILING_MB: u32 = 256;
}

/// Draw-call batching constants
pub mod batching {
    pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;
    pub const DEFAULT_MAX_WAIT_TIME_MS: f64 = 16.0;

    /// Uniform block limit per draw (one vec4 slot per uniform)
    pub const MAX_UNIFORM_SLOTS: usize = 16;
}

/// Culling constants
pub mod culling {
    pub const DEFAULT_DEPTH_RANGE: f32 = 1000.0;
    pub const DEFAULT_MIN_VISIBLE_OBJECTS: usize = 16;

    /// FPS ratio band inside which the adaptive budget holds still
    pub const ADAPTIVE_TOLERANCE: f32 = 0.1;

    /// Growth step applied when FPS is comfortably above target
    pub const ADAPTIVE_GROWTH: f32 = 0.1;
}

/// Particle constants
pub mod particles {
    pub const MUTATION_BURST_COUNT: usize = 24;
    pub const CONSCIOUSNESS_PULSE_COUNT: usize = 16;
    pub const TRAIT_PARTICLES_PER_TRAIT: usize = 4;

    /// Center-ward acceleration per unit of global energy
    pub const CENTER_PULL: f32 = 0.6;

    /// Fraction of velocity lost per second
    pub const DRAG: f32 = 0.9;

    /// Floats per particle vertex: position(2) size(1) color(4)
    pub const VERTEX_STRIDE: u32 = 7;
}

/// Procedural texture constants
pub mod texture {
    pub const DEFAULT_TEXTURE_SIZE: u32 = 128;
    pub const DEFAULT_MAX_CACHED_TEXTURES: usize = 256;
    pub const PERMUTATION_SIZE: usize = 256;
    pub const REACTION_DIFFUSION_ITERATIONS: usize = 24;

    /// Golden-ratio increment used by the 32-bit mixers
    pub const GOLDEN_GAMMA: u32 = 0x9E37_79B9;
}

/// Mutation pass constants
pub mod mutation {
    pub const DEFAULT_MAX_ORGANISMS: usize = 4096;
    pub const WORKGROUP_SIZE: u32 = 64;
    pub const DEFAULT_MUTATION_RATE: f32 = 0.05;
    pub const DEFAULT_ENERGY_DECAY: f32 = 0.02;
    pub const DEFAULT_WORLD_BOUNDS: f32 = 512.0;

    /// Energy an organism restarts with after a dna mutation
    pub const RESET_ENERGY: f32 = 1.0;
}

/// Organism quad layout
pub mod organism {
    /// Floats per organism vertex: position(2) uv(2) energy(1)
    pub const VERTEX_STRIDE: u32 = 5;

    /// World-space radius of an organism at zero energy
    pub const BASE_RADIUS: f32 = 8.0;
}
