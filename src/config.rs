//! Renderer configuration
//!
//! Supplied by the host (usually from a TOML file) and never hardcoded in the
//! components. The five top-level knobs default from the quality tier when
//! left unset; the sections carry tuning that does not vary by tier.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{batching, culling, memory, mutation, texture};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Rendering quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    #[default]
    Medium,
    High,
}

/// Values a quality tier implies for knobs the host left unset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityPreset {
    pub max_particles: usize,
    pub max_visible_objects: usize,
    pub target_fps: f32,
    pub texture_size: u32,
    pub noise_octaves: u32,
}

impl QualityTier {
    pub fn preset(self) -> QualityPreset {
        match self {
            QualityTier::Low => QualityPreset {
                max_particles: 500,
                max_visible_objects: 200,
                target_fps: 30.0,
                texture_size: 64,
                noise_octaves: 3,
            },
            QualityTier::Medium => QualityPreset {
                max_particles: 2000,
                max_visible_objects: 500,
                target_fps: 60.0,
                texture_size: texture::DEFAULT_TEXTURE_SIZE,
                noise_octaves: 4,
            },
            QualityTier::High => QualityPreset {
                max_particles: 5000,
                max_visible_objects: 1000,
                target_fps: 60.0,
                texture_size: 256,
                noise_octaves: 6,
            },
        }
    }
}

/// Resource budget settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Share of the memory ceiling at which eviction starts
    pub gc_threshold: f32,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            gc_threshold: memory::DEFAULT_GC_THRESHOLD,
        }
    }
}

/// Draw-call batching settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    pub max_batch_size: usize,
    pub max_wait_time_ms: f64,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: batching::DEFAULT_MAX_BATCH_SIZE,
            max_wait_time_ms: batching::DEFAULT_MAX_WAIT_TIME_MS,
        }
    }
}

/// Visibility culling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CullingConfig {
    /// Floor for the adaptive visible-object budget
    pub min_visible_objects: usize,
    /// Half-depth of the view slab along Z
    pub depth_range: f32,
    /// Ascending distance thresholds separating LOD levels
    pub lod_distances: Vec<f32>,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            min_visible_objects: culling::DEFAULT_MIN_VISIBLE_OBJECTS,
            depth_range: culling::DEFAULT_DEPTH_RANGE,
            lod_distances: vec![200.0, 500.0],
        }
    }
}

/// Particle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    /// Seed for the generic emitter's direction jitter
    pub seed: u64,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self { seed: 0x5EED }
    }
}

/// Visual style of organism textures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TexturePattern {
    #[default]
    Organic,
    Cellular,
    ReactionDiffusion,
}

/// Procedural texture settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureConfig {
    pub pattern: TexturePattern,
    /// Cache bound; the least recently used entry is released past it
    pub max_cached_textures: usize,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            pattern: TexturePattern::Organic,
            max_cached_textures: texture::DEFAULT_MAX_CACHED_TEXTURES,
        }
    }
}

/// Mutation pass settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    pub enabled: bool,
    /// Fixed buffer capacity; size to the expected peak population
    pub max_organisms: usize,
    pub mutation_rate: f32,
    pub energy_decay: f32,
    pub world_bounds: f32,
    /// Run one mutation tick every N frames
    pub interval_frames: u64,
    /// Run one mutation tick for every incoming mutation event
    pub tick_on_event: bool,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_organisms: mutation::DEFAULT_MAX_ORGANISMS,
            mutation_rate: mutation::DEFAULT_MUTATION_RATE,
            energy_decay: mutation::DEFAULT_ENERGY_DECAY,
            world_bounds: mutation::DEFAULT_WORLD_BOUNDS,
            interval_frames: 10,
            tick_on_event: false,
        }
    }
}

/// Top-level renderer configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub quality: QualityTier,
    pub max_particles: Option<usize>,
    pub max_visible_objects: Option<usize>,
    pub target_fps: Option<f32>,
    /// `None` derives the ceiling from backend capabilities
    pub memory_ceiling_mb: Option<u32>,
    pub texture_size: Option<u32>,
    pub noise_octaves: Option<u32>,
    pub resources: ResourceConfig,
    pub batcher: BatcherConfig,
    pub culling: CullingConfig,
    pub particles: ParticleConfig,
    pub texture: TextureConfig,
    pub mutation: MutationConfig,
}

impl RenderConfig {
    pub fn for_quality(quality: QualityTier) -> Self {
        Self {
            quality,
            ..Self::default()
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: RenderConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::info!("[RenderConfig::from_toml_file] Loading {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn max_particles(&self) -> usize {
        self.max_particles
            .unwrap_or_else(|| self.quality.preset().max_particles)
    }

    pub fn max_visible_objects(&self) -> usize {
        self.max_visible_objects
            .unwrap_or_else(|| self.quality.preset().max_visible_objects)
    }

    pub fn target_fps(&self) -> f32 {
        self.target_fps
            .unwrap_or_else(|| self.quality.preset().target_fps)
    }

    pub fn texture_size(&self) -> u32 {
        self.texture_size
            .unwrap_or_else(|| self.quality.preset().texture_size)
    }

    pub fn noise_octaves(&self) -> u32 {
        self.noise_octaves
            .unwrap_or_else(|| self.quality.preset().noise_octaves)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let gc = self.resources.gc_threshold;
        if !(gc > 0.0 && gc <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "resources.gc_threshold",
                reason: format!("{} is outside (0, 1]", gc),
            });
        }
        if self.target_fps() <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "target_fps",
                reason: "must be positive".to_string(),
            });
        }
        if self.memory_ceiling_mb == Some(0) {
            return Err(ConfigError::Invalid {
                field: "memory_ceiling_mb",
                reason: "must be positive".to_string(),
            });
        }
        if self.batcher.max_batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batcher.max_batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.culling.min_visible_objects > self.max_visible_objects() {
            return Err(ConfigError::Invalid {
                field: "culling.min_visible_objects",
                reason: "exceeds max_visible_objects".to_string(),
            });
        }
        if self.culling.lod_distances.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::Invalid {
                field: "culling.lod_distances",
                reason: "thresholds must be strictly ascending".to_string(),
            });
        }
        if self.texture_size() == 0 || self.noise_octaves() == 0 {
            return Err(ConfigError::Invalid {
                field: "texture_size",
                reason: "texture size and octave count must be positive".to_string(),
            });
        }
        if self.mutation.max_organisms == 0 || self.mutation.interval_frames == 0 {
            return Err(ConfigError::Invalid {
                field: "mutation",
                reason: "max_organisms and interval_frames must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RenderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.quality, QualityTier::Medium);
        assert_eq!(config.max_particles(), 2000);
    }

    #[test]
    fn test_quality_tier_fills_unset_knobs() {
        let config = RenderConfig::from_toml_str(r#"quality = "low""#).unwrap();
        assert_eq!(config.max_particles(), 500);
        assert_eq!(config.max_visible_objects(), 200);
        assert_eq!(config.target_fps(), 30.0);
        assert_eq!(config.memory_ceiling_mb, None);
    }

    #[test]
    fn test_explicit_knobs_override_tier() {
        let raw = r#"
            quality = "high"
            max_particles = 42
            memory_ceiling_mb = 64

            [batcher]
            max_batch_size = 8
        "#;
        let config = RenderConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.max_particles(), 42);
        assert_eq!(config.max_visible_objects(), 1000);
        assert_eq!(config.memory_ceiling_mb, Some(64));
        assert_eq!(config.batcher.max_batch_size, 8);
        assert_eq!(config.batcher.max_wait_time_ms, batching::DEFAULT_MAX_WAIT_TIME_MS);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = RenderConfig::for_quality(QualityTier::High);
        config.target_fps = Some(90.0);
        config.texture.pattern = TexturePattern::Cellular;
        let raw = config.to_toml_string().unwrap();
        let parsed = RenderConfig::from_toml_str(&raw).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_rejects_bad_gc_threshold() {
        let raw = r#"
            [resources]
            gc_threshold = 1.5
        "#;
        assert!(matches!(
            RenderConfig::from_toml_str(raw),
            Err(ConfigError::Invalid { field: "resources.gc_threshold", .. })
        ));
    }

    #[test]
    fn test_rejects_unsorted_lod_distances() {
        let raw = r#"
            [culling]
            lod_distances = [300.0, 100.0]
        "#;
        assert!(RenderConfig::from_toml_str(raw).is_err());
    }
}
