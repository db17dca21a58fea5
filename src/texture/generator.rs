//! Procedural organism textures
//!
//! Pixels are a pure function of (dna, traits, size, generation, pattern,
//! octaves). Uploaded textures are cached under that composite key and the
//! cache holds one reference on each; past `max_cached_textures` the least
//! recently used entry is released.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::noise::LatticeNoise;
use super::patterns::{self, FieldFrame};
use crate::config::{TextureConfig, TexturePattern};
use crate::constants::texture::GOLDEN_GAMMA;
use crate::gpu::{NativeHandle, TextureFormat};
use crate::hash::{fx_digest, genetic_seed, mix32};
use crate::memory::ResourceManager;

/// Trait snapshot that drives color and detail, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrganismTraits {
    pub vitality: f32,
    pub complexity: f32,
    pub adaptability: f32,
    pub luminosity: f32,
}

impl Default for OrganismTraits {
    fn default() -> Self {
        Self {
            vitality: 0.5,
            complexity: 0.5,
            adaptability: 0.5,
            luminosity: 0.5,
        }
    }
}

impl OrganismTraits {
    pub fn from_array(values: [f32; 4]) -> Self {
        Self {
            vitality: values[0],
            complexity: values[1],
            adaptability: values[2],
            luminosity: values[3],
        }
    }

    /// Leading values in trait order; missing ones keep the default
    pub fn from_slice(values: &[f32]) -> Self {
        let mut array = Self::default().to_array();
        for (slot, value) in array.iter_mut().zip(values) {
            *slot = *value;
        }
        Self::from_array(array)
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.vitality, self.complexity, self.adaptability, self.luminosity]
    }

    pub fn clamped(self) -> Self {
        Self::from_array(self.to_array().map(|v| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }))
    }

    fn bits(self) -> [u32; 4] {
        self.to_array().map(f32::to_bits)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureOptions {
    pub dna: String,
    pub size: u32,
    pub traits: OrganismTraits,
    pub generation: u32,
    pub pattern: TexturePattern,
    pub octaves: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CacheNamespace {
    Organism,
    Dna,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureCacheKey {
    namespace: CacheNamespace,
    dna: String,
    size: u32,
    traits_bits: [u32; 4],
    generation: u32,
    pattern: TexturePattern,
    octaves: u32,
}

impl TextureCacheKey {
    fn organism(options: &TextureOptions) -> Self {
        Self {
            namespace: CacheNamespace::Organism,
            dna: options.dna.clone(),
            size: options.size,
            traits_bits: options.traits.clamped().bits(),
            generation: options.generation,
            pattern: options.pattern,
            octaves: options.octaves,
        }
    }

    fn dna(dna: &str, size: u32) -> Self {
        Self {
            namespace: CacheNamespace::Dna,
            dna: dna.to_string(),
            size,
            traits_bits: [0; 4],
            generation: 0,
            pattern: TexturePattern::Organic,
            octaves: 0,
        }
    }

    fn resource_id(&self) -> String {
        let prefix = match self.namespace {
            CacheNamespace::Organism => "texture/organism",
            CacheNamespace::Dna => "texture/dna",
        };
        format!("{}/{:016x}", prefix, fx_digest(self))
    }
}

/// Cached texture as handed to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureHandle {
    pub id: String,
    pub handle: NativeHandle,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TextureCacheStats {
    pub cached: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub failed_uploads: u64,
}

struct CacheEntry {
    texture: TextureHandle,
    last_used: u64,
}

fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> [f32; 3] {
    let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let h = hue.rem_euclid(1.0) * 6.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = lightness - c / 2.0;
    [r + m, g + m, b + m]
}

#[inline]
fn quantize(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// RGBA8 pixels for `options`; empty when the size is zero
pub fn synthesize_pixels(options: &TextureOptions) -> Vec<u8> {
    let size = options.size;
    if size == 0 {
        return Vec::new();
    }
    let traits = options.traits.clamped();
    let seed = genetic_seed(&options.dna);
    let noise = LatticeNoise::new(seed);
    let frame = FieldFrame {
        size,
        scale: 4.0 + traits.complexity * 4.0,
        offset: options.generation as f32 * 0.37,
        octaves: options.octaves.max(1),
    };
    let field = match options.pattern {
        TexturePattern::Organic => patterns::organic_field(&noise, &frame),
        TexturePattern::Cellular => patterns::cellular_field(seed, &noise, &frame),
        TexturePattern::ReactionDiffusion => patterns::reaction_diffusion_field(&noise, &frame),
    };

    let base_hue = (seed % 360) as f32 / 360.0 + traits.adaptability * 0.25;
    let saturation = 0.4 + traits.vitality * 0.5;
    let mut pixels = Vec::with_capacity(field.len() * 4);
    for (i, &value) in field.iter().enumerate() {
        let x = (i as u32 % size) as f32 + 0.5;
        let y = (i as u32 / size) as f32 + 0.5;
        let dx = x / size as f32 * 2.0 - 1.0;
        let dy = y / size as f32 * 2.0 - 1.0;
        let radius = (dx * dx + dy * dy).sqrt();

        let lightness = (0.25 + value * 0.5 * (0.5 + traits.luminosity)).clamp(0.0, 1.0);
        let [r, g, b] = hsl_to_rgb(base_hue + value * 0.15, saturation, lightness);
        let edge = ((1.0 - radius) / 0.2).clamp(0.0, 1.0);
        let alpha = edge * (0.6 + 0.4 * value);

        pixels.extend_from_slice(&[quantize(r), quantize(g), quantize(b), quantize(alpha)]);
    }
    pixels
}

/// Raw genetic hash pattern: one column band per dna byte
pub fn synthesize_dna_pixels(dna: &str, size: u32) -> Vec<u8> {
    let seed = genetic_seed(dna);
    let bytes = dna.as_bytes();
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let byte = if bytes.is_empty() {
                0
            } else {
                bytes[x as usize * bytes.len() / size as usize] as u32
            };
            let h = mix32(seed ^ byte.wrapping_mul(GOLDEN_GAMMA) ^ (y / 4).wrapping_mul(0x85eb_ca6b));
            pixels.extend_from_slice(&[h as u8, (h >> 8) as u8, (h >> 16) as u8, 255]);
        }
    }
    pixels
}

pub struct ProceduralTextureGenerator {
    config: TextureConfig,
    cache: FxHashMap<TextureCacheKey, CacheEntry>,
    use_counter: u64,
    stats: TextureCacheStats,
}

impl ProceduralTextureGenerator {
    pub fn new(config: &TextureConfig) -> Self {
        Self {
            config: config.clone(),
            cache: FxHashMap::default(),
            use_counter: 0,
            stats: TextureCacheStats::default(),
        }
    }

    pub fn default_pattern(&self) -> TexturePattern {
        self.config.pattern
    }

    pub fn generate_organism_texture(
        &mut self,
        options: &TextureOptions,
        resources: &mut ResourceManager,
    ) -> Option<TextureHandle> {
        if !Self::size_supported(options.size, resources) {
            log::warn!(
                "[ProceduralTextureGenerator::generate_organism_texture] Unsupported size {}",
                options.size
            );
            return None;
        }
        let key = TextureCacheKey::organism(options);
        self.lookup_or_create(key, resources, || synthesize_pixels(options))
    }

    pub fn generate_dna_visualization(
        &mut self,
        dna: &str,
        size: u32,
        resources: &mut ResourceManager,
    ) -> Option<TextureHandle> {
        if !Self::size_supported(size, resources) {
            return None;
        }
        let key = TextureCacheKey::dna(dna, size);
        self.lookup_or_create(key, resources, || synthesize_dna_pixels(dna, size))
    }

    fn size_supported(size: u32, resources: &ResourceManager) -> bool {
        size > 0 && size <= resources.capabilities().max_texture_size
    }

    fn lookup_or_create<F>(&mut self, key: TextureCacheKey, resources: &mut ResourceManager, synthesize: F) -> Option<TextureHandle>
    where
        F: FnOnce() -> Vec<u8>,
    {
        self.use_counter += 1;
        if let Some(entry) = self.cache.get_mut(&key) {
            if resources.handle(&entry.texture.id) == Some(entry.texture.handle) {
                entry.last_used = self.use_counter;
                resources.touch(&entry.texture.id);
                self.stats.hits += 1;
                return Some(entry.texture.clone());
            }
            // Registry lost it (destroy or replacement); rebuild below
            self.cache.remove(&key);
        }

        self.stats.misses += 1;
        let id = key.resource_id();
        let pixels = synthesize();
        let Some(handle) = resources.create_texture(&id, key.size, key.size, TextureFormat::Rgba8Unorm, Some(&pixels)) else {
            log::warn!("[ProceduralTextureGenerator] Upload of '{}' denied", id);
            self.stats.failed_uploads += 1;
            return None;
        };
        resources.retain_resource(&id);

        let texture = TextureHandle { id, handle };
        self.cache.insert(
            key,
            CacheEntry {
                texture: texture.clone(),
                last_used: self.use_counter,
            },
        );
        self.trim(resources);
        Some(texture)
    }

    fn trim(&mut self, resources: &mut ResourceManager) {
        while self.cache.len() > self.config.max_cached_textures.max(1) {
            let Some(oldest) = self
                .cache
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            if let Some(entry) = self.cache.remove(&oldest) {
                resources.release_resource(&entry.texture.id);
                self.stats.evictions += 1;
            }
        }
    }

    /// Release every cached texture
    pub fn clear_cache(&mut self, resources: &mut ResourceManager) {
        for (_, entry) in self.cache.drain() {
            resources.release_now(&entry.texture.id);
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    pub fn stats(&self) -> TextureCacheStats {
        TextureCacheStats {
            cached: self.cache.len(),
            ..self.stats.clone()
        }
    }
}
