//! Scalar fields in [0, 1] behind each texture style

use noise::{NoiseFn, Worley};

use super::noise::LatticeNoise;
use crate::constants::texture::REACTION_DIFFUSION_ITERATIONS;

/// Sampling frame for a square field of `size` pixels
#[derive(Debug, Clone, Copy)]
pub struct FieldFrame {
    pub size: u32,
    /// Noise-space units across the texture
    pub scale: f32,
    /// Shifts the sample window, per generation
    pub offset: f32,
    pub octaves: u32,
}

impl FieldFrame {
    fn coords(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        let size = self.size;
        (0..size).flat_map(move |y| {
            (0..size).map(move |x| {
                let u = (x as f32 + 0.5) / size as f32;
                let v = (y as f32 + 0.5) / size as f32;
                (u * self.scale + self.offset, v * self.scale + self.offset)
            })
        })
    }
}

pub fn organic_field(noise: &LatticeNoise, frame: &FieldFrame) -> Vec<f32> {
    frame
        .coords()
        .map(|(x, y)| (noise.fbm(x, y, frame.octaves) * 0.5 + 0.5).clamp(0.0, 1.0))
        .collect()
}

/// Worley cells with organic detail inside each cell
pub fn cellular_field(seed: u32, noise: &LatticeNoise, frame: &FieldFrame) -> Vec<f32> {
    let worley = Worley::new(seed);
    frame
        .coords()
        .map(|(x, y)| {
            let cell = (worley.get([x as f64, y as f64]) as f32 * 0.5 + 0.5).clamp(0.0, 1.0);
            let detail = (noise.fbm(x * 2.0, y * 2.0, frame.octaves) * 0.5 + 0.5).clamp(0.0, 1.0);
            cell * 0.7 + detail * 0.3
        })
        .collect()
}

const DIFFUSION_A: f32 = 1.0;
const DIFFUSION_B: f32 = 0.5;
const FEED: f32 = 0.055;
const KILL: f32 = 0.062;

/// Gray-Scott, seeded with B wherever the organic field is high
pub fn reaction_diffusion_field(noise: &LatticeNoise, frame: &FieldFrame) -> Vec<f32> {
    let size = frame.size as usize;
    let organic = organic_field(noise, frame);
    let mut a = vec![1.0f32; size * size];
    let mut b: Vec<f32> = organic.iter().map(|&v| if v > 0.6 { 1.0 } else { 0.0 }).collect();
    let mut next_a = a.clone();
    let mut next_b = b.clone();

    let at = |x: usize, y: usize| y * size + x;
    for _ in 0..REACTION_DIFFUSION_ITERATIONS {
        for y in 0..size {
            let up = (y + size - 1) % size;
            let down = (y + 1) % size;
            for x in 0..size {
                let left = (x + size - 1) % size;
                let right = (x + 1) % size;
                let i = at(x, y);
                let lap = |field: &[f32]| {
                    (field[at(left, y)] + field[at(right, y)] + field[at(x, up)] + field[at(x, down)]) * 0.25
                        - field[i]
                };
                let reaction = a[i] * b[i] * b[i];
                next_a[i] = (a[i] + DIFFUSION_A * lap(&a) - reaction + FEED * (1.0 - a[i])).clamp(0.0, 1.0);
                next_b[i] = (b[i] + DIFFUSION_B * lap(&b) + reaction - (KILL + FEED) * b[i]).clamp(0.0, 1.0);
            }
        }
        std::mem::swap(&mut a, &mut next_a);
        std::mem::swap(&mut b, &mut next_b);
    }

    organic
        .iter()
        .zip(&b)
        .map(|(&o, &v)| (o * 0.4 + v * 0.6).clamp(0.0, 1.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> FieldFrame {
        FieldFrame {
            size: 16,
            scale: 4.0,
            offset: 0.0,
            octaves: 3,
        }
    }

    #[test]
    fn test_fields_are_unit_range_and_sized() {
        let noise = LatticeNoise::new(42);
        for field in [
            organic_field(&noise, &frame()),
            cellular_field(42, &noise, &frame()),
            reaction_diffusion_field(&noise, &frame()),
        ] {
            assert_eq!(field.len(), 256);
            assert!(field.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_reaction_diffusion_is_deterministic() {
        let noise = LatticeNoise::new(5);
        assert_eq!(
            reaction_diffusion_field(&noise, &frame()),
            reaction_diffusion_field(&noise, &frame())
        );
    }
}
