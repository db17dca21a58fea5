//! Seeded lattice gradient noise

use crate::constants::texture::{GOLDEN_GAMMA, PERMUTATION_SIZE};
use crate::hash::xorshift32;

/// Shuffled 0..=255, doubled so lookups never wrap
#[derive(Debug, Clone)]
pub struct PermutationTable {
    values: [u8; PERMUTATION_SIZE * 2],
}

impl PermutationTable {
    pub fn new(seed: u32) -> Self {
        let mut base = [0u8; PERMUTATION_SIZE];
        for (i, value) in base.iter_mut().enumerate() {
            *value = i as u8;
        }

        let mut state = if seed == 0 { GOLDEN_GAMMA } else { seed };
        for i in (1..PERMUTATION_SIZE).rev() {
            let j = (xorshift32(&mut state) % (i as u32 + 1)) as usize;
            base.swap(i, j);
        }

        let mut values = [0u8; PERMUTATION_SIZE * 2];
        values[..PERMUTATION_SIZE].copy_from_slice(&base);
        values[PERMUTATION_SIZE..].copy_from_slice(&base);
        Self { values }
    }

    #[inline]
    pub fn hash(&self, x: i32, y: i32) -> u8 {
        let xi = (x & 255) as usize;
        let yi = (y & 255) as usize;
        self.values[self.values[xi] as usize + yi]
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }
}

const GRADIENTS: [(f32, f32); 8] = [
    (1.0, 0.0),
    (-1.0, 0.0),
    (0.0, 1.0),
    (0.0, -1.0),
    (1.0, 1.0),
    (-1.0, 1.0),
    (1.0, -1.0),
    (-1.0, -1.0),
];

#[inline]
fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[derive(Debug, Clone)]
pub struct LatticeNoise {
    table: PermutationTable,
}

impl LatticeNoise {
    pub fn new(seed: u32) -> Self {
        Self {
            table: PermutationTable::new(seed),
        }
    }

    fn gradient_dot(&self, ix: i32, iy: i32, dx: f32, dy: f32) -> f32 {
        let (gx, gy) = GRADIENTS[(self.table.hash(ix, iy) & 7) as usize];
        gx * dx + gy * dy
    }

    /// Roughly in [-1, 1]; zero at every lattice point
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let ix = x0 as i32;
        let iy = y0 as i32;

        let n00 = self.gradient_dot(ix, iy, fx, fy);
        let n10 = self.gradient_dot(ix + 1, iy, fx - 1.0, fy);
        let n01 = self.gradient_dot(ix, iy + 1, fx, fy - 1.0);
        let n11 = self.gradient_dot(ix + 1, iy + 1, fx - 1.0, fy - 1.0);

        let u = fade(fx);
        let v = fade(fy);
        lerp(lerp(n00, n10, u), lerp(n01, n11, u), v)
    }

    /// Fractal sum, normalized by the total amplitude
    pub fn fbm(&self, x: f32, y: f32, octaves: u32) -> f32 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        let mut max_amplitude = 0.0;
        for _ in 0..octaves.max(1) {
            total += self.sample(x * frequency, y * frequency) * amplitude;
            max_amplitude += amplitude;
            amplitude *= 0.5;
            frequency *= 2.0;
        }
        total / max_amplitude
    }
}
