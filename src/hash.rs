//! 32-bit integer hashing shared by the texture synthesis and the mutation
//! kernel. All arithmetic wraps, so results match the WGSL programs bit for
//! bit.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::constants::texture::GOLDEN_GAMMA;

/// Avalanche finalizer (lowbias32)
#[inline]
pub fn mix32(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x7feb_352d);
    x ^= x >> 15;
    x = x.wrapping_mul(0x846c_a68b);
    x ^= x >> 16;
    x
}

/// Order-sensitive seed for a genetic string. Never zero, so it can seed a
/// xorshift generator directly.
pub fn genetic_seed(dna: &str) -> u32 {
    let rolling = dna
        .bytes()
        .fold(0u32, |h, byte| h.wrapping_mul(31).wrapping_add(byte as u32));
    match mix32(rolling) {
        0 => GOLDEN_GAMMA,
        seed => seed,
    }
}

/// Marsaglia xorshift32 step; `state` must be non-zero
#[inline]
pub fn xorshift32(state: &mut u32) -> u32 {
    let mut x = *state;
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    *state = x;
    x
}

/// Stable 64-bit digest for cache keys
pub fn fx_digest<T: Hash>(value: &T) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genetic_seed_is_order_sensitive() {
        assert_ne!(genetic_seed("ATCG"), genetic_seed("GCTA"));
        assert_eq!(genetic_seed("ATCG"), genetic_seed("ATCG"));
    }

    #[test]
    fn test_genetic_seed_never_zero() {
        assert_ne!(genetic_seed(""), 0);
        for dna in ["A", "AT", "ATCGATCG", "zzzz"] {
            assert_ne!(genetic_seed(dna), 0);
        }
    }

    #[test]
    fn test_mix32_spreads_neighbors() {
        assert_eq!(mix32(0), 0);
        assert_ne!(mix32(1), mix32(2));
        assert_ne!(mix32(1), 1);
    }

    #[test]
    fn test_xorshift_sequence_advances() {
        let mut state = 0x1234_5678;
        let first = xorshift32(&mut state);
        let second = xorshift32(&mut state);
        assert_ne!(first, second);
        assert_ne!(state, 0);
    }
}
