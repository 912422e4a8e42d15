//! XorShift128+ generator for reproducible noise.

use crate::context::NoiseRng;
use crate::error::EnvError;
use rand::{RngCore, SeedableRng};

/// XorShift128+ pseudo-random generator.
///
/// Seeded runs must produce identical reports across machines, so the
/// algorithm is fixed rather than delegated to `StdRng` (whose algorithm
/// may change between `rand` releases).
///
/// An all-zero state is a fixed point of the algorithm and yields zeros
/// forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XorShift128Plus {
    state: [u64; 2],
}

impl XorShift128Plus {
    /// Creates a generator from a 128-bit seed.
    ///
    /// The high 64 bits become state word 0, the low 64 bits state word 1.
    pub fn from_seed_u128(seed: u128) -> Self {
        Self {
            state: [(seed >> 64) as u64, seed as u64],
        }
    }
}

impl RngCore for XorShift128Plus {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        let mut s1 = self.state[0];
        let s0 = self.state[1];
        let result = s0.wrapping_add(s1);
        self.state[0] = s0;
        s1 ^= s1 << 23;
        self.state[1] = s1 ^ s0 ^ (s1 >> 17) ^ (s0 >> 26);
        result
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for XorShift128Plus {
    type Seed = [u8; 16];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::from_seed_u128(u128::from_be_bytes(seed))
    }
}

impl NoiseRng for XorShift128Plus {
    fn is_seeded(&self) -> bool {
        true
    }
}

/// Parses a 128-bit noise seed written as hex, with an optional `0x` prefix.
pub fn parse_seed(text: &str) -> Result<u128, EnvError> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);

    if digits.is_empty() || digits.len() > 32 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(EnvError::invalid_seed(text));
    }

    u128::from_str_radix(digits, 16).map_err(|_| EnvError::invalid_seed(text))
}
