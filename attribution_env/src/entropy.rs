//! Unseeded generator backed by OS entropy.

use crate::context::NoiseRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Generator used when no noise seed is supplied.
///
/// Output varies between runs. ChaCha8 is seeded once from the OS and
/// then used for the whole simulation.
pub struct EntropyRng {
    inner: ChaCha8Rng,
}

impl EntropyRng {
    /// Creates a generator seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            inner: ChaCha8Rng::from_entropy(),
        }
    }
}

impl Default for EntropyRng {
    fn default() -> Self {
        Self::new()
    }
}

impl RngCore for EntropyRng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}

impl NoiseRng for EntropyRng {
    fn is_seeded(&self) -> bool {
        false
    }
}
