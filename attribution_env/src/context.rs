//! The generator interface injected into the noise engine.

use crate::entropy::EntropyRng;
use crate::xorshift::XorShift128Plus;
use rand::RngCore;

/// Source of randomness for randomized response, shuffling and report ids.
///
/// Every `NoiseRng` is also a [`RngCore`], so the `rand::Rng` and
/// `rand::seq::SliceRandom` helpers work on `&mut dyn NoiseRng`.
///
/// # Implementations
///
/// - **Seeded**: `XorShift128Plus` - identical output for identical seeds
/// - **Unseeded**: `EntropyRng` - output varies run to run
pub trait NoiseRng: RngCore {
    /// Returns the next 128 random bits.
    ///
    /// The high word is drawn first.
    fn next_u128(&mut self) -> u128 {
        let high = self.next_u64() as u128;
        let low = self.next_u64() as u128;
        (high << 64) | low
    }

    /// Returns true if this generator is reproducible from a seed.
    fn is_seeded(&self) -> bool;
}

/// Builds the generator for a run.
///
/// `Some(seed)` yields XorShift128+, `None` an entropy-backed generator.
pub fn noise_rng(seed: Option<u128>) -> Box<dyn NoiseRng> {
    match seed {
        Some(seed) => Box::new(XorShift128Plus::from_seed_u128(seed)),
        None => Box::new(EntropyRng::new()),
    }
}
