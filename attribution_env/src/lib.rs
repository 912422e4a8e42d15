//! Attribution Simulator Environment Layer
//!
//! This crate owns every source of randomness the simulator is allowed to
//! touch. The engine never reaches for ambient entropy: it is handed a
//! [`NoiseRng`] and determinism becomes a property of what was passed in.
//!
//! # Implementations
//!
//! - **Seeded**: [`XorShift128Plus`] - reproducible from a 128-bit seed
//! - **Unseeded**: [`EntropyRng`] - ChaCha8 seeded from OS entropy
//!
//! # Example
//!
//! ```ignore
//! use attribution_env::{noise_rng, parse_seed};
//!
//! let seed = parse_seed("0x2a")?;
//! let mut rng = noise_rng(Some(seed));
//! let bits = rng.next_u128();
//! ```

mod context;
mod entropy;
mod error;
mod xorshift;

pub use context::{noise_rng, NoiseRng};
pub use entropy::EntropyRng;
pub use error::EnvError;
pub use xorshift::{parse_seed, XorShift128Plus};
