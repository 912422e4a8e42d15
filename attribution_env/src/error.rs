//! Error types for the environment layer.

use thiserror::Error;

/// Errors that can occur while building a generator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    /// Seed was not a hex string of at most 128 bits
    #[error("invalid noise seed: {0}")]
    InvalidSeed(String),
}

impl EnvError {
    /// Creates an invalid-seed error.
    pub fn invalid_seed(text: impl Into<String>) -> Self {
        Self::InvalidSeed(text.into())
    }
}
