//! Error types for the attribution engine.
//!
//! Matching rejections are not errors: they are ordinary results
//! ([`crate::report::RejectionReason`]). Only configuration problems abort
//! a run, and they are detected before any event is processed.

use attribution_env::EnvError;
use thiserror::Error;

/// Fatal configuration errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A seed only makes sense when noise is applied
    #[error("noise seed may only be set when noise mode is `default`")]
    SeedWithoutNoise,

    /// Randomized response rate outside [0, 1] (or NaN)
    #[error("randomized response rate for {source_type} sources must be between 0 and 1: {rate}")]
    RateOutOfRange { source_type: String, rate: f64 },

    /// Unrecognized value for an enumerated option
    #[error("unknown {option}: {value}")]
    UnknownValue { option: &'static str, value: String },

    /// Seed could not be parsed
    #[error(transparent)]
    Env(#[from] EnvError),
}

impl ConfigError {
    /// Creates an unknown-value error.
    pub fn unknown(option: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownValue {
            option,
            value: value.into(),
        }
    }
}
