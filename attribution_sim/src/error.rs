//! Errors surfaced by the command-line driver.

use attribution_core::ConfigError;
use thiserror::Error;

/// Malformed or out-of-range input.
///
/// `path` points at the offending value, e.g.
/// `sources[2].registration_config.priority`.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to deserialize input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{path}: {message}")]
    Invalid { path: String, message: String },
}

impl InputError {
    /// Creates an invalid-value error at `path`.
    pub fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Anything that stops a single simulation from producing output.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to serialize output JSON: {0}")]
    Output(serde_json::Error),
}
