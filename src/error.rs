// SPDX-License-Identifier: MIT

//! Typed error handling for mixrag
//!
//! Two layers: [CapabilityError] for failures at a capability boundary
//! (generation, grading, rewrite, retrieval), and [MixragError] for
//! everything the crate surfaces to callers.

use thiserror::Error;

/// Failure of a single capability call.
///
/// The orchestrator routes on these: any of them on the adaptive path
/// triggers the fallback pipeline, except `Canceled`, which aborts the run
/// without a fallback attempt.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The capability endpoint could not be reached or rejected the call
    #[error("{capability} capability unavailable: {message}")]
    Unavailable { capability: String, message: String },

    /// The capability call exceeded the configured timeout
    #[error("{capability} capability timed out after {seconds}s")]
    Timeout { capability: String, seconds: u64 },

    /// The capability answered, but not in the contracted shape
    #[error("malformed {capability} response: {message}")]
    Malformed { capability: String, message: String },

    /// The caller stopped consuming a streamed answer
    #[error("run canceled by the caller")]
    Canceled,
}

impl CapabilityError {
    /// Create an unavailable error
    pub fn unavailable(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            capability: capability.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(capability: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            capability: capability.into(),
            seconds,
        }
    }

    /// Create a malformed-response error
    pub fn malformed(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            capability: capability.into(),
            message: message.into(),
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

/// Top-level error type for mixrag
#[derive(Debug, Error)]
pub enum MixragError {
    /// A capability failure that could not be absorbed by routing
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// The fallback pipeline's own generation call failed; terminal for the
    /// run, surfaced with no partial answer
    #[error("fallback pipeline failed: {source}")]
    Fallback { source: CapabilityError },

    /// The caller abandoned a streaming run before completion
    #[error("run canceled before completion")]
    Canceled,

    /// Configuration errors (missing env vars, invalid config file)
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

impl MixragError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<&str> for MixragError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for MixragError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
