//! Error types for the recap engine
//!
//! One unified error enum covers the whole core so callers match on a single
//! type. Replay-configuration failures (missing stand-in, missing method, no
//! unambiguous constructor) are deliberately separate variants from codec and
//! storage failures: they are integration errors, raised before any assertion
//! runs, and must never be mistaken for a recorded-vs-actual mismatch.

use thiserror::Error;

/// Result type alias for recap operations
pub type RecapResult<T> = Result<T, RecapError>;

/// Main error type for the recap engine
#[derive(Error, Debug)]
pub enum RecapError {
    /// Value encoding/decoding failed (malformed payload, shape mismatch)
    #[error("Codec error: {message}")]
    Codec {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// A type descriptor names a type that is not registered
    #[error("Cannot resolve type descriptor `{descriptor}`")]
    TypeResolution { descriptor: String },

    /// Snapshot persistence failed
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file or value is invalid
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Replay cannot be set up from the snapshot
    #[error("Replay configuration error: {message}")]
    Replay { message: String },

    /// A recorded dependency type has no stand-in to program
    #[error("No stand-in available for dependency type `{type_name}`")]
    MissingStandIn { type_name: String },

    /// A recorded method is not declared on the resolved type
    #[error("Method `{method}` is not declared on `{type_name}`")]
    MissingMethod { type_name: String, method: String },

    /// No constructor is fully covered by distinct-typed stand-ins
    #[error(
        "Cannot construct subject `{subject}` unambiguously: no constructor is fully covered, best candidate is missing {missing:?}"
    )]
    ConstructionAmbiguity {
        subject: String,
        missing: Vec<String>,
    },
}

impl RecapError {
    /// Create a codec error
    pub fn codec(message: impl Into<String>) -> Self {
        RecapError::Codec {
            message: message.into(),
            source: None,
        }
    }

    /// Create a codec error from a serde_json failure
    pub fn codec_from(message: impl Into<String>, source: serde_json::Error) -> Self {
        RecapError::Codec {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a type-resolution error
    pub fn type_resolution(descriptor: impl Into<String>) -> Self {
        RecapError::TypeResolution {
            descriptor: descriptor.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        RecapError::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage error from an I/O failure
    pub fn storage_from(message: impl Into<String>, source: std::io::Error) -> Self {
        RecapError::Storage {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        RecapError::Config {
            message: message.into(),
        }
    }

    /// Create a replay-configuration error
    pub fn replay(message: impl Into<String>) -> Self {
        RecapError::Replay {
            message: message.into(),
        }
    }

    /// Whether this error belongs to the replay-configuration family
    /// (as opposed to codec/storage/config failures)
    pub fn is_replay_configuration(&self) -> bool {
        matches!(
            self,
            RecapError::Replay { .. }
                | RecapError::MissingStandIn { .. }
                | RecapError::MissingMethod { .. }
                | RecapError::ConstructionAmbiguity { .. }
        )
    }
}
