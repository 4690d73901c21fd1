//! Unified error type for wirebind replicas
//!
//! Reads are the only domain operation that fails on its own; everything else
//! surfaces errors from collaborators (sinks, codecs, configuration).

use serde::{Deserialize, Serialize};

/// Error type for all wirebind operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum SyncError {
    /// Key has no effective value (never written, deleted, or tombstoned)
    #[error("Not found: {key}")]
    NotFound {
        /// Debug rendering of the missing key
        key: String,
    },

    /// Outbound sink rejected a mutation
    #[error("Sink error: {message}")]
    Sink {
        /// Error message describing the sink failure
        message: String,
    },

    /// Wire encoding or decoding failed
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Configuration could not be parsed or failed validation
    #[error("Config error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },
}

impl SyncError {
    /// Create a not found error for the given key
    pub fn not_found(key: &impl std::fmt::Debug) -> Self {
        Self::NotFound {
            key: format!("{key:?}"),
        }
    }

    /// Create a sink error
    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this is the read-path `NotFound` error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Standard Result type for wirebind operations
pub type Result<T> = std::result::Result<T, SyncError>;

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}
