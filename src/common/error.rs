//! Error types for filter operations

use std::fmt;

/// Errors that can occur while constructing, mutating, or (de)serializing a filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SketchError {
    /// A constructor argument was out of its valid domain
    InvalidConfiguration {
        /// Parameter name
        param: String,
        /// Invalid value provided
        value: String,
        /// Constraint that was violated
        constraint: String,
    },

    /// A key was not a byte string
    InvalidKey {
        /// Human-readable reason the key was rejected
        reason: String,
    },

    /// Error while writing a filter to a sink
    SerializationError(String),

    /// Error while reading a filter from a source
    DeserializationError(String),

    /// `start` called on a running driver, or `stop` called on a stopped one
    DriverStateError {
        /// Human-readable description of the state violation
        reason: String,
    },

    /// Attempted to merge or compare filters with incompatible parameters
    IncompatibleSketches {
        /// Reason for incompatibility
        reason: String,
    },
}

impl fmt::Display for SketchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SketchError::InvalidConfiguration {
                param,
                value,
                constraint,
            } => {
                write!(
                    f,
                    "invalid configuration '{}': value '{}' {}",
                    param, value, constraint
                )
            }
            SketchError::InvalidKey { reason } => write!(f, "invalid key: {}", reason),
            SketchError::SerializationError(msg) => write!(f, "serialization error: {}", msg),
            SketchError::DeserializationError(msg) => write!(f, "deserialization error: {}", msg),
            SketchError::DriverStateError { reason } => write!(f, "driver state error: {}", reason),
            SketchError::IncompatibleSketches { reason } => {
                write!(f, "incompatible sketches: {}", reason)
            }
        }
    }
}

impl std::error::Error for SketchError {}

/// Result type alias for filter operations
pub type Result<T> = std::result::Result<T, SketchError>;
