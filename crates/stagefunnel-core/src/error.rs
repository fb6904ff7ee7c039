//! Core error types for stagefunnel-core.
//!
//! Nothing in this hierarchy is fatal to a running funnel: transition errors
//! leave the stage untouched, and lookup errors are folded into the fallback
//! photo before they reach the state machine.

use std::path::PathBuf;
use thiserror::Error;

use crate::stage::Stage;

/// Core error type for stagefunnel-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A user action that the current stage does not accept
    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Photo lookup errors
    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Rejected stage transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The action is not available in the current stage
    #[error("action '{action}' is not available in stage {stage}")]
    NotAllowed { action: &'static str, stage: Stage },

    /// The form guard does not hold yet
    #[error("form is incomplete, missing: {}", missing.join(", "))]
    GuardUnsatisfied { missing: Vec<&'static str> },
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Empty collection
    #[error("Empty collection: {0}")]
    EmptyCollection(String),

    /// Out of bounds
    #[error("Index {index} out of bounds for {collection} (length: {len})")]
    OutOfBounds {
        collection: String,
        index: usize,
        len: usize,
    },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Message table breakpoints are not ascending
    #[error("Message table breakpoints must ascend: {previous} is followed by {next}")]
    UnorderedTable { previous: f64, next: f64 },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Photo lookup failures. Always recovered into the fallback photo.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// Connection, timeout or request construction failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("lookup service returned HTTP {0}")]
    Status(u16),

    /// Body was not the expected JSON shape
    #[error("malformed lookup response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for LookupError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LookupError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            LookupError::Status(status.as_u16())
        } else {
            LookupError::Transport(err.to_string())
        }
    }
}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        let key = match &err {
            ValidationError::InvalidValue { field, .. } => field.clone(),
            ValidationError::EmptyCollection(name) => name.clone(),
            ValidationError::OutOfBounds { collection, .. } => collection.clone(),
            ValidationError::UnorderedTable { .. } => "messages".to_string(),
        };
        ConfigError::InvalidValue {
            key,
            message: err.to_string(),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
