//! Configuration errors shared across the ferry crates.
//!
//! Anything raised here is fatal at endpoint creation: an endpoint is never
//! started with a configuration that failed validation.

use thiserror::Error;

/// Errors raised while building or validating endpoint configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A required configuration field is missing.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A configuration value is invalid.
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// An enumerated option was given a value outside its allowed set.
    #[error("Invalid {field}: ({value}). Must be one of ({allowed})")]
    UnknownVariant {
        field: &'static str,
        value: String,
        allowed: &'static str,
    },

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigurationError {
    /// Shorthand for [`ConfigurationError::InvalidValue`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
