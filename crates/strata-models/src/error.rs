//! Validation errors raised before any I/O happens.

use crate::level::Level;

/// Result type for boundary validation.
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// A request that cannot be served as submitted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error(
        "Invalid context level: {0}. Allowed values are: {allowed}",
        allowed = Level::allowed_values()
    )]
    InvalidLevel(String),

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}
