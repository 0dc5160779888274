//! Common error types for the rubric services

use thiserror::Error;

/// Common result type for rubric operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across rubric crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unreadable or malformed service configuration (TOML, environment)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Assignment rubric violates its preconditions (empty, blank or
    /// duplicate domains or levels)
    ///
    /// Fatal to the immediate caller; raised before any provider call.
    #[error("Invalid rubric: {0}")]
    InvalidRubric(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation conflicts with existing state (e.g. editing a referenced assignment)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}
