//! # AppError
//!
//! Centralized error handling for the Rusty-Forum ecosystem.
//! Maps domain-specific failures to actionable error types.

use thiserror::Error;

/// The primary error type for all rf-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Post, Image, User)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Ownership violation on a mutating operation
    #[error("access denied: {0}")]
    Forbidden(String),

    /// Missing or invalid credentials/token
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Resource already exists (e.g., duplicate email, duplicate vote race)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed input (e.g., unknown ordering mode, bad filter)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Infrastructure failure (DB/transaction/IO); always rolled back
    #[error("storage error: {0}")]
    Storage(String),
}

impl AppError {
    pub fn not_found(resource: &str, id: impl std::fmt::Display) -> Self {
        AppError::NotFound(resource.to_string(), id.to_string())
    }
}

/// A specialized Result type for Rusty-Forum logic.
pub type Result<T> = std::result::Result<T, AppError>;
