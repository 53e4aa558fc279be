//! Error types for the budget Q&A engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Error, Debug)]
pub enum SessionError {

    // =============================
    // Session Flow Errors
    // =============================

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("History store error: {0}")]
    Store(String),

    #[error("Invalid step: {0}")]
    InvalidStep(String),

    #[error("History entry not found: {0}")]
    EntryNotFound(String),
}
