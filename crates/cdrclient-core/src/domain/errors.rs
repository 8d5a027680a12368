//! Domain error types
//!
//! Error types for domain operations: identifier validation, configuration
//! problems found while building connectors, and unexpected file layouts.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Unknown processing mode literal
    #[error("Invalid processing mode: {0}")]
    InvalidMode(String),

    /// Unknown document type literal
    #[error("Invalid document type: {0}")]
    InvalidDocumentType(String),

    /// A retry policy without any delay
    #[error("Retry policy must contain at least one delay")]
    EmptyRetryPolicy,

    /// The configuration snapshot violates an invariant; fatal at startup
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
}
