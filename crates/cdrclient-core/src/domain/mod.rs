//! Domain entities and business logic
//!
//! This module contains the core domain types for cdrclient:
//! - Newtypes for validated identifiers
//! - Connectors, processing modes and document types
//! - The upload retry policy
//! - Classified results of remote calls
//! - Domain-specific error types

pub mod connector;
pub mod document_type;
pub mod errors;
pub mod newtypes;
pub mod results;
pub mod retry;

// Re-export commonly used types
pub use connector::{Connector, DocTypeFolders, ProcessingMode};
pub use document_type::DocumentType;
pub use errors::DomainError;
pub use newtypes::*;
pub use results::{AckResult, DownloadResult, UploadResult};
pub use retry::RetryPolicy;
