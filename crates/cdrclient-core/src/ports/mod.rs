//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are interfaces that the synchronization engine depends on, but whose
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IDocumentApi`] - Upload, download and acknowledge against the document platform

pub mod document_api;

pub use document_api::IDocumentApi;
