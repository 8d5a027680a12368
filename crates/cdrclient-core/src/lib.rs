//! cdrclient Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Connector`, `ProcessingMode`, `DocumentType`, `RetryPolicy`
//! - **Result taxonomy** - `UploadResult`, `DownloadResult`, `AckResult`
//! - **Port definitions** - `IDocumentApi`, implemented by the HTTP adapter
//! - **Connector router** - path and document type to folder resolution
//! - **Configuration** - YAML snapshot loaded once at startup
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement.

pub mod config;
pub mod domain;
pub mod ports;
pub mod router;
