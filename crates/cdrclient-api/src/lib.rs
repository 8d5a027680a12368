//! cdrclient API - Document platform client
//!
//! Provides the async adapters that reach the remote document platform:
//! - OAuth2 client-credentials token acquisition and caching
//! - Upload, download and acknowledge of documents
//! - Client secret renewal
//!
//! ## Modules
//!
//! - [`auth`] - `AccessTokenCache`, the single source of bearer tokens
//! - [`classify`] - Maps HTTP responses onto the closed result taxonomy
//! - [`client`] - `DocumentClient`, the `IDocumentApi` implementation
//! - [`renewal`] - `CredentialRenewer` for rotating the client secret
//! - [`retry`] - Bounded exponential backoff for token and credential calls

pub mod auth;
pub mod classify;
pub mod client;
pub mod renewal;
pub mod retry;

use thiserror::Error;

pub use auth::{AccessTokenCache, AuthState, OAuth2Config};
pub use client::DocumentClient;
pub use renewal::CredentialRenewer;
pub use retry::{Transient, TransportRetry};

/// Errors raised while acquiring or renewing credentials
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The identity provider rejected the client; sticky until new credentials
    #[error("Authentication denied: {0}")]
    Denied(String),

    /// The token endpoint answered with something unusable; sticky until new credentials
    #[error("Authentication failed permanently: {0}")]
    PermanentlyFailed(String),

    /// IO failure or 5xx from the token endpoint
    #[error("Token request failed: {0}")]
    Retryable(String),

    /// Token URL or client settings cannot be used to build a request
    #[error("Invalid OAuth2 configuration: {0}")]
    InvalidConfig(String),
}

/// Errors that can occur when communicating with the document platform
/// outside the classified upload, download and acknowledge calls
#[derive(Debug, Error)]
pub enum ApiError {
    /// A server-side error occurred (5xx)
    #[error("Server error {status}: {body}")]
    ServerError { status: u16, body: String },

    /// The request was rejected (4xx)
    #[error("Client error {status}: {body}")]
    ClientError { status: u16, body: String },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// No bearer token could be obtained
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
