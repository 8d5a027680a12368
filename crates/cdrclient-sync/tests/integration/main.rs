//! Integration tests for cdrclient-sync
//!
//! Runs the upload pipeline and the pull loop against the real HTTP adapter,
//! with wiremock standing in for the identity provider and the document
//! platform.

mod common;

mod test_pull;
mod test_upload;
