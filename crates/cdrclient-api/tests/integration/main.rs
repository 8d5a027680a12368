//! Integration tests for cdrclient-api
//!
//! Uses wiremock to simulate the identity provider and the document
//! platform, and verifies end-to-end behavior of the token cache, the
//! document client and credential renewal.


mod test_auth;
mod test_documents;
mod test_renewal;
