//! Client secret renewal
//!
//! The platform rotates the OAuth2 client secret on request:
//! `PATCH <credentials-url>/<client-id>` answers with a JSON body holding the
//! new secret. The renewer installs it into the [`AccessTokenCache`], which
//! also clears a sticky denial. Persisting the secret is left to the caller.

use std::sync::Arc;

use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::AccessTokenCache;
use crate::classify::{classify_status, error_body, StatusClass};
use crate::retry::TransportRetry;
use crate::{ApiError, AuthError};

/// Body of a successful renewal response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenewalResponse {
    client_secret: String,
}

/// Rotates the client secret through the credentials endpoint
#[derive(Debug, Clone)]
pub struct CredentialRenewer {
    client: Client,
    credentials_url: String,
    auth: Arc<AccessTokenCache>,
    retry: TransportRetry,
}

impl CredentialRenewer {
    /// Creates a renewer
    ///
    /// # Arguments
    /// * `client` - HTTP client
    /// * `credentials_url` - Base URL of the credentials resource
    /// * `auth` - Cache that receives the new secret
    /// * `retry` - Transport retry for the PATCH call
    pub fn new(
        client: Client,
        credentials_url: impl Into<String>,
        auth: Arc<AccessTokenCache>,
        retry: TransportRetry,
    ) -> Self {
        Self {
            client,
            credentials_url: credentials_url.into().trim_end_matches('/').to_string(),
            auth,
            retry,
        }
    }

    /// Requests a new client secret and installs it into the token cache
    ///
    /// # Returns
    /// The new secret, so the caller can persist it
    pub async fn renew(&self) -> Result<String, ApiError> {
        let client_id = self.auth.client_id().await;
        let url = format!("{}/{}", self.credentials_url, client_id);

        info!(client_id = %client_id, "Renewing client secret");
        let secret = self
            .retry
            .run("credential renewal", || self.request_secret(&url))
            .await?;

        self.auth.update_credentials(secret.clone()).await;
        info!(client_id = %client_id, "Client secret renewed");
        Ok(secret)
    }

    async fn request_secret(&self, url: &str) -> Result<String, ApiError> {
        let token = self.auth.get_token().await?;
        let response = self
            .client
            .request(Method::PATCH, url)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        match classify_status(status) {
            StatusClass::Success => {
                let body: RenewalResponse = response
                    .json()
                    .await
                    .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
                if body.client_secret.is_empty() {
                    return Err(ApiError::InvalidResponse(
                        "renewal response carries an empty secret".to_string(),
                    ));
                }
                Ok(body.client_secret)
            }
            StatusClass::ServerError => {
                let body = error_body(response).await;
                warn!(status = status.as_u16(), "Credential renewal failed on server side");
                Err(ApiError::ServerError {
                    status: status.as_u16(),
                    body,
                })
            }
            StatusClass::ClientError => Err(ApiError::ClientError {
                status: status.as_u16(),
                body: error_body(response).await,
            }),
            StatusClass::NoContent | StatusClass::Unexpected => Err(ApiError::InvalidResponse(
                format!("unexpected renewal status {status}"),
            )),
        }
    }
}

/// Whether a renewal failure means the current credentials are unusable
pub fn is_rejection(err: &ApiError) -> bool {
    match err {
        ApiError::ClientError { status, .. } => {
            *status == StatusCode::UNAUTHORIZED.as_u16()
                || *status == StatusCode::FORBIDDEN.as_u16()
        }
        ApiError::Auth(AuthError::Denied(_)) => true,
        _ => false,
    }
}
