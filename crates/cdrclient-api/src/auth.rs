//! OAuth2 client-credentials authentication for the document platform
//!
//! Implements the client-credentials grant against the configured identity
//! provider and caches the resulting bearer token until it expires.
//!
//! ## Components
//!
//! - [`OAuth2Config`] - Token endpoint and client credentials
//! - [`AuthState`] - The cached token or the reason there is none
//! - [`AccessTokenCache`] - Single-writer cell handing out bearer tokens
//!
//! ## State machine
//!
//! ```text
//! Unauthenticated ──fetch ok──▶ Authenticated ──expired──▶ (fetch again)
//!        │
//!        ├──io / 5xx (after retries)──▶ RetryableFailure ──next call──▶ (fetch again)
//!        ├──invalid_client / invalid_grant──▶ Denied            (sticky)
//!        └──any other rejection──────────▶ PermanentlyFailed  (sticky)
//! ```
//!
//! Sticky states are left only through [`AccessTokenCache::update_credentials`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Duration, Utc};
use oauth2::basic::{
    BasicErrorResponse, BasicErrorResponseType, BasicRevocationErrorResponse,
    BasicTokenIntrospectionResponse, BasicTokenType,
};
use oauth2::{
    AsyncHttpClient, AuthType, Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
    ExtraTokenFields, HttpClientError, HttpRequest, HttpResponse, RequestTokenError, Scope,
    StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use cdrclient_core::config::AuthConfig;

use crate::retry::TransportRetry;
use crate::AuthError;

/// Lifetime assumed when the token response carries neither `expires_on`
/// nor `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

// ============================================================================
// OAuth2Config
// ============================================================================

/// Configuration for the client-credentials grant
#[derive(Clone)]
pub struct OAuth2Config {
    /// Token endpoint of the identity provider
    pub token_url: String,
    /// Client (application) id
    pub client_id: String,
    /// Client secret; replaced on credential renewal
    pub client_secret: String,
    /// Scope requested with every token, if any
    pub scope: Option<String>,
}

impl OAuth2Config {
    /// Creates a config without a scope
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: None,
        }
    }

    /// Requests the given scope with every token
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Builds the grant settings from the `auth` config section
    pub fn from_config(config: &AuthConfig) -> Self {
        let oauth = Self::new(&config.token_url, &config.client_id, &config.client_secret);
        if config.scope.trim().is_empty() {
            oauth
        } else {
            oauth.with_scope(&config.scope)
        }
    }
}

impl fmt::Debug for OAuth2Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Config")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}

// ============================================================================
// Token response
// ============================================================================

/// Non-standard `expires_on` field (epoch seconds, as number or string)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpiresOnFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_on: Option<serde_json::Value>,
}

impl ExtraTokenFields for ExpiresOnFields {}

impl ExpiresOnFields {
    /// The absolute expiry, if present and parseable
    pub fn expires_on(&self) -> Option<DateTime<Utc>> {
        let secs = match self.expires_on.as_ref()? {
            serde_json::Value::Number(n) => n.as_i64()?,
            serde_json::Value::String(s) => s.trim().parse::<i64>().ok()?,
            _ => return None,
        };
        DateTime::from_timestamp(secs, 0)
    }
}

type CredentialsTokenResponse = StandardTokenResponse<ExpiresOnFields, BasicTokenType>;

type CredentialsClient = Client<
    BasicErrorResponse,
    CredentialsTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Expiry of a token response: `expires_on` wins, then `expires_in`
fn token_expiry(response: &CredentialsTokenResponse, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Some(expires_on) = response.extra_fields().expires_on() {
        return expires_on;
    }
    response
        .expires_in()
        .and_then(|d| Duration::from_std(d).ok())
        .map(|d| now + d)
        .unwrap_or_else(|| now + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS))
}

// ============================================================================
// HTTP transport for the token endpoint
// ============================================================================

/// Failure reaching the token endpoint
#[derive(Debug, thiserror::Error)]
pub enum TokenTransportError {
    #[error(transparent)]
    Http(#[from] HttpClientError<reqwest::Error>),

    #[error("token endpoint returned server error {0}")]
    ServerStatus(u16),
}

/// `reqwest` transport that turns 5xx answers into transport errors, so the
/// shared retry policy treats them like IO failures
#[derive(Debug, Clone)]
struct TokenHttpClient(reqwest::Client);

impl<'c> AsyncHttpClient<'c> for TokenHttpClient {
    type Error = TokenTransportError;
    type Future =
        Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + Send + Sync + 'c>>;

    fn call(&'c self, request: HttpRequest) -> Self::Future {
        Box::pin(async move {
            let response = AsyncHttpClient::call(&self.0, request).await?;
            if response.status().is_server_error() {
                return Err(TokenTransportError::ServerStatus(response.status().as_u16()));
            }
            Ok(response)
        })
    }
}

/// Maps a failed token request onto the auth taxonomy
fn classify_token_error(
    err: RequestTokenError<TokenTransportError, BasicErrorResponse>,
) -> AuthError {
    match err {
        RequestTokenError::ServerResponse(response) => match response.error() {
            BasicErrorResponseType::InvalidClient
            | BasicErrorResponseType::UnauthorizedClient
            | BasicErrorResponseType::InvalidGrant => AuthError::Denied(response.to_string()),
            _ => AuthError::PermanentlyFailed(response.to_string()),
        },
        RequestTokenError::Request(e) => AuthError::Retryable(e.to_string()),
        RequestTokenError::Parse(e, _) => {
            AuthError::PermanentlyFailed(format!("invalid token response: {e}"))
        }
        RequestTokenError::Other(msg) => AuthError::PermanentlyFailed(msg),
    }
}

// ============================================================================
// AuthState
// ============================================================================

/// Current state of the token cell
#[derive(Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No token requested yet, or credentials were just replaced
    Unauthenticated,
    /// A bearer token valid until `expires_on`
    Authenticated {
        token: String,
        expires_on: DateTime<Utc>,
    },
    /// The last request failed transiently; the next call tries again
    RetryableFailure(String),
    /// The client was rejected; sticky
    Denied(String),
    /// The token endpoint cannot be used with these settings; sticky
    PermanentlyFailed(String),
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::Unauthenticated => write!(f, "Unauthenticated"),
            AuthState::Authenticated { expires_on, .. } => f
                .debug_struct("Authenticated")
                .field("token", &"<redacted>")
                .field("expires_on", expires_on)
                .finish(),
            AuthState::RetryableFailure(m) => f.debug_tuple("RetryableFailure").field(m).finish(),
            AuthState::Denied(m) => f.debug_tuple("Denied").field(m).finish(),
            AuthState::PermanentlyFailed(m) => {
                f.debug_tuple("PermanentlyFailed").field(m).finish()
            }
        }
    }
}

// ============================================================================
// AccessTokenCache
// ============================================================================

struct TokenCell {
    config: OAuth2Config,
    state: AuthState,
}

/// Shared source of bearer tokens for every outbound call
///
/// All reads and writes go through one async mutex, so concurrent callers
/// that find an expired token wait for a single refresh instead of racing.
pub struct AccessTokenCache {
    http: TokenHttpClient,
    retry: TransportRetry,
    cell: Mutex<TokenCell>,
}

impl AccessTokenCache {
    /// Creates an empty cache
    ///
    /// # Arguments
    /// * `http` - HTTP client used for the token endpoint
    /// * `config` - Token endpoint and client credentials
    /// * `retry` - Transport retry applied to each token request
    pub fn new(http: reqwest::Client, config: OAuth2Config, retry: TransportRetry) -> Self {
        Self {
            http: TokenHttpClient(http),
            retry,
            cell: Mutex::new(TokenCell {
                config,
                state: AuthState::Unauthenticated,
            }),
        }
    }

    /// Returns a valid bearer token, requesting a new one when needed
    ///
    /// # Errors
    /// - `AuthError::Denied` / `AuthError::PermanentlyFailed` once the cache is
    ///   in a sticky state, without contacting the token endpoint
    /// - `AuthError::Retryable` when the endpoint stayed unreachable for the
    ///   whole retry budget
    pub async fn get_token(&self) -> Result<String, AuthError> {
        let mut cell = self.cell.lock().await;

        match &cell.state {
            AuthState::Authenticated { token, expires_on } if Utc::now() < *expires_on => {
                return Ok(token.clone());
            }
            AuthState::Denied(msg) => return Err(AuthError::Denied(msg.clone())),
            AuthState::PermanentlyFailed(msg) => {
                return Err(AuthError::PermanentlyFailed(msg.clone()))
            }
            AuthState::Authenticated { .. }
            | AuthState::Unauthenticated
            | AuthState::RetryableFailure(_) => {}
        }

        let config = cell.config.clone();
        let result = self
            .retry
            .run("token request", || self.request_token(&config))
            .await;

        match result {
            Ok((token, expires_on)) => {
                info!(expires_on = %expires_on, "Obtained access token");
                cell.state = AuthState::Authenticated {
                    token: token.clone(),
                    expires_on,
                };
                Ok(token)
            }
            Err(err) => {
                cell.state = match &err {
                    AuthError::Denied(msg) => {
                        error!(error = %msg, "Token request denied");
                        AuthState::Denied(msg.clone())
                    }
                    AuthError::PermanentlyFailed(msg) | AuthError::InvalidConfig(msg) => {
                        error!(error = %msg, "Token request failed permanently");
                        AuthState::PermanentlyFailed(msg.clone())
                    }
                    AuthError::Retryable(msg) => {
                        warn!(error = %msg, "Token request failed, will retry on next call");
                        AuthState::RetryableFailure(msg.clone())
                    }
                };
                Err(err)
            }
        }
    }

    /// Replaces the client secret and forgets any cached token or sticky
    /// failure
    pub async fn update_credentials(&self, client_secret: impl Into<String>) {
        let mut cell = self.cell.lock().await;
        cell.config.client_secret = client_secret.into();
        cell.state = AuthState::Unauthenticated;
        info!("Client credentials updated");
    }

    /// Snapshot of the current state
    pub async fn state(&self) -> AuthState {
        self.cell.lock().await.state.clone()
    }

    /// Client id the cache authenticates as
    pub async fn client_id(&self) -> String {
        self.cell.lock().await.config.client_id.clone()
    }

    /// Performs one client-credentials request
    async fn request_token(
        &self,
        config: &OAuth2Config,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let token_url = TokenUrl::new(config.token_url.clone())
            .map_err(|e| AuthError::InvalidConfig(format!("token URL: {e}")))?;

        let client: CredentialsClient = Client::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(token_url);

        let mut request = client.exchange_client_credentials();
        if let Some(scope) = &config.scope {
            request = request.add_scope(Scope::new(scope.clone()));
        }

        debug!(client_id = %config.client_id, "Requesting access token");
        let response = request
            .request_async(&self.http)
            .await
            .map_err(classify_token_error)?;

        let expires_on = token_expiry(&response, Utc::now());
        Ok((response.access_token().secret().to_string(), expires_on))
    }
}

impl fmt::Debug for AccessTokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenCache")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
