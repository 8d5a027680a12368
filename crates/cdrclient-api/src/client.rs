//! Document platform HTTP client
//!
//! [`DocumentClient`] is the production [`IDocumentApi`] adapter. Every
//! request carries the connector headers, the trace id and a bearer token
//! from the shared [`AccessTokenCache`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cdrclient_api::{AccessTokenCache, DocumentClient, OAuth2Config, TransportRetry};
//!
//! let http = reqwest::Client::new();
//! let auth = Arc::new(AccessTokenCache::new(
//!     http.clone(),
//!     OAuth2Config::new("https://login.example/token", "client", "secret"),
//!     TransportRetry::default(),
//! ));
//! let client = DocumentClient::new(http, "https://cdr.example/documents", auth);
//! ```

use std::path::Path;
use std::sync::Arc;

use cdrclient_core::domain::connector::Connector;
use cdrclient_core::domain::newtypes::{PullResultId, TraceId};
use cdrclient_core::domain::results::{AckResult, DownloadResult, UploadResult};
use cdrclient_core::ports::IDocumentApi;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, Response};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::auth::AccessTokenCache;
use crate::classify::{self, classify_status, StatusClass};

/// Header carrying the connector id
pub const CONNECTOR_ID_HEADER: &str = "cdr-connector-id";

/// Header carrying the processing mode (`test` / `production`)
pub const PROCESSING_MODE_HEADER: &str = "cdr-processing-mode";

/// Header carrying the per-file or per-cycle trace id
pub const TRACE_ID_HEADER: &str = "X-B3-TraceId";

/// Header identifying the client implementation
pub const CLIENT_TYPE_HEADER: &str = "cdr-client-type";

/// Header identifying the client version
pub const CLIENT_VERSION_HEADER: &str = "cdr-client-version";

/// Header of a download response naming the pull result id
pub const DOCUMENT_UUID_HEADER: &str = "cdr-document-uuid";

const CLIENT_TYPE: &str = "cdrclient";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Suffix of a download that has not been acknowledged and routed yet
pub const IN_FLIGHT_SUFFIX: &str = "tmp";

// ============================================================================
// DocumentClient
// ============================================================================

/// HTTP client for the document endpoint
#[derive(Debug, Clone)]
pub struct DocumentClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL of the documents resource, without trailing slash
    base_url: String,
    /// Shared token cache
    auth: Arc<AccessTokenCache>,
}

impl DocumentClient {
    /// Creates a client for the documents resource at `base_url`
    ///
    /// # Arguments
    /// * `client` - HTTP client, shared with the token cache
    /// * `base_url` - Documents resource URL (POST/GET target)
    /// * `auth` - Source of bearer tokens
    pub fn new(client: Client, base_url: impl Into<String>, auth: Arc<AccessTokenCache>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            auth,
        }
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates a request with connector, trace and client headers
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `url` - Absolute URL
    /// * `connector` - Connector the call is made for
    /// * `trace_id` - Correlation id
    /// * `token` - Bearer token
    pub fn request(
        &self,
        method: Method,
        url: &str,
        connector: &Connector,
        trace_id: &TraceId,
        token: &str,
    ) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(token)
            .header(CONNECTOR_ID_HEADER, connector.id.as_str())
            .header(PROCESSING_MODE_HEADER, connector.mode.as_header_value())
            .header(TRACE_ID_HEADER, trace_id.to_string())
            .header(CLIENT_TYPE_HEADER, CLIENT_TYPE)
            .header(CLIENT_VERSION_HEADER, CLIENT_VERSION)
    }

    fn document_url(&self, id: &PullResultId) -> String {
        format!("{}/{}", self.base_url, id)
    }

    /// Streams a successful download body into `<dir>/<id>.tmp`
    async fn store_download(
        &self,
        response: Response,
        in_flight_dir: &Path,
    ) -> DownloadResult {
        let Some(raw_id) = response
            .headers()
            .get(DOCUMENT_UUID_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            return DownloadResult::TransportError(format!(
                "download response without {DOCUMENT_UUID_HEADER} header"
            ));
        };
        let pull_result_id = match PullResultId::new(raw_id) {
            Ok(id) => id,
            Err(e) => return DownloadResult::TransportError(e.to_string()),
        };

        if let Err(e) = tokio::fs::create_dir_all(in_flight_dir).await {
            return DownloadResult::TransportError(format!(
                "cannot create {}: {e}",
                in_flight_dir.display()
            ));
        }
        let file = in_flight_dir.join(format!("{pull_result_id}.{IN_FLIGHT_SUFFIX}"));

        match write_body(response, &file).await {
            Ok(bytes) => {
                debug!(
                    pull_result_id = %pull_result_id,
                    bytes,
                    file = %file.display(),
                    "Stored downloaded document"
                );
                DownloadResult::Success {
                    pull_result_id,
                    file,
                }
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&file).await {
                    debug!(file = %file.display(), error = %rm, "No partial download to remove");
                }
                DownloadResult::TransportError(e)
            }
        }
    }
}

/// Writes the response body to `file` chunk by chunk, returning the size
async fn write_body(response: Response, file: &Path) -> Result<u64, String> {
    let mut out = tokio::fs::File::create(file)
        .await
        .map_err(|e| format!("cannot create {}: {e}", file.display()))?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| format!("download interrupted: {e}"))?;
        out.write_all(&chunk)
            .await
            .map_err(|e| format!("cannot write {}: {e}", file.display()))?;
        written += chunk.len() as u64;
    }
    out.flush()
        .await
        .map_err(|e| format!("cannot flush {}: {e}", file.display()))?;
    Ok(written)
}

#[async_trait::async_trait]
impl IDocumentApi for DocumentClient {
    async fn upload(&self, connector: &Connector, file: &Path, trace_id: &TraceId) -> UploadResult {
        let body = match tokio::fs::read(file).await {
            Ok(body) => body,
            Err(e) => {
                return UploadResult::TransportError(format!(
                    "cannot read {}: {e}",
                    file.display()
                ))
            }
        };
        let token = match self.auth.get_token().await {
            Ok(token) => token,
            Err(e) => return UploadResult::TransportError(e.to_string()),
        };

        debug!(
            connector = %connector.key(),
            file = %file.display(),
            bytes = body.len(),
            "Uploading document"
        );
        let result = self
            .request(Method::POST, &self.base_url, connector, trace_id, &token)
            .header(CONTENT_TYPE, &connector.content_type)
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) => classify::upload_result(response).await,
            Err(e) => UploadResult::TransportError(e.to_string()),
        }
    }

    async fn download_next(
        &self,
        connector: &Connector,
        in_flight_dir: &Path,
        trace_id: &TraceId,
    ) -> DownloadResult {
        let token = match self.auth.get_token().await {
            Ok(token) => token,
            Err(e) => return DownloadResult::TransportError(e.to_string()),
        };

        let response = match self
            .request(Method::GET, &self.base_url, connector, trace_id, &token)
            .query(&[("limit", "1")])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return DownloadResult::TransportError(e.to_string()),
        };

        let status = response.status();
        match classify_status(status) {
            StatusClass::NoContent => DownloadResult::NoContent,
            StatusClass::Success => self.store_download(response, in_flight_dir).await,
            StatusClass::ClientError => DownloadResult::ClientError {
                status: status.as_u16(),
                body: classify::error_body(response).await,
            },
            StatusClass::ServerError => DownloadResult::ServerError {
                status: status.as_u16(),
                body: classify::error_body(response).await,
            },
            StatusClass::Unexpected => {
                warn!(status = %status, "Unexpected status on download");
                DownloadResult::TransportError(format!("unexpected HTTP status {status}"))
            }
        }
    }

    async fn acknowledge(
        &self,
        connector: &Connector,
        pull_result_id: &PullResultId,
        trace_id: &TraceId,
    ) -> AckResult {
        let token = match self.auth.get_token().await {
            Ok(token) => token,
            Err(e) => return AckResult::TransportError(e.to_string()),
        };

        let url = self.document_url(pull_result_id);
        match self
            .request(Method::DELETE, &url, connector, trace_id, &token)
            .send()
            .await
        {
            Ok(response) => classify::ack_result(response).await,
            Err(e) => AckResult::TransportError(e.to_string()),
        }
    }
}
