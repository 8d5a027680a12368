//! Classified outcomes of remote document API calls
//!
//! Every call to the document API ends in exactly one variant of these
//! enums. Callers match exhaustively; there is no catch-all "other" case.

use std::path::PathBuf;

use super::newtypes::PullResultId;

/// Outcome of `POST <base>` with a document body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResult {
    /// 2xx: the platform accepted the document
    Success,
    /// 4xx: permanently rejected, never retried
    ClientError { status: u16, body: String },
    /// 5xx: retryable
    ServerError { status: u16, body: String },
    /// Network, IO or authentication transport failure: retryable
    TransportError(String),
}

impl UploadResult {
    /// Whether the caller should retry the same document later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadResult::ServerError { .. } | UploadResult::TransportError(_)
        )
    }
}

/// Outcome of `GET <base>?limit=1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadResult {
    /// 200: one document was streamed into `file`
    Success { pull_result_id: PullResultId, file: PathBuf },
    /// 204: nothing queued for this connector
    NoContent,
    /// 4xx
    ClientError { status: u16, body: String },
    /// 5xx
    ServerError { status: u16, body: String },
    /// Network or IO failure, including a malformed success response
    TransportError(String),
}

/// Outcome of `DELETE <base>/<pull-result-id>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckResult {
    /// 2xx: the document is dequeued on the platform
    Success,
    /// 4xx
    ClientError { status: u16, body: String },
    /// 5xx
    ServerError { status: u16, body: String },
    /// Network failure
    TransportError(String),
}
