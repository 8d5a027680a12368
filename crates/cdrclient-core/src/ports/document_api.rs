//! Document API port (driven/secondary port)
//!
//! The interface the synchronization engine uses to reach the remote
//! document platform. The production adapter lives in `cdrclient-api`;
//! tests substitute scripted fakes.
//!
//! ## Design Notes
//!
//! - Methods never return `Err`: every outcome, including transport and
//!   authentication failures, is folded into the closed result enums so the
//!   caller's retry decision is an exhaustive `match`.
//! - Bearer tokens are attached by the adapter, not by the caller.

use std::path::Path;

use crate::domain::connector::Connector;
use crate::domain::newtypes::{PullResultId, TraceId};
use crate::domain::results::{AckResult, DownloadResult, UploadResult};

/// Port trait for the remote document API
#[async_trait::async_trait]
pub trait IDocumentApi: Send + Sync {
    /// Uploads the file at `file` on behalf of `connector`
    ///
    /// The body is the raw file content; `Content-Type` is the connector's
    /// configured media type.
    async fn upload(&self, connector: &Connector, file: &Path, trace_id: &TraceId)
        -> UploadResult;

    /// Downloads the next queued document for `connector` into
    /// `<in_flight_dir>/<pull-result-id>.tmp`
    async fn download_next(
        &self,
        connector: &Connector,
        in_flight_dir: &Path,
        trace_id: &TraceId,
    ) -> DownloadResult;

    /// Acknowledges a downloaded document so the platform dequeues it
    async fn acknowledge(
        &self,
        connector: &Connector,
        pull_result_id: &PullResultId,
        trace_id: &TraceId,
    ) -> AckResult;
}
