//! Response classification
//!
//! Maps raw HTTP outcomes onto the closed result enums of the core crate.
//! Every status lands in exactly one class; redirects that reqwest did not
//! follow and informational codes count as transport errors.

use cdrclient_core::domain::results::{AckResult, UploadResult};
use reqwest::{Response, StatusCode};

/// Coarse class of an HTTP status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    NoContent,
    ClientError,
    ServerError,
    Unexpected,
}

/// Classifies a status code
pub fn classify_status(status: StatusCode) -> StatusClass {
    if status == StatusCode::NO_CONTENT {
        StatusClass::NoContent
    } else if status.is_success() {
        StatusClass::Success
    } else if status.is_client_error() {
        StatusClass::ClientError
    } else if status.is_server_error() {
        StatusClass::ServerError
    } else {
        StatusClass::Unexpected
    }
}

/// Reads the body for an error result; an unreadable body becomes empty
pub(crate) async fn error_body(response: Response) -> String {
    response.text().await.unwrap_or_default()
}

fn unexpected_status(status: StatusCode) -> String {
    format!("unexpected HTTP status {status}")
}

/// Classifies the answer to an upload `POST`
pub async fn upload_result(response: Response) -> UploadResult {
    let status = response.status();
    match classify_status(status) {
        StatusClass::Success | StatusClass::NoContent => UploadResult::Success,
        StatusClass::ClientError => UploadResult::ClientError {
            status: status.as_u16(),
            body: error_body(response).await,
        },
        StatusClass::ServerError => UploadResult::ServerError {
            status: status.as_u16(),
            body: error_body(response).await,
        },
        StatusClass::Unexpected => UploadResult::TransportError(unexpected_status(status)),
    }
}

/// Classifies the answer to an acknowledge `DELETE`
pub async fn ack_result(response: Response) -> AckResult {
    let status = response.status();
    match classify_status(status) {
        StatusClass::Success | StatusClass::NoContent => AckResult::Success,
        StatusClass::ClientError => AckResult::ClientError {
            status: status.as_u16(),
            body: error_body(response).await,
        },
        StatusClass::ServerError => AckResult::ServerError {
            status: status.as_u16(),
            body: error_body(response).await,
        },
        StatusClass::Unexpected => AckResult::TransportError(unexpected_status(status)),
    }
}
