//! Integration tests for upload, download and acknowledge

use cdrclient_api::client::{
    CLIENT_TYPE_HEADER, CONNECTOR_ID_HEADER, DOCUMENT_UUID_HEADER, PROCESSING_MODE_HEADER,
    TRACE_ID_HEADER,
};
use cdrclient_core::domain::newtypes::{PullResultId, TraceId};
use cdrclient_core::domain::results::{AckResult, DownloadResult, UploadResult};
use cdrclient_core::ports::IDocumentApi;
use wiremock::matchers::{body_bytes, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{self, DOCUMENTS_PATH, TOKEN_PATH};

const XML: &[u8] = br#"<?xml version="1.0"?><invoice:request xmlns:invoice="http://www.forum-datenaustausch.ch/invoice"/>"#;

async fn setup() -> (MockServer, cdrclient_api::DocumentClient, tempfile::TempDir) {
    let server = MockServer::start().await;
    common::mount_token(&server, "doc-token").await;
    let client = common::document_client(&server, common::token_cache(&server));
    (server, client, tempfile::tempdir().unwrap())
}

// ============================================================================
// Upload tests
// ============================================================================

#[tokio::test]
async fn test_upload_sends_bytes_and_headers() {
    let (server, client, dir) = setup().await;
    let trace = TraceId::new();

    Mock::given(method("POST"))
        .and(path(DOCUMENTS_PATH))
        .and(header("authorization", "Bearer doc-token"))
        .and(header(CONNECTOR_ID_HEADER, "4711"))
        .and(header(PROCESSING_MODE_HEADER, "test"))
        .and(header(TRACE_ID_HEADER, trace.to_string().as_str()))
        .and(header(
            "content-type",
            "application/forumdatenaustausch+xml;charset=UTF-8",
        ))
        .and(header_exists(CLIENT_TYPE_HEADER))
        .and(body_bytes(XML.to_vec()))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let file = dir.path().join("doc.upload");
    std::fs::write(&file, XML).unwrap();
    let connector = common::connector(dir.path(), dir.path());

    let result = client.upload(&connector, &file, &trace).await;
    assert_eq!(result, UploadResult::Success);
}

#[tokio::test]
async fn test_upload_client_error_carries_body() {
    let (server, client, dir) = setup().await;

    Mock::given(method("POST"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("schema violation"))
        .mount(&server)
        .await;

    let file = dir.path().join("doc.upload");
    std::fs::write(&file, XML).unwrap();
    let connector = common::connector(dir.path(), dir.path());

    let result = client.upload(&connector, &file, &TraceId::new()).await;
    assert_eq!(
        result,
        UploadResult::ClientError {
            status: 400,
            body: "schema violation".to_string()
        }
    );
    assert!(!result.is_retryable());
}

#[tokio::test]
async fn test_upload_server_error_is_retryable() {
    let (server, client, dir) = setup().await;

    Mock::given(method("POST"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let file = dir.path().join("doc.upload");
    std::fs::write(&file, XML).unwrap();
    let connector = common::connector(dir.path(), dir.path());

    let result = client.upload(&connector, &file, &TraceId::new()).await;
    assert!(matches!(result, UploadResult::ServerError { status: 503, .. }));
    assert!(result.is_retryable());
}

#[tokio::test]
async fn test_upload_without_token_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(serde_json::json!({"error": "invalid_client"})),
        )
        .mount(&server)
        .await;
    let client = common::document_client(&server, common::token_cache(&server));

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("doc.upload");
    std::fs::write(&file, XML).unwrap();
    let connector = common::connector(dir.path(), dir.path());

    let result = client.upload(&connector, &file, &TraceId::new()).await;
    assert!(matches!(result, UploadResult::TransportError(_)));
    assert_eq!(common::requests_to(&server, DOCUMENTS_PATH).await, 0);
}

// ============================================================================
// Download tests
// ============================================================================

#[tokio::test]
async fn test_download_streams_into_in_flight_dir() {
    let (server, client, dir) = setup().await;

    Mock::given(method("GET"))
        .and(path(DOCUMENTS_PATH))
        .and(query_param("limit", "1"))
        .and(header(CONNECTOR_ID_HEADER, "4711"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header(DOCUMENT_UUID_HEADER, "9f2c-77ab")
                .set_body_bytes(XML.to_vec()),
        )
        .mount(&server)
        .await;

    let in_flight = dir.path().join("downloads").join("4711").join("test");
    let connector = common::connector(dir.path(), dir.path());

    let result = client
        .download_next(&connector, &in_flight, &TraceId::new())
        .await;

    let DownloadResult::Success {
        pull_result_id,
        file,
    } = result
    else {
        panic!("expected success, got {result:?}");
    };
    assert_eq!(pull_result_id.as_str(), "9f2c-77ab");
    assert_eq!(file, in_flight.join("9f2c-77ab.tmp"));
    assert_eq!(std::fs::read(&file).unwrap(), XML);
}

#[tokio::test]
async fn test_download_no_content() {
    let (server, client, dir) = setup().await;

    Mock::given(method("GET"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let connector = common::connector(dir.path(), dir.path());
    let result = client
        .download_next(&connector, dir.path(), &TraceId::new())
        .await;
    assert_eq!(result, DownloadResult::NoContent);
}

#[tokio::test]
async fn test_download_without_document_id_is_transport_error() {
    let (server, client, dir) = setup().await;

    Mock::given(method("GET"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(XML.to_vec()))
        .mount(&server)
        .await;

    let connector = common::connector(dir.path(), dir.path());
    let result = client
        .download_next(&connector, dir.path(), &TraceId::new())
        .await;
    assert!(matches!(result, DownloadResult::TransportError(_)));
}

#[tokio::test]
async fn test_download_rejects_path_like_document_id() {
    let (server, client, dir) = setup().await;

    Mock::given(method("GET"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header(DOCUMENT_UUID_HEADER, "../escape")
                .set_body_bytes(XML.to_vec()),
        )
        .mount(&server)
        .await;

    let connector = common::connector(dir.path(), dir.path());
    let result = client
        .download_next(&connector, dir.path(), &TraceId::new())
        .await;
    assert!(matches!(result, DownloadResult::TransportError(_)));
    assert!(!dir.path().parent().unwrap().join("escape.tmp").exists());
}

#[tokio::test]
async fn test_download_server_error() {
    let (server, client, dir) = setup().await;

    Mock::given(method("GET"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let connector = common::connector(dir.path(), dir.path());
    let result = client
        .download_next(&connector, dir.path(), &TraceId::new())
        .await;
    assert_eq!(
        result,
        DownloadResult::ServerError {
            status: 502,
            body: "bad gateway".to_string()
        }
    );
}

// ============================================================================
// Acknowledge tests
// ============================================================================

#[tokio::test]
async fn test_acknowledge_deletes_by_id() {
    let (server, client, dir) = setup().await;

    Mock::given(method("DELETE"))
        .and(path(format!("{DOCUMENTS_PATH}/9f2c-77ab")))
        .and(header(PROCESSING_MODE_HEADER, "test"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let connector = common::connector(dir.path(), dir.path());
    let id = PullResultId::new("9f2c-77ab").unwrap();
    let result = client.acknowledge(&connector, &id, &TraceId::new()).await;
    assert_eq!(result, AckResult::Success);
}

#[tokio::test]
async fn test_acknowledge_not_found() {
    let (server, client, dir) = setup().await;

    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(404).set_body_string("unknown id"))
        .mount(&server)
        .await;

    let connector = common::connector(dir.path(), dir.path());
    let id = PullResultId::new("gone").unwrap();
    let result = client.acknowledge(&connector, &id, &TraceId::new()).await;
    assert_eq!(
        result,
        AckResult::ClientError {
            status: 404,
            body: "unknown id".to_string()
        }
    );
}

#[tokio::test]
async fn test_token_is_reused_across_calls() {
    let (server, client, dir) = setup().await;

    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let connector = common::connector(dir.path(), dir.path());
    for id in ["a", "b", "c"] {
        let id = PullResultId::new(id).unwrap();
        assert_eq!(
            client.acknowledge(&connector, &id, &TraceId::new()).await,
            AckResult::Success
        );
    }
    assert_eq!(common::requests_to(&server, TOKEN_PATH).await, 1);
}
