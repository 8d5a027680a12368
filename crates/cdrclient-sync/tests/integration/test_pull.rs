//! Pull loop against a mocked document platform

use cdrclient_sync::pull::CycleEnd;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{self, Workspace, DOCUMENTS_PATH, TOKEN_PATH};

const DOC: &[u8] = b"<?xml version=\"1.0\"?><generalNotification/>";

async fn mount_one_document(server: &MockServer, id: &str) {
    Mock::given(method("GET"))
        .and(path(DOCUMENTS_PATH))
        .and(query_param("limit", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("cdr-document-uuid", id)
                .set_body_bytes(DOC.to_vec()),
        )
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_download_acknowledge_and_route() {
    let server = MockServer::start().await;
    common::mount_token(&server).await;
    mount_one_document(&server, "doc-x").await;
    Mock::given(method("DELETE"))
        .and(path(format!("{DOCUMENTS_PATH}/doc-x")))
        .and(header("cdr-connector-id", "4711"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let ws = Workspace::new();
    let report = common::pull_loop(&server, &ws)
        .run_cycle(&ws.connector, &CancellationToken::new())
        .await;

    assert_eq!(report.processed, 1);
    assert_eq!(report.end, CycleEnd::Drained);
    assert_eq!(common::file_names(&ws.target), vec!["doc-x.xml"]);
    assert_eq!(std::fs::read(ws.target.join("doc-x.xml")).unwrap(), DOC);
    assert_eq!(common::requests(&server, "GET", DOCUMENTS_PATH).await, 2);
    assert_eq!(common::requests(&server, "POST", TOKEN_PATH).await, 1);
}

#[tokio::test]
async fn test_failed_acknowledge_keeps_temp_file() {
    let server = MockServer::start().await;
    common::mount_token(&server).await;
    mount_one_document(&server, "doc-y").await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let ws = Workspace::new();
    let pull = common::pull_loop(&server, &ws);
    let report = pull.run_cycle(&ws.connector, &CancellationToken::new()).await;

    assert_eq!(report.processed, 0);
    assert!(matches!(report.end, CycleEnd::Aborted(_)));
    assert!(common::file_names(&ws.target).is_empty());
    let in_flight = pull.router().in_flight_folder_for(&ws.connector);
    assert_eq!(common::file_names(&in_flight), vec!["doc-y.tmp"]);
    assert_eq!(common::requests(&server, "GET", DOCUMENTS_PATH).await, 1);
}

#[tokio::test]
async fn test_server_error_aborts_cycle() {
    let server = MockServer::start().await;
    common::mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let ws = Workspace::new();
    let report = common::pull_loop(&server, &ws)
        .run_cycle(&ws.connector, &CancellationToken::new())
        .await;

    assert_eq!(report.processed, 0);
    assert!(matches!(report.end, CycleEnd::Aborted(ref r) if r.contains("503")));
    assert_eq!(common::requests(&server, "GET", DOCUMENTS_PATH).await, 1);
}
