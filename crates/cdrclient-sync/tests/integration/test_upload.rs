//! Upload pipeline against a mocked document platform

use cdrclient_core::router::basic_iso_date;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_bytes, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{self, Workspace, DOCUMENTS_PATH, TOKEN_PATH};

const DOC: &[u8] = br#"<?xml version="1.0"?><invoice:request xmlns:invoice="http://www.forum-datenaustausch.ch/invoice"/>"#;

#[tokio::test]
async fn test_upload_round_trip_removes_source() {
    let server = MockServer::start().await;
    common::mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(DOCUMENTS_PATH))
        .and(header("authorization", "Bearer sync-token"))
        .and(body_bytes(DOC.to_vec()))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let ws = Workspace::new();
    let file = ws.write_source("doc.xml", DOC);
    let pipeline = common::pipeline(&server, &ws);

    assert_eq!(pipeline.poll_once(&CancellationToken::new()).await.unwrap(), 1);
    pipeline.wait_idle().await;

    assert!(!file.exists());
    assert!(common::file_names(&ws.source).is_empty());
    assert!(!pipeline.in_flight().contains(&file));
}

#[tokio::test]
async fn test_client_error_parks_without_retry() {
    let server = MockServer::start().await;
    common::mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid document"))
        .expect(1)
        .mount(&server)
        .await;

    let ws = Workspace::new();
    ws.write_source("doc.xml", DOC);
    let pipeline = common::pipeline(&server, &ws);
    let cancel = CancellationToken::new();

    pipeline.poll_once(&cancel).await.unwrap();
    pipeline.wait_idle().await;

    let today = basic_iso_date(chrono::Local::now().date_naive());
    let error_dir = ws.temp.join("errors").join("4711").join("test").join(today);
    let parked = common::file_names(&error_dir);
    assert_eq!(parked.len(), 2);
    let error_name = parked.iter().find(|n| n.ends_with(".error")).unwrap();
    let response_name = parked.iter().find(|n| n.ends_with(".response")).unwrap();
    assert!(error_name.starts_with("doc_"));
    assert_eq!(
        error_name.trim_end_matches(".error"),
        response_name.trim_end_matches(".response")
    );
    assert_eq!(
        std::fs::read_to_string(error_dir.join(response_name)).unwrap(),
        "invalid document"
    );

    // Parked documents are no longer candidates
    assert_eq!(pipeline.poll_once(&cancel).await.unwrap(), 0);
    assert_eq!(common::requests(&server, "POST", DOCUMENTS_PATH).await, 1);
}

#[tokio::test]
async fn test_server_errors_retried_then_success() {
    let server = MockServer::start().await;
    common::mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let ws = Workspace::new();
    let file = ws.write_source("doc.xml", DOC);
    let pipeline = common::pipeline(&server, &ws);

    pipeline.poll_once(&CancellationToken::new()).await.unwrap();
    pipeline.wait_idle().await;

    assert_eq!(common::requests(&server, "POST", DOCUMENTS_PATH).await, 3);
    assert!(!file.exists());
    assert!(!ws.temp.join("errors").exists());
}

#[tokio::test]
async fn test_success_archives_when_enabled() {
    let server = MockServer::start().await;
    common::mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let mut ws = Workspace::new();
    let archive = ws.temp.join("archive");
    ws.connector = ws.connector.clone().with_archive(&archive);
    ws.write_source("doc.xml", DOC);
    let pipeline = common::pipeline(&server, &ws);

    pipeline.poll_once(&CancellationToken::new()).await.unwrap();
    pipeline.wait_idle().await;

    let today = basic_iso_date(chrono::Local::now().date_naive());
    let archived = common::file_names(&archive.join(today));
    assert_eq!(archived.len(), 1);
    assert!(archived[0].starts_with("doc_") && archived[0].ends_with(".xml"));
    assert!(common::file_names(&ws.source).is_empty());
}

#[tokio::test]
async fn test_concurrent_discovery_uploads_once() {
    let server = MockServer::start().await;
    common::mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(ResponseTemplate::new(201).set_delay(std::time::Duration::from_millis(100)))
        .expect(1)
        .mount(&server)
        .await;

    let ws = Workspace::new();
    let file = ws.write_source("doc.xml", DOC);
    let pipeline = common::pipeline(&server, &ws);
    let cancel = CancellationToken::new();

    let (a, b) = tokio::join!(
        pipeline.submit(file.clone(), &cancel),
        pipeline.submit(file.clone(), &cancel)
    );
    assert!(a ^ b);
    pipeline.wait_idle().await;
    assert!(pipeline.in_flight().is_empty());
}

#[tokio::test]
async fn test_second_run_over_processed_folder_makes_no_requests() {
    let server = MockServer::start().await;
    common::mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(DOCUMENTS_PATH))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let ws = Workspace::new();
    ws.write_source("a.xml", DOC);
    ws.write_source("b.xml", DOC);
    ws.write_source("notes.txt", b"ignored");
    let pipeline = common::pipeline(&server, &ws);
    let cancel = CancellationToken::new();

    assert_eq!(pipeline.poll_once(&cancel).await.unwrap(), 2);
    pipeline.wait_idle().await;
    let after_first = server.received_requests().await.unwrap().len();

    assert_eq!(pipeline.poll_once(&cancel).await.unwrap(), 0);
    pipeline.wait_idle().await;
    assert_eq!(server.received_requests().await.unwrap().len(), after_first);
    assert_eq!(common::requests(&server, "POST", TOKEN_PATH).await, 1);
    assert_eq!(common::file_names(&ws.source), vec!["notes.txt"]);
}
