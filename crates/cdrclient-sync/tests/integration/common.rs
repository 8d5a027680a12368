//! Shared fixtures for the synchronization integration tests

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cdrclient_api::{AccessTokenCache, DocumentClient, OAuth2Config, TransportRetry};
use cdrclient_core::domain::connector::{Connector, ProcessingMode};
use cdrclient_core::domain::newtypes::ConnectorId;
use cdrclient_core::domain::retry::RetryPolicy;
use cdrclient_core::router::ConnectorRouter;
use cdrclient_sync::busy::{BusyFileDetector, BusyFileStrategy};
use cdrclient_sync::in_flight::InFlightSet;
use cdrclient_sync::pipeline::UploadPipeline;
use cdrclient_sync::pull::PullLoop;
use cdrclient_sync::upload::RetryUploader;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN_PATH: &str = "/oauth2/token";
pub const DOCUMENTS_PATH: &str = "/documents";

/// Folders of one connector below a temp dir
pub struct Workspace {
    _dir: TempDir,
    pub source: PathBuf,
    pub target: PathBuf,
    pub temp: PathBuf,
    pub connector: Connector,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("out");
        let target = dir.path().join("in");
        let temp = dir.path().join("tmp");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&target).unwrap();
        let connector = Connector::new(
            ConnectorId::new("4711").unwrap(),
            ProcessingMode::Test,
            &source,
            &target,
        );
        Self {
            _dir: dir,
            source,
            target,
            temp,
            connector,
        }
    }

    pub fn router(&self) -> Arc<ConnectorRouter> {
        Arc::new(ConnectorRouter::new(vec![self.connector.clone()], &self.temp))
    }

    pub fn write_source(&self, name: &str, body: &[u8]) -> PathBuf {
        let path = self.source.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }
}

pub async fn mount_token(server: &MockServer) {
    let expires_on = chrono::Utc::now().timestamp() + 3600;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "sync-token",
            "token_type": "Bearer",
            "expires_on": expires_on,
        })))
        .mount(server)
        .await;
}

pub fn document_client(server: &MockServer) -> Arc<DocumentClient> {
    let auth = Arc::new(AccessTokenCache::new(
        reqwest::Client::new(),
        OAuth2Config::new(format!("{}{}", server.uri(), TOKEN_PATH), "sync-client", "secret"),
        TransportRetry::new(3, Duration::from_millis(10)),
    ));
    Arc::new(DocumentClient::new(
        reqwest::Client::new(),
        format!("{}{}", server.uri(), DOCUMENTS_PATH),
        auth,
    ))
}

pub fn pipeline(server: &MockServer, ws: &Workspace) -> UploadPipeline {
    let uploader = RetryUploader::new(
        document_client(server),
        ws.router(),
        BusyFileDetector::new(BusyFileStrategy::NeverBusy, Duration::from_secs(1)),
        RetryPolicy::from_millis(&[10, 20]).unwrap(),
        2,
    );
    UploadPipeline::new(Arc::new(uploader), Arc::new(InFlightSet::new(64)))
}

pub fn pull_loop(server: &MockServer, ws: &Workspace) -> PullLoop {
    PullLoop::new(document_client(server), ws.router())
}

/// Number of requests with `method` on `request_path`
pub async fn requests(server: &MockServer, verb: &str, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == request_path)
        .count()
}

/// Names of the files directly inside `dir`, sorted
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
