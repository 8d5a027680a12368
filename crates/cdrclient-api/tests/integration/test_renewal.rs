//! Integration tests for client secret renewal

use std::time::Duration;

use cdrclient_api::{ApiError, AuthError, CredentialRenewer, TransportRetry};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{self, CLIENT_ID, CREDENTIALS_PATH, TOKEN_PATH};

fn renewer(server: &MockServer, auth: std::sync::Arc<cdrclient_api::AccessTokenCache>) -> CredentialRenewer {
    CredentialRenewer::new(
        reqwest::Client::new(),
        format!("{}{}", server.uri(), CREDENTIALS_PATH),
        auth,
        TransportRetry::new(3, Duration::from_millis(10)),
    )
}

#[tokio::test]
async fn test_renew_installs_new_secret() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("client_secret=initial-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::token_body("old", 3600)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("client_secret=rotated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::token_body("new", 3600)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(format!("{CREDENTIALS_PATH}/{CLIENT_ID}")))
        .and(header("authorization", "Bearer old"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"clientSecret": "rotated"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let auth = common::token_cache(&server);
    let secret = renewer(&server, auth.clone()).renew().await.unwrap();

    assert_eq!(secret, "rotated");
    assert_eq!(auth.get_token().await.unwrap(), "new");
}

#[tokio::test]
async fn test_renew_retries_server_errors() {
    let server = MockServer::start().await;
    common::mount_token(&server, "tok").await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"clientSecret": "s2"})),
        )
        .mount(&server)
        .await;

    let auth = common::token_cache(&server);
    assert_eq!(renewer(&server, auth).renew().await.unwrap(), "s2");
    assert_eq!(
        common::requests_to(&server, &format!("{CREDENTIALS_PATH}/{CLIENT_ID}")).await,
        2
    );
}

#[tokio::test]
async fn test_renew_client_error_not_retried() {
    let server = MockServer::start().await;
    common::mount_token(&server, "tok").await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&server)
        .await;

    let auth = common::token_cache(&server);
    let err = renewer(&server, auth).renew().await.unwrap_err();
    assert!(matches!(err, ApiError::ClientError { status: 403, .. }));
    assert!(cdrclient_api::renewal::is_rejection(&err));
}

#[tokio::test]
async fn test_renew_rejects_malformed_body() {
    let server = MockServer::start().await;
    common::mount_token(&server, "tok").await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"secret": "x"})))
        .mount(&server)
        .await;

    let auth = common::token_cache(&server);
    let err = renewer(&server, auth).renew().await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_renew_needs_a_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(serde_json::json!({"error": "invalid_client"})),
        )
        .mount(&server)
        .await;

    let auth = common::token_cache(&server);
    let err = renewer(&server, auth).renew().await.unwrap_err();
    assert!(matches!(err, ApiError::Auth(AuthError::Denied(_))));
    assert_eq!(
        common::requests_to(&server, &format!("{CREDENTIALS_PATH}/{CLIENT_ID}")).await,
        0
    );
}
