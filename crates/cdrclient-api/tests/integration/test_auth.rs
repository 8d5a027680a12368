//! Integration tests for the access token cache

use std::time::Duration;

use cdrclient_api::{AuthError, AuthState};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{self, TOKEN_PATH};

#[tokio::test]
async fn test_token_reused_until_expiry_then_renewed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::token_body("short", 2)))
        .mount(&server)
        .await;

    let cache = common::token_cache(&server);

    assert_eq!(cache.get_token().await.unwrap(), "short");
    assert_eq!(cache.get_token().await.unwrap(), "short");
    assert_eq!(common::requests_to(&server, TOKEN_PATH).await, 1);

    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert_eq!(cache.get_token().await.unwrap(), "short");
    assert_eq!(common::requests_to(&server, TOKEN_PATH).await, 2);
}

#[tokio::test]
async fn test_token_request_sends_client_credentials_in_body() {
    let server = MockServer::start().await;
    common::mount_token(&server, "tok").await;

    let cache = common::token_cache(&server);
    cache.get_token().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body).to_string();
    assert!(body.contains("grant_type=client_credentials"));
    assert!(body.contains("client_id=test-client"));
    assert!(body.contains("client_secret=initial-secret"));
    assert!(body.contains("scope="));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_token_request() {
    let server = MockServer::start().await;
    common::mount_token(&server, "shared").await;

    let cache = common::token_cache(&server);
    let (a, b, c) = tokio::join!(cache.get_token(), cache.get_token(), cache.get_token());
    assert_eq!(a.unwrap(), "shared");
    assert_eq!(b.unwrap(), "shared");
    assert_eq!(c.unwrap(), "shared");
    assert_eq!(common::requests_to(&server, TOKEN_PATH).await, 1);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    common::mount_token(&server, "after-retry").await;

    let cache = common::token_cache(&server);
    assert_eq!(cache.get_token().await.unwrap(), "after-retry");
    assert_eq!(common::requests_to(&server, TOKEN_PATH).await, 3);
    assert!(matches!(cache.state().await, AuthState::Authenticated { .. }));
}

#[tokio::test]
async fn test_retry_budget_exhausted_is_retryable_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let cache = common::token_cache(&server);
    let err = cache.get_token().await.unwrap_err();
    assert!(matches!(err, AuthError::Retryable(_)));
    assert_eq!(common::requests_to(&server, TOKEN_PATH).await, 3);
    assert!(matches!(cache.state().await, AuthState::RetryableFailure(_)));

    // Not sticky: the next call tries again
    let _ = cache.get_token().await;
    assert_eq!(common::requests_to(&server, TOKEN_PATH).await, 6);
}

#[tokio::test]
async fn test_denial_is_sticky_until_credentials_change() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    common::mount_token(&server, "fresh").await;

    let cache = common::token_cache(&server);

    assert!(matches!(cache.get_token().await, Err(AuthError::Denied(_))));
    assert!(matches!(cache.get_token().await, Err(AuthError::Denied(_))));
    assert_eq!(common::requests_to(&server, TOKEN_PATH).await, 1);

    cache.update_credentials("rotated-secret").await;
    assert_eq!(cache.state().await, AuthState::Unauthenticated);
    assert_eq!(cache.get_token().await.unwrap(), "fresh");
    assert_eq!(common::requests_to(&server, TOKEN_PATH).await, 2);
}

#[tokio::test]
async fn test_other_rejection_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(serde_json::json!({"error": "invalid_scope"})),
        )
        .mount(&server)
        .await;

    let cache = common::token_cache(&server);
    assert!(matches!(
        cache.get_token().await,
        Err(AuthError::PermanentlyFailed(_))
    ));
    assert!(matches!(
        cache.get_token().await,
        Err(AuthError::PermanentlyFailed(_))
    ));
    assert_eq!(common::requests_to(&server, TOKEN_PATH).await, 1);
}

#[tokio::test]
async fn test_unreachable_token_endpoint_is_retryable() {
    let server = MockServer::builder().start().await;
    let cache = common::token_cache(&server);
    drop(server);

    assert!(matches!(
        cache.get_token().await,
        Err(AuthError::Retryable(_))
    ));
}
